//! Document (de)serialization helpers at the store boundary.

use serde::de::DeserializeOwned;
use serde::Serialize;

use aiorreal_quota_store::{Document, StoreError};

/// Decode a stored document into a domain value.
pub(crate) fn decode<T: DeserializeOwned>(doc: &Document) -> Result<T, StoreError> {
    serde_json::from_value(doc.clone()).map_err(|e| StoreError::InvalidDocument(e.to_string()))
}

/// Encode a domain value into a document.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}
