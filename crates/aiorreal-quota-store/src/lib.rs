//! Document-store abstraction for the aiorreal quota engine.
//!
//! The quota domain persists five logical collections of JSON documents.
//! This crate defines the small store interface the engine is written
//! against (point reads, merge-aware writes, filtered queries, batch
//! writes, and optimistic multi-document transactions) plus two
//! interchangeable implementations:
//!
//! - [`MemoryStore`]: in-process, for tests and reference semantics
//! - [`RocksStore`]: `RocksDB`-backed, for production
//!
//! # Transactions
//!
//! A transaction is a pure function from a read-set to a write-set. The
//! caller names the documents to read; the driver snapshots them with their
//! versions, runs the body, and commits the returned writes only if none of
//! the read documents changed in the meantime. On conflict the body is
//! re-run against a fresh snapshot, up to a bounded number of attempts.
//!
//! # Example
//!
//! ```no_run
//! use aiorreal_quota_store::{Collection, DocRef, DocumentStore, MemoryStore, WriteOp};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! store.set(Collection::Users, "u1", &json!({"id": "u1"}), false).unwrap();
//!
//! let user_ref = DocRef::new(Collection::Users, "u1");
//! store
//!     .transaction(&[user_ref.clone()], &mut |snapshot| {
//!         let doc = snapshot.get(Collection::Users, "u1").cloned();
//!         let _ = doc;
//!         Ok(vec![WriteOp::merge(
//!             Collection::Users,
//!             "u1",
//!             json!({"email": "a@b.c"}),
//!         )])
//!     })
//!     .unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod rocks;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

/// A stored document. Always a JSON object at the store boundary.
pub type Document = Value;

/// How many times a transaction body is re-run on version conflicts before
/// the driver gives up.
pub const MAX_TX_ATTEMPTS: u32 = 5;

/// The five logical collections of the quota domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// User records, keyed by user id.
    Users,
    /// Subscription documents, keyed by user id.
    Subscriptions,
    /// Quota wallets, keyed by store-assigned id.
    Wallets,
    /// Usage records, keyed by `{user_id}_{request_id}`.
    Usages,
    /// Webhook event dedup records, keyed by derived event id.
    WebhookEvents,
}

impl Collection {
    /// The persisted collection name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Users => "users_quota",
            Self::Subscriptions => "subscriptions_quota",
            Self::Wallets => "quota_wallets",
            Self::Usages => "quota_usages",
            Self::WebhookEvents => "webhook_events",
        }
    }

    /// All collections, for store initialization.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Users,
            Self::Subscriptions,
            Self::Wallets,
            Self::Usages,
            Self::WebhookEvents,
        ]
    }
}

/// A reference to a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    /// The collection holding the document.
    pub collection: Collection,
    /// The document id.
    pub id: String,
}

impl DocRef {
    /// Create a document reference.
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }
}

/// Sort direction for query ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// A query filter: field equality conditions plus optional ordering and
/// limit.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
    order_by: Option<(String, Order)>,
    limit: Option<usize>,
}

impl Filter {
    /// An empty filter matching every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Order results by a field, descending.
    #[must_use]
    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some((field.into(), Order::Desc));
        self
    }

    /// Order results by a field, ascending.
    #[must_use]
    pub fn order_by_asc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some((field.into(), Order::Asc));
        self
    }

    /// Keep at most `n` results.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether a document satisfies every condition.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }

    /// Sort and truncate query results in place.
    pub fn order_and_limit(&self, results: &mut Vec<(String, Document)>) {
        if let Some((field, order)) = &self.order_by {
            results.sort_by(|(_, a), (_, b)| {
                let cmp = compare_values(a.get(field), b.get(field));
                match order {
                    Order::Asc => cmp,
                    Order::Desc => cmp.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
    }
}

/// Total order over optional JSON values for query sorting.
///
/// Absent < null < booleans < numbers < strings. RFC 3339 timestamps are
/// strings, so chronological order falls out of lexical order.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_) | Value::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// A single document write.
#[derive(Debug, Clone)]
pub struct WriteOp {
    /// The collection to write to.
    pub collection: Collection,
    /// The document id.
    pub id: String,
    /// The document body or merge patch.
    pub doc: Document,
    /// Merge (shallow field patch) rather than overwrite.
    pub merge: bool,
}

impl WriteOp {
    /// Overwrite a document.
    pub fn set(collection: Collection, id: impl Into<String>, doc: Document) -> Self {
        Self {
            collection,
            id: id.into(),
            doc,
            merge: false,
        }
    }

    /// Shallow-merge fields into a document, creating it if absent.
    ///
    /// `null` values in the patch remove the field: the domain collapses
    /// `null` and absent into a single absent marker.
    pub fn merge(collection: Collection, id: impl Into<String>, doc: Document) -> Self {
        Self {
            collection,
            id: id.into(),
            doc,
            merge: true,
        }
    }
}

/// Apply a shallow merge patch to an existing document body.
pub(crate) fn merge_document(existing: &mut Document, patch: &Document) {
    let Some(patch_map) = patch.as_object() else {
        *existing = patch.clone();
        return;
    };
    if !existing.is_object() {
        *existing = Value::Object(serde_json::Map::new());
    }
    // Checked above: `existing` is an object here.
    let map = existing.as_object_mut().expect("document is an object");
    for (key, value) in patch_map {
        if value.is_null() {
            map.remove(key);
        } else {
            map.insert(key.clone(), value.clone());
        }
    }
}

/// The documents a transaction body sees: the read-set, snapshotted with
/// versions at transaction start.
#[derive(Debug, Default)]
pub struct TxSnapshot {
    docs: HashMap<(Collection, String), Document>,
}

impl TxSnapshot {
    pub(crate) fn insert(&mut self, collection: Collection, id: String, doc: Document) {
        self.docs.insert((collection, id), doc);
    }

    /// The snapshotted document, if it existed at transaction start.
    #[must_use]
    pub fn get(&self, collection: Collection, id: &str) -> Option<&Document> {
        self.docs.get(&(collection, id.to_owned()))
    }
}

/// A transaction body: pure function from read snapshot to write-set.
///
/// Must not touch the store directly; it may run multiple times when the
/// driver retries on conflict. Errors abort the transaction with no writes.
pub type TxBody<'a> = &'a mut dyn FnMut(&TxSnapshot) -> Result<Vec<WriteOp>>;

/// The storage interface the quota engine is written against.
///
/// Implementations must be interchangeable: the engine's semantics are
/// defined entirely by this contract.
pub trait DocumentStore: Send + Sync {
    /// Read a single document.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>>;

    /// Write a single document, merging or overwriting.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn set(&self, collection: Collection, id: &str, doc: &Document, merge: bool) -> Result<()>;

    /// Query a collection with field-equality conditions.
    ///
    /// Returns `(id, document)` pairs ordered and truncated per the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<(String, Document)>>;

    /// Apply a set of writes. Each write is individually atomic; the group
    /// is not.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store fails.
    fn batch(&self, writes: Vec<WriteOp>) -> Result<()>;

    /// Allocate a store-assigned document id (ULID, time-ordered).
    fn allocate_id(&self) -> String {
        ulid::Ulid::new().to_string()
    }

    /// Run an optimistic transaction over the named read-set.
    ///
    /// The body runs against a versioned snapshot of `reads` and returns
    /// the writes to apply. Writes commit only if no read document changed
    /// since the snapshot; otherwise the body re-runs, up to
    /// [`MAX_TX_ATTEMPTS`] attempts.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] when every attempt lost a version race.
    /// - Any error returned by the body, which aborts with no writes.
    fn transaction(&self, reads: &[DocRef], body: TxBody<'_>) -> Result<()>;
}
