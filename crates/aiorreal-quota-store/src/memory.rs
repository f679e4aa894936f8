//! In-memory store implementation.
//!
//! Reference semantics for the [`DocumentStore`] contract, used by unit and
//! engine tests. Documents carry a version counter; transactions validate
//! read versions at commit under the write lock, giving the same
//! optimistic-concurrency behavior as the production store.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::{
    merge_document, Collection, DocRef, Document, DocumentStore, Filter, TxBody, TxSnapshot,
    WriteOp, MAX_TX_ATTEMPTS,
};

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    doc: Document,
}

type CollectionMap = HashMap<String, Versioned>;

/// In-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, CollectionMap>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_versions(&self, reads: &[DocRef]) -> (TxSnapshot, HashMap<DocRef, u64>) {
        let guard = self.collections.read().expect("store lock poisoned");
        let mut snapshot = TxSnapshot::default();
        let mut versions = HashMap::new();
        for doc_ref in reads {
            let entry = guard
                .get(&doc_ref.collection)
                .and_then(|c| c.get(&doc_ref.id));
            versions.insert(doc_ref.clone(), entry.map_or(0, |v| v.version));
            if let Some(v) = entry {
                snapshot.insert(doc_ref.collection, doc_ref.id.clone(), v.doc.clone());
            }
        }
        (snapshot, versions)
    }

    fn apply_write(collections: &mut HashMap<Collection, CollectionMap>, write: &WriteOp) {
        let map = collections.entry(write.collection).or_default();
        match map.get_mut(&write.id) {
            Some(existing) => {
                if write.merge {
                    merge_document(&mut existing.doc, &write.doc);
                } else {
                    existing.doc = write.doc.clone();
                }
                existing.version += 1;
            }
            None => {
                let mut doc = write.doc.clone();
                if write.merge {
                    // Merging into an absent document still drops nulls.
                    let mut base = Document::Object(serde_json::Map::new());
                    merge_document(&mut base, &write.doc);
                    doc = base;
                }
                map.insert(write.id.clone(), Versioned { version: 1, doc });
            }
        }
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let guard = self.collections.read().expect("store lock poisoned");
        Ok(guard
            .get(&collection)
            .and_then(|c| c.get(id))
            .map(|v| v.doc.clone()))
    }

    fn set(&self, collection: Collection, id: &str, doc: &Document, merge: bool) -> Result<()> {
        let mut guard = self.collections.write().expect("store lock poisoned");
        Self::apply_write(
            &mut guard,
            &WriteOp {
                collection,
                id: id.to_owned(),
                doc: doc.clone(),
                merge,
            },
        );
        Ok(())
    }

    fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<(String, Document)>> {
        let guard = self.collections.read().expect("store lock poisoned");
        let mut results: Vec<(String, Document)> = guard
            .get(&collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, v)| filter.matches(&v.doc))
                    .map(|(id, v)| (id.clone(), v.doc.clone()))
                    .collect()
            })
            .unwrap_or_default();
        filter.order_and_limit(&mut results);
        Ok(results)
    }

    fn batch(&self, writes: Vec<WriteOp>) -> Result<()> {
        let mut guard = self.collections.write().expect("store lock poisoned");
        for write in &writes {
            Self::apply_write(&mut guard, write);
        }
        Ok(())
    }

    fn transaction(&self, reads: &[DocRef], body: TxBody<'_>) -> Result<()> {
        for _ in 0..MAX_TX_ATTEMPTS {
            let (snapshot, versions) = self.read_versions(reads);
            let writes = body(&snapshot)?;

            let mut guard = self.collections.write().expect("store lock poisoned");
            let conflicted = versions.iter().any(|(doc_ref, version)| {
                let current = guard
                    .get(&doc_ref.collection)
                    .and_then(|c| c.get(&doc_ref.id))
                    .map_or(0, |v| v.version);
                current != *version
            });
            if conflicted {
                tracing::debug!("Transaction read-set changed, retrying");
                continue;
            }
            for write in &writes {
                Self::apply_write(&mut guard, write);
            }
            return Ok(());
        }
        Err(StoreError::Conflict {
            attempts: MAX_TX_ATTEMPTS,
        })
    }
}
