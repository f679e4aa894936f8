//! `RocksDB` store implementation.
//!
//! One column family per logical collection. Stored documents carry a
//! version counter used for optimistic transaction validation; commits are
//! serialized behind a commit lock, so a transaction's read versions are
//! re-checked and its writes applied without interleaving.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::{
    merge_document, Collection, DocRef, Document, DocumentStore, Filter, TxBody, TxSnapshot,
    WriteOp, MAX_TX_ATTEMPTS,
};

/// A document as persisted: body plus version counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDoc {
    version: u64,
    doc: Document,
}

/// `RocksDB`-backed document store.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes version validation + write application for set, batch,
    /// and transaction commits.
    commit_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = Collection::all()
            .into_iter()
            .map(|c| ColumnFamilyDescriptor::new(c.name(), Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Mutex::new(()),
        })
    }

    fn cf(&self, collection: Collection) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db.cf_handle(collection.name()).ok_or_else(|| {
            StoreError::Database(format!("column family not found: {}", collection.name()))
        })
    }

    fn serialize(value: &StoredDoc) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize(data: &[u8]) -> Result<StoredDoc> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_stored(&self, collection: Collection, id: &str) -> Result<Option<StoredDoc>> {
        let cf = self.cf(collection)?;
        self.db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Fold a write into its stored form, bumping the version.
    fn next_stored(&self, write: &WriteOp) -> Result<StoredDoc> {
        let existing = self.get_stored(write.collection, &write.id)?;
        let mut stored = match existing {
            Some(mut stored) => {
                if write.merge {
                    merge_document(&mut stored.doc, &write.doc);
                } else {
                    stored.doc = write.doc.clone();
                }
                stored
            }
            None => {
                let mut doc = Document::Object(serde_json::Map::new());
                if write.merge {
                    merge_document(&mut doc, &write.doc);
                } else {
                    doc = write.doc.clone();
                }
                StoredDoc { version: 0, doc }
            }
        };
        stored.version += 1;
        Ok(stored)
    }

    /// Apply writes as a single `RocksDB` batch. Caller holds the commit
    /// lock.
    fn apply_writes(&self, writes: &[WriteOp]) -> Result<()> {
        let mut batch = WriteBatch::default();
        for write in writes {
            let stored = self.next_stored(write)?;
            let cf = self.cf(write.collection)?;
            batch.put_cf(&cf, write.id.as_bytes(), Self::serialize(&stored)?);
        }
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl DocumentStore for RocksStore {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        Ok(self.get_stored(collection, id)?.map(|s| s.doc))
    }

    fn set(&self, collection: Collection, id: &str, doc: &Document, merge: bool) -> Result<()> {
        let _guard = self.commit_lock.lock().expect("commit lock poisoned");
        self.apply_writes(&[WriteOp {
            collection,
            id: id.to_owned(),
            doc: doc.clone(),
            merge,
        }])
    }

    fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<(String, Document)>> {
        let cf = self.cf(collection)?;
        let mut results = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let stored = Self::deserialize(&value)?;
            if filter.matches(&stored.doc) {
                let id = String::from_utf8(key.to_vec())
                    .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
                results.push((id, stored.doc));
            }
        }
        filter.order_and_limit(&mut results);
        Ok(results)
    }

    fn batch(&self, writes: Vec<WriteOp>) -> Result<()> {
        let _guard = self.commit_lock.lock().expect("commit lock poisoned");
        self.apply_writes(&writes)
    }

    fn transaction(&self, reads: &[DocRef], body: TxBody<'_>) -> Result<()> {
        for _ in 0..MAX_TX_ATTEMPTS {
            // Snapshot the read-set with versions.
            let mut snapshot = TxSnapshot::default();
            let mut versions: HashMap<&DocRef, u64> = HashMap::new();
            for doc_ref in reads {
                let stored = self.get_stored(doc_ref.collection, &doc_ref.id)?;
                versions.insert(doc_ref, stored.as_ref().map_or(0, |s| s.version));
                if let Some(stored) = stored {
                    snapshot.insert(doc_ref.collection, doc_ref.id.clone(), stored.doc);
                }
            }

            let writes = body(&snapshot)?;

            let _guard = self.commit_lock.lock().expect("commit lock poisoned");
            let mut conflicted = false;
            for (doc_ref, version) in &versions {
                let current = self
                    .get_stored(doc_ref.collection, &doc_ref.id)?
                    .map_or(0, |s| s.version);
                if current != *version {
                    conflicted = true;
                    break;
                }
            }
            if conflicted {
                tracing::debug!("Transaction read-set changed, retrying");
                continue;
            }
            return self.apply_writes(&writes);
        }
        Err(StoreError::Conflict {
            attempts: MAX_TX_ATTEMPTS,
        })
    }
}
