//! In-memory document store adapter.
//!
//! Reference implementation of the store port used by every service test
//! and by single-process deployments. Optimistic concurrency is provided
//! with per-document versions drawn from one monotonic counter: a
//! transaction records the version of every document it reads and commit
//! re-checks them under the map lock before applying staged writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::ports::store::{DocumentStore, StoreError, StoreTransaction, StoredDocument};

type DocKey = (String, String);

#[derive(Debug, Clone)]
struct VersionedDocument {
    version: u64,
    data: Value,
}

#[derive(Debug, Default)]
struct Shared {
    documents: HashMap<DocKey, VersionedDocument>,
    next_version: u64,
}

impl Shared {
    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

/// Shared in-memory document store.
#[derive(Debug, Default, Clone)]
pub struct MemoryDocumentStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shared>, StoreError> {
        self.shared
            .lock()
            .map_err(|_| StoreError::backend("store mutex poisoned"))
    }
}

#[derive(Debug)]
enum StagedWrite {
    Set { key: DocKey, data: Value },
    Delete { key: DocKey },
}

/// Open transaction against a [`MemoryDocumentStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Mutex<Shared>>,
    // Version observed at first read; None when the document was absent.
    reads: HashMap<DocKey, Option<u64>>,
    staged: Vec<StagedWrite>,
}

impl MemoryTransaction {
    fn lock(&self) -> Result<MutexGuard<'_, Shared>, StoreError> {
        self.shared
            .lock()
            .map_err(|_| StoreError::backend("store mutex poisoned"))
    }

    fn staged_read(&self, key: &DocKey) -> Option<Option<Value>> {
        self.staged.iter().rev().find_map(|write| match write {
            StagedWrite::Set { key: staged, data } if staged == key => Some(Some(data.clone())),
            StagedWrite::Delete { key: staged } if staged == key => Some(None),
            _ => None,
        })
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let key = (collection.to_owned(), id.to_owned());
        if let Some(staged) = self.staged_read(&key) {
            return Ok(staged);
        }
        let observed = {
            let shared = self.lock()?;
            shared
                .documents
                .get(&key)
                .map(|doc| (doc.version, doc.data.clone()))
        };
        // Only the first observation counts for the commit-time check.
        self.reads
            .entry(key)
            .or_insert_with(|| observed.as_ref().map(|(version, _)| *version));
        Ok(observed.map(|(_, data)| data))
    }

    fn set(&mut self, collection: &str, id: &str, document: Value) {
        self.staged.push(StagedWrite::Set {
            key: (collection.to_owned(), id.to_owned()),
            data: document,
        });
    }

    fn delete(&mut self, collection: &str, id: &str) {
        self.staged.push(StagedWrite::Delete {
            key: (collection.to_owned(), id.to_owned()),
        });
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            shared: store,
            reads,
            staged,
        } = *self;
        let mut shared = store
            .lock()
            .map_err(|_| StoreError::backend("store mutex poisoned"))?;
        for (key, observed) in &reads {
            let current = shared.documents.get(key).map(|doc| doc.version);
            if current != *observed {
                return Err(StoreError::Conflict);
            }
        }
        for write in staged {
            match write {
                StagedWrite::Set { key, data } => {
                    let version = shared.bump_version();
                    shared
                        .documents
                        .insert(key, VersionedDocument { version, data });
                }
                StagedWrite::Delete { key } => {
                    shared.documents.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            reads: HashMap::new(),
            staged: Vec::new(),
        }))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let shared = self.lock()?;
        Ok(shared
            .documents
            .get(&(collection.to_owned(), id.to_owned()))
            .map(|doc| doc.data.clone()))
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let shared = self.lock()?;
        Ok(shared
            .documents
            .iter()
            .filter(|((coll, _), doc)| coll == collection && doc.data.get(field) == Some(value))
            .map(|((_, id), doc)| StoredDocument {
                id: id.clone(),
                data: doc.data.clone(),
            })
            .collect())
    }
}
