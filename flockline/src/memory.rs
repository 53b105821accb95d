//! In-memory document store for development and testing.

use crate::errors::{StoreError, StoreResult};
use crate::store::{
    decode_document, Document, DocumentKey, DocumentStore, DocumentVersion, DocumentWrites,
    Versioned, WriteOperation,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
struct StoredDocument {
    version: DocumentVersion,
    body: Value,
}

/// In-memory implementation of [`DocumentStore`].
///
/// Holds every document in a map behind a single lock. A commit checks all
/// version expectations and applies all writes while holding the write lock,
/// so batches are atomic and isolated from one another.
///
/// Cloning the store shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<HashMap<DocumentKey, StoredDocument>>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored across all collections.
    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    async fn load<D: Document>(&self, id: &D::Id) -> StoreResult<Option<Versioned<D>>> {
        let key = DocumentKey::new(D::COLLECTION, id);
        let stored = self.documents.read().get(&key).cloned();

        stored
            .map(|stored| {
                Ok(Versioned {
                    version: stored.version,
                    document: decode_document(&key, stored.body)?,
                })
            })
            .transpose()
    }

    async fn load_all<D: Document>(&self) -> StoreResult<Vec<Versioned<D>>> {
        let matching: Vec<(DocumentKey, StoredDocument)> = self
            .documents
            .read()
            .iter()
            .filter(|(key, _)| key.collection == D::COLLECTION)
            .map(|(key, stored)| (key.clone(), stored.clone()))
            .collect();

        matching
            .into_iter()
            .map(|(key, stored)| {
                Ok(Versioned {
                    version: stored.version,
                    document: decode_document(&key, stored.body)?,
                })
            })
            .collect()
    }

    #[instrument(name = "memory.commit", skip(self, writes), fields(writes = writes.len()))]
    async fn commit(&self, writes: DocumentWrites) -> StoreResult<()> {
        let mut documents = self.documents.write();

        // Check all version constraints before applying any write
        for write in writes.entries() {
            let current = documents.get(&write.key).map(|stored| stored.version);
            if !write.expected.matches(current) {
                warn!(
                    document = %write.key,
                    expected = %write.expected,
                    "[memory.commit] version conflict"
                );
                return Err(StoreError::VersionConflict {
                    key: write.key.clone(),
                    expected: write.expected,
                    current,
                });
            }
        }

        for write in writes.into_entries() {
            match write.operation {
                WriteOperation::Put(body) => {
                    let version = documents
                        .get(&write.key)
                        .map_or_else(DocumentVersion::initial, |stored| stored.version.next());
                    documents.insert(write.key, StoredDocument { version, body });
                }
                WriteOperation::Delete => {
                    documents.remove(&write.key);
                }
            }
        }

        debug!("[memory.commit] batch applied");
        Ok(())
    }
}
