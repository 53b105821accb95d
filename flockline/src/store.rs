//! Versioned document storage.
//!
//! Every document lives in a [`Collection`] under a string id and carries a
//! monotonically increasing [`DocumentVersion`]. Writers state the version they
//! read; a [`DocumentStore`] commits a whole [`DocumentWrites`] batch atomically
//! or rejects all of it when any expectation fails.

use crate::errors::{StoreError, StoreResult};
use nutype::nutype;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The named collections documents are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Catalog products
    Products,
    /// Customer orders
    Orders,
    /// Return requests
    Returns,
    /// Product reviews
    Reviews,
    /// Registered users
    Users,
    /// Email ownership markers guaranteeing unique registration
    EmailClaims,
}

impl Collection {
    /// Storage name of the collection.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Orders => "orders",
            Self::Returns => "returns",
            Self::Reviews => "reviews",
            Self::Users => "users",
            Self::EmailClaims => "email_claims",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully qualified address of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    /// Owning collection
    pub collection: Collection,
    /// Id within the collection
    pub id: String,
}

impl DocumentKey {
    /// Builds a key from a collection and any displayable id.
    pub fn new(collection: Collection, id: impl fmt::Display) -> Self {
        Self {
            collection,
            id: id.to_string(),
        }
    }

    /// Key of the given document.
    pub fn of<D: Document>(document: &D) -> Self {
        Self::new(D::COLLECTION, document.id())
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Document version.
///
/// The first stored version of a document is 1 and every committed write
/// increments it.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct DocumentVersion(u64);

impl DocumentVersion {
    /// Version assigned on insert.
    pub fn initial() -> Self {
        Self::new(1)
    }

    /// The version following this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.into_inner().saturating_add(1))
    }
}

/// What a writer believes about a document's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// The document must not exist yet.
    New,
    /// The document must exist at exactly this version.
    Exact(DocumentVersion),
}

impl ExpectedVersion {
    /// Whether a document currently at `current` satisfies this expectation.
    pub fn matches(self, current: Option<DocumentVersion>) -> bool {
        match (self, current) {
            (Self::New, None) => true,
            (Self::Exact(expected), Some(current)) => expected == current,
            _ => false,
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("new"),
            Self::Exact(version) => write!(f, "version {version}"),
        }
    }
}

/// A type that is persisted as a document.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Identifier type of the document.
    type Id: fmt::Display + Send + Sync;

    /// Collection the document is stored in.
    const COLLECTION: Collection;

    /// The document's identifier.
    fn id(&self) -> Self::Id;
}

/// A document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<D> {
    /// Version at read time
    pub version: DocumentVersion,
    /// The document
    pub document: D,
}

impl<D> Versioned<D> {
    /// Expectation that the document is still at the version it was read at.
    pub const fn expected(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version)
    }
}

/// Change applied to one document by a write batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    /// Store the given JSON body as the new document state.
    Put(Value),
    /// Remove the document.
    Delete,
}

/// One document write inside a [`DocumentWrites`] batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    /// Target document
    pub key: DocumentKey,
    /// Version the target must be at for the batch to apply
    pub expected: ExpectedVersion,
    /// What to do with it
    pub operation: WriteOperation,
}

/// Collection of document writes to commit atomically.
///
/// Built with a fluent API. Errors (serialization failures, a document named
/// twice) are accumulated and reported by [`build()`](Self::build).
///
/// ```ignore
/// let writes = DocumentWrites::new()
///     .insert(&order)
///     .update(&product, product_version)
///     .build()?;
/// store.commit(writes).await?;
/// ```
#[derive(Debug, Default)]
pub struct DocumentWrites {
    entries: Vec<DocumentWrite>,
    keys: HashSet<DocumentKey>,
    builder_errors: Vec<StoreError>,
}

impl DocumentWrites {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document that must not exist yet.
    #[must_use]
    pub fn insert<D: Document>(self, document: &D) -> Self {
        self.put(document, ExpectedVersion::New)
    }

    /// Replace a document that must still be at `version`.
    #[must_use]
    pub fn update<D: Document>(self, document: &D, version: DocumentVersion) -> Self {
        self.put(document, ExpectedVersion::Exact(version))
    }

    /// Store a document with an explicit version expectation.
    #[must_use]
    pub fn put<D: Document>(mut self, document: &D, expected: ExpectedVersion) -> Self {
        let key = DocumentKey::of(document);
        match serde_json::to_value(document) {
            Ok(body) => self.push(key, expected, WriteOperation::Put(body)),
            Err(error) => {
                self.builder_errors.push(StoreError::SerializationFailed {
                    key,
                    detail: error.to_string(),
                });
                self
            }
        }
    }

    /// Delete a document that must still be at `version`.
    #[must_use]
    pub fn delete<D: Document>(self, document: &D, version: DocumentVersion) -> Self {
        let key = DocumentKey::of(document);
        self.push(
            key,
            ExpectedVersion::Exact(version),
            WriteOperation::Delete,
        )
    }

    fn push(mut self, key: DocumentKey, expected: ExpectedVersion, operation: WriteOperation) -> Self {
        if !self.keys.insert(key.clone()) {
            self.builder_errors.push(StoreError::DuplicateWrite { key });
            return self;
        }
        self.entries.push(DocumentWrite {
            key,
            expected,
            operation,
        });
        self
    }

    /// Validate the batch and return it ready for commit.
    ///
    /// Returns the first error recorded by the builder methods.
    pub fn build(mut self) -> StoreResult<Self> {
        if !self.builder_errors.is_empty() {
            return Err(self.builder_errors.swap_remove(0));
        }
        Ok(self)
    }

    /// Number of writes in the batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch contains no writes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The writes in insertion order.
    pub fn entries(&self) -> &[DocumentWrite] {
        &self.entries
    }

    /// Consume the batch, yielding its writes in insertion order.
    pub fn into_entries(self) -> Vec<DocumentWrite> {
        self.entries
    }
}

/// Contract for document store implementations.
///
/// Stores provide three operations:
/// 1. Load a single document with its version
/// 2. Load every document of a collection
/// 3. Atomically commit a batch of writes with version checking
///
/// The trait hides how a backend achieves atomicity (PostgreSQL uses a
/// transaction, the in-memory store a single write lock).
pub trait DocumentStore {
    /// Load one document by id, or `None` if it does not exist.
    fn load<D: Document>(
        &self,
        id: &D::Id,
    ) -> impl Future<Output = StoreResult<Option<Versioned<D>>>> + Send;

    /// Load every document of `D`'s collection, in no particular order.
    fn load_all<D: Document>(&self) -> impl Future<Output = StoreResult<Vec<Versioned<D>>>> + Send;

    /// Atomically apply a batch of writes.
    ///
    /// Every write's expected version is checked before anything is applied.
    /// If any check fails the whole batch is rejected with
    /// [`StoreError::VersionConflict`] and nothing is written.
    fn commit(&self, writes: DocumentWrites) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Blanket implementation allowing `DocumentStore` to work with references.
impl<T: DocumentStore + Sync> DocumentStore for &T {
    async fn load<D: Document>(&self, id: &D::Id) -> StoreResult<Option<Versioned<D>>> {
        (*self).load(id).await
    }

    async fn load_all<D: Document>(&self) -> StoreResult<Vec<Versioned<D>>> {
        (*self).load_all().await
    }

    async fn commit(&self, writes: DocumentWrites) -> StoreResult<()> {
        (*self).commit(writes).await
    }
}

impl<T: DocumentStore + Send + Sync> DocumentStore for Arc<T> {
    async fn load<D: Document>(&self, id: &D::Id) -> StoreResult<Option<Versioned<D>>> {
        self.as_ref().load(id).await
    }

    async fn load_all<D: Document>(&self) -> StoreResult<Vec<Versioned<D>>> {
        self.as_ref().load_all().await
    }

    async fn commit(&self, writes: DocumentWrites) -> StoreResult<()> {
        self.as_ref().commit(writes).await
    }
}

/// Deserialize a stored body into a document, attributing failures to `key`.
pub fn decode_document<D: Document>(key: &DocumentKey, body: Value) -> StoreResult<D> {
    serde_json::from_value(body).map_err(|error| StoreError::DeserializationFailed {
        key: key.clone(),
        detail: error.to_string(),
    })
}
