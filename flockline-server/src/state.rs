//! Shared application state and the storage backend it runs on.

use crate::auth::TokenIssuer;
use flockline::{
    CommandExecutor, Document, DocumentStore, DocumentWrites, InMemoryDocumentStore, RetryConfig,
    StoreResult, Versioned,
};
use flockline_postgres::PostgresDocumentStore;
use std::sync::Arc;

/// The store selected at startup.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Process-local store; contents are lost on restart
    Memory(InMemoryDocumentStore),
    /// PostgreSQL-backed store
    Postgres(PostgresDocumentStore),
}

impl Backend {
    /// Short name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgres",
        }
    }
}

impl From<InMemoryDocumentStore> for Backend {
    fn from(store: InMemoryDocumentStore) -> Self {
        Self::Memory(store)
    }
}

impl From<PostgresDocumentStore> for Backend {
    fn from(store: PostgresDocumentStore) -> Self {
        Self::Postgres(store)
    }
}

impl DocumentStore for Backend {
    async fn load<D: Document>(&self, id: &D::Id) -> StoreResult<Option<Versioned<D>>> {
        match self {
            Self::Memory(store) => store.load(id).await,
            Self::Postgres(store) => store.load(id).await,
        }
    }

    async fn load_all<D: Document>(&self) -> StoreResult<Vec<Versioned<D>>> {
        match self {
            Self::Memory(store) => store.load_all().await,
            Self::Postgres(store) => store.load_all().await,
        }
    }

    async fn commit(&self, writes: DocumentWrites) -> StoreResult<()> {
        match self {
            Self::Memory(store) => store.commit(writes).await,
            Self::Postgres(store) => store.commit(writes).await,
        }
    }
}

/// State handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    executor: Arc<CommandExecutor<Backend>>,
    tokens: Arc<TokenIssuer>,
}

impl AppState {
    /// Builds the state around a store.
    pub fn new(store: impl Into<Backend>, retry: RetryConfig, tokens: TokenIssuer) -> Self {
        Self {
            executor: Arc::new(CommandExecutor::new(store.into()).with_retry_config(retry)),
            tokens: Arc::new(tokens),
        }
    }

    /// Runs commands with conflict retries.
    pub fn executor(&self) -> &CommandExecutor<Backend> {
        &self.executor
    }

    /// The store, for queries.
    pub fn store(&self) -> &Backend {
        self.executor.store()
    }

    /// Issues and verifies bearer tokens.
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }
}
