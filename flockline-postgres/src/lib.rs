//! PostgreSQL implementation of the Flockline [`DocumentStore`].
//!
//! Documents live in a single `flockline_documents` table keyed by
//! `(collection, id)`, with a `version` column carrying the optimistic
//! concurrency counter. A batch is applied in one transaction using
//! conditional statements, so a stale expectation matches zero rows and
//! rolls the whole batch back.

use std::num::NonZeroU32;
use std::time::Duration;

use flockline::store::{
    decode_document, Document, DocumentKey, DocumentStore, DocumentVersion, DocumentWrite,
    DocumentWrites, ExpectedVersion, Versioned, WriteOperation,
};
use flockline::{StoreError, StoreResult};
use nutype::nutype;
use serde_json::Value;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{query, Pool, Postgres, Row};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Errors raised while setting up a [`PostgresDocumentStore`].
#[derive(Debug, Error)]
pub enum PostgresDocumentStoreError {
    /// The connection pool could not be created.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),
    /// The database did not answer a trivial query.
    #[error("postgres ping failed")]
    PingFailed(#[source] sqlx::Error),
    /// Schema migrations could not be applied.
    #[error("postgres migration failed")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}

/// Maximum number of database connections in the pool.
///
/// Must be at least 1, enforced by the `NonZeroU32` underlying type.
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(NonZeroU32);

/// Connection pool settings for [`PostgresDocumentStore`].
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: NonZeroU32 = match NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Document store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Pool<Postgres>,
}

impl PostgresDocumentStore {
    /// Connects with the default configuration.
    pub async fn new<S: Into<String>>(
        connection_string: S,
    ) -> Result<Self, PostgresDocumentStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Connects with a custom pool configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresDocumentStoreError> {
        let connection_string = connection_string.into();
        let max_connections: NonZeroU32 = config.max_connections.into();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&connection_string)
            .await
            .map_err(PostgresDocumentStoreError::ConnectionFailed)?;
        Ok(Self { pool })
    }

    /// Wraps an existing connection pool.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Checks that the database answers.
    pub async fn ping(&self) -> Result<(), PostgresDocumentStoreError> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(PostgresDocumentStoreError::PingFailed)
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), PostgresDocumentStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PostgresDocumentStoreError::MigrationFailed)
    }
}

fn to_version(raw: i64, key: &DocumentKey) -> StoreResult<DocumentVersion> {
    u64::try_from(raw)
        .map(DocumentVersion::new)
        .map_err(|_| StoreError::StoreFailure {
            operation: "decode_version",
            detail: format!("{key} has invalid version {raw}"),
        })
}

fn to_column(version: DocumentVersion) -> StoreResult<i64> {
    i64::try_from(version.into_inner()).map_err(|_| StoreError::StoreFailure {
        operation: "encode_version",
        detail: format!("version {version} does not fit a BIGINT"),
    })
}

impl DocumentStore for PostgresDocumentStore {
    #[instrument(name = "postgres.load", skip(self, id), fields(collection = %D::COLLECTION))]
    async fn load<D: Document>(&self, id: &D::Id) -> StoreResult<Option<Versioned<D>>> {
        let key = DocumentKey::new(D::COLLECTION, id);
        let row = query("SELECT version, body FROM flockline_documents WHERE collection = $1 AND id = $2")
            .bind(key.collection.as_str())
            .bind(&key.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, "load", None))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let version: i64 = row
            .try_get("version")
            .map_err(|error| map_sqlx_error(error, "load", None))?;
        let body: Value = row
            .try_get("body")
            .map_err(|error| map_sqlx_error(error, "load", None))?;

        Ok(Some(Versioned {
            version: to_version(version, &key)?,
            document: decode_document(&key, body)?,
        }))
    }

    #[instrument(name = "postgres.load_all", skip(self), fields(collection = %D::COLLECTION))]
    async fn load_all<D: Document>(&self) -> StoreResult<Vec<Versioned<D>>> {
        let rows = query("SELECT id, version, body FROM flockline_documents WHERE collection = $1")
            .bind(D::COLLECTION.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, "load_all", None))?;

        debug!(rows = rows.len(), "[postgres.load_all] documents fetched");

        rows.into_iter()
            .map(|row| {
                let id: String = row
                    .try_get("id")
                    .map_err(|error| map_sqlx_error(error, "load_all", None))?;
                let version: i64 = row
                    .try_get("version")
                    .map_err(|error| map_sqlx_error(error, "load_all", None))?;
                let body: Value = row
                    .try_get("body")
                    .map_err(|error| map_sqlx_error(error, "load_all", None))?;
                let key = DocumentKey::new(D::COLLECTION, id);
                Ok(Versioned {
                    version: to_version(version, &key)?,
                    document: decode_document(&key, body)?,
                })
            })
            .collect()
    }

    #[instrument(name = "postgres.commit", skip(self, writes), fields(writes = writes.len()))]
    async fn commit(&self, writes: DocumentWrites) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        // A fixed lock order keeps overlapping batches from deadlocking.
        let mut entries = writes.into_entries();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx_error(error, "begin_transaction", None))?;

        for write in &entries {
            apply(&mut tx, write).await?;
        }

        tx.commit()
            .await
            .map_err(|error| map_sqlx_error(error, "commit_transaction", None))?;

        debug!(
            documents = entries.len(),
            "[postgres.commit] batch committed"
        );
        Ok(())
    }
}

/// Applies one write; a statement matching no row means the expectation failed.
async fn apply(conn: &mut PgConnection, write: &DocumentWrite) -> StoreResult<()> {
    let key = &write.key;
    let affected = match (&write.operation, write.expected) {
        (WriteOperation::Put(body), ExpectedVersion::New) => query(
            "INSERT INTO flockline_documents (collection, id, version, body)
             VALUES ($1, $2, 1, $3)
             ON CONFLICT (collection, id) DO NOTHING",
        )
        .bind(key.collection.as_str())
        .bind(&key.id)
        .bind(body)
        .execute(&mut *conn)
        .await,
        (WriteOperation::Put(body), ExpectedVersion::Exact(version)) => query(
            "UPDATE flockline_documents
             SET body = $3, version = version + 1, updated_at = now()
             WHERE collection = $1 AND id = $2 AND version = $4",
        )
        .bind(key.collection.as_str())
        .bind(&key.id)
        .bind(body)
        .bind(to_column(version)?)
        .execute(&mut *conn)
        .await,
        (WriteOperation::Delete, ExpectedVersion::Exact(version)) => query(
            "DELETE FROM flockline_documents
             WHERE collection = $1 AND id = $2 AND version = $3",
        )
        .bind(key.collection.as_str())
        .bind(&key.id)
        .bind(to_column(version)?)
        .execute(&mut *conn)
        .await,
        (WriteOperation::Delete, ExpectedVersion::New) => {
            // Deleting something expected not to exist only checks absence.
            return match current_version(conn, key).await? {
                None => Ok(()),
                current => Err(conflict(write, current)),
            };
        }
    }
    .map_err(|error| map_sqlx_error(error, "apply_write", Some(write)))?;

    if affected.rows_affected() == 1 {
        Ok(())
    } else {
        let current = current_version(conn, key).await?;
        Err(conflict(write, current))
    }
}

async fn current_version(
    conn: &mut PgConnection,
    key: &DocumentKey,
) -> StoreResult<Option<DocumentVersion>> {
    let version: Option<i64> = sqlx::query_scalar(
        "SELECT version FROM flockline_documents WHERE collection = $1 AND id = $2",
    )
    .bind(key.collection.as_str())
    .bind(&key.id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|error| map_sqlx_error(error, "current_version", None))?;

    version.map(|raw| to_version(raw, key)).transpose()
}

fn conflict(write: &DocumentWrite, current: Option<DocumentVersion>) -> StoreError {
    warn!(
        document = %write.key,
        expected = %write.expected,
        "[postgres.version_conflict] optimistic concurrency check failed"
    );
    StoreError::VersionConflict {
        key: write.key.clone(),
        expected: write.expected,
        current,
    }
}

/// Translates a driver error.
///
/// Unique violations (23505), serialization failures (40001) and deadlocks
/// (40P01) raised while applying a write are concurrency outcomes and become
/// version conflicts on that write. Pool and I/O failures become
/// `ConnectionFailed`; anything else is a `StoreFailure`.
fn map_sqlx_error(
    error: sqlx::Error,
    operation: &'static str,
    write: Option<&DocumentWrite>,
) -> StoreError {
    if let (sqlx::Error::Database(db_error), Some(write)) = (&error, write) {
        let code = db_error.code();
        if matches!(code.as_deref(), Some("23505" | "40001" | "40P01")) {
            return conflict(write, None);
        }
    }

    error!(
        error = %error,
        operation,
        "[postgres.database_error] database operation failed"
    );
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::ConnectionFailed(error.to_string())
        }
        other => StoreError::StoreFailure {
            operation,
            detail: other.to_string(),
        },
    }
}
