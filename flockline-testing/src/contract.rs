//! Document store contract scenarios.
//!
//! Every scenario builds its own documents under fresh UUID ids, so the suite
//! can run in parallel against one shared database.

use flockline::store::{
    Collection, Document, DocumentStore, DocumentVersion, DocumentWrites, ExpectedVersion,
};
use flockline::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A failed contract scenario.
#[derive(Debug)]
pub struct ContractTestFailure {
    scenario: &'static str,
    detail: String,
}

impl ContractTestFailure {
    fn new(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scenario,
            detail: detail.into(),
        }
    }

    fn store_error(scenario: &'static str, operation: &'static str, error: StoreError) -> Self {
        Self::new(
            scenario,
            format!("{operation} operation returned unexpected error: {error}"),
        )
    }

    fn assertion(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self::new(scenario, detail)
    }
}

impl fmt::Display for ContractTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.detail)
    }
}

impl std::error::Error for ContractTestFailure {}

/// Outcome of one contract scenario.
pub type ContractTestResult = Result<(), ContractTestFailure>;

/// Document written by the scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDocument {
    id: String,
    counter: u32,
}

impl ContractDocument {
    fn new(id: &str, counter: u32) -> Self {
        Self {
            id: id.to_string(),
            counter,
        }
    }
}

impl Document for ContractDocument {
    type Id = String;
    const COLLECTION: Collection = Collection::Reviews;

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Document of a different collection, sharing ids with [`ContractDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherContractDocument {
    id: String,
    label: String,
}

impl Document for OtherContractDocument {
    type Id = String;
    const COLLECTION: Collection = Collection::Returns;

    fn id(&self) -> String {
        self.id.clone()
    }
}

fn contract_id(scenario: &'static str, label: &str) -> String {
    format!("contract-{scenario}-{label}-{}", Uuid::now_v7())
}

fn batch(
    scenario: &'static str,
    writes: DocumentWrites,
) -> Result<DocumentWrites, ContractTestFailure> {
    writes
        .build()
        .map_err(|error| ContractTestFailure::store_error(scenario, "build", error))
}

async fn commit<S: DocumentStore>(
    scenario: &'static str,
    store: &S,
    writes: DocumentWrites,
) -> ContractTestResult {
    store
        .commit(batch(scenario, writes)?)
        .await
        .map_err(|error| ContractTestFailure::store_error(scenario, "commit", error))
}

async fn version_of<S: DocumentStore>(
    scenario: &'static str,
    store: &S,
    id: &String,
) -> Result<Option<DocumentVersion>, ContractTestFailure> {
    store
        .load::<ContractDocument>(id)
        .await
        .map(|loaded| loaded.map(|versioned| versioned.version))
        .map_err(|error| ContractTestFailure::store_error(scenario, "load", error))
}

fn expect_conflict(
    scenario: &'static str,
    result: Result<(), StoreError>,
    what: &str,
) -> ContractTestResult {
    match result {
        Err(StoreError::VersionConflict { .. }) => Ok(()),
        Err(error) => Err(ContractTestFailure::store_error(scenario, "commit", error)),
        Ok(()) => Err(ContractTestFailure::assertion(
            scenario,
            format!("expected a version conflict but {what} succeeded"),
        )),
    }
}

/// Inserted documents load back at version 1; unknown ids load as `None`.
pub async fn test_basic_load_commit<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: DocumentStore + Send + Sync + 'static,
{
    const SCENARIO: &str = "basic_load_commit";

    let store = make_store();
    let id = contract_id(SCENARIO, "doc");
    let document = ContractDocument::new(&id, 7);

    commit(SCENARIO, &store, DocumentWrites::new().insert(&document)).await?;

    let loaded = store
        .load::<ContractDocument>(&id)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "load", error))?
        .ok_or_else(|| ContractTestFailure::assertion(SCENARIO, "inserted document is missing"))?;

    if loaded.version != DocumentVersion::initial() {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected version 1 after insert, observed {}", loaded.version),
        ));
    }
    if loaded.document != document {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("document changed in storage: {:?}", loaded.document),
        ));
    }

    let missing = version_of(SCENARIO, &store, &contract_id(SCENARIO, "missing")).await?;
    if missing.is_some() {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "unknown id loaded as an existing document",
        ));
    }
    Ok(())
}

/// Stale and duplicate writes are rejected; a current version is accepted and
/// bumped.
pub async fn test_version_conflicts<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: DocumentStore + Send + Sync + 'static,
{
    const SCENARIO: &str = "version_conflicts";

    let store = make_store();
    let id = contract_id(SCENARIO, "shared");
    let initial = DocumentVersion::initial();

    commit(SCENARIO, &store, DocumentWrites::new().insert(&ContractDocument::new(&id, 1))).await?;

    let duplicate_insert = store
        .commit(batch(SCENARIO, DocumentWrites::new().insert(&ContractDocument::new(&id, 2)))?)
        .await;
    expect_conflict(SCENARIO, duplicate_insert, "a second insert")?;

    commit(
        SCENARIO,
        &store,
        DocumentWrites::new().update(&ContractDocument::new(&id, 3), initial),
    )
    .await?;

    let stale_update = store
        .commit(batch(
            SCENARIO,
            DocumentWrites::new().update(&ContractDocument::new(&id, 4), initial),
        )?)
        .await;
    expect_conflict(SCENARIO, stale_update, "an update at a stale version")?;

    let current = version_of(SCENARIO, &store, &id).await?;
    if current != Some(initial.next()) {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected version 2 after one update, observed {current:?}"),
        ));
    }
    Ok(())
}

/// A batch with one failing expectation writes nothing.
pub async fn test_conflict_preserves_atomicity<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: DocumentStore + Send + Sync + 'static,
{
    const SCENARIO: &str = "conflict_preserves_atomicity";

    let store = make_store();
    let existing = contract_id(SCENARIO, "existing");
    let fresh = contract_id(SCENARIO, "fresh");

    commit(
        SCENARIO,
        &store,
        DocumentWrites::new().insert(&ContractDocument::new(&existing, 1)),
    )
    .await?;

    let mixed = batch(
        SCENARIO,
        DocumentWrites::new()
            .insert(&ContractDocument::new(&fresh, 1))
            .update(
                &ContractDocument::new(&existing, 2),
                DocumentVersion::initial().next(),
            ),
    )?;
    expect_conflict(SCENARIO, store.commit(mixed).await, "a batch with a stale write")?;

    if version_of(SCENARIO, &store, &fresh).await?.is_some() {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "insert from a rejected batch was persisted",
        ));
    }
    let untouched = store
        .load::<ContractDocument>(&existing)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "load", error))?;
    match untouched {
        Some(doc) if doc.version == DocumentVersion::initial() && doc.document.counter == 1 => Ok(()),
        other => Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("existing document changed by a rejected batch: {other:?}"),
        )),
    }
}

/// Deletes are versioned, and a deleted id can be inserted again.
pub async fn test_delete<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: DocumentStore + Send + Sync + 'static,
{
    const SCENARIO: &str = "delete";

    let store = make_store();
    let id = contract_id(SCENARIO, "doc");
    let document = ContractDocument::new(&id, 1);

    commit(SCENARIO, &store, DocumentWrites::new().insert(&document)).await?;

    let stale_delete = store
        .commit(batch(
            SCENARIO,
            DocumentWrites::new().delete(&document, DocumentVersion::initial().next()),
        )?)
        .await;
    expect_conflict(SCENARIO, stale_delete, "a delete at a stale version")?;

    commit(
        SCENARIO,
        &store,
        DocumentWrites::new().delete(&document, DocumentVersion::initial()),
    )
    .await?;
    if version_of(SCENARIO, &store, &id).await?.is_some() {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "deleted document still loads",
        ));
    }

    commit(SCENARIO, &store, DocumentWrites::new().insert(&document)).await?;
    let reinserted = version_of(SCENARIO, &store, &id).await?;
    if reinserted != Some(DocumentVersion::initial()) {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected reinsert at version 1, observed {reinserted:?}"),
        ));
    }
    Ok(())
}

/// Equal ids in different collections are different documents.
pub async fn test_collection_isolation<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: DocumentStore + Send + Sync + 'static,
{
    const SCENARIO: &str = "collection_isolation";

    let store = make_store();
    let id = contract_id(SCENARIO, "shared");
    let other = OtherContractDocument {
        id: id.clone(),
        label: "other".to_string(),
    };

    commit(
        SCENARIO,
        &store,
        DocumentWrites::new()
            .insert(&ContractDocument::new(&id, 5))
            .insert(&other),
    )
    .await?;

    let listed = store
        .load_all::<ContractDocument>()
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "load_all", error))?;
    let matching = listed.iter().filter(|doc| doc.document.id == id).count();
    if matching != 1 {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected exactly one listed document with the shared id, observed {matching}"),
        ));
    }

    let loaded_other = store
        .load::<OtherContractDocument>(&id)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "load", error))?;
    match loaded_other {
        Some(doc) if doc.document == other => Ok(()),
        unexpected => Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("other collection returned {unexpected:?}"),
        )),
    }
}

/// Of two concurrent updates from the same version, exactly one commits.
pub async fn test_concurrent_updates<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: DocumentStore + Send + Sync + 'static,
{
    const SCENARIO: &str = "concurrent_updates";

    let store = make_store();
    let id = contract_id(SCENARIO, "contended");
    let initial = DocumentVersion::initial();

    commit(SCENARIO, &store, DocumentWrites::new().insert(&ContractDocument::new(&id, 0))).await?;

    let left = batch(
        SCENARIO,
        DocumentWrites::new().put(&ContractDocument::new(&id, 1), ExpectedVersion::Exact(initial)),
    )?;
    let right = batch(
        SCENARIO,
        DocumentWrites::new().put(&ContractDocument::new(&id, 2), ExpectedVersion::Exact(initial)),
    )?;
    let (left, right) = tokio::join!(store.commit(left), store.commit(right));

    match (left, right) {
        (Ok(()), Err(StoreError::VersionConflict { .. }))
        | (Err(StoreError::VersionConflict { .. }), Ok(())) => Ok(()),
        (left, right) => Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected exactly one winner, observed {left:?} and {right:?}"),
        )),
    }
}

/// Generates one test per contract scenario for a store factory.
#[macro_export]
macro_rules! document_store_contract_tests {
    (suite = $suite:ident, make_store = $make_store:expr $(,)?) => {
        #[allow(non_snake_case)]
        mod $suite {
            use $crate::contract::{
                test_basic_load_commit, test_collection_isolation, test_concurrent_updates,
                test_conflict_preserves_atomicity, test_delete, test_version_conflicts,
            };

            #[tokio::test(flavor = "multi_thread")]
            async fn basic_load_commit_contract() {
                test_basic_load_commit($make_store)
                    .await
                    .expect("document store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn version_conflicts_contract() {
                test_version_conflicts($make_store)
                    .await
                    .expect("document store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn conflict_preserves_atomicity_contract() {
                test_conflict_preserves_atomicity($make_store)
                    .await
                    .expect("document store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn delete_contract() {
                test_delete($make_store)
                    .await
                    .expect("document store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn collection_isolation_contract() {
                test_collection_isolation($make_store)
                    .await
                    .expect("document store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn concurrent_updates_contract() {
                test_concurrent_updates($make_store)
                    .await
                    .expect("document store contract failed");
            }
        }
    };
}

pub use document_store_contract_tests;
