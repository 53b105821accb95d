//! `Flockline` - order, inventory and return workflows for poultry supply
//!
//! Agents order day-old chicks and feeds; administrators approve, fulfil and
//! ship orders and settle returns. Every state change is a [`Command`] that
//! reads the documents it needs, decides, and hands back one batch of
//! versioned writes. The [`CommandExecutor`] commits that batch atomically and
//! retries the command when another writer got there first, so stock counters
//! never go negative and are never double-counted.
//!
//! Storage is abstracted behind [`DocumentStore`]. [`InMemoryDocumentStore`]
//! ships with this crate; a PostgreSQL implementation lives in
//! `flockline-postgres`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod actor;
pub mod catalog;
pub mod dashboard;
pub mod errors;
pub mod executor;
pub mod inventory;
pub mod memory;
pub mod order;
pub mod returns;
pub mod review;
pub mod store;
pub mod types;
pub mod user;

pub use actor::{Actor, Role};
pub use errors::{CommandError, CommandResult, StoreError, StoreResult};
pub use executor::{
    Command, CommandExecutor, Decision, MaxRetryAttempts, RetryBaseDelayMs, RetryConfig,
    RetryPolicy,
};
pub use memory::InMemoryDocumentStore;
pub use store::{
    decode_document, Collection, Document, DocumentKey, DocumentStore, DocumentVersion,
    DocumentWrite, DocumentWrites, ExpectedVersion, Versioned, WriteOperation,
};
pub use types::{
    Email, Money, OrderId, Password, ProductId, ProductName, Quantity, Rating, RequiredText,
    ReturnId, ReviewId, Timestamp, UserId, ValueError,
};
