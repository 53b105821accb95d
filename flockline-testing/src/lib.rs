//! Testing support for Flockline document store backends.
//!
//! [`contract`] holds the behavioural scenarios every
//! [`DocumentStore`](flockline::DocumentStore) implementation must pass, and
//! the [`document_store_contract_tests!`] macro that turns them into test
//! functions for a concrete backend.

#![forbid(unsafe_code)]

pub mod contract;
