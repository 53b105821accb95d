//! HTTP API for `Flockline`.
//!
//! An axum [`Router`](axum::Router) over the `flockline` commands and
//! queries. Requests carry HS256 bearer tokens; guards resolve them to an
//! [`Actor`](flockline::Actor) before any command runs, and command failures
//! are mapped to status codes by [`ApiError`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod error;
mod routes;
pub mod state;
pub mod telemetry;

pub use auth::{AdminUser, AgentUser, AuthUser, Claims, TokenIssuer};
pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, Backend};
