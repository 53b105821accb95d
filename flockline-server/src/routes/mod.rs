//! HTTP routes. Everything except the health check lives under `/api`.

mod accounts;
mod dashboard;
mod orders;
mod products;
mod returns;
mod reviews;

use crate::error::{validated, ApiError};
use crate::state::AppState;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use flockline::{ProductId, Quantity, RequiredText};
use serde::Deserialize;
use std::str::FromStr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/auth", accounts::routes())
        .nest("/products", products::routes())
        .nest("/orders", orders::routes())
        .nest("/returns", returns::routes())
        .nest("/reviews", reviews::routes())
        .nest("/admin", dashboard::routes());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Parses an id from a path segment.
fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    validated("id", raw.parse::<T>())
}

fn required_text(field: &str, value: String) -> Result<RequiredText, ApiError> {
    validated(field, RequiredText::try_new(value))
}

fn optional_text(field: &str, value: Option<String>) -> Result<Option<RequiredText>, ApiError> {
    value.map(|value| required_text(field, value)).transpose()
}

/// A `{product, quantity}` pair as sent by clients on orders and returns.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemRequest {
    product: String,
    quantity: u32,
}

impl ItemRequest {
    fn parse(self, field: &str) -> Result<(ProductId, Quantity), ApiError> {
        let product_id = validated(field, self.product.parse::<ProductId>())?;
        let quantity = validated(field, Quantity::new(self.quantity))?;
        Ok((product_id, quantity))
    }
}
