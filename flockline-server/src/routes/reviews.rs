use super::{parse_id, required_text};
use crate::auth::{AdminUser, AgentUser};
use crate::error::{validated, ApiError, ApiJson};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use flockline::review::{list_reviews, list_reviews_for_product, CreateReview, Review};
use flockline::{ProductId, Rating};
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/product/{id}", get(for_product))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    product: String,
    rating: u8,
    comment: String,
}

async fn create(
    State(state): State<AppState>,
    AgentUser(actor): AgentUser,
    ApiJson(request): ApiJson<CreateRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let command = CreateReview {
        actor,
        product_id: validated("product", request.product.parse::<ProductId>())?,
        rating: validated("rating", Rating::try_new(request.rating))?,
        comment: required_text("comment", request.comment)?,
    };
    let review = state.executor().execute(&command).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn for_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    Ok(Json(list_reviews_for_product(state.store(), product_id).await?))
}

async fn index(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
) -> Result<Json<Vec<Review>>, ApiError> {
    Ok(Json(list_reviews(state.store(), &actor).await?))
}
