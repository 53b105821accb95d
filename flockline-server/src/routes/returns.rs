use super::{parse_id, required_text, ItemRequest};
use crate::auth::{AdminUser, AgentUser};
use crate::error::{validated, ApiError, ApiJson};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use flockline::returns::{
    list_returns, list_returns_for_user, ConfirmReturnReceived, DeliveryMethod, RequestReturn,
    ReturnLine, ReturnOrder, ReturnStatus, UpdateReturnStatus,
};
use flockline::OrderId;
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/myreturns", get(mine))
        .route("/{id}/status", put(set_status))
        .route("/{id}/received", put(received))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    order_id: String,
    reason: String,
    #[serde(default)]
    items: Vec<ItemRequest>,
    delivery_method: DeliveryMethod,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest {
    status: ReturnStatus,
    admin_notes: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    AgentUser(actor): AgentUser,
    ApiJson(request): ApiJson<CreateRequest>,
) -> Result<(StatusCode, Json<ReturnOrder>), ApiError> {
    let lines = request
        .items
        .into_iter()
        .map(|item| {
            let (product_id, quantity) = item.parse("items")?;
            Ok(ReturnLine {
                product_id,
                quantity,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let command = RequestReturn {
        actor,
        order_id: validated("orderId", request.order_id.parse::<OrderId>())?,
        reason: required_text("reason", request.reason)?,
        lines,
        delivery_method: request.delivery_method,
    };
    let created = state.executor().execute(&command).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn index(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
) -> Result<Json<Vec<ReturnOrder>>, ApiError> {
    Ok(Json(list_returns(state.store(), &actor).await?))
}

async fn mine(
    State(state): State<AppState>,
    AgentUser(actor): AgentUser,
) -> Result<Json<Vec<ReturnOrder>>, ApiError> {
    Ok(Json(list_returns_for_user(state.store(), actor.user_id).await?))
}

async fn set_status(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<StatusRequest>,
) -> Result<Json<ReturnOrder>, ApiError> {
    let command = UpdateReturnStatus {
        actor,
        return_id: parse_id(&id)?,
        status: request.status,
        admin_notes: request.admin_notes.filter(|notes| !notes.trim().is_empty()),
    };
    Ok(Json(state.executor().execute(&command).await?))
}

async fn received(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<ReturnOrder>, ApiError> {
    let command = ConfirmReturnReceived {
        actor,
        return_id: parse_id(&id)?,
    };
    Ok(Json(state.executor().execute(&command).await?))
}
