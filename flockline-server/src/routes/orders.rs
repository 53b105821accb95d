use super::{optional_text, parse_id, required_text, ItemRequest};
use crate::auth::{AdminUser, AuthUser};
use crate::error::{ApiError, ApiJson};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use flockline::order::{
    get_order, list_orders, list_orders_for_user, ChangeOrderStatus, DeleteOrder, Order, OrderLine,
    OrderStatus, PaymentMethod, PlaceOrder, ShippingAddress, UpdateOrder, UpdateShipment,
};
use flockline::{Actor, OrderId};
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/myorders", get(mine))
        .route("/{id}", get(show).put(update).delete(destroy))
        .route("/{id}/status", put(set_status))
        .route("/{id}/confirm", put(confirm))
        .route("/{id}/deny", put(deny))
        .route("/{id}/cancel", put(cancel))
        .route("/{id}/shipment", patch(ship))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressRequest {
    street: String,
    city: String,
    region: String,
    country: Option<String>,
}

impl AddressRequest {
    fn parse(self) -> Result<ShippingAddress, ApiError> {
        Ok(ShippingAddress::new(
            required_text("shippingAddress.street", self.street)?,
            required_text("shippingAddress.city", self.city)?,
            required_text("shippingAddress.region", self.region)?,
            optional_text("shippingAddress.country", self.country)?,
        )?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    #[serde(default)]
    order_items: Vec<ItemRequest>,
    shipping_address: AddressRequest,
    payment_method: PaymentMethod,
    delivery_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    order_items: Option<Vec<ItemRequest>>,
    shipping_address: Option<AddressRequest>,
    payment_method: Option<PaymentMethod>,
    delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: OrderStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentRequest {
    tracking_number: String,
    carrier: String,
}

#[derive(Debug, Serialize)]
struct Deleted {
    message: &'static str,
}

fn order_lines(items: Vec<ItemRequest>) -> Result<Vec<OrderLine>, ApiError> {
    items
        .into_iter()
        .map(|item| {
            let (product_id, quantity) = item.parse("orderItems")?;
            Ok(OrderLine {
                product_id,
                quantity,
            })
        })
        .collect()
}

async fn create(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(request): ApiJson<CreateRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let command = PlaceOrder {
        actor,
        lines: order_lines(request.order_items)?,
        shipping_address: request.shipping_address.parse()?,
        payment_method: request.payment_method,
        delivery_date: request.delivery_date,
    };
    let order = state.executor().execute(&command).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn index(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(list_orders(state.store(), &actor).await?))
}

async fn mine(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(list_orders_for_user(state.store(), actor.user_id).await?))
}

async fn show(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(get_order(state.store(), &actor, order_id).await?))
}

async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateRequest>,
) -> Result<Json<Order>, ApiError> {
    let command = UpdateOrder {
        actor,
        order_id: parse_id(&id)?,
        lines: request.order_items.map(order_lines).transpose()?,
        shipping_address: request
            .shipping_address
            .map(AddressRequest::parse)
            .transpose()?,
        payment_method: request.payment_method,
        delivery_date: request.delivery_date,
    };
    Ok(Json(state.executor().execute(&command).await?))
}

async fn destroy(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Deleted>, ApiError> {
    let command = DeleteOrder {
        actor,
        order_id: parse_id(&id)?,
    };
    state.executor().execute(&command).await?;
    Ok(Json(Deleted {
        message: "Order removed",
    }))
}

async fn change_status(
    state: &AppState,
    actor: Actor,
    id: &str,
    status: OrderStatus,
) -> Result<Json<Order>, ApiError> {
    let command = ChangeOrderStatus {
        actor,
        order_id: parse_id(id)?,
        status,
    };
    Ok(Json(state.executor().execute(&command).await?))
}

async fn set_status(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<StatusRequest>,
) -> Result<Json<Order>, ApiError> {
    change_status(&state, actor, &id, request.status).await
}

async fn confirm(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    change_status(&state, actor, &id, OrderStatus::Confirmed).await
}

async fn deny(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    change_status(&state, actor, &id, OrderStatus::Denied).await
}

async fn cancel(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    change_status(&state, actor, &id, OrderStatus::Cancelled).await
}

async fn ship(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<ShipmentRequest>,
) -> Result<Json<Order>, ApiError> {
    let command = UpdateShipment {
        actor,
        order_id: parse_id(&id)?,
        tracking_number: required_text("trackingNumber", request.tracking_number)?,
        carrier: required_text("carrier", request.carrier)?,
    };
    Ok(Json(state.executor().execute(&command).await?))
}
