use super::{optional_text, parse_id, required_text};
use crate::auth::AdminUser;
use crate::error::{validated, ApiError, ApiJson};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use flockline::catalog::{
    get_product, list_products, Category, CreateProduct, DeleteProduct, Product, ProductDraft,
    ProductPatch, SetStock, UpdateProduct,
};
use flockline::{Money, ProductId, ProductName, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index).post(create))
        .route("/{id}", get(show).put(update).delete(destroy))
        .route("/{id}/stock", put(set_stock))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    name: String,
    category: String,
    description: String,
    price: Decimal,
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    stock: u32,
    #[serde(default)]
    specifications: BTreeMap<String, String>,
    minimum_order: Option<u32>,
    is_available: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    name: Option<String>,
    category: Option<String>,
    description: Option<String>,
    price: Option<Decimal>,
    image_url: Option<String>,
    specifications: Option<BTreeMap<String, String>>,
    minimum_order: Option<u32>,
    is_available: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StockRequest {
    stock: u32,
}

#[derive(Debug, Serialize)]
struct Deleted {
    message: &'static str,
}

fn minimum_order(value: Option<u32>) -> Result<Option<Quantity>, ApiError> {
    value
        .map(|value| validated("minimumOrder", Quantity::new(value)))
        .transpose()
}

impl CreateRequest {
    fn into_draft(self) -> Result<ProductDraft, ApiError> {
        Ok(ProductDraft {
            name: validated("name", ProductName::try_new(self.name))?,
            category: self.category.parse::<Category>()?,
            description: required_text("description", self.description)?,
            price: validated("price", Money::new(self.price))?,
            image_url: self.image_url,
            stock: self.stock,
            specifications: self.specifications,
            minimum_order: minimum_order(self.minimum_order)?,
            is_available: self.is_available,
        })
    }
}

impl UpdateRequest {
    fn into_patch(self) -> Result<ProductPatch, ApiError> {
        Ok(ProductPatch {
            name: self
                .name
                .map(|name| validated("name", ProductName::try_new(name)))
                .transpose()?,
            category: self.category.map(|c| c.parse::<Category>()).transpose()?,
            description: optional_text("description", self.description)?,
            price: self
                .price
                .map(|price| validated("price", Money::new(price)))
                .transpose()?,
            image_url: self.image_url,
            specifications: self.specifications,
            minimum_order: minimum_order(self.minimum_order)?,
            is_available: self.is_available,
        })
    }
}

async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let category = query
        .category
        .filter(|c| !c.trim().is_empty())
        .map(|c| c.parse::<Category>())
        .transpose()?;
    Ok(Json(list_products(state.store(), category).await?))
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id: ProductId = parse_id(&id)?;
    Ok(Json(get_product(state.store(), product_id).await?))
}

async fn create(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    ApiJson(request): ApiJson<CreateRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let command = CreateProduct {
        actor,
        draft: request.into_draft()?,
    };
    let product = state.executor().execute(&command).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateRequest>,
) -> Result<Json<Product>, ApiError> {
    let command = UpdateProduct {
        actor,
        product_id: parse_id(&id)?,
        patch: request.into_patch()?,
    };
    Ok(Json(state.executor().execute(&command).await?))
}

async fn destroy(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Deleted>, ApiError> {
    let command = DeleteProduct {
        actor,
        product_id: parse_id(&id)?,
    };
    state.executor().execute(&command).await?;
    Ok(Json(Deleted {
        message: "Product removed",
    }))
}

async fn set_stock(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<StockRequest>,
) -> Result<Json<Product>, ApiError> {
    let command = SetStock {
        actor,
        product_id: parse_id(&id)?,
        stock: request.stock,
    };
    Ok(Json(state.executor().execute(&command).await?))
}
