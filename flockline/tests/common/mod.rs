//! Shared fixtures for the workflow tests.

#![allow(dead_code)]

use chrono::NaiveDate;
use flockline::catalog::{Category, CreateProduct, Product, ProductDraft};
use flockline::order::{
    ChangeOrderStatus, Order, OrderLine, OrderStatus, PaymentMethod, PlaceOrder, ShippingAddress,
    UpdateShipment,
};
use flockline::store::{DocumentStore, DocumentWrites, Versioned};
use flockline::{
    Actor, CommandExecutor, Document, InMemoryDocumentStore, Money, OrderId, ProductId,
    ProductName, Quantity, RequiredText, Role, StoreResult, UserId,
};
use std::collections::BTreeMap;

pub type Executor = CommandExecutor<InMemoryDocumentStore>;

pub fn executor() -> Executor {
    CommandExecutor::new(InMemoryDocumentStore::new())
}

pub fn admin() -> Actor {
    Actor::new(UserId::new(), Role::Admin)
}

pub fn agent() -> Actor {
    Actor::new(UserId::new(), Role::Agent)
}

pub fn text(value: &str) -> RequiredText {
    RequiredText::try_new(value).expect("valid text")
}

pub fn qty(value: u32) -> Quantity {
    Quantity::new(value).expect("valid quantity")
}

pub fn birr(cents: u64) -> Money {
    Money::from_cents(cents).expect("valid amount")
}

pub fn draft(name: &str, category: Category, stock: u32, price_cents: u64) -> ProductDraft {
    ProductDraft {
        name: ProductName::try_new(name).expect("valid product name"),
        category,
        description: text("Test product"),
        price: birr(price_cents),
        image_url: String::new(),
        stock,
        specifications: BTreeMap::new(),
        minimum_order: None,
        is_available: None,
    }
}

pub async fn create_product(executor: &Executor, draft: ProductDraft) -> Product {
    executor
        .execute(&CreateProduct {
            actor: admin(),
            draft,
        })
        .await
        .expect("admin should be able to create a product")
}

pub async fn stock_of(executor: &Executor, product_id: ProductId) -> u32 {
    executor
        .store()
        .load::<Product>(&product_id)
        .await
        .expect("store read should succeed")
        .expect("product should exist")
        .document
        .stock
}

pub fn address() -> ShippingAddress {
    ShippingAddress::new(text("Bole Road 12"), text("Addis Ababa"), text("Addis Ababa"), None)
        .expect("valid address")
}

pub fn delivery_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 20).expect("valid date")
}

pub fn place(actor: Actor, lines: &[(ProductId, u32)]) -> PlaceOrder {
    PlaceOrder {
        actor,
        lines: lines
            .iter()
            .map(|&(product_id, quantity)| OrderLine {
                product_id,
                quantity: qty(quantity),
            })
            .collect(),
        shipping_address: address(),
        payment_method: PaymentMethod::Telebirr,
        delivery_date: delivery_date(),
    }
}

/// Walks an order from pending to delivered.
pub async fn deliver(executor: &Executor, order_id: OrderId) -> Order {
    let admin = admin();
    executor
        .execute(&ChangeOrderStatus::confirm(admin, order_id))
        .await
        .expect("pending order should confirm");
    executor
        .execute(&UpdateShipment {
            actor: admin,
            order_id,
            tracking_number: text("ET-1001"),
            carrier: text("Ethio Post"),
        })
        .await
        .expect("confirmed order should ship");
    executor
        .execute(&ChangeOrderStatus {
            actor: admin,
            order_id,
            status: OrderStatus::Delivered,
        })
        .await
        .expect("shipped order should be delivered")
}

/// Store wrapper that yields to the scheduler after every read, so commands
/// running concurrently on one task interleave between deciding and
/// committing.
#[derive(Debug, Clone, Default)]
pub struct YieldingStore {
    inner: InMemoryDocumentStore,
}

impl YieldingStore {
    pub fn new(inner: InMemoryDocumentStore) -> Self {
        Self { inner }
    }
}

impl DocumentStore for YieldingStore {
    async fn load<D: Document>(&self, id: &D::Id) -> StoreResult<Option<Versioned<D>>> {
        let loaded = self.inner.load(id).await;
        tokio::task::yield_now().await;
        loaded
    }

    async fn load_all<D: Document>(&self) -> StoreResult<Vec<Versioned<D>>> {
        let loaded = self.inner.load_all().await;
        tokio::task::yield_now().await;
        loaded
    }

    async fn commit(&self, writes: DocumentWrites) -> StoreResult<()> {
        self.inner.commit(writes).await
    }
}
