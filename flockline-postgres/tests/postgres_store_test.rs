//! Integration tests against a real PostgreSQL. They need Docker and are
//! ignored by default; run them with `cargo test -p flockline-postgres -- --ignored`.

mod common;

use chrono::NaiveDate;
use common::PostgresTestFixture;
use flockline::catalog::{Category, CreateProduct, Product, ProductDraft};
use flockline::order::{OrderLine, PaymentMethod, PlaceOrder, ShippingAddress};
use flockline::store::DocumentStore;
use flockline::{
    Actor, CommandError, CommandExecutor, Money, ProductName, Quantity, RequiredText, Role, UserId,
};
use flockline_testing::contract::{
    test_basic_load_commit, test_collection_isolation, test_concurrent_updates,
    test_conflict_preserves_atomicity, test_delete, test_version_conflicts,
};
use std::collections::BTreeMap;

fn text(value: &str) -> RequiredText {
    RequiredText::try_new(value).expect("valid text")
}

fn place(product: &Product, quantity: u32) -> PlaceOrder {
    PlaceOrder {
        actor: Actor::new(UserId::new(), Role::Agent),
        lines: vec![OrderLine {
            product_id: product.id,
            quantity: Quantity::new(quantity).expect("valid quantity"),
        }],
        shipping_address: ShippingAddress::new(text("Piassa 3"), text("Gondar"), text("Amhara"), None)
            .expect("valid address"),
        payment_method: PaymentMethod::CbeTransfer,
        delivery_date: NaiveDate::from_ymd_opt(2026, 12, 1).expect("valid date"),
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires docker"]
async fn postgres_store_satisfies_the_contract() {
    let fixture = PostgresTestFixture::new().await;
    let store = fixture.store.clone();
    let make_store = move || store.clone();

    test_basic_load_commit(make_store.clone())
        .await
        .expect("document store contract failed");
    test_version_conflicts(make_store.clone())
        .await
        .expect("document store contract failed");
    test_conflict_preserves_atomicity(make_store.clone())
        .await
        .expect("document store contract failed");
    test_delete(make_store.clone())
        .await
        .expect("document store contract failed");
    test_collection_isolation(make_store.clone())
        .await
        .expect("document store contract failed");
    test_concurrent_updates(make_store)
        .await
        .expect("document store contract failed");
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires docker"]
async fn competing_orders_never_oversell_in_postgres() {
    // Given: 5 units in stock
    let fixture = PostgresTestFixture::new().await;
    let executor = CommandExecutor::new(fixture.store.clone());
    let product = executor
        .execute(&CreateProduct {
            actor: Actor::new(UserId::new(), Role::Admin),
            draft: ProductDraft {
                name: ProductName::try_new("Kuroiler chicks").expect("valid name"),
                category: Category::Chicks,
                description: text("Dual purpose"),
                price: Money::from_cents(9_000).expect("valid price"),
                image_url: String::new(),
                stock: 5,
                specifications: BTreeMap::new(),
                minimum_order: None,
                is_available: None,
            },
        })
        .await
        .expect("product should be created");

    // When: two orders of 4 race from separate tasks
    let first = {
        let executor = CommandExecutor::new(fixture.store.clone());
        let command = place(&product, 4);
        tokio::spawn(async move { executor.execute(&command).await })
    };
    let second = {
        let executor = CommandExecutor::new(fixture.store.clone());
        let command = place(&product, 4);
        tokio::spawn(async move { executor.execute(&command).await })
    };
    let results = [
        first.await.expect("task should not panic"),
        second.await.expect("task should not panic"),
    ];

    // Then: exactly one order is placed and stock never goes negative
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(CommandError::InsufficientStock { .. }))));
    let stored = fixture
        .store
        .load::<Product>(&product.id)
        .await
        .expect("load should succeed")
        .expect("product should exist");
    assert_eq!(stored.document.stock, 1);
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires docker"]
async fn ping_and_repeated_migrations_succeed() {
    let fixture = PostgresTestFixture::new().await;

    fixture.store.ping().await.expect("ping should succeed");
    fixture
        .store
        .migrate()
        .await
        .expect("migrations are idempotent");
}
