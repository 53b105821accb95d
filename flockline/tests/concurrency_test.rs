mod common;

use common::*;
use flockline::catalog::{Category, Product};
use flockline::order::ChangeOrderStatus;
use flockline::store::DocumentStore;
use flockline::{CommandError, CommandExecutor, InMemoryDocumentStore, ProductId};
use futures::future::join_all;

async fn stock_in(store: &YieldingStore, product_id: ProductId) -> u32 {
    store
        .load::<Product>(&product_id)
        .await
        .expect("store read should succeed")
        .expect("product should exist")
        .document
        .stock
}

#[tokio::test]
async fn competing_orders_never_oversell() {
    // Given: 5 units in stock
    let memory = InMemoryDocumentStore::new();
    let seed = CommandExecutor::new(memory.clone());
    let product = create_product(&seed, draft("Kuroiler chicks", Category::Chicks, 5, 9_000)).await;
    let executor = CommandExecutor::new(YieldingStore::new(memory));

    // When: two agents order 4 each at the same time
    let first = place(agent(), &[(product.id, 4)]);
    let second = place(agent(), &[(product.id, 4)]);
    let results = join_all([executor.execute(&first), executor.execute(&second)]).await;

    // Then: exactly one wins and the loser sees the reduced stock
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(CommandError::InsufficientStock { available: 1, .. }))));
    assert_eq!(stock_in(executor.store(), product.id).await, 1);
}

#[tokio::test]
async fn orders_that_fit_together_all_succeed_after_retrying() {
    let memory = InMemoryDocumentStore::new();
    let seed = CommandExecutor::new(memory.clone());
    let product = create_product(&seed, draft("Starter crumble", Category::Feeds, 10, 1_500)).await;
    let executor = CommandExecutor::new(YieldingStore::new(memory));

    let first = place(agent(), &[(product.id, 3)]);
    let second = place(agent(), &[(product.id, 3)]);
    let results = join_all([executor.execute(&first), executor.execute(&second)]).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(stock_in(executor.store(), product.id).await, 4);
}

#[tokio::test]
async fn cancelling_while_ordering_keeps_stock_consistent() {
    let memory = InMemoryDocumentStore::new();
    let seed = CommandExecutor::new(memory.clone());
    let product = create_product(&seed, draft("Finisher pellets", Category::Feeds, 10, 2_000)).await;
    let owner = agent();
    let existing = seed
        .execute(&place(owner, &[(product.id, 6)]))
        .await
        .expect("order should succeed");
    let executor = CommandExecutor::new(YieldingStore::new(memory));

    let cancel = ChangeOrderStatus::cancel(owner, existing.id);
    let order = place(agent(), &[(product.id, 2)]);
    let (cancelled, placed) = tokio::join!(executor.execute(&cancel), executor.execute(&order));

    cancelled.expect("cancel should succeed after retrying");
    placed.expect("order should succeed after retrying");
    assert_eq!(stock_in(executor.store(), product.id).await, 8);
}
