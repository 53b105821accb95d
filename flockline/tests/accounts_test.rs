mod common;

use common::*;
use flockline::catalog::Category;
use flockline::dashboard::dashboard_stats;
use flockline::order::{ChangeOrderStatus, OrderStatus};
use flockline::review::{list_reviews, list_reviews_for_product, CreateReview};
use flockline::user::{authenticate, get_user, RegisterUser, RoleProfile, INVALID_CREDENTIALS};
use flockline::{Actor, CommandError, Email, Password, ProductId, Rating, Role};

fn registration(email: &str) -> RegisterUser {
    RegisterUser {
        name: text("Hana Tesfaye"),
        email: Email::try_new(email).expect("valid email"),
        password: Password::try_new("layers-2024").expect("valid password"),
        phone: text("+251911000000"),
        profile: RoleProfile::Agent {
            company: text("Hawassa Farm Supplies"),
            address: text("Hawassa"),
        },
    }
}

#[tokio::test]
async fn registered_agents_can_log_in_with_their_role() {
    let executor = executor();
    let user = executor
        .execute(&registration("hana@example.com"))
        .await
        .expect("registration should succeed");

    let logged_in = authenticate(
        executor.store(),
        &Email::try_new("HANA@example.com").expect("valid email"),
        &Password::try_new("layers-2024").expect("valid password"),
        Role::Agent,
    )
    .await
    .expect("matching credentials log in");

    assert_eq!(logged_in.id, user.id);
    assert_eq!(
        get_user(executor.store(), user.id)
            .await
            .expect("user exists")
            .role(),
        Role::Agent
    );
}

#[tokio::test]
async fn wrong_password_or_role_gets_the_same_answer() {
    let executor = executor();
    executor
        .execute(&registration("abel@example.com"))
        .await
        .expect("registration should succeed");
    let email = Email::try_new("abel@example.com").expect("valid email");

    let wrong_role = authenticate(
        executor.store(),
        &email,
        &Password::try_new("layers-2024").expect("valid password"),
        Role::Admin,
    )
    .await;
    let wrong_password = authenticate(
        executor.store(),
        &email,
        &Password::try_new("not-the-one").expect("valid password"),
        Role::Agent,
    )
    .await;
    let unknown = authenticate(
        executor.store(),
        &Email::try_new("nobody@example.com").expect("valid email"),
        &Password::try_new("layers-2024").expect("valid password"),
        Role::Agent,
    )
    .await;

    let expected = CommandError::Unauthorized(INVALID_CREDENTIALS.to_string());
    assert_eq!(wrong_role, Err(expected.clone()));
    assert_eq!(wrong_password, Err(expected.clone()));
    assert_eq!(unknown, Err(expected));
}

#[tokio::test]
async fn emails_are_unique_regardless_of_case() {
    let executor = executor();
    executor
        .execute(&registration("sara@example.com"))
        .await
        .expect("first registration succeeds");

    let duplicate = executor.execute(&registration("Sara@Example.com")).await;

    assert_eq!(
        duplicate.map(|user| user.id),
        Err(CommandError::BusinessRuleViolation(
            "User already exists".to_string()
        ))
    );
}

#[tokio::test]
async fn reviews_require_an_existing_product() {
    let executor = executor();
    let product = create_product(&executor, draft("Layer mash", Category::Feeds, 10, 2_500)).await;
    let author = agent();
    let review = |product_id| CreateReview {
        actor: author,
        product_id,
        rating: Rating::try_new(4).expect("valid rating"),
        comment: text("Good laying rate"),
    };

    executor
        .execute(&review(product.id))
        .await
        .expect("review of an existing product succeeds");
    let missing = executor.execute(&review(ProductId::new())).await;

    assert!(matches!(missing, Err(CommandError::NotFound { entity: "Product", .. })));
    let reviews = list_reviews_for_product(executor.store(), product.id)
        .await
        .expect("listing should succeed");
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].user_id, author.user_id);
    assert!(matches!(
        list_reviews(executor.store(), &author).await,
        Err(CommandError::Forbidden(_))
    ));
}

#[test]
fn ratings_outside_one_to_five_are_rejected() {
    assert!(Rating::try_new(0).is_err());
    assert!(Rating::try_new(6).is_err());
}

#[tokio::test]
async fn dashboard_counts_only_live_orders() {
    // Given: one delivered chick order, one pending feed order and one denied order
    let executor = executor();
    executor
        .execute(&registration("agent@example.com"))
        .await
        .expect("registration should succeed");
    let chicks = create_product(&executor, draft("Sasso chicks", Category::Chicks, 100, 10_000)).await;
    let feed = create_product(&executor, draft("Layer mash", Category::Feeds, 50, 2_000)).await;

    let delivered = executor
        .execute(&place(agent(), &[(chicks.id, 10)]))
        .await
        .expect("order should succeed");
    deliver(&executor, delivered.id).await;
    executor
        .execute(&place(agent(), &[(feed.id, 5)]))
        .await
        .expect("order should succeed");
    let denied = executor
        .execute(&place(agent(), &[(chicks.id, 20)]))
        .await
        .expect("order should succeed");
    let denied = executor
        .execute(&ChangeOrderStatus::deny(admin(), denied.id))
        .await
        .expect("admin denies");
    assert_eq!(denied.status, OrderStatus::Denied);

    // When
    let stats = dashboard_stats(executor.store(), &admin())
        .await
        .expect("admin sees the dashboard");

    // Then
    assert_eq!(stats.total_revenue, birr(110_000));
    assert_eq!(stats.total_agents, 1);
    assert_eq!(stats.chicks_ordered, 10);
    assert_eq!(stats.chicks_delivered, 10);
    assert_eq!(stats.feeds_sold, 5);
    assert_eq!(stats.stock_available, 90 + 45);
    assert_eq!(stats.revenue_data.labels.len(), 7);
    assert_eq!(stats.referral_stats.len(), 4);
}

#[tokio::test]
async fn dashboard_is_for_admins_only() {
    let executor = executor();
    let caller: Actor = agent();

    let result = dashboard_stats(executor.store(), &caller).await;

    assert!(matches!(result, Err(CommandError::Forbidden(_))));
}
