//! HTTP tests driving the router in-process.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use flockline::{InMemoryDocumentStore, RetryConfig};
use flockline_server::config::{JwtSecret, TokenTtlDays};
use flockline_server::{router, AppState, TokenIssuer};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let tokens = TokenIssuer::new(
        &JwtSecret::try_new("integration-test-secret").expect("valid secret"),
        TokenTtlDays::try_new(30).expect("valid ttl"),
    );
    router(AppState::new(
        InMemoryDocumentStore::new(),
        RetryConfig::default(),
        tokens,
    ))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body should be JSON")
    };
    (status, value)
}

async fn register_agent(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Hana Tesfaye",
            "email": email,
            "password": "layers-2024",
            "phone": "+251911000000",
            "role": "agent",
            "company": "Hawassa Farm Supplies",
            "address": "Hawassa"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().expect("token issued").to_string()
}

async fn register_admin(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Dawit Bekele",
            "email": "dawit@example.com",
            "password": "warehouse-1",
            "phone": "+251922000000",
            "role": "admin",
            "employeeId": "EMP-001",
            "department": "Logistics"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().expect("token issued").to_string()
}

async fn create_product(app: &Router, admin: &str, name: &str, category: &str, stock: u32) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/products",
        Some(admin),
        Some(json!({
            "name": name,
            "category": category,
            "description": "Vaccinated and ready for dispatch",
            "price": "100.00",
            "imageUrl": "/images/product.jpg",
            "stock": stock,
            "specifications": { "breed": "Sasso" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().expect("product id").to_string()
}

fn order_body(product: &str, quantity: u32) -> Value {
    json!({
        "orderItems": [{ "product": product, "quantity": quantity }],
        "shippingAddress": { "street": "Piassa 12", "city": "Hawassa", "region": "Sidama" },
        "paymentMethod": "TELEBIRR",
        "deliveryDate": "2026-11-20"
    })
}

async fn stock_of(app: &Router, product: &str) -> u64 {
    let (status, body) = send(app, Method::GET, &format!("/api/products/{product}"), None, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["stock"].as_u64().expect("stock is a number")
}

#[tokio::test]
async fn health_check_is_outside_the_api_prefix() {
    let app = app();
    let (status, _) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn registration_issues_a_token_that_logs_in_again() {
    let app = app();
    register_agent(&app, "hana@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "hana@example.com", "password": "layers-2024", "role": "agent" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["role"], "agent");
    assert_eq!(body["email"], "hana@example.com");
    assert!(body.get("passwordHash").is_none());

    let token = body["token"].as_str().expect("token issued");
    let (status, body) = send(&app, Method::GET, "/api/orders/myorders", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn logins_with_the_wrong_role_are_unauthorized() {
    let app = app();
    register_agent(&app, "abel@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "abel@example.com", "password": "layers-2024", "role": "admin" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email, password, or role combination");
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = app();
    register_agent(&app, "sara@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Sara",
            "email": "SARA@example.com",
            "password": "another-pass",
            "phone": "+251933000000",
            "role": "agent",
            "company": "Adama Poultry",
            "address": "Adama"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User already exists");
}

#[tokio::test]
async fn agents_must_supply_their_company() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Liya",
            "email": "liya@example.com",
            "password": "layers-2024",
            "phone": "+251944000000",
            "role": "agent",
            "address": "Bahir Dar"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "company");
}

#[tokio::test]
async fn guards_distinguish_missing_tokens_from_wrong_roles() {
    let app = app();
    let agent = register_agent(&app, "guard@example.com").await;

    let (status, _) = send(&app, Method::GET, "/api/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/orders", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::GET, "/api/orders", Some(&agent), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Not authorized as an admin");

    let (status, _) = send(&app, Method::GET, "/api/admin/dashboard", Some(&agent), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn products_are_public_and_filter_by_category() {
    let app = app();
    let admin = register_admin(&app).await;
    create_product(&app, &admin, "Sasso chicks", "chicks", 50).await;
    create_product(&app, &admin, "Layer mash", "feeds", 80).await;

    let (status, all) = send(&app, Method::GET, "/api/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let (status, feeds) = send(&app, Method::GET, "/api/products?category=feeds", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let feeds = feeds.as_array().expect("a list");
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0]["name"], "Layer mash");

    let (status, body) = send(&app, Method::GET, "/api/products?category=ducks", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "category");
}

#[tokio::test]
async fn orders_reserve_stock_and_refuse_to_oversell() {
    let app = app();
    let admin = register_admin(&app).await;
    let agent = register_agent(&app, "buyer@example.com").await;
    let product = create_product(&app, &admin, "Bovans brown pullets", "chicks", 10).await;

    let (status, order) = send(&app, Method::POST, "/api/orders", Some(&agent), Some(order_body(&product, 3))).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["orderItems"][0]["quantity"], 3);
    assert_eq!(order["orderItems"][0]["productId"], product.as_str());
    assert!(order.get("items").is_none());
    assert_eq!(stock_of(&app, &product).await, 7);

    let (status, body) = send(&app, Method::POST, "/api/orders", Some(&agent), Some(order_body(&product, 8))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Insufficient stock for Bovans brown pullets: requested 8, available 7"
    );
    assert_eq!(stock_of(&app, &product).await, 7);

    let empty = json!({
        "orderItems": [],
        "shippingAddress": { "street": "Piassa 12", "city": "Hawassa", "region": "Sidama" },
        "paymentMethod": "CBE_TRANSFER",
        "deliveryDate": "2026-11-20"
    });
    let (status, body) = send(&app, Method::POST, "/api/orders", Some(&agent), Some(empty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "orderItems");
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let app = app();
    let agent = register_agent(&app, "typo@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/orders",
        Some(&agent),
        Some(json!({ "orderItems": "lots" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn other_agents_cannot_see_an_order() {
    let app = app();
    let admin = register_admin(&app).await;
    let owner = register_agent(&app, "owner@example.com").await;
    let stranger = register_agent(&app, "stranger@example.com").await;
    let product = create_product(&app, &admin, "Starter crumble", "feeds", 20).await;
    let (_, order) = send(&app, Method::POST, "/api/orders", Some(&owner), Some(order_body(&product, 2))).await;
    let uri = format!("/api/orders/{}", order["id"].as_str().expect("order id"));

    let (status, _) = send(&app, Method::GET, &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock_of(&app, &product).await, 20);
    let (status, _) = send(&app, Method::GET, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delivered_orders_can_be_returned_and_restocked() {
    // Given: 3 units ordered out of 10 and delivered
    let app = app();
    let admin = register_admin(&app).await;
    let agent = register_agent(&app, "returns@example.com").await;
    let product = create_product(&app, &admin, "Kuroiler chicks", "chicks", 10).await;
    let (_, order) = send(&app, Method::POST, "/api/orders", Some(&agent), Some(order_body(&product, 3))).await;
    let order_id = order["id"].as_str().expect("order id").to_string();

    let (status, body) = send(&app, Method::PUT, &format!("/api/orders/{order_id}/deny"), Some(&agent), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    let (status, body) = send(&app, Method::PUT, &format!("/api/orders/{order_id}/confirm"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/orders/{order_id}/shipment"),
        Some(&admin),
        Some(json!({ "trackingNumber": "ET-5521", "carrier": "Ethio Post" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "shipped");
    assert_eq!(body["shippingDetails"]["trackingNumber"], "ET-5521");
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/orders/{order_id}/status"),
        Some(&admin),
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(stock_of(&app, &product).await, 7);

    // When: the agent returns 2 and the admin receives and completes it
    let (status, created) = send(
        &app,
        Method::POST,
        "/api/returns",
        Some(&agent),
        Some(json!({
            "orderId": order_id,
            "reason": "Weak on arrival",
            "items": [{ "product": product, "quantity": 2 }],
            "deliveryMethod": "company_pickup"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["status"], "pending");
    let return_id = created["id"].as_str().expect("return id").to_string();

    let (status, body) = send(&app, Method::PUT, &format!("/api/returns/{return_id}/received"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/returns/{return_id}/status"),
        Some(&admin),
        Some(json!({ "status": "completed", "adminNotes": "Collected in Hawassa" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // Then: stock is back to 9 and further status changes are refused
    assert_eq!(body["restocked"], true);
    assert_eq!(body["refundStatus"], "completed");
    assert_eq!(stock_of(&app, &product).await, 9);
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/returns/{return_id}/status"),
        Some(&admin),
        Some(json!({ "status": "pending" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, mine) = send(&app, Method::GET, "/api/returns/myreturns", Some(&agent), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn reviews_are_posted_by_agents_and_listed_publicly() {
    let app = app();
    let admin = register_admin(&app).await;
    let agent = register_agent(&app, "reviewer@example.com").await;
    let product = create_product(&app, &admin, "Grower pellets", "feeds", 5).await;
    let review = json!({ "product": product, "rating": 5, "comment": "Birds love it" });

    let (status, _) = send(&app, Method::POST, "/api/reviews", Some(&admin), Some(review.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&app, Method::POST, "/api/reviews", Some(&agent), Some(review)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/reviews",
        Some(&agent),
        Some(json!({ "product": product, "rating": 9, "comment": "Too good" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "rating");

    let (status, listed) = send(&app, Method::GET, &format!("/api/reviews/product/{product}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["rating"], 5);
}

#[tokio::test]
async fn dashboard_reports_catalog_and_agent_totals() {
    let app = app();
    let admin = register_admin(&app).await;
    register_agent(&app, "one@example.com").await;
    register_agent(&app, "two@example.com").await;
    create_product(&app, &admin, "Sasso chicks", "chicks", 40).await;
    create_product(&app, &admin, "Layer mash", "feeds", 60).await;

    let (status, body) = send(&app, Method::GET, "/api/admin/dashboard", Some(&admin), None).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["totalAgents"], 2);
    assert_eq!(body["stockAvailable"], 100);
    assert_eq!(body["revenueData"]["labels"].as_array().map(Vec::len), Some(7));
    assert_eq!(body["referralStats"].as_array().map(Vec::len), Some(4));
}
