//! 401 handling and single-flight credential renewal.
//!
//! Requests carrying the stale access token get 401; the refresh endpoint
//! hands out a new one. Mocks with `expect(n)` are verified when the server
//! drops at the end of each test.

#![allow(clippy::unwrap_used)]

use mely_client::ApiError;
use mely_client::orders::OrderSummary;
use mely_integration_tests::{
    REFRESH_TOKEN, REFRESH_TOKEN_ID, bearer, customer_token, grant_body, signed_in,
};
use serde_json::json;
use tokio::task::JoinSet;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_orders(server: &MockServer, access: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(header("authorization", bearer(access).as_str()))
        .respond_with(
            ResponseTemplate::new(status).set_body_json(json!({ "success": true, "data": [] })),
        )
        .mount(server)
        .await;
}

// ============================================================================
// Single flight
// ============================================================================

#[tokio::test]
async fn test_concurrent_401s_share_one_renewal() {
    let server = MockServer::start().await;
    let stale = customer_token("stale");
    let fresh = customer_token("fresh");

    mount_orders(&server, &stale, 401).await;
    mount_orders(&server, &fresh, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(grant_body(&fresh, "refresh-2", "rt-id-2")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &stale);
    let mut calls = JoinSet::new();
    for _ in 0..5 {
        let orders = storefront.orders().clone();
        calls.spawn(async move { orders.list().await });
    }

    while let Some(result) = calls.join_next().await {
        let orders: Vec<OrderSummary> = result.unwrap().unwrap();
        assert!(orders.is_empty());
    }
    assert_eq!(
        storefront.session().refresh_token_id().as_deref(),
        Some("rt-id-2")
    );
}

#[tokio::test]
async fn test_renewal_sends_refresh_credential() {
    let server = MockServer::start().await;
    let stale = customer_token("stale");
    let fresh = customer_token("fresh");

    mount_orders(&server, &stale, 401).await;
    mount_orders(&server, &fresh, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(header("x-refresh-token-id", REFRESH_TOKEN_ID))
        .and(body_json(json!({ "refresh_token": REFRESH_TOKEN })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(grant_body(&fresh, "refresh-2", "rt-id-2")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &stale);
    storefront.orders().list().await.unwrap();
}

#[tokio::test]
async fn test_sequential_requests_after_renewal_use_new_token() {
    let server = MockServer::start().await;
    let stale = customer_token("stale");
    let fresh = customer_token("fresh");

    mount_orders(&server, &stale, 401).await;
    mount_orders(&server, &fresh, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(grant_body(&fresh, "refresh-2", "rt-id-2")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &stale);
    for _ in 0..3 {
        storefront.orders().list().await.unwrap();
    }
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_refused_renewal_clears_session_for_every_waiter() {
    let server = MockServer::start().await;
    let stale = customer_token("stale");

    mount_orders(&server, &stale, 401).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Refresh token revocado" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &stale);
    let mut calls = JoinSet::new();
    for _ in 0..3 {
        let orders = storefront.orders().clone();
        calls.spawn(async move { orders.list().await });
    }

    while let Some(result) = calls.join_next().await {
        assert!(matches!(
            result.unwrap(),
            Err(ApiError::MustReauthenticate)
        ));
    }
    assert!(!storefront.session().is_authenticated());
}

#[tokio::test]
async fn test_second_401_after_renewal_is_auth_expired() {
    let server = MockServer::start().await;
    let stale = customer_token("stale");
    let fresh = customer_token("fresh");

    mount_orders(&server, &stale, 401).await;
    mount_orders(&server, &fresh, 401).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(grant_body(&fresh, "refresh-2", "rt-id-2")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &stale);
    let result = storefront.orders().list().await;

    assert!(matches!(result, Err(ApiError::AuthExpired)));
    // The renewed credentials stay; only this request gave up.
    assert!(storefront.session().is_authenticated());
}

#[tokio::test]
async fn test_renewal_during_maintenance_keeps_session() {
    let server = MockServer::start().await;
    let stale = customer_token("stale");

    mount_orders(&server, &stale, 401).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({ "maintenance": true, "message": "Volvemos pronto" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &stale);
    let result = storefront.orders().list().await;

    match result {
        Err(ApiError::MaintenanceActive { message }) => assert_eq!(message, "Volvemos pronto"),
        other => panic!("expected maintenance, got {other:?}"),
    }
    assert!(storefront.session().is_authenticated());
}

#[tokio::test]
async fn test_renewal_is_retried_once_maintenance_ends() {
    let server = MockServer::start().await;
    let stale = customer_token("stale");
    let fresh = customer_token("fresh");

    mount_orders(&server, &stale, 401).await;
    mount_orders(&server, &fresh, 200).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({ "maintenance": true, "message": "Volvemos pronto" })),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(grant_body(&fresh, "refresh-2", "rt-id-2")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &stale);

    assert!(matches!(
        storefront.orders().list().await,
        Err(ApiError::MaintenanceActive { .. })
    ));
    assert!(storefront.orders().list().await.unwrap().is_empty());
    assert_eq!(
        storefront.session().refresh_token_id().as_deref(),
        Some("rt-id-2")
    );
}

#[tokio::test]
async fn test_renewal_is_retried_after_network_failure() {
    let server = MockServer::start().await;
    let stale = customer_token("stale");

    mount_orders(&server, &stale, 401).await;
    // Slower than the client timeout: the renewal call gets no response.
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(10)))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = mely_integration_tests::config_for(&server);
    config.request_timeout = std::time::Duration::from_millis(200);
    let storefront = mely_integration_tests::signed_in_with(&config, &stale);

    for _ in 0..2 {
        assert!(matches!(
            storefront.orders().list().await,
            Err(ApiError::NetworkUnavailable(_))
        ));
    }
    assert!(storefront.session().is_authenticated());
}

#[tokio::test]
async fn test_signed_out_request_needs_reauthentication() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let storefront = mely_integration_tests::signed_out(&server);
    let result = storefront.orders().list().await;

    assert!(matches!(result, Err(ApiError::MustReauthenticate)));
}
