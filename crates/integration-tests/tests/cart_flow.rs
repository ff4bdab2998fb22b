//! Cart edits and removals over HTTP.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mely_client::cart::{CartSyncEngine, LineState};
use mely_client::notify::{AlwaysConfirm, NoticeKind, Notifier};
use mely_client::Storefront;
use mely_core::LineId;
use mely_integration_tests::{bearer, customer_token, grant_body, line_body, signed_in};
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Recorder(Mutex<Vec<(NoticeKind, String)>>);

impl Notifier for Recorder {
    fn notify(&self, kind: NoticeKind, message: &str) {
        self.0.lock().unwrap().push((kind, message.to_string()));
    }
}

async fn mount_details(server: &MockServer, lines: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/cart/7/details"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": lines })),
        )
        .mount(server)
        .await;
}

async fn loaded_engine(storefront: &Storefront, notifier: Arc<Recorder>) -> CartSyncEngine {
    let engine = storefront.cart_engine(notifier, Arc::new(AlwaysConfirm));
    engine.load().await.unwrap();
    engine
}

async fn wait_for_gate(engine: &CartSyncEngine) {
    let mut gate = engine.subscribe_checkout();
    tokio::time::timeout(Duration::from_secs(5), gate.wait_for(|open| *open))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_quick_increments_reach_backend_as_one_update() {
    let server = MockServer::start().await;
    mount_details(&server, json!([line_body(7, 2, "25.00", "Polo rosado")])).await;
    Mock::given(method("PUT"))
        .and(path("/api/cart/details/7"))
        .and(body_json(json!({ "quantity": 4 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "cantidad": 4, "subtotal": "100.00" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/carrito/cantidad/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "totalItems": 4 })))
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &customer_token("a"));
    let engine = loaded_engine(&storefront, Arc::default()).await;
    let line = LineId::new(7);

    assert!(engine.step(line, 1).await.unwrap());
    assert!(engine.step(line, 1).await.unwrap());
    assert!(!engine.can_finalize());

    wait_for_gate(&engine).await;

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.lines[0].quantity().get(), 4);
    assert_eq!(snapshot.lines[0].state(), LineState::Synced);
    assert_eq!(snapshot.total, Decimal::new(10000, 2));
    assert_eq!(storefront.counts().refresh().await.unwrap(), 4);
}

#[tokio::test]
async fn test_rejected_update_shows_message_and_server_quantity() {
    let server = MockServer::start().await;
    mount_details(&server, json!([line_body(7, 3, "25.00", "Polo rosado")])).await;
    Mock::given(method("PUT"))
        .and(path("/api/cart/details/7"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "Solo quedan 3 unidades" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &customer_token("a"));
    let notifier = Arc::new(Recorder::default());
    let engine = loaded_engine(&storefront, notifier.clone()).await;

    engine.on_quantity_edit(LineId::new(7), 5).await.unwrap();
    wait_for_gate(&engine).await;

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.lines[0].quantity().get(), 3);
    assert_eq!(snapshot.total, Decimal::new(7500, 2));
    assert!(
        notifier
            .0
            .lock()
            .unwrap()
            .contains(&(NoticeKind::Error, "Solo quedan 3 unidades".to_string()))
    );
}

#[tokio::test]
async fn test_remove_and_count_with_stale_token_renew_once() {
    let server = MockServer::start().await;
    let stale = customer_token("stale");
    let fresh = customer_token("fresh");

    mount_details(
        &server,
        json!([
            line_body(7, 2, "25.00", "Polo rosado"),
            line_body(9, 1, "10.00", "Vincha")
        ]),
    )
    .await;
    for (token, status) in [(&stale, 401), (&fresh, 200)] {
        Mock::given(method("DELETE"))
            .and(path("/api/cart/details/9"))
            .and(header("authorization", bearer(token).as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "success": true })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/carrito/cantidad/7"))
            .and(header("authorization", bearer(token).as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "totalItems": 2 })))
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(grant_body(&fresh, "refresh-2", "rt-id-2")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let storefront = signed_in(&server, &stale);
    let engine = loaded_engine(&storefront, Arc::default()).await;

    let (removed, count) = tokio::join!(
        engine.remove_line(LineId::new(9)),
        storefront.counts().refresh()
    );

    assert!(removed.unwrap());
    assert_eq!(count.unwrap(), 2);
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.lines.len(), 1);
    assert_eq!(snapshot.total, Decimal::new(5000, 2));
    assert_eq!(storefront.counts().current(), 2);
}

#[tokio::test]
async fn test_count_without_cart_claim_is_zero() {
    let server = MockServer::start().await;
    let token = mely_integration_tests::token(&json!({ "idUsuario": 3, "rol": "admin" }));

    let storefront = signed_in(&server, &token);

    assert_eq!(storefront.counts().refresh().await.unwrap(), 0);
}
