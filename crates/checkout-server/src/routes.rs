//! Router

use std::path::Path;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::handlers::{
    create_order, get_purchase, health_check, list_purchases, method_not_allowed,
    payment_webhook, record_purchase,
};
use crate::state::AppState;

/// API routes plus the static frontend
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Unknown paths serve index.html so client routes (/checkout, /success) load
    let static_dir = Path::new(&state.config.static_dir);
    let frontend =
        ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Checkout
        .route(
            "/api/createOrder",
            post(create_order).fallback(method_not_allowed),
        )
        .route("/api/webhook", post(payment_webhook))

        // Purchase records
        .route("/api/purchases", post(record_purchase))
        .route("/api/purchases/{buyer_id}", get(list_purchases))
        .route("/api/purchases/{buyer_id}/{item_id}", get(get_purchase))

        .fallback_service(frontend)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use checkout_core::{PurchaseRecord, PurchaseStore};
    use checkout_payments::{
        NewProviderOrder, OrderBook, OrderProvider, PaymentError, ProviderOrder, sign,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::state::Payments;

    const SECRET: &str = "secret_456";

    enum Script {
        Session(&'static str),
        Reject(u16, &'static str),
    }

    struct FakeProvider {
        script: Script,
        paid: bool,
        created: Mutex<Vec<NewProviderOrder>>,
    }

    impl FakeProvider {
        fn new(script: Script) -> Self {
            Self {
                script,
                paid: false,
                created: Mutex::new(Vec::new()),
            }
        }

        fn paid(mut self) -> Self {
            self.paid = true;
            self
        }
    }

    #[async_trait]
    impl OrderProvider for FakeProvider {
        async fn create_order(&self, order: &NewProviderOrder) -> checkout_payments::Result<ProviderOrder> {
            self.created.lock().unwrap().push(order.clone());
            match self.script {
                Script::Session(token) => Ok(ProviderOrder {
                    order_id: order.order_id.clone(),
                    cf_order_id: None,
                    order_status: Some("ACTIVE".into()),
                    payment_session_id: Some(token.into()),
                    order_amount: Some(order.order_amount),
                }),
                Script::Reject(status, message) => Err(PaymentError::Provider {
                    status,
                    message: message.into(),
                }),
            }
        }

        async fn fetch_order(&self, order_id: &str) -> checkout_payments::Result<ProviderOrder> {
            Ok(ProviderOrder {
                order_id: order_id.into(),
                cf_order_id: None,
                order_status: Some(if self.paid { "PAID" } else { "ACTIVE" }.into()),
                payment_session_id: None,
                order_amount: None,
            })
        }
    }

    fn state_with(provider: Option<FakeProvider>) -> (AppState, Option<Arc<FakeProvider>>) {
        let provider = provider.map(Arc::new);
        let payments = provider.clone().map(|p| Payments {
            provider: p,
            webhook_secret: SECRET.into(),
        });
        let config = ServerConfig {
            public_base_url: "https://shop.example".into(),
            ..ServerConfig::default()
        };
        (AppState::new(config, payments), provider)
    }

    async fn send(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn course_body() -> Value {
        json!({
            "orderId": "ORDER_42_1",
            "courseId": "42",
            "courseName": "Algebra I",
            "amount": 499,
            "customerName": "Jane Doe",
            "customerEmail": "jane@x.com",
            "customerPhone": "9876543210",
            "userId": "u1"
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state_with(None);
        let (status, body) = send(&state, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payments_configured"], false);
    }

    #[tokio::test]
    async fn test_create_order_rejects_get() {
        let (state, _) = state_with(None);
        let (status, body) = send(&state, Method::GET, "/api/createOrder", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({ "success": false, "error": "Method Not Allowed" }));
    }

    #[tokio::test]
    async fn test_create_order_lists_missing_fields() {
        let (state, provider) = state_with(Some(FakeProvider::new(Script::Session("sess_abc"))));
        let mut body = course_body();
        body["courseName"] = json!("");
        body.as_object_mut().unwrap().remove("userId");

        let (status, reply) = send(&state, Method::POST, "/api/createOrder", Some(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"], "Missing required fields: courseName, userId");
        assert!(provider.unwrap().created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_order_success() {
        let (state, provider) = state_with(Some(FakeProvider::new(Script::Session("sess_abc"))));

        let (status, reply) = send(&state, Method::POST, "/api/createOrder", Some(course_body())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            reply,
            json!({ "success": true, "paymentSessionId": "sess_abc", "orderId": "ORDER_42_1" })
        );

        let created = provider.unwrap().created.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].customer_details.customer_id, "cust_u1");
        assert_eq!(created[0].order_note, "Course: Algebra I");
        assert_eq!(
            created[0].order_meta.return_url,
            "https://shop.example/success?order_id={order_id}&course_id=42"
        );

        let pending = state.orders.get("ORDER_42_1").unwrap().unwrap();
        assert_eq!(pending.buyer_key(), "u1");
        assert_eq!(pending.payment_session_id, "sess_abc");
        // Provider stops taking payment once the order ages out
        let expiry = created[0].order_expiry_time.unwrap();
        let lifetime = expiry - pending.created_at;
        assert!((lifetime - state.config.order_ttl).num_seconds().abs() <= 5);
    }

    #[tokio::test]
    async fn test_provider_rejection_is_bad_request() {
        let (state, _) = state_with(Some(FakeProvider::new(Script::Reject(
            400,
            "order_amount : must be greater than 1",
        ))));

        let (status, reply) = send(&state, Method::POST, "/api/createOrder", Some(course_body())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["error"], "order_amount : must be greater than 1");
        assert!(state.orders.get("ORDER_42_1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_outage_is_generic() {
        let (state, _) = state_with(Some(FakeProvider::new(Script::Reject(503, "maintenance"))));
        let (status, reply) = send(&state, Method::POST, "/api/createOrder", Some(course_body())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply["error"], "Failed to create payment order");
    }

    #[tokio::test]
    async fn test_unconfigured_payments() {
        let (state, _) = state_with(None);
        let (status, reply) = send(&state, Method::POST, "/api/createOrder", Some(course_body())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(reply["success"], false);
    }

    async fn send_webhook(state: &AppState, body: &str, signature: &str) -> StatusCode {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/webhook")
            .header("content-type", "application/json")
            .header("x-webhook-signature", signature)
            .header("x-webhook-timestamp", "1704103200000")
            .body(Body::from(body.to_string()))
            .unwrap();
        router(state.clone()).oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_webhook_records_purchase() {
        let (state, _) = state_with(Some(FakeProvider::new(Script::Session("sess_abc"))));
        send(&state, Method::POST, "/api/createOrder", Some(course_body())).await;

        let body = json!({
            "type": "PAYMENT_SUCCESS_WEBHOOK",
            "data": {
                "order": { "order_id": "ORDER_42_1", "order_amount": 499 },
                "payment": { "cf_payment_id": 1, "payment_status": "SUCCESS", "payment_amount": 499 }
            }
        })
        .to_string();

        let tampered = body.replace("499", "1");
        let signature = sign("1704103200000", &body, SECRET).unwrap();
        assert_eq!(send_webhook(&state, &tampered, &signature).await, StatusCode::BAD_REQUEST);
        assert!(state.purchases.is_empty());

        assert_eq!(send_webhook(&state, &body, &signature).await, StatusCode::OK);

        let (status, record) = send(&state, Method::GET, "/api/purchases/u1/42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["orderId"], "ORDER_42_1");
        assert_eq!(record["amount"], 499);
    }

    #[tokio::test]
    async fn test_unknown_purchase_is_not_found() {
        let (state, _) = state_with(None);
        let (status, body) = send(&state, Method::GET, "/api/purchases/u1/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    fn purchase_body(buyer: &str) -> Value {
        json!({
            "buyerId": buyer,
            "itemId": "42",
            "itemName": "Algebra I",
            "amount": 499,
            "orderId": "ORDER_42_1",
            "paymentSessionId": "sess_abc"
        })
    }

    #[tokio::test]
    async fn test_record_purchase_requires_paid_order() {
        let (state, _) = state_with(Some(FakeProvider::new(Script::Session("sess_abc"))));
        let (status, body) =
            send(&state, Method::POST, "/api/purchases", Some(purchase_body("u1"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "ORDER_NOT_PAID");
        assert!(state.purchases.is_empty());
    }

    #[tokio::test]
    async fn test_record_purchase_is_idempotent() {
        let (state, _) = state_with(Some(FakeProvider::new(Script::Session("sess_abc")).paid()));
        send(&state, Method::POST, "/api/createOrder", Some(course_body())).await;

        let (other, _) =
            send(&state, Method::POST, "/api/purchases", Some(purchase_body("u2"))).await;
        assert_eq!(other, StatusCode::FORBIDDEN);

        for _ in 0..2 {
            let (status, _) =
                send(&state, Method::POST, "/api/purchases", Some(purchase_body("u1"))).await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(state.purchases.len(), 1);

        let (_, list) = send(&state, Method::GET, "/api/purchases/u1", None).await;
        let list: Vec<PurchaseRecord> = serde_json::from_value(list).unwrap();
        assert_eq!(list.len(), 1);
        assert!(state.purchases.has_access("u1", "42").unwrap());
    }

    #[tokio::test]
    async fn test_settled_order_cannot_unlock_other_items() {
        let (state, _) = state_with(Some(FakeProvider::new(Script::Session("sess_abc")).paid()));
        send(&state, Method::POST, "/api/createOrder", Some(course_body())).await;
        let (status, _) =
            send(&state, Method::POST, "/api/purchases", Some(purchase_body("u1"))).await;
        assert_eq!(status, StatusCode::OK);

        let replay = json!({
            "buyerId": "mallory",
            "itemId": "999",
            "itemName": "Everything",
            "amount": 1,
            "orderId": "ORDER_42_1",
            "paymentSessionId": "sess_abc"
        });
        let (status, body) = send(&state, Method::POST, "/api/purchases", Some(replay)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNKNOWN_ORDER");
        assert!(!state.purchases.has_access("mallory", "999").unwrap());
        assert_eq!(state.purchases.len(), 1);
    }

    #[tokio::test]
    async fn test_record_purchase_uses_order_details() {
        let (state, _) = state_with(Some(FakeProvider::new(Script::Session("sess_abc")).paid()));
        send(&state, Method::POST, "/api/createOrder", Some(course_body())).await;

        let mut cheap = purchase_body("u1");
        cheap["amount"] = json!(1);
        let (status, body) = send(&state, Method::POST, "/api/purchases", Some(cheap)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "ORDER_MISMATCH");

        let mut renamed = purchase_body("u1");
        renamed["itemName"] = json!("Renamed");
        let (status, record) = send(&state, Method::POST, "/api/purchases", Some(renamed)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["itemName"], "Algebra I");
        assert!(state.orders.get("ORDER_42_1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_purchase_without_order_is_rejected() {
        let (state, _) = state_with(Some(FakeProvider::new(Script::Session("sess_abc")).paid()));
        let (status, body) =
            send(&state, Method::POST, "/api/purchases", Some(purchase_body("u1"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNKNOWN_ORDER");
        assert!(state.purchases.is_empty());
    }
}
