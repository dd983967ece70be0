//! Order Session Requester
//!
//! Asks the order backend for a payment session. One POST per submit, no
//! automatic retry: a retry is a new submit from the buyer.

use async_trait::async_trait;

use crate::config::CheckoutConfig;
use crate::order::{CreateOrderResponse, OrderRequest, OrderSessionResult};

/// Shown when the backend cannot be reached at all
pub const UNREACHABLE_ERROR: &str = "Unable to reach the payment service. Please try again.";

#[cfg(not(target_arch = "wasm32"))]
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Order backend client
///
/// Never fails: transport and backend errors are folded into a failed
/// [`OrderSessionResult`].
#[async_trait(?Send)]
pub trait OrderSessionRequester {
    async fn create_order_session(&self, request: &OrderRequest) -> OrderSessionResult;
}

/// HTTP requester posting JSON to the order endpoint
pub struct HttpOrderSessionRequester {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOrderSessionRequester {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(default_client(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn from_config(config: &CheckoutConfig) -> Self {
        Self::new(config.order_endpoint.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

// The browser's fetch owns timeouts on wasm
#[cfg(target_arch = "wasm32")]
fn default_client() -> reqwest::Client {
    reqwest::Client::new()
}

#[async_trait(?Send)]
impl OrderSessionRequester for HttpOrderSessionRequester {
    async fn create_order_session(&self, request: &OrderRequest) -> OrderSessionResult {
        let order_id = request.order_id();
        tracing::debug!(
            order_id = %order_id,
            item_id = %request.item().id,
            amount = %request.amount(),
            "Requesting payment session"
        );

        let response = match self
            .client
            .post(&self.endpoint)
            .json(&request.to_wire())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "Order backend unreachable");
                return OrderSessionResult::failed(order_id.as_str(), UNREACHABLE_ERROR);
            }
        };

        let status = response.status();
        let body = match response.json::<CreateOrderResponse>().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    order_id = %order_id,
                    status = status.as_u16(),
                    error = %e,
                    "Unreadable order backend response"
                );
                CreateOrderResponse::default()
            }
        };

        let result = OrderSessionResult::from_response(status.is_success(), body, order_id);
        if result.success {
            tracing::info!(order_id = %result.order_id, "Payment session created");
        } else {
            tracing::warn!(
                order_id = %result.order_id,
                status = status.as_u16(),
                error = ?result.error,
                "Order backend refused payment session"
            );
        }
        result
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::buyer::BuyerDetails;
    use crate::item::Item;
    use crate::order::GENERIC_SESSION_ERROR;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn algebra_order() -> OrderRequest {
        OrderRequest::new(
            Item::course("42", "Algebra I", dec!(499)),
            BuyerDetails::new("Jane Doe", "jane@x.com", "9876543210"),
            Some("u1".into()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_posts_order_once_and_returns_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/createOrder"))
            .and(body_partial_json(json!({
                "courseId": "42",
                "amount": 499,
                "customerEmail": "jane@x.com",
                "userId": "u1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "paymentSessionId": "sess_abc",
                "orderId": "ORDER_42_1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let requester = HttpOrderSessionRequester::new(format!("{}/api/createOrder", server.uri()));
        let result = requester.create_order_session(&algebra_order()).await;

        assert_eq!(result, OrderSessionResult::succeeded("sess_abc", "ORDER_42_1"));
    }

    #[tokio::test]
    async fn test_backend_error_message_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "error": "Missing required fields: userId",
            })))
            .mount(&server)
            .await;

        let requester = HttpOrderSessionRequester::new(server.uri());
        let result = requester.create_order_session(&algebra_order()).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Missing required fields: userId"));
    }

    #[tokio::test]
    async fn test_non_json_error_gets_generic_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let requester = HttpOrderSessionRequester::new(server.uri());
        let result = requester.create_order_session(&algebra_order()).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(GENERIC_SESSION_ERROR));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let requester = HttpOrderSessionRequester::new("http://127.0.0.1:9/api/createOrder");
        let order = algebra_order();
        let result = requester.create_order_session(&order).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(UNREACHABLE_ERROR));
        assert_eq!(result.order_id, order.order_id().as_str());
    }
}
