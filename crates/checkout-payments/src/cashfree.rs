//! Cashfree Orders Integration
//!
//! Creates provider orders (which yield the payment session token the
//! browser SDK needs) and reads back their status.

use std::time::Duration;

use async_trait::async_trait;
use checkout_core::ItemKind;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

pub const DEFAULT_API_VERSION: &str = "2022-09-01";
const CURRENCY: &str = "INR";

/// Provider environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CashfreeEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl CashfreeEnvironment {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" | "live" => Self::Production,
            _ => Self::Sandbox,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }

    pub const fn api_base(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.cashfree.com/pg",
            Self::Production => "https://api.cashfree.com/pg",
        }
    }
}

/// Provider credentials and endpoint
#[derive(Clone)]
pub struct CashfreeConfig {
    pub client_id: String,
    pub client_secret: String,
    pub environment: CashfreeEnvironment,
    pub api_version: String,
    pub api_base: String,
}

impl std::fmt::Debug for CashfreeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CashfreeConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("environment", &self.environment)
            .field("api_version", &self.api_version)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl CashfreeConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        environment: CashfreeEnvironment,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            environment,
            api_version: DEFAULT_API_VERSION.into(),
            api_base: environment.api_base().into(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("CASHFREE_CLIENT_ID")
            .map_err(|_| PaymentError::Config("CASHFREE_CLIENT_ID not set".into()))?;
        let client_secret = std::env::var("CASHFREE_CLIENT_SECRET")
            .map_err(|_| PaymentError::Config("CASHFREE_CLIENT_SECRET not set".into()))?;
        let environment = std::env::var("CASHFREE_ENV")
            .map(|v| CashfreeEnvironment::from_str(&v))
            .unwrap_or_default();

        let mut config = Self::new(client_id, client_secret, environment);
        if let Ok(version) = std::env::var("CASHFREE_API_VERSION") {
            config.api_version = version;
        }
        Ok(config)
    }

    /// Point at another base URL (tests, proxies)
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

/// Where the provider sends the buyer and the webhook
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderUrls {
    public_base: String,
}

impl OrderUrls {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// `{order_id}` is left for the provider to fill in
    pub fn return_url(&self, kind: ItemKind, item_id: &str) -> String {
        format!(
            "{}/success?order_id={{order_id}}&{}={}",
            self.public_base,
            kind.return_param(),
            item_id
        )
    }

    pub fn notify_url(&self) -> String {
        format!("{}/api/webhook", self.public_base)
    }
}

/// Buyer as the provider sees it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
}

impl CustomerDetails {
    /// Signed-in buyers are `cust_<id>`; guests are keyed by phone
    pub fn customer_id_for(buyer_id: Option<&str>, phone: &str) -> String {
        let raw = buyer_id.map_or_else(|| format!("cust_guest_{phone}"), |id| format!("cust_{id}"));
        raw.chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect()
    }
}

/// Return and notification URLs
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMeta {
    pub return_url: String,
    pub notify_url: String,
}

/// Body of the provider's create-order call
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewProviderOrder {
    pub order_id: String,
    #[serde(with = "checkout_core::amount")]
    pub order_amount: Decimal,
    pub order_currency: String,
    pub customer_details: CustomerDetails,
    pub order_meta: OrderMeta,
    pub order_note: String,
    /// Provider stops accepting payment after this
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "expiry_time")]
    pub order_expiry_time: Option<DateTime<Utc>>,
}

fn expiry_time<S: serde::Serializer>(
    at: &Option<DateTime<Utc>>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match at {
        Some(at) => s.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => s.serialize_none(),
    }
}

impl NewProviderOrder {
    pub fn new(
        order_id: impl Into<String>,
        amount: Decimal,
        customer_details: CustomerDetails,
        order_meta: OrderMeta,
        note: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            order_amount: amount,
            order_currency: CURRENCY.into(),
            customer_details,
            order_meta,
            order_note: note.into(),
            order_expiry_time: None,
        }
    }

    #[must_use]
    pub fn with_expiry_time(mut self, at: DateTime<Utc>) -> Self {
        self.order_expiry_time = Some(at);
        self
    }
}

/// Provider order as returned by create and fetch
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProviderOrder {
    pub order_id: String,
    #[serde(default)]
    pub cf_order_id: Option<serde_json::Value>,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub payment_session_id: Option<String>,
    #[serde(default, deserialize_with = "checkout_core::amount::deserialize_option")]
    pub order_amount: Option<Decimal>,
}

impl ProviderOrder {
    pub fn is_paid(&self) -> bool {
        self.order_status.as_deref() == Some("PAID")
    }
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Creates and looks up provider orders
#[async_trait]
pub trait OrderProvider: Send + Sync {
    async fn create_order(&self, order: &NewProviderOrder) -> Result<ProviderOrder>;
    async fn fetch_order(&self, order_id: &str) -> Result<ProviderOrder>;
}

/// Cashfree PG client
pub struct CashfreeClient {
    http: reqwest::Client,
    config: CashfreeConfig,
}

impl CashfreeClient {
    pub fn new(config: CashfreeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Config(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(CashfreeConfig::from_env()?)
    }

    pub const fn config(&self) -> &CashfreeConfig {
        &self.config
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-version", &self.config.api_version)
            .header("x-client-id", &self.config.client_id)
            .header("x-client-secret", &self.config.client_secret)
    }

    async fn read_order(response: reqwest::Response) -> Result<ProviderOrder> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<ProviderOrder>()
                .await
                .map_err(|e| PaymentError::Transport(format!("unreadable order response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ProviderErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.code))
            .unwrap_or_else(|| format!("provider returned {status}"));

        Err(PaymentError::Provider {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl OrderProvider for CashfreeClient {
    async fn create_order(&self, order: &NewProviderOrder) -> Result<ProviderOrder> {
        let url = format!("{}/orders", self.config.api_base);
        tracing::debug!(order_id = %order.order_id, amount = %order.order_amount, "Creating provider order");

        let response = self
            .authed(self.http.post(&url))
            .json(order)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        let created = Self::read_order(response).await?;
        if created.payment_session_id.as_deref().is_none_or(str::is_empty) {
            return Err(PaymentError::Transport(
                "provider order has no payment_session_id".into(),
            ));
        }

        tracing::info!(
            order_id = %created.order_id,
            environment = self.config.environment.as_str(),
            "Provider order created"
        );
        Ok(created)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<ProviderOrder> {
        let url = format!("{}/orders/{}", self.config.api_base, order_id);
        let response = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        match Self::read_order(response).await {
            Err(PaymentError::Provider { status: 404, .. }) => {
                Err(PaymentError::UnknownOrder(order_id.to_string()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> CashfreeClient {
        let config = CashfreeConfig::new("app_123", "secret_456", CashfreeEnvironment::Sandbox)
            .with_api_base(server.uri());
        CashfreeClient::new(config).unwrap()
    }

    fn algebra_order() -> NewProviderOrder {
        let urls = OrderUrls::new("https://shop.example/");
        NewProviderOrder::new(
            "ORDER_42_1",
            dec!(499),
            CustomerDetails {
                customer_id: CustomerDetails::customer_id_for(Some("u1"), "9876543210"),
                customer_name: "Jane Doe".into(),
                customer_email: "jane@x.com".into(),
                customer_phone: "9876543210".into(),
            },
            OrderMeta {
                return_url: urls.return_url(ItemKind::Course, "42"),
                notify_url: urls.notify_url(),
            },
            "Course: Algebra I",
        )
    }

    #[test]
    fn test_urls() {
        let urls = OrderUrls::new("https://shop.example/");
        assert_eq!(
            urls.return_url(ItemKind::Product, "7"),
            "https://shop.example/success?order_id={order_id}&product_id=7"
        );
        assert_eq!(urls.notify_url(), "https://shop.example/api/webhook");
    }

    #[test]
    fn test_guest_customer_id() {
        assert_eq!(CustomerDetails::customer_id_for(None, "9876543210"), "cust_guest_9876543210");
        assert_eq!(CustomerDetails::customer_id_for(Some("a.b@c"), ""), "cust_abc");
    }

    #[tokio::test]
    async fn test_create_order_sends_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header("x-api-version", "2022-09-01"))
            .and(header("x-client-id", "app_123"))
            .and(header("x-client-secret", "secret_456"))
            .and(body_partial_json(serde_json::json!({
                "order_id": "ORDER_42_1",
                "order_amount": 499,
                "order_currency": "INR",
                "customer_details": { "customer_id": "cust_u1" },
                "order_meta": {
                    "return_url": "https://shop.example/success?order_id={order_id}&course_id=42"
                },
                "order_note": "Course: Algebra I"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cf_order_id": 2149460581_u64,
                "order_id": "ORDER_42_1",
                "order_status": "ACTIVE",
                "order_amount": 499.00,
                "payment_session_id": "sess_abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = client(&server).create_order(&algebra_order()).await.unwrap();
        assert_eq!(order.payment_session_id.as_deref(), Some("sess_abc"));
        assert_eq!(order.order_amount, Some(dec!(499)));
        assert!(!order.is_paid());
    }

    #[test]
    fn test_expiry_sent_only_when_set() {
        let body = serde_json::to_value(algebra_order()).unwrap();
        assert!(body.get("order_expiry_time").is_none());

        let at = DateTime::parse_from_rfc3339("2024-01-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let body = serde_json::to_value(algebra_order().with_expiry_time(at)).unwrap();
        assert_eq!(body["order_expiry_time"], "2024-01-02T10:00:00Z");
    }

    #[tokio::test]
    async fn test_provider_rejection_carries_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "message": "customer_details.customer_phone : invalid value provided",
                "code": "customer_details.customer_phone_invalid",
                "type": "invalid_request_error"
            })))
            .mount(&server)
            .await;

        let err = client(&server).create_order(&algebra_order()).await.unwrap_err();
        match err {
            PaymentError::Provider { status, message } => {
                assert_eq!(status, 400);
                assert!(message.starts_with("customer_details.customer_phone"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_paid_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/ORDER_42_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order_id": "ORDER_42_1",
                "order_status": "PAID",
                "order_amount": 499
            })))
            .mount(&server)
            .await;

        let order = client(&server).fetch_order("ORDER_42_1").await.unwrap();
        assert!(order.is_paid());
    }

    #[tokio::test]
    async fn test_fetch_missing_order_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/ORDER_404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "order not found",
                "code": "order_not_found"
            })))
            .mount(&server)
            .await;

        let err = client(&server).fetch_order("ORDER_404").await.unwrap_err();
        assert!(matches!(err, PaymentError::UnknownOrder(ref id) if id == "ORDER_404"));
        assert!(!err.is_retryable());
    }
}
