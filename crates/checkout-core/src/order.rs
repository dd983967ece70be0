//! Order Requests & Session Results
//!
//! The request sent to the order backend and the result handed to the
//! payment handoff.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::buyer::{BuyerDetails, validate};
use crate::error::Result;
use crate::item::{Item, ItemKind};

/// Shown when the backend gives no reason
pub const GENERIC_SESSION_ERROR: &str = "Failed to create payment order";

/// Order identifier (formatted: `ORDER_<unix millis>_<8 hex>`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    /// Generate a new order id
    ///
    /// The millisecond clock orders ids over time and the random suffix keeps
    /// concurrent submits apart. Unique in practice, not unguessable.
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "ORDER_{}_{}",
            Utc::now().timestamp_millis(),
            &suffix[..8]
        ))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One submit attempt's order
///
/// Only constructible from validated buyer details and a purchasable item,
/// and never modified afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderRequest {
    order_id: OrderId,
    item: Item,
    buyer: BuyerDetails,
    buyer_id: Option<String>,
}

impl OrderRequest {
    pub fn new(item: Item, buyer: BuyerDetails, buyer_id: Option<String>) -> Result<Self> {
        validate(&buyer)?;
        item.ensure_purchasable()?;

        Ok(Self {
            order_id: OrderId::generate(),
            item,
            buyer,
            buyer_id: buyer_id.filter(|id| !id.trim().is_empty()),
        })
    }

    pub const fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub const fn item(&self) -> &Item {
        &self.item
    }

    pub const fn buyer(&self) -> &BuyerDetails {
        &self.buyer
    }

    pub fn buyer_id(&self) -> Option<&str> {
        self.buyer_id.as_deref()
    }

    pub const fn amount(&self) -> Decimal {
        self.item.price
    }

    /// Key the purchase record is stored under
    ///
    /// Signed-in buyers use their account id; guests fall back to their email.
    pub fn buyer_key(&self) -> &str {
        self.buyer_id.as_deref().unwrap_or(&self.buyer.email)
    }

    /// JSON body for the order backend
    pub fn to_wire(&self) -> CreateOrderBody<'_> {
        let item = match self.item.kind {
            ItemKind::Course => ItemFields::Course {
                course_id: &self.item.id,
                course_name: &self.item.name,
            },
            ItemKind::Product => ItemFields::Product {
                product_id: &self.item.id,
                product_name: &self.item.name,
                telegram_link: self.item.telegram_link.as_deref(),
            },
        };

        CreateOrderBody {
            order_id: self.order_id.as_str(),
            item,
            amount: self.item.price,
            customer_name: &self.buyer.name,
            customer_email: &self.buyer.email,
            customer_phone: &self.buyer.phone,
            user_id: self.buyer_id.as_deref(),
        }
    }
}

/// Order backend request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody<'a> {
    pub order_id: &'a str,
    #[serde(flatten)]
    pub item: ItemFields<'a>,
    #[serde(with = "crate::amount")]
    pub amount: Decimal,
    pub customer_name: &'a str,
    pub customer_email: &'a str,
    pub customer_phone: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<&'a str>,
}

/// Item framing differs between the course and product deployments
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ItemFields<'a> {
    Course {
        #[serde(rename = "courseId")]
        course_id: &'a str,
        #[serde(rename = "courseName")]
        course_name: &'a str,
    },
    Product {
        #[serde(rename = "productId")]
        product_id: &'a str,
        #[serde(rename = "productName")]
        product_name: &'a str,
        #[serde(rename = "telegramLink", skip_serializing_if = "Option::is_none")]
        telegram_link: Option<&'a str>,
    },
}

/// Order backend response body
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CreateOrderResponse {
    pub fn created(payment_session_id: impl Into<String>, order_id: impl Into<String>) -> Self {
        Self {
            success: true,
            payment_session_id: Some(payment_session_id.into()),
            order_id: Some(order_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Outcome of asking the backend for a payment session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderSessionResult {
    pub success: bool,
    pub payment_session_id: Option<String>,
    pub order_id: String,
    pub error: Option<String>,
}

impl OrderSessionResult {
    pub fn succeeded(payment_session_id: impl Into<String>, order_id: impl Into<String>) -> Self {
        Self {
            success: true,
            payment_session_id: Some(payment_session_id.into()),
            order_id: order_id.into(),
            error: None,
        }
    }

    pub fn failed(order_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            payment_session_id: None,
            order_id: order_id.into(),
            error: Some(error.into()),
        }
    }

    /// Interpret a backend reply
    ///
    /// A non-2xx status, `success: false` or a missing token all become a
    /// failure carrying the backend's message when it sent one.
    pub fn from_response(status_ok: bool, response: CreateOrderResponse, order_id: &OrderId) -> Self {
        let order_id = response
            .order_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| order_id.to_string());

        if !status_ok || !response.success {
            let error = response
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| GENERIC_SESSION_ERROR.into());
            return Self::failed(order_id, error);
        }

        match response.payment_session_id.filter(|token| !token.is_empty()) {
            Some(token) => Self::succeeded(token, order_id),
            None => Self::failed(order_id, "Payment session missing from order response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buyer::ValidationError;
    use crate::error::CheckoutError;
    use rust_decimal_macros::dec;

    fn jane() -> BuyerDetails {
        BuyerDetails::new("Jane Doe", "jane@x.com", "9876543210")
    }

    #[test]
    fn test_order_id_format() {
        let id = OrderId::generate();
        let parts: Vec<_> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORDER");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert_ne!(id, OrderId::generate());
    }

    #[test]
    fn test_invalid_buyer_cannot_build_request() {
        let item = Item::course("42", "Algebra I", dec!(499));
        let err = OrderRequest::new(item, BuyerDetails::default(), None).unwrap_err();
        assert_eq!(err, CheckoutError::Validation(ValidationError::MissingFields));
    }

    #[test]
    fn test_course_wire_shape() {
        let item = Item::course("42", "Algebra I", dec!(499));
        let request = OrderRequest::new(item, jane(), Some("u1".into())).unwrap();
        let body = serde_json::to_value(request.to_wire()).unwrap();

        assert_eq!(body["courseId"], "42");
        assert_eq!(body["courseName"], "Algebra I");
        assert_eq!(body["amount"], 499);
        assert_eq!(body["customerName"], "Jane Doe");
        assert_eq!(body["customerEmail"], "jane@x.com");
        assert_eq!(body["customerPhone"], "9876543210");
        assert_eq!(body["userId"], "u1");
        assert_eq!(body["orderId"], request.order_id().as_str());
        assert!(body.get("productId").is_none());
    }

    #[test]
    fn test_guest_product_wire_shape() {
        let item = Item::product("7", "NEET Notes", dec!(10)).with_telegram_link("https://t.me/x");
        let request = OrderRequest::new(item, jane(), None).unwrap();
        let body = serde_json::to_value(request.to_wire()).unwrap();

        assert_eq!(body["productId"], "7");
        assert_eq!(body["productName"], "NEET Notes");
        assert_eq!(body["telegramLink"], "https://t.me/x");
        assert!(body.get("userId").is_none());
        assert_eq!(request.buyer_key(), "jane@x.com");
    }

    #[test]
    fn test_backend_failure_keeps_message() {
        let id = OrderId::from_string("ORDER_1");
        let result = OrderSessionResult::from_response(
            false,
            CreateOrderResponse::failed("Missing required fields: userId"),
            &id,
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Missing required fields: userId"));
        assert_eq!(result.order_id, "ORDER_1");
    }

    #[test]
    fn test_success_flag_without_token_is_failure() {
        let id = OrderId::from_string("ORDER_1");
        let response = CreateOrderResponse {
            success: true,
            ..Default::default()
        };
        let result = OrderSessionResult::from_response(true, response, &id);
        assert!(!result.success);
        assert!(result.payment_session_id.is_none());
    }

    #[test]
    fn test_error_status_overrides_success_flag() {
        let id = OrderId::from_string("ORDER_1");
        let result =
            OrderSessionResult::from_response(false, CreateOrderResponse::created("tok", "O"), &id);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(GENERIC_SESSION_ERROR));
    }

    #[test]
    fn test_backend_order_id_wins() {
        let id = OrderId::from_string("ORDER_local");
        let result = OrderSessionResult::from_response(
            true,
            CreateOrderResponse::created("tok_1", "ORDER_1"),
            &id,
        );
        assert_eq!(result, OrderSessionResult::succeeded("tok_1", "ORDER_1"));
    }
}
