//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use checkout_core::{
    BuyerDetails, CreateOrderResponse, ItemKind, OrderId, PurchaseRecord, PurchaseStore,
    RecordPurchaseRequest, order::GENERIC_SESSION_ERROR, validate,
};
use checkout_payments::{
    CustomerDetails, NewProviderOrder, OrderBook, OrderMeta, PaymentError, PendingOrder, SIGNATURE_HEADER,
    TIMESTAMP_HEADER, WebhookHandler,
};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type OrderReply = (StatusCode, Json<CreateOrderResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn order_error(status: StatusCode, error: impl Into<String>) -> OrderReply {
    (status, Json(CreateOrderResponse::failed(error)))
}

fn payments_disabled() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "Payments not configured",
        "PAYMENTS_DISABLED",
    )
}

// ============================================================================
// Order creation
// ============================================================================

/// Order creation body
///
/// Accepts the course framing, the product framing, and generic
/// `item*`/`buyer*` aliases. Everything is optional here so missing fields
/// can be reported together.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub item_kind: Option<ItemKind>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default, alias = "buyerName")]
    pub customer_name: Option<String>,
    #[serde(default, alias = "buyerEmail")]
    pub customer_email: Option<String>,
    #[serde(default, alias = "buyerPhone")]
    pub customer_phone: Option<String>,
    #[serde(default, alias = "buyerId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub telegram_link: Option<String>,
}

/// A create-order body with every required field present
#[derive(Debug, PartialEq, Eq)]
pub struct ValidOrder {
    pub order_id: String,
    pub kind: ItemKind,
    pub item_id: String,
    pub item_name: String,
    pub amount: Decimal,
    pub buyer: BuyerDetails,
    pub user_id: Option<String>,
}

fn present(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_amount(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_usable_order_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 50
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl CreateOrderPayload {
    /// Check required fields, then buyer details
    pub fn validate(&self) -> Result<ValidOrder, String> {
        let (kind, id_field, name_field, item_id, item_name) = if self.course_id.is_some()
            || self.course_name.is_some()
        {
            (
                ItemKind::Course,
                "courseId",
                "courseName",
                present(self.course_id.as_ref()),
                present(self.course_name.as_ref()),
            )
        } else if self.product_id.is_some() || self.product_name.is_some() {
            (
                ItemKind::Product,
                "productId",
                "productName",
                present(self.product_id.as_ref()),
                present(self.product_name.as_ref()),
            )
        } else {
            (
                self.item_kind.unwrap_or(ItemKind::Product),
                "itemId",
                "itemName",
                present(self.item_id.as_ref()),
                present(self.item_name.as_ref()),
            )
        };

        let amount = self.amount.as_ref().and_then(parse_amount);
        let name = present(self.customer_name.as_ref());
        let email = present(self.customer_email.as_ref());
        let phone = present(self.customer_phone.as_ref());
        let user_id = present(self.user_id.as_ref());

        let mut missing = Vec::new();
        if item_id.is_none() {
            missing.push(id_field);
        }
        if item_name.is_none() {
            missing.push(name_field);
        }
        if amount.is_none_or(|a| a.is_zero()) {
            missing.push("amount");
        }
        if name.is_none() {
            missing.push("customerName");
        }
        if email.is_none() {
            missing.push("customerEmail");
        }
        if phone.is_none() {
            missing.push("customerPhone");
        }
        // Course purchases are tied to an account
        if kind == ItemKind::Course && user_id.is_none() {
            missing.push("userId");
        }
        if !missing.is_empty() {
            return Err(format!("Missing required fields: {}", missing.join(", ")));
        }

        let (Some(item_id), Some(item_name), Some(amount)) = (item_id, item_name, amount) else {
            return Err(GENERIC_SESSION_ERROR.into());
        };
        if amount.is_sign_negative() {
            return Err("Amount must be positive".into());
        }

        let buyer = BuyerDetails::new(
            name.unwrap_or_default(),
            email.unwrap_or_default(),
            phone.unwrap_or_default(),
        );
        validate(&buyer).map_err(|e| e.to_string())?;

        let order_id = present(self.order_id.as_ref())
            .filter(|id| is_usable_order_id(id))
            .unwrap_or_else(|| OrderId::generate().to_string());

        Ok(ValidOrder {
            order_id,
            kind,
            item_id,
            item_name,
            amount,
            buyer,
            user_id,
        })
    }
}

/// Create a provider order and return its payment session token
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderPayload>, JsonRejection>,
) -> OrderReply {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable order request");
            return order_error(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let order = match payload.validate() {
        Ok(order) => order,
        Err(message) => return order_error(StatusCode::BAD_REQUEST, message),
    };

    let Some(payments) = state.payments.as_ref() else {
        return order_error(StatusCode::SERVICE_UNAVAILABLE, "Payments not configured");
    };

    let note_prefix = match order.kind {
        ItemKind::Course => "Course",
        ItemKind::Product => "Product",
    };
    let request = NewProviderOrder::new(
        &order.order_id,
        order.amount,
        CustomerDetails {
            customer_id: CustomerDetails::customer_id_for(
                order.user_id.as_deref(),
                &order.buyer.phone,
            ),
            customer_name: order.buyer.name.clone(),
            customer_email: order.buyer.email.clone(),
            customer_phone: order.buyer.phone.clone(),
        },
        OrderMeta {
            return_url: state.urls.return_url(order.kind, &order.item_id),
            notify_url: state.urls.notify_url(),
        },
        format!("{note_prefix}: {}", order.item_name),
    )
    .with_expiry_time(Utc::now() + state.config.order_ttl);

    let created = match payments.provider.create_order(&request).await {
        Ok(created) => created,
        Err(e) if e.is_client_error() => {
            tracing::warn!(order_id = %order.order_id, error = %e, "Provider rejected order");
            return order_error(StatusCode::BAD_REQUEST, e.user_message());
        }
        Err(e) => {
            tracing::error!(order_id = %order.order_id, error = %e, "Provider order creation failed");
            return order_error(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_SESSION_ERROR);
        }
    };

    let session = created.payment_session_id.unwrap_or_default();
    let pending = PendingOrder {
        order_id: order.order_id.clone(),
        item_kind: order.kind,
        item_id: order.item_id,
        item_name: order.item_name,
        amount: order.amount,
        buyer_id: order.user_id,
        customer_email: order.buyer.email,
        payment_session_id: session.clone(),
        created_at: Utc::now(),
    };
    if let Err(e) = state.orders.insert(pending) {
        tracing::error!(order_id = %order.order_id, error = %e, "Could not remember order");
        return order_error(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_SESSION_ERROR);
    }

    tracing::info!(order_id = %order.order_id, kind = order.kind.as_str(), "Order session created");
    (
        StatusCode::OK,
        Json(CreateOrderResponse::created(session, order.order_id)),
    )
}

/// Anything but POST on the order endpoint
pub async fn method_not_allowed() -> OrderReply {
    order_error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

// ============================================================================
// Webhook
// ============================================================================

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Provider payment notifications
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    let payments = state.payments.as_ref().ok_or_else(payments_disabled)?;

    let (Some(signature), Some(timestamp)) = (
        header(&headers, SIGNATURE_HEADER),
        header(&headers, TIMESTAMP_HEADER),
    ) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing webhook signature",
            "MISSING_SIGNATURE",
        ));
    };

    let handler = WebhookHandler::new(state.orders.clone(), state.purchases.clone());

    let event = handler
        .parse_event(&body, signature, timestamp, &payments.webhook_secret)
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook rejected");
            api_error(StatusCode::BAD_REQUEST, "Invalid signature", "INVALID_SIGNATURE")
        })?;

    handler.handle(event).map_err(|e| {
        tracing::error!(error = %e, "Webhook processing error");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook processing failed",
            "WEBHOOK_ERROR",
        )
    })?;

    Ok(StatusCode::OK)
}

// ============================================================================
// Purchase records
// ============================================================================

/// Record a purchase reported by the browser after a confirmed payment
///
/// The record is built from the server's own pending order, never from the
/// request body: the provider must report the order as paid, and the order
/// must be for the same buyer and item. An order settled earlier only
/// answers for the record it already produced.
pub async fn record_purchase(
    State(state): State<AppState>,
    Json(payload): Json<RecordPurchaseRequest>,
) -> Result<Json<PurchaseRecord>, ApiError> {
    if payload.buyer_id.trim().is_empty() || payload.item_id.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "buyerId and itemId are required",
            "MISSING_FIELDS",
        ));
    }

    let payments = state.payments.as_ref().ok_or_else(payments_disabled)?;
    let order_id = payload.details.order_id.clone();

    let provider_order = payments
        .provider
        .fetch_order(&order_id)
        .await
        .map_err(|e| {
            tracing::warn!(order_id = %order_id, error = %e, "Could not check order status");
            match e {
                PaymentError::UnknownOrder(_) => unknown_order(),
                e if e.is_retryable() => {
                    api_error(StatusCode::BAD_GATEWAY, e.user_message(), "PROVIDER_ERROR")
                }
                e => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.user_message(), "PROVIDER_ERROR"),
            }
        })?;
    if !provider_order.is_paid() {
        return Err(api_error(
            StatusCode::CONFLICT,
            "Order is not paid",
            "ORDER_NOT_PAID",
        ));
    }

    let known = state
        .orders
        .get(&order_id)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "STORAGE_ERROR"))?;

    let Some(pending) = known else {
        // Settled by an earlier call or by the webhook
        let existing = state
            .purchases
            .get(&payload.buyer_id, &payload.item_id)
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "STORAGE_ERROR"))?;
        return match existing {
            Some(record) if record.order_id == order_id => Ok(Json(record)),
            _ => {
                tracing::warn!(
                    order_id = %order_id,
                    buyer_id = %payload.buyer_id,
                    item_id = %payload.item_id,
                    "Purchase claimed for an order with no pending checkout"
                );
                Err(unknown_order())
            }
        };
    };

    if pending.buyer_key() != payload.buyer_id
        || pending.item_id != payload.item_id
        || pending.amount != payload.details.amount
    {
        tracing::warn!(order_id = %order_id, buyer_id = %payload.buyer_id, "Purchase does not match order");
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Order belongs to another purchase",
            "ORDER_MISMATCH",
        ));
    }
    if provider_order
        .order_amount
        .is_some_and(|paid| paid < pending.amount)
    {
        tracing::warn!(order_id = %order_id, expected = %pending.amount, "Provider order amount short");
        return Err(api_error(
            StatusCode::CONFLICT,
            "Paid amount does not cover the order",
            "AMOUNT_MISMATCH",
        ));
    }

    let record = state
        .purchases
        .upsert(PurchaseRecord::new(
            pending.buyer_key(),
            &pending.item_id,
            pending.purchase_details(),
        ))
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.user_message(), "STORAGE_ERROR"))?;

    // Settled; a later webhook finds nothing left to do
    if let Err(e) = state.orders.remove(&order_id) {
        tracing::warn!(order_id = %order_id, error = %e, "Could not clear settled order");
    }

    tracing::info!(order_id = %order_id, buyer_id = %record.buyer_id, item_id = %record.item_id, "Recorded purchase");
    Ok(Json(record))
}

fn unknown_order() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Order not found", "UNKNOWN_ORDER")
}

/// Entitlement check for one item
pub async fn get_purchase(
    State(state): State<AppState>,
    Path((buyer_id, item_id)): Path<(String, String)>,
) -> Result<Json<PurchaseRecord>, ApiError> {
    state
        .purchases
        .get(&buyer_id, &item_id)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "STORAGE_ERROR"))?
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Purchase not found", "NOT_FOUND"))
}

/// Everything a buyer owns
pub async fn list_purchases(
    State(state): State<AppState>,
    Path(buyer_id): Path<String>,
) -> Result<Json<Vec<PurchaseRecord>>, ApiError> {
    state
        .purchases
        .list_for_buyer(&buyer_id)
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "STORAGE_ERROR"))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.payments.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn course_payload() -> CreateOrderPayload {
        CreateOrderPayload {
            order_id: Some("ORDER_42_1".into()),
            course_id: Some("42".into()),
            course_name: Some("Algebra I".into()),
            amount: Some(serde_json::json!(499)),
            customer_name: Some("Jane Doe".into()),
            customer_email: Some("jane@x.com".into()),
            customer_phone: Some("9876543210".into()),
            user_id: Some("u1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_course_order() {
        let order = course_payload().validate().unwrap();
        assert_eq!(order.kind, ItemKind::Course);
        assert_eq!(order.order_id, "ORDER_42_1");
        assert_eq!(order.amount, dec!(499));
    }

    #[test]
    fn test_missing_fields_listed_in_order() {
        let payload = CreateOrderPayload {
            course_name: None,
            user_id: None,
            ..course_payload()
        };
        assert_eq!(
            payload.validate().unwrap_err(),
            "Missing required fields: courseName, userId"
        );
    }

    #[test]
    fn test_guest_product_needs_no_user() {
        let payload = CreateOrderPayload {
            course_id: None,
            course_name: None,
            product_id: Some("7".into()),
            product_name: Some("NEET Notes".into()),
            amount: Some(serde_json::json!("10.50")),
            user_id: None,
            ..course_payload()
        };
        let order = payload.validate().unwrap();
        assert_eq!(order.kind, ItemKind::Product);
        assert_eq!(order.amount, dec!(10.5));
    }

    #[test]
    fn test_aliases() {
        let payload: CreateOrderPayload = serde_json::from_value(serde_json::json!({
            "itemId": "7",
            "itemName": "NEET Notes",
            "amount": 10,
            "buyerName": "Jane Doe",
            "buyerEmail": "jane@x.com",
            "buyerPhone": "9876543210"
        }))
        .unwrap();
        let order = payload.validate().unwrap();
        assert_eq!(order.item_id, "7");
        assert_eq!(order.buyer.name, "Jane Doe");
        assert!(order.order_id.starts_with("ORDER_"));
    }

    #[test]
    fn test_buyer_rules_apply() {
        let payload = CreateOrderPayload {
            customer_phone: Some("12345".into()),
            ..course_payload()
        };
        assert_eq!(
            payload.validate().unwrap_err(),
            "Please enter a valid 10-digit phone number."
        );
    }

    #[test]
    fn test_unusable_order_id_replaced() {
        let payload = CreateOrderPayload {
            order_id: Some("../../etc".into()),
            ..course_payload()
        };
        assert!(payload.validate().unwrap().order_id.starts_with("ORDER_"));
    }
}
