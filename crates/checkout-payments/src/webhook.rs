//! Cashfree Webhook Handling
//!
//! The provider signs each notification with
//! `base64(HMAC-SHA256(timestamp || raw_body, client_secret))` and sends the
//! result in `x-webhook-signature`, the timestamp in `x-webhook-timestamp`.
//! A verified `PAYMENT_SUCCESS_WEBHOOK` for a known order writes the
//! purchase record.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use checkout_core::{PurchaseRecord, PurchaseStore};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{PaymentError, Result};
use crate::orders::OrderBook;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Payment captured - write the purchase
    PaymentSucceeded {
        order_id: String,
        payment_id: Option<String>,
        amount: Option<Decimal>,
    },

    /// Payment attempt failed; the buyer may retry
    PaymentFailed {
        order_id: String,
        message: Option<String>,
    },

    /// Buyer closed the payment page
    PaymentDropped { order_id: String },

    /// Unhandled event type
    Other { event_type: String },
}

#[derive(Deserialize)]
struct Payload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<PayloadData>,
}

#[derive(Deserialize)]
struct PayloadData {
    order: PayloadOrder,
    #[serde(default)]
    payment: Option<PayloadPayment>,
}

#[derive(Deserialize)]
struct PayloadOrder {
    order_id: String,
}

#[derive(Deserialize)]
struct PayloadPayment {
    #[serde(default)]
    cf_payment_id: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "checkout_core::amount::deserialize_option")]
    payment_amount: Option<Decimal>,
    #[serde(default)]
    payment_message: Option<String>,
}

/// Compute the signature the provider would send for this body
pub fn sign(timestamp: &str, payload: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(payload.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Constant-time signature check
pub fn verify_signature(payload: &str, signature: &str, timestamp: &str, secret: &str) -> Result<()> {
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| PaymentError::WebhookSignature("signature is not base64".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Config(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| PaymentError::WebhookSignature("signature mismatch".into()))
}

/// Webhook handler
pub struct WebhookHandler<B: OrderBook + ?Sized, S: PurchaseStore + ?Sized> {
    orders: Arc<B>,
    purchases: Arc<S>,
}

impl<B: OrderBook + ?Sized, S: PurchaseStore + ?Sized> WebhookHandler<B, S> {
    pub const fn new(orders: Arc<B>, purchases: Arc<S>) -> Self {
        Self { orders, purchases }
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(
        &self,
        payload: &str,
        signature: &str,
        timestamp: &str,
        secret: &str,
    ) -> Result<WebhookEvent> {
        verify_signature(payload, signature, timestamp, secret)?;
        parse_payload(payload)
    }

    /// Process a webhook event
    pub fn handle(&self, event: WebhookEvent) -> Result<WebhookEvent> {
        match &event {
            WebhookEvent::PaymentSucceeded {
                order_id,
                payment_id,
                amount,
            } => {
                tracing::info!(order_id = %order_id, payment_id = ?payment_id, "Payment succeeded");
                self.fulfil(order_id, *amount)?;
            }

            WebhookEvent::PaymentFailed { order_id, message } => {
                tracing::warn!(order_id = %order_id, message = ?message, "Payment failed");
            }

            WebhookEvent::PaymentDropped { order_id } => {
                tracing::info!(order_id = %order_id, "Buyer dropped out of payment");
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
            }
        }

        Ok(event)
    }

    /// Write the purchase for a paid order
    ///
    /// Unknown orders and short payments are logged and skipped so the
    /// provider stops redelivering.
    pub fn fulfil(&self, order_id: &str, paid: Option<Decimal>) -> Result<Option<PurchaseRecord>> {
        let Some(order) = self.orders.get(order_id)? else {
            tracing::warn!(order_id = %order_id, "Paid order not in order book");
            return Ok(None);
        };

        if let Some(paid) = paid {
            if paid < order.amount {
                tracing::warn!(
                    order_id = %order_id,
                    paid = %paid,
                    expected = %order.amount,
                    "Payment amount short of order amount"
                );
                return Ok(None);
            }
        }

        let record = self.purchases.upsert(PurchaseRecord::new(
            order.buyer_key(),
            &order.item_id,
            order.purchase_details(),
        ))?;
        self.orders.remove(order_id)?;

        tracing::info!(
            order_id = %order_id,
            buyer_id = %record.buyer_id,
            item_id = %record.item_id,
            "Recorded purchase from webhook"
        );
        Ok(Some(record))
    }
}

fn parse_payload(payload: &str) -> Result<WebhookEvent> {
    let parsed: Payload =
        serde_json::from_str(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;

    let order_id = || {
        parsed
            .data
            .as_ref()
            .map(|d| d.order.order_id.clone())
            .ok_or_else(|| PaymentError::WebhookParse(format!("{} without order", parsed.event_type)))
    };
    let payment = parsed.data.as_ref().and_then(|d| d.payment.as_ref());

    match parsed.event_type.as_str() {
        "PAYMENT_SUCCESS_WEBHOOK" => Ok(WebhookEvent::PaymentSucceeded {
            order_id: order_id()?,
            payment_id: payment
                .and_then(|p| p.cf_payment_id.as_ref())
                .map(|id| id.as_str().map_or_else(|| id.to_string(), String::from)),
            amount: payment.and_then(|p| p.payment_amount),
        }),
        "PAYMENT_FAILED_WEBHOOK" => Ok(WebhookEvent::PaymentFailed {
            order_id: order_id()?,
            message: payment.and_then(|p| p.payment_message.clone()),
        }),
        "PAYMENT_USER_DROPPED_WEBHOOK" => Ok(WebhookEvent::PaymentDropped {
            order_id: order_id()?,
        }),
        other => Ok(WebhookEvent::Other {
            event_type: other.to_string(),
        }),
    }
}
