//! # checkout-payments
//!
//! Server-side payment provider integration for course-checkout.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  create order   ┌──────────────┐  session token  ┌─────────────┐
//! │   Server    │────────────────▶│   Cashfree   │────────────────▶│   Browser   │
//! │ (createOrder│                 │  /pg/orders  │                 │  SDK handoff│
//! └─────────────┘                 └──────────────┘                 └─────────────┘
//!        ▲                                │
//!        │     signed webhook             │
//!        └────────────────────────────────┘
//! ```
//!
//! The order book remembers which buyer and item each provider order was
//! for; a verified `PAYMENT_SUCCESS_WEBHOOK` turns the pending order into a
//! purchase record.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_payments::{CashfreeClient, OrderProvider};
//!
//! let client = CashfreeClient::from_env()?;
//! let order = client.create_order(&new_order).await?;
//! // Hand order.payment_session_id to the browser
//! ```

mod cashfree;
mod error;
mod orders;
mod webhook;

pub use cashfree::{
    CashfreeClient, CashfreeConfig, CashfreeEnvironment, CustomerDetails, DEFAULT_API_VERSION,
    NewProviderOrder, OrderMeta, OrderProvider, OrderUrls, ProviderOrder,
};
pub use error::{PaymentError, Result};
pub use orders::{MemoryOrderBook, OrderBook, PendingOrder};
pub use webhook::{
    SIGNATURE_HEADER, TIMESTAMP_HEADER, WebhookEvent, WebhookHandler, sign, verify_signature,
};
