//! # checkout-core
//!
//! The checkout session workflow for the course and e-book storefront.
//!
//! ## Flow
//!
//! ```text
//! ┌────────────┐   ┌───────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │   Buyer    │──▶│ Order session │──▶│ Payment handoff  │──▶│   Purchase    │
//! │ validation │   │   requester   │   │ (redirect/dropin)│   │ record writer │
//! └────────────┘   └───────────────┘   └──────────────────┘   └───────────────┘
//! ```
//!
//! Everything outside the workflow (the payment provider's JS SDK, the toast
//! layer, the record store, the order backend) is reached through a trait, so
//! the same controller runs in the browser and under `cargo test`.
//!
//! ## Handoff modes
//!
//! - **Redirect**: the provider takes over the page and later sends the buyer
//!   back to `/success?order_id=..&course_id=..`. The pending checkout is
//!   stashed first so the success view can match it ([`SuccessReturn::confirm`](success::SuccessReturn::confirm)).
//! - **Embedded**: the provider's drop-in widget is mounted in a container and
//!   reports back through [`sdk::HandoffCallbacks`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_core::{CheckoutController, Collaborators, CheckoutConfig, Item};
//!
//! let mut controller = CheckoutController::new(item, collaborators, CheckoutConfig::default())
//!     .with_buyer_id("uid_123");
//! controller.input(BuyerField::Name, "Jane Doe");
//! // ...
//! let phase = controller.submit().await;
//! ```

pub mod amount;
pub mod buyer;
pub mod config;
pub mod error;
pub mod handoff;
pub mod item;
pub mod notify;
pub mod order;
pub mod purchase;
pub mod requester;
pub mod sdk;
pub mod success;

#[cfg(test)]
mod testing;

pub use buyer::{BuyerDetails, BuyerField, ValidationError, validate};
pub use config::CheckoutConfig;
pub use error::{CheckoutError, Result};
pub use handoff::{
    CheckoutCommand, CheckoutController, CheckoutPhase, Collaborators, HandoffMode, RetryAction,
};
pub use item::{Item, ItemKind};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use order::{CreateOrderResponse, OrderId, OrderRequest, OrderSessionResult};
pub use purchase::{
    HttpPurchaseReader, HttpPurchaseWriter, MemoryPurchaseStore, PurchaseDetails, PurchaseRecord,
    PurchaseRecordWriter, PurchaseStore, RecordPurchaseRequest, StorePurchaseWriter,
};
pub use requester::{HttpOrderSessionRequester, OrderSessionRequester};
pub use sdk::{
    DropinConfig, DropinStyle, HandoffCallbacks, PaymentFailure, PaymentSdk, PaymentSuccess,
    RedirectCheckout, RedirectTarget, SdkHandle, SdkLoader, SdkMode, SdkStatus,
};
pub use success::{CheckoutStash, MemoryCheckoutStash, PendingCheckout, SuccessReturn, Unlocked};
