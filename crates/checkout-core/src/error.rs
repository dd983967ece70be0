//! Checkout Error Types

use thiserror::Error;

use crate::buyer::ValidationError;

/// Result type alias
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout workflow errors
///
/// Every variant is recoverable: the controller surfaces it and returns the
/// buyer to a state where they can act again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// Buyer details rejected before any request was made
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Order backend unreachable or refused to create a session
    #[error("Order session request failed: {0}")]
    SessionRequest(String),

    /// Payment provider SDK could not be loaded
    #[error("Payment SDK unavailable: {0}")]
    SdkUnavailable(String),

    /// Provider rejected the session or the widget reported a failure
    #[error("Payment handoff failed: {0}")]
    Handoff(String),

    /// Item cannot be purchased (missing id, non-positive price, ...)
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// Success return did not match a pending checkout
    #[error("Unmatched payment return: {0}")]
    UnmatchedReturn(String),

    /// Purchase record or stash persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CheckoutError {
    /// Check if re-submitting the form can succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SessionRequest(_) | Self::Handoff(_) | Self::Storage(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::SessionRequest(msg) => msg.clone(),
            Self::SdkUnavailable(_) => {
                "The payment system failed to load. Please retry loading it.".into()
            }
            Self::Handoff(msg) => format!("Payment failed: {msg}"),
            Self::InvalidItem(_) => "This item cannot be purchased right now.".into(),
            Self::UnmatchedReturn(_) => {
                "We could not match this payment to your checkout.".into()
            }
            Self::Storage(_) => {
                "Payment received, but we could not save your purchase. Please contact support."
                    .into()
            }
            Self::Config(_) => "Checkout is not configured.".into(),
        }
    }
}
