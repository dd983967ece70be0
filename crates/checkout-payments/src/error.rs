//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Provider answered with an error status
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Provider could not be reached or sent an unreadable reply
    #[error("Provider transport error: {0}")]
    Transport(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Order id not in the order book
    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { status, .. } => *status >= 500,
            Self::Transport(_) | Self::Storage(_) => true,
            _ => false,
        }
    }

    /// Provider rejected the request itself (bad amount, bad phone, ...)
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Provider { status, .. } if *status >= 400 && *status < 500)
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            Self::Provider { status, message } if (400..500).contains(status) => message.as_str(),
            Self::Provider { .. } | Self::Transport(_) => "Failed to create payment order",
            Self::UnknownOrder(_) => "Order not found.",
            Self::Config(_) => "Payments are not configured.",
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<checkout_core::CheckoutError> for PaymentError {
    fn from(e: checkout_core::CheckoutError) -> Self {
        Self::Storage(e.to_string())
    }
}
