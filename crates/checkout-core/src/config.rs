//! Checkout Configuration

use serde::{Deserialize, Serialize};

use crate::handoff::HandoffMode;
use crate::sdk::{DropinStyle, RedirectTarget, SdkMode};

/// Client-side checkout settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Order backend endpoint
    pub order_endpoint: String,

    /// Purchase record endpoint (signed-in buyers)
    pub purchases_endpoint: String,

    /// Provider environment passed to the SDK factory
    pub sdk_mode: SdkMode,

    /// Full-page redirect or embedded drop-in
    pub handoff_mode: HandoffMode,

    /// Frame the redirect checkout navigates
    pub redirect_target: RedirectTarget,

    /// Element id the drop-in widget mounts into
    pub dropin_container: String,

    /// Payment methods offered by the drop-in widget
    pub dropin_components: Vec<String>,

    pub dropin_style: DropinStyle,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            order_endpoint: "/api/createOrder".into(),
            purchases_endpoint: "/api/purchases".into(),
            sdk_mode: SdkMode::default(),
            handoff_mode: HandoffMode::default(),
            redirect_target: RedirectTarget::default(),
            dropin_container: "cashfree-dropin".into(),
            dropin_components: ["order-details", "card", "upi", "app", "netbanking"]
                .into_iter()
                .map(String::from)
                .collect(),
            dropin_style: DropinStyle::default(),
        }
    }
}

impl CheckoutConfig {
    /// Make relative endpoints absolute against a page origin
    #[must_use]
    pub fn with_origin(mut self, origin: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        for endpoint in [&mut self.order_endpoint, &mut self.purchases_endpoint] {
            if endpoint.starts_with('/') {
                *endpoint = format!("{origin}{endpoint}");
            }
        }
        self
    }

    #[must_use]
    pub fn with_handoff_mode(mut self, mode: HandoffMode) -> Self {
        self.handoff_mode = mode;
        self
    }

    #[must_use]
    pub fn with_sdk_mode(mut self, mode: SdkMode) -> Self {
        self.sdk_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_origin() {
        let config = CheckoutConfig::default().with_origin("https://shop.example/");
        assert_eq!(config.order_endpoint, "https://shop.example/api/createOrder");
        assert_eq!(config.purchases_endpoint, "https://shop.example/api/purchases");
    }
}
