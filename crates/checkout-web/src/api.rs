//! API Client

use std::rc::Rc;

use checkout_core::{
    CheckoutConfig, HandoffMode, HttpPurchaseReader, HttpPurchaseWriter, PurchaseRecord,
    PurchaseRecordWriter, SdkMode,
};
use url::Url;

use crate::storage::LocalEntitlements;

/// Page origin, for absolute endpoints
pub fn origin() -> String {
    web_sys::window()
        .and_then(|w| w.location().origin().ok())
        .unwrap_or_else(|| "http://localhost:3000".into())
}

/// Current page URL
pub fn current_url() -> Option<Url> {
    let href = web_sys::window()?.location().href().ok()?;
    Url::parse(&href).ok()
}

/// Decoded query parameters of the current page
pub fn query_pairs() -> Vec<(String, String)> {
    current_url()
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

/// Checkout settings for this page
///
/// The provider environment is fixed at build time (`CASHFREE_ENV`); the
/// handoff mode can be picked per page with `?mode=embedded`.
pub fn checkout_config() -> CheckoutConfig {
    let sdk_mode = option_env!("CASHFREE_ENV")
        .map(SdkMode::from_str)
        .unwrap_or_default();
    let handoff_mode = match query_pairs().iter().find(|(k, _)| k == "mode") {
        Some((_, mode)) if mode == "embedded" => HandoffMode::Embedded,
        _ => HandoffMode::Redirect,
    };

    CheckoutConfig::default()
        .with_origin(&origin())
        .with_sdk_mode(sdk_mode)
        .with_handoff_mode(handoff_mode)
}

/// Signed-in buyers are recorded by the backend, guests on this device
pub fn purchase_writer(config: &CheckoutConfig, buyer_id: Option<&str>) -> Rc<dyn PurchaseRecordWriter> {
    match buyer_id {
        Some(_) => Rc::new(HttpPurchaseWriter::new(&config.purchases_endpoint)),
        None => Rc::new(LocalEntitlements),
    }
}

/// Look up a recorded purchase on the backend
pub async fn fetch_purchase(
    config: &CheckoutConfig,
    buyer_id: &str,
    item_id: &str,
) -> Result<Option<PurchaseRecord>, String> {
    HttpPurchaseReader::new(&config.purchases_endpoint)
        .get(buyer_id, item_id)
        .await
        .map_err(|e| e.to_string())
}

/// Everything a signed-in buyer has bought, newest first
pub async fn fetch_purchases(
    config: &CheckoutConfig,
    buyer_id: &str,
) -> Result<Vec<PurchaseRecord>, String> {
    HttpPurchaseReader::new(&config.purchases_endpoint)
        .list(buyer_id)
        .await
        .map_err(|e| e.to_string())
}

/// Full page navigation
pub fn navigate(location: &str) {
    let Some(window) = web_sys::window() else {
        return;
    };
    if let Err(e) = window.location().set_href(location) {
        tracing::warn!(location, error = ?e, "Navigation failed");
    }
}
