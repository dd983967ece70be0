//! Payment Provider SDK
//!
//! The provider ships a browser script that installs one global factory per
//! page. [`SdkHandle`] owns that resource: it loads the script once, publishes
//! the load status, and hands the same SDK object to every checkout on the
//! page.

use std::cell::OnceCell;
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{CheckoutError, Result};

/// Provider environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkMode {
    Production,
    #[default]
    Sandbox,
}

impl SdkMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Sandbox => "sandbox",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Sandbox,
        }
    }
}

/// Frame navigated by a redirect checkout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectTarget {
    #[default]
    #[serde(rename = "_self")]
    SelfFrame,
    #[serde(rename = "_top")]
    Top,
}

/// Arguments of the SDK's redirect `checkout` call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectCheckout {
    pub payment_session_id: String,
    pub redirect_target: RedirectTarget,
}

/// Visual options for the drop-in widget
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropinStyle {
    pub background_color: String,
    pub color: String,
    pub font_family: String,
    pub font_size: String,
    pub error_color: String,
    pub theme: String,
    pub border_radius: String,
    pub button_background: String,
    pub button_text: String,
}

impl Default for DropinStyle {
    fn default() -> Self {
        Self {
            background_color: "#ffffff".into(),
            color: "#1f2937".into(),
            font_family: "Inter, sans-serif".into(),
            font_size: "16px".into(),
            error_color: "#ef4444".into(),
            theme: "light".into(),
            border_radius: "0.375rem".into(),
            button_background: "#4f46e5".into(),
            button_text: "#ffffff".into(),
        }
    }
}

/// Order reference inside a drop-in success payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessOrder {
    #[serde(rename = "orderId")]
    pub order_id: String,
}

/// Drop-in success payload (`{ order: { orderId } }`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSuccess {
    pub order: SuccessOrder,
}

impl PaymentSuccess {
    pub fn for_order(order_id: impl Into<String>) -> Self {
        Self {
            order: SuccessOrder {
                order_id: order_id.into(),
            },
        }
    }
}

/// Drop-in failure payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailure {
    #[serde(default)]
    pub message: String,
}

impl PaymentFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Callbacks handed to the drop-in widget at mount time
pub trait HandoffCallbacks {
    fn on_success(&self, data: PaymentSuccess);
    fn on_failure(&self, error: PaymentFailure);
}

/// Drop-in mount configuration
pub struct DropinConfig {
    pub components: Vec<String>,
    pub order_token: String,
    pub style: DropinStyle,
    pub callbacks: Rc<dyn HandoffCallbacks>,
}

/// A loaded provider SDK instance
pub trait PaymentSdk {
    /// Hand the page over to the provider's hosted checkout
    fn checkout(&self, options: RedirectCheckout) -> Result<()>;

    /// Mount the drop-in widget into the element with id `container`
    fn dropin(&self, container: &str, config: DropinConfig) -> Result<()>;
}

/// Fetches and instantiates the provider SDK
#[async_trait(?Send)]
pub trait SdkLoader {
    async fn load(&self, mode: SdkMode) -> Result<Rc<dyn PaymentSdk>>;
}

/// SDK load status
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SdkStatus {
    NotLoaded,
    Loading,
    Loaded,
    Failed(String),
}

/// Page-wide SDK resource
///
/// The SDK object is written once and only read afterwards. A failed load
/// stays failed until [`SdkHandle::reload`] is called.
pub struct SdkHandle {
    loader: Rc<dyn SdkLoader>,
    mode: SdkMode,
    status: watch::Sender<SdkStatus>,
    sdk: OnceCell<Rc<dyn PaymentSdk>>,
}

impl SdkHandle {
    pub fn new(loader: Rc<dyn SdkLoader>, mode: SdkMode) -> Self {
        let (status, _) = watch::channel(SdkStatus::NotLoaded);
        Self {
            loader,
            mode,
            status,
            sdk: OnceCell::new(),
        }
    }

    pub const fn mode(&self) -> SdkMode {
        self.mode
    }

    pub fn status(&self) -> SdkStatus {
        self.status.borrow().clone()
    }

    /// Watch load status changes
    pub fn subscribe(&self) -> watch::Receiver<SdkStatus> {
        self.status.subscribe()
    }

    /// The SDK, if it has finished loading
    pub fn get(&self) -> Option<Rc<dyn PaymentSdk>> {
        self.sdk.get().cloned()
    }

    /// Wait until the SDK is usable, loading it on first use
    ///
    /// Concurrent callers share the single in-flight load.
    pub async fn ready(&self) -> Result<Rc<dyn PaymentSdk>> {
        loop {
            let status = self.status();
            match status {
                SdkStatus::Loaded => {
                    return self.get().ok_or_else(|| {
                        CheckoutError::SdkUnavailable("SDK reported loaded but missing".into())
                    });
                }
                SdkStatus::Failed(msg) => return Err(CheckoutError::SdkUnavailable(msg)),
                SdkStatus::NotLoaded => return self.load().await,
                SdkStatus::Loading => {
                    let mut rx = self.status.subscribe();
                    rx.wait_for(|s| *s != SdkStatus::Loading)
                        .await
                        .map_err(|_| CheckoutError::SdkUnavailable("SDK loader dropped".into()))?;
                }
            }
        }
    }

    /// Retry after a failed load
    pub async fn reload(&self) -> Result<Rc<dyn PaymentSdk>> {
        if matches!(self.status(), SdkStatus::Failed(_)) {
            self.status.send_replace(SdkStatus::NotLoaded);
        }
        self.ready().await
    }

    async fn load(&self) -> Result<Rc<dyn PaymentSdk>> {
        self.status.send_replace(SdkStatus::Loading);
        tracing::debug!(mode = self.mode.as_str(), "Loading payment SDK");

        let guard = LoadGuard {
            status: &self.status,
        };
        let loaded = self.loader.load(self.mode).await;
        guard.disarm();

        match loaded {
            Ok(sdk) => {
                let sdk = Rc::clone(self.sdk.get_or_init(|| sdk));
                self.status.send_replace(SdkStatus::Loaded);
                tracing::info!(mode = self.mode.as_str(), "Payment SDK loaded");
                Ok(sdk)
            }
            Err(e) => {
                let msg = match e {
                    CheckoutError::SdkUnavailable(msg) => msg,
                    other => other.to_string(),
                };
                tracing::warn!(error = %msg, "Payment SDK failed to load");
                self.status.send_replace(SdkStatus::Failed(msg.clone()));
                Err(CheckoutError::SdkUnavailable(msg))
            }
        }
    }
}

/// Puts an abandoned load back to `NotLoaded` so the next caller starts over
struct LoadGuard<'a> {
    status: &'a watch::Sender<SdkStatus>,
}

impl LoadGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        tracing::debug!("Payment SDK load abandoned");
        self.status.send_replace(SdkStatus::NotLoaded);
    }
}
