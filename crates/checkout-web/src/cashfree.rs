//! Cashfree JS SDK Bindings
//!
//! Binds the `window.Cashfree` global to the checkout workflow's
//! [`PaymentSdk`] and [`SdkLoader`] capabilities. The script is injected at
//! most once per page; every checkout on the page shares one [`SdkHandle`].

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use checkout_core::{
    CheckoutError, DropinConfig, DropinStyle, PaymentFailure, PaymentSdk, PaymentSuccess,
    RedirectCheckout, Result, SdkHandle, SdkLoader, SdkMode,
};
use js_sys::{Function, JSON, Promise, Reflect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlScriptElement;

pub const SDK_URL: &str = "https://sdk.cashfree.com/js/v3/cashfree.js";

thread_local! {
    static SHARED: RefCell<Option<Rc<SdkHandle>>> = const { RefCell::new(None) };
}

/// The page's SDK handle, created on first use
pub fn shared_sdk(mode: SdkMode) -> Rc<SdkHandle> {
    SHARED.with(|slot| {
        Rc::clone(slot.borrow_mut().get_or_insert_with(|| {
            Rc::new(SdkHandle::new(Rc::new(ScriptSdkLoader::default()), mode))
        }))
    })
}

fn js_error(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            Reflect::get(value, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue> {
    let json = serde_json::to_string(value).map_err(|e| CheckoutError::Handoff(e.to_string()))?;
    JSON::parse(&json).map_err(|e| CheckoutError::Handoff(js_error(&e)))
}

fn from_js<T: DeserializeOwned>(value: &JsValue) -> Option<T> {
    let json: String = JSON::stringify(value).ok()?.into();
    serde_json::from_str(&json).ok()
}

fn cashfree_factory() -> Option<Function> {
    let window = web_sys::window()?;
    Reflect::get(&window, &JsValue::from_str("Cashfree"))
        .ok()?
        .dyn_into::<Function>()
        .ok()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DropinOptions<'a> {
    components: &'a [String],
    order_token: &'a str,
    style: &'a DropinStyle,
}

/// A `Cashfree({ mode })` instance
struct CashfreeJs {
    instance: JsValue,
    // Drop-in callbacks live as long as the SDK
    callbacks: RefCell<Vec<Closure<dyn FnMut(JsValue)>>>,
}

impl CashfreeJs {
    fn method(&self, name: &str) -> Result<Function> {
        Reflect::get(&self.instance, &JsValue::from_str(name))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| CheckoutError::Handoff(format!("SDK has no {name}()")))
    }
}

impl PaymentSdk for CashfreeJs {
    fn checkout(&self, options: RedirectCheckout) -> Result<()> {
        let checkout = self.method("checkout")?;
        let result = checkout
            .call1(&self.instance, &to_js(&options)?)
            .map_err(|e| CheckoutError::Handoff(js_error(&e)))?;

        // Only settles when the redirect did not happen
        if let Ok(promise) = result.dyn_into::<Promise>() {
            wasm_bindgen_futures::spawn_local(async move {
                if let Ok(outcome) = JsFuture::from(promise).await {
                    let error = Reflect::get(&outcome, &JsValue::from_str("error"))
                        .unwrap_or(JsValue::UNDEFINED);
                    if !error.is_undefined() && !error.is_null() {
                        tracing::warn!(error = %js_error(&error), "Redirect checkout reported an error");
                    }
                }
            });
        }
        Ok(())
    }

    fn dropin(&self, container: &str, config: DropinConfig) -> Result<()> {
        let element = web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id(container))
            .ok_or_else(|| CheckoutError::Handoff(format!("#{container} not found")))?;

        let options = to_js(&DropinOptions {
            components: &config.components,
            order_token: &config.order_token,
            style: &config.style,
        })?;

        let callbacks = config.callbacks;
        let on_success = {
            let callbacks = Rc::clone(&callbacks);
            Closure::<dyn FnMut(JsValue)>::new(move |data: JsValue| {
                match from_js::<PaymentSuccess>(&data) {
                    Some(success) => callbacks.on_success(success),
                    None => callbacks.on_failure(PaymentFailure::new(
                        "Unreadable payment confirmation",
                    )),
                }
            })
        };
        let on_failure = Closure::<dyn FnMut(JsValue)>::new(move |error: JsValue| {
            let failure = from_js::<PaymentFailure>(&error)
                .unwrap_or_else(|| PaymentFailure::new(js_error(&error)));
            callbacks.on_failure(failure);
        });

        for (key, callback) in [("onSuccess", &on_success), ("onFailure", &on_failure)] {
            Reflect::set(&options, &JsValue::from_str(key), callback.as_ref())
                .map_err(|e| CheckoutError::Handoff(js_error(&e)))?;
        }

        self.method("dropin")?
            .call2(&self.instance, &element, &options)
            .map_err(|e| CheckoutError::Handoff(js_error(&e)))?;

        self.callbacks.borrow_mut().extend([on_success, on_failure]);
        Ok(())
    }
}

/// Loads the SDK by injecting its `<script>` tag
pub struct ScriptSdkLoader {
    src: String,
}

impl Default for ScriptSdkLoader {
    fn default() -> Self {
        Self {
            src: SDK_URL.into(),
        }
    }
}

impl ScriptSdkLoader {
    async fn inject(&self) -> Result<()> {
        let unavailable = |what: &str| CheckoutError::SdkUnavailable(what.to_string());

        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| unavailable("no document"))?;
        let script: HtmlScriptElement = document
            .create_element("script")
            .map_err(|e| unavailable(&js_error(&e)))?
            .dyn_into()
            .map_err(|_| unavailable("script element"))?;
        script.set_src(&self.src);
        script.set_async(true);

        let loaded = Promise::new(&mut |resolve, reject| {
            script.set_onload(Some(&resolve));
            script.set_onerror(Some(&reject));
        });

        document
            .head()
            .ok_or_else(|| unavailable("no <head>"))?
            .append_child(&script)
            .map_err(|e| unavailable(&js_error(&e)))?;

        JsFuture::from(loaded)
            .await
            .map_err(|_| unavailable(&format!("could not load {}", self.src)))?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl SdkLoader for ScriptSdkLoader {
    async fn load(&self, mode: SdkMode) -> Result<Rc<dyn PaymentSdk>> {
        if cashfree_factory().is_none() {
            self.inject().await?;
        }
        let factory = cashfree_factory().ok_or_else(|| {
            CheckoutError::SdkUnavailable("Cashfree global missing after load".into())
        })?;

        let options = JSON::parse(&format!(r#"{{"mode":"{}"}}"#, mode.as_str()))
            .map_err(|e| CheckoutError::SdkUnavailable(js_error(&e)))?;
        let instance = factory
            .call1(&JsValue::NULL, &options)
            .map_err(|e| CheckoutError::SdkUnavailable(js_error(&e)))?;

        Ok(Rc::new(CashfreeJs {
            instance,
            callbacks: RefCell::default(),
        }))
    }
}
