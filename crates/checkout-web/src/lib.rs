//! course-checkout Web Frontend
//!
//! Leptos-based WASM frontend: checkout form with Cashfree redirect or
//! drop-in handoff, the post-payment success view, and the purchased
//! content gate.

mod api;
mod app;
mod cashfree;
mod components;
mod pages;
mod storage;

pub use app::App;

use wasm_bindgen::prelude::*;

/// WASM entry point
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    leptos::mount::mount_to_body(App);
}
