//! Checkout Page
//!
//! The form talks to a [`CheckoutController`] running in its own task. The
//! view only sends [`CheckoutCommand`]s and mirrors the published phase into
//! signals.

use std::rc::Rc;

use checkout_core::{
    BuyerField, CheckoutCommand, CheckoutController, CheckoutPhase, Collaborators, HandoffMode,
    HttpOrderSessionRequester, Item, ItemKind, RetryAction, SdkStatus,
};
use leptos::prelude::*;
use leptos::task::spawn_local;
use tokio::sync::mpsc::UnboundedSender;

use crate::api;
use crate::cashfree;
use crate::components::{Price, ToastNotifier, Toasts};
use crate::storage::{self, SessionStash};

#[component]
pub fn CheckoutPage() -> impl IntoView {
    match Item::from_query(api::query_pairs()) {
        // Courses are only sold to signed-in buyers
        Ok(item) if item.kind == ItemKind::Course && storage::buyer_id().is_none() => view! {
            <div class="checkout-error">
                <h2>{item.name}</h2>
                <p>"Please sign in to purchase this course."</p>
                <a href="/" class="btn">"Back to courses"</a>
            </div>
        }
        .into_any(),
        Ok(item) => view! { <CheckoutForm item=item /> }.into_any(),
        Err(e) => {
            tracing::warn!(error = %e, "Checkout opened without a valid item");
            view! {
                <div class="checkout-error">
                    <h2>"Nothing to check out"</h2>
                    <p>{e.user_message()}</p>
                    <a href="/" class="btn">"Back to courses"</a>
                </div>
            }
            .into_any()
        }
    }
}

#[component]
fn CheckoutForm(item: Item) -> impl IntoView {
    let config = api::checkout_config();
    let notifier = ToastNotifier::new();
    let buyer_id = storage::buyer_id();
    let sdk = cashfree::shared_sdk(config.sdk_mode);

    let deps = Collaborators {
        sdk: Rc::clone(&sdk),
        requester: Rc::new(HttpOrderSessionRequester::from_config(&config)),
        writer: api::purchase_writer(&config, buyer_id.as_deref()),
        stash: Rc::new(SessionStash),
        notifier: Rc::new(notifier),
    };
    let mut controller = CheckoutController::new(item.clone(), deps, config.clone());
    if let Some(id) = buyer_id {
        controller = controller.with_buyer_id(id);
    }

    let phase = RwSignal::new(controller.phase());
    let sdk_status = RwSignal::new(sdk.status());
    let name = RwSignal::new(String::new());
    let email = RwSignal::new(String::new());
    let phone = RwSignal::new(String::new());

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let mut phase_rx = controller.subscribe();
    spawn_local(controller.run(rx));

    spawn_local(async move {
        while phase_rx.changed().await.is_ok() {
            let next = phase_rx.borrow_and_update().clone();
            let clear_form = matches!(
                next,
                CheckoutPhase::HandoffInProgress {
                    mode: HandoffMode::Redirect,
                    ..
                } | CheckoutPhase::Succeeded { .. }
            );
            if let CheckoutPhase::Succeeded { location, .. } = &next {
                api::navigate(location);
            }
            if phase.try_set(next).is_some() {
                break;
            }
            if clear_form {
                for field in [name, email, phone] {
                    field.set(String::new());
                }
            }
        }
    });

    // Load the SDK while the buyer types
    let mut status_rx = sdk.subscribe();
    spawn_local(async move {
        if let Err(e) = sdk.ready().await {
            tracing::debug!(error = %e, "SDK preload failed");
        }
    });
    spawn_local(async move {
        loop {
            let status = status_rx.borrow_and_update().clone();
            if sdk_status.try_set(status).is_some() || status_rx.changed().await.is_err() {
                break;
            }
        }
    });

    let teardown = tx.clone();
    on_cleanup(move || {
        // Controller may already be gone
        let _ = teardown.send(CheckoutCommand::Teardown);
    });

    let submit_tx = tx.clone();
    let on_submit = move |ev: leptos::ev::SubmitEvent| {
        ev.prevent_default();
        let _ = submit_tx.send(CheckoutCommand::Submit);
    };
    let cancel_tx = tx.clone();
    let retry_tx = tx.clone();
    let record_tx = tx.clone();

    let busy = move || {
        matches!(
            phase.get(),
            CheckoutPhase::AwaitingSession | CheckoutPhase::HandoffInProgress { .. }
        )
    };
    let can_submit = move || {
        phase.get().accepts_submit()
            && [name, email, phone]
                .iter()
                .all(|field| !field.get().trim().is_empty())
    };
    let needs_sdk_reload = move || {
        matches!(
            phase.get(),
            CheckoutPhase::Failed {
                retry: RetryAction::ReloadSdk,
                ..
            }
        )
    };
    let needs_record_retry = move || {
        matches!(
            phase.get(),
            CheckoutPhase::Failed {
                retry: RetryAction::RecordPurchase,
                ..
            }
        )
    };

    let price = item.price.to_string();
    let pay_label = format!("Pay ₹{price}");
    let embedded = config.handoff_mode == HandoffMode::Embedded;
    let container = config.dropin_container.clone();

    view! {
        <div class="checkout">
            <Toasts notifier=notifier />

            <section class="summary">
                <h2>{item.name.clone()}</h2>
                <Price amount=price />
            </section>

            <form class="buyer-form" on:submit=on_submit>
                <BuyerInput label="Full name" kind="text" field=BuyerField::Name value=name tx=tx.clone() />
                <BuyerInput label="Email" kind="email" field=BuyerField::Email value=email tx=tx.clone() />
                <BuyerInput label="Phone" kind="tel" field=BuyerField::Phone value=phone tx=tx />

                <button type="submit" class="btn btn-primary" disabled=move || !can_submit()>
                    {move || if busy() { "Processing...".to_string() } else { pay_label.clone() }}
                </button>
            </form>

            <Show when=busy>
                <button
                    class="btn"
                    on:click={
                        let cancel_tx = cancel_tx.clone();
                        move |_| {
                            let _ = cancel_tx.send(CheckoutCommand::Cancel);
                        }
                    }
                >
                    "Cancel"
                </button>
            </Show>

            <Show when=move || sdk_status.get() == SdkStatus::Loading>
                <p class="sdk-status">"Loading payment system..."</p>
            </Show>

            <Show when=needs_sdk_reload>
                <button
                    class="btn"
                    on:click={
                        let retry_tx = retry_tx.clone();
                        move |_| {
                            let _ = retry_tx.send(CheckoutCommand::RetrySdk);
                        }
                    }
                >
                    "Retry loading payment system"
                </button>
            </Show>

            <Show when=needs_record_retry>
                <button
                    class="btn btn-primary"
                    on:click={
                        let record_tx = record_tx.clone();
                        move |_| {
                            let _ = record_tx.send(CheckoutCommand::RetryRecord);
                        }
                    }
                >
                    "Retry saving purchase"
                </button>
            </Show>

            {embedded.then(|| view! { <div id=container class="dropin-container"></div> })}
        </div>
    }
}

#[component]
fn BuyerInput(
    label: &'static str,
    kind: &'static str,
    field: BuyerField,
    value: RwSignal<String>,
    tx: UnboundedSender<CheckoutCommand>,
) -> impl IntoView {
    view! {
        <div class="field">
            <label>{label}</label>
            <input
                type=kind
                required=true
                prop:value=move || value.get()
                on:input=move |ev| {
                    let text = event_target_value(&ev);
                    value.set(text.clone());
                    let _ = tx.send(CheckoutCommand::Input(field, text));
                }
            />
        </div>
    }
}
