//! Success Page
//!
//! Landing view for the provider's return URL. Confirms the pending checkout
//! and then forwards the buyer to the unlocked content.

use std::time::Duration;

use checkout_core::{CheckoutError, Item, ItemKind, PurchaseRecord, SuccessReturn};
use leptos::prelude::*;
use leptos::task::spawn_local;

use crate::api;
use crate::storage::{self, LocalEntitlements, SessionStash};

const FORWARD_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
enum Outcome {
    Confirming,
    Unlocked { item_name: String, location: String },
    Thanks,
    Failed(String),
}

fn unlocked_from_record(ret: &SuccessReturn, record: PurchaseRecord) -> Outcome {
    let item = match ret.item_kind {
        ItemKind::Course => Item::course(record.item_id, record.item_name, record.amount),
        ItemKind::Product => Item::product(record.item_id, record.item_name, record.amount),
    };
    Outcome::Unlocked {
        location: item.content_location(&record.buyer_id),
        item_name: item.name,
    }
}

/// The stash entry is gone once an embedded checkout confirmed itself, so
/// look for the record the confirmation wrote
async fn already_recorded(ret: &SuccessReturn, buyer_id: Option<&str>) -> Option<Outcome> {
    let record = match buyer_id {
        Some(id) => {
            let config = api::checkout_config();
            match api::fetch_purchase(&config, id, &ret.item_id).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "Purchase lookup failed");
                    None
                }
            }
        }
        None => LocalEntitlements.find(&ret.item_id),
    }?;

    (record.order_id == ret.order_id).then(|| unlocked_from_record(ret, record))
}

async fn confirm(ret: SuccessReturn) -> Outcome {
    let config = api::checkout_config();
    let buyer_id = storage::buyer_id();
    let writer = api::purchase_writer(&config, buyer_id.as_deref());

    match ret.confirm(&SessionStash, writer.as_ref()).await {
        Ok(unlocked) => Outcome::Unlocked {
            location: unlocked.content_location(),
            item_name: unlocked.item.name,
        },
        Err(CheckoutError::UnmatchedReturn(reason)) => {
            tracing::info!(%reason, order_id = %ret.order_id, "No pending checkout for return");
            already_recorded(&ret, buyer_id.as_deref())
                .await
                .unwrap_or(Outcome::Thanks)
        }
        Err(e) => {
            tracing::warn!(error = %e, order_id = %ret.order_id, "Confirmation failed");
            Outcome::Failed(e.user_message())
        }
    }
}

#[component]
pub fn SuccessPage() -> impl IntoView {
    let outcome = RwSignal::new(Outcome::Confirming);

    match SuccessReturn::from_query(api::query_pairs()) {
        Ok(ret) => spawn_local(async move {
            let result = confirm(ret).await;
            if let Outcome::Unlocked { location, .. } = &result {
                let location = location.clone();
                set_timeout(move || api::navigate(&location), FORWARD_DELAY);
            }
            outcome.try_set(result);
        }),
        Err(e) => outcome.set(Outcome::Failed(e.user_message())),
    }

    view! {
        <div class="success">
            {move || match outcome.get() {
                Outcome::Confirming => view! { <p>"Confirming your payment..."</p> }.into_any(),
                Outcome::Unlocked { item_name, location } => view! {
                    <h2>"Payment successful!"</h2>
                    <p>"You now have access to " {item_name} "."</p>
                    <p class="muted">"Taking you there in a few seconds."</p>
                    <a href=location class="btn btn-primary">"Go now"</a>
                }
                .into_any(),
                Outcome::Thanks => view! {
                    <h2>"Thank you for your purchase!"</h2>
                    <p>"Your payment is being processed. Access appears once it clears."</p>
                    <a href="/" class="btn">"Back to courses"</a>
                }
                .into_any(),
                Outcome::Failed(message) => view! {
                    <h2>"Something went wrong"</h2>
                    <p class="error">{message}</p>
                    <a href="/" class="btn">"Back to courses"</a>
                }
                .into_any(),
            }}
        </div>
    }
}
