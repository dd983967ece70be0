//! Purchase History Page

use checkout_core::PurchaseRecord;
use leptos::prelude::*;
use leptos::task::spawn_local;

use crate::api;
use crate::components::Price;
use crate::storage::{self, LocalEntitlements};

#[derive(Clone, Debug, PartialEq, Eq)]
enum History {
    Loading,
    Loaded(Vec<PurchaseRecord>),
    Failed(String),
}

/// Backend records for a signed-in buyer, this device's for a guest
async fn load_history() -> History {
    match storage::buyer_id() {
        Some(buyer) => match api::fetch_purchases(&api::checkout_config(), &buyer).await {
            Ok(records) => History::Loaded(records),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load purchases");
                History::Failed("We could not load your purchases. Please try again.".into())
            }
        },
        None => {
            let mut records = LocalEntitlements.records();
            records.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
            History::Loaded(records)
        }
    }
}

#[component]
fn PurchaseRow(record: PurchaseRecord) -> impl IntoView {
    let date = record
        .purchased_at
        .with_timezone(&chrono::Local)
        .format("%d %b %Y, %H:%M")
        .to_string();
    view! {
        <li class="purchase">
            <p><strong>{record.item_name}</strong></p>
            <p>"Amount: " <Price amount=record.amount.to_string() /></p>
            <p>"Order ID: " {record.order_id}</p>
            <p>"Date: " {date}</p>
        </li>
    }
}

#[component]
pub fn ProfilePage() -> impl IntoView {
    let history = RwSignal::new(History::Loading);
    spawn_local(async move {
        history.try_set(load_history().await);
    });

    view! {
        <div class="profile">
            <h1>"Your purchases"</h1>
            {move || match history.get() {
                History::Loading => view! { <p>"Loading your purchases..."</p> }.into_any(),
                History::Failed(message) => view! { <p class="error">{message}</p> }.into_any(),
                History::Loaded(records) if records.is_empty() => view! {
                    <p>"No purchases found."</p>
                    <a href="/" class="btn">"Browse courses"</a>
                }
                .into_any(),
                History::Loaded(records) => view! {
                    <ul class="purchases">
                        {records
                            .into_iter()
                            .map(|record| view! { <PurchaseRow record=record /> })
                            .collect_view()}
                    </ul>
                }
                .into_any(),
            }}
        </div>
    }
}
