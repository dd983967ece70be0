//! Purchased Content Page

use leptos::prelude::*;
use leptos::task::spawn_local;

use crate::api;
use crate::storage::{self, LocalEntitlements};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Access {
    Checking,
    Granted(String),
    Denied,
}

/// `/my-courses/{buyer}/{item}`
fn path_ids() -> Option<(String, String)> {
    let url = api::current_url()?;
    let mut segments = url.path_segments()?;
    if segments.next()? != "my-courses" {
        return None;
    }
    let buyer = segments.next()?.to_string();
    let item = segments.next()?.to_string();
    Some((buyer, item))
}

async fn check_access(buyer: &str, item_id: &str) -> Access {
    let local = LocalEntitlements;
    if let Some(record) = local
        .records()
        .into_iter()
        .find(|r| r.buyer_id == buyer && r.item_id == item_id)
    {
        return Access::Granted(record.item_name);
    }

    if storage::buyer_id().as_deref() != Some(buyer) {
        return Access::Denied;
    }

    match api::fetch_purchase(&api::checkout_config(), buyer, item_id).await {
        Ok(Some(record)) => Access::Granted(record.item_name),
        Ok(None) => Access::Denied,
        Err(e) => {
            tracing::warn!(error = %e, "Access check failed");
            Access::Denied
        }
    }
}

#[component]
pub fn ContentPage() -> impl IntoView {
    let access = RwSignal::new(Access::Checking);

    match path_ids() {
        Some((buyer, item)) => spawn_local(async move {
            access.try_set(check_access(&buyer, &item).await);
        }),
        None => access.set(Access::Denied),
    }

    view! {
        <div class="content">
            {move || match access.get() {
                Access::Checking => view! { <p>"Checking your access..."</p> }.into_any(),
                Access::Granted(name) => view! {
                    <h2>{name}</h2>
                    <p>"Your lessons are unlocked. Enjoy the course!"</p>
                }
                .into_any(),
                Access::Denied => view! {
                    <h2>"No access"</h2>
                    <p>"We could not find a purchase of this course for you."</p>
                    <a href="/" class="btn">"Browse courses"</a>
                }
                .into_any(),
            }}
        </div>
    }
}
