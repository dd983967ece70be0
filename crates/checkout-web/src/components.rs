//! UI Components

use std::cell::Cell;

use checkout_core::{Notice, NoticeLevel, Notifier};
use leptos::prelude::*;

const TOAST_TTL: std::time::Duration = std::time::Duration::from_secs(4);

thread_local! {
    static NEXT_TOAST: Cell<u64> = const { Cell::new(0) };
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub notice: Notice,
}

/// Notifier backed by a toast list signal
#[derive(Clone, Copy)]
pub struct ToastNotifier {
    toasts: RwSignal<Vec<Toast>>,
}

impl Default for ToastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ToastNotifier {
    pub fn new() -> Self {
        Self {
            toasts: RwSignal::new(Vec::new()),
        }
    }

    pub const fn toasts(&self) -> RwSignal<Vec<Toast>> {
        self.toasts
    }

    pub fn dismiss(&self, id: u64) {
        self.toasts.update(|toasts| toasts.retain(|t| t.id != id));
    }
}

impl Notifier for ToastNotifier {
    fn notify(&self, notice: Notice) {
        let id = NEXT_TOAST.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        self.toasts.update(|toasts| toasts.push(Toast { id, notice }));

        let this = *self;
        set_timeout(move || this.dismiss(id), TOAST_TTL);
    }
}

/// Toast stack
#[component]
pub fn Toasts(notifier: ToastNotifier) -> impl IntoView {
    view! {
        <div class="toasts">
            <For
                each=move || notifier.toasts().get()
                key=|toast| toast.id
                children=move |toast| {
                    let class = match toast.notice.level {
                        NoticeLevel::Info => "toast toast-info",
                        NoticeLevel::Success => "toast toast-success",
                        NoticeLevel::Error => "toast toast-error",
                    };
                    let id = toast.id;
                    view! {
                        <div class=class on:click=move |_| notifier.dismiss(id)>
                            {toast.notice.message}
                        </div>
                    }
                }
            />
        </div>
    }
}

/// Price line, e.g. `₹499`
#[component]
pub fn Price(amount: String) -> impl IntoView {
    view! { <span class="price">"₹" {amount}</span> }
}
