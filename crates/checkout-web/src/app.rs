//! Main App Component

use leptos::prelude::*;
use leptos_router::{components::*, path};

use crate::pages::{CheckoutPage, ContentPage, HomePage, ProfilePage, SuccessPage};

/// Root application component
#[component]
pub fn App() -> impl IntoView {
    view! {
        <Router>
            <main class="app">
                <Routes fallback=|| view! { <p>"Page not found"</p> }>
                    <Route path=path!("/") view=HomePage />
                    <Route path=path!("/checkout") view=CheckoutPage />
                    <Route path=path!("/success") view=SuccessPage />
                    <Route path=path!("/profile") view=ProfilePage />
                    <Route path=path!("/my-courses/:buyer_id/:item_id") view=ContentPage />
                </Routes>
            </main>
        </Router>
    }
}
