//! Home Page

use checkout_core::ItemKind;
use leptos::prelude::*;

use crate::components::Price;

struct Listing {
    kind: ItemKind,
    id: &'static str,
    name: &'static str,
    amount: &'static str,
    blurb: &'static str,
}

const CATALOG: &[Listing] = &[
    Listing {
        kind: ItemKind::Course,
        id: "42",
        name: "Algebra I",
        amount: "499",
        blurb: "Equations, functions and graphs from first principles.",
    },
    Listing {
        kind: ItemKind::Course,
        id: "43",
        name: "Geometry Essentials",
        amount: "599",
        blurb: "Proofs, constructions and coordinate geometry.",
    },
    Listing {
        kind: ItemKind::Product,
        id: "51",
        name: "Calculus Workbook (e-book)",
        amount: "349",
        blurb: "Two hundred worked problems with full solutions.",
    },
];

fn checkout_href(listing: &Listing) -> String {
    let (id_key, name_key) = match listing.kind {
        ItemKind::Course => ("courseId", "courseName"),
        ItemKind::Product => ("productId", "productName"),
    };
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(id_key, listing.id)
        .append_pair(name_key, listing.name)
        .append_pair("amount", listing.amount)
        .finish();
    format!("/checkout?{query}")
}

#[component]
pub fn HomePage() -> impl IntoView {
    view! {
        <div class="home">
            <header class="hero">
                <h1>"course-checkout"</h1>
                <p class="tagline">"Courses and e-books, paid for in a minute"</p>
                <a href="/profile" class="btn">"Your purchases"</a>
            </header>

            <section class="catalog">
                {CATALOG
                    .iter()
                    .map(|listing| {
                        view! {
                            <div class="listing">
                                <h3>{listing.name}</h3>
                                <p>{listing.blurb}</p>
                                <Price amount=listing.amount.to_string() />
                                <a href=checkout_href(listing) class="btn btn-primary">
                                    "Buy now"
                                </a>
                            </div>
                        }
                    })
                    .collect_view()}
            </section>
        </div>
    }
}
