//! Success Return
//!
//! After a redirect handoff the provider sends the buyer back to
//! `/success?order_id=..&course_id=..` (or `product_id`). The checkout that
//! started the handoff left a [`PendingCheckout`] in a [`CheckoutStash`]; the
//! return is matched against it before any purchase record is written.

use std::cell::RefCell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CheckoutError, Result};
use crate::item::{Item, ItemKind};
use crate::purchase::{PurchaseDetails, PurchaseRecordWriter};

/// A checkout handed to the provider and not yet confirmed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCheckout {
    pub order_id: String,
    pub item: Item,
    /// Buyer id, or the buyer's email for guest checkout
    pub buyer_key: String,
    pub payment_session_id: String,
}

impl PendingCheckout {
    pub fn purchase_details(&self) -> PurchaseDetails {
        PurchaseDetails {
            item_name: self.item.name.clone(),
            amount: self.item.price,
            order_id: self.order_id.clone(),
            payment_session_id: self.payment_session_id.clone(),
        }
    }
}

/// Short-lived storage of pending checkouts across the redirect round-trip
pub trait CheckoutStash {
    fn save(&self, pending: PendingCheckout) -> Result<()>;
    fn get(&self, order_id: &str) -> Result<Option<PendingCheckout>>;
    fn remove(&self, order_id: &str) -> Result<()>;
}

/// In-memory stash
#[derive(Default)]
pub struct MemoryCheckoutStash {
    pending: RefCell<HashMap<String, PendingCheckout>>,
}

impl MemoryCheckoutStash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

impl CheckoutStash for MemoryCheckoutStash {
    fn save(&self, pending: PendingCheckout) -> Result<()> {
        self.pending
            .borrow_mut()
            .insert(pending.order_id.clone(), pending);
        Ok(())
    }

    fn get(&self, order_id: &str) -> Result<Option<PendingCheckout>> {
        Ok(self.pending.borrow().get(order_id).cloned())
    }

    fn remove(&self, order_id: &str) -> Result<()> {
        self.pending.borrow_mut().remove(order_id);
        Ok(())
    }
}

/// Identifiers carried by the provider's return URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuccessReturn {
    pub order_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
}

impl SuccessReturn {
    pub fn new(order_id: impl Into<String>, item_kind: ItemKind, item_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            item_kind,
            item_id: item_id.into(),
        }
    }

    pub fn for_pending(pending: &PendingCheckout) -> Self {
        Self::new(&pending.order_id, pending.item.kind, &pending.item.id)
    }

    /// Parse `order_id` plus `course_id` or `product_id`
    pub fn from_query<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut order_id = None;
        let mut item = None;

        for (key, value) in pairs {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "order_id" => order_id = Some(value.to_string()),
                "course_id" => item = Some((ItemKind::Course, value.to_string())),
                "product_id" if item.is_none() => {
                    item = Some((ItemKind::Product, value.to_string()));
                }
                _ => {}
            }
        }

        let order_id = order_id
            .ok_or_else(|| CheckoutError::UnmatchedReturn("return URL has no order_id".into()))?;
        let (item_kind, item_id) = item.ok_or_else(|| {
            CheckoutError::UnmatchedReturn("return URL names no course or product".into())
        })?;

        Ok(Self {
            order_id,
            item_kind,
            item_id,
        })
    }

    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| CheckoutError::UnmatchedReturn(format!("bad return URL: {e}")))?;
        Self::from_query(url.query_pairs())
    }

    /// Relative success view location
    pub fn location(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("order_id", &self.order_id)
            .append_pair(self.item_kind.return_param(), &self.item_id)
            .finish();
        format!("/success?{query}")
    }

    pub fn matches(&self, pending: &PendingCheckout) -> bool {
        self.order_id == pending.order_id
            && self.item_kind == pending.item.kind
            && self.item_id == pending.item.id
    }

    /// Match against the stash, record the purchase and clear the stash entry
    pub async fn confirm(
        &self,
        stash: &dyn CheckoutStash,
        writer: &dyn PurchaseRecordWriter,
    ) -> Result<Unlocked> {
        let pending = stash.get(&self.order_id)?.ok_or_else(|| {
            CheckoutError::UnmatchedReturn(format!("no pending checkout for {}", self.order_id))
        })?;

        if !self.matches(&pending) {
            tracing::warn!(
                order_id = %self.order_id,
                item_id = %self.item_id,
                pending_item = %pending.item.id,
                "Return does not match pending checkout"
            );
            return Err(CheckoutError::UnmatchedReturn(format!(
                "order {} was not for {} {}",
                self.order_id,
                self.item_kind.as_str(),
                self.item_id
            )));
        }

        writer
            .record_purchase(&pending.buyer_key, &pending.item.id, pending.purchase_details())
            .await?;
        stash.remove(&self.order_id)?;

        tracing::info!(order_id = %self.order_id, item_id = %self.item_id, "Checkout confirmed");

        Ok(Unlocked {
            buyer_key: pending.buyer_key,
            item: pending.item,
        })
    }
}

/// An item the buyer now has access to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unlocked {
    pub buyer_key: String,
    pub item: Item,
}

impl Unlocked {
    pub fn content_location(&self) -> String {
        self.item.content_location(&self.buyer_key)
    }
}
