//! Browser Storage
//!
//! `sessionStorage` carries pending checkouts across the provider redirect.
//! `localStorage` keeps guest purchases and the signed-in buyer id.

use async_trait::async_trait;
use checkout_core::{
    CheckoutError, CheckoutStash, PendingCheckout, PurchaseDetails, PurchaseRecord,
    PurchaseRecordWriter, Result,
};
use web_sys::Storage;

const PENDING_PREFIX: &str = "checkout:pending:";
const PURCHASES_KEY: &str = "checkout:purchases";
const BUYER_ID_KEY: &str = "checkout:buyerId";

fn storage_error(e: wasm_bindgen::JsValue) -> CheckoutError {
    CheckoutError::Storage(format!("{e:?}"))
}

fn session_storage() -> Result<Storage> {
    web_sys::window()
        .and_then(|w| w.session_storage().ok().flatten())
        .ok_or_else(|| CheckoutError::Storage("sessionStorage unavailable".into()))
}

fn local_storage() -> Result<Storage> {
    web_sys::window()
        .and_then(|w| w.local_storage().ok().flatten())
        .ok_or_else(|| CheckoutError::Storage("localStorage unavailable".into()))
}

/// Signed-in buyer id, if the auth layer left one
pub fn buyer_id() -> Option<String> {
    local_storage()
        .ok()?
        .get_item(BUYER_ID_KEY)
        .ok()
        .flatten()
        .filter(|id| !id.trim().is_empty())
}

/// Pending checkouts in `sessionStorage`
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionStash;

impl CheckoutStash for SessionStash {
    fn save(&self, pending: PendingCheckout) -> Result<()> {
        let json =
            serde_json::to_string(&pending).map_err(|e| CheckoutError::Storage(e.to_string()))?;
        session_storage()?
            .set_item(&format!("{PENDING_PREFIX}{}", pending.order_id), &json)
            .map_err(storage_error)
    }

    fn get(&self, order_id: &str) -> Result<Option<PendingCheckout>> {
        let Some(json) = session_storage()?
            .get_item(&format!("{PENDING_PREFIX}{order_id}"))
            .map_err(storage_error)?
        else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(pending) => Ok(Some(pending)),
            Err(e) => {
                tracing::warn!(order_id, error = %e, "Discarding unreadable pending checkout");
                Ok(None)
            }
        }
    }

    fn remove(&self, order_id: &str) -> Result<()> {
        session_storage()?
            .remove_item(&format!("{PENDING_PREFIX}{order_id}"))
            .map_err(storage_error)
    }
}

/// Guest purchases in `localStorage`
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalEntitlements;

impl LocalEntitlements {
    pub fn records(&self) -> Vec<PurchaseRecord> {
        local_storage()
            .ok()
            .and_then(|s| s.get_item(PURCHASES_KEY).ok().flatten())
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    /// Most recent purchase of an item on this device
    pub fn find(&self, item_id: &str) -> Option<PurchaseRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.item_id == item_id)
            .max_by_key(|r| r.purchased_at)
    }

    fn store(&self, records: &[PurchaseRecord]) -> Result<()> {
        let json =
            serde_json::to_string(records).map_err(|e| CheckoutError::Storage(e.to_string()))?;
        local_storage()?
            .set_item(PURCHASES_KEY, &json)
            .map_err(storage_error)
    }
}

#[async_trait(?Send)]
impl PurchaseRecordWriter for LocalEntitlements {
    async fn record_purchase(
        &self,
        buyer_id: &str,
        item_id: &str,
        details: PurchaseDetails,
    ) -> Result<()> {
        let mut record = PurchaseRecord::new(buyer_id, item_id, details);
        let mut records = self.records();

        if let Some(existing) = records.iter_mut().find(|r| r.key() == record.key()) {
            if existing.same_purchase(&record) {
                record.purchased_at = existing.purchased_at;
            }
            *existing = record;
        } else {
            records.push(record);
        }

        self.store(&records)?;
        tracing::info!(buyer_id, item_id, "Purchase saved on this device");
        Ok(())
    }
}
