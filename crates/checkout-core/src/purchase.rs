//! Purchase Records
//!
//! The durable fact that a buyer paid for an item. Records are keyed by
//! `(buyer_id, item_id)`, so writing the same purchase twice leaves one record.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// Purchase fields other than the key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseDetails {
    pub item_name: String,
    #[serde(with = "crate::amount")]
    pub amount: Decimal,
    pub order_id: String,
    pub payment_session_id: String,
}

/// A purchase record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub buyer_id: String,
    pub item_id: String,
    pub item_name: String,
    #[serde(with = "crate::amount")]
    pub amount: Decimal,
    pub order_id: String,
    pub payment_session_id: String,
    pub purchased_at: DateTime<Utc>,
}

impl PurchaseRecord {
    pub fn new(buyer_id: impl Into<String>, item_id: impl Into<String>, details: PurchaseDetails) -> Self {
        Self {
            buyer_id: buyer_id.into(),
            item_id: item_id.into(),
            item_name: details.item_name,
            amount: details.amount,
            order_id: details.order_id,
            payment_session_id: details.payment_session_id,
            purchased_at: Utc::now(),
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.buyer_id.clone(), self.item_id.clone())
    }

    /// Same purchase, ignoring when it was written
    pub fn same_purchase(&self, other: &Self) -> bool {
        self.buyer_id == other.buyer_id
            && self.item_id == other.item_id
            && self.item_name == other.item_name
            && self.amount == other.amount
            && self.order_id == other.order_id
            && self.payment_session_id == other.payment_session_id
    }
}

/// Body of `POST /api/purchases`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPurchaseRequest {
    pub buyer_id: String,
    pub item_id: String,
    #[serde(flatten)]
    pub details: PurchaseDetails,
}

/// Purchase record storage
pub trait PurchaseStore: Send + Sync {
    /// Insert or overwrite the record at its key
    ///
    /// Rewriting an existing purchase keeps the original `purchased_at`.
    fn upsert(&self, record: PurchaseRecord) -> Result<PurchaseRecord>;

    fn get(&self, buyer_id: &str, item_id: &str) -> Result<Option<PurchaseRecord>>;

    fn list_for_buyer(&self, buyer_id: &str) -> Result<Vec<PurchaseRecord>>;

    /// Content gate check
    fn has_access(&self, buyer_id: &str, item_id: &str) -> Result<bool> {
        Ok(self.get(buyer_id, item_id)?.is_some())
    }
}

/// In-memory purchase store (for development)
pub struct MemoryPurchaseStore {
    records: RwLock<HashMap<(String, String), PurchaseRecord>>,
}

impl Default for MemoryPurchaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPurchaseStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> CheckoutError {
    CheckoutError::Storage("purchase store lock poisoned".into())
}

impl PurchaseStore for MemoryPurchaseStore {
    fn upsert(&self, mut record: PurchaseRecord) -> Result<PurchaseRecord> {
        let mut records = self.records.write().map_err(poisoned)?;
        let key = record.key();

        if let Some(existing) = records.get(&key) {
            if existing.same_purchase(&record) {
                record.purchased_at = existing.purchased_at;
            } else {
                tracing::warn!(
                    buyer_id = %record.buyer_id,
                    item_id = %record.item_id,
                    previous_order = %existing.order_id,
                    order_id = %record.order_id,
                    "Overwriting purchase record from a different order"
                );
            }
        }

        records.insert(key, record.clone());
        Ok(record)
    }

    fn get(&self, buyer_id: &str, item_id: &str) -> Result<Option<PurchaseRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .get(&(buyer_id.to_string(), item_id.to_string()))
            .cloned())
    }

    fn list_for_buyer(&self, buyer_id: &str) -> Result<Vec<PurchaseRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut result: Vec<_> = records
            .values()
            .filter(|r| r.buyer_id == buyer_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.purchased_at.cmp(&b.purchased_at));
        Ok(result)
    }
}

/// Persists entitlements once a payment is confirmed
#[async_trait(?Send)]
pub trait PurchaseRecordWriter {
    async fn record_purchase(
        &self,
        buyer_id: &str,
        item_id: &str,
        details: PurchaseDetails,
    ) -> Result<()>;
}

/// Writer backed by an in-process [`PurchaseStore`]
pub struct StorePurchaseWriter<S: PurchaseStore + ?Sized> {
    store: Arc<S>,
}

impl<S: PurchaseStore + ?Sized> StorePurchaseWriter<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait(?Send)]
impl<S: PurchaseStore + ?Sized> PurchaseRecordWriter for StorePurchaseWriter<S> {
    async fn record_purchase(
        &self,
        buyer_id: &str,
        item_id: &str,
        details: PurchaseDetails,
    ) -> Result<()> {
        let record = self
            .store
            .upsert(PurchaseRecord::new(buyer_id, item_id, details))?;
        tracing::info!(
            buyer_id = %record.buyer_id,
            item_id = %record.item_id,
            order_id = %record.order_id,
            "Recorded purchase"
        );
        Ok(())
    }
}

/// Writer posting to the purchase API
pub struct HttpPurchaseWriter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPurchaseWriter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait(?Send)]
impl PurchaseRecordWriter for HttpPurchaseWriter {
    async fn record_purchase(
        &self,
        buyer_id: &str,
        item_id: &str,
        details: PurchaseDetails,
    ) -> Result<()> {
        let body = RecordPurchaseRequest {
            buyer_id: buyer_id.to_string(),
            item_id: item_id.to_string(),
            details,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| CheckoutError::Storage(e.to_string()))?;

        if response.status().is_success() {
            tracing::info!(buyer_id, item_id, "Purchase recorded remotely");
            Ok(())
        } else {
            let status = response.status();
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["error"].as_str().map(String::from))
                .unwrap_or_else(|| format!("purchase API returned {status}"));
            Err(CheckoutError::Storage(message))
        }
    }
}

/// Read side of the purchase API
pub struct HttpPurchaseReader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPurchaseReader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// A buyer's purchases, newest first
    pub async fn list(&self, buyer_id: &str) -> Result<Vec<PurchaseRecord>> {
        let response = self.get_path(&[buyer_id]).await?;
        let mut records: Vec<PurchaseRecord> = Self::read(response).await?;
        records.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        Ok(records)
    }

    /// One purchase, `None` if the buyer never bought the item
    pub async fn get(&self, buyer_id: &str, item_id: &str) -> Result<Option<PurchaseRecord>> {
        let response = self.get_path(&[buyer_id, item_id]).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::read(response).await.map(Some)
    }

    async fn get_path(&self, segments: &[&str]) -> Result<reqwest::Response> {
        let mut url =
            url::Url::parse(&self.endpoint).map_err(|e| CheckoutError::Storage(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| CheckoutError::Storage("purchases endpoint cannot take a path".into()))?
            .extend(segments);

        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| CheckoutError::Storage(e.to_string()))
    }

    async fn read<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| CheckoutError::Storage(e.to_string()));
        }
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v["error"].as_str().map(String::from))
            .unwrap_or_else(|| format!("purchase API returned {status}"));
        Err(CheckoutError::Storage(message))
    }
}
