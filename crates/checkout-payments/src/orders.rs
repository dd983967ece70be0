//! Pending Order Book
//!
//! Remembers what each provider order was for, so a paid order reported by
//! the webhook (or confirmed by the buyer's return) maps back to a buyer and
//! an item.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use checkout_core::{ItemKind, PurchaseDetails};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// An order created with the provider and not yet settled
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub item_name: String,
    #[serde(with = "checkout_core::amount")]
    pub amount: Decimal,
    pub buyer_id: Option<String>,
    pub customer_email: String,
    pub payment_session_id: String,
    pub created_at: DateTime<Utc>,
}

impl PendingOrder {
    /// Buyer id, or the email for guest checkout
    pub fn buyer_key(&self) -> &str {
        self.buyer_id.as_deref().unwrap_or(&self.customer_email)
    }

    pub fn purchase_details(&self) -> PurchaseDetails {
        PurchaseDetails {
            item_name: self.item_name.clone(),
            amount: self.amount,
            order_id: self.order_id.clone(),
            payment_session_id: self.payment_session_id.clone(),
        }
    }
}

/// Pending order storage
pub trait OrderBook: Send + Sync {
    fn insert(&self, order: PendingOrder) -> Result<()>;
    fn get(&self, order_id: &str) -> Result<Option<PendingOrder>>;
    fn remove(&self, order_id: &str) -> Result<Option<PendingOrder>>;

    /// Drop orders created before `cutoff`; returns how many went
    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// In-memory order book (for development)
pub struct MemoryOrderBook {
    orders: RwLock<HashMap<String, PendingOrder>>,
}

impl Default for MemoryOrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOrderBook {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned<T>(_: T) -> PaymentError {
    PaymentError::Storage("order book lock poisoned".into())
}

impl OrderBook for MemoryOrderBook {
    fn insert(&self, order: PendingOrder) -> Result<()> {
        let mut orders = self.orders.write().map_err(poisoned)?;
        orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    fn get(&self, order_id: &str) -> Result<Option<PendingOrder>> {
        let orders = self.orders.read().map_err(poisoned)?;
        Ok(orders.get(order_id).cloned())
    }

    fn remove(&self, order_id: &str) -> Result<Option<PendingOrder>> {
        let mut orders = self.orders.write().map_err(poisoned)?;
        Ok(orders.remove(order_id))
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut orders = self.orders.write().map_err(poisoned)?;
        let before = orders.len();
        orders.retain(|_, order| order.created_at >= cutoff);
        Ok(before - orders.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    fn guest_order() -> PendingOrder {
        PendingOrder {
            order_id: "ORDER_7_1".into(),
            item_kind: ItemKind::Product,
            item_id: "7".into(),
            item_name: "NEET Notes".into(),
            amount: dec!(10.5),
            buyer_id: None,
            customer_email: "guest@x.com".into(),
            payment_session_id: "sess_7".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_guest_keyed_by_email() {
        assert_eq!(guest_order().buyer_key(), "guest@x.com");
    }

    #[test]
    fn test_insert_get_remove() {
        let book = MemoryOrderBook::new();
        let order = guest_order();
        book.insert(order.clone()).unwrap();

        assert_eq!(book.get("ORDER_7_1").unwrap(), Some(order));
        assert!(book.remove("ORDER_7_1").unwrap().is_some());
        assert!(book.get("ORDER_7_1").unwrap().is_none());
    }

    #[test]
    fn test_evicts_only_stale_orders() {
        let book = MemoryOrderBook::new();
        let now = Utc::now();
        let stale = PendingOrder {
            order_id: "ORDER_7_0".into(),
            created_at: now - TimeDelta::hours(3),
            ..guest_order()
        };
        book.insert(stale).unwrap();
        book.insert(guest_order()).unwrap();

        assert_eq!(book.evict_older_than(now - TimeDelta::hours(1)).unwrap(), 1);
        assert!(book.get("ORDER_7_0").unwrap().is_none());
        assert!(book.get("ORDER_7_1").unwrap().is_some());
        assert_eq!(book.evict_older_than(now - TimeDelta::hours(1)).unwrap(), 0);
    }
}
