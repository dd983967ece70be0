//! Application State

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use checkout_core::MemoryPurchaseStore;
use checkout_payments::{MemoryOrderBook, OrderBook, OrderProvider, OrderUrls};

use crate::config::ServerConfig;

/// Provider access (None in `AppState` if not configured)
#[derive(Clone)]
pub struct Payments {
    /// Order API client
    pub provider: Arc<dyn OrderProvider>,

    /// Key for webhook signatures (the provider client secret)
    pub webhook_secret: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,

    /// Return and notify URLs sent with each order
    pub urls: OrderUrls,

    pub payments: Option<Payments>,

    /// Orders awaiting payment
    pub orders: Arc<MemoryOrderBook>,

    /// Purchase records for content gating
    pub purchases: Arc<MemoryPurchaseStore>,
}

impl AppState {
    pub fn new(config: ServerConfig, payments: Option<Payments>) -> Self {
        Self {
            urls: OrderUrls::new(&config.public_base_url),
            config: Arc::new(config),
            payments,
            orders: Arc::new(MemoryOrderBook::new()),
            purchases: Arc::new(MemoryPurchaseStore::new()),
        }
    }

    /// Forget orders the provider stopped accepting payment for
    ///
    /// Orders are kept one extra hour past expiry for late webhooks.
    pub fn prune_orders(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.config.order_ttl - TimeDelta::hours(1);
        match self.orders.evict_older_than(cutoff) {
            Ok(0) => 0,
            Ok(evicted) => {
                tracing::info!(evicted, "Evicted expired orders");
                evicted
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not evict expired orders");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::ItemKind;
    use checkout_payments::PendingOrder;
    use rust_decimal_macros::dec;

    fn order(order_id: &str, created_at: DateTime<Utc>) -> PendingOrder {
        PendingOrder {
            order_id: order_id.into(),
            item_kind: ItemKind::Course,
            item_id: "42".into(),
            item_name: "Algebra I".into(),
            amount: dec!(499),
            buyer_id: Some("u1".into()),
            customer_email: "jane@x.com".into(),
            payment_session_id: "sess_abc".into(),
            created_at,
        }
    }

    #[test]
    fn test_prune_keeps_payable_orders() {
        let state = AppState::new(ServerConfig::default(), None);
        let now = Utc::now();
        state.orders.insert(order("ORDER_OLD", now - TimeDelta::days(2))).unwrap();
        // Expired, but still inside the webhook grace hour
        state
            .orders
            .insert(order("ORDER_LATE", now - TimeDelta::minutes(24 * 60 + 30)))
            .unwrap();
        state.orders.insert(order("ORDER_NEW", now)).unwrap();

        assert_eq!(state.prune_orders(now), 1);
        assert!(state.orders.get("ORDER_OLD").unwrap().is_none());
        assert!(state.orders.get("ORDER_LATE").unwrap().is_some());
        assert!(state.orders.get("ORDER_NEW").unwrap().is_some());
    }
}
