//! course-checkout HTTP Server
//!
//! Axum-based server for the checkout flow: creates provider orders for the
//! browser, receives signed payment webhooks, and stores purchase records
//! that gate course and product content.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_payments::{CashfreeClient, OrderProvider};

use crate::config::ServerConfig;
use crate::state::{AppState, Payments};

const ORDER_PRUNE_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env();

    // Initialize payments
    let payments = match CashfreeClient::from_env() {
        Ok(client) => {
            tracing::info!(
                environment = client.config().environment.as_str(),
                api_version = %client.config().api_version,
                "✓ Cashfree configured"
            );
            let webhook_secret = client.config().client_secret.clone();
            Some(Payments {
                provider: Arc::new(client) as Arc<dyn OrderProvider>,
                webhook_secret,
            })
        }
        Err(e) => {
            tracing::warn!("⚠ Cashfree not configured - payments disabled ({e})");
            tracing::warn!("  Set CASHFREE_CLIENT_ID and CASHFREE_CLIENT_SECRET in .env");
            None
        }
    };

    let addr = config.bind_addr.clone();
    let public = config.public_base_url.clone();
    let state = AppState::new(config, payments);

    // Evict orders past their expiry
    let pruner = state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(ORDER_PRUNE_INTERVAL);
        loop {
            tick.tick().await;
            pruner.prune_orders(chrono::Utc::now());
        }
    });

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 course-checkout server running on http://{}", addr);
    tracing::info!("   public URL: {}", public);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                           - Health check");
    tracing::info!("  POST /api/createOrder                  - Create payment session");
    tracing::info!("  POST /api/webhook                      - Provider payment webhook");
    tracing::info!("  POST /api/purchases                    - Record a paid purchase");
    tracing::info!("  GET  /api/purchases/{{buyer}}            - List purchases");
    tracing::info!("  GET  /api/purchases/{{buyer}}/{{item}}     - Check access");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
