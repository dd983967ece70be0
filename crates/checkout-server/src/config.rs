//! Server Configuration

use chrono::TimeDelta;

/// Default lifetime of a provider order
const DEFAULT_ORDER_TTL_MINUTES: i64 = 24 * 60;

/// Settings read from the environment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Public origin used in provider return and notify URLs
    pub public_base_url: String,

    /// Built frontend (index.html + WASM bundle)
    pub static_dir: String,

    /// How long a provider order accepts payment
    pub order_ttl: TimeDelta,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            public_base_url: "http://localhost:3000".into(),
            static_dir: "static".into(),
            order_ttl: TimeDelta::minutes(DEFAULT_ORDER_TTL_MINUTES),
        }
    }
}

impl ServerConfig {
    /// Create from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            static_dir: std::env::var("STATIC_DIR").unwrap_or(defaults.static_dir),
            order_ttl: std::env::var("ORDER_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|minutes| *minutes > 0)
                .map_or(defaults.order_ttl, TimeDelta::minutes),
        }
    }
}
