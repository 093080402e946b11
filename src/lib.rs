//! Enphase Exporter Library
//!
//! Polls an Enphase IQ Gateway over its local HTTPS API and exposes production,
//! consumption, per-phase meter and per-inverter readings as Prometheus metrics.
//! Each scrape fetches fresh snapshots; a background task keeps the gateway
//! session renewed so scrapes rarely pay for authentication.

pub mod config;
pub mod error;
pub mod exporter_metrics;
pub mod gateway_client;
pub mod inverters_collector;
pub mod logging;
pub mod meters_collector;
pub mod production_collector;
pub mod readiness_probe;
pub mod readings;
pub mod scrape_coordinator;
pub mod server;
pub mod session_guard;
pub mod session_refresher;
pub mod startup;

// Re-export commonly used types for easier access
pub use config::{ConfigError, ExporterConfig, LogFormat};
pub use error::GatewayError;
pub use exporter_metrics::{BuildInfo, ExporterMetrics};
pub use gateway_client::{GatewayClient, GatewayReader};
pub use readiness_probe::ReadinessProbe;
pub use scrape_coordinator::ScrapeCoordinator;
pub use session_guard::{Credentials, GatewayAuth, SessionGuard};
pub use session_refresher::SessionRefresher;
