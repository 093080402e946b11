use async_trait::async_trait;
use tracing::debug;

use crate::error::GatewayError;
use crate::exporter_metrics::ExporterMetrics;
use crate::readings::{list_or_empty, Inverter, MeterReading, MeterReport};
use crate::session_guard::{Credentials, SessionGuard};

// Gateway endpoint paths, relative to the configured address.
pub const PRODUCTION_REPORT_PATH: &str = "/ivp/meters/reports/production";
pub const CONSUMPTION_REPORT_PATH: &str = "/ivp/meters/reports/consumption";
pub const METER_READINGS_PATH: &str = "/ivp/meters/readings";
pub const INVERTERS_PATH: &str = "/api/v1/production/inverters";

/// Read access to the gateway, as seen by the collectors.
#[async_trait]
pub trait GatewayReader: Send + Sync {
    async fn production_report(&self) -> Result<MeterReport, GatewayError>;
    async fn consumption_report(&self) -> Result<Vec<MeterReport>, GatewayError>;
    async fn meter_readings(&self) -> Result<Vec<MeterReading>, GatewayError>;
    async fn inverters(&self) -> Result<Vec<Inverter>, GatewayError>;
}

/// Authenticated, typed reads against one gateway.
pub struct GatewayClient {
    session: SessionGuard,
    metrics: ExporterMetrics,
}

impl GatewayClient {
    pub fn new(credentials: Credentials, metrics: ExporterMetrics) -> Result<Self, GatewayError> {
        Ok(Self::with_session(SessionGuard::new(credentials)?, metrics))
    }

    pub fn with_session(session: SessionGuard, metrics: ExporterMetrics) -> Self {
        Self { session, metrics }
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    /// Authenticated GET returning the raw body of a 2xx response.
    async fn fetch(&self, endpoint: &'static str, path: &str) -> Result<Vec<u8>, GatewayError> {
        self.session.ensure_authenticated().await?;

        let _timer = self.metrics.start_api_timer(endpoint);
        let response = self
            .session
            .http()
            .get(self.session.url(path))
            .send()
            .await
            .map_err(|source| GatewayError::Transport { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| GatewayError::Transport { endpoint, source })?;
        debug!(endpoint, bytes = body.len(), "Gateway response received");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl GatewayReader for GatewayClient {
    async fn production_report(&self) -> Result<MeterReport, GatewayError> {
        let endpoint = "production";
        let body = self.fetch(endpoint, PRODUCTION_REPORT_PATH).await?;
        serde_json::from_slice(&body).map_err(|source| GatewayError::Decode { endpoint, source })
    }

    async fn consumption_report(&self) -> Result<Vec<MeterReport>, GatewayError> {
        let endpoint = "consumption";
        let body = self.fetch(endpoint, CONSUMPTION_REPORT_PATH).await?;
        list_or_empty(&body).map_err(|source| GatewayError::Decode { endpoint, source })
    }

    async fn meter_readings(&self) -> Result<Vec<MeterReading>, GatewayError> {
        let endpoint = "meter_readings";
        let body = self.fetch(endpoint, METER_READINGS_PATH).await?;
        list_or_empty(&body).map_err(|source| GatewayError::Decode { endpoint, source })
    }

    async fn inverters(&self) -> Result<Vec<Inverter>, GatewayError> {
        let endpoint = "inverters";
        let body = self.fetch(endpoint, INVERTERS_PATH).await?;
        list_or_empty(&body).map_err(|source| GatewayError::Decode { endpoint, source })
    }
}
