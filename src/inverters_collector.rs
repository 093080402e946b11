use std::sync::Arc;

use prometheus::proto::MetricFamily;
use tracing::error;

use crate::exporter_metrics::ScrapeRegistry;
use crate::gateway_client::GatewayReader;
use crate::readings::Inverter;

/// Per-microinverter production, keyed by serial number.
pub struct InvertersCollector {
    reader: Arc<dyn GatewayReader>,
}

impl InvertersCollector {
    pub fn new(reader: Arc<dyn GatewayReader>) -> Self {
        Self { reader }
    }

    pub async fn collect(&self) -> Vec<MetricFamily> {
        let inverters = match self.reader.inverters().await {
            Ok(inverters) => inverters,
            Err(e) => {
                error!(collector = "inverters", error = %e, "Failed to get inverter data");
                return Vec::new();
            }
        };

        derive_inverter_metrics(&inverters).unwrap_or_else(|e| {
            error!(collector = "inverters", error = %e, "Failed to build inverter metrics");
            Vec::new()
        })
    }
}

pub fn derive_inverter_metrics(inverters: &[Inverter]) -> prometheus::Result<Vec<MetricFamily>> {
    let scrape = ScrapeRegistry::new();
    let watts = scrape.gauge_vec(
        "inverter_watts",
        "Current inverter production in watts",
        &["serial_number"],
    )?;
    let max_watts = scrape.gauge_vec(
        "inverter_max_watts",
        "Maximum reported inverter production in watts",
        &["serial_number"],
    )?;
    let last_report = scrape.gauge_vec(
        "inverter_last_report_timestamp",
        "Unix timestamp of last inverter report",
        &["serial_number"],
    )?;

    for inverter in inverters {
        let labels = [inverter.serial_number.as_str()];
        watts
            .with_label_values(&labels)
            .set(inverter.last_report_watts as f64);
        max_watts
            .with_label_values(&labels)
            .set(inverter.max_report_watts as f64);
        last_report
            .with_label_values(&labels)
            .set(inverter.last_report_date as f64);
    }

    Ok(scrape.gather())
}
