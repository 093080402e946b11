use std::sync::Arc;

use prometheus::proto::MetricFamily;
use tracing::debug;

use crate::exporter_metrics::{encode_text, ExporterMetrics};
use crate::gateway_client::GatewayReader;
use crate::inverters_collector::InvertersCollector;
use crate::meters_collector::MetersCollector;
use crate::production_collector::ProductionCollector;

/// Runs the collectors for one scrape and combines their output.
///
/// The collectors share nothing but the gateway reader, so they run
/// concurrently and each one fails on its own.
pub struct ScrapeCoordinator {
    production: ProductionCollector,
    meters: MetersCollector,
    inverters: InvertersCollector,
    exporter_metrics: ExporterMetrics,
}

impl ScrapeCoordinator {
    pub fn new(reader: Arc<dyn GatewayReader>, exporter_metrics: ExporterMetrics) -> Self {
        Self {
            production: ProductionCollector::new(reader.clone()),
            meters: MetersCollector::new(reader.clone()),
            inverters: InvertersCollector::new(reader),
            exporter_metrics,
        }
    }

    pub async fn gather(&self) -> Vec<MetricFamily> {
        let (production, meters, inverters) = tokio::join!(
            self.production.collect(),
            self.meters.collect(),
            self.inverters.collect(),
        );
        debug!(
            production = production.len(),
            meters = meters.len(),
            inverters = inverters.len(),
            "Scrape collected"
        );

        let mut families = production;
        families.extend(meters);
        families.extend(inverters);
        // Gathered last so the latency of this scrape's calls is included.
        families.extend(self.exporter_metrics.gather());
        families
    }

    /// One scrape rendered in the text exposition format.
    pub async fn render(&self) -> prometheus::Result<String> {
        encode_text(&self.gather().await)
    }
}
