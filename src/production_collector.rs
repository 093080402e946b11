//! Production and consumption series from the meter reports.
//!
//! Report firmware never resets its "today" and "last seven days" counters,
//! so only lifetime counters are exported; daily energy is left to
//! `increase()` on the monitoring side.

use std::collections::HashSet;
use std::sync::Arc;

use prometheus::proto::MetricFamily;
use tracing::{error, warn};

use crate::exporter_metrics::{counter_value, ScrapeRegistry};
use crate::gateway_client::GatewayReader;
use crate::readings::{MeterReport, TOTAL_CONSUMPTION};

/// `device_type` label for the report-based production source.
pub const EIM_DEVICE_TYPE: &str = "eim";

pub struct ProductionCollector {
    reader: Arc<dyn GatewayReader>,
}

impl ProductionCollector {
    pub fn new(reader: Arc<dyn GatewayReader>) -> Self {
        Self { reader }
    }

    /// Fetches both reports and derives this scrape's series.
    /// Any failure yields no series at all.
    pub async fn collect(&self) -> Vec<MetricFamily> {
        let production = match self.reader.production_report().await {
            Ok(report) => report,
            Err(e) => {
                error!(collector = "production", error = %e, "Failed to get production report");
                return Vec::new();
            }
        };
        let consumption = match self.reader.consumption_report().await {
            Ok(reports) => reports,
            Err(e) => {
                error!(collector = "production", error = %e, "Failed to get consumption report");
                return Vec::new();
            }
        };

        derive_production_metrics(&production, &consumption).unwrap_or_else(|e| {
            error!(collector = "production", error = %e, "Failed to build production metrics");
            Vec::new()
        })
    }
}

/// Net power in watts: production minus total consumption.
/// Positive means exporting to the grid.
pub fn net_watts(production: &MeterReport, consumption: &[MeterReport]) -> f64 {
    let total_consumption = consumption
        .iter()
        .find(|report| report.report_type == TOTAL_CONSUMPTION)
        .map(|report| report.cumulative.curr_w)
        .unwrap_or_default();
    production.cumulative.curr_w - total_consumption
}

pub fn derive_production_metrics(
    production: &MeterReport,
    consumption: &[MeterReport],
) -> prometheus::Result<Vec<MetricFamily>> {
    let scrape = ScrapeRegistry::new();

    let production_watts = scrape.gauge_vec(
        "production_watts",
        "Current solar production in watts",
        &["device_type"],
    )?;
    let voltage = scrape.gauge_vec(
        "production_voltage_volts",
        "RMS voltage",
        &["device_type"],
    )?;
    let current = scrape.gauge_vec(
        "production_current_amps",
        "RMS current in amps",
        &["device_type"],
    )?;
    let power_factor = scrape.gauge_vec(
        "production_power_factor",
        "Power factor",
        &["device_type"],
    )?;
    let production_wh = scrape.counter_vec(
        "production_wh_total",
        "Total lifetime production in watt-hours",
        &["device_type"],
    )?;
    let consumption_watts = scrape.gauge_vec(
        "consumption_watts",
        "Current consumption in watts",
        &["measurement_type"],
    )?;
    let consumption_wh = scrape.counter_vec(
        "consumption_wh_total",
        "Total lifetime consumption in watt-hours",
        &["measurement_type"],
    )?;
    let net = scrape.gauge(
        "net_watts",
        "Net power (production - consumption). Positive = exporting, negative = importing",
    )?;

    let cumulative = &production.cumulative;
    let labels = [EIM_DEVICE_TYPE];
    production_watts.with_label_values(&labels).set(cumulative.curr_w);
    voltage.with_label_values(&labels).set(cumulative.rms_voltage);
    current.with_label_values(&labels).set(cumulative.rms_current);
    power_factor.with_label_values(&labels).set(cumulative.pwr_factor);
    production_wh
        .with_label_values(&labels)
        .inc_by(counter_value(production.lifetime_wh()));

    // First entry per type wins, matching how net power picks its total.
    let mut seen = HashSet::new();
    for report in consumption {
        if !seen.insert(report.report_type.as_str()) {
            warn!(
                measurement_type = %report.report_type,
                "Duplicate consumption report type, skipping"
            );
            continue;
        }
        let labels = [report.report_type.as_str()];
        consumption_watts
            .with_label_values(&labels)
            .set(report.cumulative.curr_w);
        consumption_wh
            .with_label_values(&labels)
            .inc_by(counter_value(report.lifetime_wh()));
    }

    net.set(net_watts(production, consumption));

    Ok(scrape.gather())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::exporter_metrics::{encode_text, sample};
    use crate::readings::{Inverter, MeterReading, MeterReportData, NET_CONSUMPTION};
    use async_trait::async_trait;

    fn report(report_type: &str, curr_w: f64, wh: f64, lines: &[f64]) -> MeterReport {
        MeterReport {
            created_at: 1704067200,
            report_type: report_type.to_string(),
            cumulative: MeterReportData {
                curr_w,
                wh_dlvd_cum: wh,
                rms_voltage: 240.5,
                rms_current: 10.4,
                pwr_factor: 0.99,
                ..Default::default()
            },
            lines: lines
                .iter()
                .map(|&wh_dlvd_cum| MeterReportData {
                    wh_dlvd_cum,
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn render(production: &MeterReport, consumption: &[MeterReport]) -> String {
        encode_text(&derive_production_metrics(production, consumption).unwrap()).unwrap()
    }

    struct StubReader {
        production: Option<MeterReport>,
        consumption: Option<Vec<MeterReport>>,
    }

    fn unavailable(endpoint: &'static str) -> GatewayError {
        GatewayError::Status {
            endpoint,
            status: 503,
            body: "unavailable".to_string(),
        }
    }

    #[async_trait]
    impl GatewayReader for StubReader {
        async fn production_report(&self) -> Result<MeterReport, GatewayError> {
            self.production.clone().ok_or_else(|| unavailable("production"))
        }
        async fn consumption_report(&self) -> Result<Vec<MeterReport>, GatewayError> {
            self.consumption.clone().ok_or_else(|| unavailable("consumption"))
        }
        async fn meter_readings(&self) -> Result<Vec<MeterReading>, GatewayError> {
            Err(unavailable("meter_readings"))
        }
        async fn inverters(&self) -> Result<Vec<Inverter>, GatewayError> {
            Err(unavailable("inverters"))
        }
    }

    #[test]
    fn duplicate_consumption_type_keeps_first_entry() {
        let consumption = [
            report(TOTAL_CONSUMPTION, 1500.0, 9000.0, &[]),
            report(TOTAL_CONSUMPTION, 700.0, 4000.0, &[]),
        ];
        let text = render(&report("production", 2000.0, 0.0, &[]), &consumption);

        assert_eq!(
            sample(
                &text,
                r#"enphase_consumption_wh_total{measurement_type="total-consumption"}"#
            ),
            Some(9000.0)
        );
        assert_eq!(
            sample(
                &text,
                r#"enphase_consumption_watts{measurement_type="total-consumption"}"#
            ),
            Some(1500.0)
        );
        assert_eq!(sample(&text, "enphase_net_watts"), Some(500.0));
    }

    #[test]
    fn production_series_use_eim_label() {
        let text = render(&report("production", 2500.5, 1_500_000.0, &[]), &[]);

        assert_eq!(
            sample(&text, r#"enphase_production_watts{device_type="eim"}"#),
            Some(2500.5)
        );
        assert_eq!(
            sample(&text, r#"enphase_production_voltage_volts{device_type="eim"}"#),
            Some(240.5)
        );
        assert_eq!(
            sample(&text, r#"enphase_production_current_amps{device_type="eim"}"#),
            Some(10.4)
        );
        assert_eq!(
            sample(&text, r#"enphase_production_power_factor{device_type="eim"}"#),
            Some(0.99)
        );
        assert_eq!(
            sample(&text, r#"enphase_production_wh_total{device_type="eim"}"#),
            Some(1_500_000.0)
        );
    }

    #[test]
    fn split_phase_production_lifetime_is_line_sum() {
        let text = render(&report("production", 0.0, 500.0, &[100.0, 150.0]), &[]);

        assert_eq!(
            sample(&text, r#"enphase_production_wh_total{device_type="eim"}"#),
            Some(250.0)
        );
    }

    #[test]
    fn split_phase_correction_applies_per_consumption_entry() {
        let consumption = vec![
            report(TOTAL_CONSUMPTION, 1500.0, 9000.0, &[2000.0, 2500.0]),
            report(NET_CONSUMPTION, -1000.0, 1200.0, &[]),
        ];
        let text = render(&report("production", 0.0, 0.0, &[]), &consumption);

        assert_eq!(
            sample(
                &text,
                r#"enphase_consumption_wh_total{measurement_type="total-consumption"}"#
            ),
            Some(4500.0)
        );
        assert_eq!(
            sample(
                &text,
                r#"enphase_consumption_wh_total{measurement_type="net-consumption"}"#
            ),
            Some(1200.0)
        );
    }

    #[test]
    fn net_watts_uses_total_consumption_only() {
        let consumption = vec![
            report(TOTAL_CONSUMPTION, 1500.0, 3_000_000.0, &[]),
            report(NET_CONSUMPTION, -1000.0, 1_500_000.0, &[]),
        ];
        let text = render(&report("production", 2500.5, 0.0, &[]), &consumption);

        assert_eq!(sample(&text, "enphase_net_watts"), Some(1000.5));
        assert_eq!(
            sample(
                &text,
                r#"enphase_consumption_watts{measurement_type="total-consumption"}"#
            ),
            Some(1500.0)
        );
        assert_eq!(
            sample(
                &text,
                r#"enphase_consumption_watts{measurement_type="net-consumption"}"#
            ),
            Some(-1000.0)
        );
    }

    #[test]
    fn missing_consumption_entries_yield_production_as_net() {
        let text = render(&report("production", 2500.5, 0.0, &[]), &[]);

        assert_eq!(sample(&text, "enphase_net_watts"), Some(2500.5));
        assert!(!text.contains("enphase_consumption_watts"));
    }

    #[test]
    fn deriving_twice_gives_identical_output() {
        let production = report("production", 2500.5, 500.0, &[100.0, 150.0]);
        let consumption = vec![report(TOTAL_CONSUMPTION, 1500.0, 3000.0, &[])];

        assert_eq!(
            render(&production, &consumption),
            render(&production, &consumption)
        );
    }

    #[tokio::test]
    async fn failed_production_fetch_emits_nothing() {
        let collector = ProductionCollector::new(Arc::new(StubReader {
            production: None,
            consumption: Some(vec![report(TOTAL_CONSUMPTION, 1500.0, 0.0, &[])]),
        }));

        assert!(collector.collect().await.is_empty());
    }

    #[tokio::test]
    async fn failed_consumption_fetch_emits_nothing() {
        let collector = ProductionCollector::new(Arc::new(StubReader {
            production: Some(report("production", 2500.5, 0.0, &[])),
            consumption: None,
        }));

        assert!(collector.collect().await.is_empty());
    }

    #[tokio::test]
    async fn successful_fetch_emits_all_families() {
        let collector = ProductionCollector::new(Arc::new(StubReader {
            production: Some(report("production", 2500.5, 0.0, &[])),
            consumption: Some(vec![report(TOTAL_CONSUMPTION, 1500.0, 0.0, &[])]),
        }));

        // 5 production families, 2 consumption families, net.
        assert_eq!(collector.collect().await.len(), 8);
    }
}
