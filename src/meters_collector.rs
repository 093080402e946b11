use std::sync::Arc;

use prometheus::proto::MetricFamily;
use tracing::error;

use crate::exporter_metrics::ScrapeRegistry;
use crate::gateway_client::GatewayReader;
use crate::readings::MeterReading;

/// Per-meter electrical readings, totals plus one series set per phase.
pub struct MetersCollector {
    reader: Arc<dyn GatewayReader>,
}

impl MetersCollector {
    pub fn new(reader: Arc<dyn GatewayReader>) -> Self {
        Self { reader }
    }

    pub async fn collect(&self) -> Vec<MetricFamily> {
        let readings = match self.reader.meter_readings().await {
            Ok(readings) => readings,
            Err(e) => {
                error!(collector = "meters", error = %e, "Failed to get meter readings");
                return Vec::new();
            }
        };

        derive_meter_metrics(&readings).unwrap_or_else(|e| {
            error!(collector = "meters", error = %e, "Failed to build meter metrics");
            Vec::new()
        })
    }
}

/// Phase label for the channel at `index` in the device's channel array.
pub fn phase_label(index: usize) -> String {
    format!("L{}", index + 1)
}

pub fn derive_meter_metrics(readings: &[MeterReading]) -> prometheus::Result<Vec<MetricFamily>> {
    let scrape = ScrapeRegistry::new();
    let voltage = scrape.gauge_vec(
        "voltage_volts",
        "Grid voltage in volts",
        &["meter_id", "phase"],
    )?;
    let current = scrape.gauge_vec("current_amps", "Current in amps", &["meter_id", "phase"])?;
    let active_power = scrape.gauge_vec(
        "active_power_watts",
        "Active power in watts",
        &["meter_id", "phase"],
    )?;
    let power_factor = scrape.gauge_vec("power_factor", "Power factor", &["meter_id", "phase"])?;
    // Frequency is only meaningful for the meter as a whole.
    let frequency = scrape.gauge_vec("frequency_hz", "Grid frequency in Hz", &["meter_id"])?;

    for reading in readings {
        let meter_id = reading.eid.to_string();

        let total = [meter_id.as_str(), "total"];
        voltage.with_label_values(&total).set(reading.voltage);
        current.with_label_values(&total).set(reading.current);
        active_power.with_label_values(&total).set(reading.active_power);
        power_factor.with_label_values(&total).set(reading.pwr_factor);
        frequency.with_label_values(&[meter_id.as_str()]).set(reading.freq);

        for (index, channel) in reading.channels.iter().enumerate() {
            let phase = phase_label(index);
            let labels = [meter_id.as_str(), phase.as_str()];
            voltage.with_label_values(&labels).set(channel.voltage);
            current.with_label_values(&labels).set(channel.current);
            active_power.with_label_values(&labels).set(channel.active_power);
            power_factor.with_label_values(&labels).set(channel.pwr_factor);
        }
    }

    Ok(scrape.gather())
}
