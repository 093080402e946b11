//! Prometheus plumbing shared by the collectors.
//!
//! Process-level series (API latency, build info) live in a long-lived
//! [`ExporterMetrics`] registry. Snapshot-derived series are rebuilt on every
//! scrape in a throwaway [`ScrapeRegistry`], so a failed fetch simply leaves
//! them out instead of serving stale values.

use prometheus::proto::MetricFamily;
use prometheus::{
    CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramTimer, HistogramVec, Opts, Registry,
};

/// Prefix for every exported series.
pub const NAMESPACE: &str = "enphase";

const API_CALL_BUCKETS: [f64; 12] = [
    0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 7.5, 10.0, 15.0, 20.0,
];

/// Build metadata reported through `enphase_exporter_build_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub commit: String,
    pub built: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
            built: option_env!("BUILD_DATE").unwrap_or("unknown").to_string(),
        }
    }
}

/// Long-lived exporter metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    api_call_duration: HistogramVec,
}

impl ExporterMetrics {
    pub fn new(build: &BuildInfo) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let api_call_duration = HistogramVec::new(
            HistogramOpts::new(
                "api_call_duration_seconds",
                "Duration of API calls to the Enphase gateway",
            )
            .namespace(NAMESPACE)
            .buckets(API_CALL_BUCKETS.to_vec()),
            &["endpoint"],
        )?;
        registry.register(Box::new(api_call_duration.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "exporter_build_info",
                "Build information for the enphase exporter",
            )
            .namespace(NAMESPACE),
            &["built", "commit", "version"],
        )?;
        registry.register(Box::new(build_info.clone()))?;
        build_info
            .with_label_values(&[
                build.built.as_str(),
                build.commit.as_str(),
                build.version.as_str(),
            ])
            .set(1.0);

        Ok(Self {
            registry,
            api_call_duration,
        })
    }

    /// Times one gateway call. The duration is observed when the timer drops.
    pub fn start_api_timer(&self, endpoint: &str) -> HistogramTimer {
        self.api_call_duration
            .with_label_values(&[endpoint])
            .start_timer()
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

/// Per-scrape registry for const-style series.
///
/// Vectors with no children are dropped by `gather`, which keeps empty
/// snapshots from producing empty families.
pub struct ScrapeRegistry {
    registry: Registry,
}

impl Default for ScrapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    pub fn gauge(&self, name: &str, help: &str) -> prometheus::Result<Gauge> {
        let gauge = Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    pub fn gauge_vec(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> prometheus::Result<GaugeVec> {
        let vec = GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        Ok(vec)
    }

    pub fn counter_vec(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> prometheus::Result<CounterVec> {
        let vec = CounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        Ok(vec)
    }

    pub fn gather(self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

/// Lifetime counters only move forward; anything negative or NaN reads as zero.
pub fn counter_value(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Renders families in the text exposition format.
pub fn encode_text(families: &[MetricFamily]) -> prometheus::Result<String> {
    use prometheus::Encoder;

    let mut buffer = Vec::new();
    prometheus::TextEncoder::new().encode(families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Looks up a sample in rendered exposition text, e.g.
/// `enphase_net_watts` or `enphase_consumption_watts{measurement_type="net-consumption"}`.
#[cfg(test)]
pub(crate) fn sample(text: &str, series: &str) -> Option<f64> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let (name, value) = line.rsplit_once(' ')?;
            (name == series).then(|| value.parse().ok()).flatten()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_info_is_exported() {
        let build = BuildInfo {
            version: "1.2.3".to_string(),
            commit: "abc123".to_string(),
            built: "2024-01-01".to_string(),
        };
        let metrics = ExporterMetrics::new(&build).unwrap();
        let text = encode_text(&metrics.gather()).unwrap();

        assert_eq!(
            sample(
                &text,
                r#"enphase_exporter_build_info{built="2024-01-01",commit="abc123",version="1.2.3"}"#
            ),
            Some(1.0)
        );
    }

    #[test]
    fn api_timer_observes_on_drop() {
        let metrics = ExporterMetrics::new(&BuildInfo::default()).unwrap();
        drop(metrics.start_api_timer("inverters"));
        let text = encode_text(&metrics.gather()).unwrap();

        assert_eq!(
            sample(
                &text,
                r#"enphase_api_call_duration_seconds_count{endpoint="inverters"}"#
            ),
            Some(1.0)
        );
    }

    #[test]
    fn empty_vectors_are_not_gathered() {
        let scrape = ScrapeRegistry::new();
        scrape
            .gauge_vec("inverter_watts", "unused", &["serial_number"])
            .unwrap();
        assert!(scrape.gather().is_empty());
    }

    #[test]
    fn counter_value_clamps_to_zero() {
        assert_eq!(counter_value(250.0), 250.0);
        assert_eq!(counter_value(-3.0), 0.0);
        assert_eq!(counter_value(f64::NAN), 0.0);
    }
}
