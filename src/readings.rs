//! Snapshot shapes returned by the gateway's meter, report and inverter endpoints.
//!
//! Firmware revisions disagree about which fields are present, and some send
//! `null` where a number is expected. Every numeric field therefore decodes
//! absent or `null` as zero and every array decodes absent or `null` as empty,
//! so a snapshot never carries a hole into metric derivation.

use serde::{Deserialize as _, Deserializer};
use serde_derive::{Deserialize, Serialize};

/// Report type of the consumption entry used for net power.
pub const TOTAL_CONSUMPTION: &str = "total-consumption";

/// Report type of the grid-exchange consumption entry.
pub const NET_CONSUMPTION: &str = "net-consumption";

fn zero_if_null<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One report from `/ivp/meters/reports/*`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeterReport {
    #[serde(deserialize_with = "zero_if_null")]
    pub created_at: i64,
    /// "production", "total-consumption" or "net-consumption".
    #[serde(deserialize_with = "zero_if_null")]
    pub report_type: String,
    #[serde(deserialize_with = "zero_if_null")]
    pub cumulative: MeterReportData,
    /// Per-leg breakdown. Present on split-phase and three-phase installs.
    #[serde(deserialize_with = "zero_if_null")]
    pub lines: Vec<MeterReportData>,
}

impl MeterReport {
    /// Lifetime delivered energy in watt-hours.
    ///
    /// On split-phase installs the cumulative block double counts, so when
    /// per-line values exist their sum is authoritative.
    pub fn lifetime_wh(&self) -> f64 {
        if self.lines.is_empty() {
            self.cumulative.wh_dlvd_cum
        } else {
            self.lines.iter().map(|line| line.wh_dlvd_cum).sum()
        }
    }
}

/// Power and energy block inside a [`MeterReport`].
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeterReportData {
    #[serde(deserialize_with = "zero_if_null")]
    pub curr_w: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub act_power: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub apprnt_pwr: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub react_pwr: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub wh_dlvd_cum: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub wh_rcvd_cum: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub varh_lag_cum: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub varh_lead_cum: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub vah_cum: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub rms_voltage: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub rms_current: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub pwr_factor: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub freq_hz: f64,
}

/// One meter from `/ivp/meters/readings`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeterReading {
    #[serde(deserialize_with = "zero_if_null")]
    pub eid: i64,
    #[serde(deserialize_with = "zero_if_null")]
    pub timestamp: i64,
    #[serde(deserialize_with = "zero_if_null")]
    pub act_energy_dlvd: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub act_energy_rcvd: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub apparent_energy: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub react_energy_lagg: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub react_energy_lead: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub instantaneous_demand: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub active_power: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub apparent_power: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub reactive_power: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub pwr_factor: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub voltage: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub current: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub freq: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub channels: Vec<MeterChannel>,
}

/// A single phase of a [`MeterReading`]. The device reports no per-phase
/// frequency worth exporting, so `freq` is carried but unused.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeterChannel {
    #[serde(deserialize_with = "zero_if_null")]
    pub eid: i64,
    #[serde(deserialize_with = "zero_if_null")]
    pub timestamp: i64,
    #[serde(deserialize_with = "zero_if_null")]
    pub act_energy_dlvd: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub act_energy_rcvd: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub active_power: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub apparent_power: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub reactive_power: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub pwr_factor: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub voltage: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub current: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub freq: f64,
}

/// One microinverter from `/api/v1/production/inverters`.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Inverter {
    #[serde(deserialize_with = "zero_if_null")]
    pub serial_number: String,
    /// Unix seconds.
    #[serde(deserialize_with = "zero_if_null")]
    pub last_report_date: i64,
    #[serde(deserialize_with = "zero_if_null")]
    pub dev_type: i64,
    #[serde(deserialize_with = "zero_if_null")]
    pub last_report_watts: i64,
    #[serde(deserialize_with = "zero_if_null")]
    pub max_report_watts: i64,
}

/// The array endpoints occasionally answer with a bare `null`.
pub(crate) fn list_or_empty<T>(body: &[u8]) -> Result<Vec<T>, serde_json::Error>
where
    T: serde::de::DeserializeOwned,
{
    Ok(serde_json::from_slice::<Option<Vec<T>>>(body)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_phase_lifetime_uses_line_sum() {
        let report: MeterReport = serde_json::from_str(
            r#"{
                "createdAt": 1704067200,
                "reportType": "production",
                "cumulative": {"currW": 2500.5, "whDlvdCum": 500},
                "lines": [{"whDlvdCum": 100}, {"whDlvdCum": 150}]
            }"#,
        )
        .unwrap();

        assert_eq!(report.lifetime_wh(), 250.0);
    }

    #[test]
    fn single_phase_lifetime_uses_cumulative() {
        let report = MeterReport {
            cumulative: MeterReportData {
                wh_dlvd_cum: 500.0,
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(report.lifetime_wh(), 500.0);
    }

    #[test]
    fn null_and_missing_fields_decode_as_zero() {
        let report: MeterReport = serde_json::from_str(
            r#"{"reportType": null, "cumulative": {"currW": null, "rmsVoltage": 241.2}, "lines": null}"#,
        )
        .unwrap();

        assert_eq!(report.report_type, "");
        assert_eq!(report.cumulative.curr_w, 0.0);
        assert_eq!(report.cumulative.rms_voltage, 241.2);
        assert_eq!(report.cumulative.pwr_factor, 0.0);
        assert!(report.lines.is_empty());
    }

    #[test]
    fn meter_reading_decodes_channels() {
        let readings: Vec<MeterReading> = list_or_empty(
            br#"[{
                "eid": 704643328,
                "voltage": 240.5,
                "freq": 60.0,
                "channels": [
                    {"voltage": 120.2, "current": 5.1, "activePower": 612.0},
                    {"voltage": 120.3, "current": 5.2, "activePower": 625.0}
                ]
            }]"#,
        )
        .unwrap();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].eid, 704643328);
        assert_eq!(readings[0].channels.len(), 2);
        assert_eq!(readings[0].channels[1].active_power, 625.0);
    }

    #[test]
    fn null_list_body_is_empty() {
        let inverters: Vec<Inverter> = list_or_empty(b"null").unwrap();
        assert!(inverters.is_empty());
    }

    #[test]
    fn malformed_list_body_is_an_error() {
        let result: Result<Vec<Inverter>, _> = list_or_empty(br#"{"serialNumber": "x"}"#);
        assert!(result.is_err());
    }
}
