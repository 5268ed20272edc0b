// Report fusion - merges the latest bearing, latest GPS fix and parameters into one outbound report

use crate::dispatch::Readings;
use crate::params::Parameters;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Report type used when no bearing has been decoded yet
pub const GPS_ONLY_REPORT_TYPE: &str = "GPS Only";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("no report")]
    NoReport,
}

/// Outbound report. Keys are always serialized; `null` means unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedReport {
    #[serde(rename = "deviceAlias")]
    pub device_alias: String,
    pub observer: String,
    pub equipment: String,

    /// When the device decoded the observation. Less accurate than GPS time.
    #[serde(rename = "deviceUTCTime")]
    pub device_utc_time: String,
    /// When this report was built for sending
    #[serde(rename = "deviceReportingUTCTime")]
    pub device_reporting_utc_time: String,

    /// Bearing from true north
    #[serde(rename = "absoluteBearing")]
    pub absolute_bearing: Option<String>,
    #[serde(rename = "directionQuality")]
    pub direction_quality: Option<String>,
    /// Relative to the unit; Agrello units do not report it
    #[serde(rename = "relativeBearing")]
    pub relative_bearing: Option<String>,
    /// Bearing from magnetic north; Agrello units do not report it
    #[serde(rename = "absoluteMagneticBearing")]
    pub absolute_magnetic_bearing: Option<String>,

    /// MHz
    #[serde(rename = "signalFrequency")]
    pub signal_frequency: Option<f64>,
    /// dB, only available from an SDR or radio control link
    #[serde(rename = "signalStrength")]
    pub signal_strength: Option<f64>,
    #[serde(rename = "modulationType")]
    pub modulation_type: String,
    #[serde(rename = "reportType")]
    pub report_type: String,
    /// Scale of 0-9 from the ADF signal quality
    pub confidence: Option<String>,

    #[serde(rename = "adfDirectionUncertainty")]
    pub adf_direction_uncertainty: f64,
    #[serde(rename = "observerDirectionUncertainty")]
    pub observer_direction_uncertainty: f64,
    #[serde(rename = "receiverLevel")]
    pub receiver_level: f64,

    /// Raw sentence of the stored fix, good or not, so the receiver can decode it
    #[serde(rename = "gpsNMEAMessage")]
    pub gps_nmea_message: Option<String>,
    #[serde(rename = "observerPosition")]
    pub observer_position: Option<String>,
    #[serde(rename = "gpsPosition")]
    pub gps_position: Option<String>,
    #[serde(rename = "gpsUTCTime")]
    pub gps_utc_time: Option<String>,
    /// Track made good, degrees true
    #[serde(rename = "observerDirection")]
    pub observer_direction: Option<String>,
    /// Knots
    #[serde(rename = "observerSpeed")]
    pub observer_speed: Option<String>,
}

impl FusedReport {
    pub fn is_gps_only(&self) -> bool {
        self.absolute_bearing.is_none()
    }
}

fn utc_string(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build a report stamped with the current time
pub fn build(readings: &Readings, params: &Parameters) -> Result<FusedReport, ReportError> {
    build_at(readings, params, Utc::now())
}

/// Build a report with `now` as the transmission time.
///
/// With a bearing the report is a full ADF report; without one but with a
/// fix it is a GPS-only report; with neither there is nothing to report.
/// GPS fields are filled only from a fix whose status is good.
pub fn build_at(
    readings: &Readings,
    params: &Parameters,
    now: DateTime<Utc>,
) -> Result<FusedReport, ReportError> {
    let bearing = readings.bearing();
    let fix = readings.fix();

    let observed_at = match (bearing, fix) {
        (Some(b), _) => b.observed_at,
        (None, Some(f)) => f.received_at,
        (None, None) => return Err(ReportError::NoReport),
    };

    let good_fix = fix.filter(|f| f.status_good);
    let position = good_fix.and_then(|f| f.position());

    let report_type = match bearing {
        Some(_) => params.report_type.clone(),
        None => GPS_ONLY_REPORT_TYPE.to_string(),
    };

    Ok(FusedReport {
        device_alias: params.device_alias.clone(),
        observer: params.observer.clone(),
        equipment: params.equipment.clone(),
        device_utc_time: utc_string(observed_at),
        device_reporting_utc_time: utc_string(now),
        absolute_bearing: bearing.map(|b| b.bearing.clone()),
        direction_quality: bearing.map(|b| b.quality.clone()),
        relative_bearing: None,
        absolute_magnetic_bearing: None,
        signal_frequency: params.signal_frequency,
        signal_strength: None,
        modulation_type: params.modulation_type.clone(),
        report_type,
        confidence: bearing.map(|b| b.quality.clone()),
        adf_direction_uncertainty: params.adf_direction_uncertainty,
        observer_direction_uncertainty: params.observer_direction_uncertainty,
        receiver_level: params.receiver_level,
        gps_nmea_message: fix.map(|f| f.raw_sentence.clone()),
        observer_position: position.clone(),
        gps_position: position,
        gps_utc_time: good_fix.map(|f| f.utc_time.clone()),
        observer_direction: good_fix.map(|f| f.heading.clone()),
        observer_speed: good_fix.map(|f| f.speed.clone()),
    })
}
