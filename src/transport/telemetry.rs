//! Telemetry format detection and field extraction
//!
//! Transports expose their internal counters in one of two report shapes:
//!
//! * **legacy**: an array of `{id, type, timestamp, stats: {name: value}}`
//!   reports where values are usually numeric strings. The bandwidth estimate
//!   lives in the `bweforvideo` report, RTT, frame size and loss in `ssrc`
//!   reports.
//! * **standard**: an object keyed by report id. RTT, jitter and loss live in
//!   `outbound_rtcp_video_0`, bitrate and frame-rate means in
//!   `outbound_rtp_video_0`. Frame dimensions are not exposed.
//!
//! The format is detected once per session from the dialect name the session
//! advertises. Anything else maps to [`TelemetryFormat::Unrecognized`], which
//! fails every extraction instead of producing zeros.

use crate::error::{AppError, Result};
use crate::stats::Sample;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

pub const LEGACY_DIALECT: &str = "legacy";
pub const STANDARD_DIALECT: &str = "standard";

const BWE_REPORT_ID: &str = "bweforvideo";
const SSRC_REPORT_TYPE: &str = "ssrc";
const OUTBOUND_RTCP_VIDEO_ID: &str = "outbound_rtcp_video_0";
const OUTBOUND_RTP_VIDEO_ID: &str = "outbound_rtp_video_0";

/// Report shape selected for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryFormat {
    Legacy,
    Standard,
    /// The session advertised a dialect we cannot read
    Unrecognized(String),
}

/// Numeric fields pulled out of one telemetry snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandwidthSnapshot {
    /// Available send bandwidth estimates in bps
    pub bandwidth_samples: Vec<Sample>,
    /// Round-trip times in ms
    pub rtt_samples: Vec<Sample>,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
    pub packets_lost: Option<i64>,
    pub jitter: Option<f64>,
    pub bitrate_mean: Option<f64>,
    pub bitrate_std_dev: Option<f64>,
    pub framerate_mean: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LegacyReport {
    id: String,
    #[serde(rename = "type")]
    report_type: String,
    timestamp: Value,
    #[serde(default)]
    stats: HashMap<String, Value>,
}

impl LegacyReport {
    fn stat(&self, name: &str) -> Option<&Value> {
        self.stats.get(name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StandardReport {
    id: String,
    timestamp: Value,
    moz_rtt: Option<Value>,
    jitter: Option<f64>,
    packets_lost: Option<Value>,
    bitrate_mean: Option<f64>,
    bitrate_std_dev: Option<f64>,
    framerate_mean: Option<f64>,
}

impl TelemetryFormat {
    /// Select the extraction logic for a session's advertised dialect
    pub fn detect(dialect: &str) -> Self {
        match dialect.trim().to_ascii_lowercase().as_str() {
            LEGACY_DIALECT => Self::Legacy,
            STANDARD_DIALECT => Self::Standard,
            _ => Self::Unrecognized(dialect.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Whether this format reports frame dimensions
    pub fn reports_resolution(&self) -> bool {
        matches!(self, Self::Legacy)
    }

    /// Pull the numeric fields out of a raw snapshot
    pub fn extract(&self, raw: &Value) -> Result<BandwidthSnapshot> {
        match self {
            Self::Legacy => extract_legacy(raw),
            Self::Standard => extract_standard(raw),
            Self::Unrecognized(dialect) => Err(AppError::unsupported_telemetry(format!(
                "Only {} and {} telemetry implementations are supported, session reports '{}'",
                LEGACY_DIALECT, STANDARD_DIALECT, dialect
            ))),
        }
    }
}

impl fmt::Display for TelemetryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str(LEGACY_DIALECT),
            Self::Standard => f.write_str(STANDARD_DIALECT),
            Self::Unrecognized(dialect) => write!(f, "unrecognized ({})", dialect),
        }
    }
}

fn extract_legacy(raw: &Value) -> Result<BandwidthSnapshot> {
    let entries = raw.as_array()
        .ok_or_else(|| AppError::telemetry("legacy snapshot must be an array of reports"))?;

    let mut snapshot = BandwidthSnapshot::default();
    for entry in entries {
        let report: LegacyReport = serde_json::from_value(entry.clone())
            .map_err(|e| AppError::telemetry(format!("malformed legacy report: {}", e)))?;

        if report.id == BWE_REPORT_ID {
            let timestamp = timestamp_ms(&report.timestamp)?;
            if let Some(bps) = report.stat("googAvailableSendBandwidth").and_then(int_field) {
                snapshot.bandwidth_samples.push(Sample::new(timestamp, bps as f64));
            }
        } else if report.report_type == SSRC_REPORT_TYPE {
            let timestamp = timestamp_ms(&report.timestamp)?;
            if let Some(rtt) = report.stat("googRtt").and_then(int_field) {
                snapshot.rtt_samples.push(Sample::new(timestamp, rtt as f64));
            }
            if let Some(width) = report.stat("googFrameWidthSent").and_then(dimension_field) {
                snapshot.frame_width = Some(width);
            }
            if let Some(height) = report.stat("googFrameHeightSent").and_then(dimension_field) {
                snapshot.frame_height = Some(height);
            }
            if let Some(lost) = report.stat("packetsLost").and_then(int_field) {
                snapshot.packets_lost = Some(lost);
            }
        }
    }

    Ok(snapshot)
}

fn extract_standard(raw: &Value) -> Result<BandwidthSnapshot> {
    let entries = raw.as_object()
        .ok_or_else(|| AppError::telemetry("standard snapshot must be an object keyed by report id"))?;

    let mut snapshot = BandwidthSnapshot::default();
    for entry in entries.values() {
        let report: StandardReport = serde_json::from_value(entry.clone())
            .map_err(|e| AppError::telemetry(format!("malformed standard report: {}", e)))?;

        if report.id == OUTBOUND_RTCP_VIDEO_ID {
            let timestamp = timestamp_ms(&report.timestamp)?;
            if let Some(rtt) = report.moz_rtt.as_ref().and_then(int_field) {
                snapshot.rtt_samples.push(Sample::new(timestamp, rtt as f64));
            }
            snapshot.jitter = report.jitter.or(snapshot.jitter);
            if let Some(lost) = report.packets_lost.as_ref().and_then(int_field) {
                snapshot.packets_lost = Some(lost);
            }
        } else if report.id == OUTBOUND_RTP_VIDEO_ID {
            snapshot.bitrate_mean = report.bitrate_mean.or(snapshot.bitrate_mean);
            snapshot.bitrate_std_dev = report.bitrate_std_dev.or(snapshot.bitrate_std_dev);
            snapshot.framerate_mean = report.framerate_mean.or(snapshot.framerate_mean);
        }
    }

    Ok(snapshot)
}

/// Report timestamp in milliseconds; accepts epoch milliseconds or RFC 3339
fn timestamp_ms(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64()
            .ok_or_else(|| AppError::telemetry(format!("timestamp out of range: {}", n))),
        Value::String(s) => {
            let parsed = DateTime::parse_from_rfc3339(s.trim())?;
            Ok(parsed.timestamp_millis() as f64)
        }
        other => Err(AppError::telemetry(format!("unexpected timestamp value: {}", other))),
    }
}

/// Integer value of a stat, parsed like a leading-integer string parse
fn int_field(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    }
}

fn dimension_field(value: &Value) -> Option<u32> {
    int_field(value).and_then(|v| u32::try_from(v).ok())
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}
