//! Result models produced by the measurement components

use crate::stats::{DelayStatistics, RampUpTime};
use crate::types::TestStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final figures of a data channel saturation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSummary {
    pub sent_bytes: u64,
    pub received_bytes: u64,
    /// Received volume in kilobits
    pub total_kilobits: f64,
    /// Seconds from the first send tick to full drain
    pub elapsed_seconds: f64,
    /// Per-interval receive bitrate reports in kbps
    pub bitrate_samples_kbps: Vec<f64>,
}

impl ThroughputSummary {
    /// Sustained receive bitrate over the whole run
    pub fn average_kbps(&self) -> Option<f64> {
        if self.elapsed_seconds > 0.0 {
            Some(self.total_kilobits / self.elapsed_seconds)
        } else {
            None
        }
    }
}

/// Frame dimensions reported by the sending side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Final figures of a telemetry polling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSummary {
    /// Telemetry dialect selected for the session
    pub telemetry_format: String,
    /// Whether the capture produced usable frames
    pub camera_ok: bool,
    pub resolution: Option<Resolution>,
    /// Bandwidth estimate figures, absent when the capture was unusable
    pub bandwidth_avg_bps: Option<f64>,
    pub bandwidth_max_bps: Option<f64>,
    pub ramp_up: Option<RampUpTime>,
    pub rtt_avg_ms: Option<f64>,
    pub rtt_max_ms: Option<f64>,
    pub packets_lost: Option<i64>,
    pub jitter: Option<f64>,
    pub bitrate_mean_bps: Option<f64>,
    pub bitrate_std_dev_bps: Option<f64>,
    pub framerate_mean: Option<f64>,
    pub polls: u32,
    pub failed_polls: u32,
}

/// Final figures of a periodic delay probe run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub sample_count: usize,
    pub expected_samples: f64,
    pub delay: Option<DelayStatistics>,
    pub enough_samples: bool,
    /// `None` when there was nothing to judge
    pub stable: Option<bool>,
}

/// Component-specific result of a finished test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasurementSummary {
    Throughput(ThroughputSummary),
    Bandwidth(BandwidthSummary),
    Latency(LatencySummary),
}

/// Outcome of one test case as collected by the executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub suite: String,
    pub name: String,
    pub status: TestStatus,
    pub summary: Option<MeasurementSummary>,
    /// Error and fatal messages reported during the run
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}
