//! Statistics primitives shared by the measurement components
//!
//! [`RunningAggregate`] folds a time series of `(timestamp, value)` samples
//! into average, maximum and a ramp-up time, i.e. how long after the first
//! sample the series first reached a threshold. [`DelayStatistics`] summarizes
//! the one-way delay series collected by the latency probe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single recorded observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Monotonic timestamp in milliseconds
    pub timestamp_ms: f64,
    /// Observed value
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp_ms: f64, value: f64) -> Self {
        Self { timestamp_ms, value }
    }
}

/// Time until a tracked value first reached its ramp-up threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ms", rename_all = "snake_case")]
pub enum RampUpTime {
    /// Threshold reached this many milliseconds after the first sample
    Reached(f64),
    /// Threshold never reached, or no threshold configured
    Infinite,
}

impl RampUpTime {
    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }

    /// Milliseconds until the threshold was reached, if it was
    pub fn as_millis(&self) -> Option<f64> {
        match self {
            Self::Reached(ms) => Some(*ms),
            Self::Infinite => None,
        }
    }
}

impl fmt::Display for RampUpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reached(ms) => write!(f, "{}", ms.round()),
            Self::Infinite => write!(f, "Infinity"),
        }
    }
}

/// Running aggregate over an append-only series of samples.
///
/// Samples are expected in non-decreasing timestamp order; the aggregate does
/// not reorder them. Derived values are maintained incrementally so `add` is
/// O(1) amortized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunningAggregate {
    samples: Vec<Sample>,
    sum: f64,
    max: Option<f64>,
    min: Option<f64>,
    ramp_up_threshold: Option<f64>,
    ramp_up_reached_at: Option<f64>,
}

impl RunningAggregate {
    /// Create an aggregate without a ramp-up threshold
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an aggregate that tracks time to reach `threshold`
    pub fn with_ramp_up_threshold(threshold: f64) -> Self {
        Self {
            ramp_up_threshold: Some(threshold),
            ..Self::default()
        }
    }

    /// Record one sample
    pub fn add(&mut self, timestamp_ms: f64, value: f64) {
        self.sum += value;
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.min = Some(self.min.map_or(value, |m| m.min(value)));

        if self.ramp_up_reached_at.is_none() {
            if let Some(threshold) = self.ramp_up_threshold {
                if value >= threshold {
                    self.ramp_up_reached_at = Some(timestamp_ms);
                }
            }
        }

        self.samples.push(Sample::new(timestamp_ms, value));
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Arithmetic mean of all values, `None` when empty
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.sum / self.samples.len() as f64)
        }
    }

    /// Largest value observed, `None` when empty
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// Smallest value observed, `None` when empty
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn ramp_up_threshold(&self) -> Option<f64> {
        self.ramp_up_threshold
    }

    /// Time from the first sample until a value first reached the threshold
    pub fn ramp_up_time(&self) -> RampUpTime {
        match (self.samples.first(), self.ramp_up_reached_at) {
            (Some(first), Some(reached_at)) => RampUpTime::Reached(reached_at - first.timestamp_ms),
            _ => RampUpTime::Infinite,
        }
    }

    /// All recorded samples in insertion order
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

/// Average, minimum and maximum of a delay series in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayStatistics {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl DelayStatistics {
    /// Summarize a series of delays; `None` for an empty series
    pub fn from_delays(delays: &[f64]) -> Option<Self> {
        if delays.is_empty() {
            return None;
        }

        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &delay in delays {
            sum += delay;
            min = min.min(delay);
            max = max.max(delay);
        }

        Some(Self {
            avg_ms: sum / delays.len() as f64,
            min_ms: min,
            max_ms: max,
        })
    }

    /// Whether the spread between min and max delay stays within
    /// `(min + margin_ms) * factor`
    pub fn is_stable(&self, margin_ms: f64, factor: f64) -> bool {
        self.max_ms <= (self.min_ms + margin_ms) * factor
    }
}
