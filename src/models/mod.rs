//! Data models and structures for the peer throughput tester

pub mod config;
pub mod metrics;

// Re-export main model types
pub use config::{Config, ThroughputConfig, BandwidthConfig, LatencyConfig, LinkConfig};
pub use metrics::{
    ThroughputSummary, BandwidthSummary, LatencySummary, MeasurementSummary, Resolution, TestResult,
};
