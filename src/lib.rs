//! Peer Throughput Tester
//!
//! Measures what a peer-to-peer transport session can actually deliver:
//! sustained data channel throughput, how fast the sender's bandwidth
//! estimate ramps up under a video bitrate ceiling, and whether one-way
//! delay stays stable over a long run. Sessions come from a
//! [`transport::SessionFactory`]; the bundled loopback transport simulates a
//! link with configurable bandwidth and latency.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod harness;
pub mod logging;
pub mod measurement;
pub mod models;
pub mod output;
pub mod stats;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use executor::{ExecutionResults, SequentialExecutor, TestExecutor};
pub use harness::{RecordingReporter, TestRegistry, TestReporter};
pub use measurement::{BandwidthSampler, LatencyProbe, Measurement, ThroughputPacer};
pub use models::{Config, MeasurementSummary, TestResult};
pub use output::{ColoredFormatter, ConsoleReporter, OutputCoordinator, OutputFormatter, OutputFormatterFactory, PlainFormatter};
pub use stats::{DelayStatistics, RampUpTime, RunningAggregate};
pub use transport::{LoopbackSessionFactory, SessionFactory, TelemetryFormat};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    // Data channel saturation
    pub const THROUGHPUT_DURATION: Duration = Duration::from_secs(5);
    pub const THROUGHPUT_PAYLOAD_BYTES: usize = 1024;
    pub const THROUGHPUT_PACKETS_PER_TICK: usize = 1;
    pub const THROUGHPUT_TICK: Duration = Duration::from_millis(1);
    pub const BITRATE_REPORT_INTERVAL: Duration = Duration::from_millis(1000);
    pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

    // Telemetry polling
    pub const BANDWIDTH_DURATION: Duration = Duration::from_secs(40);
    pub const BANDWIDTH_POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const MAX_VIDEO_BITRATE_KBPS: u32 = 2000;
    pub const RAMP_UP_FRACTION: f64 = 0.75;
    pub const MIN_FRAME_DIMENSION: u32 = 2;
    pub const CAPTURE_MIN_WIDTH: u32 = 1280;
    pub const CAPTURE_MIN_HEIGHT: u32 = 720;

    // Delay probe
    pub const LATENCY_DURATION: Duration = Duration::from_secs(5 * 60);
    pub const LATENCY_SEND_INTERVAL: Duration = Duration::from_millis(100);
    pub const MIN_SAMPLE_RATIO: f64 = 0.8;
    pub const JITTER_MARGIN_MS: f64 = 100.0;
    pub const JITTER_FACTOR: f64 = 2.0;
    pub const LATENCY_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

    // Loopback link
    pub const LINK_BANDWIDTH_KBPS: u64 = 20_000;
    pub const LINK_LATENCY: Duration = Duration::from_millis(20);
    pub const LINK_SETUP_DELAY: Duration = Duration::from_millis(50);
    pub const LINK_MAX_BUFFERED_BYTES: usize = 16 * 1024 * 1024;
    pub const LINK_BWE_RAMP: Duration = Duration::from_secs(2);
    pub const TELEMETRY_DIALECT: &str = "legacy";

    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
