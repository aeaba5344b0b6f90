//! Configuration data model and validation

use crate::types::{Result, AppError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data channel saturation test settings
    #[serde(default)]
    pub throughput: ThroughputConfig,

    /// Telemetry polling test settings
    #[serde(default)]
    pub bandwidth: BandwidthConfig,

    /// Periodic one-way delay probe settings
    #[serde(default)]
    pub latency: LatencyConfig,

    /// Simulated link used by the loopback transport
    #[serde(default)]
    pub link: LinkConfig,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,

    /// Emit final summaries as JSON
    #[serde(default)]
    pub json: bool,
}

/// Settings for the data channel saturation test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputConfig {
    /// How long to keep sending
    pub duration_ms: u64,
    /// Size of one payload packet
    pub payload_bytes: usize,
    /// Upper bound of packets enqueued per send tick
    pub max_packets_per_tick: usize,
    /// Delay between send ticks
    pub tick_interval_ms: u64,
    /// Minimum wall time between two bitrate reports
    pub bitrate_report_interval_ms: u64,
    /// How long to wait for in-flight data after sending stopped
    pub drain_timeout_ms: u64,
}

/// Settings for the telemetry polling test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthConfig {
    pub duration_ms: u64,
    pub poll_interval_ms: u64,
    /// Video bitrate ceiling imposed on the session
    pub max_video_bitrate_kbps: u32,
    /// Fraction of the ceiling that counts as "ramped up"
    pub ramp_up_fraction: f64,
    /// Frames narrower and shorter than this are a camera failure
    pub min_frame_width: u32,
    pub min_frame_height: u32,
    /// Minimum capture resolution requested from the camera
    pub capture_min_width: u32,
    pub capture_min_height: u32,
}

/// Settings for the periodic delay probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyConfig {
    pub duration_ms: u64,
    pub send_interval_ms: u64,
    /// Fraction of expected samples that must arrive
    pub min_sample_ratio: f64,
    /// Stability fails when max > (min + margin) * factor
    pub jitter_margin_ms: f64,
    pub jitter_factor: f64,
    /// How often progress is reported while waiting for the deadline
    pub progress_interval_ms: u64,
}

/// Simulated link characteristics for the loopback transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Drain rate of the send buffer
    pub bandwidth_kbps: u64,
    /// One-way propagation delay
    pub latency_ms: u64,
    /// Time between establish() and the channel opening
    pub setup_delay_ms: u64,
    /// Sends beyond this many buffered bytes are rejected
    pub max_buffered_bytes: usize,
    /// Drop every Nth packet on unreliable channels, 0 disables loss
    pub drop_every: u32,
    /// Telemetry dialect exposed by the simulated session
    pub telemetry_dialect: String,
    /// Resolution delivered by the synthetic camera
    pub frame_width: u32,
    pub frame_height: u32,
    /// Time for the synthesized bandwidth estimate to reach the ceiling
    pub bwe_ramp_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            throughput: ThroughputConfig::default(),
            bandwidth: BandwidthConfig::default(),
            latency: LatencyConfig::default(),
            link: LinkConfig::default(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
            json: false,
        }
    }
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        use crate::defaults::*;
        Self {
            duration_ms: THROUGHPUT_DURATION.as_millis() as u64,
            payload_bytes: THROUGHPUT_PAYLOAD_BYTES,
            max_packets_per_tick: THROUGHPUT_PACKETS_PER_TICK,
            tick_interval_ms: THROUGHPUT_TICK.as_millis() as u64,
            bitrate_report_interval_ms: BITRATE_REPORT_INTERVAL.as_millis() as u64,
            drain_timeout_ms: DRAIN_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        use crate::defaults::*;
        Self {
            duration_ms: BANDWIDTH_DURATION.as_millis() as u64,
            poll_interval_ms: BANDWIDTH_POLL_INTERVAL.as_millis() as u64,
            max_video_bitrate_kbps: MAX_VIDEO_BITRATE_KBPS,
            ramp_up_fraction: RAMP_UP_FRACTION,
            min_frame_width: MIN_FRAME_DIMENSION,
            min_frame_height: MIN_FRAME_DIMENSION,
            capture_min_width: CAPTURE_MIN_WIDTH,
            capture_min_height: CAPTURE_MIN_HEIGHT,
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        use crate::defaults::*;
        Self {
            duration_ms: LATENCY_DURATION.as_millis() as u64,
            send_interval_ms: LATENCY_SEND_INTERVAL.as_millis() as u64,
            min_sample_ratio: MIN_SAMPLE_RATIO,
            jitter_margin_ms: JITTER_MARGIN_MS,
            jitter_factor: JITTER_FACTOR,
            progress_interval_ms: LATENCY_PROGRESS_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        use crate::defaults::*;
        Self {
            bandwidth_kbps: LINK_BANDWIDTH_KBPS,
            latency_ms: LINK_LATENCY.as_millis() as u64,
            setup_delay_ms: LINK_SETUP_DELAY.as_millis() as u64,
            max_buffered_bytes: LINK_MAX_BUFFERED_BYTES,
            drop_every: 0,
            telemetry_dialect: TELEMETRY_DIALECT.to_string(),
            frame_width: CAPTURE_MIN_WIDTH,
            frame_height: CAPTURE_MIN_HEIGHT,
            bwe_ramp_ms: LINK_BWE_RAMP.as_millis() as u64,
        }
    }
}

impl ThroughputConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn bitrate_report_interval(&self) -> Duration {
        Duration::from_millis(self.bitrate_report_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Buffered-but-unsent bytes at which a tick stops enqueuing
    pub fn bytes_to_keep_buffered(&self) -> usize {
        self.payload_bytes * self.max_packets_per_tick
    }
}

impl BandwidthConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bandwidth estimate (bps) that counts as ramped up
    pub fn ramp_up_threshold_bps(&self) -> f64 {
        self.ramp_up_fraction * self.max_video_bitrate_kbps as f64 * 1000.0
    }
}

impl LatencyConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Number of probes the run would deliver on a perfect path
    pub fn expected_samples(&self) -> f64 {
        self.duration_ms as f64 / self.send_interval_ms as f64
    }

    /// Fewest samples that still count as a complete run
    pub fn required_samples(&self) -> f64 {
        self.min_sample_ratio * self.expected_samples()
    }
}

impl LinkConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn setup_delay(&self) -> Duration {
        Duration::from_millis(self.setup_delay_ms)
    }

    /// Serialization time of `bytes` on this link
    pub fn transmit_time(&self, bytes: usize) -> Duration {
        let bits = bytes as f64 * 8.0;
        Duration::from_secs_f64(bits / (self.bandwidth_kbps as f64 * 1000.0))
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Multiply every test duration by `factor`
    pub fn scale_durations(&mut self, factor: f64) {
        let scale = |ms: u64| ((ms as f64 * factor).round() as u64).max(1);
        self.throughput.duration_ms = scale(self.throughput.duration_ms);
        self.bandwidth.duration_ms = scale(self.bandwidth.duration_ms);
        self.latency.duration_ms = scale(self.latency.duration_ms);
    }

    /// Validate the configuration and return the first error found
    pub fn validate(&self) -> Result<()> {
        let t = &self.throughput;
        if t.duration_ms == 0 {
            return Err(AppError::config("Throughput duration must be greater than 0"));
        }
        if t.payload_bytes == 0 {
            return Err(AppError::config("Throughput payload size must be greater than 0"));
        }
        if t.max_packets_per_tick == 0 {
            return Err(AppError::config("At least one packet must be allowed per send tick"));
        }
        if t.tick_interval_ms == 0 {
            return Err(AppError::config("Send tick interval must be greater than 0"));
        }
        if t.bitrate_report_interval_ms == 0 {
            return Err(AppError::config("Bitrate report interval must be greater than 0"));
        }

        let b = &self.bandwidth;
        if b.duration_ms == 0 || b.poll_interval_ms == 0 {
            return Err(AppError::config("Bandwidth duration and poll interval must be greater than 0"));
        }
        if b.poll_interval_ms > b.duration_ms {
            return Err(AppError::config(format!(
                "Bandwidth poll interval ({}ms) cannot exceed the test duration ({}ms)",
                b.poll_interval_ms, b.duration_ms
            )));
        }
        if b.max_video_bitrate_kbps == 0 {
            return Err(AppError::config("Maximum video bitrate must be greater than 0"));
        }
        if !(b.ramp_up_fraction > 0.0 && b.ramp_up_fraction <= 1.0) {
            return Err(AppError::config(format!(
                "Ramp-up fraction must be in (0, 1], got {}", b.ramp_up_fraction
            )));
        }

        let l = &self.latency;
        if l.duration_ms == 0 || l.send_interval_ms == 0 {
            return Err(AppError::config("Latency duration and send interval must be greater than 0"));
        }
        if !(l.min_sample_ratio > 0.0 && l.min_sample_ratio <= 1.0) {
            return Err(AppError::config(format!(
                "Minimum sample ratio must be in (0, 1], got {}", l.min_sample_ratio
            )));
        }
        if l.jitter_margin_ms < 0.0 || l.jitter_factor <= 0.0 {
            return Err(AppError::config("Jitter margin must be non-negative and jitter factor positive"));
        }
        if l.progress_interval_ms == 0 {
            return Err(AppError::config("Latency progress interval must be greater than 0"));
        }

        let k = &self.link;
        if k.bandwidth_kbps == 0 {
            return Err(AppError::config("Link bandwidth must be greater than 0"));
        }
        if k.max_buffered_bytes < t.bytes_to_keep_buffered() {
            return Err(AppError::config(format!(
                "Link buffer ({} bytes) is smaller than the pacer's buffering target ({} bytes)",
                k.max_buffered_bytes,
                t.bytes_to_keep_buffered()
            )));
        }
        if k.telemetry_dialect.trim().is_empty() {
            return Err(AppError::config("Telemetry dialect cannot be empty"));
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Some(seconds) = env_number::<f64>("THROUGHPUT_DURATION_SECONDS")? {
            self.throughput.duration_ms = seconds_to_ms(seconds);
        }

        if let Some(seconds) = env_number::<f64>("BANDWIDTH_DURATION_SECONDS")? {
            self.bandwidth.duration_ms = seconds_to_ms(seconds);
        }

        if let Some(ms) = env_number::<u64>("BANDWIDTH_POLL_MS")? {
            self.bandwidth.poll_interval_ms = ms;
        }

        if let Some(kbps) = env_number::<u32>("MAX_VIDEO_BITRATE_KBPS")? {
            self.bandwidth.max_video_bitrate_kbps = kbps;
        }

        if let Some(seconds) = env_number::<f64>("LATENCY_DURATION_SECONDS")? {
            self.latency.duration_ms = seconds_to_ms(seconds);
        }

        if let Some(ms) = env_number::<u64>("LATENCY_INTERVAL_MS")? {
            self.latency.send_interval_ms = ms;
        }

        if let Some(ratio) = env_number::<f64>("MIN_SAMPLE_RATIO")? {
            self.latency.min_sample_ratio = ratio;
        }

        if let Some(margin) = env_number::<f64>("JITTER_MARGIN_MS")? {
            self.latency.jitter_margin_ms = margin;
        }

        if let Some(kbps) = env_number::<u64>("LINK_BANDWIDTH_KBPS")? {
            self.link.bandwidth_kbps = kbps;
        }

        if let Some(ms) = env_number::<u64>("LINK_LATENCY_MS")? {
            self.link.latency_ms = ms;
        }

        if let Ok(dialect) = std::env::var("TELEMETRY_DIALECT") {
            self.link.telemetry_dialect = dialect.trim().to_string();
        }

        if let Ok(enable_color) = std::env::var("ENABLE_COLOR") {
            self.enable_color = enable_color.parse()
                .map_err(|e| AppError::config(format!("Invalid ENABLE_COLOR value '{}': {}", enable_color, e)))?;
        }

        Ok(())
    }
}

/// Read and parse a numeric environment variable if it is set
fn env_number<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>()
            .map(Some)
            .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

pub(crate) fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds * 1000.0).round() as u64
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
