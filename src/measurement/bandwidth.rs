//! Video bandwidth estimation test
//!
//! Runs a relayed video session with a capped bitrate and polls the
//! transport's telemetry on a fixed delay. Bandwidth estimates and RTTs are
//! folded into running aggregates; frame size, loss and the standard-dialect
//! bitrate figures are kept as last-observed values.

use super::{abort_setup, close_session, figure, Measurement};
use crate::harness::{run_scheduled, ScheduledTask, TestReporter, Tick};
use crate::logging::Logger;
use crate::models::{BandwidthConfig, BandwidthSummary, MeasurementSummary, Resolution};
use crate::stats::RunningAggregate;
use crate::transport::{
    BandwidthSnapshot, MediaConstraints, Session, SessionConfig, SessionFactory, TelemetryFormat,
};
use crate::types::CandidateFilter;
use async_trait::async_trait;
use tokio::time::Instant;

/// Everything learned from the telemetry polls of one run
#[derive(Debug, Clone)]
pub struct BandwidthAccumulator {
    format: TelemetryFormat,
    bwe_stats: RunningAggregate,
    rtt_stats: RunningAggregate,
    frame_width: Option<u32>,
    frame_height: Option<u32>,
    packets_lost: Option<i64>,
    jitter: Option<f64>,
    bitrate_mean: Option<f64>,
    bitrate_std_dev: Option<f64>,
    framerate_mean: Option<f64>,
    polls: u32,
    failed_polls: u32,
}

impl BandwidthAccumulator {
    pub fn new(format: TelemetryFormat, ramp_up_threshold_bps: f64) -> Self {
        Self {
            format,
            bwe_stats: RunningAggregate::with_ramp_up_threshold(ramp_up_threshold_bps),
            rtt_stats: RunningAggregate::new(),
            frame_width: None,
            frame_height: None,
            packets_lost: None,
            jitter: None,
            bitrate_mean: None,
            bitrate_std_dev: None,
            framerate_mean: None,
            polls: 0,
            failed_polls: 0,
        }
    }

    pub fn format(&self) -> &TelemetryFormat {
        &self.format
    }

    pub fn bandwidth(&self) -> &RunningAggregate {
        &self.bwe_stats
    }

    pub fn rtt(&self) -> &RunningAggregate {
        &self.rtt_stats
    }

    /// Fold one snapshot into the aggregates and last-observed values
    pub fn fold(&mut self, snapshot: BandwidthSnapshot) {
        self.polls += 1;
        for sample in snapshot.bandwidth_samples {
            self.bwe_stats.add(sample.timestamp_ms, sample.value);
        }
        for sample in snapshot.rtt_samples {
            self.rtt_stats.add(sample.timestamp_ms, sample.value);
        }
        self.frame_width = snapshot.frame_width.or(self.frame_width);
        self.frame_height = snapshot.frame_height.or(self.frame_height);
        self.packets_lost = snapshot.packets_lost.or(self.packets_lost);
        self.jitter = snapshot.jitter.or(self.jitter);
        self.bitrate_mean = snapshot.bitrate_mean.or(self.bitrate_mean);
        self.bitrate_std_dev = snapshot.bitrate_std_dev.or(self.bitrate_std_dev);
        self.framerate_mean = snapshot.framerate_mean.or(self.framerate_mean);
    }

    pub fn record_failure(&mut self) {
        self.polls += 1;
        self.failed_polls += 1;
    }

    /// Report the final figures and build the summary.
    ///
    /// Bandwidth figures are withheld when the camera never produced usable
    /// frames.
    pub fn finalize(&self, config: &BandwidthConfig, reporter: &mut dyn TestReporter) -> BandwidthSummary {
        let mut summary = BandwidthSummary {
            telemetry_format: self.format.to_string(),
            camera_ok: false,
            resolution: None,
            bandwidth_avg_bps: None,
            bandwidth_max_bps: None,
            ramp_up: None,
            rtt_avg_ms: self.rtt_stats.average(),
            rtt_max_ms: self.rtt_stats.max(),
            packets_lost: self.packets_lost,
            jitter: self.jitter,
            bitrate_mean_bps: self.bitrate_mean,
            bitrate_std_dev_bps: self.bitrate_std_dev,
            framerate_mean: self.framerate_mean,
            polls: self.polls,
            failed_polls: self.failed_polls,
        };

        match &self.format {
            TelemetryFormat::Legacy => {
                let width = self.frame_width.unwrap_or(0);
                let height = self.frame_height.unwrap_or(0);
                // a camera that starts but never delivers frames reports 0x0 or 1x1
                if width < config.min_frame_width && height < config.min_frame_height {
                    reporter.report_error(&format!(
                        "Camera failure: {}x{}. Cannot test bandwidth without a working camera.",
                        width, height
                    ));
                } else {
                    let resolution = Resolution::new(width, height);
                    let ramp_up = self.bwe_stats.ramp_up_time();
                    reporter.report_success(&format!("Video resolution: {}", resolution));
                    reporter.report_info(&format!(
                        "Send bandwidth estimate average: {} bps",
                        figure(self.bwe_stats.average())
                    ));
                    reporter.report_info(&format!(
                        "Send bandwidth estimate max: {} bps",
                        figure(self.bwe_stats.max())
                    ));
                    reporter.report_info(&format!("Send bandwidth ramp-up time: {} ms", ramp_up));

                    summary.camera_ok = true;
                    summary.resolution = Some(resolution);
                    summary.bandwidth_avg_bps = self.bwe_stats.average();
                    summary.bandwidth_max_bps = self.bwe_stats.max();
                    summary.ramp_up = Some(ramp_up);
                }
            }
            TelemetryFormat::Standard => {
                let framerate = self.framerate_mean.map(f64::trunc).unwrap_or(0.0);
                if framerate > 0.0 {
                    reporter.report_success(&format!("Frame rate mean: {}", framerate));
                    summary.camera_ok = true;
                } else {
                    reporter.report_error("Frame rate mean is 0, cannot test bandwidth without a working camera.");
                }
                reporter.report_info(&format!(
                    "Send bitrate mean: {} bps",
                    figure(self.bitrate_mean.map(f64::trunc))
                ));
                reporter.report_info(&format!(
                    "Send bitrate standard deviation: {} bps",
                    figure(self.bitrate_std_dev.map(f64::trunc))
                ));
            }
            // every poll already reported the unsupported format
            TelemetryFormat::Unrecognized(_) => {}
        }

        reporter.report_info(&format!("RTT average: {} ms", figure(self.rtt_stats.average())));
        reporter.report_info(&format!("RTT max: {} ms", figure(self.rtt_stats.max())));
        reporter.report_info(&format!(
            "Lost packets: {}",
            self.packets_lost.map(|p| p.to_string()).unwrap_or_else(|| "unavailable".to_string())
        ));

        summary
    }
}

/// Per-run polling context
struct PollingRun<'a> {
    session: &'a mut Box<dyn Session>,
    accumulator: BandwidthAccumulator,
    config: &'a BandwidthConfig,
    logger: &'a Logger,
    start_time: Instant,
}

#[async_trait]
impl<'a> ScheduledTask for PollingRun<'a> {
    async fn tick(&mut self, reporter: &mut dyn TestReporter) -> Tick {
        let elapsed = self.start_time.elapsed();
        if elapsed > self.config.duration() {
            reporter.set_progress(100.0);
            return Tick::Terminal;
        }
        reporter.set_progress(elapsed.as_secs_f64() * 100.0 / self.config.duration().as_secs_f64());

        let polled = match self.session.telemetry_snapshot().await {
            Ok(raw) => self.accumulator.format().extract(&raw),
            Err(err) => Err(err),
        };

        match polled {
            Ok(snapshot) => {
                self.logger.trace("Telemetry poll")
                    .field("bandwidth_samples", snapshot.bandwidth_samples.len())
                    .field("rtt_samples", snapshot.rtt_samples.len())
                    .log()
                    .await;
                self.accumulator.fold(snapshot);
            }
            Err(err) => {
                self.logger.debug(&format!("Telemetry poll failed: {}", err))
                    .error_info(&err)
                    .log()
                    .await;
                self.accumulator.record_failure();
                reporter.report_error(&format!("Failed to get stats: {}", err));
            }
        }

        // failed polls do not end the loop
        Tick::Reschedule(self.config.poll_interval())
    }
}

/// Polls telemetry of a relayed video call and reports ramp-up and RTT
pub struct BandwidthSampler {
    config: BandwidthConfig,
    logger: Logger,
}

impl BandwidthSampler {
    pub fn new(config: BandwidthConfig, logger: Logger) -> Self {
        Self { config, logger }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            candidate_filter: CandidateFilter::Relay,
            max_video_bitrate_kbps: Some(self.config.max_video_bitrate_kbps),
            disable_video_fec: true,
        }
    }

    fn media_constraints(&self) -> MediaConstraints {
        MediaConstraints {
            min_width: self.config.capture_min_width,
            min_height: self.config.capture_min_height,
        }
    }

    /// Run the polling loop and return the collected figures
    pub async fn measure(
        &self,
        factory: &dyn SessionFactory,
        reporter: &mut dyn TestReporter,
    ) -> Option<BandwidthSummary> {
        let mut session = match factory.create(self.session_config()).await {
            Ok(session) => session,
            Err(err) => {
                abort_setup(&self.logger, reporter, "create session", err, None).await;
                return None;
            }
        };

        let mut track = match session.acquire_media(self.media_constraints()).await {
            Ok(track) => track,
            Err(err) => {
                abort_setup(&self.logger, reporter, "acquire media", err, Some(&mut session)).await;
                return None;
            }
        };

        if let Err(err) = session.establish().await {
            track.stop();
            abort_setup(&self.logger, reporter, "establish connection", err, Some(&mut session)).await;
            return None;
        }

        let format = TelemetryFormat::detect(session.telemetry_dialect());
        if !format.is_supported() {
            self.logger.warn(&format!("Session reports an unsupported telemetry dialect: {}", format))
                .log()
                .await;
        } else {
            self.logger.debug(&format!("Using {} telemetry", format)).log().await;
        }

        let mut run = PollingRun {
            session: &mut session,
            accumulator: BandwidthAccumulator::new(format, self.config.ramp_up_threshold_bps()),
            config: &self.config,
            logger: &self.logger,
            start_time: Instant::now(),
        };
        run_scheduled(&mut run, reporter, self.config.poll_interval()).await;
        let accumulator = run.accumulator;

        track.stop();
        close_session(&self.logger, &mut session).await;

        let summary = accumulator.finalize(&self.config, reporter);
        self.logger.info("Bandwidth test finished")
            .field("polls", summary.polls)
            .field("failed_polls", summary.failed_polls)
            .field("camera_ok", summary.camera_ok)
            .field("bandwidth_avg_bps", summary.bandwidth_avg_bps)
            .field("ramp_up", summary.ramp_up)
            .log()
            .await;
        reporter.done();
        Some(summary)
    }
}

#[async_trait]
impl Measurement for BandwidthSampler {
    fn name(&self) -> &str {
        "video-bandwidth"
    }

    async fn run(
        &self,
        factory: &dyn SessionFactory,
        reporter: &mut dyn TestReporter,
    ) -> Option<MeasurementSummary> {
        self.measure(factory, reporter).await.map(MeasurementSummary::Bandwidth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::RecordingReporter;
    use crate::models::LinkConfig;
    use crate::stats::{RampUpTime, Sample};
    use crate::transport::LoopbackSessionFactory;

    fn short_config() -> BandwidthConfig {
        BandwidthConfig {
            duration_ms: 2_000,
            poll_interval_ms: 100,
            ..Default::default()
        }
    }

    fn legacy_snapshot(ts: f64, bwe: f64, rtt: f64, width: u32, height: u32) -> BandwidthSnapshot {
        BandwidthSnapshot {
            bandwidth_samples: vec![Sample::new(ts, bwe)],
            rtt_samples: vec![Sample::new(ts, rtt)],
            frame_width: Some(width),
            frame_height: Some(height),
            packets_lost: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn test_degenerate_resolution_is_camera_failure() {
        let config = BandwidthConfig::default();
        let mut accumulator = BandwidthAccumulator::new(TelemetryFormat::Legacy, config.ramp_up_threshold_bps());
        accumulator.fold(legacy_snapshot(0.0, 1_000_000.0, 40.0, 1, 1));

        let mut reporter = RecordingReporter::new();
        let summary = accumulator.finalize(&config, &mut reporter);

        assert_eq!(
            reporter.errors(),
            vec!["Camera failure: 1x1. Cannot test bandwidth without a working camera."]
        );
        assert!(!summary.camera_ok);
        assert!(summary.bandwidth_avg_bps.is_none());
        assert!(summary.ramp_up.is_none());
        assert!(!reporter.infos().iter().any(|m| m.starts_with("Send bandwidth")));
        assert!(reporter.infos().contains(&"RTT average: 40 ms"));
    }

    #[test]
    fn test_working_camera_reports_bandwidth_stats() {
        let config = BandwidthConfig::default();
        let mut accumulator = BandwidthAccumulator::new(TelemetryFormat::Legacy, config.ramp_up_threshold_bps());
        accumulator.fold(legacy_snapshot(1_000.0, 0.0, 30.0, 1280, 720));
        accumulator.fold(legacy_snapshot(1_100.0, 1_500_000.0, 50.0, 1280, 720));
        accumulator.fold(legacy_snapshot(1_200.0, 3_000_000.0, 40.0, 1280, 720));

        let mut reporter = RecordingReporter::new();
        let summary = accumulator.finalize(&config, &mut reporter);

        assert!(reporter.errors().is_empty());
        assert_eq!(reporter.successes(), vec!["Video resolution: 1280x720"]);
        assert_eq!(
            reporter.infos(),
            vec![
                "Send bandwidth estimate average: 1500000 bps",
                "Send bandwidth estimate max: 3000000 bps",
                "Send bandwidth ramp-up time: 100 ms",
                "RTT average: 40 ms",
                "RTT max: 50 ms",
                "Lost packets: 0",
            ]
        );
        assert_eq!(summary.resolution, Some(Resolution::new(1280, 720)));
        assert_eq!(summary.ramp_up, Some(RampUpTime::Reached(100.0)));
    }

    #[test]
    fn test_one_dimension_above_minimum_is_not_a_failure() {
        let config = BandwidthConfig::default();
        let mut accumulator = BandwidthAccumulator::new(TelemetryFormat::Legacy, config.ramp_up_threshold_bps());
        accumulator.fold(legacy_snapshot(0.0, 1.0, 1.0, 640, 1));

        let mut reporter = RecordingReporter::new();
        assert!(accumulator.finalize(&config, &mut reporter).camera_ok);
    }

    #[test]
    fn test_standard_dialect_gates_on_framerate() {
        let config = BandwidthConfig::default();
        let mut accumulator = BandwidthAccumulator::new(TelemetryFormat::Standard, config.ramp_up_threshold_bps());
        accumulator.fold(BandwidthSnapshot {
            rtt_samples: vec![Sample::new(0.0, 35.0)],
            bitrate_mean: Some(1_234_567.8),
            bitrate_std_dev: Some(1_000.4),
            framerate_mean: Some(0.4),
            ..Default::default()
        });

        let mut reporter = RecordingReporter::new();
        let summary = accumulator.finalize(&config, &mut reporter);

        assert_eq!(
            reporter.errors(),
            vec!["Frame rate mean is 0, cannot test bandwidth without a working camera."]
        );
        assert!(reporter.infos().contains(&"Send bitrate mean: 1234567 bps"));
        assert!(!summary.camera_ok);
        assert!(summary.bandwidth_avg_bps.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_legacy() {
        let link = LinkConfig {
            bwe_ramp_ms: 500,
            ..Default::default()
        };
        let sampler = BandwidthSampler::new(short_config(), Logger::quiet("BANDWIDTH"));
        let factory = LoopbackSessionFactory::new(link);
        let mut reporter = RecordingReporter::new();

        let summary = sampler.measure(&factory, &mut reporter).await.unwrap();

        assert_eq!(reporter.done_count(), 1);
        assert!(reporter.errors().is_empty(), "errors: {:?}", reporter.errors());
        assert!(summary.camera_ok);
        assert_eq!(summary.bandwidth_max_bps, Some(2_000_000.0));
        assert!(matches!(summary.ramp_up, Some(RampUpTime::Reached(ms)) if ms > 0.0 && ms < 1_000.0));
        assert_eq!(summary.rtt_avg_ms, Some(40.0));
        assert!(summary.polls >= 19);
        assert_eq!(reporter.last_progress(), Some(100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_camera_failure() {
        let link = LinkConfig {
            frame_width: 1,
            frame_height: 1,
            ..Default::default()
        };
        let sampler = BandwidthSampler::new(short_config(), Logger::quiet("BANDWIDTH"));
        let factory = LoopbackSessionFactory::new(link);
        let mut reporter = RecordingReporter::new();

        let summary = sampler.measure(&factory, &mut reporter).await.unwrap();

        assert_eq!(reporter.errors().len(), 1);
        assert!(reporter.errors()[0].starts_with("Camera failure: 1x1."));
        assert!(summary.bandwidth_avg_bps.is_none());
        assert!(summary.rtt_avg_ms.is_some());
        assert_eq!(reporter.done_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_dialect_errors_every_poll() {
        let link = LinkConfig {
            telemetry_dialect: "proprietary".to_string(),
            ..Default::default()
        };
        let sampler = BandwidthSampler::new(short_config(), Logger::quiet("BANDWIDTH"));
        let factory = LoopbackSessionFactory::new(link);
        let mut reporter = RecordingReporter::new();

        let summary = sampler.measure(&factory, &mut reporter).await.unwrap();

        assert_eq!(summary.failed_polls, summary.polls);
        assert!(summary.polls >= 19);
        assert_eq!(reporter.errors().len() as u32, summary.polls);
        assert!(reporter.errors().iter().all(|m| m.contains("Unsupported telemetry")));
        assert!(summary.rtt_avg_ms.is_none());
        assert_eq!(reporter.done_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_failure_is_fatal() {
        let sampler = BandwidthSampler::new(short_config(), Logger::quiet("BANDWIDTH"));
        let factory = LoopbackSessionFactory::new(LinkConfig::default()).with_failing_media();
        let mut reporter = RecordingReporter::new();

        assert!(sampler.measure(&factory, &mut reporter).await.is_none());
        assert_eq!(reporter.fatals().len(), 1);
        assert!(reporter.fatals()[0].starts_with("Failed to acquire media"));
        assert_eq!(reporter.done_count(), 1);
    }

    #[test]
    fn test_session_config_constrains_video() {
        let sampler = BandwidthSampler::new(BandwidthConfig::default(), Logger::quiet("BANDWIDTH"));
        let config = sampler.session_config();
        assert_eq!(config.candidate_filter, CandidateFilter::Relay);
        assert_eq!(config.max_video_bitrate_kbps, Some(2_000));
        assert!(config.disable_video_fec);
    }
}
