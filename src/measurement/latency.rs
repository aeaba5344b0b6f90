//! Periodic one-way delay probe
//!
//! Sends a timestamp over an unordered, zero-retransmit channel every
//! `send_interval` for the whole test duration. Each received probe yields a
//! delay sample of receive time minus embedded send time. Both peers share a
//! clock, so the delay is one-way.

use super::{abort_setup, close_session, figure, Measurement};
use crate::harness::{FixedDelaySchedule, TestReporter, Tick};
use crate::logging::Logger;
use crate::models::{LatencyConfig, LatencySummary, MeasurementSummary};
use crate::stats::DelayStatistics;
use crate::transport::{ChannelEvent, ChannelOptions, SessionConfig, SessionFactory};
use crate::types::CandidateFilter;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

/// Probes claiming a send time further than this from now are malformed
const MAX_PLAUSIBLE_DELAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Wall-clock milliseconds advanced by the runtime's monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    epoch_ms: i64,
    anchor: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            epoch_ms: Utc::now().timestamp_millis(),
            anchor: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.epoch_ms + self.anchor.elapsed().as_millis() as i64
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

/// One received probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DelaySample {
    pub send_timestamp_ms: i64,
    pub delay_ms: f64,
}

/// Judge a finished run: report the delay figures, the sample-count check and
/// the stability check. Both checks can fail together.
pub fn evaluate_delays(
    config: &LatencyConfig,
    delays: &[f64],
    reporter: &mut dyn TestReporter,
) -> LatencySummary {
    let stats = DelayStatistics::from_delays(delays);

    reporter.report_info(&format!("Average delay: {} ms.", figure(stats.map(|s| s.avg_ms))));
    reporter.report_info(&format!("Min delay: {} ms.", figure(stats.map(|s| s.min_ms))));
    reporter.report_info(&format!("Max delay: {} ms.", figure(stats.map(|s| s.max_ms))));

    let enough_samples = !delays.is_empty() && delays.len() as f64 >= config.required_samples();
    if enough_samples {
        reporter.report_success(&format!("Collected {} delay samples.", delays.len()));
    } else {
        reporter.report_error(
            "Not enough samples gathered. Keep the process in the foreground while the test is running.",
        );
    }

    let stable = stats.map(|s| s.is_stable(config.jitter_margin_ms, config.jitter_factor));
    if stable == Some(false) {
        reporter.report_error(
            "There is a big difference between the min and max delay of packets. Your network appears unstable.",
        );
    }

    LatencySummary {
        sample_count: delays.len(),
        expected_samples: config.expected_samples(),
        delay: stats,
        enough_samples,
        stable,
    }
}

/// Per-run probe state
struct ProbeRun {
    running: bool,
    clock: WallClock,
    samples: Vec<DelaySample>,
    probes_sent: u64,
    malformed: u64,
}

impl ProbeRun {
    fn new(clock: WallClock) -> Self {
        Self {
            running: true,
            clock,
            samples: Vec::new(),
            probes_sent: 0,
            malformed: 0,
        }
    }

    fn probe_payload(&self) -> Vec<u8> {
        self.clock.now_ms().to_string().into_bytes()
    }

    /// Turn a received payload into a sample; `None` when stopped or malformed
    fn receive(&mut self, payload: &[u8]) -> Option<DelaySample> {
        if !self.running {
            return None;
        }
        let sent = std::str::from_utf8(payload)
            .ok()
            .and_then(|text| text.trim().parse::<i64>().ok());
        let delay_ms = sent
            .filter(|sent| *sent >= 0)
            .and_then(|sent| self.clock.now_ms().checked_sub(sent).map(|delay| (sent, delay)))
            .filter(|(_, delay)| delay.abs() <= MAX_PLAUSIBLE_DELAY_MS);
        let Some((send_timestamp_ms, delay_ms)) = delay_ms else {
            self.malformed += 1;
            return None;
        };

        let sample = DelaySample {
            send_timestamp_ms,
            delay_ms: delay_ms as f64,
        };
        self.samples.push(sample);
        Some(sample)
    }

    fn delays(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.delay_ms).collect()
    }

    fn send_timestamps(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.send_timestamp_ms).collect()
    }
}

/// Probes one-way delay and its stability over a chosen candidate type
pub struct LatencyProbe {
    config: LatencyConfig,
    candidate_filter: CandidateFilter,
    logger: Logger,
}

impl LatencyProbe {
    pub fn new(config: LatencyConfig, candidate_filter: CandidateFilter, logger: Logger) -> Self {
        Self {
            config,
            candidate_filter,
            logger,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::with_candidate_filter(self.candidate_filter)
    }

    /// Probe for the configured duration and judge the result
    pub async fn measure(
        &self,
        factory: &dyn SessionFactory,
        reporter: &mut dyn TestReporter,
    ) -> Option<LatencySummary> {
        let mut session = match factory.create(self.session_config()).await {
            Ok(session) => session,
            Err(err) => {
                abort_setup(&self.logger, reporter, "create session", err, None).await;
                return None;
            }
        };

        let mut link = match session.open_data_channel(ChannelOptions::best_effort()).await {
            Ok(link) => link,
            Err(err) => {
                abort_setup(&self.logger, reporter, "open data channel", err, Some(&mut session)).await;
                return None;
            }
        };

        // the finish deadline counts from connection start
        let start = Instant::now();
        let finish_at = start + self.config.duration();

        if let Err(err) = session.establish().await {
            abort_setup(&self.logger, reporter, "establish connection", err, Some(&mut session)).await;
            return None;
        }

        let mut run = ProbeRun::new(WallClock::new());
        let mut send_schedule = FixedDelaySchedule::idle();
        let mut progress = interval(self.config.progress_interval());
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        loop {
            tokio::select! {
                _ = sleep_until(finish_at) => break,
                _ = progress.tick() => {
                    let elapsed = start.elapsed().as_secs_f64();
                    let percent = (elapsed * 100.0 / self.config.duration().as_secs_f64()).min(100.0);
                    reporter.set_progress(percent);
                }
                _ = send_schedule.wait() => {
                    if !run.running {
                        send_schedule.apply(Tick::Terminal);
                        continue;
                    }
                    let payload = run.probe_payload();
                    match link.sender.send(&payload) {
                        Ok(()) => run.probes_sent += 1,
                        Err(err) => {
                            self.logger.debug(&format!("Probe not sent: {}", err))
                                .error_info(&err)
                                .log()
                                .await;
                        }
                    }
                    send_schedule.apply(Tick::Reschedule(self.config.send_interval()));
                }
                event = link.events.recv(), if events_open => match event {
                    Some(ChannelEvent::SenderOpen) => {
                        if !send_schedule.is_active() {
                            send_schedule = FixedDelaySchedule::start_after(Duration::ZERO);
                        }
                    }
                    Some(ChannelEvent::PeerChannel) => {
                        self.logger.debug("Receiving channel opened").log().await;
                    }
                    Some(ChannelEvent::Message(message)) => {
                        match run.receive(&message.data) {
                            Some(sample) => {
                                if let Some(chart) = reporter.chart() {
                                    chart.add_datapoint(
                                        sample.send_timestamp_ms as f64 + sample.delay_ms,
                                        sample.delay_ms,
                                    );
                                }
                            }
                            None if run.running => {
                                self.logger.debug("Ignoring malformed probe")
                                    .field("bytes", message.byte_len())
                                    .log()
                                    .await;
                            }
                            None => {}
                        }
                    }
                    Some(ChannelEvent::Closed) | None => {
                        self.logger.warn("Probe channel closed before the test finished").log().await;
                        events_open = false;
                    }
                },
            }
        }

        self.logger.debug("periodic-delay")
            .field("delays", run.delays())
            .field("recvTimeStamps", run.send_timestamps())
            .log()
            .await;
        run.running = false;
        close_session(&self.logger, &mut session).await;

        reporter.set_progress(100.0);
        let summary = evaluate_delays(&self.config, &run.delays(), reporter);

        let mut entry = self.logger.info("Latency test finished")
            .field("probes_sent", run.probes_sent)
            .field("samples", summary.sample_count)
            .field("malformed", run.malformed)
            .field("candidate_filter", self.candidate_filter.name());
        if let Some(stats) = &summary.delay {
            entry = entry.delays(stats);
        }
        entry.log().await;

        reporter.done();
        Some(summary)
    }
}

#[async_trait]
impl Measurement for LatencyProbe {
    fn name(&self) -> &str {
        match self.candidate_filter {
            CandidateFilter::Relay => "network-latency-relay",
            _ => "network-latency",
        }
    }

    async fn run(
        &self,
        factory: &dyn SessionFactory,
        reporter: &mut dyn TestReporter,
    ) -> Option<MeasurementSummary> {
        self.measure(factory, reporter).await.map(MeasurementSummary::Latency)
    }
}
