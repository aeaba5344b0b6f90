//! Data channel saturation test
//!
//! Keeps a reliable relay data channel's send buffer topped up for a fixed
//! duration, then waits until every accepted byte has arrived on the peer.
//! The receive side reports the bitrate roughly once per second.

use super::{abort_setup, close_session, Measurement};
use crate::error::AppError;
use crate::harness::{FixedDelaySchedule, TestReporter, Tick};
use crate::logging::Logger;
use crate::models::{MeasurementSummary, ThroughputConfig, ThroughputSummary};
use crate::transport::{ChannelEvent, ChannelOptions, DataChannel, SessionConfig, SessionFactory};
use crate::types::CandidateFilter;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

const PAYLOAD_BYTE: u8 = b'h';

/// Result of one send tick
#[derive(Debug)]
pub struct SendStep {
    /// Payloads accepted by the channel during this tick
    pub packets_sent: usize,
    pub progress: f64,
    pub tick: Tick,
    /// Set when the channel rejected a payload
    pub send_error: Option<AppError>,
}

/// Result of one received message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceiveStep {
    /// Bitrate over the last measurement window, when one just closed
    pub bitrate_kbps: Option<f64>,
    /// Sending stopped and every accepted byte has arrived
    pub drained: bool,
}

/// Per-run counters of a saturation test
#[derive(Debug)]
pub struct ThroughputState {
    payload: Vec<u8>,
    max_packets_per_tick: usize,
    bytes_to_keep_buffered: usize,
    duration: Duration,
    tick_interval: Duration,
    bitrate_report_interval: Duration,
    sent_payload_bytes: u64,
    received_payload_bytes: u64,
    start_time: Option<Instant>,
    stop_sending: bool,
    last_bitrate_measure_time: Option<Instant>,
    last_received_payload_bytes: u64,
    bitrate_samples_kbps: Vec<f64>,
}

impl ThroughputState {
    pub fn new(config: &ThroughputConfig) -> Self {
        Self {
            payload: vec![PAYLOAD_BYTE; config.payload_bytes],
            max_packets_per_tick: config.max_packets_per_tick,
            bytes_to_keep_buffered: config.bytes_to_keep_buffered(),
            duration: config.duration(),
            tick_interval: config.tick_interval(),
            bitrate_report_interval: config.bitrate_report_interval(),
            sent_payload_bytes: 0,
            received_payload_bytes: 0,
            start_time: None,
            stop_sending: false,
            last_bitrate_measure_time: None,
            last_received_payload_bytes: 0,
            bitrate_samples_kbps: Vec::new(),
        }
    }

    pub fn sent_payload_bytes(&self) -> u64 {
        self.sent_payload_bytes
    }

    pub fn received_payload_bytes(&self) -> u64 {
        self.received_payload_bytes
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_sending
    }

    /// Sending has stopped and nothing is left in flight
    pub fn is_drained(&self) -> bool {
        self.stop_sending && self.sent_payload_bytes == self.received_payload_bytes
    }

    /// Top up the send buffer and decide whether to keep going
    pub fn sending_step(&mut self, channel: &dyn DataChannel, now: Instant) -> SendStep {
        let start = *self.start_time.get_or_insert(now);
        if self.last_bitrate_measure_time.is_none() {
            self.last_bitrate_measure_time = Some(now);
        }

        let mut packets_sent = 0;
        let mut send_error = None;
        for _ in 0..self.max_packets_per_tick {
            if channel.buffered_amount() >= self.bytes_to_keep_buffered {
                break;
            }
            match channel.send(&self.payload) {
                Ok(()) => {
                    self.sent_payload_bytes += self.payload.len() as u64;
                    packets_sent += 1;
                }
                Err(err) => {
                    send_error = Some(err);
                    break;
                }
            }
        }

        let elapsed = now.saturating_duration_since(start);
        if send_error.is_some() || elapsed >= self.duration {
            self.stop_sending = true;
            SendStep {
                packets_sent,
                progress: 100.0,
                tick: Tick::Terminal,
                send_error,
            }
        } else {
            SendStep {
                packets_sent,
                progress: elapsed.as_secs_f64() * 100.0 / self.duration.as_secs_f64(),
                tick: Tick::Reschedule(self.tick_interval),
                send_error: None,
            }
        }
    }

    /// Account for one received message
    pub fn on_message(&mut self, bytes: usize, now: Instant) -> ReceiveStep {
        self.received_payload_bytes += bytes as u64;

        let mut bitrate_kbps = None;
        if let Some(last) = self.last_bitrate_measure_time {
            let window = now.saturating_duration_since(last);
            if window >= self.bitrate_report_interval {
                let window_ms = window.as_secs_f64() * 1000.0;
                let delta = (self.received_payload_bytes - self.last_received_payload_bytes) as f64;
                let kbps = (delta / window_ms * 1000.0 * 8.0).round() / 1000.0;
                self.bitrate_samples_kbps.push(kbps);
                self.last_received_payload_bytes = self.received_payload_bytes;
                self.last_bitrate_measure_time = Some(now);
                bitrate_kbps = Some(kbps);
            }
        }

        ReceiveStep {
            bitrate_kbps,
            drained: self.is_drained(),
        }
    }

    /// Totals as of `now`
    pub fn summary(&self, now: Instant) -> ThroughputSummary {
        let elapsed_ms = self
            .start_time
            .map(|start| now.saturating_duration_since(start).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);

        ThroughputSummary {
            sent_bytes: self.sent_payload_bytes,
            received_bytes: self.received_payload_bytes,
            total_kilobits: self.received_payload_bytes as f64 * 8.0 / 1000.0,
            // tenths of a millisecond, expressed in seconds
            elapsed_seconds: (elapsed_ms * 10.0).round() / 10_000.0,
            bitrate_samples_kbps: self.bitrate_samples_kbps.clone(),
        }
    }
}

/// Saturates a relay data channel and measures the sustained bitrate
pub struct ThroughputPacer {
    config: ThroughputConfig,
    logger: Logger,
}

impl ThroughputPacer {
    pub fn new(config: ThroughputConfig, logger: Logger) -> Self {
        Self { config, logger }
    }

    pub fn session_config() -> SessionConfig {
        SessionConfig::with_candidate_filter(CandidateFilter::Relay)
    }

    /// Run the saturation test and return its totals
    pub async fn measure(
        &self,
        factory: &dyn SessionFactory,
        reporter: &mut dyn TestReporter,
    ) -> Option<ThroughputSummary> {
        let mut session = match factory.create(Self::session_config()).await {
            Ok(session) => session,
            Err(err) => {
                abort_setup(&self.logger, reporter, "create session", err, None).await;
                return None;
            }
        };

        let mut link = match session.open_data_channel(ChannelOptions::reliable()).await {
            Ok(link) => link,
            Err(err) => {
                abort_setup(&self.logger, reporter, "open data channel", err, Some(&mut session)).await;
                return None;
            }
        };

        if let Err(err) = session.establish().await {
            abort_setup(&self.logger, reporter, "establish connection", err, Some(&mut session)).await;
            return None;
        }

        let mut state = ThroughputState::new(&self.config);
        let mut schedule = FixedDelaySchedule::idle();
        let mut drain_deadline: Option<Instant> = None;

        let failure = loop {
            let deadline = drain_deadline;
            let drain_wait = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = schedule.wait() => {
                    let now = Instant::now();
                    let step = state.sending_step(link.sender.as_ref(), now);
                    reporter.set_progress(step.progress);
                    self.logger.trace("Send tick")
                        .field("packets_sent", step.packets_sent)
                        .field("buffered_amount", link.sender.buffered_amount())
                        .log()
                        .await;

                    if let Some(err) = &step.send_error {
                        self.logger.warn(&format!("Send rejected, stopping early: {}", err))
                            .error_info(err)
                            .log()
                            .await;
                        reporter.report_error(&format!("Failed to send data: {}", err));
                    }

                    schedule.apply(step.tick);
                    if step.tick == Tick::Terminal {
                        drain_deadline = Some(now + self.config.drain_timeout());
                        self.logger.debug("Sending stopped, waiting for in-flight data")
                            .field("sent_bytes", state.sent_payload_bytes())
                            .field("received_bytes", state.received_payload_bytes())
                            .log()
                            .await;
                        if state.is_drained() {
                            break None;
                        }
                    }
                }
                event = link.events.recv() => match event {
                    Some(ChannelEvent::SenderOpen) => {
                        if !schedule.is_active() && !state.is_stopped() {
                            schedule = FixedDelaySchedule::start_after(Duration::ZERO);
                        }
                    }
                    Some(ChannelEvent::PeerChannel) => {
                        self.logger.debug("Receiving channel opened").log().await;
                    }
                    Some(ChannelEvent::Message(message)) => {
                        let step = state.on_message(message.byte_len(), Instant::now());
                        if let Some(kbps) = step.bitrate_kbps {
                            reporter.report_success(&format!("Transmitting at {} kbps.", kbps));
                        }
                        if step.drained {
                            break None;
                        }
                    }
                    Some(ChannelEvent::Closed) | None => {
                        break Some("Data channel closed before all data was received".to_string());
                    }
                },
                _ = drain_wait => {
                    break Some(format!(
                        "Timed out waiting for in-flight data: {} of {} bytes received",
                        state.received_payload_bytes(),
                        state.sent_payload_bytes()
                    ));
                }
            }
        };

        let now = Instant::now();
        close_session(&self.logger, &mut session).await;
        let summary = state.summary(now);

        match failure {
            None => {
                reporter.report_success(&format!(
                    "Total transmitted: {} kilo-bits in {} seconds.",
                    summary.total_kilobits, summary.elapsed_seconds
                ));
            }
            Some(message) => {
                self.logger.warn(&message).throughput(&summary).log().await;
                reporter.report_error(&message);
            }
        }

        self.logger.info("Throughput test finished").throughput(&summary).log().await;
        reporter.done();
        Some(summary)
    }
}

#[async_trait]
impl Measurement for ThroughputPacer {
    fn name(&self) -> &str {
        "data-throughput"
    }

    async fn run(
        &self,
        factory: &dyn SessionFactory,
        reporter: &mut dyn TestReporter,
    ) -> Option<MeasurementSummary> {
        self.measure(factory, reporter).await.map(MeasurementSummary::Throughput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::harness::RecordingReporter;
    use crate::models::LinkConfig;
    use crate::transport::{
        DataChannelLink, LoopbackSessionFactory, MediaConstraints, MediaTrack, Session,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Channel whose buffer only drains when the test says so
    #[derive(Default)]
    struct ManualChannel {
        buffered: AtomicUsize,
        sends: AtomicUsize,
    }

    impl ManualChannel {
        fn drain(&self) {
            self.buffered.store(0, Ordering::SeqCst);
        }
    }

    impl DataChannel for ManualChannel {
        fn send(&self, payload: &[u8]) -> Result<()> {
            self.buffered.fetch_add(payload.len(), Ordering::SeqCst);
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn buffered_amount(&self) -> usize {
            self.buffered.load(Ordering::SeqCst)
        }
    }

    struct RejectingChannel;

    impl DataChannel for RejectingChannel {
        fn send(&self, _payload: &[u8]) -> Result<()> {
            Err(AppError::transport("send buffer full"))
        }

        fn buffered_amount(&self) -> usize {
            0
        }
    }

    /// Session whose channel accepts payloads but never delivers them.
    /// With `close_after` set, the channel is torn down after that delay.
    struct SilentSession {
        close_after: Option<Duration>,
        closed: Arc<AtomicBool>,
        events: Option<mpsc::UnboundedSender<ChannelEvent>>,
    }

    #[async_trait]
    impl Session for SilentSession {
        async fn open_data_channel(&mut self, _options: ChannelOptions) -> Result<DataChannelLink> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.events = Some(tx);
            Ok(DataChannelLink {
                sender: Box::new(ManualChannel::default()),
                events: rx,
            })
        }

        async fn acquire_media(&mut self, _constraints: MediaConstraints) -> Result<Box<dyn MediaTrack>> {
            Err(AppError::setup("no camera"))
        }

        async fn establish(&mut self) -> Result<()> {
            if let Some(events) = &self.events {
                let _ = events.send(ChannelEvent::SenderOpen);
                if let Some(delay) = self.close_after {
                    let events = events.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = events.send(ChannelEvent::Closed);
                    });
                }
            }
            Ok(())
        }

        fn telemetry_dialect(&self) -> &str {
            "legacy"
        }

        async fn telemetry_snapshot(&mut self) -> Result<serde_json::Value> {
            Err(AppError::transport("no telemetry"))
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SilentFactory {
        close_after: Option<Duration>,
        closed: Arc<AtomicBool>,
    }

    impl SilentFactory {
        fn new(close_after: Option<Duration>) -> Self {
            Self {
                close_after,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl SessionFactory for SilentFactory {
        async fn create(&self, _config: SessionConfig) -> Result<Box<dyn Session>> {
            Ok(Box::new(SilentSession {
                close_after: self.close_after,
                closed: self.closed.clone(),
                events: None,
            }))
        }
    }

    fn config() -> ThroughputConfig {
        ThroughputConfig::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_packet_per_tick_with_empty_buffer() {
        let mut state = ThroughputState::new(&config());
        let channel = ManualChannel::default();
        let start = Instant::now();

        let step = state.sending_step(&channel, start);
        assert_eq!(step.packets_sent, 1);
        assert_eq!(state.sent_payload_bytes(), 1024);
        assert_eq!(step.tick, Tick::Reschedule(Duration::from_millis(1)));

        // buffer still at the ceiling, nothing more goes out
        let step = state.sending_step(&channel, start + Duration::from_millis(1));
        assert_eq!(step.packets_sent, 0);

        channel.drain();
        let step = state.sending_step(&channel, start + Duration::from_millis(2));
        assert_eq!(step.packets_sent, 1);
        assert_eq!(channel.sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_blocks_second_send_in_same_tick() {
        let config = ThroughputConfig {
            max_packets_per_tick: 4,
            ..config()
        };
        let mut state = ThroughputState {
            bytes_to_keep_buffered: 1024,
            ..ThroughputState::new(&config)
        };
        let channel = ManualChannel::default();

        let step = state.sending_step(&channel, Instant::now());
        assert_eq!(step.packets_sent, 1);
        assert_eq!(channel.buffered_amount(), 1024);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_duration() {
        let mut state = ThroughputState::new(&config());
        let channel = ManualChannel::default();
        let start = Instant::now();

        let step = state.sending_step(&channel, start);
        assert_eq!(step.progress, 0.0);

        channel.drain();
        let step = state.sending_step(&channel, start + Duration::from_millis(2_500));
        assert_eq!(step.progress, 50.0);
        assert!(!state.is_stopped());

        let step = state.sending_step(&channel, start + Duration::from_millis(5_000));
        assert_eq!(step.tick, Tick::Terminal);
        assert_eq!(step.progress, 100.0);
        assert!(state.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_is_not_counted_and_latches_stop() {
        let mut state = ThroughputState::new(&config());
        let step = state.sending_step(&RejectingChannel, Instant::now());

        assert!(step.send_error.is_some());
        assert_eq!(step.tick, Tick::Terminal);
        assert_eq!(state.sent_payload_bytes(), 0);
        assert!(state.is_drained());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_completes_exactly_once() {
        let mut state = ThroughputState::new(&config());
        let channel = ManualChannel::default();
        let start = Instant::now();

        for i in 0..10 {
            channel.drain();
            state.sending_step(&channel, start + Duration::from_millis(i));
        }
        let step = state.sending_step(&channel, start + Duration::from_millis(6_000));
        assert_eq!(step.tick, Tick::Terminal);
        assert_eq!(state.sent_payload_bytes(), 10_240);

        let mut drained = 0;
        for i in 0..10 {
            let step = state.on_message(1024, start + Duration::from_millis(6_000 + i));
            if step.drained {
                drained += 1;
                assert_eq!(i, 9);
            }
        }
        assert_eq!(drained, 1);
        assert_eq!(state.received_payload_bytes(), 10_240);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bitrate_reported_once_per_window() {
        let mut state = ThroughputState::new(&config());
        let channel = ManualChannel::default();
        let start = Instant::now();
        state.sending_step(&channel, start);

        assert_eq!(state.on_message(1024, start + Duration::from_millis(500)).bitrate_kbps, None);
        let step = state.on_message(1024, start + Duration::from_millis(1_000));
        // 2048 bytes over 1000 ms
        assert_eq!(step.bitrate_kbps, Some(16.384));
        assert_eq!(state.on_message(1024, start + Duration::from_millis(1_100)).bitrate_kbps, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_rounding() {
        let mut state = ThroughputState::new(&config());
        let channel = ManualChannel::default();
        let start = Instant::now();
        state.sending_step(&channel, start);
        state.on_message(1024, start);

        let summary = state.summary(start + Duration::from_micros(1_234_567));
        assert_eq!(summary.total_kilobits, 8.192);
        assert_eq!(summary.elapsed_seconds, 1.2346);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_over_loopback() {
        let config = ThroughputConfig {
            duration_ms: 2_000,
            ..config()
        };
        let pacer = ThroughputPacer::new(config, Logger::quiet("THROUGHPUT"));
        let factory = LoopbackSessionFactory::new(LinkConfig::default());
        let mut reporter = RecordingReporter::new();

        let summary = pacer.measure(&factory, &mut reporter).await.unwrap();

        assert_eq!(reporter.done_count(), 1);
        assert!(reporter.errors().is_empty(), "errors: {:?}", reporter.errors());
        assert_eq!(summary.sent_bytes, summary.received_bytes);
        assert!(summary.sent_bytes > 0);
        assert!(summary.elapsed_seconds >= 2.0);
        assert!(!summary.bitrate_samples_kbps.is_empty());

        let successes = reporter.successes();
        assert!(successes.iter().any(|m| m.starts_with("Transmitting at ")));
        assert!(successes.last().unwrap().starts_with("Total transmitted: "));
        assert_eq!(reporter.last_progress(), Some(100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undelivered_data_times_out() {
        let config = ThroughputConfig {
            duration_ms: 1_000,
            drain_timeout_ms: 3_000,
            ..config()
        };
        let pacer = ThroughputPacer::new(config, Logger::quiet("THROUGHPUT"));
        let factory = SilentFactory::new(None);
        let mut reporter = RecordingReporter::new();
        let start = Instant::now();

        let summary = pacer.measure(&factory, &mut reporter).await.unwrap();

        assert_eq!(
            reporter.errors(),
            vec!["Timed out waiting for in-flight data: 0 of 1024 bytes received"]
        );
        assert_eq!(reporter.done_count(), 1);
        assert!(factory.closed.load(Ordering::SeqCst));
        assert!(summary.sent_bytes > summary.received_bytes);
        assert!(start.elapsed() >= Duration::from_millis(4_000));
        assert!(!reporter.successes().iter().any(|m| m.starts_with("Total transmitted")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_closed_before_drain() {
        let pacer = ThroughputPacer::new(config(), Logger::quiet("THROUGHPUT"));
        let factory = SilentFactory::new(Some(Duration::from_millis(500)));
        let mut reporter = RecordingReporter::new();
        let start = Instant::now();

        let summary = pacer.measure(&factory, &mut reporter).await.unwrap();

        assert_eq!(reporter.errors(), vec!["Data channel closed before all data was received"]);
        assert_eq!(reporter.done_count(), 1);
        assert!(factory.closed.load(Ordering::SeqCst));
        assert!(summary.sent_bytes > summary.received_bytes);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(reporter.last_progress().map_or(false, |p| p < 100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failure_is_fatal() {
        let pacer = ThroughputPacer::new(config(), Logger::quiet("THROUGHPUT"));
        let factory = LoopbackSessionFactory::new(LinkConfig::default()).with_failing_setup();
        let mut reporter = RecordingReporter::new();

        assert!(pacer.measure(&factory, &mut reporter).await.is_none());
        assert_eq!(reporter.fatals().len(), 1);
        assert_eq!(reporter.done_count(), 1);
        assert!(reporter.last_progress().is_none());
    }
}
