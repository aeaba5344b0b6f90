//! In-process loopback transport
//!
//! Both peers live in the same process. Payloads sent on a channel are
//! serialized onto a simulated link at `bandwidth_kbps`, then delivered to the
//! peer after `latency_ms`. The bytes waiting for serialization are the
//! channel's buffered amount. Telemetry is synthesized in the configured
//! dialect so the bandwidth sampler has something real to fold.

use super::{
    ChannelEvent, ChannelOptions, DataChannel, DataChannelLink, MediaConstraints, MediaTrack,
    Message, Session, SessionConfig, SessionFactory,
};
use super::telemetry::{LEGACY_DIALECT, STANDARD_DIALECT};
use crate::error::{AppError, Result};
use crate::models::LinkConfig;
use async_trait::async_trait;
use chrono::{SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Creates [`LoopbackSession`]s over a simulated link
#[derive(Debug, Clone)]
pub struct LoopbackSessionFactory {
    link: LinkConfig,
    fail_setup: bool,
    fail_media: bool,
}

impl LoopbackSessionFactory {
    pub fn new(link: LinkConfig) -> Self {
        Self {
            link,
            fail_setup: false,
            fail_media: false,
        }
    }

    /// Make every `create` call fail, as an unreachable relay service would
    pub fn with_failing_setup(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    /// Make camera acquisition fail on every session
    pub fn with_failing_media(mut self) -> Self {
        self.fail_media = true;
        self
    }

    pub fn link(&self) -> &LinkConfig {
        &self.link
    }
}

#[async_trait]
impl SessionFactory for LoopbackSessionFactory {
    async fn create(&self, config: SessionConfig) -> Result<Box<dyn Session>> {
        if self.fail_setup {
            return Err(AppError::setup("relay configuration unavailable"));
        }
        let mut session = LoopbackSession::new(self.link.clone(), config);
        session.fail_media = self.fail_media;
        Ok(Box::new(session))
    }
}

/// State shared between a channel's sending end and its link tasks
#[derive(Debug, Default)]
struct ChannelShared {
    buffered: AtomicUsize,
    open: AtomicBool,
}

struct ChannelHandle {
    shared: Arc<ChannelShared>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

/// Sending end of a loopback channel
struct LoopbackChannel {
    shared: Arc<ChannelShared>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    max_buffered_bytes: usize,
}

impl DataChannel for LoopbackChannel {
    fn send(&self, payload: &[u8]) -> Result<()> {
        if !self.shared.open.load(Ordering::Acquire) {
            return Err(AppError::transport("data channel is not open"));
        }

        let buffered = self.shared.buffered.load(Ordering::Acquire);
        if buffered + payload.len() > self.max_buffered_bytes {
            return Err(AppError::transport(format!(
                "send buffer full: {} bytes buffered, limit {}",
                buffered, self.max_buffered_bytes
            )));
        }

        self.shared.buffered.fetch_add(payload.len(), Ordering::AcqRel);
        self.outbound.send(payload.to_vec()).map_err(|_| {
            self.shared.buffered.fetch_sub(payload.len(), Ordering::AcqRel);
            AppError::transport("data channel link is closed")
        })
    }

    fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
    }
}

/// Camera stand-in producing frames at a fixed resolution
#[derive(Debug)]
pub struct SyntheticTrack {
    width: u32,
    height: u32,
    stopped: Arc<AtomicBool>,
}

impl SyntheticTrack {
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl MediaTrack for SyntheticTrack {
    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Loopback peer connection
pub struct LoopbackSession {
    link: LinkConfig,
    config: SessionConfig,
    fail_media: bool,
    channels: Vec<ChannelHandle>,
    tasks: Vec<JoinHandle<()>>,
    media: Option<(u32, u32, Arc<AtomicBool>)>,
    established_at: Option<Instant>,
    epoch_base_ms: i64,
    closed: bool,
}

impl LoopbackSession {
    pub fn new(link: LinkConfig, config: SessionConfig) -> Self {
        Self {
            link,
            config,
            fail_media: false,
            channels: Vec::new(),
            tasks: Vec::new(),
            media: None,
            established_at: None,
            epoch_base_ms: Utc::now().timestamp_millis(),
            closed: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bitrate ceiling the simulated encoder may use
    fn bitrate_cap_bps(&self) -> f64 {
        let link_bps = self.link.bandwidth_kbps as f64 * 1000.0;
        match self.config.max_video_bitrate_kbps {
            Some(kbps) => link_bps.min(kbps as f64 * 1000.0),
            None => link_bps,
        }
    }

    fn media_active(&self) -> bool {
        self.media
            .as_ref()
            .map(|(_, _, stopped)| !stopped.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Bandwidth estimate ramping linearly from zero to the cap
    fn bandwidth_estimate(&self, elapsed_ms: f64) -> f64 {
        let cap = self.bitrate_cap_bps();
        if self.link.bwe_ramp_ms == 0 {
            return cap;
        }
        (cap * elapsed_ms / self.link.bwe_ramp_ms as f64).min(cap)
    }

    fn legacy_snapshot(&self, timestamp_ms: i64, bwe_bps: f64, rtt_ms: u64) -> Value {
        let timestamp = Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let (width, height) = match (&self.media, self.media_active()) {
            (Some((w, h, _)), true) => (*w, *h),
            _ => (0, 0),
        };

        json!([
            {
                "id": "bweforvideo",
                "type": "VideoBwe",
                "timestamp": timestamp,
                "stats": {
                    "googAvailableSendBandwidth": format!("{}", bwe_bps.round() as u64),
                    "googTargetEncBitrate": format!("{}", bwe_bps.round() as u64),
                }
            },
            {
                "id": "ssrc_1001_send",
                "type": "ssrc",
                "timestamp": timestamp,
                "stats": {
                    "mediaType": "video",
                    "googRtt": rtt_ms.to_string(),
                    "googFrameWidthSent": width.to_string(),
                    "googFrameHeightSent": height.to_string(),
                    "packetsLost": "0",
                }
            }
        ])
    }

    fn standard_snapshot(&self, timestamp_ms: i64, bwe_bps: f64, rtt_ms: u64) -> Value {
        let framerate = if self.media_active() { 30.0 } else { 0.0 };
        json!({
            "outbound_rtcp_video_0": {
                "id": "outbound_rtcp_video_0",
                "type": "remote-inbound-rtp",
                "timestamp": timestamp_ms as f64,
                "mozRtt": rtt_ms,
                "jitter": 0.0,
                "packetsLost": 0
            },
            "outbound_rtp_video_0": {
                "id": "outbound_rtp_video_0",
                "type": "outbound-rtp",
                "timestamp": timestamp_ms as f64,
                "bitrateMean": bwe_bps,
                "bitrateStdDev": bwe_bps * 0.05,
                "framerateMean": framerate
            }
        })
    }

    fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        for channel in self.channels.drain(..) {
            channel.shared.open.store(false, Ordering::Release);
            let _ = channel.events.send(ChannelEvent::Closed);
        }
        if let Some((_, _, stopped)) = &self.media {
            stopped.store(true, Ordering::Release);
        }
        self.closed = true;
    }
}

/// Serialize payloads onto the link, then hand them to the delivery stage
async fn pump_link(
    link: LinkConfig,
    options: ChannelOptions,
    shared: Arc<ChannelShared>,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    delivery: mpsc::UnboundedSender<(Instant, Vec<u8>)>,
) {
    let mut link_free_at = Instant::now();
    let mut sequence: u64 = 0;

    while let Some(payload) = outbound.recv().await {
        link_free_at = link_free_at.max(Instant::now()) + link.transmit_time(payload.len());
        sleep_until(link_free_at).await;
        shared.buffered.fetch_sub(payload.len(), Ordering::AcqRel);

        sequence += 1;
        let lost = !options.is_reliable()
            && link.drop_every > 0
            && sequence % link.drop_every as u64 == 0;
        if lost {
            continue;
        }

        if delivery.send((link_free_at + link.latency(), payload)).is_err() {
            break;
        }
    }
}

/// Deliver payloads to the peer once their propagation delay has passed
async fn deliver(
    mut inbound: mpsc::UnboundedReceiver<(Instant, Vec<u8>)>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    while let Some((arrival, data)) = inbound.recv().await {
        sleep_until(arrival).await;
        if events.send(ChannelEvent::Message(Message { data })).is_err() {
            break;
        }
    }
}

#[async_trait]
impl Session for LoopbackSession {
    async fn open_data_channel(&mut self, options: ChannelOptions) -> Result<DataChannelLink> {
        if self.closed {
            return Err(AppError::transport("session is closed"));
        }

        let shared = Arc::new(ChannelShared::default());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        self.tasks.push(tokio::spawn(pump_link(
            self.link.clone(),
            options,
            shared.clone(),
            outbound_rx,
            delivery_tx,
        )));
        self.tasks.push(tokio::spawn(deliver(delivery_rx, events_tx.clone())));

        if self.established_at.is_some() {
            shared.open.store(true, Ordering::Release);
            let _ = events_tx.send(ChannelEvent::SenderOpen);
            let _ = events_tx.send(ChannelEvent::PeerChannel);
        }

        self.channels.push(ChannelHandle {
            shared: shared.clone(),
            events: events_tx,
        });

        Ok(DataChannelLink {
            sender: Box::new(LoopbackChannel {
                shared,
                outbound: outbound_tx,
                max_buffered_bytes: self.link.max_buffered_bytes,
            }),
            events: events_rx,
        })
    }

    async fn acquire_media(&mut self, constraints: MediaConstraints) -> Result<Box<dyn MediaTrack>> {
        if self.fail_media {
            return Err(AppError::setup(format!(
                "no camera satisfies {}x{}",
                constraints.min_width, constraints.min_height
            )));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        self.media = Some((self.link.frame_width, self.link.frame_height, stopped.clone()));
        Ok(Box::new(SyntheticTrack {
            width: self.link.frame_width,
            height: self.link.frame_height,
            stopped,
        }))
    }

    async fn establish(&mut self) -> Result<()> {
        if self.closed {
            return Err(AppError::setup("cannot establish a closed session"));
        }
        if self.established_at.is_some() {
            return Ok(());
        }

        tokio::time::sleep(self.link.setup_delay()).await;
        self.established_at = Some(Instant::now());

        for channel in &self.channels {
            channel.shared.open.store(true, Ordering::Release);
            let _ = channel.events.send(ChannelEvent::SenderOpen);
            let _ = channel.events.send(ChannelEvent::PeerChannel);
        }
        Ok(())
    }

    fn telemetry_dialect(&self) -> &str {
        &self.link.telemetry_dialect
    }

    async fn telemetry_snapshot(&mut self) -> Result<Value> {
        if self.closed {
            return Err(AppError::transport("session is closed"));
        }
        let established_at = self
            .established_at
            .ok_or_else(|| AppError::transport("session is not established"))?;

        let elapsed = established_at.elapsed();
        let timestamp_ms = self.epoch_base_ms + elapsed.as_millis() as i64;
        let bwe_bps = self.bandwidth_estimate(elapsed.as_secs_f64() * 1000.0);
        let rtt_ms = self.link.latency_ms * 2;

        let snapshot = match self.link.telemetry_dialect.as_str() {
            LEGACY_DIALECT => self.legacy_snapshot(timestamp_ms, bwe_bps, rtt_ms),
            STANDARD_DIALECT => self.standard_snapshot(timestamp_ms, bwe_bps, rtt_ms),
            other => json!({ "implementation": other, "reports": [] }),
        };
        Ok(snapshot)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.shutdown();
        }
        Ok(())
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
