//! Peer transport abstractions consumed by the measurement components
//!
//! A [`SessionFactory`] stands in for the relay configuration step and hands
//! out [`Session`]s. A session exposes message channels with buffered-byte
//! backpressure, media capture, and a raw telemetry snapshot whose shape
//! depends on the implementation (see [`telemetry`]).

pub mod loopback;
pub mod telemetry;

pub use loopback::{LoopbackSessionFactory, LoopbackSession};
pub use telemetry::{BandwidthSnapshot, TelemetryFormat};

use crate::error::Result;
use crate::types::CandidateFilter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Per-session setup applied before the connection is established
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub candidate_filter: CandidateFilter,
    /// Cap the video send bitrate
    pub max_video_bitrate_kbps: Option<u32>,
    /// Disable forward error correction for video
    pub disable_video_fec: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            candidate_filter: CandidateFilter::Any,
            max_video_bitrate_kbps: None,
            disable_video_fec: false,
        }
    }
}

impl SessionConfig {
    pub fn with_candidate_filter(candidate_filter: CandidateFilter) -> Self {
        Self {
            candidate_filter,
            ..Self::default()
        }
    }
}

/// Delivery guarantees requested for a data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOptions {
    pub ordered: bool,
    /// `Some(0)` means best effort with no retransmission
    pub max_retransmits: Option<u16>,
}

impl ChannelOptions {
    /// Ordered, fully reliable delivery
    pub fn reliable() -> Self {
        Self {
            ordered: true,
            max_retransmits: None,
        }
    }

    /// Unordered delivery without retransmissions
    pub fn best_effort() -> Self {
        Self {
            ordered: false,
            max_retransmits: Some(0),
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.max_retransmits.is_none()
    }
}

/// Minimum capture resolution requested from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub min_width: u32,
    pub min_height: u32,
}

/// A message delivered to the receiving peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub data: Vec<u8>,
}

impl Message {
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// Events observed on a data channel pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The local sending channel is open and accepts payloads
    SenderOpen,
    /// The remote peer announced its end of the channel
    PeerChannel,
    /// A message arrived on the peer's end
    Message(Message),
    /// The channel was torn down
    Closed,
}

/// Local sending end of a data channel
pub trait DataChannel: Send + Sync {
    /// Enqueue one payload; fails when the channel is closed or its send
    /// buffer cannot take the payload
    fn send(&self, payload: &[u8]) -> Result<()>;

    /// Bytes enqueued but not yet handed to the network
    fn buffered_amount(&self) -> usize;
}

/// Sending end plus the event stream of one data channel
pub struct DataChannelLink {
    pub sender: Box<dyn DataChannel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// A captured media track
pub trait MediaTrack: Send {
    fn stop(&mut self);

    fn is_stopped(&self) -> bool;
}

/// One peer-to-peer session, exclusively owned by the component that created it
#[async_trait]
pub trait Session: Send {
    /// Create a data channel; it opens once the session is established
    async fn open_data_channel(&mut self, options: ChannelOptions) -> Result<DataChannelLink>;

    /// Open the camera and attach its track to the session
    async fn acquire_media(&mut self, constraints: MediaConstraints) -> Result<Box<dyn MediaTrack>>;

    /// Connect the two peers
    async fn establish(&mut self) -> Result<()>;

    /// Name of the telemetry dialect this implementation speaks
    fn telemetry_dialect(&self) -> &str;

    /// Fetch a raw telemetry report
    async fn telemetry_snapshot(&mut self) -> Result<serde_json::Value>;

    /// Tear the session down
    async fn close(&mut self) -> Result<()>;
}

/// Creates sessions; failure here is a fatal setup error
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, config: SessionConfig) -> Result<Box<dyn Session>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_options() {
        assert!(ChannelOptions::reliable().is_reliable());
        assert!(ChannelOptions::reliable().ordered);

        let best_effort = ChannelOptions::best_effort();
        assert!(!best_effort.is_reliable());
        assert!(!best_effort.ordered);
        assert_eq!(best_effort.max_retransmits, Some(0));
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::with_candidate_filter(CandidateFilter::Relay);
        assert_eq!(config.candidate_filter, CandidateFilter::Relay);
        assert!(config.max_video_bitrate_kbps.is_none());
        assert!(!config.disable_video_fec);
    }

    #[test]
    fn test_message_len() {
        let message = Message { data: vec![b'h'; 1024] };
        assert_eq!(message.byte_len(), 1024);
    }
}
