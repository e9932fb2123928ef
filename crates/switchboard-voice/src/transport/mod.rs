//! Media transports.
//!
//! A transport turns a signed room target into a [`MediaLink`]: a stream of
//! inbound audio frames, a sink for outbound audio and a handle to tear the
//! connection down. The inbound channel closing means the transport is gone.

mod livekit;
mod memory;

pub use livekit::{signaling_url, LiveKitTransport};
pub use memory::{InMemoryTransport, RoomFeed};

use crate::error::VoiceError;
use crate::sink::AudioSink;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Inbound frames buffered per link before the reader applies backpressure.
pub const INBOUND_FRAME_BUFFER: usize = 256;

/// Where and as whom to connect.
#[derive(Clone)]
pub struct RoomTarget {
    pub url: String,
    pub token: String,
    pub room: String,
    pub identity: String,
}

impl fmt::Debug for RoomTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomTarget")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("room", &self.room)
            .field("identity", &self.identity)
            .finish()
    }
}

/// Tears down the connection behind a [`MediaLink`].
#[async_trait]
pub trait LinkControl: Send {
    /// Best-effort close. Must be safe to call once the remote side is gone.
    async fn close(&mut self) -> Result<(), VoiceError>;
}

/// An established media connection.
pub struct MediaLink {
    pub inbound: mpsc::Receiver<Vec<u8>>,
    pub outbound: Arc<dyn AudioSink>,
    pub control: Box<dyn LinkControl>,
}

impl fmt::Debug for MediaLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaLink").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Performs the signaling handshake and media negotiation.
    async fn connect(&self, target: &RoomTarget) -> Result<MediaLink, VoiceError>;
}
