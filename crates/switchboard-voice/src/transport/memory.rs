use super::{LinkControl, MediaLink, MediaTransport, RoomTarget, INBOUND_FRAME_BUFFER};
use crate::error::VoiceError;
use crate::sink::AudioSink;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Loopback transport that keeps every link in process.
///
/// Each successful connect yields a [`RoomFeed`] that plays the remote side:
/// it injects inbound frames, records published audio and can drop the link.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    fail_connects: AtomicBool,
    connect_delay: Option<Duration>,
    attempts: AtomicUsize,
    feeds: Mutex<Vec<RoomFeed>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose handshakes always fail.
    pub fn failing() -> Self {
        let transport = Self::default();
        transport.fail_connects.store(true, Ordering::SeqCst);
        transport
    }

    /// Delays every handshake, to exercise connect timeouts and cancellation.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn set_fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Number of connect attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn feeds(&self) -> Vec<RoomFeed> {
        self.feeds
            .lock()
            .map(|feeds| feeds.clone())
            .unwrap_or_default()
    }

    /// The most recent feed opened for `identity`.
    pub fn feed_for(&self, identity: &str) -> Option<RoomFeed> {
        self.feeds()
            .into_iter()
            .rev()
            .find(|feed| feed.identity() == identity)
    }
}

#[async_trait]
impl MediaTransport for InMemoryTransport {
    async fn connect(&self, target: &RoomTarget) -> Result<MediaLink, VoiceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(VoiceError::ConnectFailed(format!(
                "in-memory transport refused {}",
                target.identity
            )));
        }

        let (tx, rx) = mpsc::channel(INBOUND_FRAME_BUFFER);
        let feed = RoomFeed {
            inner: Arc::new(FeedInner {
                room: target.room.clone(),
                identity: target.identity.clone(),
                inbound: Mutex::new(Some(tx)),
                published: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        };
        if let Ok(mut feeds) = self.feeds.lock() {
            feeds.push(feed.clone());
        }

        Ok(MediaLink {
            inbound: rx,
            outbound: Arc::new(feed.clone()),
            control: Box::new(feed),
        })
    }
}

#[derive(Debug)]
struct FeedInner {
    room: String,
    identity: String,
    inbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    published: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

/// Remote end of an in-memory link.
#[derive(Debug, Clone)]
pub struct RoomFeed {
    inner: Arc<FeedInner>,
}

impl RoomFeed {
    pub fn room(&self) -> &str {
        &self.inner.room
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Sends one inbound frame. Returns `false` once the link is gone.
    pub async fn push(&self, frame: impl Into<Vec<u8>>) -> bool {
        let sender = match self.inner.inbound.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(frame.into()).await.is_ok(),
            None => false,
        }
    }

    /// Simulates the remote side dropping the connection.
    pub fn drop_link(&self) {
        if let Ok(mut inbound) = self.inner.inbound.lock() {
            inbound.take();
        }
    }

    /// Audio the local side published, in order.
    pub fn published(&self) -> Vec<Vec<u8>> {
        self.inner
            .published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Whether the local side closed the link.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for RoomFeed {
    async fn deliver(&self, _session_id: &str, audio: Vec<u8>) -> Result<(), VoiceError> {
        if self.is_closed() {
            return Err(VoiceError::Transport("link closed".to_string()));
        }
        self.inner
            .published
            .lock()
            .map_err(|_| VoiceError::Transport("feed poisoned".to_string()))?
            .push(audio);
        Ok(())
    }
}

#[async_trait]
impl LinkControl for RoomFeed {
    async fn close(&mut self) -> Result<(), VoiceError> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.drop_link();
        Ok(())
    }
}
