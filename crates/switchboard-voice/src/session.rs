//! Per-participant media session.
//!
//! A [`MediaSession`] owns one transport link for one participant. It moves
//! through `Idle -> Connecting -> Connected -> Closing -> Closed`, buffers
//! inbound audio into fixed-cadence windows while connected and hands each
//! closed window to the [`AudioPipeline`]. Nothing leaves `Closed`.

use crate::error::VoiceError;
use crate::pipeline::AudioPipeline;
use crate::sink::AudioSink;
use crate::transport::{LinkControl, MediaTransport, RoomTarget};
use crate::window::{AudioWindow, DEFAULT_WINDOW};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Result of a best-effort teardown.
///
/// A degraded cleanup still ends in `Closed`; it only records that the
/// transport did not close cleanly.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Clean,
    Degraded(String),
}

impl Cleanup {
    pub fn is_clean(&self) -> bool {
        matches!(self, Cleanup::Clean)
    }

    pub fn log(&self, session_id: &str) {
        if let Cleanup::Degraded(reason) = self {
            tracing::warn!(session_id, reason = %reason, "media teardown degraded");
        }
    }
}

/// Why [`MediaSession::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Cancelled,
    TransportLost,
    NotConnected,
    /// The configured window is zero, so audio could never be flushed.
    InvalidWindow,
}

#[derive(Debug, Clone, Copy)]
pub struct MediaSessionSettings {
    /// Flush cadence for inbound audio.
    pub window: Duration,
    pub handshake_timeout: Duration,
    pub close_timeout: Duration,
}

impl Default for MediaSessionSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

fn take_slot<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

fn fill_slot<T>(slot: &Mutex<Option<T>>, value: T) {
    match slot.lock() {
        Ok(mut guard) => *guard = Some(value),
        Err(poisoned) => *poisoned.into_inner() = Some(value),
    }
}

pub struct MediaSession {
    session_id: String,
    target: RoomTarget,
    transport: Arc<dyn MediaTransport>,
    pipeline: Arc<AudioPipeline>,
    settings: MediaSessionSettings,
    state: watch::Sender<SessionState>,
    inbound: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    outbound: Mutex<Option<Arc<dyn AudioSink>>>,
    control: Mutex<Option<Box<dyn LinkControl>>>,
}

impl fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSession")
            .field("session_id", &self.session_id)
            .field("target", &self.target)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl MediaSession {
    pub fn new(
        session_id: impl Into<String>,
        target: RoomTarget,
        transport: Arc<dyn MediaTransport>,
        pipeline: Arc<AudioPipeline>,
        settings: MediaSessionSettings,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            session_id: session_id.into(),
            target,
            transport,
            pipeline,
            settings,
            state,
            inbound: Mutex::new(None),
            outbound: Mutex::new(None),
            control: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Applies `step` to the current state atomically, returning the state
    /// observed before the step.
    fn transition(&self, step: impl FnOnce(SessionState) -> Option<SessionState>) -> SessionState {
        let mut observed = SessionState::Closed;
        self.state.send_if_modified(|state| {
            observed = *state;
            match step(*state) {
                Some(next) if next != *state => {
                    tracing::debug!(session_id = %self.session_id, from = %state, to = %next, "media session transition");
                    *state = next;
                    true
                }
                _ => false,
            }
        });
        observed
    }

    fn advance(&self, from: &[SessionState], to: SessionState) -> bool {
        let observed = self.transition(|s| from.contains(&s).then_some(to));
        from.contains(&observed)
    }

    /// Performs the signaling handshake.
    ///
    /// On failure or timeout the session goes straight to `Closed` and
    /// returns [`VoiceError::ConnectFailed`].
    pub async fn connect(&self) -> Result<(), VoiceError> {
        if !self.advance(&[SessionState::Idle], SessionState::Connecting) {
            return Err(VoiceError::ConnectFailed(format!(
                "session {} cannot connect from state {}",
                self.session_id,
                self.state()
            )));
        }

        let attempt =
            tokio::time::timeout(self.settings.handshake_timeout, self.transport.connect(&self.target))
                .await;
        let link = match attempt {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                self.advance(&[SessionState::Connecting], SessionState::Closed);
                return Err(match e {
                    VoiceError::ConnectFailed(_) => e,
                    other => VoiceError::ConnectFailed(other.to_string()),
                });
            }
            Err(_) => {
                self.advance(&[SessionState::Connecting], SessionState::Closed);
                return Err(VoiceError::ConnectFailed(format!(
                    "handshake timed out after {:?}",
                    self.settings.handshake_timeout
                )));
            }
        };

        fill_slot(&self.inbound, link.inbound);
        fill_slot(&self.outbound, link.outbound);
        fill_slot(&self.control, link.control);

        if !self.advance(&[SessionState::Connecting], SessionState::Connected) {
            // Disconnected while the handshake was in flight.
            self.release_link().await.log(&self.session_id);
            return Err(VoiceError::ConnectFailed(
                "session closed during handshake".to_string(),
            ));
        }

        tracing::info!(session_id = %self.session_id, room = %self.target.room, "media session connected");
        Ok(())
    }

    /// Drives the session until `cancel` fires or the transport goes away.
    ///
    /// Every `window` period the buffered audio is dispatched to the pipeline
    /// on its own task. Dispatches are not serialized, so a slow pipeline can
    /// have several windows of the same session in flight.
    pub async fn run(&self, cancel: &CancellationToken) -> RunExit {
        if self.state() != SessionState::Connected {
            return RunExit::NotConnected;
        }
        let period = self.settings.window;
        if period.is_zero() {
            tracing::error!(session_id = %self.session_id, "audio window must be non-zero");
            return RunExit::InvalidWindow;
        }
        let Some(mut inbound) = take_slot(&self.inbound) else {
            return RunExit::NotConnected;
        };

        let mut window = AudioWindow::new();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break RunExit::Cancelled,
                frame = inbound.recv() => match frame {
                    Some(frame) => {
                        if window.append(&frame) {
                            self.flush(&mut window);
                        }
                    }
                    None => break RunExit::TransportLost,
                },
                _ = ticker.tick() => self.flush(&mut window),
            }
        };

        if !window.is_empty() {
            tracing::debug!(session_id = %self.session_id, bytes = window.len(), "dropping partial audio window");
        }
        tracing::info!(session_id = %self.session_id, ?exit, "media session run loop ended");
        exit
    }

    fn flush(&self, window: &mut AudioWindow) {
        if window.is_empty() {
            return;
        }
        let audio = window.take();
        let Some(sink) = self.outbound_sink() else {
            return;
        };
        let pipeline = Arc::clone(&self.pipeline);
        let session_id = self.session_id.clone();

        tokio::spawn(async move {
            match pipeline.process(&session_id, &audio, sink.as_ref()).await {
                Ok(outcome) if outcome.gated() => {}
                Ok(outcome) => tracing::info!(
                    session_id = %session_id,
                    transcript = %outcome.transcript,
                    audio_delivered = outcome.audio_delivered,
                    "processed audio window"
                ),
                Err(e) => tracing::warn!(session_id = %session_id, error = %e, "audio window dropped"),
            }
        });
    }

    fn outbound_sink(&self) -> Option<Arc<dyn AudioSink>> {
        match self.outbound.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Publishes audio to the remote participant.
    pub async fn publish(&self, audio: Vec<u8>) -> Result<(), VoiceError> {
        if self.state() != SessionState::Connected {
            return Err(VoiceError::Transport(format!(
                "session {} is {}",
                self.session_id,
                self.state()
            )));
        }
        let sink = self
            .outbound_sink()
            .ok_or_else(|| VoiceError::Transport("no outbound link".to_string()))?;
        sink.deliver(&self.session_id, audio).await
    }

    /// Tears the session down. Safe to call from any state and any number of
    /// times; later calls are no-ops.
    pub async fn disconnect(&self) -> Cleanup {
        let observed = self.transition(|s| match s {
            SessionState::Idle | SessionState::Connecting => Some(SessionState::Closed),
            SessionState::Connected => Some(SessionState::Closing),
            SessionState::Closing | SessionState::Closed => None,
        });
        if observed != SessionState::Connected {
            return Cleanup::Clean;
        }

        let cleanup = self.release_link().await;
        self.advance(&[SessionState::Closing], SessionState::Closed);
        tracing::info!(session_id = %self.session_id, "media session closed");
        cleanup
    }

    async fn release_link(&self) -> Cleanup {
        take_slot(&self.inbound);
        take_slot(&self.outbound);
        let Some(mut control) = take_slot(&self.control) else {
            return Cleanup::Clean;
        };
        match tokio::time::timeout(self.settings.close_timeout, control.close()).await {
            Ok(Ok(())) => Cleanup::Clean,
            Ok(Err(e)) => Cleanup::Degraded(e.to_string()),
            Err(_) => Cleanup::Degraded(format!(
                "transport close timed out after {:?}",
                self.settings.close_timeout
            )),
        }
    }
}
