use super::{LinkControl, MediaLink, MediaTransport, RoomTarget, INBOUND_FRAME_BUFFER};
use crate::error::VoiceError;
use crate::sink::AudioSink;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Builds the signaling WebSocket URL for a service base URL.
///
/// `http`/`https` map to `ws`/`wss`, the path becomes `<base>/rtc` and the
/// token travels as the `access_token` query parameter.
pub fn signaling_url(base: &str, token: &str) -> Result<Url, VoiceError> {
    let mut url = Url::parse(base)
        .map_err(|e| VoiceError::Config(format!("invalid livekit url {:?}: {}", base, e)))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(VoiceError::Config(format!(
                "unsupported livekit url scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| VoiceError::Config(format!("cannot use scheme {} for {}", scheme, base)))?;

    let path = format!("{}/rtc", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("access_token", token);
    Ok(url)
}

/// Connects to a LiveKit-compatible signaling endpoint over WebSocket.
///
/// Binary frames in both directions carry encoded audio.
#[derive(Debug, Clone, Default)]
pub struct LiveKitTransport;

impl LiveKitTransport {
    pub fn new() -> Self {
        Self
    }
}

struct OutboundAudio {
    tx: mpsc::Sender<Vec<u8>>,
}

#[async_trait]
impl AudioSink for OutboundAudio {
    async fn deliver(&self, _session_id: &str, audio: Vec<u8>) -> Result<(), VoiceError> {
        self.tx
            .send(audio)
            .await
            .map_err(|_| VoiceError::Transport("outbound link closed".to_string()))
    }
}

struct WsControl {
    cancel: CancellationToken,
    writer: Option<JoinHandle<()>>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl LinkControl for WsControl {
    async fn close(&mut self) -> Result<(), VoiceError> {
        self.cancel.cancel();
        self.reader.abort();
        match self.writer.take() {
            Some(writer) => writer
                .await
                .map_err(|e| VoiceError::Transport(format!("writer task failed: {}", e))),
            None => Ok(()),
        }
    }
}

impl Drop for WsControl {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.reader.abort();
    }
}

#[async_trait]
impl MediaTransport for LiveKitTransport {
    async fn connect(&self, target: &RoomTarget) -> Result<MediaLink, VoiceError> {
        let url = signaling_url(&target.url, &target.token)?;
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| VoiceError::ConnectFailed(format!("websocket handshake: {}", e)))?;
        tracing::info!(room = %target.room, identity = %target.identity, "media link established");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_FRAME_BUFFER);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(INBOUND_FRAME_BUFFER);
        let cancel = CancellationToken::new();

        let identity = target.identity.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Binary(frame)) => {
                        if inbound_tx.send(frame.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(identity = %identity, ?frame, "signaling closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(identity = %identity, error = %e, "signaling read failed");
                        break;
                    }
                }
            }
            // Dropping inbound_tx tells the session the link is gone.
        });

        let writer_cancel = cancel.clone();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        let _ = ws_tx.close().await;
                        break;
                    }
                    next = outbound_rx.recv() => match next {
                        Some(audio) => {
                            if let Err(e) = ws_tx.send(Message::Binary(audio.into())).await {
                                tracing::warn!(error = %e, "failed to publish audio");
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        });

        Ok(MediaLink {
            inbound: inbound_rx,
            outbound: Arc::new(OutboundAudio { tx: outbound_tx }),
            control: Box::new(WsControl {
                cancel,
                writer: Some(writer),
                reader,
            }),
        })
    }
}
