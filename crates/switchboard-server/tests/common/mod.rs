#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use switchboard_agents::{AgentManager, AgentSettings};
use switchboard_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use switchboard_server::{app, AppState};
use switchboard_voice::{
    AudioPipeline, InMemoryTransport, LiveKitConfig, MediaSessionSettings, Recognition,
    SpeechRecognizer, SpeechSynthesizer, VoiceError, VoiceService,
};
use tower::ServiceExt;

pub const API_SECRET: &str = "webhook-secret";

pub struct StubRecognizer;

#[async_trait]
impl SpeechRecognizer for StubRecognizer {
    async fn recognize(&self, _audio: &[u8]) -> Result<Recognition, VoiceError> {
        Ok(Recognition {
            transcript: "hello world".to_string(),
            confidence: 1.0,
        })
    }
}

pub struct StubSynthesizer;

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        Ok(format!("RIFF{}", text).into_bytes())
    }
}

pub struct TestServer {
    pub dir: tempfile::TempDir,
    pub pool: DbPool,
    pub agents: Arc<AgentManager>,
    pub transport: Arc<InMemoryTransport>,
    pub app: Router,
}

pub struct Options {
    pub livekit_url: &'static str,
    pub api_secret: &'static str,
    pub token_secret: Option<&'static str>,
    pub pipeline: AudioPipeline,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            livekit_url: "http://localhost:7880",
            api_secret: API_SECRET,
            token_secret: None,
            pipeline: AudioPipeline::new()
                .with_recognizer(Arc::new(StubRecognizer))
                .with_synthesizer(Arc::new(StubSynthesizer)),
        }
    }
}

pub fn server() -> TestServer {
    server_with(Options::default())
}

pub fn server_with(options: Options) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(
        dir.path().join("switchboard.db").to_str().unwrap(),
        DbRuntimeSettings::default(),
    )
    .unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();

    let transport = Arc::new(InMemoryTransport::new());
    let agents = Arc::new(AgentManager::new(
        pool.clone(),
        VoiceService::new(LiveKitConfig::new(
            options.livekit_url,
            "devkey",
            options.api_secret,
        )),
        Arc::new(options.pipeline),
        transport.clone(),
        AgentSettings {
            media: MediaSessionSettings {
                window: Duration::from_millis(200),
                handshake_timeout: Duration::from_secs(1),
                close_timeout: Duration::from_secs(1),
            },
            artifacts_dir: dir.path().join("artifacts"),
            stop_timeout: Duration::from_secs(1),
        },
    ));

    let state = AppState::new(
        pool.clone(),
        agents.clone(),
        options.token_secret.map(str::to_string),
    );
    TestServer {
        dir,
        pool,
        agents,
        transport,
        app: app(state),
    }
}

pub fn hex_signature(body: &[u8]) -> String {
    hex::encode(raw_signature(body))
}

pub fn base64_signature(body: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(raw_signature(body))
}

fn raw_signature(body: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(API_SECRET.as_bytes()).unwrap();
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

impl TestServer {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Posts a webhook signed with the configured API secret.
    pub async fn webhook(&self, body: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/webhook/livekit")
                .header("X-LiveKit-Signature", hex_signature(body.as_bytes()))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Creates a call and returns `(call_id, caller_session_id)`.
    pub async fn create_call(&self) -> (String, String) {
        let (status, json) = self
            .post_json("/calls", r#"{"caller_id":"external-caller"}"#)
            .await;
        assert_eq!(status, StatusCode::OK);
        (
            json["call_id"].as_str().unwrap().to_string(),
            json["session_id"].as_str().unwrap().to_string(),
        )
    }
}

pub fn participant_event(kind: &str, identity: &str, room: &str) -> String {
    format!(
        r#"{{"type":"{}","participant":{{"identity":"{}"}},"room":{{"name":"{}"}}}}"#,
        kind, identity, room
    )
}
