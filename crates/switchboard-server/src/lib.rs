//! Switchboard server library logic.

pub mod api;
pub mod api_webhook;
pub mod config;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use config::Config;
use serde_json::{json, Value};
use std::sync::Arc;
use switchboard_agents::{AgentManager, SignalingEventRouter};
use switchboard_db::DbPool;
use switchboard_voice::{factory, stt::MAX_STT_INPUT_BYTES, VoiceError, VoiceService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Signaling token issuer.
    pub voice: VoiceService,
    /// Agent lifecycle owner.
    pub agents: Arc<AgentManager>,
    /// Webhook event dispatcher.
    pub events: SignalingEventRouter,
    /// Shared secret for `GET /sessions/{id}/token`.
    pub token_endpoint_secret: Option<String>,
}

impl AppState {
    /// Assembles state around an existing agent manager.
    pub fn new(pool: DbPool, agents: Arc<AgentManager>, token_endpoint_secret: Option<String>) -> Self {
        Self {
            voice: agents.voice().clone(),
            events: SignalingEventRouter::new(pool.clone(), agents.clone()),
            pool,
            agents,
            token_endpoint_secret,
        }
    }

    /// Builds the pipeline and transport named in `config` and wires them
    /// into a fresh agent manager.
    ///
    /// # Errors
    ///
    /// Returns `VoiceError` when a vendor is unknown or misconfigured.
    pub fn from_config(config: &Config, pool: DbPool) -> Result<Self, VoiceError> {
        let pipeline = factory::build_pipeline(&config.pipeline)?;
        let transport = factory::build_transport(&config.agent.transport)?;
        let voice = VoiceService::new(config.livekit.clone());
        if !voice.is_enabled() {
            tracing::warn!("livekit.url is not set, agents cannot be spawned");
        }

        let agents = Arc::new(AgentManager::new(
            pool.clone(),
            voice,
            Arc::new(pipeline),
            transport,
            config.agent.settings(),
        ));
        Ok(Self::new(
            pool,
            agents,
            config.agent.token_endpoint_secret.clone(),
        ))
    }
}

/// Maximum request body size. Uploaded audio is capped at the recognizer's
/// input limit plus room for framing.
const MAX_REQUEST_BODY_BYTES: usize = MAX_STT_INPUT_BYTES + 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let token_routes = Router::new()
        .route(
            "/sessions/{session_id}/token",
            get(api::session_token_handler),
        )
        .layer(axum::middleware::from_fn(middleware::token_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/calls", post(api::create_call_handler))
        .route("/calls/{call_id}", get(api::get_call_handler))
        .route("/sessions/{session_id}", get(api::get_session_handler))
        .route(
            "/sessions/{session_id}/audio",
            post(api::session_audio_handler),
        )
        .route("/livekit/token", get(api::livekit_token_handler))
        .route(
            "/webhook/livekit",
            post(api_webhook::livekit_webhook_handler),
        )
        .merge(token_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
