//! Signaling webhook ingestion.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use switchboard_agents::SignalingEvent;

const SIGNATURE_HEADERS: [&str; 2] = ["X-LiveKit-Signature", "Livekit-Signature"];

/// Checks an HMAC-SHA256 signature over `body`. The signature may be hex or
/// standard base64 encoded.
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let candidates = [
        hex::decode(signature).ok(),
        base64::engine::general_purpose::STANDARD
            .decode(signature)
            .ok(),
    ];

    candidates.into_iter().flatten().any(|provided| {
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&provided).is_ok()
    })
}

fn signature_header(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok())
}

/// Handler for `POST /webhook/livekit`.
///
/// Signatures are only checked when an API secret is configured.
pub async fn livekit_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let secret = state.voice.api_secret();
    if !secret.is_empty() {
        let signature = signature_header(&headers)
            .ok_or_else(|| ApiError::Unauthorized("missing webhook signature".to_string()))?;
        if !verify_signature(secret.as_bytes(), &body, signature) {
            tracing::warn!("rejected webhook with invalid signature");
            return Err(ApiError::Unauthorized("invalid webhook signature".to_string()));
        }
    }

    let event = SignalingEvent::parse(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    tracing::debug!(?event, "signaling event received");

    state
        .events
        .dispatch(event)
        .await
        .map_err(|e| ApiError::InternalServerError(e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}
