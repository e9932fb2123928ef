use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::AppState;

/// Header accepted in place of `Authorization: Bearer`.
pub const AGENT_AUTH_HEADER: &str = "X-Agent-Auth";

/// Guards token retrieval with the shared secret from
/// `agent.token_endpoint_secret`, passed either as `Authorization: Bearer`
/// or in `X-Agent-Auth`. Requests pass through when no secret is configured.
pub async fn token_auth_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    let Some(expected) = state.token_endpoint_secret.as_deref() else {
        return Ok(next.run(req).await);
    };

    let provided = if let Some(val) = req.headers().get(AGENT_AUTH_HEADER) {
        val.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?
    } else if let Some(val) = req.headers().get("Authorization") {
        let val_str = val.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;
        val_str
            .strip_prefix("Bearer ")
            .ok_or(StatusCode::UNAUTHORIZED)?
    } else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    if !constant_time_eq(provided.trim().as_bytes(), expected.as_bytes()) {
        tracing::warn!(path = %req.uri().path(), "rejected token request with bad credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_whole_secret() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(!constant_time_eq(b"", b"secret"));
    }
}
