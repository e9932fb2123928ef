use crate::error::VoiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces a conversational reply to a transcript.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, VoiceError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Generator backed by an Ollama `/api/generate` endpoint, non-streaming.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("ollama http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ReplyGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, VoiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| VoiceError::GenerationFailed(format!("post to ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::GenerationFailed(format!(
                "ollama returned {}: {}",
                status, body
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::GenerationFailed(format!("decode ollama response: {}", e)))?;
        Ok(parsed.response.trim().to_string())
    }
}
