use crate::error::VoiceError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
pub const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Renders reply text to encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;
}

fn check_text(text: &str) -> Result<(), VoiceError> {
    if text.len() > MAX_TTS_INPUT_BYTES {
        return Err(VoiceError::SynthesisFailed(format!(
            "text exceeds maximum size: {} bytes (limit: {} bytes)",
            text.len(),
            MAX_TTS_INPUT_BYTES
        )));
    }
    Ok(())
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

/// Synthesizer backed by a Piper HTTP server that returns WAV bytes.
///
/// Sends the text as the url-encoded form field `text`; if the server
/// answers with a non-2xx status the request is retried once as JSON.
#[derive(Debug, Clone)]
pub struct PiperHttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
}

impl PiperHttpSynthesizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("piper http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperHttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        check_text(text)?;

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("text", text)])
            .send()
            .await
            .map_err(|e| VoiceError::SynthesisFailed(format!("post form to piper: {}", e)))?;
        let form_status = response.status();
        if form_status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| VoiceError::SynthesisFailed(format!("read tts response: {}", e)))?;
            return Ok(body.to_vec());
        }

        tracing::debug!(status = %form_status, "piper rejected form body, retrying as json");
        let retry = self
            .client
            .post(&self.endpoint)
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| VoiceError::SynthesisFailed(format!("post json to piper: {}", e)))?;
        if !retry.status().is_success() {
            return Err(VoiceError::SynthesisFailed(format!(
                "piper tts request failed, last status {}",
                retry.status()
            )));
        }
        let body = retry
            .bytes()
            .await
            .map_err(|e| VoiceError::SynthesisFailed(format!("read tts response: {}", e)))?;
        Ok(body.to_vec())
    }
}

/// Synthesizer that shells out to a local piper binary and returns raw PCM.
#[derive(Debug, Clone)]
pub struct PiperCliSynthesizer {
    model_path: PathBuf,
    binary_path: PathBuf,
    speed: f32,
    timeout: Duration,
}

impl PiperCliSynthesizer {
    pub fn new(
        model_path: impl Into<PathBuf>,
        binary_path: impl Into<PathBuf>,
        speed: f32,
        timeout: Duration,
    ) -> Result<Self, VoiceError> {
        if !(0.1..=10.0).contains(&speed) {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }
        Ok(Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            speed,
            timeout,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperCliSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        check_text(text)?;

        if !self.model_path.exists() {
            return Err(VoiceError::SynthesisFailed(format!(
                "Model file not found: {:?}",
                self.model_path
            )));
        }

        let mut child = Command::new(&self.binary_path)
            .arg("--model")
            .arg(&self.model_path)
            .arg("--output_raw")
            // Length scale is the inverse of speed.
            .arg("--length_scale")
            .arg((1.0 / self.speed).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::SynthesisFailed(format!("Failed to spawn piper: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::SynthesisFailed("Failed to open stdin".to_string()))?;
        let text_owned = text.to_string();

        // Write on a separate task so a full stdout pipe cannot deadlock us.
        let write_task = tokio::spawn(async move { stdin.write_all(text_owned.as_bytes()).await });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::SynthesisFailed(format!(
                    "TTS process timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::SynthesisFailed(format!("Failed to read stdout: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "failed writing text to piper stdin"),
            Err(e) => tracing::warn!(error = %e, "piper stdin writer panicked"),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::SynthesisFailed(format!(
                "Piper failed: {}",
                stderr
            )));
        }

        Ok(output.stdout)
    }
}
