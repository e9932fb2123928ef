use crate::error::VoiceError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
pub const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// A transcript and the recognizer's confidence in it, in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub transcript: String,
    pub confidence: f32,
}

/// Turns a chunk of encoded audio into text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, audio: &[u8]) -> Result<Recognition, VoiceError>;
}

fn check_input(audio: &[u8]) -> Result<(), VoiceError> {
    if audio.is_empty() {
        return Err(VoiceError::EmptyAudio);
    }
    if audio.len() > MAX_STT_INPUT_BYTES {
        return Err(VoiceError::RecognitionFailed(format!(
            "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
            audio.len(),
            MAX_STT_INPUT_BYTES
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    text: String,
}

/// Recognizer backed by a whisper.cpp HTTP inference server.
///
/// The audio is posted as the multipart field `file`. The server does not
/// report confidence, so any returned transcript is treated as certain.
#[derive(Debug, Clone)]
pub struct WhisperHttpRecognizer {
    client: reqwest::Client,
    endpoint: String,
}

impl WhisperHttpRecognizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Config(format!("whisper http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperHttpRecognizer {
    async fn recognize(&self, audio: &[u8]) -> Result<Recognition, VoiceError> {
        check_input(audio)?;

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::RecognitionFailed(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::RecognitionFailed(format!("whisper request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::RecognitionFailed(format!(
                "whisper returned {}: {}",
                status, body
            )));
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::RecognitionFailed(format!("whisper response: {}", e)))?;

        Ok(Recognition {
            transcript: parsed.text.trim().to_string(),
            confidence: 1.0,
        })
    }
}

/// Recognizer that shells out to a local whisper.cpp binary.
#[derive(Debug, Clone)]
pub struct WhisperCliRecognizer {
    model_path: PathBuf,
    binary_path: PathBuf,
    timeout: Duration,
}

impl WhisperCliRecognizer {
    pub fn new(
        model_path: impl Into<PathBuf>,
        binary_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperCliRecognizer {
    async fn recognize(&self, audio: &[u8]) -> Result<Recognition, VoiceError> {
        check_input(audio)?;

        // -m <model>, -f - reads audio from stdin, -nt drops timestamps.
        let mut child = Command::new(&self.binary_path)
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg("-")
            .arg("-nt")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VoiceError::RecognitionFailed(format!("Failed to spawn STT binary: {}", e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::RecognitionFailed("Failed to open stdin".to_string()))?;
        stdin.write_all(audio).await.map_err(|e| {
            VoiceError::RecognitionFailed(format!("Failed to write to stdin: {}", e))
        })?;
        drop(stdin);

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::RecognitionFailed(format!(
                    "STT process timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::RecognitionFailed(format!("Failed to read stdout: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::RecognitionFailed(format!(
                "STT binary failed: {}",
                stderr
            )));
        }

        Ok(Recognition {
            transcript: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            confidence: 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cli_rejects_oversized_audio_before_spawning() {
        let recognizer = WhisperCliRecognizer::new(
            "/nonexistent/model.bin",
            "/nonexistent/whisper",
            Duration::from_secs(1),
        );
        let audio = vec![0u8; MAX_STT_INPUT_BYTES + 1];
        let err = recognizer.recognize(&audio).await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum size"));
    }

    #[tokio::test]
    async fn cli_reports_missing_binary() {
        let recognizer = WhisperCliRecognizer::new(
            "/nonexistent/model.bin",
            "/nonexistent/whisper",
            Duration::from_secs(1),
        );
        let err = recognizer.recognize(b"RIFF").await.unwrap_err();
        assert!(matches!(err, VoiceError::RecognitionFailed(_)));
    }

    #[tokio::test]
    async fn empty_audio_is_rejected() {
        let recognizer = WhisperHttpRecognizer::new("http://127.0.0.1:9", Duration::from_secs(1))
            .unwrap();
        assert!(matches!(
            recognizer.recognize(&[]).await,
            Err(VoiceError::EmptyAudio)
        ));
    }
}
