use crate::error::VoiceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Destination for synthesized reply audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn deliver(&self, session_id: &str, audio: Vec<u8>) -> Result<(), VoiceError>;
}

/// Writes each reply as a WAV artifact under a directory.
///
/// File names follow `agent-reply-<session>-<unix-millis>.wav`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self, session_id: &str) -> PathBuf {
        let stamp = chrono::Utc::now().timestamp_millis();
        // Session ids are opaque; keep them from escaping the directory.
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("agent-reply-{}-{}.wav", safe, stamp))
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn deliver(&self, session_id: &str, audio: Vec<u8>) -> Result<(), VoiceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.artifact_path(session_id);
        tokio::fs::write(&path, &audio).await?;
        tracing::info!(session_id, path = %path.display(), bytes = audio.len(), "wrote reply artifact");
        Ok(())
    }
}
