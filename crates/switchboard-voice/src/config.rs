use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_WHISPER_ENDPOINT: &str = "http://localhost:7070/inference";
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_OLLAMA_MODEL: &str = "tinyllama";
pub const DEFAULT_PIPER_ENDPOINT: &str = "http://localhost:7071/tts";

fn default_token_ttl_seconds() -> u64 {
    3600
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    /// Signaling service URL. Empty disables agent spawning.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    /// Also the shared secret for webhook signatures.
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for LiveKit join tokens. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

fn default_stt_vendor() -> String {
    "whisper".to_string()
}

fn default_llm_vendor() -> String {
    "ollama".to_string()
}

fn default_tts_vendor() -> String {
    "piper".to_string()
}

fn default_stt_timeout_secs() -> u64 {
    15
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_tts_timeout_secs() -> u64 {
    120
}

fn default_speed() -> f32 {
    1.0
}

/// Speech recognition vendor selection.
///
/// Vendors: `whisper` (HTTP inference server), `whisper-cli` (local
/// whisper.cpp binary), `none`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "default_stt_vendor")]
    pub vendor: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub binary_path: Option<String>,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default = "default_stt_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            vendor: default_stt_vendor(),
            endpoint: None,
            binary_path: None,
            model_path: None,
            timeout_secs: default_stt_timeout_secs(),
        }
    }
}

/// Reply generation vendor selection. Vendors: `ollama`, `none`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_vendor")]
    pub vendor: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            vendor: default_llm_vendor(),
            endpoint: None,
            model: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Speech synthesis vendor selection.
///
/// Vendors: `piper` (HTTP), `piper-cli` (local binary), `none`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_vendor")]
    pub vendor: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub binary_path: Option<String>,
    #[serde(default)]
    pub model_path: Option<String>,
    /// Speech speed multiplier for `piper-cli` (1.0 is normal).
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            vendor: default_tts_vendor(),
            endpoint: None,
            binary_path: None,
            model_path: None,
            speed: default_speed(),
            timeout_secs: default_tts_timeout_secs(),
        }
    }
}

/// Vendor selection for the three pipeline capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
}
