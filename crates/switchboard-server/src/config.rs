//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use switchboard_agents::AgentSettings;
use switchboard_voice::{LiveKitConfig, MediaSessionSettings, PipelineConfig};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Signaling service credentials.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Vendor selection for recognition, generation and synthesis.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "switchboard_agents=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// AI agent runtime settings.
#[derive(Clone, Deserialize)]
pub struct AgentConfig {
    /// Audio window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Directory for replies to out-of-band audio.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,

    /// Media transport vendor: `livekit` or `memory`.
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Shared secret guarding `GET /sessions/{id}/token`. Unset leaves the
    /// endpoint open.
    #[serde(default)]
    pub token_endpoint_secret: Option<String>,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("window_ms", &self.window_ms)
            .field("handshake_timeout_ms", &self.handshake_timeout_ms)
            .field("close_timeout_ms", &self.close_timeout_ms)
            .field("stop_timeout_ms", &self.stop_timeout_ms)
            .field("artifacts_dir", &self.artifacts_dir)
            .field("transport", &self.transport)
            .field(
                "token_endpoint_secret",
                &self.token_endpoint_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl AgentConfig {
    pub fn settings(&self) -> AgentSettings {
        AgentSettings {
            media: MediaSessionSettings {
                window: Duration::from_millis(self.window_ms),
                handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
                close_timeout: Duration::from_millis(self.close_timeout_ms),
            },
            artifacts_dir: self.artifacts_dir.clone().into(),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "switchboard.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_window_ms() -> u64 {
    2_000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_close_timeout_ms() -> u64 {
    5_000
}

fn default_stop_timeout_ms() -> u64 {
    5_000
}

fn default_artifacts_dir() -> String {
    "out/agents".to_string()
}

fn default_transport() -> String {
    "livekit".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            artifacts_dir: default_artifacts_dir(),
            transport: default_transport(),
            token_endpoint_secret: None,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides (see [`apply_env_overrides`]).
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Rejects values the agent runtime cannot run with.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` naming the first offending key.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let agent = &config.agent;
    let durations = [
        ("agent.window_ms", agent.window_ms),
        ("agent.handshake_timeout_ms", agent.handshake_timeout_ms),
        ("agent.close_timeout_ms", agent.close_timeout_ms),
        ("agent.stop_timeout_ms", agent.stop_timeout_ms),
    ];
    if let Some((key, _)) = durations.iter().find(|(_, ms)| *ms == 0) {
        return Err(ConfigError::Invalid(format!("{} must be greater than zero", key)));
    }
    Ok(())
}

fn set_endpoint(slot: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *slot = Some(v);
    }
}

/// Applies environment overrides using `lookup` to read variables.
///
/// - `SWITCHBOARD_HOST`, `SWITCHBOARD_PORT` (or `LIVEKIT_HTTP_PORT`)
/// - `DATABASE_PATH`
/// - `SWITCHBOARD_LOG_LEVEL`, `SWITCHBOARD_LOG_JSON` ("true" or "1")
/// - `STT_VENDOR`, `LLM_VENDOR`, `TTS_VENDOR`, `WEBRTC_VENDOR`
/// - `WHISPER_ENDPOINT`, `OLLAMA_ENDPOINT`, `OLLAMA_MODEL`, `PIPER_ENDPOINT`
/// - `LIVEKIT_URL`, `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET`
/// - `AGENT_TOKEN_ENDPOINT_SECRET`
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("SWITCHBOARD_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("SWITCHBOARD_PORT").or_else(|| lookup("LIVEKIT_HTTP_PORT")) {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = lookup("DATABASE_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = lookup("SWITCHBOARD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("SWITCHBOARD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    if let Some(vendor) = lookup("STT_VENDOR") {
        config.pipeline.stt.vendor = vendor;
    }
    if let Some(vendor) = lookup("LLM_VENDOR") {
        config.pipeline.llm.vendor = vendor;
    }
    if let Some(vendor) = lookup("TTS_VENDOR") {
        config.pipeline.tts.vendor = vendor;
    }
    if let Some(vendor) = lookup("WEBRTC_VENDOR") {
        config.agent.transport = vendor;
    }
    set_endpoint(&mut config.pipeline.stt.endpoint, lookup("WHISPER_ENDPOINT"));
    set_endpoint(&mut config.pipeline.llm.endpoint, lookup("OLLAMA_ENDPOINT"));
    set_endpoint(&mut config.pipeline.llm.model, lookup("OLLAMA_MODEL"));
    set_endpoint(&mut config.pipeline.tts.endpoint, lookup("PIPER_ENDPOINT"));

    if let Some(url) = lookup("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(key) = lookup("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = lookup("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Some(secret) = lookup("AGENT_TOKEN_ENDPOINT_SECRET") {
        config.agent.token_endpoint_secret = Some(secret).filter(|s| !s.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.agent.window_ms, 2_000);
        assert_eq!(config.agent.artifacts_dir, "out/agents");
        assert_eq!(config.pipeline.stt.vendor, "whisper");
    }

    #[test]
    fn file_sections_are_parsed() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [livekit]
            url = "https://voice.example.com"
            api_key = "key"
            api_secret = "secret"

            [pipeline.tts]
            vendor = "none"

            [agent]
            window_ms = 500
            transport = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.livekit.api_key, "key");
        assert_eq!(config.pipeline.tts.vendor, "none");
        assert_eq!(config.agent.settings().media.window, Duration::from_millis(500));
        assert_eq!(config.agent.transport, "memory");
    }

    #[test]
    fn zero_durations_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\nwindow_ms = 0\n").unwrap();

        let err = load_config(Some(path.to_str().unwrap())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("agent.window_ms")));

        let mut config = Config::default();
        assert!(validate(&config).is_ok());
        config.agent.close_timeout_ms = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Invalid(msg)) if msg.contains("close_timeout_ms")));
    }

    #[test]
    fn env_overrides_win() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("LIVEKIT_HTTP_PORT", "7000"),
                ("STT_VENDOR", "whisper-cli"),
                ("OLLAMA_MODEL", "llama3"),
                ("WEBRTC_VENDOR", "memory"),
                ("LIVEKIT_API_SECRET", "s3cret"),
                ("AGENT_TOKEN_ENDPOINT_SECRET", "gate"),
                ("SWITCHBOARD_LOG_JSON", "1"),
            ]),
        );
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.pipeline.stt.vendor, "whisper-cli");
        assert_eq!(config.pipeline.llm.model.as_deref(), Some("llama3"));
        assert_eq!(config.agent.transport, "memory");
        assert_eq!(config.livekit.api_secret, "s3cret");
        assert_eq!(config.agent.token_endpoint_secret.as_deref(), Some("gate"));
        assert!(config.logging.json);
    }

    #[test]
    fn switchboard_port_beats_legacy_port() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[("SWITCHBOARD_PORT", "1234"), ("LIVEKIT_HTTP_PORT", "7000")]),
        );
        assert_eq!(config.server.port, 1234);
    }

    #[test]
    fn secrets_are_redacted() {
        let mut config = Config::default();
        config.livekit.api_secret = "lk-secret".to_string();
        config.agent.token_endpoint_secret = Some("gate-secret".to_string());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("lk-secret"));
        assert!(!debug.contains("gate-secret"));
    }
}
