use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("LiveKit API error: {0}")]
    LiveKit(#[from] livekit_api::access_token::AccessTokenError),

    #[error("token issuance failed: {0}")]
    TokenIssuance(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("unknown {capability} vendor: {vendor}")]
    UnknownVendor {
        capability: &'static str,
        vendor: String,
    },

    #[error("{0} capability is not configured")]
    PipelineNotConfigured(&'static str),

    #[error("audio payload is empty")]
    EmptyAudio,

    #[error("recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout {
        stage: &'static str,
        after: std::time::Duration,
    },

    #[error("audio artifact error: {0}")]
    Artifact(#[from] std::io::Error),
}
