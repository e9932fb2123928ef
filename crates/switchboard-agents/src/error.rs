use switchboard_calls::CallStoreError;
use switchboard_voice::VoiceError;
use thiserror::Error;

/// Errors from [`AgentRegistry`](crate::AgentRegistry) operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("an agent is already registered for call {0}")]
    AlreadyExists(String),
    #[error("no agent registered for call {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("an agent is already active for call {0}")]
    AgentAlreadyActive(String),

    #[error("no active agent for call {0}")]
    NoActiveAgent(String),

    #[error("agent spawn for call {0} was revoked by a stop")]
    SpawnRevoked(String),

    #[error("token issuance failed for call {call_id}: {reason}")]
    TokenIssuanceFailed { call_id: String, reason: String },

    #[error("{0} capability is not configured")]
    PipelineNotConfigured(&'static str),

    #[error("store error: {0}")]
    Store(#[from] CallStoreError),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("voice error: {0}")]
    Voice(#[from] VoiceError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AgentError {
    /// Whether the error only reports conflicting lifecycle state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AgentError::AgentAlreadyActive(_)
                | AgentError::NoActiveAgent(_)
                | AgentError::SpawnRevoked(_)
        )
    }
}
