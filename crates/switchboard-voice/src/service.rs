use crate::config::LiveKitConfig;
use crate::error::VoiceError;
use livekit_api::access_token::{AccessToken, VideoGrants};
use std::time::Duration;

/// Issues signaling access tokens scoped to one room and one participant.
#[derive(Debug, Clone)]
pub struct VoiceService {
    config: LiveKitConfig,
}

impl VoiceService {
    pub fn new(config: LiveKitConfig) -> Self {
        Self { config }
    }

    /// Whether a signaling endpoint is configured. Agents can only be
    /// spawned when it is.
    pub fn is_enabled(&self) -> bool {
        !self.config.url.is_empty()
    }

    pub fn get_url(&self) -> &str {
        &self.config.url
    }

    pub fn api_key(&self) -> &str {
        &self.config.api_key
    }

    /// The shared secret that signs tokens and webhook bodies.
    pub fn api_secret(&self) -> &str {
        &self.config.api_secret
    }

    /// Signs a join token for `participant_identity` in `room_name`.
    pub fn generate_join_token(
        &self,
        room_name: &str,
        participant_identity: &str,
        participant_name: &str,
    ) -> Result<String, VoiceError> {
        if self.config.api_key.is_empty() || self.config.api_secret.is_empty() {
            return Err(VoiceError::TokenIssuance(
                "livekit api key/secret required".to_string(),
            ));
        }

        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(participant_identity)
            .with_name(participant_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(Duration::from_secs(self.config.token_ttl_seconds));

        token.to_jwt().map_err(VoiceError::LiveKit)
    }

    /// Like [`generate_join_token`](Self::generate_join_token), but also
    /// requires a configured signaling endpoint, since the holder of the
    /// token is about to connect to it.
    pub fn issue_agent_token(&self, room_name: &str, identity: &str) -> Result<String, VoiceError> {
        if !self.is_enabled() {
            return Err(VoiceError::TokenIssuance(
                "livekit url not configured".to_string(),
            ));
        }
        self.generate_join_token(room_name, identity, identity)
    }
}
