//! Translates signaling events into status updates and agent lifecycle calls.

use crate::error::AgentError;
use crate::events::SignalingEvent;
use crate::manager::AgentManager;
use crate::store;
use std::sync::Arc;
use switchboard_calls::{
    find_session_by_identity, update_call_status, update_session_status, CallStoreError,
};
use switchboard_db::DbPool;
use switchboard_types::{CallStatus, Session, SessionRole, SessionStatus};

/// Stateless dispatcher over [`SignalingEvent`]s.
///
/// Events about unknown sessions or calls are logged and dropped, and
/// lifecycle conflicts (a second spawn, a stop with no agent) are logged.
/// Only store failures are returned.
#[derive(Debug, Clone)]
pub struct SignalingEventRouter {
    pool: DbPool,
    agents: Arc<AgentManager>,
}

impl SignalingEventRouter {
    pub fn new(pool: DbPool, agents: Arc<AgentManager>) -> Self {
        Self { pool, agents }
    }

    pub async fn dispatch(&self, event: SignalingEvent) -> Result<(), AgentError> {
        match event {
            SignalingEvent::ParticipantJoined { identity } => self.participant_joined(&identity).await,
            SignalingEvent::ParticipantLeft { identity } => self.participant_left(&identity).await,
            SignalingEvent::RoomEnded { room } => self.room_ended(&room).await,
            SignalingEvent::Ignored { kind } => {
                tracing::debug!(kind = %kind, "ignoring signaling event");
                Ok(())
            }
        }
    }

    /// Sets the session's status and returns the updated record, or `None`
    /// if no session has this identity.
    async fn transition_session(
        &self,
        identity: &str,
        status: SessionStatus,
    ) -> Result<Option<Session>, AgentError> {
        let id = identity.to_string();
        let result = store::blocking(&self.pool, move |conn| {
            update_session_status(conn, &id, status)?;
            find_session_by_identity(conn, &id)
        })
        .await;
        match result {
            Ok(session) => Ok(Some(session)),
            Err(AgentError::Store(CallStoreError::SessionNotFound(_))) => {
                tracing::info!(identity, "signaling event for unknown participant");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn set_call_status(&self, call_id: &str, status: CallStatus) -> Result<(), AgentError> {
        let id = call_id.to_string();
        match store::blocking(&self.pool, move |conn| update_call_status(conn, &id, status)).await {
            Err(AgentError::Store(CallStoreError::CallNotFound(_))) => {
                tracing::info!(call_id, "signaling event for unknown call");
                Ok(())
            }
            other => other,
        }
    }

    async fn participant_joined(&self, identity: &str) -> Result<(), AgentError> {
        let Some(session) = self.transition_session(identity, SessionStatus::Active).await? else {
            return Ok(());
        };
        self.set_call_status(&session.call_id, CallStatus::Active).await?;

        if session.role != SessionRole::Caller {
            return Ok(());
        }
        match self.agents.spawn(&session.call_id).await {
            Ok(agent) => {
                tracing::info!(
                    call_id = %session.call_id,
                    agent_session_id = %agent.session_id,
                    token_len = agent.token.len(),
                    "agent spawned for caller"
                );
            }
            Err(e) if e.is_conflict() => {
                tracing::info!(call_id = %session.call_id, error = %e, "agent already running");
            }
            Err(e) => {
                tracing::warn!(call_id = %session.call_id, error = %e, "failed to spawn agent");
            }
        }
        Ok(())
    }

    async fn participant_left(&self, identity: &str) -> Result<(), AgentError> {
        let Some(session) = self.transition_session(identity, SessionStatus::Ended).await? else {
            return Ok(());
        };
        if session.role != SessionRole::Caller {
            return Ok(());
        }
        self.stop_agent(&session.call_id).await;
        self.set_call_status(&session.call_id, CallStatus::Ended).await
    }

    async fn room_ended(&self, room: &str) -> Result<(), AgentError> {
        self.set_call_status(room, CallStatus::Ended).await?;
        self.stop_agent(room).await;
        tracing::info!(call_id = room, "room ended");
        Ok(())
    }

    async fn stop_agent(&self, call_id: &str) {
        match self.agents.stop(call_id).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                tracing::debug!(call_id, "no agent to stop");
            }
            Err(e) => tracing::warn!(call_id, error = %e, "failed to stop agent"),
        }
    }
}
