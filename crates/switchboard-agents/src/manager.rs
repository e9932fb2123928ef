//! Agent lifecycle: spawn, run, stop.

use crate::error::AgentError;
use crate::registry::{AgentHandle, AgentRegistry, RegistryEntry};
use crate::store;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchboard_calls::{activate_session, create_session, new_id, update_session_status, NewSession};
use switchboard_db::DbPool;
use switchboard_types::{SessionRole, SessionStatus, AGENT_USER_ID};
use switchboard_voice::{
    AudioPipeline, FileSink, MediaSession, MediaSessionSettings, MediaTransport, PipelineOutcome,
    RoomTarget, RunExit, VoiceError, VoiceService,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub media: MediaSessionSettings,
    /// Where offline replies are written.
    pub artifacts_dir: PathBuf,
    /// How long `stop` waits for the agent task to wind down.
    pub stop_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            media: MediaSessionSettings::default(),
            artifacts_dir: PathBuf::from("out/agents"),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Returned by [`AgentManager::spawn`]. Connection happens afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedAgent {
    pub session_id: String,
    pub token: String,
}

pub struct AgentManager {
    registry: Arc<AgentRegistry>,
    pool: DbPool,
    voice: VoiceService,
    pipeline: Arc<AudioPipeline>,
    transport: Arc<dyn MediaTransport>,
    settings: AgentSettings,
}

impl std::fmt::Debug for AgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentManager")
            .field("active_agents", &self.registry.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

async fn mark_session(pool: &DbPool, session_id: &str, status: SessionStatus) {
    let id = session_id.to_string();
    if let Err(e) = store::blocking(pool, move |conn| update_session_status(conn, &id, status)).await
    {
        tracing::warn!(session_id, %status, error = %e, "failed to update agent session status");
    }
}

impl AgentManager {
    pub fn new(
        pool: DbPool,
        voice: VoiceService,
        pipeline: Arc<AudioPipeline>,
        transport: Arc<dyn MediaTransport>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            registry: Arc::new(AgentRegistry::new()),
            pool,
            voice,
            pipeline,
            transport,
            settings,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn voice(&self) -> &VoiceService {
        &self.voice
    }

    /// Starts an agent for `call_id`.
    ///
    /// The call's registry slot is reserved before anything is persisted, so
    /// a concurrent spawn fails fast and a concurrent [`stop`](Self::stop)
    /// revokes this one. Returns once the agent session is persisted with its
    /// token and the agent is registered. The media connection is established
    /// in the background; if it fails the agent is torn down and its session
    /// marked ended, which callers can observe by polling the session.
    pub async fn spawn(&self, call_id: &str) -> Result<SpawnedAgent, AgentError> {
        let session_id = new_id();
        let reservation = self
            .registry
            .reserve(call_id, &session_id)
            .map_err(|_| AgentError::AgentAlreadyActive(call_id.to_string()))?;

        let new_session = NewSession {
            id: session_id.clone(),
            call_id: call_id.to_string(),
            user_id: AGENT_USER_ID.to_string(),
            role: SessionRole::Agent,
            status: SessionStatus::New,
        };
        store::blocking(&self.pool, move |conn| create_session(conn, &new_session)).await?;

        if reservation.is_revoked() {
            return Err(self.abandon(call_id, &session_id).await);
        }

        let token = match self.voice.issue_agent_token(call_id, &session_id) {
            Ok(token) => token,
            Err(e) => {
                mark_session(&self.pool, &session_id, SessionStatus::Ended).await;
                return Err(AgentError::TokenIssuanceFailed {
                    call_id: call_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let (id, stored) = (session_id.clone(), token.clone());
        if let Err(e) =
            store::blocking(&self.pool, move |conn| activate_session(conn, &id, &stored)).await
        {
            mark_session(&self.pool, &session_id, SessionStatus::Ended).await;
            return Err(e);
        }

        let media = Arc::new(MediaSession::new(
            session_id.clone(),
            RoomTarget {
                url: self.voice.get_url().to_string(),
                token: token.clone(),
                room: call_id.to_string(),
                identity: session_id.clone(),
            },
            Arc::clone(&self.transport),
            Arc::clone(&self.pipeline),
            self.settings.media,
        ));
        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::spawn(drive_agent(
            AgentTask {
                registry: Arc::clone(&self.registry),
                pool: self.pool.clone(),
                media: Arc::clone(&media),
                cancel: cancel.clone(),
                call_id: call_id.to_string(),
                session_id: session_id.clone(),
            },
            ready_rx,
        ));

        let handle = AgentHandle {
            call_id: call_id.to_string(),
            session_id: session_id.clone(),
            media,
            cancel,
            task,
        };
        if reservation.activate(handle).is_err() {
            // The dropped ready sender makes the task exit without connecting.
            return Err(self.abandon(call_id, &session_id).await);
        }
        let _ = ready_tx.send(());

        tracing::info!(call_id, session_id = %session_id, "agent spawned");
        Ok(SpawnedAgent { session_id, token })
    }

    /// Ends the session of a spawn whose reservation was revoked.
    async fn abandon(&self, call_id: &str, session_id: &str) -> AgentError {
        tracing::info!(call_id, session_id, "agent spawn revoked by stop");
        mark_session(&self.pool, session_id, SessionStatus::Ended).await;
        AgentError::SpawnRevoked(call_id.to_string())
    }

    /// Stops the agent for `call_id`.
    ///
    /// A spawn still in flight is revoked; it ends its own session before
    /// returning. Transport teardown is best-effort; the session is marked
    /// ended whether or not it succeeds.
    pub async fn stop(&self, call_id: &str) -> Result<(), AgentError> {
        let handle = match self.registry.remove(call_id) {
            Ok(RegistryEntry::Active(handle)) => handle,
            Ok(RegistryEntry::Pending { session_id }) => {
                tracing::info!(call_id, session_id = %session_id, "revoked pending agent spawn");
                return Ok(());
            }
            Err(_) => return Err(AgentError::NoActiveAgent(call_id.to_string())),
        };

        handle.cancel.cancel();
        handle.media.disconnect().await.log(&handle.session_id);
        mark_session(&self.pool, &handle.session_id, SessionStatus::Ended).await;

        let mut task = handle.task;
        if tokio::time::timeout(self.settings.stop_timeout, &mut task)
            .await
            .is_err()
        {
            tracing::warn!(call_id, session_id = %handle.session_id, "agent task did not exit in time, aborting");
            task.abort();
        }

        tracing::info!(call_id, session_id = %handle.session_id, "agent stopped");
        Ok(())
    }

    /// Stops every registered agent.
    pub async fn shutdown(&self) {
        for call_id in self.registry.call_ids() {
            if let Err(e) = self.stop(&call_id).await {
                tracing::debug!(call_id = %call_id, error = %e, "agent already gone during shutdown");
            }
        }
    }

    /// Runs recorded audio through the pipeline outside any live media
    /// session, writing the synthesized reply to the artifacts directory.
    pub async fn process_incoming_audio(
        &self,
        session_id: &str,
        audio: &[u8],
    ) -> Result<PipelineOutcome, AgentError> {
        if !self.pipeline.has_recognizer() {
            return Err(AgentError::PipelineNotConfigured("recognition"));
        }
        let sink = FileSink::new(&self.settings.artifacts_dir);
        self.pipeline
            .process(session_id, audio, &sink)
            .await
            .map_err(|e| match e {
                VoiceError::PipelineNotConfigured(what) => AgentError::PipelineNotConfigured(what),
                other => AgentError::Voice(other),
            })
    }
}

struct AgentTask {
    registry: Arc<AgentRegistry>,
    pool: DbPool,
    media: Arc<MediaSession>,
    cancel: CancellationToken,
    call_id: String,
    session_id: String,
}

impl AgentTask {
    /// Teardown for agents that end on their own. Only evicts the registry
    /// entry if it still belongs to this session.
    async fn retire(&self) {
        if self
            .registry
            .remove_session(&self.call_id, &self.session_id)
            .is_ok()
        {
            tracing::debug!(call_id = %self.call_id, session_id = %self.session_id, "agent removed from registry");
        }
        mark_session(&self.pool, &self.session_id, SessionStatus::Ended).await;
    }
}

async fn drive_agent(agent: AgentTask, ready: oneshot::Receiver<()>) {
    if ready.await.is_err() {
        return;
    }

    let connected = tokio::select! {
        biased;
        _ = agent.cancel.cancelled() => return,
        result = agent.media.connect() => result,
    };
    if let Err(e) = connected {
        tracing::error!(
            call_id = %agent.call_id,
            session_id = %agent.session_id,
            error = %e,
            "agent failed to connect"
        );
        agent.retire().await;
        return;
    }

    let exit = agent.media.run(&agent.cancel).await;
    agent.media.disconnect().await.log(&agent.session_id);
    match exit {
        RunExit::Cancelled => {
            mark_session(&agent.pool, &agent.session_id, SessionStatus::Ended).await;
        }
        RunExit::TransportLost | RunExit::NotConnected | RunExit::InvalidWindow => {
            tracing::warn!(
                call_id = %agent.call_id,
                session_id = %agent.session_id,
                ?exit,
                "agent media session ended unexpectedly"
            );
            agent.retire().await;
        }
    }
}
