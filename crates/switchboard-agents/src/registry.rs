//! At-most-one-agent-per-call bookkeeping.

use crate::error::RegistryError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use switchboard_voice::MediaSession;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A live agent: its session, the media session driving it, and the
/// cancellation/task pair that controls its run loop.
#[derive(Debug)]
pub struct AgentHandle {
    pub call_id: String,
    pub session_id: String,
    pub media: Arc<MediaSession>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

/// Read-only view of a registered agent.
#[derive(Debug, Clone)]
pub struct AgentRef {
    pub call_id: String,
    pub session_id: String,
    pub media: Arc<MediaSession>,
}

impl From<&AgentHandle> for AgentRef {
    fn from(handle: &AgentHandle) -> Self {
        Self {
            call_id: handle.call_id.clone(),
            session_id: handle.session_id.clone(),
            media: Arc::clone(&handle.media),
        }
    }
}

/// A registry slot: either a spawn still in flight or a running agent.
#[derive(Debug)]
pub enum RegistryEntry {
    /// Reserved by a spawn that has not finished persisting its session.
    Pending { session_id: String },
    Active(AgentHandle),
}

impl RegistryEntry {
    pub fn session_id(&self) -> &str {
        match self {
            RegistryEntry::Pending { session_id } => session_id,
            RegistryEntry::Active(handle) => &handle.session_id,
        }
    }
}

/// Maps call ids to their single agent.
///
/// Every operation runs under one registry-wide lock, so reservations,
/// activations and removals are linearizable. The lock is never held across
/// an await.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: Mutex<HashMap<String, RegistryEntry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn agents(&self) -> MutexGuard<'_, HashMap<String, RegistryEntry>> {
        // Entries are inserted and removed whole; a panic elsewhere cannot
        // leave one half-written.
        self.agents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the call's slot for `session_id` before any await of a spawn.
    ///
    /// The slot is released when the returned [`Reservation`] is dropped
    /// without being activated.
    pub fn reserve(&self, call_id: &str, session_id: &str) -> Result<Reservation<'_>, RegistryError> {
        let mut agents = self.agents();
        if agents.contains_key(call_id) {
            return Err(RegistryError::AlreadyExists(call_id.to_string()));
        }
        agents.insert(
            call_id.to_string(),
            RegistryEntry::Pending {
                session_id: session_id.to_string(),
            },
        );
        Ok(Reservation {
            registry: self,
            call_id: call_id.to_string(),
            session_id: session_id.to_string(),
            settled: false,
        })
    }

    /// Registers `handle` for its call. Fails without touching the existing
    /// entry if the call already has one.
    pub fn insert(&self, handle: AgentHandle) -> Result<(), RegistryError> {
        let mut agents = self.agents();
        if agents.contains_key(&handle.call_id) {
            return Err(RegistryError::AlreadyExists(handle.call_id));
        }
        agents.insert(handle.call_id.clone(), RegistryEntry::Active(handle));
        Ok(())
    }

    /// Removes whatever occupies the call's slot. Removing a pending entry
    /// revokes the spawn that reserved it.
    pub fn remove(&self, call_id: &str) -> Result<RegistryEntry, RegistryError> {
        self.agents()
            .remove(call_id)
            .ok_or_else(|| RegistryError::NotFound(call_id.to_string()))
    }

    /// Removes the call's running agent only if it still belongs to
    /// `session_id`.
    ///
    /// Lets a finished agent task clean up after itself without evicting a
    /// newer agent spawned for the same call.
    pub fn remove_session(
        &self,
        call_id: &str,
        session_id: &str,
    ) -> Result<AgentHandle, RegistryError> {
        let mut agents = self.agents();
        match agents.get(call_id) {
            Some(RegistryEntry::Active(handle)) if handle.session_id == session_id => {
                match agents.remove(call_id) {
                    Some(RegistryEntry::Active(handle)) => Ok(handle),
                    _ => Err(RegistryError::NotFound(call_id.to_string())),
                }
            }
            _ => Err(RegistryError::NotFound(call_id.to_string())),
        }
    }

    /// Looks up the running agent. Pending spawns are not visible.
    pub fn lookup(&self, call_id: &str) -> Result<AgentRef, RegistryError> {
        match self.agents().get(call_id) {
            Some(RegistryEntry::Active(handle)) => Ok(AgentRef::from(handle)),
            _ => Err(RegistryError::NotFound(call_id.to_string())),
        }
    }

    /// Whether the call's slot is taken, by a running agent or a pending spawn.
    pub fn contains(&self, call_id: &str) -> bool {
        self.agents().contains_key(call_id)
    }

    pub fn call_ids(&self) -> Vec<String> {
        self.agents().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents().is_empty()
    }
}

/// A claimed slot awaiting its [`AgentHandle`].
#[derive(Debug)]
#[must_use]
pub struct Reservation<'a> {
    registry: &'a AgentRegistry,
    call_id: String,
    session_id: String,
    settled: bool,
}

impl Reservation<'_> {
    /// Whether the slot was taken away by a removal since it was reserved.
    pub fn is_revoked(&self) -> bool {
        !matches!(
            self.registry.agents().get(&self.call_id),
            Some(RegistryEntry::Pending { session_id }) if *session_id == self.session_id
        )
    }

    /// Swaps the pending entry for `handle`. Fails with `NotFound`, dropping
    /// `handle`, if the reservation was revoked.
    pub fn activate(mut self, handle: AgentHandle) -> Result<(), RegistryError> {
        self.settled = true;
        let mut agents = self.registry.agents();
        let still_ours = matches!(
            agents.get(&self.call_id),
            Some(RegistryEntry::Pending { session_id }) if *session_id == self.session_id
        );
        if !still_ours {
            return Err(RegistryError::NotFound(self.call_id.clone()));
        }
        agents.insert(self.call_id.clone(), RegistryEntry::Active(handle));
        Ok(())
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut agents = self.registry.agents();
        if matches!(
            agents.get(&self.call_id),
            Some(RegistryEntry::Pending { session_id }) if *session_id == self.session_id
        ) {
            agents.remove(&self.call_id);
        }
    }
}
