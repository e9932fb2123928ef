//! AI agent orchestration for Switchboard calls.
//!
//! [`AgentManager`] owns the lifecycle of the single AI agent a call may
//! have: it persists the agent's session and token, registers it in the
//! [`AgentRegistry`] and drives its media session on a background task.
//! [`SignalingEventRouter`] feeds participant and room events from the
//! signaling service into the manager and the call store.

pub mod error;
pub mod events;
pub mod manager;
pub mod registry;
pub mod router;
pub mod store;

pub use error::{AgentError, RegistryError};
pub use events::{EventParseError, SignalingEvent};
pub use manager::{AgentManager, AgentSettings, SpawnedAgent};
pub use registry::{AgentHandle, AgentRef, AgentRegistry, RegistryEntry, Reservation};
pub use router::SignalingEventRouter;
