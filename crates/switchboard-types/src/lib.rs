//! Shared types for the Switchboard call orchestration platform.
//!
//! This crate provides the call and session records that every other crate
//! in the workspace passes around, together with the lifecycle enums and
//! their string codecs. The persisted representation of each enum is its
//! lowercase label (`"new"`, `"active"`, `"ended"`, `"caller"`, `"agent"`),
//! which is also what the HTTP surface returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a persisted label does not map to a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} label: {label}")]
pub struct ParseLabelError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The offending label.
    pub label: String,
}

/// Lifecycle of a call.
///
/// Calls are never deleted; they only move forward to `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    New,
    Active,
    Ended,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl FromStr for CallStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(ParseLabelError {
                kind: "call status",
                label: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one participant's membership in a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    New,
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(ParseLabelError {
                kind: "session status",
                label: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the conversation a session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// The human who initiated the call.
    Caller,
    /// The automated voice agent spawned for the call.
    Agent,
}

impl SessionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Agent => "agent",
        }
    }
}

impl FromStr for SessionRole {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "caller" => Ok(Self::Caller),
            "agent" => Ok(Self::Agent),
            other => Err(ParseLabelError {
                kind: "session role",
                label: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted call.
///
/// The call identifier doubles as the signaling room name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub id: String,
    pub caller_id: String,
    pub status: CallStatus,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: i64,
}

/// A persisted session.
///
/// The access token is deliberately not serialized: it is only handed out
/// through the dedicated token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub call_id: String,
    /// The participant this session belongs to (caller id, or the agent user).
    pub user_id: String,
    pub role: SessionRole,
    pub status: SessionStatus,
    #[serde(skip)]
    pub token: Option<String>,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: i64,
}

/// The user id recorded on agent sessions.
pub const AGENT_USER_ID: &str = "ai-agent";
