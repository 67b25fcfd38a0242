mod context;
mod controller;
mod error;

pub use context::SessionContext;
pub use controller::SessionController;
pub use error::SessionError;

use crate::report::SessionReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of one session:
/// `Idle -> RequestingDevices -> Ready -> Recording -> Analyzing -> Reported`, with `Error`
/// reachable while devices are requested. `Reported` and `Error` wait for an explicit reset.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    Idle,
    RequestingDevices,
    Ready,
    Recording,
    Analyzing,
    Reported(Arc<SessionReport>),
    Error(SessionError),
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::RequestingDevices => SessionPhase::RequestingDevices,
            SessionState::Ready => SessionPhase::Ready,
            SessionState::Recording => SessionPhase::Recording,
            SessionState::Analyzing => SessionPhase::Analyzing,
            SessionState::Reported(_) => SessionPhase::Reported,
            SessionState::Error(_) => SessionPhase::Error,
        }
    }
}

/// [`SessionState`] without its payload.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    RequestingDevices,
    Ready,
    Recording,
    Analyzing,
    Reported,
    Error,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::RequestingDevices => "requesting devices",
            SessionPhase::Ready => "ready",
            SessionPhase::Recording => "recording",
            SessionPhase::Analyzing => "analyzing",
            SessionPhase::Reported => "reported",
            SessionPhase::Error => "error",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
