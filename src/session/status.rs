//! UI-visible session status

use super::error::SessionError;
use super::engine::Generation;

/// Session state shown to the UI
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Connecting,
    Resolving,
    Ready,
    Playing,
    Failed(SessionError),
}

impl SessionStatus {
    /// Transitions an engine event may cause. Supersession and teardown
    /// (`* -> Connecting`, `* -> Idle`) are driven by the manager directly.
    pub fn can_transition_to(&self, next: &SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Connecting, Ready)
                | (Connecting, Resolving)
                | (Connecting, Failed(_))
                | (Resolving, Ready)
                | (Resolving, Failed(_))
                | (Ready, Playing)
                | (Ready, Failed(_))
                | (Playing, Failed(_))
        )
    }

    /// Waiting on an engine to report back
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::Resolving)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionStatus::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Connecting => "Connecting",
            SessionStatus::Resolving => "Resolving",
            SessionStatus::Ready => "Ready",
            SessionStatus::Playing => "Playing",
            SessionStatus::Failed(_) => "Failed",
        }
    }
}

/// One recorded status transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub generation: Generation,
    pub status: SessionStatus,
}
