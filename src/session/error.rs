//! Error types for playback sessions

use super::engine::SwarmId;

/// Failure raised by a playback engine or one of its collaborators
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown swarm #{0}")]
    UnknownSwarm(SwarmId),

    #[error("{0}")]
    Message(String),
}

/// Why a session ended up in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The engine could not reach its source (player launch, network, peers).
    #[error("{0}")]
    Connection(String),

    /// Swarm metadata resolved but listed no recognised media file.
    #[error("no playable file in swarm")]
    NoPlayableFile,
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        SessionError::Connection(err.to_string())
    }
}
