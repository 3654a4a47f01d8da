//! Playback session lifecycle
//!
//! Given a selected catalog item, picks the HTTP or peer-swarm engine,
//! tears down whatever was playing before, and folds the engine's
//! asynchronous progress into one UI-visible status. Background work
//! reports through a channel tagged with the session generation, so a
//! result from a superseded session is dropped instead of applied.

mod engine;
mod error;
mod http;
mod manager;
mod selector;
mod status;
mod surface;
mod swarm;

pub use engine::{EngineUpdate, StatusSink, StreamPlayer, SwarmClient, SwarmFile, SwarmId};
pub use error::EngineError;
pub use manager::SessionManager;
pub use selector::{is_peer_swarm, EngineKind, SourceClass, SourceDescriptor, TransportMode};
pub use status::SessionStatus;
pub use surface::{MediaAttachment, PlaybackSurface};

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
