//! Playback engine capability and the collaborator contracts behind it

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::EngineError;
use super::selector::{EngineKind, SourceDescriptor};
use super::status::SessionStatus;
use super::surface::PlaybackSurface;

/// Session counter used to tell current results from superseded ones
pub type Generation = u64;

/// Identifier a swarm client hands out for each added swarm
pub type SwarmId = u64;

/// One file listed in a resolved swarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmFile {
    pub index: usize,
    pub name: String,
    pub length: Option<u64>,
}

/// Raw notification from a running engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    /// The stream player has its surface up.
    Ready,
    /// Swarm metadata arrived with the ordered file list.
    MetadataResolved { swarm: SwarmId, files: Vec<SwarmFile> },
    /// Bytes are flowing into the viewer.
    PlaybackStarted,
    /// The viewer closed without error.
    Ended,
    Error(String),
}

/// An update tagged with the generation of the session that started the work
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub generation: Generation,
    pub update: EngineUpdate,
}

/// Handed to engines so background work can report back to the UI thread
#[derive(Debug, Clone)]
pub struct StatusSink {
    generation: Generation,
    sender: Sender<EngineEvent>,
}

impl StatusSink {
    pub fn new(generation: Generation, sender: Sender<EngineEvent>) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Best-effort send. Returns false once the manager is gone.
    pub fn send(&self, update: EngineUpdate) -> bool {
        self.sender
            .send(EngineEvent {
                generation: self.generation,
                update,
            })
            .is_ok()
    }
}

/// Uniform surface the session manager drives, whatever the engine.
pub trait PlaybackEngine {
    fn kind(&self) -> EngineKind;

    /// Start playing `source`. Progress arrives later through `sink`.
    fn attach(&mut self, source: &SourceDescriptor, sink: StatusSink) -> Result<(), EngineError>;

    /// Fold one engine update into the statuses it enters, in order.
    fn on_status(&mut self, update: EngineUpdate, surface: &mut PlaybackSurface) -> Vec<SessionStatus>;

    /// One line of progress text for `status`.
    fn status_text(&self, status: &SessionStatus) -> String;

    /// Release everything the engine holds. Must be idempotent.
    fn dispose(&mut self, surface: &mut PlaybackSurface);
}

/// Adaptive HTTP media player collaborator
pub trait StreamPlayer {
    /// Start loading `source`. `EngineUpdate::Ready` is sent at most once on success;
    /// later failures arrive as `EngineUpdate::Error`.
    fn construct(&mut self, source: &SourceDescriptor, sink: StatusSink) -> Result<(), EngineError>;

    /// Release the playback surface. No-op when already disposed.
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}

/// Peer-to-peer content client collaborator
pub trait SwarmClient: Send {
    /// Begin resolving swarm metadata; the file list arrives as
    /// `EngineUpdate::MetadataResolved` through `sink`.
    fn add(&mut self, swarm_uri: &str, sink: StatusSink) -> Result<SwarmId, EngineError>;

    /// Stream `file` of `swarm` into the playback surface.
    fn render_into(
        &mut self,
        swarm: SwarmId,
        file: &SwarmFile,
        surface: &mut PlaybackSurface,
        autoplay: bool,
    ) -> Result<(), EngineError>;

    fn active_swarms(&self) -> Vec<SwarmId>;

    /// Stop the swarm and release its network resources. Unknown ids are ignored.
    fn destroy(&mut self, swarm: SwarmId);
}

/// Swarm client owned by the application root and shared with the manager
pub type SharedSwarmClient = Arc<Mutex<dyn SwarmClient>>;

/// Lock the shared client, recovering from a poisoned mutex.
pub fn lock_client<'a>(client: &'a SharedSwarmClient) -> MutexGuard<'a, dyn SwarmClient + 'static> {
    client.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared mapping of an engine error update into a terminal status
pub(crate) fn failed(message: String) -> SessionStatus {
    SessionStatus::Failed(super::error::SessionError::Connection(message))
}
