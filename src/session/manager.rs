//! Session manager: owns the one live playback session

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender};

use super::engine::{
    lock_client, EngineEvent, EngineUpdate, Generation, PlaybackEngine, SharedSwarmClient, StatusSink, StreamPlayer,
};
use super::error::SessionError;
use super::http::HttpStreamEngine;
use super::selector::{EngineKind, SourceDescriptor};
use super::status::{SessionStatus, StatusChange};
use super::surface::PlaybackSurface;
use super::swarm::PeerSwarmEngine;
use crate::models::PlaybackRequest;

/// Keep the last N transitions for the UI to drain
const MAX_PENDING_CHANGES: usize = 256;

/// Shown while nothing is selected
pub const IDLE_PROMPT: &str = "Select a title to start watching";

/// Builds a fresh stream player for every HTTP session
pub type StreamPlayerFactory = Box<dyn FnMut() -> Box<dyn StreamPlayer>>;

/// The live session: which engine runs it and for which request
pub struct PlaybackSession {
    pub generation: Generation,
    pub kind: EngineKind,
    pub request: PlaybackRequest,
    engine: Box<dyn PlaybackEngine>,
}

pub struct SessionManager {
    stream_players: StreamPlayerFactory,
    swarm_client: SharedSwarmClient,
    media_extensions: Vec<String>,

    surface: PlaybackSurface,
    session: Option<PlaybackSession>,
    status: SessionStatus,
    generation: Generation,

    event_sender: Sender<EngineEvent>,
    event_receiver: Receiver<EngineEvent>,
    changes: VecDeque<StatusChange>,
}

impl SessionManager {
    pub fn new(stream_players: StreamPlayerFactory, swarm_client: SharedSwarmClient, media_extensions: Vec<String>) -> Self {
        let (event_sender, event_receiver) = channel();
        Self {
            stream_players,
            swarm_client,
            media_extensions,
            surface: PlaybackSurface::new(),
            session: None,
            status: SessionStatus::Idle,
            generation: 0,
            event_sender,
            event_receiver,
            changes: VecDeque::new(),
        }
    }

    /// Replace whatever is playing with `request`.
    ///
    /// The previous session is torn down completely before the new engine is
    /// constructed. Returns the generation of the new session.
    pub fn select(&mut self, request: PlaybackRequest) -> Generation {
        self.teardown();

        let source = SourceDescriptor::from_request(&request);
        let kind = source.engine_kind();
        let mut engine: Box<dyn PlaybackEngine> = match kind {
            EngineKind::HttpStream => Box::new(HttpStreamEngine::new((self.stream_players)())),
            EngineKind::PeerSwarm => Box::new(PeerSwarmEngine::new(
                self.swarm_client.clone(),
                self.media_extensions.clone(),
            )),
        };

        tracing::info!("Session #{} -> {} ({})", self.generation, request.title, kind.label());
        self.set_status(SessionStatus::Connecting);

        let sink = StatusSink::new(self.generation, self.event_sender.clone());
        let attached = engine.attach(&source, sink);

        self.session = Some(PlaybackSession {
            generation: self.generation,
            kind,
            request,
            engine,
        });

        if let Err(e) = attached {
            tracing::error!("Session #{} failed to start: {}", self.generation, e);
            self.fail(SessionError::from(e));
        }

        self.generation
    }

    /// Apply queued engine events. Events from superseded sessions are dropped.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;

        while let Ok(event) = self.event_receiver.try_recv() {
            if event.generation != self.generation || self.session.is_none() {
                tracing::trace!(
                    "Discarding stale {:?} from session #{} (current #{})",
                    event.update,
                    event.generation,
                    self.generation
                );
                continue;
            }

            if event.update == EngineUpdate::Ended {
                tracing::info!("Session #{} ended", self.generation);
                self.teardown();
                applied += 1;
                continue;
            }

            let entered = match self.session.as_mut() {
                Some(session) => session.engine.on_status(event.update, &mut self.surface),
                None => continue,
            };

            for status in entered {
                if !self.status.can_transition_to(&status) {
                    tracing::debug!("Ignoring transition {} -> {}", self.status.name(), status.name());
                    continue;
                }
                match status {
                    SessionStatus::Failed(err) => self.fail(err),
                    other => self.set_status(other),
                }
            }
            applied += 1;
        }

        applied
    }

    /// Release the current session, if any, and return to `Idle`. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::debug!("Tearing down session #{}", session.generation);
            session.engine.dispose(&mut self.surface);
        }

        {
            let mut client = lock_client(&self.swarm_client);
            for swarm in client.active_swarms() {
                tracing::debug!("Destroying leftover swarm #{}", swarm);
                client.destroy(swarm);
            }
        }

        self.surface.clear();

        // Idle belongs to the session being closed; later events need the new number
        if self.status != SessionStatus::Idle {
            self.set_status(SessionStatus::Idle);
        }
        self.generation += 1;
    }

    /// Final teardown when the owning UI goes away. Queued events are dropped.
    pub fn unmount(&mut self) {
        self.teardown();
        while self.event_receiver.try_recv().is_ok() {}
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Single line of progress text, whichever engine is active.
    pub fn status_text(&self) -> String {
        match self.session {
            Some(ref session) => session.engine.status_text(&self.status),
            None => match self.status {
                SessionStatus::Failed(ref err) => format!("Error: {}", err),
                _ => IDLE_PROMPT.to_string(),
            },
        }
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn engine_kind(&self) -> Option<EngineKind> {
        self.session.as_ref().map(|s| s.kind)
    }

    pub fn surface(&self) -> &PlaybackSurface {
        &self.surface
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// True while an engine still owes us a result
    pub fn is_busy(&self) -> bool {
        self.status.is_pending()
    }

    /// True while a session may still send events: from `select` until
    /// teardown or failure.
    pub fn is_active(&self) -> bool {
        self.session.is_some() && !self.status.is_failed()
    }

    /// Status transitions recorded since the previous call, oldest first.
    pub fn drain_changes(&mut self) -> Vec<StatusChange> {
        self.changes.drain(..).collect()
    }

    fn set_status(&mut self, status: SessionStatus) {
        tracing::debug!("Session #{}: {} -> {}", self.generation, self.status.name(), status.name());
        self.status = status.clone();
        if self.changes.len() >= MAX_PENDING_CHANGES {
            self.changes.pop_front();
        }
        self.changes.push_back(StatusChange {
            generation: self.generation,
            status,
        });
    }

    /// Enter `Failed` and drop the engine's resources; the record stays for status text.
    fn fail(&mut self, err: SessionError) {
        tracing::warn!("Session #{} failed: {}", self.generation, err);
        if let Some(ref mut session) = self.session {
            session.engine.dispose(&mut self.surface);
        }
        self.surface.clear();
        self.set_status(SessionStatus::Failed(err));
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.unmount();
    }
}
