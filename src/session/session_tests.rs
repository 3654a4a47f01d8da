//! Tests for the playback session lifecycle

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use super::engine::{
    EngineUpdate, Generation, SharedSwarmClient, StatusSink, StreamPlayer, SwarmClient, SwarmFile, SwarmId,
};
use super::error::{EngineError, SessionError};
use super::manager::{SessionManager, StreamPlayerFactory, IDLE_PROMPT};
use super::selector::{EngineKind, SourceDescriptor, ADAPTIVE_MIME_TYPE, PROGRESSIVE_MIME_TYPE};
use super::status::SessionStatus;
use super::surface::{MediaAttachment, PlaybackSurface};
use super::swarm::PeerSwarmEngine;
use crate::models::PlaybackRequest;

#[derive(Default)]
struct PlayerLog {
    constructed: Vec<SourceDescriptor>,
    sinks: Vec<StatusSink>,
    disposed: usize,
    live: usize,
}

struct FakePlayer {
    log: Rc<RefCell<PlayerLog>>,
    fail_with: Option<String>,
    disposed: bool,
    constructed: bool,
}

impl StreamPlayer for FakePlayer {
    fn construct(&mut self, source: &SourceDescriptor, sink: StatusSink) -> Result<(), EngineError> {
        if let Some(ref message) = self.fail_with {
            return Err(EngineError::Message(message.clone()));
        }
        let mut log = self.log.borrow_mut();
        log.constructed.push(source.clone());
        log.sinks.push(sink);
        log.live += 1;
        self.constructed = true;
        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        let mut log = self.log.borrow_mut();
        log.disposed += 1;
        if self.constructed {
            log.live -= 1;
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[derive(Default)]
struct FakeSwarmClient {
    next_id: SwarmId,
    active: Vec<SwarmId>,
    sinks: HashMap<SwarmId, StatusSink>,
    destroyed: Vec<SwarmId>,
    rendered: Vec<(SwarmId, String)>,
}

impl FakeSwarmClient {
    fn sink(&self, swarm: SwarmId) -> StatusSink {
        self.sinks[&swarm].clone()
    }
}

impl SwarmClient for FakeSwarmClient {
    fn add(&mut self, _swarm_uri: &str, sink: StatusSink) -> Result<SwarmId, EngineError> {
        self.next_id += 1;
        self.active.push(self.next_id);
        self.sinks.insert(self.next_id, sink);
        Ok(self.next_id)
    }

    fn render_into(
        &mut self,
        swarm: SwarmId,
        file: &SwarmFile,
        surface: &mut PlaybackSurface,
        autoplay: bool,
    ) -> Result<(), EngineError> {
        if !self.active.contains(&swarm) {
            return Err(EngineError::UnknownSwarm(swarm));
        }
        self.rendered.push((swarm, file.name.clone()));
        surface.attach(MediaAttachment {
            engine: EngineKind::PeerSwarm,
            locator: format!("http://localhost:8000/{}", file.index),
            title: file.name.clone(),
            mime_type: None,
            poster_url: None,
            autoplay,
        });
        Ok(())
    }

    fn active_swarms(&self) -> Vec<SwarmId> {
        self.active.clone()
    }

    fn destroy(&mut self, swarm: SwarmId) {
        if let Some(pos) = self.active.iter().position(|id| *id == swarm) {
            self.active.remove(pos);
            self.destroyed.push(swarm);
        }
    }
}

struct Harness {
    manager: SessionManager,
    players: Rc<RefCell<PlayerLog>>,
    fail_next: Rc<RefCell<Option<String>>>,
    client: Arc<Mutex<FakeSwarmClient>>,
}

impl Harness {
    fn new() -> Self {
        let players = Rc::new(RefCell::new(PlayerLog::default()));
        let fail_next: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
        let client = Arc::new(Mutex::new(FakeSwarmClient::default()));
        let shared: SharedSwarmClient = client.clone();

        let log = Rc::clone(&players);
        let fail = Rc::clone(&fail_next);
        let factory: StreamPlayerFactory = Box::new(move || {
            Box::new(FakePlayer {
                log: Rc::clone(&log),
                fail_with: fail.borrow_mut().take(),
                disposed: false,
                constructed: false,
            }) as Box<dyn StreamPlayer>
        });

        let extensions = vec!["mp4".to_string(), "webm".to_string(), "mkv".to_string()];
        Self {
            manager: SessionManager::new(factory, shared, extensions),
            players,
            fail_next,
            client,
        }
    }

    fn last_player_sink(&self) -> StatusSink {
        self.players.borrow().sinks.last().cloned().unwrap()
    }

    fn swarm_sink(&self, swarm: SwarmId) -> StatusSink {
        self.client.lock().unwrap().sink(swarm)
    }

    fn statuses(&mut self) -> Vec<SessionStatus> {
        self.manager.drain_changes().into_iter().map(|c| c.status).collect()
    }
}

fn request(url: &str) -> PlaybackRequest {
    PlaybackRequest {
        url: url.to_string(),
        poster_url: Some("https://x/poster.png".to_string()),
        title: "Test".to_string(),
        autoplay: true,
    }
}

fn files(names: &[&str]) -> Vec<SwarmFile> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| SwarmFile {
            index,
            name: name.to_string(),
            length: None,
        })
        .collect()
}

#[test]
fn test_hls_entry_reaches_ready() {
    let mut h = Harness::new();
    assert_eq!(h.manager.status(), &SessionStatus::Idle);

    h.manager.select(request("https://x/y.m3u8"));
    assert_eq!(h.manager.engine_kind(), Some(EngineKind::HttpStream));
    assert_eq!(h.players.borrow().constructed[0].mime_type(), Some(ADAPTIVE_MIME_TYPE));
    assert_eq!(h.manager.status_text(), "Connecting to stream...");

    h.last_player_sink().send(EngineUpdate::Ready);
    assert_eq!(h.manager.poll(), 1);

    assert_eq!(h.statuses(), vec![SessionStatus::Connecting, SessionStatus::Ready]);
    let attached = h.manager.surface().attached().unwrap();
    assert_eq!(attached.engine, EngineKind::HttpStream);
    assert_eq!(attached.locator, "https://x/y.m3u8");
    assert_eq!(attached.mime_type, Some(ADAPTIVE_MIME_TYPE));
}

#[test]
fn test_swarm_streams_first_playable_file() {
    let mut h = Harness::new();
    h.manager.select(request("magnet:?xt=urn:btih:abc"));
    assert_eq!(h.manager.status_text(), "Connecting to peers...");

    h.swarm_sink(1).send(EngineUpdate::MetadataResolved {
        swarm: 1,
        files: files(&["a.srt", "b.mkv"]),
    });
    h.manager.poll();

    assert_eq!(
        h.statuses(),
        vec![SessionStatus::Connecting, SessionStatus::Resolving, SessionStatus::Ready]
    );
    assert_eq!(h.client.lock().unwrap().rendered, vec![(1, "b.mkv".to_string())]);
    assert_eq!(h.manager.status_text(), "Streaming: b.mkv");
    assert_eq!(h.manager.surface().attached().unwrap().engine, EngineKind::PeerSwarm);
}

#[test]
fn test_first_match_wins_in_listed_order() {
    let listed = files(&["extras.webm", "movie.mkv", "movie.mp4"]);
    let exts = vec!["mp4".to_string(), "mkv".to_string(), "webm".to_string()];
    let picked = PeerSwarmEngine::pick_file(&listed, &exts).unwrap();
    assert_eq!(picked.name, "extras.webm");
}

#[test]
fn test_swarm_without_media_fails() {
    let mut h = Harness::new();
    h.manager.select(request("magnet:?xt=urn:btih:abc"));

    h.swarm_sink(1).send(EngineUpdate::MetadataResolved {
        swarm: 1,
        files: files(&["a.srt"]),
    });
    h.manager.poll();

    assert_eq!(
        h.statuses(),
        vec![
            SessionStatus::Connecting,
            SessionStatus::Resolving,
            SessionStatus::Failed(SessionError::NoPlayableFile),
        ]
    );
    assert_eq!(h.manager.status_text(), "No playable video file found in torrent.");
    assert!(h.manager.surface().is_empty());
    assert!(h.client.lock().unwrap().active.is_empty());
}

#[test]
fn test_superseded_session_callbacks_are_discarded() {
    let mut h = Harness::new();
    let first = h.manager.select(request("https://x/first.m3u8"));
    let stale = h.last_player_sink();

    let second = h.manager.select(request("magnet:?xt=urn:btih:second"));
    assert!(second > first);
    h.manager.drain_changes();

    stale.send(EngineUpdate::Ready);
    stale.send(EngineUpdate::Error("late failure".to_string()));
    assert_eq!(h.manager.poll(), 0);
    assert_eq!(h.manager.status(), &SessionStatus::Connecting);
    assert!(h.manager.surface().is_empty());

    h.swarm_sink(1).send(EngineUpdate::MetadataResolved {
        swarm: 1,
        files: files(&["b.mp4"]),
    });
    stale.send(EngineUpdate::PlaybackStarted);
    h.manager.poll();

    let changes = h.manager.drain_changes();
    assert!(changes.iter().all(|c| c.generation == second));
    assert_eq!(h.manager.status(), &SessionStatus::Ready);
    assert_eq!(h.players.borrow().disposed, 1);
}

#[test]
fn test_switching_never_leaves_two_engines_attached() {
    let mut h = Harness::new();

    h.manager.select(request("https://x/live.m3u8"));
    h.last_player_sink().send(EngineUpdate::Ready);
    h.manager.poll();
    assert_eq!(h.players.borrow().live, 1);

    h.manager.select(request("magnet:?xt=urn:btih:abc"));
    assert_eq!(h.players.borrow().live, 0);
    assert!(h.manager.surface().is_empty());

    h.swarm_sink(1).send(EngineUpdate::MetadataResolved {
        swarm: 1,
        files: files(&["movie.mp4"]),
    });
    h.manager.poll();
    assert_eq!(h.manager.surface().attached().unwrap().engine, EngineKind::PeerSwarm);

    h.manager.select(request("https://x/movie.mp4"));
    {
        let client = h.client.lock().unwrap();
        assert!(client.active.is_empty());
        assert_eq!(client.destroyed, vec![1]);
    }
    assert!(h.manager.surface().is_empty());

    h.last_player_sink().send(EngineUpdate::Ready);
    h.manager.poll();
    assert_eq!(h.players.borrow().live, 1);
    assert_eq!(h.manager.surface().attached().unwrap().mime_type, Some(PROGRESSIVE_MIME_TYPE));
}

#[test]
fn test_teardown_is_idempotent() {
    let mut h = Harness::new();
    h.manager.teardown();
    h.manager.teardown();
    assert_eq!(h.manager.status(), &SessionStatus::Idle);

    h.manager.select(request("https://x/y.m3u8"));
    h.manager.teardown();
    h.manager.teardown();
    assert_eq!(h.manager.status(), &SessionStatus::Idle);
    assert!(h.manager.session().is_none());
    assert_eq!(h.players.borrow().disposed, 1);
    assert_eq!(h.manager.status_text(), IDLE_PROMPT);
}

#[test]
fn test_unmount_stops_callbacks() {
    let mut h = Harness::new();
    h.manager.select(request("https://x/y.m3u8"));
    let sink = h.last_player_sink();

    h.manager.unmount();
    sink.send(EngineUpdate::Ready);
    assert_eq!(h.manager.poll(), 0);
    assert_eq!(h.manager.status(), &SessionStatus::Idle);
    assert!(h.manager.surface().is_empty());
}

#[test]
fn test_engine_error_is_terminal() {
    let mut h = Harness::new();
    h.manager.select(request("https://x/y.mp4"));
    let sink = h.last_player_sink();
    sink.send(EngineUpdate::Ready);
    sink.send(EngineUpdate::Error("HTTP 404".to_string()));
    sink.send(EngineUpdate::PlaybackStarted);
    h.manager.poll();

    assert_eq!(
        h.manager.status(),
        &SessionStatus::Failed(SessionError::Connection("HTTP 404".to_string()))
    );
    assert_eq!(h.manager.status_text(), "Error: HTTP 404");
    assert!(h.manager.surface().is_empty());
    assert_eq!(h.players.borrow().live, 0);
}

#[test]
fn test_construct_failure_fails_immediately() {
    let mut h = Harness::new();
    *h.fail_next.borrow_mut() = Some("player not found".to_string());
    h.manager.select(request("https://x/y.mp4"));

    assert_eq!(
        h.statuses(),
        vec![
            SessionStatus::Connecting,
            SessionStatus::Failed(SessionError::Connection("player not found".to_string())),
        ]
    );
}

#[test]
fn test_playback_start_and_end() {
    let mut h = Harness::new();
    h.manager.select(request("https://x/y.mp4"));
    let sink = h.last_player_sink();
    sink.send(EngineUpdate::Ready);
    sink.send(EngineUpdate::PlaybackStarted);
    h.manager.poll();
    assert_eq!(h.manager.status(), &SessionStatus::Playing);
    assert_eq!(h.manager.status_text(), "Playing: Test");

    sink.send(EngineUpdate::Ended);
    h.manager.poll();
    assert_eq!(h.manager.status(), &SessionStatus::Idle);
    assert!(h.manager.session().is_none());
    assert_eq!(h.players.borrow().live, 0);
}

#[test]
fn test_reselecting_same_item_restarts() {
    let mut h = Harness::new();
    h.manager.select(request("https://x/y.mp4"));
    h.last_player_sink().send(EngineUpdate::Error("unreachable".to_string()));
    h.manager.poll();
    assert!(h.manager.status().is_failed());
    h.manager.drain_changes();

    h.manager.select(request("https://x/y.mp4"));
    assert_eq!(h.statuses(), vec![SessionStatus::Idle, SessionStatus::Connecting]);
    assert_eq!(h.players.borrow().constructed.len(), 2);
}

#[test]
fn test_teardown_destroys_orphan_swarms() {
    let mut h = Harness::new();
    {
        let stray = StatusSink::new(0, std::sync::mpsc::channel().0);
        h.client.lock().unwrap().add("magnet:?xt=urn:btih:stray", stray).unwrap();
    }
    h.manager.select(request("https://x/y.mp4"));
    assert!(h.client.lock().unwrap().active.is_empty());
}

#[test]
fn test_metadata_for_other_swarm_is_ignored() {
    let mut h = Harness::new();
    h.manager.select(request("magnet:?xt=urn:btih:abc"));
    h.swarm_sink(1).send(EngineUpdate::MetadataResolved {
        swarm: 7,
        files: files(&["b.mkv"]),
    });
    h.manager.poll();
    assert_eq!(h.manager.status(), &SessionStatus::Connecting);
}

#[test]
fn test_repeated_metadata_does_not_render_again() {
    let mut h = Harness::new();
    h.manager.select(request("magnet:?xt=urn:btih:abc"));
    let sink = h.swarm_sink(1);
    sink.send(EngineUpdate::MetadataResolved {
        swarm: 1,
        files: files(&["a.srt", "b.mkv"]),
    });
    sink.send(EngineUpdate::MetadataResolved {
        swarm: 1,
        files: files(&["c.mp4"]),
    });
    h.manager.poll();

    assert_eq!(h.manager.status(), &SessionStatus::Ready);
    assert_eq!(h.client.lock().unwrap().rendered, vec![(1, "b.mkv".to_string())]);
    assert_eq!(h.manager.surface().attached().unwrap().title, "b.mkv");
    assert_eq!(h.manager.status_text(), "Streaming: b.mkv");
}

#[test]
fn test_idle_is_recorded_under_closing_session() {
    let mut h = Harness::new();
    let first = h.manager.select(request("https://x/y.mp4"));
    let second = h.manager.select(request("https://x/z.mp4"));
    assert_eq!(second, first + 1);

    let changes = h.manager.drain_changes();
    let labelled: Vec<(Generation, SessionStatus)> = changes.into_iter().map(|c| (c.generation, c.status)).collect();
    assert_eq!(
        labelled,
        vec![
            (first, SessionStatus::Connecting),
            (first, SessionStatus::Idle),
            (second, SessionStatus::Connecting),
        ]
    );

    h.manager.teardown();
    let closing = h.manager.drain_changes();
    assert_eq!(closing.len(), 1);
    assert_eq!(closing[0].generation, second);
    assert_eq!(h.manager.generation(), second + 1);
}

#[test]
fn test_session_stays_active_after_ready() {
    let mut h = Harness::new();
    assert!(!h.manager.is_active());

    h.manager.select(request("https://x/y.mp4"));
    assert!(h.manager.is_busy());
    assert!(h.manager.is_active());

    let sink = h.last_player_sink();
    sink.send(EngineUpdate::Ready);
    h.manager.poll();
    // Start and exit are still to come
    assert!(!h.manager.is_busy());
    assert!(h.manager.is_active());

    sink.send(EngineUpdate::Error("exit status: 1".to_string()));
    h.manager.poll();
    assert!(!h.manager.is_active());

    h.manager.select(request("https://x/z.mp4"));
    h.manager.teardown();
    assert!(!h.manager.is_active());
}

#[test]
fn test_swarm_viewer_events_follow_stream() {
    let mut h = Harness::new();
    h.manager.select(request("magnet:?xt=urn:btih:abc"));
    let sink = h.swarm_sink(1);
    sink.send(EngineUpdate::MetadataResolved {
        swarm: 1,
        files: files(&["b.mkv"]),
    });
    // Viewer comes up, then the stream and the viewer both report playback
    sink.send(EngineUpdate::Ready);
    sink.send(EngineUpdate::PlaybackStarted);
    sink.send(EngineUpdate::PlaybackStarted);
    h.manager.poll();

    assert_eq!(
        h.statuses(),
        vec![
            SessionStatus::Connecting,
            SessionStatus::Resolving,
            SessionStatus::Ready,
            SessionStatus::Playing,
        ]
    );
    assert_eq!(h.manager.status_text(), "Streaming: b.mkv");

    // Closing the viewer ends the session and the swarm with it
    sink.send(EngineUpdate::Ended);
    h.manager.poll();
    assert_eq!(h.manager.status(), &SessionStatus::Idle);
    assert!(h.client.lock().unwrap().active_swarms().is_empty());
    assert!(h.manager.surface().is_empty());
}
