//! Peer swarm engine: resolves a swarm to its first playable file and streams it

use super::engine::{
    failed, lock_client, EngineUpdate, PlaybackEngine, SharedSwarmClient, StatusSink, SwarmFile, SwarmId,
};
use super::error::{EngineError, SessionError};
use super::selector::{has_media_extension, EngineKind, SourceDescriptor};
use super::status::SessionStatus;
use super::surface::PlaybackSurface;

pub struct PeerSwarmEngine {
    client: SharedSwarmClient,
    media_extensions: Vec<String>,
    swarm: Option<SwarmId>,
    selected: Option<SwarmFile>,
    autoplay: bool,
}

impl PeerSwarmEngine {
    pub fn new(client: SharedSwarmClient, media_extensions: Vec<String>) -> Self {
        Self {
            client,
            media_extensions,
            swarm: None,
            selected: None,
            autoplay: true,
        }
    }

    pub fn selected_file(&self) -> Option<&SwarmFile> {
        self.selected.as_ref()
    }

    /// First file, in listed order, whose name carries a recognised media extension.
    pub fn pick_file<'a>(files: &'a [SwarmFile], extensions: &[String]) -> Option<&'a SwarmFile> {
        files.iter().find(|f| has_media_extension(&f.name, extensions))
    }

    fn resolve(&mut self, swarm: SwarmId, files: Vec<SwarmFile>, surface: &mut PlaybackSurface) -> Vec<SessionStatus> {
        let mut entered = vec![SessionStatus::Resolving];

        let Some(file) = Self::pick_file(&files, &self.media_extensions).cloned() else {
            tracing::warn!("Swarm #{} lists {} files, none playable", swarm, files.len());
            entered.push(SessionStatus::Failed(SessionError::NoPlayableFile));
            return entered;
        };

        tracing::info!("Swarm #{} streaming file {}: {}", swarm, file.index, file.name);
        let rendered = lock_client(&self.client).render_into(swarm, &file, surface, self.autoplay);
        match rendered {
            Ok(()) => {
                self.selected = Some(file);
                entered.push(SessionStatus::Ready);
            }
            Err(e) => entered.push(failed(e.to_string())),
        }
        entered
    }
}

impl PlaybackEngine for PeerSwarmEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::PeerSwarm
    }

    fn attach(&mut self, source: &SourceDescriptor, sink: StatusSink) -> Result<(), EngineError> {
        tracing::info!("Adding swarm {}", source.url);
        self.autoplay = source.autoplay;
        let id = lock_client(&self.client).add(&source.url, sink)?;
        self.swarm = Some(id);
        Ok(())
    }

    fn on_status(&mut self, update: EngineUpdate, surface: &mut PlaybackSurface) -> Vec<SessionStatus> {
        match update {
            EngineUpdate::MetadataResolved { swarm, files } => {
                if self.swarm != Some(swarm) {
                    tracing::debug!("Ignoring metadata for foreign swarm #{}", swarm);
                    return Vec::new();
                }
                if let Some(ref file) = self.selected {
                    tracing::debug!("Swarm #{} already streaming {}, ignoring repeated metadata", swarm, file.name);
                    return Vec::new();
                }
                self.resolve(swarm, files, surface)
            }
            EngineUpdate::PlaybackStarted => vec![SessionStatus::Playing],
            EngineUpdate::Error(message) => vec![failed(message)],
            other => {
                tracing::debug!("Swarm engine ignoring {:?}", other);
                Vec::new()
            }
        }
    }

    fn status_text(&self, status: &SessionStatus) -> String {
        match status {
            SessionStatus::Idle => String::new(),
            SessionStatus::Connecting => "Connecting to peers...".to_string(),
            SessionStatus::Resolving => "Downloading metadata...".to_string(),
            SessionStatus::Ready | SessionStatus::Playing => match self.selected {
                Some(ref file) => format!("Streaming: {}", file.name),
                None => "Streaming".to_string(),
            },
            SessionStatus::Failed(SessionError::NoPlayableFile) => {
                "No playable video file found in torrent.".to_string()
            }
            SessionStatus::Failed(err) => format!("Error: {}", err),
        }
    }

    fn dispose(&mut self, surface: &mut PlaybackSurface) {
        if let Some(id) = self.swarm.take() {
            lock_client(&self.client).destroy(id);
        }
        if surface.attached().map(|m| m.engine) == Some(EngineKind::PeerSwarm) {
            surface.clear();
        }
    }
}
