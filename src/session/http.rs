//! HTTP streaming engine: wraps a `StreamPlayer`

use super::engine::{failed, EngineUpdate, PlaybackEngine, StatusSink, StreamPlayer};
use super::error::EngineError;
use super::selector::{EngineKind, SourceDescriptor};
use super::status::SessionStatus;
use super::surface::{MediaAttachment, PlaybackSurface};

pub struct HttpStreamEngine {
    player: Box<dyn StreamPlayer>,
    source: Option<SourceDescriptor>,
}

impl HttpStreamEngine {
    pub fn new(player: Box<dyn StreamPlayer>) -> Self {
        Self { player, source: None }
    }
}

impl PlaybackEngine for HttpStreamEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::HttpStream
    }

    fn attach(&mut self, source: &SourceDescriptor, sink: StatusSink) -> Result<(), EngineError> {
        tracing::info!(
            "Opening HTTP stream {} ({})",
            source.url,
            source.mime_type().unwrap_or("unknown type")
        );
        self.source = Some(source.clone());
        self.player.construct(source, sink)
    }

    fn on_status(&mut self, update: EngineUpdate, surface: &mut PlaybackSurface) -> Vec<SessionStatus> {
        match update {
            EngineUpdate::Ready => {
                if self.player.is_disposed() {
                    return Vec::new();
                }
                if let Some(ref source) = self.source {
                    surface.attach(MediaAttachment {
                        engine: EngineKind::HttpStream,
                        locator: source.url.clone(),
                        title: source.title.clone(),
                        mime_type: source.mime_type(),
                        poster_url: source.poster_url.clone(),
                        autoplay: source.autoplay,
                    });
                }
                vec![SessionStatus::Ready]
            }
            EngineUpdate::PlaybackStarted => vec![SessionStatus::Playing],
            EngineUpdate::Error(message) => vec![failed(message)],
            other => {
                tracing::debug!("HTTP engine ignoring {:?}", other);
                Vec::new()
            }
        }
    }

    fn status_text(&self, status: &SessionStatus) -> String {
        match status {
            SessionStatus::Idle => String::new(),
            SessionStatus::Connecting | SessionStatus::Resolving => "Connecting to stream...".to_string(),
            SessionStatus::Ready => "Ready".to_string(),
            SessionStatus::Playing => match self.source {
                Some(ref source) if !source.title.is_empty() => format!("Playing: {}", source.title),
                _ => "Playing".to_string(),
            },
            SessionStatus::Failed(err) => format!("Error: {}", err),
        }
    }

    fn dispose(&mut self, surface: &mut PlaybackSurface) {
        self.player.dispose();
        if surface.attached().map(|m| m.engine) == Some(EngineKind::HttpStream) {
            surface.clear();
        }
    }
}
