//! The single on-screen playback slot

use super::selector::EngineKind;

/// Media currently bound to the playback slot
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAttachment {
    pub engine: EngineKind,
    /// What the viewer actually reads: the HTTP URL, or the local swarm stream.
    pub locator: String,
    pub title: String,
    pub mime_type: Option<&'static str>,
    pub poster_url: Option<String>,
    pub autoplay: bool,
}

/// Holds at most one attachment. Engines attach into it, teardown clears it.
#[derive(Debug, Default)]
pub struct PlaybackSurface {
    attached: Option<MediaAttachment>,
}

impl PlaybackSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `media`, replacing anything already attached.
    pub fn attach(&mut self, media: MediaAttachment) -> Option<MediaAttachment> {
        let previous = self.attached.replace(media);
        if let Some(ref old) = previous {
            tracing::warn!("Playback surface replaced an attached {} source: {}", old.engine.label(), old.locator);
        }
        previous
    }

    pub fn clear(&mut self) -> Option<MediaAttachment> {
        self.attached.take()
    }

    pub fn attached(&self) -> Option<&MediaAttachment> {
        self.attached.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_none()
    }
}
