//! Engine selection: decides which playback engine a source locator needs

use crate::models::PlaybackRequest;

/// URI scheme that marks a peer-swarm (torrent) source
pub const PEER_SWARM_SCHEME: &str = "magnet:";

/// Path extensions served as segmented manifests
const MANIFEST_EXTENSIONS: &[&str] = &["m3u8", "m3u"];

pub const ADAPTIVE_MIME_TYPE: &str = "application/x-mpegURL";
pub const PROGRESSIVE_MIME_TYPE: &str = "video/mp4";

/// Which playback engine owns a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    HttpStream,
    PeerSwarm,
}

impl EngineKind {
    pub fn label(&self) -> &'static str {
        match self {
            EngineKind::HttpStream => "HTTP stream",
            EngineKind::PeerSwarm => "peer swarm",
        }
    }
}

/// HTTP transport flavour, only used as a content-type hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    AdaptiveSegment,
    Progressive,
}

impl TransportMode {
    pub fn mime_type(&self) -> &'static str {
        match self {
            TransportMode::AdaptiveSegment => ADAPTIVE_MIME_TYPE,
            TransportMode::Progressive => PROGRESSIVE_MIME_TYPE,
        }
    }
}

/// Result of classifying a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceClass {
    HttpStream(TransportMode),
    PeerSwarm,
}

impl SourceClass {
    pub fn engine_kind(&self) -> EngineKind {
        match self {
            SourceClass::HttpStream(_) => EngineKind::HttpStream,
            SourceClass::PeerSwarm => EngineKind::PeerSwarm,
        }
    }
}

/// Everything an engine needs to start playing one request
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub url: String,
    pub title: String,
    pub poster_url: Option<String>,
    pub autoplay: bool,
    pub class: SourceClass,
}

impl SourceDescriptor {
    pub fn from_request(request: &PlaybackRequest) -> Self {
        Self {
            url: request.url.trim().to_string(),
            title: request.title.clone(),
            poster_url: request.poster_url.clone(),
            autoplay: request.autoplay,
            class: classify(&request.url),
        }
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.class.engine_kind()
    }

    /// Content-type hint for HTTP sources; swarms have none until a file is picked.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self.class {
            SourceClass::HttpStream(mode) => Some(mode.mime_type()),
            SourceClass::PeerSwarm => None,
        }
    }
}

/// True when `url` uses the peer-swarm scheme (ASCII case-insensitive).
pub fn is_peer_swarm(url: &str) -> bool {
    let url = url.trim_start();
    url.len() >= PEER_SWARM_SCHEME.len()
        && url.as_bytes()[..PEER_SWARM_SCHEME.len()].eq_ignore_ascii_case(PEER_SWARM_SCHEME.as_bytes())
}

/// Classify a locator into its engine and transport.
pub fn classify(url: &str) -> SourceClass {
    if is_peer_swarm(url) {
        return SourceClass::PeerSwarm;
    }

    let is_manifest = path_extension(url)
        .map(|ext| MANIFEST_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
        .unwrap_or(false);

    if is_manifest {
        SourceClass::HttpStream(TransportMode::AdaptiveSegment)
    } else {
        SourceClass::HttpStream(TransportMode::Progressive)
    }
}

/// Extension of the last path segment, ignoring query and fragment.
/// Bare file names and Windows paths are their own path.
fn path_extension(url: &str) -> Option<&str> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    let path = match path.split_once("://") {
        // Host-only locators have no path segment to inspect
        Some((_, rest)) => rest.split_once('/')?.1,
        None => path,
    };
    let segment = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// True when `name` ends with one of `extensions` (case-insensitive, no leading dot).
pub fn has_media_extension(name: &str, extensions: &[String]) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => extensions.iter().any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        None => false,
    }
}
