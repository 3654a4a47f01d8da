//! Torrent streaming via webtorrent-cli
//!
//! Each swarm owns up to two subprocesses: the metadata pass that lists the
//! torrent's files, and the streaming server for the chosen file. When
//! webtorrent has no launcher for the configured player, the swarm also owns
//! an `ExternalPlayer` opened on the local stream url.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use super::external::{ExternalPlayer, PlayerSettings};
use super::{kill_slot, lock_slot, ProcessSlot};
use crate::config::AppConfig;
use crate::session::{
    EngineError, EngineKind, EngineUpdate, MediaAttachment, PlaybackSurface, SourceClass, SourceDescriptor,
    StatusSink, StreamPlayer, SwarmClient, SwarmFile, SwarmId, TransportMode,
};

type ViewerSlot = Arc<Mutex<Option<ExternalPlayer>>>;

#[derive(Debug, Clone)]
pub struct WebTorrentSettings {
    pub program: String,
    pub port: u16,
    /// webtorrent flag that opens the stream in a desktop player, if any
    pub player_flag: Option<&'static str>,
    /// Player opened on the stream url when there is no launcher flag
    pub viewer: Option<PlayerSettings>,
}

impl WebTorrentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let player_flag = player_flag(&config.player_program());
        Self {
            program: config.webtorrent_path.clone(),
            port: config.torrent_port,
            player_flag,
            viewer: player_flag.is_none().then(|| PlayerSettings::from_config(config)),
        }
    }
}

/// Map the configured player onto the launchers webtorrent knows about
fn player_flag(program: &str) -> Option<&'static str> {
    let program = program.to_lowercase();
    if program.contains("mpv") {
        Some("--mpv")
    } else if program.contains("vlc") {
        Some("--vlc")
    } else if program.contains("mplayer") {
        Some("--mplayer")
    } else {
        None
    }
}

struct Swarm {
    uri: String,
    sink: StatusSink,
    processes: Vec<ProcessSlot>,
    viewers: Vec<ViewerSlot>,
}

pub struct WebTorrentClient {
    settings: WebTorrentSettings,
    next_id: SwarmId,
    swarms: HashMap<SwarmId, Swarm>,
}

impl WebTorrentClient {
    pub fn new(settings: WebTorrentSettings) -> Self {
        Self {
            settings,
            next_id: 0,
            swarms: HashMap::new(),
        }
    }

    /// Swap settings for swarms added from now on.
    pub fn set_settings(&mut self, settings: WebTorrentSettings) {
        self.settings = settings;
    }

    fn spawn(&self, args: &[String]) -> Result<std::process::Child, EngineError> {
        Command::new(&self.settings.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Launch {
                program: self.settings.program.clone(),
                source,
            })
    }
}

impl SwarmClient for WebTorrentClient {
    fn add(&mut self, swarm_uri: &str, sink: StatusSink) -> Result<SwarmId, EngineError> {
        let args = vec!["download".to_string(), swarm_uri.to_string(), "--select".to_string()];
        let mut child = self.spawn(&args)?;

        self.next_id += 1;
        let id = self.next_id;
        tracing::info!("Swarm #{} resolving metadata (PID: {})", id, child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let slot: ProcessSlot = Arc::new(Mutex::new(Some(child)));

        // Drain stderr separately so a chatty process cannot fill the pipe
        let errors = thread::spawn(move || {
            let mut errors = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut errors);
            }
            errors
        });

        let thread_slot = Arc::clone(&slot);
        let thread_sink = sink.clone();
        thread::spawn(move || {
            let mut listing = String::new();
            if let Some(mut stdout) = stdout {
                let _ = stdout.read_to_string(&mut listing);
            }
            let errors = errors.join().unwrap_or_default();

            // Destroyed while resolving: nothing to report
            let Some(mut child) = lock_slot(&thread_slot).take() else { return };
            let status = child.wait();

            let files = parse_file_listing(&listing);
            let update = match status {
                Ok(_) if !files.is_empty() => EngineUpdate::MetadataResolved { swarm: id, files },
                Ok(status) if status.success() => EngineUpdate::MetadataResolved { swarm: id, files },
                Ok(status) => {
                    let detail = last_line(&errors).unwrap_or("could not reach any peers");
                    EngineUpdate::Error(format!("webtorrent exited with {}: {}", status, detail))
                }
                Err(e) => EngineUpdate::Error(format!("Failed to wait for webtorrent: {}", e)),
            };
            thread_sink.send(update);
        });

        self.swarms.insert(
            id,
            Swarm {
                uri: swarm_uri.to_string(),
                sink,
                processes: vec![slot],
                viewers: Vec::new(),
            },
        );
        Ok(id)
    }

    fn render_into(
        &mut self,
        swarm: SwarmId,
        file: &SwarmFile,
        surface: &mut PlaybackSurface,
        autoplay: bool,
    ) -> Result<(), EngineError> {
        let uri = match self.swarms.get(&swarm) {
            Some(entry) => entry.uri.clone(),
            None => return Err(EngineError::UnknownSwarm(swarm)),
        };

        let locator = format!("http://localhost:{}/{}", self.settings.port, file.index);
        let mut args = vec![
            "download".to_string(),
            uri,
            "--select".to_string(),
            file.index.to_string(),
            "--port".to_string(),
            self.settings.port.to_string(),
        ];
        if autoplay {
            if let Some(flag) = self.settings.player_flag {
                args.push(flag.to_string());
            }
        }
        let viewer = match self.settings.viewer {
            Some(ref settings) if autoplay => Some(Viewer {
                settings: settings.clone(),
                source: viewer_source(&locator, &file.name),
                slot: Arc::new(Mutex::new(None)),
            }),
            _ => None,
        };

        let mut child = self.spawn(&args)?;
        tracing::info!("Swarm #{} streaming '{}' on port {} (PID: {})", swarm, file.name, self.settings.port, child.id());

        let stdout = child.stdout.take();
        let slot: ProcessSlot = Arc::new(Mutex::new(Some(child)));
        let Some(entry) = self.swarms.get_mut(&swarm) else {
            kill_slot(&slot);
            return Err(EngineError::UnknownSwarm(swarm));
        };
        entry.processes.push(Arc::clone(&slot));
        if let Some(ref viewer) = viewer {
            entry.viewers.push(Arc::clone(&viewer.slot));
        }

        let sink = entry.sink.clone();
        thread::spawn(move || watch_stream(stdout, slot, viewer, sink));

        surface.attach(MediaAttachment {
            engine: EngineKind::PeerSwarm,
            locator,
            title: file.name.clone(),
            mime_type: mime_for_file(&file.name),
            poster_url: None,
            autoplay,
        });
        Ok(())
    }

    fn active_swarms(&self) -> Vec<SwarmId> {
        let mut ids: Vec<SwarmId> = self.swarms.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn destroy(&mut self, swarm: SwarmId) {
        if let Some(entry) = self.swarms.remove(&swarm) {
            tracing::debug!("Destroying swarm #{} ({} processes)", swarm, entry.processes.len());
            for slot in &entry.processes {
                kill_slot(slot);
            }
            for viewer in &entry.viewers {
                if let Some(mut player) = lock_viewer(viewer).take() {
                    player.dispose();
                }
            }
        }
    }
}

impl Drop for WebTorrentClient {
    fn drop(&mut self) {
        for id in self.active_swarms() {
            self.destroy(id);
        }
    }
}

/// Player to open once the stream server answers
struct Viewer {
    settings: PlayerSettings,
    source: SourceDescriptor,
    slot: ViewerSlot,
}

fn lock_viewer(slot: &ViewerSlot) -> std::sync::MutexGuard<'_, Option<ExternalPlayer>> {
    slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn viewer_source(locator: &str, title: &str) -> SourceDescriptor {
    SourceDescriptor {
        url: locator.to_string(),
        title: title.to_string(),
        poster_url: None,
        autoplay: true,
        class: SourceClass::HttpStream(TransportMode::Progressive),
    }
}

/// Launch the viewer unless the swarm was destroyed first. The stream slot
/// stays locked across the launch so `destroy` always finds the player.
fn open_viewer(stream: &ProcessSlot, viewer: Viewer, sink: &StatusSink) -> Result<bool, EngineError> {
    let stream = lock_slot(stream);
    if stream.is_none() {
        return Ok(false);
    }
    let mut player = ExternalPlayer::new(viewer.settings);
    player.construct(&viewer.source, sink.clone())?;
    *lock_viewer(&viewer.slot) = Some(player);
    Ok(true)
}

/// First progress output means the server is up; exit ends the stream.
fn watch_stream(
    stdout: Option<std::process::ChildStdout>,
    slot: ProcessSlot,
    mut viewer: Option<Viewer>,
    sink: StatusSink,
) {
    if let Some(stdout) = stdout {
        let mut started = false;
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            let line = strip_ansi(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tracing::trace!(target: "zakirflix::webtorrent", "{}", line);
            if started {
                continue;
            }
            started = true;
            if let Some(viewer) = viewer.take() {
                match open_viewer(&slot, viewer, &sink) {
                    Ok(true) => {}
                    Ok(false) => return,
                    Err(e) => {
                        tracing::warn!("Could not open torrent stream: {}", e);
                        sink.send(EngineUpdate::Error(e.to_string()));
                        continue;
                    }
                }
            }
            if !sink.send(EngineUpdate::PlaybackStarted) {
                break;
            }
        }
    }

    let Some(mut child) = lock_slot(&slot).take() else { return };
    match child.wait() {
        Ok(status) if status.success() => {
            sink.send(EngineUpdate::Ended);
        }
        Ok(status) => {
            sink.send(EngineUpdate::Error(format!("webtorrent exited with {}", status)));
        }
        Err(e) => {
            sink.send(EngineUpdate::Error(format!("Failed to wait for webtorrent: {}", e)));
        }
    }
}

/// Parse the file list printed by `webtorrent download <magnet> --select`.
///
/// Lines look like `0  Big Buck Bunny.mp4 (263 MB)`; anything else is skipped.
fn parse_file_listing(output: &str) -> Vec<SwarmFile> {
    let mut files = Vec::new();

    for raw in output.lines() {
        let line = strip_ansi(raw);
        let line = line.trim();

        let Some((index, rest)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };

        let rest = rest.trim();
        let name = match rest.rfind(" (") {
            Some(pos) if rest.ends_with(')') => rest[..pos].trim(),
            _ => rest,
        };
        if name.is_empty() {
            continue;
        }

        files.push(SwarmFile {
            index,
            name: name.to_string(),
            length: None,
        });
    }

    files
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

/// Drop terminal colour sequences (`ESC [ ... letter`)
fn strip_ansi(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for next in chars.by_ref() {
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn mime_for_file(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mkv" => Some("video/x-matroska"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_listing() {
        let output = "Select a file to download:\n\
                      0  a.srt (2 kB)\n\
                      1  Movie (2020)/b.mkv (1.4 GB)\n\
                      \n\
                      To select a specific file, re-run `webtorrent` with \"--select [index]\"\n\
                      Example: webtorrent download \"magnet:...\" --select 0\n";
        let files = parse_file_listing(output);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].index, 0);
        assert_eq!(files[0].name, "a.srt");
        assert_eq!(files[1].index, 1);
        assert_eq!(files[1].name, "Movie (2020)/b.mkv");
    }

    #[test]
    fn test_parse_colored_listing() {
        let output = "\u{1b}[1m\u{1b}[35m12\u{1b}[39m\u{1b}[22m episode.mp4 \u{1b}[34m(350 MB)\u{1b}[39m";
        let files = parse_file_listing(output);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].index, 12);
        assert_eq!(files[0].name, "episode.mp4");
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_file_listing("").is_empty());
        assert!(parse_file_listing("fetching torrent metadata from 3 peers").is_empty());
    }

    #[test]
    fn test_player_flag_mapping() {
        assert_eq!(player_flag("/usr/bin/mpv"), Some("--mpv"));
        assert_eq!(player_flag("VLC.exe"), Some("--vlc"));
        assert_eq!(player_flag("ffplay"), None);
    }

    #[test]
    fn test_default_player_gets_a_viewer() {
        let settings = WebTorrentSettings::from_config(&AppConfig::default());
        assert_eq!(settings.player_flag, None);
        let viewer = settings.viewer.expect("ffplay has no webtorrent launcher");
        assert_eq!(viewer.program, "ffplay");

        let config = AppConfig {
            external_player: "mpv".to_string(),
            ..AppConfig::default()
        };
        let settings = WebTorrentSettings::from_config(&config);
        assert_eq!(settings.player_flag, Some("--mpv"));
        assert!(settings.viewer.is_none());
    }

    #[test]
    fn test_viewer_source_is_progressive() {
        let source = viewer_source("http://localhost:8000/1", "b.mkv");
        assert_eq!(source.class, SourceClass::HttpStream(TransportMode::Progressive));
        assert_eq!(source.title, "b.mkv");
        assert!(source.autoplay);
    }

    #[test]
    fn test_viewer_skipped_after_destroy() {
        let (tx, rx) = std::sync::mpsc::channel();
        let stream: ProcessSlot = Arc::new(Mutex::new(None));
        let viewer = Viewer {
            settings: WebTorrentSettings::from_config(&AppConfig::default()).viewer.unwrap(),
            source: viewer_source("http://localhost:8000/1", "b.mkv"),
            slot: Arc::new(Mutex::new(None)),
        };
        let slot = Arc::clone(&viewer.slot);
        assert!(!open_viewer(&stream, viewer, &StatusSink::new(1, tx)).unwrap());
        assert!(lock_viewer(&slot).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_mime_for_file() {
        assert_eq!(mime_for_file("b.MKV"), Some("video/x-matroska"));
        assert_eq!(mime_for_file("a.srt"), None);
    }

    #[test]
    fn test_missing_binary_fails_to_add() {
        let (tx, _rx) = std::sync::mpsc::channel();
        let mut client = WebTorrentClient::new(WebTorrentSettings {
            program: "zakirflix-no-such-webtorrent".to_string(),
            port: 8000,
            player_flag: None,
            viewer: None,
        });
        let err = client.add("magnet:?xt=urn:btih:abc", StatusSink::new(1, tx)).unwrap_err();
        assert!(matches!(err, EngineError::Launch { .. }));
        assert!(client.active_swarms().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_noisy_stderr_does_not_stall_metadata() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let script = std::env::temp_dir().join(format!("zakirflix-webtorrent-{}.sh", uuid::Uuid::new_v4()));
        std::fs::write(
            &script,
            "#!/bin/sh\nhead -c 262144 /dev/zero | tr '\\0' x >&2\necho >&2\necho 'no peers found' >&2\nexit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let mut client = WebTorrentClient::new(WebTorrentSettings {
            program: script.to_string_lossy().into_owned(),
            port: 8000,
            player_flag: None,
            viewer: None,
        });
        // A freshly written script can briefly report "text file busy"
        let mut attempt = 0;
        while let Err(e) = client.add("magnet:?xt=urn:btih:abc", StatusSink::new(1, tx.clone())) {
            attempt += 1;
            assert!(attempt < 10, "{}", e);
            std::thread::sleep(Duration::from_millis(50));
        }

        let event = rx.recv_timeout(Duration::from_secs(20)).unwrap();
        let _ = std::fs::remove_file(&script);
        match event.update {
            EngineUpdate::Error(message) => assert!(message.ends_with("no peers found"), "{}", message),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_render_into_unknown_swarm() {
        let mut client = WebTorrentClient::new(WebTorrentSettings {
            program: "webtorrent".to_string(),
            port: 8000,
            player_flag: None,
            viewer: None,
        });
        let mut surface = PlaybackSurface::new();
        let file = SwarmFile {
            index: 0,
            name: "b.mkv".to_string(),
            length: None,
        };
        let err = client.render_into(3, &file, &mut surface, true).unwrap_err();
        assert!(matches!(err, EngineError::UnknownSwarm(3)));
        assert!(surface.is_empty());
    }
}
