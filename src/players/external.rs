//! HTTP playback through an external media player process

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{ChildStderr, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::{lock_slot, ProcessSlot};
use crate::config::{AppConfig, ConnectionQuality};
use crate::session::{EngineError, EngineUpdate, SourceClass, SourceDescriptor, StatusSink, StreamPlayer, TransportMode};

/// A player still running after this long is treated as playing
const STARTUP_GRACE: Duration = Duration::from_millis(1500);
const WATCH_INTERVAL: Duration = Duration::from_millis(200);
/// Stderr lines kept for the failure message
const STDERR_TAIL: usize = 5;

/// Launch options taken from the app config
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub program: String,
    pub buffer_seconds: u32,
    pub connection_quality: ConnectionQuality,
    pub hw_accel: bool,
    pub user_agent: Option<String>,
}

impl PlayerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            program: config.player_program(),
            buffer_seconds: config.effective_buffer(),
            connection_quality: config.connection_quality,
            hw_accel: config.hw_accel,
            user_agent: config.pass_user_agent_to_player.then(|| config.user_agent.clone()),
        }
    }
}

/// One external player window per session
pub struct ExternalPlayer {
    settings: PlayerSettings,
    process: Option<ProcessSlot>,
    disposed: bool,
}

impl ExternalPlayer {
    pub fn new(settings: PlayerSettings) -> Self {
        Self {
            settings,
            process: None,
            disposed: false,
        }
    }
}

impl StreamPlayer for ExternalPlayer {
    fn construct(&mut self, source: &SourceDescriptor, sink: StatusSink) -> Result<(), EngineError> {
        let program = resolve_program(&self.settings.program);
        let args = player_args(&program, source, &self.settings);

        let mut cmd = Command::new(&program);
        cmd.args(&args);

        // On Windows, hide the console window for ffplay/ffmpeg
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            if program.to_lowercase().contains("ffplay") {
                cmd.creation_flags(CREATE_NO_WINDOW);
            }
        }

        // Some players read the user agent from the environment
        if let Some(ref user_agent) = self.settings.user_agent {
            cmd.env("USER_AGENT", user_agent);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| EngineError::Launch {
            program: program.clone(),
            source,
        })?;
        tracing::info!("Player '{}' launched (PID: {}) for {}", program, child.id(), source.url);

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL)));
        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&tail);
            thread::spawn(move || read_stderr(stderr, tail));
        }

        let slot: ProcessSlot = Arc::new(Mutex::new(Some(child)));
        self.process = Some(Arc::clone(&slot));
        self.disposed = false;

        sink.send(EngineUpdate::Ready);
        thread::spawn(move || watch_player(slot, tail, sink));
        Ok(())
    }

    fn dispose(&mut self) {
        if let Some(slot) = self.process.take() {
            if let Some(mut child) = lock_slot(&slot).take() {
                tracing::debug!("Closing player (PID: {})", child.id());
                let _ = child.kill();
                let _ = child.wait(); // Reap the process
            }
        }
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for ExternalPlayer {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn read_stderr(stderr: ChildStderr, tail: Arc<Mutex<VecDeque<String>>>) {
    let reader = BufReader::new(stderr);
    for line in reader.lines().map_while(Result::ok) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        tracing::debug!(target: "zakirflix::player", "{}", line);
        let mut tail = tail.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }
}

/// Report start, clean exit, or failure of the player process.
fn watch_player(slot: ProcessSlot, tail: Arc<Mutex<VecDeque<String>>>, sink: StatusSink) {
    let launched = Instant::now();
    let mut started = false;

    loop {
        thread::sleep(WATCH_INTERVAL);

        let outcome = {
            let mut guard = lock_slot(&slot);
            // Disposed: whoever took the child owns its exit
            let Some(child) = guard.as_mut() else { return };
            match child.try_wait() {
                Ok(None) => None,
                Ok(Some(status)) => {
                    guard.take();
                    Some(Ok(status))
                }
                Err(e) => {
                    guard.take();
                    Some(Err(e))
                }
            }
        };

        match outcome {
            None => {
                if !started && launched.elapsed() >= STARTUP_GRACE {
                    started = true;
                    if !sink.send(EngineUpdate::PlaybackStarted) {
                        return;
                    }
                }
            }
            Some(Ok(status)) if status.success() => {
                sink.send(EngineUpdate::Ended);
                return;
            }
            Some(Ok(status)) => {
                let detail = tail
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .back()
                    .cloned();
                let message = match detail {
                    Some(line) => format!("Player exited with {}: {}", status, line),
                    None => format!("Player exited with {}", status),
                };
                sink.send(EngineUpdate::Error(message));
                return;
            }
            Some(Err(e)) => {
                sink.send(EngineUpdate::Error(format!("Failed to wait for player: {}", e)));
                return;
            }
        }
    }
}

/// Auto-detect player paths on Windows
fn resolve_program(program: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        let lower = program.to_lowercase();
        let candidates: &[&str] = if lower == "vlc" || lower == "vlc.exe" {
            &[
                r"C:\Program Files\VideoLAN\VLC\vlc.exe",
                r"C:\Program Files (x86)\VideoLAN\VLC\vlc.exe",
            ]
        } else if lower == "mpv" || lower == "mpv.exe" {
            &[r"C:\Program Files\mpv\mpv.exe", r"C:\mpv\mpv.exe"]
        } else if lower == "ffplay" || lower == "ffplay.exe" {
            &[r"C:\ffmpeg\bin\ffplay.exe", r"C:\Program Files\ffmpeg\bin\ffplay.exe"]
        } else {
            &[]
        };
        if let Some(found) = candidates.iter().find(|p| std::path::Path::new(p).exists()) {
            return found.to_string();
        }
    }
    program.to_string()
}

/// Command line for `program`, tuned to the source's transport hint.
fn player_args(program: &str, source: &SourceDescriptor, settings: &PlayerSettings) -> Vec<String> {
    let player = program.to_lowercase();
    let url = source.url.clone();
    let title = if source.title.is_empty() {
        url.rsplit('/').next().unwrap_or("stream").to_string()
    } else {
        source.title.clone()
    };
    let adaptive = matches!(source.class, SourceClass::HttpStream(TransportMode::AdaptiveSegment));
    let is_slow = settings.connection_quality.is_slow();
    let buffer_secs = settings.buffer_seconds;
    let buffer_ms = (buffer_secs as i64) * 1000;
    let probe_bytes = (buffer_secs as i64) * 4 * 1024 * 1024;

    let mut args = Vec::new();

    if player.contains("ffplay") {
        if settings.hw_accel {
            #[cfg(target_os = "macos")]
            args.extend(["-hwaccel".to_string(), "videotoolbox".to_string()]);
            #[cfg(target_os = "linux")]
            args.extend(["-hwaccel".to_string(), "auto".to_string()]);
        }
        args.extend([
            url.clone(),
            "-hide_banner".to_string(),
            "-autoexit".to_string(),
            "-probesize".to_string(),
            probe_bytes.to_string(),
            "-analyzeduration".to_string(),
            (buffer_ms * 2000).to_string(),
            "-sync".to_string(),
            "audio".to_string(),
            "-framedrop".to_string(),
            "-window_title".to_string(),
            title,
        ]);
        if url.starts_with("http") {
            args.extend(["-reconnect".to_string(), "1".to_string()]);
            if adaptive {
                args.extend(["-reconnect_streamed".to_string(), "1".to_string()]);
            }
            args.extend([
                "-reconnect_delay_max".to_string(),
                if is_slow { "30" } else { "10" }.to_string(),
            ]);
        }
        if is_slow {
            args.push("-infbuf".to_string());
        }
        if let Some(ref user_agent) = settings.user_agent {
            args.extend(["-user_agent".to_string(), user_agent.clone()]);
        }
    } else if player.contains("mpv") && !player.contains("celluloid") {
        let cache_secs = buffer_secs * 2;
        let cache_mb = buffer_secs * 4;
        args.extend([
            url.clone(),
            format!("--title={}", title),
            "--cache=yes".to_string(),
            format!("--cache-secs={}", cache_secs),
            format!("--demuxer-max-bytes={}M", cache_mb),
            format!("--network-timeout={}", if is_slow { 120 } else { 60 }),
            "--stream-lavf-o=reconnect=1".to_string(),
            "--ytdl=no".to_string(),
        ]);
        if adaptive {
            args.push("--hls-bitrate=max".to_string());
        } else {
            args.push("--force-seekable=yes".to_string());
        }
        if !source.autoplay {
            args.push("--pause".to_string());
        }
        args.push(if settings.hw_accel { "--hwdec=auto-safe" } else { "--hwdec=no" }.to_string());
        if let Some(ref user_agent) = settings.user_agent {
            args.push(format!("--user-agent={}", user_agent));
        }
    } else if player.contains("vlc") {
        let cache_ms = buffer_ms * 2;
        args.extend([
            url.clone(),
            format!("--meta-title={}", title),
            format!("--network-caching={}", cache_ms),
            "--http-reconnect".to_string(),
        ]);
        if adaptive {
            args.push(format!("--live-caching={}", cache_ms));
        }
        if !source.autoplay {
            args.push("--start-paused".to_string());
        }
        if settings.hw_accel {
            args.push("--avcodec-hw=any".to_string());
        }
        if let Some(ref user_agent) = settings.user_agent {
            args.push(format!("--http-user-agent={}", user_agent));
        }
    } else if player.contains("mplayer") {
        let cache_min = if is_slow { "50" } else { "20" };
        args.extend([
            url.clone(),
            "-cache".to_string(),
            (buffer_secs * 1024).to_string(),
            "-cache-min".to_string(),
            cache_min.to_string(),
            "-title".to_string(),
            title,
        ]);
        if let Some(ref user_agent) = settings.user_agent {
            args.extend(["-user-agent".to_string(), user_agent.clone()]);
        }
    } else if player.contains("celluloid") {
        args.extend([
            url.clone(),
            format!("--mpv-title={}", title),
            format!("--mpv-cache-secs={}", buffer_secs),
        ]);
    } else {
        // Generic player - just pass URL
        args.push(url);
    }

    args
}
