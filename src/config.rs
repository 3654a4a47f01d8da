//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const APP_DIR: &str = "zakirflix";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum ConnectionQuality {
    Fast,
    #[default]
    Normal,
    Slow,
    VerySlow,
    Custom,
}

impl ConnectionQuality {
    pub fn buffer_seconds(&self, custom: u32) -> u32 {
        match self {
            ConnectionQuality::Fast => 2,
            ConnectionQuality::Normal => 5,
            ConnectionQuality::Slow => 15,
            ConnectionQuality::VerySlow => 30,
            ConnectionQuality::Custom => custom,
        }
    }

    pub fn is_slow(&self) -> bool {
        matches!(self, ConnectionQuality::Slow | ConnectionQuality::VerySlow)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionQuality::Fast => "Fast",
            ConnectionQuality::Normal => "Normal",
            ConnectionQuality::Slow => "Slow",
            ConnectionQuality::VerySlow => "Very Slow",
            ConnectionQuality::Custom => "⚙️ Custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub external_player: String,
    #[serde(default = "default_buffer")]
    pub buffer_seconds: u32,
    #[serde(default)]
    pub connection_quality: ConnectionQuality,
    #[serde(default = "default_true")]
    pub hw_accel: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_true")]
    pub pass_user_agent_to_player: bool,
    // Torrent playback
    #[serde(default = "default_webtorrent")]
    pub webtorrent_path: String,
    #[serde(default = "default_torrent_port")]
    pub torrent_port: u16,
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
    // Catalog sources
    #[serde(default)]
    pub catalog_path: String,
    #[serde(default)]
    pub playlist_urls: Vec<String>,
    #[serde(default = "default_true")]
    pub autoplay: bool,
    #[serde(default = "default_true")]
    pub dark_mode: bool,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_buffer() -> u32 { 5 }
fn default_true() -> bool { true }
fn default_torrent_port() -> u16 { 8000 }
fn default_webtorrent() -> String { "webtorrent".to_string() }
fn default_log_filter() -> String { "zakirflix=info".to_string() }
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36".to_string()
}
fn default_media_extensions() -> Vec<String> {
    vec!["mp4".to_string(), "webm".to_string(), "mkv".to_string()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            external_player: String::new(),
            buffer_seconds: default_buffer(),
            connection_quality: ConnectionQuality::Normal,
            hw_accel: true,
            user_agent: default_user_agent(),
            pass_user_agent_to_player: true,
            webtorrent_path: default_webtorrent(),
            torrent_port: default_torrent_port(),
            media_extensions: default_media_extensions(),
            catalog_path: String::new(),
            playlist_urls: Vec::new(),
            autoplay: true,
            dark_mode: true,
            log_filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        fs::create_dir_all(&path).ok();
        path.push("config.json");
        path
    }

    pub fn load() -> Self {
        let path = Self::config_path();

        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => return Self::from_json(&content),
                Err(e) => tracing::warn!("Could not read {}: {}", path.display(), e),
            }
        }

        Self::default()
    }

    /// Parse a stored config; anything unreadable falls back to defaults.
    pub fn from_json(content: &str) -> Self {
        match serde_json::from_str(content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Invalid config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        let path = Self::config_path();
        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = fs::write(&path, content) {
                    tracing::warn!("Could not save {}: {}", path.display(), e);
                }
            }
            Err(e) => tracing::warn!("Could not serialize config: {}", e),
        }
    }

    /// Buffer length after applying the connection preset
    pub fn effective_buffer(&self) -> u32 {
        self.connection_quality.buffer_seconds(self.buffer_seconds)
    }

    /// Player binary to launch; ffplay when nothing is configured
    pub fn player_program(&self) -> String {
        if self.external_player.trim().is_empty() {
            "ffplay".to_string()
        } else {
            self.external_player.trim().to_string()
        }
    }
}
