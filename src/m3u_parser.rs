//! M3U playlist parser with HTTPS download support

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::models::{Category, CatalogEntry, PlaybackType};

const EXTINF: &str = "#EXTINF:";

#[derive(Debug, Clone, PartialEq)]
pub struct M3uEntry {
    pub id: String,
    pub title: String,
    pub poster_url: Option<String>,
    pub url: String,
    pub group: Option<String>,
    pub tvg_id: Option<String>,
}

impl M3uEntry {
    /// Imported playlist items are listed as live channels.
    pub fn into_catalog_entry(self) -> CatalogEntry {
        CatalogEntry {
            id: self.id,
            title: self.title,
            url: self.url,
            poster_url: self.poster_url,
            category: Category::Tv,
            language: String::new(),
            genre: self.group,
            playback_type: PlaybackType::None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("Request failed: {0}")]
    Request(#[source] ureq::Error),
    #[error("HTTP error: {0}")]
    Status(u16),
    #[error("Read failed: {0}")]
    Read(#[source] ureq::Error),
    #[error("Could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Download and parse M3U from URL (supports HTTP and HTTPS)
pub fn download_and_parse(url: &str, user_agent: &str) -> Result<Vec<M3uEntry>, PlaylistError> {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(120)))
        .timeout_connect(Some(Duration::from_secs(30)))
        .build()
        .new_agent();

    let mut response = agent
        .get(url)
        .header("User-Agent", user_agent)
        .call()
        .map_err(PlaylistError::Request)?;

    if response.status() != 200 {
        return Err(PlaylistError::Status(response.status().as_u16()));
    }

    let content = response
        .body_mut()
        .read_to_string()
        .map_err(PlaylistError::Read)?;

    Ok(parse_m3u(&content))
}

/// Load a playlist picked from disk
pub fn read_playlist_file(path: &Path) -> Result<Vec<M3uEntry>, PlaylistError> {
    let content = fs::read_to_string(path).map_err(|source| PlaylistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_m3u(&content))
}

/// Parse M3U content into entries, in playlist order.
///
/// A `#EXTINF:` line opens a pending entry; the next line that is neither blank
/// nor a comment is its url. Malformed input only yields fewer entries.
pub fn parse_m3u(content: &str) -> Vec<M3uEntry> {
    let mut entries = Vec::new();
    let mut current_attrs: HashMap<String, String> = HashMap::new();
    let mut current_title: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(info_part) = line.strip_prefix(EXTINF) {
            current_attrs.clear();
            extract_attrs(info_part, &mut current_attrs);

            // Title follows the last comma; without one the whole line is the title
            let title = match info_part.rfind(',') {
                Some(comma_pos) => info_part[comma_pos + 1..].trim(),
                None => info_part.trim(),
            };
            current_title = (!title.is_empty()).then(|| title.to_string());
        } else if !line.is_empty() && !line.starts_with('#') {
            // This is a URL line
            if let Some(title) = current_title.take() {
                entries.push(M3uEntry {
                    id: uuid::Uuid::new_v4().to_string(),
                    title,
                    poster_url: current_attrs.remove("tvg-logo"),
                    url: line.to_string(),
                    group: current_attrs.remove("group-title"),
                    tvg_id: current_attrs.remove("tvg-id"),
                });
            }
            current_attrs.clear();
        }
    }

    entries
}

/// Extract attributes from EXTINF line - handles quoted and unquoted values.
/// The first occurrence of a key wins.
fn extract_attrs(info: &str, attrs: &mut HashMap<String, String>) {
    let mut chars = info.chars().peekable();

    // Skip the duration number at the start (e.g., "-1")
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '-' || c == '.' || c.is_whitespace() {
            chars.next();
        } else {
            break;
        }
    }

    while chars.peek().is_some() {
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }

        // Collect key until '='
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' {
                chars.next();
                break;
            }
            if c == ',' {
                // No more attributes, rest is the title
                return;
            }
            key.push(c);
            chars.next();
        }

        let key = key.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }

        let mut value = String::new();
        match chars.peek() {
            Some(&'"') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '"' {
                        break;
                    }
                    if c == '\\' && chars.peek() == Some(&'"') {
                        chars.next();
                        value.push('"');
                        continue;
                    }
                    value.push(c);
                }
            }
            Some(_) => {
                // Unquoted value - read until space or comma
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
            }
            None => {}
        }

        if !value.is_empty() {
            attrs.entry(key).or_insert(value);
        }
    }
}

#[cfg(test)]
#[path = "m3u_parser_tests.rs"]
mod tests;
