//! Data models for the ZakirFLIX catalog

use serde::{Deserialize, Serialize};

use crate::session::is_peer_swarm;

/// Catalog section an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tv,
    Movie,
    Series,
    #[serde(other)]
    Other,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Tv => "tv",
            Category::Movie => "movie",
            Category::Series => "series",
            Category::Other => "other",
        }
    }
}

/// Audio/subtitle presentation of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackType {
    Dubbed,
    Subtitled,
    #[default]
    #[serde(other)]
    None,
}

/// One playable item of the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    #[serde(alias = "name")]
    pub title: String,
    pub url: String,
    #[serde(default, alias = "logo", alias = "poster")]
    pub poster_url: Option<String>,
    pub category: Category,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub playback_type: PlaybackType,
}

impl CatalogEntry {
    /// True when `url` addresses a peer swarm instead of an HTTP source.
    pub fn is_peer_sourced(&self) -> bool {
        is_peer_swarm(&self.url)
    }

    /// Build the request handed to the session manager when this entry is picked.
    pub fn playback_request(&self, autoplay: bool) -> PlaybackRequest {
        PlaybackRequest {
            url: self.url.clone(),
            poster_url: self.poster_url.clone(),
            title: self.title.clone(),
            autoplay,
        }
    }
}

/// Selection handed from the UI to the session manager
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub url: String,
    pub poster_url: Option<String>,
    pub title: String,
    pub autoplay: bool,
}

/// UI Tab selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    All,
    Tv,
    Movies,
    Series,
    Torrents,
}

impl Tab {
    pub const ALL: [Tab; 5] = [Tab::All, Tab::Tv, Tab::Movies, Tab::Series, Tab::Torrents];

    pub fn label(&self) -> &'static str {
        match self {
            Tab::All => "🏠 ALL",
            Tab::Tv => "📺 LIVE TV",
            Tab::Movies => "🎬 MOVIES",
            Tab::Series => "📼 SERIES",
            Tab::Torrents => "🧲 TORRENTS",
        }
    }
}

/// Secondary filter applied on top of the active tab
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Refinement {
    #[default]
    All,
    Dubbed,
    Subtitled,
    International,
    Genre(String),
    Language(String),
}

impl Refinement {
    pub fn label(&self) -> String {
        match self {
            Refinement::All => "All".to_string(),
            Refinement::Dubbed => "Dubbed".to_string(),
            Refinement::Subtitled => "Subtitled".to_string(),
            Refinement::International => "International".to_string(),
            Refinement::Genre(genre) => format!("Genre: {}", genre),
            Refinement::Language(language) => format!("Language: {}", language),
        }
    }
}
