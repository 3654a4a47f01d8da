//! Catalog loading, filtering and search

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::m3u_parser::M3uEntry;
use crate::models::{Category, CatalogEntry, PlaybackType, Refinement, Tab};

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid catalog: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_home_language() -> String {
    "PT".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub channels: Vec<CatalogEntry>,
    #[serde(default)]
    pub content: Vec<CatalogEntry>,
    #[serde(default = "default_home_language")]
    pub home_language: String,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            content: Vec::new(),
            home_language: default_home_language(),
        }
    }
}

impl Catalog {
    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let mut catalog: Catalog = serde_json::from_str(content)?;
        catalog.drop_unplayable();
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// The catalog shipped inside the binary
    pub fn builtin() -> Self {
        match Self::from_json(BUILTIN_CATALOG) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!("Built-in catalog is broken: {}", e);
                Self::default()
            }
        }
    }

    fn drop_unplayable(&mut self) {
        for list in [&mut self.channels, &mut self.content] {
            list.retain(|entry| {
                let keep = !entry.url.trim().is_empty();
                if !keep {
                    tracing::warn!("Dropping catalog entry '{}' without url", entry.title);
                }
                keep
            });
        }
    }

    /// Channels first, then on-demand content
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.channels.iter().chain(self.content.iter())
    }

    pub fn len(&self) -> usize {
        self.channels.len() + self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append parsed playlist entries as live channels. Returns how many were added.
    pub fn import_playlist(&mut self, entries: Vec<M3uEntry>) -> usize {
        let before = self.channels.len();
        self.channels.extend(
            entries
                .into_iter()
                .map(M3uEntry::into_catalog_entry)
                .filter(|entry| !entry.url.trim().is_empty()),
        );
        self.channels.len() - before
    }

    /// Distinct genres, sorted, for the refinement picker
    pub fn genres(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.entries().filter_map(|e| e.genre.as_deref()).filter(|g| !g.is_empty()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    pub fn languages(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.entries().map(|e| e.language.as_str()).filter(|l| !l.is_empty()).collect();
        set.into_iter().map(str::to_string).collect()
    }
}

fn matches_tab(entry: &CatalogEntry, tab: Tab) -> bool {
    match tab {
        Tab::All => true,
        Tab::Tv => entry.category == Category::Tv,
        Tab::Movies => entry.category == Category::Movie,
        Tab::Series => entry.category == Category::Series,
        Tab::Torrents => entry.is_peer_sourced(),
    }
}

fn matches_refinement(entry: &CatalogEntry, refinement: &Refinement, home_language: &str) -> bool {
    match refinement {
        Refinement::All => true,
        Refinement::Dubbed => entry.playback_type == PlaybackType::Dubbed,
        Refinement::Subtitled => entry.playback_type == PlaybackType::Subtitled,
        Refinement::International => {
            !entry.language.eq_ignore_ascii_case(home_language) && entry.playback_type == PlaybackType::None
        }
        Refinement::Genre(genre) => entry.genre.as_deref().is_some_and(|g| g.eq_ignore_ascii_case(genre)),
        Refinement::Language(language) => entry.language.eq_ignore_ascii_case(language),
    }
}

/// Entries visible under `tab` and `refinement`, in catalog order.
pub fn filter<'a>(catalog: &'a Catalog, tab: Tab, refinement: &Refinement) -> Vec<&'a CatalogEntry> {
    catalog
        .entries()
        .filter(|entry| matches_tab(entry, tab))
        .filter(|entry| matches_refinement(entry, refinement, &catalog.home_language))
        .collect()
}

/// Case-insensitive title search; an empty query keeps everything.
pub fn search<'a>(entries: Vec<&'a CatalogEntry>, query: &str) -> Vec<&'a CatalogEntry> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|entry| entry.title.to_lowercase().contains(&query))
        .collect()
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
