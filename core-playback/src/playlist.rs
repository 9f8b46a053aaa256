//! # Playlist
//!
//! Ordered, fixed-length list of remote items. Indices are stable for the
//! lifetime of a session.

use crate::types::ResourceId;
use serde::{Deserialize, Serialize};

/// One playlist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub index: usize,
    pub resource_id: ResourceId,
}

/// Immutable ordered list of [`PlaylistEntry`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ResourceId>,
    {
        let entries = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| PlaylistEntry {
                index,
                resource_id: url.into(),
            })
            .collect();
        Self { entries }
    }

    /// Parse a newline-separated feed.
    ///
    /// Lines are trimmed; blank lines and lines not starting with `http` are
    /// skipped.
    pub fn from_text(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && line.starts_with("http")),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlaylistEntry> {
        self.entries.get(index)
    }

    pub fn resource(&self, index: usize) -> Option<&ResourceId> {
        self.entries.get(index).map(|entry| &entry.resource_id)
    }

    pub fn contains_index(&self, index: usize) -> bool {
        index < self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaylistEntry> {
        self.entries.iter()
    }
}
