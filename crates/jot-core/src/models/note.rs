//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::title::derive_title;

/// Opaque note identifier assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Wrap an identifier handed out by the remote store.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A note owned by the signed-in user's collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Store-assigned identifier, immutable after creation
    pub id: NoteId,
    /// Plain text or rich-text markup body
    pub content: String,
}

impl Note {
    #[must_use]
    pub fn new(id: impl Into<NoteId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    /// Display label derived from the first non-empty line of content
    #[must_use]
    pub fn title(&self) -> String {
        derive_title(&self.content)
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
