//! Remote document store seam.
//!
//! Notes live in a per-user collection (`users/{uid}/notes`). The store is the
//! source of truth; [`crate::store::NoteStore`] keeps a local reflection of it.

mod firestore;
mod memory;

use std::fmt;
use std::future::Future;

use reqwest::StatusCode;
use thiserror::Error;

use crate::models::{Note, NoteId};

pub use firestore::FirestoreNoteStore;
pub use memory::{MemoryNoteStore, StoreHold, StoreOp};

/// Identity and credentials used to reach one user's note collection.
#[derive(Clone, PartialEq, Eq)]
pub struct UserScope {
    pub user_id: String,
    pub access_token: String,
}

impl UserScope {
    #[must_use]
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
        }
    }

    /// Collection path relative to the database root.
    #[must_use]
    pub fn collection_path(&self) -> String {
        format!(
            "users/{}/notes",
            urlencoding::encode(self.user_id.as_str())
        )
    }
}

impl fmt::Debug for UserScope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("UserScope")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Session is not authorized for the note store: {0}")]
    Unauthorized(String),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Store quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Store API error: {0}")]
    Api(String),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid document payload: {0}")]
    InvalidPayload(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Classify a non-success HTTP response.
    pub(crate) fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(message),
            StatusCode::FORBIDDEN => Self::PermissionDenied(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => Self::QuotaExceeded(message),
            StatusCode::SERVICE_UNAVAILABLE => Self::Unavailable(message),
            _ => Self::Api(message),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Collection-scoped CRUD over note documents.
///
/// No ordering is promised across independent calls; callers that need
/// per-note ordering serialize on their side.
pub trait RemoteNoteStore: Send + Sync + 'static {
    /// Fetch every note in the user's collection, in store order.
    fn list(&self, scope: &UserScope) -> impl Future<Output = StoreResult<Vec<Note>>> + Send;

    /// Create a note and return it with its store-assigned id.
    fn create(
        &self,
        scope: &UserScope,
        content: &str,
    ) -> impl Future<Output = StoreResult<Note>> + Send;

    /// Replace a note's content.
    fn update(
        &self,
        scope: &UserScope,
        id: &NoteId,
        content: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn delete(&self, scope: &UserScope, id: &NoteId)
        -> impl Future<Output = StoreResult<()>> + Send;
}
