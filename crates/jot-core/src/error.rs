//! Error types for jot-core

use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::models::NoteId;
use crate::remote::StoreError;

/// Result type alias using jot-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in jot-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Authentication provider or session storage failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Remote document store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Client configuration is missing or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Note is not part of the local note set
    #[error("Note not found: {0}")]
    NoteNotFound(NoteId),

    /// Operation needs a selected note
    #[error("No note is selected")]
    NothingSelected,

    /// Operation needs a signed-in user
    #[error("Not signed in")]
    NotSignedIn,

    /// The session changed while the operation was in flight
    #[error("Session changed before the operation completed")]
    SessionChanged,

    /// A background write task stopped before reporting a result
    #[error("Background task failed: {0}")]
    Task(String),
}
