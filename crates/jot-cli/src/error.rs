use std::io;

use jot_core::auth::AuthError;
use jot_core::config::ConfigError;
use jot_core::remote::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] jot_core::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Usage(String),
    #[error("Note not found for number/id prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("No sign-in link is pending. Run `link <email>` first or pass the email: `complete <link> <email>`")]
    NoPendingLink,
    #[error("Not signed in. Use `signin`, `signup` or `link` in `jot shell`")]
    NotSignedIn,
}
