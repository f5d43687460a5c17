//! jot-core - Core library for Jot
//!
//! A minimal cloud-backed note client: an auth gateway over Firebase
//! Authentication, a note store reflecting a per-user Firestore collection,
//! and a view controller that ties both to a single renderable state.

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod remote;
pub mod state;
pub mod store;
pub mod title;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
