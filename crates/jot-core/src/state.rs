//! Client view state and the reducer that drives it.
//!
//! Every mutation of [`AppState`] goes through [`AppState::reduce`], a pure
//! `(state, event) -> state` transition. The note store and view controller
//! decide *when* an event happens; this module decides *what* it means.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auth::AuthUser;
use crate::models::{Note, NoteId};

/// Which screen the client shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Unauthenticated,
    List,
    Detail,
}

/// Progress of the full fetch for the current user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Store,
}

/// An error the UI must show until dismissed or superseded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl UiError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Auth,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Store,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppEvent {
    /// A user signed in (or was restored); screen moves to the list.
    SessionStarted(AuthUser),
    /// The user signed out; everything user-scoped is dropped.
    SessionEnded,
    /// A full fetch began; starts a new scope generation.
    LoadStarted,
    NotesLoaded { generation: u64, notes: Vec<Note> },
    LoadFailed { generation: u64, message: String },
    /// Local note set was emptied without ending the session.
    NotesCleared,
    NoteCreated(Note),
    NoteSelected(NoteId),
    ContentChanged { id: NoteId, content: String },
    NoteDeleted(NoteId),
    Back,
    /// `content` for `id` is now stored remotely.
    WriteSynced { id: NoteId, content: String },
    WriteFailed { id: NoteId, message: String },
    Failed(UiError),
    ErrorDismissed,
}

/// Snapshot of everything the UI renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppState {
    pub screen: Screen,
    pub user: Option<AuthUser>,
    pub notes: Vec<Note>,
    pub selected: Option<NoteId>,
    pub load_status: LoadStatus,
    pub last_error: Option<UiError>,
    /// Notes whose last write failed; they need a retry.
    pub unsynced: BTreeSet<NoteId>,
    /// Notes with local edits the remote store has not confirmed yet.
    dirty: BTreeSet<NoteId>,
    /// Notes confirmed while a load was running; its listing may predate them.
    synced_during_load: BTreeSet<NoteId>,
    generation: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            screen: Screen::Unauthenticated,
            user: None,
            notes: Vec::new(),
            selected: None,
            load_status: LoadStatus::Idle,
            last_error: None,
            unsynced: BTreeSet::new(),
            dirty: BTreeSet::new(),
            synced_during_load: BTreeSet::new(),
            generation: 0,
        }
    }
}

impl AppState {
    /// Scope generation; bumped whenever previously started loads become stale.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| &note.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &NoteId) -> bool {
        self.note(id).is_some()
    }

    /// Whether `id` has a local edit that is not known to be stored remotely.
    #[must_use]
    pub fn has_pending_edit(&self, id: &NoteId) -> bool {
        self.dirty.contains(id)
    }

    #[must_use]
    pub fn selected_note(&self) -> Option<&Note> {
        self.selected.as_ref().and_then(|id| self.note(id))
    }

    /// Apply one event and return the next state.
    #[must_use]
    pub fn reduce(mut self, event: AppEvent) -> Self {
        match event {
            AppEvent::SessionStarted(user) => {
                self.clear_notes();
                self.user = Some(user);
                self.screen = Screen::List;
                self.last_error = None;
            }
            AppEvent::SessionEnded => {
                self.clear_notes();
                self.user = None;
                self.screen = Screen::Unauthenticated;
            }
            AppEvent::LoadStarted => {
                self.generation += 1;
                self.load_status = LoadStatus::Loading;
                self.synced_during_load.clear();
            }
            AppEvent::NotesLoaded { generation, notes } => {
                if generation == self.generation {
                    self.apply_loaded(notes);
                }
            }
            AppEvent::LoadFailed {
                generation,
                message,
            } => {
                if generation == self.generation {
                    self.load_status = LoadStatus::Failed(message.clone());
                    self.last_error = Some(UiError::store(message));
                }
            }
            AppEvent::NotesCleared => {
                self.clear_notes();
                if self.screen == Screen::Detail {
                    self.screen = Screen::List;
                }
            }
            AppEvent::NoteCreated(note) => {
                if self.screen != Screen::Unauthenticated {
                    self.selected = Some(note.id.clone());
                    // A reload racing the create may already have fetched it.
                    if !self.contains(&note.id) {
                        self.notes.push(note);
                    }
                    self.screen = Screen::Detail;
                }
            }
            AppEvent::NoteSelected(id) => {
                if self.screen != Screen::Unauthenticated && self.contains(&id) {
                    self.selected = Some(id);
                    self.screen = Screen::Detail;
                }
            }
            AppEvent::ContentChanged { id, content } => {
                if let Some(note) = self.notes.iter_mut().find(|note| note.id == id) {
                    note.content = content;
                    self.dirty.insert(id);
                }
            }
            AppEvent::NoteDeleted(id) => {
                self.notes.retain(|note| note.id != id);
                self.unsynced.remove(&id);
                self.dirty.remove(&id);
                if self.selected.as_ref() == Some(&id) {
                    self.selected = None;
                    if self.screen == Screen::Detail {
                        self.screen = Screen::List;
                    }
                }
            }
            AppEvent::Back => {
                if self.screen == Screen::Detail {
                    self.screen = Screen::List;
                }
            }
            AppEvent::WriteSynced { id, content } => {
                self.unsynced.remove(&id);
                let current = self.note(&id).is_some_and(|note| note.content == content);
                if current {
                    self.dirty.remove(&id);
                    if self.load_status == LoadStatus::Loading {
                        self.synced_during_load.insert(id);
                    }
                }
            }
            AppEvent::WriteFailed { id, message } => {
                if self.contains(&id) {
                    self.unsynced.insert(id);
                    self.last_error = Some(UiError::store(message));
                }
            }
            AppEvent::Failed(error) => {
                self.last_error = Some(error);
            }
            AppEvent::ErrorDismissed => {
                self.last_error = None;
            }
        }
        self
    }

    /// Replace the note set with a fetched listing. Local content wins for
    /// notes whose edits the listing may not include yet.
    fn apply_loaded(&mut self, mut notes: Vec<Note>) {
        for note in &mut notes {
            let keep_local =
                self.dirty.contains(&note.id) || self.synced_during_load.contains(&note.id);
            if !keep_local {
                continue;
            }
            if let Some(local) = self.note(&note.id) {
                note.content.clone_from(&local.content);
            }
        }

        self.dirty.retain(|id| notes.iter().any(|note| &note.id == id));
        let dirty = &self.dirty;
        self.unsynced.retain(|id| dirty.contains(id));
        self.synced_during_load.clear();
        self.selected = notes.first().map(|note| note.id.clone());
        self.notes = notes;
        self.load_status = LoadStatus::Ready;
    }

    fn clear_notes(&mut self) {
        self.generation += 1;
        self.notes.clear();
        self.selected = None;
        self.unsynced.clear();
        self.dirty.clear();
        self.synced_during_load.clear();
        self.load_status = LoadStatus::Idle;
    }
}

/// Cloneable handle to the one [`AppState`] a client renders from.
///
/// The lock is only held for a single reduction, never across an await.
#[derive(Clone, Default)]
pub struct SharedState(Arc<Mutex<AppState>>);

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> AppState {
        self.lock().clone()
    }

    pub fn read<T>(&self, f: impl FnOnce(&AppState) -> T) -> T {
        f(&self.lock())
    }

    pub fn dispatch(&self, event: AppEvent) {
        self.dispatch_then(event, |_| ());
    }

    /// Reduce `event`, then inspect the resulting state under the same lock.
    pub fn dispatch_then<T>(&self, event: AppEvent, f: impl FnOnce(&AppState) -> T) -> T {
        let mut guard = self.lock();
        let current = std::mem::take(&mut *guard);
        *guard = current.reduce(event);
        f(&guard)
    }

    /// Reduce `event` only if `precondition` holds; returns whether it ran.
    pub fn dispatch_if(
        &self,
        precondition: impl FnOnce(&AppState) -> bool,
        event: AppEvent,
    ) -> bool {
        let mut guard = self.lock();
        if !precondition(&guard) {
            return false;
        }
        let current = std::mem::take(&mut *guard);
        *guard = current.reduce(event);
        true
    }
}
