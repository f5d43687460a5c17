//! Note store: a local reflection of one user's remote note collection.
//!
//! Content edits are applied to the local state immediately and written to
//! the remote store in the background. Create and delete wait for the remote
//! store before touching local state. Failures are surfaced through
//! [`AppState::last_error`](crate::state::AppState) and never retried
//! automatically.

mod lanes;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::models::{Note, NoteId};
use crate::remote::{RemoteNoteStore, StoreResult, UserScope};
use crate::state::{AppEvent, SharedState, UiError};
use crate::{Error, Result};

use lanes::{Flush, WriteLane, WriteLanes};

/// Result of [`NoteStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The fetched notes replaced the local set.
    Loaded(usize),
    /// A newer load or a session change started first; the result was dropped.
    Superseded,
}

/// Handle to a background content write.
///
/// Dropping the ticket does not cancel the write.
#[derive(Debug)]
pub struct WriteTicket {
    note_id: NoteId,
    handle: JoinHandle<StoreResult<()>>,
}

impl WriteTicket {
    #[must_use]
    pub const fn note_id(&self) -> &NoteId {
        &self.note_id
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the remote write to settle.
    pub async fn wait(self) -> Result<()> {
        let outcome = self
            .handle
            .await
            .map_err(|error| Error::Task(error.to_string()))?;
        outcome.map_err(Error::from)
    }
}

/// Thread-safe note store shared by the view controller.
pub struct NoteStore<R: RemoteNoteStore> {
    remote: Arc<R>,
    state: SharedState,
    scope: Arc<Mutex<Option<UserScope>>>,
    lanes: Arc<WriteLanes>,
}

impl<R: RemoteNoteStore> Clone for NoteStore<R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            state: self.state.clone(),
            scope: Arc::clone(&self.scope),
            lanes: Arc::clone(&self.lanes),
        }
    }
}

impl<R: RemoteNoteStore> NoteStore<R> {
    pub fn new(remote: R, state: SharedState) -> Self {
        Self {
            remote: Arc::new(remote),
            state,
            scope: Arc::new(Mutex::new(None)),
            lanes: Arc::new(WriteLanes::default()),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &SharedState {
        &self.state
    }

    #[must_use]
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Scope the store currently reads and writes, if any.
    #[must_use]
    pub fn scope(&self) -> Option<UserScope> {
        self.scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_scope(&self, scope: Option<UserScope>) {
        *self.scope.lock().unwrap_or_else(PoisonError::into_inner) = scope;
    }

    fn require_scope(&self) -> Result<UserScope> {
        self.scope().ok_or(Error::NotSignedIn)
    }

    /// Swap in fresh credentials for the same user without reloading.
    pub fn rebind(&self, scope: UserScope) {
        let mut current = self.scope.lock().unwrap_or_else(PoisonError::into_inner);
        let same_user = current
            .as_ref()
            .is_some_and(|existing| existing.user_id == scope.user_id);
        if same_user {
            *current = Some(scope);
        } else {
            tracing::warn!("Ignoring rebind for a different user {}", scope.user_id);
        }
    }

    /// Fetch every note in `scope` and replace the local set with them.
    ///
    /// Only the most recently started load may apply its result.
    pub async fn load(&self, scope: UserScope) -> Result<LoadOutcome> {
        self.set_scope(Some(scope.clone()));
        let generation = self
            .state
            .dispatch_then(AppEvent::LoadStarted, |state| state.generation());
        tracing::debug!("Loading notes for {} (generation {generation})", scope.user_id);

        match self.remote.list(&scope).await {
            Ok(notes) => {
                let count = notes.len();
                let applied = self.state.dispatch_then(
                    AppEvent::NotesLoaded { generation, notes },
                    |state| state.generation() == generation,
                );
                if applied {
                    tracing::info!("Loaded {count} notes for {}", scope.user_id);
                    Ok(LoadOutcome::Loaded(count))
                } else {
                    tracing::debug!("Dropping superseded load (generation {generation})");
                    Ok(LoadOutcome::Superseded)
                }
            }
            Err(error) => {
                let current = self.state.dispatch_then(
                    AppEvent::LoadFailed {
                        generation,
                        message: error.to_string(),
                    },
                    |state| state.generation() == generation,
                );
                if current {
                    tracing::warn!("Failed to load notes: {}", error);
                    Err(error.into())
                } else {
                    Ok(LoadOutcome::Superseded)
                }
            }
        }
    }

    /// Reload the current scope.
    pub async fn reload(&self) -> Result<LoadOutcome> {
        let scope = self.require_scope()?;
        self.load(scope).await
    }

    /// Create an empty note remotely, then select it and open its detail view.
    pub async fn create(&self) -> Result<Note> {
        let scope = self.require_scope()?;
        let note = match self.remote.create(&scope, "").await {
            Ok(note) => note,
            Err(error) => {
                tracing::warn!("Failed to create note: {}", error);
                self.state
                    .dispatch(AppEvent::Failed(UiError::store(error.to_string())));
                return Err(error.into());
            }
        };

        let same_user = self
            .scope()
            .is_some_and(|current| current.user_id == scope.user_id);
        if !same_user {
            tracing::debug!("Discarding note {} created for a previous session", note.id);
            return Err(Error::SessionChanged);
        }

        tracing::info!("Created note {}", note.id);
        self.state.dispatch(AppEvent::NoteCreated(note.clone()));
        Ok(note)
    }

    /// Replace a note's content locally and write it in the background.
    ///
    /// The local change is visible as soon as this returns. Must be called
    /// from within a Tokio runtime.
    pub fn update_content(&self, id: &NoteId, content: impl Into<String>) -> Result<WriteTicket> {
        let scope = self.require_scope()?;
        let content = content.into();

        let applied = self.state.dispatch_if(
            |state| state.contains(id),
            AppEvent::ContentChanged {
                id: id.clone(),
                content: content.clone(),
            },
        );
        if !applied {
            return Err(Error::NoteNotFound(id.clone()));
        }

        let (lane, seq) = self.lanes.stage(id, scope, content);
        tracing::debug!("Queued write {seq} for note {id}");
        let handle = tokio::spawn(run_write(
            Arc::clone(&self.remote),
            self.state.clone(),
            lane,
            id.clone(),
            seq,
        ));

        Ok(WriteTicket {
            note_id: id.clone(),
            handle,
        })
    }

    /// Send the note's current local content again.
    pub fn retry_write(&self, id: &NoteId) -> Result<WriteTicket> {
        let content = self
            .state
            .read(|state| state.note(id).map(|note| note.content.clone()))
            .ok_or_else(|| Error::NoteNotFound(id.clone()))?;
        tracing::info!("Retrying write for note {id}");
        self.update_content(id, content)
    }

    /// Delete a note remotely after any writes already queued for it, then
    /// drop it locally.
    pub async fn delete(&self, id: &NoteId) -> Result<()> {
        let scope = self.require_scope()?;
        if !self.state.read(|state| state.contains(id)) {
            return Err(Error::NoteNotFound(id.clone()));
        }

        let lane = self.lanes.lane(&scope.user_id, id);
        match lane.delete(self.remote.as_ref(), &scope, id).await {
            Ok(()) => {
                self.lanes.forget(&scope.user_id, id);
                self.state.dispatch(AppEvent::NoteDeleted(id.clone()));
                tracing::info!("Deleted note {id}");
                Ok(())
            }
            Err(error) => {
                tracing::warn!("Failed to delete note {id}: {}", error);
                self.state
                    .dispatch(AppEvent::Failed(UiError::store(error.to_string())));
                Err(error.into())
            }
        }
    }

    /// Drop the scope and every local note. Writes already sent still finish,
    /// and later writes to the same note wait for them.
    pub fn clear(&self) {
        self.set_scope(None);
        self.lanes.prune();
        self.state.dispatch(AppEvent::NotesCleared);
    }
}

async fn run_write<R: RemoteNoteStore>(
    remote: Arc<R>,
    state: SharedState,
    lane: Arc<WriteLane>,
    id: NoteId,
    seq: u64,
) -> StoreResult<()> {
    match lane.flush(remote.as_ref(), &id, seq).await {
        Ok(Flush::Written {
            seq: written,
            content,
        }) => {
            tracing::debug!("Stored note {id} up to write {written}");
            if written >= lane.latest_seq() {
                state.dispatch(AppEvent::WriteSynced { id, content });
            }
            Ok(())
        }
        Ok(Flush::Covered | Flush::Deleted) => Ok(()),
        Err(error) => {
            tracing::warn!("Failed to store note {id}: {}", error);
            state.dispatch(AppEvent::WriteFailed {
                id,
                message: error.to_string(),
            });
            Err(error)
        }
    }
}
