//! In-process note store for tests and embedding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use super::{RemoteNoteStore, StoreError, StoreResult, UserScope};
use crate::models::{Note, NoteId};

/// Operation kinds that can be made to fail once via [`MemoryNoteStore::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, Vec<Note>>,
    failures: Vec<StoreOp>,
    update_log: Vec<(NoteId, String)>,
}

/// Keeps remote calls parked until dropped.
pub struct StoreHold {
    _guard: OwnedRwLockWriteGuard<()>,
}

/// Per-user note collections kept in memory.
#[derive(Clone, Default)]
pub struct MemoryNoteStore {
    inner: Arc<Mutex<Inner>>,
    gate: Arc<RwLock<()>>,
    update_gate: Arc<RwLock<()>>,
}

impl MemoryNoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a note directly to a user's collection.
    pub fn insert(&self, user_id: &str, content: &str) -> Note {
        let note = Note::new(Uuid::now_v7().simple().to_string(), content);
        self.lock()
            .collections
            .entry(user_id.to_string())
            .or_default()
            .push(note.clone());
        note
    }

    /// Make the next call of `op` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, op: StoreOp) {
        self.lock().failures.push(op);
    }

    /// Park every remote call until the returned hold is dropped.
    ///
    /// Returns `None` if a hold is already active.
    #[must_use]
    pub fn hold(&self) -> Option<StoreHold> {
        Arc::clone(&self.gate)
            .try_write_owned()
            .ok()
            .map(|guard| StoreHold { _guard: guard })
    }

    /// Park only updates until the returned hold is dropped.
    #[must_use]
    pub fn hold_updates(&self) -> Option<StoreHold> {
        Arc::clone(&self.update_gate)
            .try_write_owned()
            .ok()
            .map(|guard| StoreHold { _guard: guard })
    }

    /// Current remote content of a note.
    #[must_use]
    pub fn content(&self, user_id: &str, id: &NoteId) -> Option<String> {
        self.lock()
            .collections
            .get(user_id)?
            .iter()
            .find(|note| &note.id == id)
            .map(|note| note.content.clone())
    }

    #[must_use]
    pub fn notes(&self, user_id: &str) -> Vec<Note> {
        self.lock()
            .collections
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every update applied so far, in application order.
    #[must_use]
    pub fn update_log(&self) -> Vec<(NoteId, String)> {
        self.lock().update_log.clone()
    }

    fn take_failure(inner: &mut Inner, op: StoreOp) -> StoreResult<()> {
        if let Some(index) = inner.failures.iter().position(|pending| *pending == op) {
            inner.failures.remove(index);
            return Err(StoreError::Unavailable(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

impl RemoteNoteStore for MemoryNoteStore {
    async fn list(&self, scope: &UserScope) -> StoreResult<Vec<Note>> {
        let _open = self.gate.read().await;
        let mut inner = self.lock();
        Self::take_failure(&mut inner, StoreOp::List)?;
        Ok(inner
            .collections
            .get(&scope.user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create(&self, scope: &UserScope, content: &str) -> StoreResult<Note> {
        let _open = self.gate.read().await;
        let mut inner = self.lock();
        Self::take_failure(&mut inner, StoreOp::Create)?;
        let note = Note::new(Uuid::now_v7().simple().to_string(), content);
        inner
            .collections
            .entry(scope.user_id.clone())
            .or_default()
            .push(note.clone());
        Ok(note)
    }

    async fn update(&self, scope: &UserScope, id: &NoteId, content: &str) -> StoreResult<()> {
        let _open = self.gate.read().await;
        let _updates_open = self.update_gate.read().await;
        let mut inner = self.lock();
        Self::take_failure(&mut inner, StoreOp::Update)?;
        let note = inner
            .collections
            .get_mut(&scope.user_id)
            .and_then(|notes| notes.iter_mut().find(|note| &note.id == id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        note.content = content.to_string();
        inner.update_log.push((id.clone(), content.to_string()));
        Ok(())
    }

    async fn delete(&self, scope: &UserScope, id: &NoteId) -> StoreResult<()> {
        let _open = self.gate.read().await;
        let mut inner = self.lock();
        Self::take_failure(&mut inner, StoreOp::Delete)?;
        let notes = inner
            .collections
            .get_mut(&scope.user_id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let before = notes.len();
        notes.retain(|note| &note.id != id);
        if notes.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
