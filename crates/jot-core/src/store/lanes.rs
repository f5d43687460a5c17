//! Per-note write lanes.
//!
//! Every content write for a note goes through that note's lane. A lane
//! serializes remote calls and always sends the newest staged content, so the
//! remote copy converges on the last edit issued regardless of how the
//! spawned write tasks get scheduled. Deletes take the same lane and stop any
//! write queued behind them.
//!
//! Lanes are keyed by user and note and outlive a sign-out while a write is
//! still running, so an edit made after signing back in queues behind it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::NoteId;
use crate::remote::{RemoteNoteStore, StoreError, StoreResult, UserScope};

#[derive(Debug, Clone)]
struct Staged {
    seq: u64,
    scope: UserScope,
    content: String,
}

#[derive(Debug, Default)]
struct Progress {
    written: u64,
    deleted: bool,
}

/// What a flush did on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Flush {
    /// `content`, the edit numbered `seq`, is now stored remotely.
    Written { seq: u64, content: String },
    /// A flush for a later edit already stored this one.
    Covered,
    /// The note was deleted first.
    Deleted,
}

#[derive(Debug)]
pub(crate) struct WriteLane {
    staged: Mutex<Option<Staged>>,
    progress: tokio::sync::Mutex<Progress>,
}

impl WriteLane {
    fn new() -> Self {
        Self {
            staged: Mutex::new(None),
            progress: tokio::sync::Mutex::new(Progress::default()),
        }
    }

    fn staged(&self) -> MutexGuard<'_, Option<Staged>> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sequence number of the newest staged edit (0 if none).
    pub(crate) fn latest_seq(&self) -> u64 {
        self.staged().as_ref().map_or(0, |staged| staged.seq)
    }

    /// Send the newest staged content unless edit `seq` is already stored.
    pub(crate) async fn flush<R: RemoteNoteStore>(
        &self,
        remote: &R,
        id: &NoteId,
        seq: u64,
    ) -> StoreResult<Flush> {
        let mut progress = self.progress.lock().await;
        if progress.deleted {
            return Ok(Flush::Deleted);
        }
        if progress.written >= seq {
            return Ok(Flush::Covered);
        }

        let staged = self.staged().clone();
        let Some(staged) = staged else {
            return Ok(Flush::Covered);
        };
        remote.update(&staged.scope, id, &staged.content).await?;
        progress.written = staged.seq;
        Ok(Flush::Written {
            seq: staged.seq,
            content: staged.content,
        })
    }

    /// Delete the note once every earlier write on this lane has finished.
    /// A note that is already gone remotely counts as deleted.
    pub(crate) async fn delete<R: RemoteNoteStore>(
        &self,
        remote: &R,
        scope: &UserScope,
        id: &NoteId,
    ) -> StoreResult<()> {
        let mut progress = self.progress.lock().await;
        match remote.delete(scope, id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {
                progress.deleted = true;
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

type LaneKey = (String, NoteId);

/// Lanes for every note written since the last prune.
#[derive(Debug, Default)]
pub(crate) struct WriteLanes {
    lanes: Mutex<HashMap<LaneKey, Arc<WriteLane>>>,
    next_seq: AtomicU64,
}

impl WriteLanes {
    fn lock(&self) -> MutexGuard<'_, HashMap<LaneKey, Arc<WriteLane>>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lane(&self, user_id: &str, id: &NoteId) -> Arc<WriteLane> {
        Arc::clone(
            self.lock()
                .entry((user_id.to_string(), id.clone()))
                .or_insert_with(|| Arc::new(WriteLane::new())),
        )
    }

    /// Record `content` as the newest edit of `id` and return its sequence.
    pub(crate) fn stage(
        &self,
        id: &NoteId,
        scope: UserScope,
        content: String,
    ) -> (Arc<WriteLane>, u64) {
        let lane = self.lane(&scope.user_id, id);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        *lane.staged() = Some(Staged {
            seq,
            scope,
            content,
        });
        (lane, seq)
    }

    pub(crate) fn forget(&self, user_id: &str, id: &NoteId) {
        self.lock().remove(&(user_id.to_string(), id.clone()));
    }

    /// Drop lanes no write or delete is using. A lane is only handed out
    /// under the map lock, so one referenced solely by the map is idle.
    pub(crate) fn prune(&self) {
        self.lock().retain(|_, lane| Arc::strong_count(lane) > 1);
    }
}
