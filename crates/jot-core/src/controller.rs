//! View controller: screen and selection for one signed-in user.
//!
//! Ties the [`AuthGateway`] to the [`NoteStore`]. Session changes bind, rebind
//! or clear the store; navigation and edits become reducer events.

use std::sync::Arc;

use crate::auth::{
    AuthError, AuthGateway, AuthProvider, AuthResult, AuthUser, LinkSignInAttempt,
    SessionPersistence,
};
use crate::models::{Note, NoteId};
use crate::remote::RemoteNoteStore;
use crate::state::{AppEvent, AppState, SharedState, UiError};
use crate::store::{LoadOutcome, NoteStore, WriteTicket};
use crate::{Error, Result};

/// One row of the note list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteListEntry {
    pub id: NoteId,
    pub title: String,
    pub selected: bool,
    pub unsynced: bool,
}

pub struct ViewController<P: AuthProvider, S: SessionPersistence, R: RemoteNoteStore> {
    gateway: Arc<AuthGateway<P, S>>,
    store: NoteStore<R>,
}

impl<P, S, R> ViewController<P, S, R>
where
    P: AuthProvider,
    S: SessionPersistence,
    R: RemoteNoteStore,
{
    pub fn new(gateway: AuthGateway<P, S>, remote: R) -> Self {
        Self {
            gateway: Arc::new(gateway),
            store: NoteStore::new(remote, SharedState::new()),
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &AuthGateway<P, S> {
        &self.gateway
    }

    #[must_use]
    pub const fn store(&self) -> &NoteStore<R> {
        &self.store
    }

    fn state(&self) -> &SharedState {
        self.store.state()
    }

    #[must_use]
    pub fn snapshot(&self) -> AppState {
        self.state().snapshot()
    }

    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.state().read(|state| state.user.clone())
    }

    /// Titles for the list screen, in store order.
    #[must_use]
    pub fn titles(&self) -> Vec<NoteListEntry> {
        self.state().read(|state| {
            state
                .notes
                .iter()
                .map(|note| NoteListEntry {
                    id: note.id.clone(),
                    title: note.title(),
                    selected: state.selected.as_ref() == Some(&note.id),
                    unsynced: state.unsynced.contains(&note.id),
                })
                .collect()
        })
    }

    fn surface_auth<T>(&self, result: AuthResult<T>) -> Result<T> {
        result.map_err(|error| self.auth_failed(error))
    }

    fn auth_failed(&self, error: AuthError) -> Error {
        tracing::warn!("Auth operation failed: {}", error);
        self.state()
            .dispatch(AppEvent::Failed(UiError::auth(error.to_string())));
        Error::from(error)
    }

    /// Only a revoked session signs the user out. Any other refresh failure
    /// leaves the session and local notes in place for a retry.
    fn refresh_failed(&self, error: AuthError) -> Error {
        if error.ends_session() {
            self.expire_session(error)
        } else {
            self.auth_failed(error)
        }
    }

    pub async fn restore_session(&self) -> Result<Option<AuthUser>> {
        let restored = self.surface_auth(self.gateway.restore_session().await)?;
        self.sync_session().await?;
        Ok(restored)
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthUser> {
        let user = self.surface_auth(self.gateway.sign_in_with_password(email, password).await)?;
        self.sync_session().await?;
        Ok(user)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser> {
        let user = self.surface_auth(self.gateway.sign_up(email, password).await)?;
        self.sync_session().await?;
        Ok(user)
    }

    pub async fn send_passwordless_link(&self, email: &str) -> Result<LinkSignInAttempt> {
        self.surface_auth(self.gateway.send_passwordless_link(email).await)
    }

    pub async fn complete_passwordless_sign_in(
        &self,
        link_url: &str,
        attempt: &LinkSignInAttempt,
    ) -> Result<AuthUser> {
        let user = self.surface_auth(
            self.gateway
                .complete_passwordless_sign_in(link_url, attempt)
                .await,
        )?;
        self.sync_session().await?;
        Ok(user)
    }

    /// Sign out and drop every local note, even if clearing the persisted
    /// session fails.
    pub async fn sign_out(&self) -> Result<()> {
        let cleared = self.gateway.sign_out();
        self.sync_session().await?;
        self.surface_auth(cleared)
    }

    /// Bring the store in line with the gateway's current session.
    ///
    /// A new user clears the store and loads their notes; the same user with a
    /// refreshed token only rebinds; no session clears everything.
    pub async fn sync_session(&self) -> Result<()> {
        let session = match self.gateway.ensure_fresh_session().await {
            Ok(session) => session,
            Err(error) => return Err(self.refresh_failed(error)),
        };
        let shown = self.user();

        match (session, shown) {
            (None, None) => Ok(()),
            (None, Some(user)) => {
                tracing::info!("Session ended for {}", user.id);
                self.store.clear();
                self.state().dispatch(AppEvent::SessionEnded);
                Ok(())
            }
            (Some(session), Some(user)) if user.id == session.user.id => {
                self.store.rebind(session.scope());
                Ok(())
            }
            (Some(session), _) => {
                tracing::info!("Session started for {}", session.user.id);
                self.store.clear();
                self.state()
                    .dispatch(AppEvent::SessionStarted(session.user.clone()));
                self.store.load(session.scope()).await.map(|_| ())
            }
        }
    }

    fn expire_session(&self, error: AuthError) -> Error {
        tracing::warn!("Session could not be refreshed: {}", error);
        if let Err(clear_error) = self.gateway.sign_out() {
            tracing::warn!("Failed to clear expired session: {}", clear_error);
        }
        if self.user().is_some() {
            self.store.clear();
            self.state().dispatch(AppEvent::SessionEnded);
        }
        self.state()
            .dispatch(AppEvent::Failed(UiError::auth(error.to_string())));
        Error::from(error)
    }

    /// Follow gateway session changes until the gateway is dropped.
    pub async fn watch_sessions(&self) {
        let mut updates = self.gateway.subscribe();
        while updates.changed().await.is_ok() {
            if let Err(error) = self.sync_session().await {
                tracing::warn!("Failed to apply session change: {}", error);
            }
        }
    }

    async fn refresh_scope(&self) -> Result<()> {
        match self.gateway.ensure_fresh_session().await {
            Ok(Some(session)) => {
                self.store.rebind(session.scope());
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(error) => Err(self.refresh_failed(error)),
        }
    }

    pub fn select(&self, id: &NoteId) -> Result<()> {
        let selected = self.state().dispatch_if(
            |state| state.contains(id),
            AppEvent::NoteSelected(id.clone()),
        );
        if selected {
            Ok(())
        } else {
            Err(Error::NoteNotFound(id.clone()))
        }
    }

    pub fn back(&self) {
        self.state().dispatch(AppEvent::Back);
    }

    pub async fn create_note(&self) -> Result<Note> {
        self.refresh_scope().await?;
        self.store.create().await
    }

    pub fn update_content(&self, id: &NoteId, content: impl Into<String>) -> Result<WriteTicket> {
        self.store.update_content(id, content)
    }

    /// Replace the content of the note shown on the detail screen.
    pub fn edit_selected(&self, content: impl Into<String>) -> Result<WriteTicket> {
        let id = self
            .state()
            .read(|state| state.selected_note().map(|note| note.id.clone()))
            .ok_or(Error::NothingSelected)?;
        self.store.update_content(&id, content)
    }

    pub async fn delete_note(&self, id: &NoteId) -> Result<()> {
        self.refresh_scope().await?;
        self.store.delete(id).await
    }

    pub async fn reload(&self) -> Result<LoadOutcome> {
        self.refresh_scope().await?;
        self.store.reload().await
    }

    pub async fn retry_write(&self, id: &NoteId) -> Result<WriteTicket> {
        self.refresh_scope().await?;
        self.store.retry_write(id)
    }

    pub fn dismiss_error(&self) {
        self.state().dispatch(AppEvent::ErrorDismissed);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::MemorySessionStore;
    use crate::remote::{MemoryNoteStore, StoreOp};
    use crate::state::{ErrorKind, Screen};
    use crate::testing::FakeAuthProvider;

    type Controller = ViewController<FakeAuthProvider, MemorySessionStore, MemoryNoteStore>;

    const ADA: &str = "ada@example.com";
    const ADA_ID: &str = "uid-ada";
    const PASSWORD: &str = "hunter22";

    fn controller(remote: &MemoryNoteStore, sessions: &MemorySessionStore) -> Controller {
        let gateway = AuthGateway::new(
            FakeAuthProvider::with_account(ADA, PASSWORD),
            sessions.clone(),
            "http://localhost:3000",
        );
        ViewController::new(gateway, remote.clone())
    }

    async fn signed_in(remote: &MemoryNoteStore) -> Controller {
        let controller = controller(remote, &MemorySessionStore::default());
        controller.sign_in_with_password(ADA, PASSWORD).await.unwrap();
        controller
    }

    #[tokio::test]
    async fn sign_in_loads_notes_and_shows_list() {
        let remote = MemoryNoteStore::new();
        remote.insert(ADA_ID, "<h1>Groceries</h1><p>milk</p>");
        remote.insert("uid-bob", "not ada's");

        let controller = signed_in(&remote).await;

        let state = controller.snapshot();
        assert_eq!(state.screen, Screen::List);
        assert_eq!(state.user.map(|user| user.id), Some(ADA_ID.to_string()));
        let titles: Vec<String> = controller
            .titles()
            .into_iter()
            .map(|entry| entry.title)
            .collect();
        assert_eq!(titles, vec!["Groceries".to_string()]);
    }

    #[tokio::test]
    async fn failed_sign_in_surfaces_auth_error() {
        let remote = MemoryNoteStore::new();
        let controller = controller(&remote, &MemorySessionStore::default());

        let result = controller.sign_in_with_password(ADA, "wrong").await;

        assert!(matches!(result, Err(Error::Auth(AuthError::InvalidCredentials(_)))));
        let state = controller.snapshot();
        assert_eq!(state.screen, Screen::Unauthenticated);
        assert_eq!(state.last_error.map(|error| error.kind), Some(ErrorKind::Auth));
    }

    #[tokio::test]
    async fn select_and_back_move_between_screens() {
        let remote = MemoryNoteStore::new();
        remote.insert(ADA_ID, "one");
        let second = remote.insert(ADA_ID, "two");
        let controller = signed_in(&remote).await;

        controller.select(&second.id).unwrap();
        let state = controller.snapshot();
        assert_eq!(state.screen, Screen::Detail);
        assert_eq!(state.selected, Some(second.id.clone()));

        controller.back();
        assert_eq!(controller.snapshot().screen, Screen::List);
        assert!(matches!(
            controller.select(&NoteId::new("missing")),
            Err(Error::NoteNotFound(_))
        ));
    }

    #[tokio::test]
    async fn new_note_opens_untitled_detail() {
        let remote = MemoryNoteStore::new();
        let controller = signed_in(&remote).await;

        let note = controller.create_note().await.unwrap();

        assert_eq!(controller.snapshot().screen, Screen::Detail);
        assert_eq!(
            controller.titles(),
            vec![NoteListEntry {
                id: note.id,
                title: "Untitled Note".to_string(),
                selected: true,
                unsynced: false,
            }]
        );
    }

    #[tokio::test]
    async fn editing_selected_note_updates_its_title() {
        let remote = MemoryNoteStore::new();
        let controller = signed_in(&remote).await;
        let note = controller.create_note().await.unwrap();

        let ticket = controller.edit_selected("<p>Plan</p><p>details</p>").unwrap();
        assert_eq!(controller.titles()[0].title, "Plan");

        ticket.wait().await.unwrap();
        assert_eq!(
            remote.content(ADA_ID, &note.id).as_deref(),
            Some("<p>Plan</p><p>details</p>")
        );
    }

    #[tokio::test]
    async fn editing_without_selection_fails() {
        let remote = MemoryNoteStore::new();
        let controller = signed_in(&remote).await;
        assert!(matches!(
            controller.edit_selected("x"),
            Err(Error::NothingSelected)
        ));
    }

    #[tokio::test]
    async fn unsynced_notes_are_flagged_until_retried() {
        let remote = MemoryNoteStore::new();
        let note = remote.insert(ADA_ID, "draft");
        let controller = signed_in(&remote).await;
        remote.fail_next(StoreOp::Update);

        let failed = controller.update_content(&note.id, "final").unwrap();
        assert!(failed.wait().await.is_err());
        assert!(controller.titles()[0].unsynced);

        controller.dismiss_error();
        controller.retry_write(&note.id).await.unwrap().wait().await.unwrap();
        assert!(!controller.titles()[0].unsynced);
        assert!(controller.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn deleting_viewed_note_returns_to_list() {
        let remote = MemoryNoteStore::new();
        let note = remote.insert(ADA_ID, "temporary");
        let controller = signed_in(&remote).await;
        controller.select(&note.id).unwrap();

        controller.delete_note(&note.id).await.unwrap();

        let state = controller.snapshot();
        assert_eq!(state.screen, Screen::List);
        assert!(state.selected.is_none());
        assert!(controller.titles().is_empty());
    }

    #[tokio::test]
    async fn sign_out_clears_local_notes() {
        let remote = MemoryNoteStore::new();
        remote.insert(ADA_ID, "private");
        let controller = signed_in(&remote).await;

        controller.sign_out().await.unwrap();

        let state = controller.snapshot();
        assert_eq!(state.screen, Screen::Unauthenticated);
        assert!(state.notes.is_empty());
        assert!(state.user.is_none());
        assert!(controller.store().scope().is_none());
    }

    #[tokio::test]
    async fn signing_in_as_another_user_swaps_notes() {
        let remote = MemoryNoteStore::new();
        remote.insert(ADA_ID, "ada's note");
        remote.insert("uid-bob", "bob's note");
        let controller = signed_in(&remote).await;

        controller.sign_up("bob@example.com", "secret").await.unwrap();

        let titles: Vec<String> = controller
            .titles()
            .into_iter()
            .map(|entry| entry.title)
            .collect();
        assert_eq!(titles, vec!["bob's note".to_string()]);
    }

    #[tokio::test]
    async fn restore_reloads_persisted_user() {
        let remote = MemoryNoteStore::new();
        remote.insert(ADA_ID, "still here");
        let sessions = MemorySessionStore::default();
        signed_in_with(&remote, &sessions).await;

        let restarted = controller(&remote, &sessions);
        let restored = restarted.restore_session().await.unwrap();

        assert_eq!(restored.map(|user| user.id), Some(ADA_ID.to_string()));
        assert_eq!(restarted.titles()[0].title, "still here");
    }

    #[tokio::test]
    async fn restore_binds_refreshed_token() {
        let remote = MemoryNoteStore::new();
        let sessions = MemorySessionStore::default();
        let mut expired = FakeAuthProvider::session_for(ADA_ID, ADA);
        expired.expires_at = 0;
        sessions.save_session(&expired).unwrap();

        let controller = controller(&remote, &sessions);
        controller.restore_session().await.unwrap();

        let scope = controller.store().scope().unwrap();
        assert!(scope.access_token.ends_with("-refreshed"));
    }

    #[tokio::test]
    async fn watcher_follows_gateway_sign_out() {
        let remote = MemoryNoteStore::new();
        remote.insert(ADA_ID, "watched");
        let controller = Arc::new(signed_in(&remote).await);

        let watcher = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.watch_sessions().await }
        });
        tokio::task::yield_now().await;
        controller.gateway().sign_out().unwrap();

        for _ in 0..100 {
            if controller.snapshot().screen == Screen::Unauthenticated {
                break;
            }
            tokio::task::yield_now().await;
        }
        watcher.abort();

        assert_eq!(controller.snapshot().screen, Screen::Unauthenticated);
        assert!(controller.titles().is_empty());
    }

    fn controller_with(
        provider: &FakeAuthProvider,
        remote: &MemoryNoteStore,
        sessions: &MemorySessionStore,
    ) -> Controller {
        let gateway = AuthGateway::new(provider.clone(), sessions.clone(), "http://localhost:3000");
        ViewController::new(gateway, remote.clone())
    }

    #[tokio::test]
    async fn unreachable_provider_keeps_session_and_unsynced_edit() {
        let remote = MemoryNoteStore::new();
        let note = remote.insert(ADA_ID, "draft");
        let sessions = MemorySessionStore::default();
        let provider = FakeAuthProvider::with_account(ADA, PASSWORD);
        provider.set_expiring(true);
        let controller = controller_with(&provider, &remote, &sessions);
        controller.sign_in_with_password(ADA, PASSWORD).await.unwrap();

        remote.fail_next(StoreOp::Update);
        let failed = controller.update_content(&note.id, "final").unwrap();
        assert!(failed.wait().await.is_err());
        provider.set_offline(true);

        let result = controller.reload().await;

        assert!(matches!(result, Err(Error::Auth(AuthError::Api(_)))));
        let state = controller.snapshot();
        assert_eq!(state.screen, Screen::List);
        assert_eq!(state.last_error.as_ref().map(|error| error.kind), Some(ErrorKind::Auth));
        assert_eq!(state.note(&note.id).map(|note| note.content.as_str()), Some("final"));
        assert!(state.unsynced.contains(&note.id));
        assert!(sessions.load_session().unwrap().is_some());
        assert!(controller.store().scope().is_some());

        provider.set_offline(false);
        controller.retry_write(&note.id).await.unwrap().wait().await.unwrap();
        assert_eq!(remote.content(ADA_ID, &note.id).as_deref(), Some("final"));
    }

    #[tokio::test]
    async fn revoked_session_signs_out_on_next_remote_call() {
        let remote = MemoryNoteStore::new();
        remote.insert(ADA_ID, "private");
        let sessions = MemorySessionStore::default();
        let provider = FakeAuthProvider::with_account(ADA, PASSWORD);
        provider.set_expiring(true);
        let controller = controller_with(&provider, &remote, &sessions);
        controller.sign_in_with_password(ADA, PASSWORD).await.unwrap();
        provider.set_revoked(true);

        let result = controller.reload().await;

        assert!(matches!(result, Err(Error::Auth(AuthError::SessionExpired(_)))));
        let state = controller.snapshot();
        assert_eq!(state.screen, Screen::Unauthenticated);
        assert!(state.notes.is_empty());
        assert!(sessions.load_session().unwrap().is_none());
    }

    async fn signed_in_with(remote: &MemoryNoteStore, sessions: &MemorySessionStore) {
        controller(remote, sessions)
            .sign_in_with_password(ADA, PASSWORD)
            .await
            .unwrap();
    }
}
