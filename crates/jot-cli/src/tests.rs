use std::sync::{Arc, Mutex, PoisonError};

use jot_core::auth::{
    AuthError, AuthGateway, AuthProvider, AuthResult, AuthSession, AuthUser, MemorySessionStore,
    SessionPersistence,
};
use jot_core::controller::{NoteListEntry, ViewController};
use jot_core::remote::MemoryNoteStore;
use jot_core::state::{AppEvent, AppState, UiError};
use jot_core::util::unix_timestamp_now;
use jot_core::{Note, NoteId};
use pretty_assertions::assert_eq;

use crate::cli::CompletionShell;
use crate::commands::completions::render_completions;
use crate::commands::list::run_list;
use crate::error::CliError;
use crate::render::{render_screen, render_titles};
use crate::shell::{parse_command, resolve_note, Flow, Shell, ShellCommand};

const PASSWORD: &str = "hunter22";

#[derive(Clone, Default)]
struct StubAuth {
    last_continue_url: Arc<Mutex<Option<String>>>,
}

impl StubAuth {
    fn last_continue_url(&self) -> Option<String> {
        self.last_continue_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn session_for(email: &str) -> AuthSession {
    let local = email.split('@').next().unwrap_or_default();
    AuthSession {
        id_token: format!("token-{local}"),
        refresh_token: format!("refresh-{local}"),
        expires_at: unix_timestamp_now() + 3600,
        user: AuthUser {
            id: format!("uid-{local}"),
            email: Some(email.to_string()),
        },
    }
}

impl AuthProvider for StubAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        if password == PASSWORD {
            Ok(session_for(email))
        } else {
            Err(AuthError::InvalidCredentials("INVALID_PASSWORD".to_string()))
        }
    }

    async fn sign_up(&self, email: &str, _password: &str) -> AuthResult<AuthSession> {
        Ok(session_for(email))
    }

    async fn send_sign_in_link(&self, _email: &str, continue_url: &str) -> AuthResult<()> {
        *self
            .last_continue_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(continue_url.to_string());
        Ok(())
    }

    async fn sign_in_with_email_link(&self, email: &str, _oob_code: &str) -> AuthResult<AuthSession> {
        Ok(session_for(email))
    }

    async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        Ok(session_for(session.user.email.as_deref().unwrap_or_default()))
    }
}

type TestController = ViewController<StubAuth, MemorySessionStore, MemoryNoteStore>;

fn controller_with(
    auth: StubAuth,
    remote: &MemoryNoteStore,
    sessions: &MemorySessionStore,
) -> TestController {
    let gateway = AuthGateway::new(auth, sessions.clone(), "http://localhost:3000");
    ViewController::new(gateway, remote.clone())
}

fn controller(remote: &MemoryNoteStore, sessions: &MemorySessionStore) -> TestController {
    controller_with(StubAuth::default(), remote, sessions)
}

fn shell(remote: &MemoryNoteStore) -> Shell<StubAuth, MemorySessionStore, MemoryNoteStore> {
    Shell::new(controller(remote, &MemorySessionStore::default()))
}

fn entry(id: &str, title: &str) -> NoteListEntry {
    NoteListEntry {
        id: NoteId::new(id),
        title: title.to_string(),
        selected: false,
        unsynced: false,
    }
}

#[test]
fn parse_blank_line_is_nothing() {
    assert_eq!(parse_command("   ").unwrap(), None);
}

#[test]
fn parse_sign_in_requires_email_and_password() {
    assert_eq!(
        parse_command("signin ada@example.com hunter22").unwrap(),
        Some(ShellCommand::SignIn {
            email: "ada@example.com".to_string(),
            password: "hunter22".to_string(),
        })
    );
    assert!(matches!(
        parse_command("signin ada@example.com"),
        Err(CliError::Usage(_))
    ));
}

#[test]
fn parse_edit_keeps_spacing_and_expands_newlines() {
    assert_eq!(
        parse_command("edit <p>Title</p>  with  spaces\\nsecond line").unwrap(),
        Some(ShellCommand::Edit(
            "<p>Title</p>  with  spaces\nsecond line".to_string()
        ))
    );
    assert!(matches!(parse_command("edit"), Err(CliError::Usage(_))));
}

#[test]
fn parse_optional_targets() {
    assert_eq!(
        parse_command("delete").unwrap(),
        Some(ShellCommand::Delete(None))
    );
    assert_eq!(
        parse_command("rm 2").unwrap(),
        Some(ShellCommand::Delete(Some("2".to_string())))
    );
    assert_eq!(
        parse_command("complete https://x.test/?a=b ada@example.com").unwrap(),
        Some(ShellCommand::Complete {
            link: "https://x.test/?a=b".to_string(),
            email: Some("ada@example.com".to_string()),
        })
    );
}

#[test]
fn parse_unknown_command_is_an_error() {
    let error = parse_command("frobnicate").unwrap_err();
    assert!(error.to_string().contains("frobnicate"));
}

#[test]
fn resolve_note_by_number_id_or_prefix() {
    let entries = vec![entry("abc123", "First"), entry("abd456", "Second")];
    assert_eq!(resolve_note(&entries, "2").unwrap(), NoteId::new("abd456"));
    assert_eq!(resolve_note(&entries, "abc123").unwrap(), NoteId::new("abc123"));
    assert_eq!(resolve_note(&entries, "abd").unwrap(), NoteId::new("abd456"));
    assert!(matches!(
        resolve_note(&entries, "ab"),
        Err(CliError::AmbiguousNoteId(_))
    ));
    assert!(matches!(
        resolve_note(&entries, "9"),
        Err(CliError::NoteNotFound(_))
    ));
}

#[test]
fn render_unauthenticated_screen() {
    let output = render_screen(&AppState::default(), &[]);
    assert!(output.starts_with("Not signed in."));
}

#[test]
fn render_list_marks_selection_unsynced_and_errors() {
    let state = AppState::default()
        .reduce(AppEvent::SessionStarted(AuthUser {
            id: "uid-ada".to_string(),
            email: Some("ada@example.com".to_string()),
        }))
        .reduce(AppEvent::Failed(UiError::store("quota exceeded")));
    let entries = vec![
        NoteListEntry {
            selected: true,
            ..entry("a", "Groceries")
        },
        NoteListEntry {
            unsynced: true,
            ..entry("b", "Plans")
        },
    ];

    let output = render_screen(&state, &entries);
    assert_eq!(
        output,
        "Notes for ada@example.com\n>  1. Groceries\n   2. Plans [unsaved]\n! store error: quota exceeded (`dismiss` to hide)"
    );
}

#[test]
fn render_detail_shows_title_and_body() {
    let note = Note::new("a", "<h1>Trip</h1>\npack bags");
    let state = AppState::default()
        .reduce(AppEvent::SessionStarted(AuthUser {
            id: "uid-ada".to_string(),
            email: None,
        }))
        .reduce(AppEvent::LoadStarted);
    let generation = state.generation();
    let state = state
        .reduce(AppEvent::NotesLoaded {
            generation,
            notes: vec![note.clone()],
        })
        .reduce(AppEvent::NoteSelected(note.id));

    assert_eq!(
        render_screen(&state, &[]),
        "# Trip\n<h1>Trip</h1>\npack bags"
    );
}

#[test]
fn render_titles_is_tab_separated() {
    let entries = vec![entry("a", "One"), entry("b", "Two")];
    assert_eq!(render_titles(&entries), "a\tOne\nb\tTwo");
}

#[test]
fn completions_reference_the_binary_name() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("jot"));
}

#[tokio::test]
async fn scripted_session_creates_and_saves_a_note() {
    let remote = MemoryNoteStore::new();
    let mut shell = shell(&remote);
    let script = b"signin ada@example.com hunter22\nnew\nedit <p>Hello</p><p>there</p>\nlist\nquit\n";
    let mut output = Vec::new();

    shell.run(&script[..], &mut output).await.unwrap();

    let notes = remote.notes("uid-ada");
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].content, "<p>Hello</p><p>there</p>");
    let printed = String::from_utf8(output).unwrap();
    assert!(printed.contains(">  1. Hello"));
}

#[tokio::test]
async fn failed_sign_in_is_reported_and_shell_continues() {
    let remote = MemoryNoteStore::new();
    let mut shell = shell(&remote);

    let error = shell
        .execute(ShellCommand::SignIn {
            email: "ada@example.com".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::Core(jot_core::Error::Auth(_))));
    assert!(shell.screen().contains("! auth error"));

    let (flow, _) = shell.execute(ShellCommand::Help).await.unwrap();
    assert_eq!(flow, Flow::Continue);
}

#[tokio::test]
async fn complete_needs_a_pending_link_or_email() {
    let remote = MemoryNoteStore::new();
    let auth = StubAuth::default();
    let mut shell = Shell::new(controller_with(
        auth.clone(),
        &remote,
        &MemorySessionStore::default(),
    ));
    let bare_link = "http://localhost:3000/?mode=signIn&oobCode=abc".to_string();

    let error = shell
        .execute(ShellCommand::Complete {
            link: bare_link.clone(),
            email: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::NoPendingLink));

    shell
        .execute(ShellCommand::Link {
            email: "carol@example.com".to_string(),
        })
        .await
        .unwrap();

    let error = shell
        .execute(ShellCommand::Complete {
            link: bare_link,
            email: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(jot_core::Error::Auth(AuthError::LinkMismatch))
    ));

    let link = format!(
        "{}&mode=signIn&oobCode=abc",
        auth.last_continue_url().unwrap()
    );
    shell
        .execute(ShellCommand::Complete { link, email: None })
        .await
        .unwrap();
    assert_eq!(
        shell.controller().user().map(|user| user.id),
        Some("uid-carol".to_string())
    );
}

#[tokio::test]
async fn complete_with_email_accepts_a_link_from_elsewhere() {
    let remote = MemoryNoteStore::new();
    let mut shell = shell(&remote);

    shell
        .execute(ShellCommand::Complete {
            link: "http://localhost:3000/?mode=signIn&oobCode=abc".to_string(),
            email: Some("dan@example.com".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(
        shell.controller().user().map(|user| user.id),
        Some("uid-dan".to_string())
    );
}

#[tokio::test]
async fn delete_defaults_to_the_open_note() {
    let remote = MemoryNoteStore::new();
    remote.insert("uid-ada", "keep");
    let doomed = remote.insert("uid-ada", "doomed");
    let mut shell = shell(&remote);

    shell
        .execute(ShellCommand::SignIn {
            email: "ada@example.com".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap();
    shell
        .execute(ShellCommand::Open("2".to_string()))
        .await
        .unwrap();
    shell.execute(ShellCommand::Delete(None)).await.unwrap();

    let remaining = remote.notes("uid-ada");
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].id, doomed.id);
}

#[tokio::test]
async fn list_command_prints_json_for_restored_user() {
    let remote = MemoryNoteStore::new();
    remote.insert("uid-ada", "<p>Groceries</p>");
    let sessions = MemorySessionStore::default();
    sessions.save_session(&session_for("ada@example.com")).unwrap();

    let output = run_list(&controller(&remote, &sessions), true).await.unwrap();

    let items: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(items[0]["title"], "Groceries");
    assert_eq!(items[0]["unsynced"], false);
}

#[tokio::test]
async fn list_command_requires_a_session() {
    let remote = MemoryNoteStore::new();
    let result = run_list(&controller(&remote, &MemorySessionStore::default()), false).await;
    assert!(matches!(result, Err(CliError::NotSignedIn)));
}
