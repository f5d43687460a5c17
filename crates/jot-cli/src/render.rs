use std::fmt::Write as _;

use jot_core::controller::NoteListEntry;
use jot_core::state::{AppState, ErrorKind, LoadStatus, Screen};
use serde::Serialize;

pub const HELP: &str = "\
Commands:
  signin <email> <password>    Sign in with email and password
  signup <email> <password>    Create an account
  link <email>                 Email a passwordless sign-in link
  complete <link> [email]      Finish signing in with a link from your inbox
  signout                      Sign out and forget local notes
  list                         Show note titles
  new                          Create a note and open it
  open <n|id>                  Open a note by list number or id prefix
  edit <text>                  Replace the open note's content (\\n for newlines)
  delete [n|id]                Delete a note (the open one by default)
  back                         Return to the list
  reload                       Fetch notes again
  retry [n|id]                 Re-send a note that failed to save
  dismiss                      Hide the current error
  show                         Redraw the current screen
  help                         Show this help
  quit                         Wait for pending saves and exit";

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub unsynced: bool,
}

impl From<&NoteListEntry> for NoteListItem {
    fn from(entry: &NoteListEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            title: entry.title.clone(),
            unsynced: entry.unsynced,
        }
    }
}

/// Text for whatever screen the state is on, followed by any pending error.
pub fn render_screen(state: &AppState, entries: &[NoteListEntry]) -> String {
    let mut output = match state.screen {
        Screen::Unauthenticated => {
            "Not signed in. Use `signin`, `signup` or `link` (`help` for more).".to_string()
        }
        Screen::List => render_list(state, entries),
        Screen::Detail => render_detail(state),
    };

    if let Some(error) = &state.last_error {
        let label = match error.kind {
            ErrorKind::Auth => "auth",
            ErrorKind::Store => "store",
        };
        let _ = write!(output, "\n! {label} error: {} (`dismiss` to hide)", error.message);
    }
    output
}

fn render_list(state: &AppState, entries: &[NoteListEntry]) -> String {
    let owner = state
        .user
        .as_ref()
        .map(|user| user.email.clone().unwrap_or_else(|| user.id.clone()))
        .unwrap_or_default();
    let mut output = format!("Notes for {owner}");

    match &state.load_status {
        LoadStatus::Loading => output.push_str(" (loading...)"),
        LoadStatus::Failed(_) => output.push_str(" (load failed, try `reload`)"),
        LoadStatus::Idle | LoadStatus::Ready => {}
    }

    if entries.is_empty() {
        output.push_str("\n  (no notes, `new` creates one)");
    }
    for (index, entry) in entries.iter().enumerate() {
        let marker = if entry.selected { '>' } else { ' ' };
        let unsynced = if entry.unsynced { " [unsaved]" } else { "" };
        let _ = write!(
            output,
            "\n{marker} {number:>2}. {title}{unsynced}",
            number = index + 1,
            title = entry.title
        );
    }
    output
}

fn render_detail(state: &AppState) -> String {
    let Some(note) = state.selected_note() else {
        return "No note selected.".to_string();
    };
    let unsynced = if state.unsynced.contains(&note.id) {
        " [unsaved]"
    } else {
        ""
    };
    let body = if note.content.is_empty() {
        "(empty, use `edit <text>`)"
    } else {
        note.content.as_str()
    };
    format!("# {}{unsynced}\n{body}", note.title())
}

/// One line per note for non-interactive listing.
pub fn render_titles(entries: &[NoteListEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}\t{}", entry.id, entry.title))
        .collect::<Vec<_>>()
        .join("\n")
}
