use jot_core::auth::{AuthProvider, SessionPersistence};
use jot_core::controller::ViewController;
use jot_core::remote::RemoteNoteStore;

use crate::error::CliError;
use crate::render::{render_titles, NoteListItem};

/// Print the restored user's notes without opening the shell.
pub async fn run_list<P, S, R>(
    controller: &ViewController<P, S, R>,
    as_json: bool,
) -> Result<String, CliError>
where
    P: AuthProvider,
    S: SessionPersistence,
    R: RemoteNoteStore,
{
    if controller.restore_session().await?.is_none() {
        return Err(CliError::NotSignedIn);
    }

    let entries = controller.titles();
    if as_json {
        let items = entries.iter().map(NoteListItem::from).collect::<Vec<_>>();
        Ok(serde_json::to_string_pretty(&items)?)
    } else {
        Ok(render_titles(&entries))
    }
}
