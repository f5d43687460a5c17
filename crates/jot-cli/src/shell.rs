//! Interactive shell: one text command per line, the current screen after each.

use std::io::Write;

use jot_core::auth::{AuthProvider, LinkSignInAttempt, SessionPersistence};
use jot_core::controller::{NoteListEntry, ViewController};
use jot_core::remote::RemoteNoteStore;
use jot_core::store::WriteTicket;
use jot_core::NoteId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::CliError;
use crate::render::{render_screen, HELP};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    SignIn { email: String, password: String },
    SignUp { email: String, password: String },
    Link { email: String },
    Complete { link: String, email: Option<String> },
    SignOut,
    List,
    New,
    Open(String),
    Edit(String),
    Delete(Option<String>),
    Back,
    Reload,
    Retry(Option<String>),
    Dismiss,
    Show,
    Help,
    Quit,
}

fn usage(form: &str) -> CliError {
    CliError::Usage(format!("Usage: {form}"))
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>, CliError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (name, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(name, rest)| (name, rest.trim()));
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match name.to_ascii_lowercase().as_str() {
        "signin" | "login" => {
            let [email, password] = args.as_slice() else {
                return Err(usage("signin <email> <password>"));
            };
            ShellCommand::SignIn {
                email: (*email).to_string(),
                password: (*password).to_string(),
            }
        }
        "signup" => {
            let [email, password] = args.as_slice() else {
                return Err(usage("signup <email> <password>"));
            };
            ShellCommand::SignUp {
                email: (*email).to_string(),
                password: (*password).to_string(),
            }
        }
        "link" => {
            let [email] = args.as_slice() else {
                return Err(usage("link <email>"));
            };
            ShellCommand::Link {
                email: (*email).to_string(),
            }
        }
        "complete" => match args.as_slice() {
            [link] => ShellCommand::Complete {
                link: (*link).to_string(),
                email: None,
            },
            [link, email] => ShellCommand::Complete {
                link: (*link).to_string(),
                email: Some((*email).to_string()),
            },
            _ => return Err(usage("complete <link> [email]")),
        },
        "signout" | "logout" => ShellCommand::SignOut,
        "list" | "ls" => ShellCommand::List,
        "new" => ShellCommand::New,
        "open" => {
            let [target] = args.as_slice() else {
                return Err(usage("open <number|id>"));
            };
            ShellCommand::Open((*target).to_string())
        }
        "edit" => {
            if rest.is_empty() {
                return Err(usage("edit <text>"));
            }
            ShellCommand::Edit(rest.replace("\\n", "\n"))
        }
        "delete" | "rm" => ShellCommand::Delete(optional_target(&args, "delete [number|id]")?),
        "back" => ShellCommand::Back,
        "reload" => ShellCommand::Reload,
        "retry" => ShellCommand::Retry(optional_target(&args, "retry [number|id]")?),
        "dismiss" => ShellCommand::Dismiss,
        "show" => ShellCommand::Show,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => {
            return Err(CliError::Usage(format!(
                "Unknown command `{other}`. Type `help` for a list."
            )))
        }
    };
    Ok(Some(command))
}

fn optional_target(args: &[&str], form: &str) -> Result<Option<String>, CliError> {
    match args {
        [] => Ok(None),
        [target] => Ok(Some((*target).to_string())),
        _ => Err(usage(form)),
    }
}

/// Resolve a 1-based list number, a full id, or a unique id prefix.
pub fn resolve_note(entries: &[NoteListEntry], target: &str) -> Result<NoteId, CliError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(CliError::NoteNotFound(String::new()));
    }

    if let Ok(number) = target.parse::<usize>() {
        if let Some(entry) = number.checked_sub(1).and_then(|index| entries.get(index)) {
            return Ok(entry.id.clone());
        }
    }

    if let Some(entry) = entries.iter().find(|entry| entry.id.as_str() == target) {
        return Ok(entry.id.clone());
    }

    let matches: Vec<&NoteListEntry> = entries
        .iter()
        .filter(|entry| entry.id.as_str().starts_with(target))
        .collect();
    match matches.as_slice() {
        [entry] => Ok(entry.id.clone()),
        [] => Err(CliError::NoteNotFound(target.to_string())),
        _ => Err(CliError::AmbiguousNoteId(format!(
            "Note id prefix `{target}` matches {} notes",
            matches.len()
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell<P: AuthProvider, S: SessionPersistence, R: RemoteNoteStore> {
    controller: ViewController<P, S, R>,
    pending_link: Option<LinkSignInAttempt>,
    tickets: Vec<WriteTicket>,
}

impl<P, S, R> Shell<P, S, R>
where
    P: AuthProvider,
    S: SessionPersistence,
    R: RemoteNoteStore,
{
    pub const fn new(controller: ViewController<P, S, R>) -> Self {
        Self {
            controller,
            pending_link: None,
            tickets: Vec::new(),
        }
    }

    pub const fn controller(&self) -> &ViewController<P, S, R> {
        &self.controller
    }

    pub fn screen(&self) -> String {
        render_screen(&self.controller.snapshot(), &self.controller.titles())
    }

    fn target_or_selected(&self, target: Option<&str>) -> Result<NoteId, CliError> {
        match target {
            Some(target) => resolve_note(&self.controller.titles(), target),
            None => self
                .controller
                .snapshot()
                .selected
                .ok_or_else(|| CliError::Usage("No note is open; pass a number or id".to_string())),
        }
    }

    /// Run one command and return the text to show for it.
    pub async fn execute(&mut self, command: ShellCommand) -> Result<(Flow, String), CliError> {
        self.tickets.retain(|ticket| !ticket.is_finished());

        let output = match command {
            ShellCommand::SignIn { email, password } => {
                self.controller
                    .sign_in_with_password(&email, &password)
                    .await?;
                self.screen()
            }
            ShellCommand::SignUp { email, password } => {
                self.controller.sign_up(&email, &password).await?;
                self.screen()
            }
            ShellCommand::Link { email } => {
                let attempt = self.controller.send_passwordless_link(&email).await?;
                let message = format!(
                    "Sent a sign-in link to {}. Paste it here with `complete <link>`.",
                    attempt.email()
                );
                self.pending_link = Some(attempt);
                message
            }
            ShellCommand::Complete { link, email } => {
                let attempt = match email {
                    Some(email) => LinkSignInAttempt::for_email(&email)?,
                    None => self
                        .pending_link
                        .clone()
                        .ok_or(CliError::NoPendingLink)?,
                };
                self.controller
                    .complete_passwordless_sign_in(&link, &attempt)
                    .await?;
                self.pending_link = None;
                self.screen()
            }
            ShellCommand::SignOut => {
                let mut lines = self.flush().await;
                self.controller.sign_out().await?;
                self.pending_link = None;
                lines.push(self.screen());
                lines.join("\n")
            }
            ShellCommand::List | ShellCommand::Back => {
                self.controller.back();
                self.screen()
            }
            ShellCommand::New => {
                self.controller.create_note().await?;
                self.screen()
            }
            ShellCommand::Open(target) => {
                let id = resolve_note(&self.controller.titles(), &target)?;
                self.controller.select(&id)?;
                self.screen()
            }
            ShellCommand::Edit(content) => {
                let ticket = self.controller.edit_selected(content)?;
                self.tickets.push(ticket);
                self.screen()
            }
            ShellCommand::Delete(target) => {
                let id = self.target_or_selected(target.as_deref())?;
                self.controller.delete_note(&id).await?;
                self.screen()
            }
            ShellCommand::Reload => {
                self.controller.reload().await?;
                self.screen()
            }
            ShellCommand::Retry(target) => {
                let id = self.target_or_selected(target.as_deref())?;
                self.controller.retry_write(&id).await?.wait().await?;
                self.screen()
            }
            ShellCommand::Dismiss => {
                self.controller.dismiss_error();
                self.screen()
            }
            ShellCommand::Show => self.screen(),
            ShellCommand::Help => HELP.to_string(),
            ShellCommand::Quit => return Ok((Flow::Quit, String::new())),
        };
        Ok((Flow::Continue, output))
    }

    /// Wait for every queued save and describe the ones that failed.
    pub async fn flush(&mut self) -> Vec<String> {
        let mut failures = Vec::new();
        for ticket in std::mem::take(&mut self.tickets) {
            let id = ticket.note_id().clone();
            if let Err(error) = ticket.wait().await {
                failures.push(format!("Warning: note {id} was not saved: {error}"));
            }
        }
        failures
    }

    /// Read commands from `input` until `quit` or end of input.
    pub async fn run<I, W>(&mut self, input: I, mut output: W) -> Result<(), CliError>
    where
        I: AsyncBufRead + Unpin,
        W: Write,
    {
        writeln!(output, "{}", self.screen())?;
        let mut lines = input.lines();
        loop {
            write!(output, "jot> ")?;
            output.flush()?;
            let Some(line) = lines.next_line().await? else {
                writeln!(output)?;
                break;
            };

            let command = match parse_command(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(error) => {
                    writeln!(output, "Error: {error}")?;
                    continue;
                }
            };

            match self.execute(command).await {
                Ok((Flow::Quit, _)) => break,
                Ok((Flow::Continue, text)) => writeln!(output, "{text}")?,
                Err(error) => writeln!(output, "Error: {error}")?,
            }
        }

        for failure in self.flush().await {
            writeln!(output, "{failure}")?;
        }
        Ok(())
    }
}
