//! Jot CLI - a terminal client for notes stored in your Firebase project
//!
//! Sign in, browse, and edit notes from an interactive shell.

mod auth;
mod cli;
mod commands;
mod error;
mod render;
mod shell;
#[cfg(test)]
mod tests;

use std::io;

use clap::Parser;
use jot_core::auth::{AuthGateway, FirebaseAuthClient, SessionPersistence};
use jot_core::config::{ClientConfig, ResolvedConfig};
use jot_core::controller::ViewController;
use jot_core::remote::FirestoreNoteStore;
use tokio::io::BufReader;

use crate::auth::KeyringSessionStore;
use crate::cli::{Cli, Commands};
use crate::commands::completions::run_completions;
use crate::commands::list::run_list;
use crate::error::CliError;
use crate::shell::Shell;

type FirebaseController = ViewController<FirebaseAuthClient, KeyringSessionStore, FirestoreNoteStore>;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jot_core=info".parse().unwrap())
                .add_directive("jot_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        Some(Commands::Logout) => {
            let config = resolve_config()?;
            KeyringSessionStore::new(&config.project_id).clear_session()?;
            println!("Signed out");
        }
        Some(Commands::List { json }) => {
            let controller = build_controller(&resolve_config()?)?;
            println!("{}", run_list(&controller, json).await?);
        }
        Some(Commands::Shell) | None => {
            let controller = build_controller(&resolve_config()?)?;
            if let Err(error) = controller.restore_session().await {
                tracing::warn!("Could not restore the previous session: {}", error);
            }
            let mut shell = Shell::new(controller);
            shell
                .run(BufReader::new(tokio::io::stdin()), io::stdout())
                .await?;
        }
    }

    Ok(())
}

fn resolve_config() -> Result<ResolvedConfig, CliError> {
    Ok(ClientConfig::from_env().resolve()?)
}

fn build_controller(config: &ResolvedConfig) -> Result<FirebaseController, CliError> {
    let provider = FirebaseAuthClient::new(config.api_key.clone(), config.auth_endpoints.clone())?;
    let sessions = KeyringSessionStore::new(&config.project_id);
    let gateway = AuthGateway::new(provider, sessions, config.redirect_url.clone());
    let remote = FirestoreNoteStore::new(config.documents_url.clone())?;
    Ok(ViewController::new(gateway, remote))
}
