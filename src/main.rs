//! # tb - Kanban task board
//!
//! Task and project tracking for a small shop's admin panel.
//!
//! ## Key Features
//!
//! - **Task Store**: Tasks with status, priority, due date, assignee and one level of subtasks,
//!   plus notes, time entries and projects, kept in a single JSON file
//! - **REST API**: `tb serve` exposes the store under `/api`, guarded by a bearer token
//! - **Kanban Board**: `tb board` shows To Do / In Progress / Done and applies moves
//!   immediately, confirming them with the store in the background and rolling back on failure
//! - **Remote Mode**: every command works against a running server via `--url` and `--token`
//!
//! ## Quick Start
//!
//! ```bash
//! # Add a task and open the board
//! tb add "Restock shipping boxes" --priority high --due tomorrow
//! tb board
//!
//! # Serve the same database to the web panel
//! TASKBOARD_TOKEN=secret tb serve --bind 0.0.0.0:8080
//!
//! # Work against that server from another machine
//! tb --url http://shop:8080/api --token secret list
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error};

pub mod board;
pub mod cli;
pub mod client;
pub mod cmd;
pub mod config;
pub mod controller;
pub mod db;
pub mod drag;
pub mod error;
pub mod fields;
pub mod logging;
pub mod project;
pub mod server;
pub mod store;
pub mod task;
pub mod view;
pub mod tui {
    pub mod board;
    pub mod colors;
    pub mod run;
}

use cli::Cli;
use client::HttpStore;
use cmd::Commands;
use config::{Settings, StoreLocation};
use controller::BoardController;
use error::{Error, Result};
use store::{LocalStore, TaskStore};
use task::TaskFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(kind = e.kind(), "{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Completions neither log nor touch a store.
    if let Commands::Completions { shell } = &cli.command {
        cmd::cmd_completions(*shell);
        return Ok(());
    }

    let settings = Settings::from_cli(&cli)?;
    settings.ensure_data_dir()?;
    match &cli.command {
        Commands::Board { .. } => logging::init_file(&settings.log_filter, &settings.log_path())?,
        _ => logging::init_stderr(&settings.log_filter)?,
    }
    match &settings.store {
        StoreLocation::Local(path) => debug!(db = %path.display(), "using local store"),
        StoreLocation::Remote { url, .. } => debug!(%url, "using remote store"),
    }

    match cli.command {
        Commands::Serve { bind } => {
            let StoreLocation::Local(path) = &settings.store else {
                return Err(Error::Conflict("serve works on a local database, drop --url".into()));
            };
            let token = settings
                .token
                .clone()
                .ok_or_else(|| Error::Auth("serve needs --token (or TASKBOARD_TOKEN)".into()))?;
            server::serve(LocalStore::open(path)?, token, bind).await
        }
        Commands::Board { project, assignee } => {
            let store: Arc<dyn TaskStore> = match &settings.store {
                StoreLocation::Local(path) => Arc::new(LocalStore::open(path)?),
                StoreLocation::Remote { url, token } => Arc::new(HttpStore::new(url, token, settings.timeout)?),
            };
            let controller = BoardController::new(store).with_confirm_timeout(settings.timeout);
            let filter = TaskFilter {
                project_id: project,
                assignee_id: assignee,
                ..TaskFilter::default()
            };
            tui::run::run_board(controller, filter).await
        }
        command => match &settings.store {
            StoreLocation::Local(path) => cmd::run(command, Arc::new(LocalStore::open(path)?), &settings).await,
            StoreLocation::Remote { url, token } => {
                let store = HttpStore::new(url, token, settings.timeout)?;
                cmd::run(command, Arc::new(store), &settings).await
            }
        },
    }
}
