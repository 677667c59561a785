use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Kanban task board for the shop admin.
/// Works on a local JSON database by default, or on a remote store via --url.
#[derive(Parser)]
#[command(name = "tb", version, about = "Kanban task board and task store")]
pub struct Cli {
    /// Path to the JSON database file. Defaults to ~/.taskboard/tasks.json.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Base URL of a remote task store API, e.g. http://host:8080/api.
    #[arg(long, global = true, env = "TASKBOARD_URL")]
    pub url: Option<String>,

    /// Bearer token for the remote store, or the token `serve` accepts.
    #[arg(long, global = true, env = "TASKBOARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Timeout for store requests and move confirmations, in seconds.
    #[arg(long, global = true, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Log filter, e.g. "info" or "taskboard=debug".
    #[arg(long, global = true, env = "TASKBOARD_LOG", default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Commands,
}
