//! Tracing setup.
//!
//! Commands log to stderr. The board owns the terminal, so it logs to a file
//! in the data directory instead.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

fn filter(spec: &str) -> EnvFilter {
    EnvFilter::try_new(spec).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init_stderr(spec: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(spec))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Io(format!("cannot install logger: {e}")))
}

pub fn init_file(spec: &str, path: &Path) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter(spec))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| Error::Io(format!("cannot install logger: {e}")))
}
