//! Runtime settings resolved from the command line and environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::error::{Error, Result};

const DATA_DIR: &str = ".taskboard";
const DB_FILE: &str = "tasks.json";
pub const LOG_FILE: &str = "taskboard.log";

/// Where the store lives.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreLocation {
    Local(PathBuf),
    Remote { url: String, token: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub store: StoreLocation,
    /// Directory holding the database and the board's log file.
    pub data_dir: PathBuf,
    pub token: Option<String>,
    pub timeout: Duration,
    pub log_filter: String,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self::resolve(cli, PathBuf::from(home).join(DATA_DIR))
    }

    fn resolve(cli: &Cli, default_dir: PathBuf) -> Result<Self> {
        if cli.timeout_secs == 0 {
            return Err(Error::validation("--timeout-secs must be at least 1"));
        }
        let db_path = cli.db.clone().unwrap_or_else(|| default_dir.join(DB_FILE));
        let data_dir = db_path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        let token = cli.token.clone().filter(|t| !t.trim().is_empty());

        let store = match cli.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => {
                let token = token
                    .clone()
                    .ok_or_else(|| Error::Auth("--token (or TASKBOARD_TOKEN) is required with --url".into()))?;
                StoreLocation::Remote {
                    url: url.to_string(),
                    token,
                }
            }
            None => StoreLocation::Local(db_path),
        };

        Ok(Settings {
            store,
            data_dir,
            token,
            timeout: Duration::from_secs(cli.timeout_secs),
            log_filter: cli.log.clone(),
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }

    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tb").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_local_defaults() {
        let cli = parse(&["--url", "", "list"]);
        let settings = Settings::resolve(&cli, PathBuf::from("/home/ana/.taskboard")).unwrap();
        assert_eq!(settings.store, StoreLocation::Local(PathBuf::from("/home/ana/.taskboard/tasks.json")));
        assert_eq!(settings.log_path(), PathBuf::from("/home/ana/.taskboard/taskboard.log"));
        assert_eq!(settings.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_explicit_db_sets_data_dir() {
        let cli = parse(&["--url", "", "--db", "/srv/shop/board.json", "--timeout-secs", "3", "list"]);
        let settings = Settings::resolve(&cli, PathBuf::from("/unused")).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/srv/shop"));
        assert_eq!(settings.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_remote_requires_token() {
        let cli = parse(&["--url", "http://10.0.0.5:8080/api", "--token", "", "list"]);
        let err = Settings::resolve(&cli, PathBuf::from("/tmp")).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));

        let cli = parse(&["--url", "http://10.0.0.5:8080/api", "--token", "abc", "list"]);
        let settings = Settings::resolve(&cli, PathBuf::from("/tmp")).unwrap();
        assert_eq!(
            settings.store,
            StoreLocation::Remote {
                url: "http://10.0.0.5:8080/api".into(),
                token: "abc".into()
            }
        );
    }
}
