//! Tracing setup. Log lines go to a timestamped file, or stderr when the
//! log directory is unusable; stdout stays reserved for conversation output.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use time::macros::format_description;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

/// Where log output ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
    /// A global subscriber was already installed; nothing changed.
    AlreadyInitialized,
}

/// `<log_dir>/<YYYY-MM-DDTHH-MM-SS>.log` for the current UTC time.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    let format = format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]");
    let stamp = OffsetDateTime::now_utc()
        .format(format)
        .unwrap_or_else(|_| "ttt".to_string());
    log_dir.join(format!("{stamp}.log"))
}

/// Parses `filter` as an env-filter directive, falling back to `info`.
pub fn env_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber once.
pub fn init(log_dir: &Path, filter: &str) -> LogTarget {
    match open_log_file(log_dir) {
        Ok((path, file)) => {
            let installed = tracing_subscriber::fmt()
                .with_env_filter(env_filter(filter))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            if installed.is_err() {
                return LogTarget::AlreadyInitialized;
            }
            tracing::info!(path = %path.display(), "logging started");
            LogTarget::File(path)
        }
        Err(error) => {
            let installed = tracing_subscriber::fmt()
                .with_env_filter(env_filter(filter))
                .with_writer(io::stderr)
                .try_init();
            if installed.is_err() {
                return LogTarget::AlreadyInitialized;
            }
            tracing::warn!(dir = %log_dir.display(), %error, "log directory unusable; logging to stderr");
            LogTarget::Stderr
        }
    }
}

fn open_log_file(log_dir: &Path) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir);
    let file = File::options().create(true).append(true).open(&path)?;
    Ok((path, file))
}
