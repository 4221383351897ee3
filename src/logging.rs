//! File logging. The terminal belongs to the TUI, so logs go to a file.

use std::path::{Path, PathBuf};

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `datausage=debug`
pub const LOG_ENV: &str = "DATAUSAGE_LOG";
pub const LOG_FILE: &str = "datausage.log";

/// `<data_dir>/datausage`
pub fn default_log_dir() -> Result<PathBuf> {
  dirs::data_dir()
    .map(|dir| dir.join("datausage"))
    .ok_or_else(|| eyre!("Could not determine data directory"))
}

fn filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber writing to `<dir>/datausage.log`.
///
/// Keep the returned guard alive until exit, or buffered lines are lost.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(filter())
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_log_dir_is_namespaced() {
    if let Ok(dir) = default_log_dir() {
      assert!(dir.ends_with("datausage"));
    }
  }

  #[test]
  fn test_init_creates_directory() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("logs");
    // Another test may already own the global subscriber
    let _ = init(&dir);
    assert!(dir.is_dir());
  }
}
