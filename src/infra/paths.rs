// src/infra/paths.rs — Path management
//
// All paths respect the LISTBOT_HOME environment variable for isolation.
// When LISTBOT_HOME is set, config and data live under that directory.
// When unset, config uses ~/.listbot/ and data uses XDG_DATA_HOME/listbot.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "listbot"))
        .as_ref()
}

/// Returns the LISTBOT_HOME override, if set.
fn listbot_home() -> Option<PathBuf> {
    std::env::var_os("LISTBOT_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $LISTBOT_HOME/ or ~/.listbot/
pub fn config_dir() -> PathBuf {
    if let Some(home) = listbot_home() {
        return home;
    }
    dirs_home().join(".listbot")
}

/// Data directory: $LISTBOT_HOME/data/ or ~/.local/share/listbot/
pub fn data_dir() -> PathBuf {
    if let Some(home) = listbot_home() {
        return home.join("data");
    }
    project_dirs()
        .map(|d| d.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

/// Session store file (tokens, templates, postal codes)
pub fn sessions_file() -> PathBuf {
    data_dir().join("sessions.json")
}

/// Log artifacts (LLM usage records)
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir(), logs_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
