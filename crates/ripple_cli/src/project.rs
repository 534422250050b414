//! Shared helpers for CLI commands: project root resolution and opening the
//! build history a project's configuration points at.

use std::path::{Path, PathBuf};

use ripple_cache::BuildHistory;
use ripple_config::{ProjectConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing `ripple.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match &global.config {
        Some(config_path) => {
            let path = PathBuf::from(config_path);
            if path.is_file() {
                Ok(path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(".")))
            } else {
                Ok(path)
            }
        }
        None => find_project_root(&std::env::current_dir()?),
    }
}

/// Opens the build history under the project's configured cache directory.
pub fn open_history(project_dir: &Path, config: &ProjectConfig) -> BuildHistory {
    BuildHistory::new(
        &project_dir.join(&config.incremental.cache_dir),
        &config.compiler.version,
    )
}
