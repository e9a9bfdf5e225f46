//! Subcommands.

pub mod batch;
pub mod config;
pub mod process;
pub mod serve;

use std::path::{Path, PathBuf};

use tracing::debug;

use invex_core::InvexConfig;

/// `<config_dir>/invex/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invex")
        .join("config.json")
}

/// Config file in effect: the `--config` argument or the default location.
pub fn config_file(config_path: Option<&str>) -> PathBuf {
    config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

/// Load the configuration and apply environment overrides.
///
/// An explicit `--config` file must exist; the default file is optional.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<InvexConfig> {
    let mut config = match config_path {
        Some(path) => InvexConfig::from_file(Path::new(path))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                debug!("Loading configuration from {}", path.display());
                InvexConfig::from_file(&path)?
            } else {
                InvexConfig::default()
            }
        }
    };

    config.apply_env();
    Ok(config)
}

/// Output directory from the command line or configuration, created if missing.
pub fn prepare_output_dir(arg: Option<PathBuf>, config: &InvexConfig) -> anyhow::Result<PathBuf> {
    let dir = arg.unwrap_or_else(|| config.pipeline.output_dir.clone());
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
