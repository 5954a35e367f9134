//! Command handlers -- one module per subcommand

pub mod analyze;
pub mod config;
pub mod rules;

use std::path::{Path, PathBuf};

use tracing::debug;

use errsight_core::config::ErrsightConfig;
use errsight_core::error::ErrsightError;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "errsight.toml";

/// Effective configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ErrsightConfig,
    /// Config file path, or `<defaults>` when no file was used.
    pub source: String,
}

/// Load the effective configuration.
///
/// An explicit path must exist. Without one, `./errsight.toml` is used when present,
/// otherwise built-in defaults; env overrides and validation apply in every case.
pub async fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ErrsightError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            tokio::fs::try_exists(&candidate)
                .await
                .unwrap_or(false)
                .then_some(candidate)
        }
    };

    match path {
        Some(path) => {
            let config = ErrsightConfig::load(&path).await?;
            Ok(LoadedConfig {
                config,
                source: path.display().to_string(),
            })
        }
        None => {
            debug!("no config file found, using defaults");
            let mut config = ErrsightConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(LoadedConfig {
                config,
                source: "<defaults>".to_owned(),
            })
        }
    }
}
