//! Configuration file resolution and loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Config file resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Platform config file (`<config dir>/<app>/config.toml`, then `/etc/<app>/config.toml`)
/// 4. None: caller falls back to compiled defaults
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config file
    default_config_file(app_name)
}

/// Locate an existing platform config file for `app_name`
fn default_config_file(app_name: &str) -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(app_name).join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(app_name).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML config file, or compiled defaults when no path resolved
///
/// An explicitly resolved path that does not exist is an error: silently
/// ignoring a typo'd `--config` would run with surprising settings.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        return Err(Error::Config(format!("Config file not found: {}", path.display())));
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str::<T>(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}
