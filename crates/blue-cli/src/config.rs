//! Configuration file loading for the CLI
//!
//! This module handles finding and loading TOML configuration files
//! from various locations (explicit path, local directory, system directory).

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use thiserror::Error;

use blue::{BlueError, config::AppConfig};

/// Configuration-related errors for CLI
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML configuration: {0}")]
    Parse(String),

    #[error("Missing configuration file: {0}")]
    MissingFile(PathBuf),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for BlueError {
    fn from(err: ConfigError) -> Self {
        BlueError::Io(io::Error::other(err.to_string()))
    }
}

/// Find and load configuration from various locations
///
/// Search order:
/// 1. Explicit path if provided
/// 2. Local project directory (blue/config.toml)
/// 3. Platform-specific config directory
/// 4. Default config if none found
///
/// # Errors
///
/// Returns error if:
/// - Explicit path is provided but file doesn't exist
/// - Config file exists but cannot be parsed or holds invalid values
pub fn load_config(explicit_path: Option<impl AsRef<Path>>) -> Result<AppConfig, BlueError> {
    if let Some(path) = explicit_path {
        let path = path.as_ref();
        info!(path = path.display().to_string(); "Loading configuration from explicit path");
        return load_config_file(path);
    }

    let local_config = Path::new("blue/config.toml");
    if local_config.exists() {
        info!(path = local_config.display().to_string(); "Loading configuration from local path");
        return load_config_file(local_config);
    }

    if let Some(proj_dirs) = ProjectDirs::from("com", "blue", "blue") {
        let system_config = proj_dirs.config_dir().join("config.toml");

        if system_config.exists() {
            info!(path = system_config.display().to_string(); "Loading configuration from system path");
            return load_config_file(system_config);
        }

        debug!(path = system_config.display().to_string(); "System configuration file not found");
    } else {
        debug!("Could not determine platform-specific config directory");
    }

    debug!("No configuration file found, using default configuration");
    Ok(AppConfig::default())
}

/// Load and validate configuration from a TOML file
fn load_config_file(path: impl AsRef<Path>) -> Result<AppConfig, BlueError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()).into());
    }

    let content = fs::read_to_string(path)?;
    let config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.resolve().max_depth() == 0 {
        return Err(ConfigError::Validation(
            "resolve.max_depth must be at least 1".to_string(),
        ));
    }
    if config.cache().max_entries() == Some(0) {
        return Err(ConfigError::Validation(
            "cache.max_entries must be at least 1 when set".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), text).unwrap();
        file
    }

    #[test]
    fn test_explicit_config() {
        let file = write_config(
            "[cache]\nttl_secs = 60\n\n[fetch]\nretries = 1\n\n[resolve]\nclosed_objects = true\n",
        );
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.cache().ttl(), Duration::from_secs(60));
        assert_eq!(config.fetch().retries(), 1);
        assert!(config.resolve().closed_objects());
        assert_eq!(config.resolve().max_depth(), 32);
    }

    #[test]
    fn test_missing_explicit_config() {
        let err = load_config(Some("/nonexistent/blue.toml")).unwrap_err();
        assert!(err.to_string().contains("Missing configuration file"), "{err}");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let file = write_config("[resolve]\nclosed = true\n");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"), "{err}");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = write_config("[resolve]\nmax_depth = 0\n");
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("max_depth"), "{err}");
    }
}
