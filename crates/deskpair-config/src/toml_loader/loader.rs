use std::path::Path;

use deskpair_common::ConfigError;
use tracing::info;

use super::paths::default_config_path;
use crate::schema::DeskpairConfig;
use crate::validation;

/// Parse and validate config from TOML text.
pub fn load_from_str(content: &str) -> Result<DeskpairConfig, ConfigError> {
    let config: DeskpairConfig = toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from a specific TOML file path.
///
/// Missing fields take their serde defaults. Out-of-range values are
/// rejected with a single `ValidationError` listing every offending field.
pub fn load_from_path(path: &Path) -> Result<DeskpairConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;

    let config = load_from_str(&content)?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load from `path` when given, otherwise from the platform default path.
///
/// An explicit path must exist. A missing default file just means defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<DeskpairConfig, ConfigError> {
    if let Some(path) = path {
        return load_from_path(path);
    }

    let Ok(default_path) = default_config_path() else {
        return Ok(DeskpairConfig::default());
    };

    if !default_path.exists() {
        info!("no config at {}, using defaults", default_path.display());
        return Ok(DeskpairConfig::default());
    }

    load_from_path(&default_path)
}
