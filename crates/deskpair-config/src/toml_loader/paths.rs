use std::path::PathBuf;

use deskpair_common::ConfigError;

/// Get the platform-specific default config file path.
///
/// On macOS: `~/Library/Application Support/deskpair/config.toml`
/// On Linux: `~/.config/deskpair/config.toml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        ConfigError::ParseError("could not determine config directory".into())
    })?;
    Ok(config_dir.join("deskpair").join("config.toml"))
}
