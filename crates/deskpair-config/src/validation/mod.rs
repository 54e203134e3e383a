//! Full configuration validation.
//!
//! Checks every numeric range and collects all failures into one error.

mod helpers;


use deskpair_common::ConfigError;

use crate::schema::DeskpairConfig;
use helpers::validate_range;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &DeskpairConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    // Server
    if config.server.host.trim().is_empty() {
        errors.push("server.host must not be empty".into());
    }
    validate_range(&mut errors, "server.port", config.server.port, 1, u16::MAX);
    validate_range(
        &mut errors,
        "server.outbox_capacity",
        config.server.outbox_capacity,
        1,
        65_536,
    );
    validate_range(
        &mut errors,
        "server.attach_timeout_secs",
        config.server.attach_timeout_secs,
        0,
        600,
    );

    // Sessions
    validate_range(
        &mut errors,
        "sessions.token_length",
        config.sessions.token_length,
        6,
        64,
    );
    validate_range(
        &mut errors,
        "sessions.idle_timeout_secs",
        config.sessions.idle_timeout_secs,
        1,
        86_400,
    );
    validate_range(
        &mut errors,
        "sessions.sweep_interval_secs",
        config.sessions.sweep_interval_secs,
        1,
        3_600,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
