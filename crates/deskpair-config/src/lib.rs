//! Deskpair configuration system.
//!
//! TOML-based configuration for the pairing relay. Every section uses
//! serde defaults so a partial (or absent) config file works out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use deskpair_config::load_or_default;
//!
//! let config = load_or_default(None).expect("failed to load config");
//! println!("listening on {}", config.server.bind_addr());
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{DeskpairConfig, LoggingConfig, ServerConfig, SessionConfig};
pub use toml_loader::{default_config_path, load_from_path, load_from_str, load_or_default};
