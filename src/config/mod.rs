// Configuration management module
// Layered settings from defaults, config.toml, .env and the environment

pub mod display;
pub mod settings;

pub use display::{config_toml, show_config};
pub use settings::{Config, ConfigError, LlmSettings};
