//! Configuration loading, validation, env substitution, and legacy env overrides.
//!
//! Config files: `replywatch.toml`, `replywatch.yaml`, or `replywatch.json`
//! Searched in `./` then `~/.config/replywatch/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config,
    },
    schema::{
        BitrixConfig, DetectionConfig, DigestConfig, MetricsConfig, ReplywatchConfig,
        ScheduleConfig, ServerConfig, TelegramConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file},
};
