//! Configuration loading, schema, and env substitution for the huddle runtime.
//!
//! Config files: `huddle.toml`, `huddle.yaml`, or `huddle.json`
//! Searched in `./` then `~/.config/huddle/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{DispatchConfig, HuddleConfig, ModelsConfig, StoreConfig},
};
