//! Configuration loading and target-area resolution.
//!
//! Config files: `plugport.toml`, `plugport.yaml`, or `plugport.json`.
//! Searched in `./` then `~/.config/plugport/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod paths;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    paths::{InstallPaths, data_dir},
    schema::{ExtensionFields, InstallConfig, PathsConfig, PlugportConfig, TranslateConfig},
};
