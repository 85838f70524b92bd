//! Config schema.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root of `plugport.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlugportConfig {
    pub paths: PathsConfig,
    pub install: InstallConfig,
    pub translate: TranslateConfig,
}

/// `[paths]`: overrides for the data home and the individual target areas.
///
/// Unset areas are derived from `home`, which itself defaults to
/// [`crate::data_dir`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub home: Option<PathBuf>,
    pub skills: Option<PathBuf>,
    pub agents: Option<PathBuf>,
    pub commands: Option<PathBuf>,
    pub hooks: Option<PathBuf>,
    pub mcp_config: Option<PathBuf>,
    pub registry: Option<PathBuf>,
}

/// `[install]`: per-kind switches for the copy-only component kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Copy plugin commands into the commands area.
    pub commands: bool,
    /// Copy plugin hook files into the hooks area.
    pub hooks: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            commands: true,
            hooks: true,
        }
    }
}

/// `[translate]`: agent header translation policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    pub extension_fields: ExtensionFields,
}

/// What happens to header keys the translation table does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionFields {
    /// Drop the key and record a warning.
    #[default]
    Drop,
    /// Copy the key into the translated header unchanged.
    Keep,
}
