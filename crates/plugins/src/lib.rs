//! Plugin ingestion: parse a plugin directory, translate its agents, install
//! its components into the target areas, and record the result.
//!
//! Component policies:
//! - skills: linked to the plugin source
//! - agents: header translated, body kept, written under `agents/<plugin>/`
//! - MCP servers: merged into the shared MCP config
//! - commands and hooks: copied, with a warning that wiring is manual
//!
//! [`PluginManager`] is the entry point. A failed install or update is
//! rolled back and never registered.

pub mod error;
pub mod frontmatter;
mod fs_util;
pub mod install;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod translate;
pub mod types;

pub use {
    error::{Error, InstallError, ManifestError, RegistryError, Result, TranslationError},
    install::{ComponentInstaller, InstallOptions, InstallRun},
    manager::{InstallOutcome, InstallPhase, PluginManager, RemoveOutcome, ValidationReport},
    manifest::parse_plugin,
    registry::{FileStore, MemoryStore, Registry, RegistryData, RegistryStore},
    translate::{Translation, TranslationWarning, translate_header},
    types::{
        ComponentInventory, ComponentKind, ComponentStatus, InstallationRecord, McpServerConfig,
        ParsedPlugin, PluginManifest,
    },
};
