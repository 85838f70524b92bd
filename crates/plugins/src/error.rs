use std::path::PathBuf;

use thiserror::Error;

use crate::types::ComponentKind;

/// Failures reading a plugin directory. Raised before anything is written.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("plugin path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("no plugin manifest found in {root} (looked for .claude-plugin/plugin.json and plugin.json)")]
    MissingManifest { root: PathBuf },

    #[error("malformed manifest {path}: {reason}")]
    MalformedManifest { path: PathBuf, reason: String },

    #[error("plugin '{plugin}' declares {kind} '{name}' more than once")]
    DuplicateComponent {
        plugin: String,
        kind: ComponentKind,
        name: String,
    },

    #[error("plugin '{plugin}' has {kind} with unusable name '{name}'")]
    InvalidComponentName {
        plugin: String,
        kind: ComponentKind,
        name: String,
    },

    #[error("{path} resolves outside the plugin root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hard failures translating an agent header.
///
/// Unsupported fields are not errors; they surface as
/// [`crate::translate::TranslationWarning`]s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("required field '{field}' is missing")]
    MissingRequiredField { field: &'static str },

    #[error("field '{field}' must be {expected}")]
    InvalidValue {
        field: String,
        expected: &'static str,
    },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },
}

/// Failures while writing a plugin's components into the target areas.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error(
        "skill '{skill}' from plugin '{plugin}' conflicts with existing {existing} (not linked to {source_dir})"
    )]
    ConflictingSkill {
        plugin: String,
        skill: String,
        existing: PathBuf,
        source_dir: PathBuf,
    },

    #[error("plugin '{plugin}': failed to translate agent {agent}: {source}")]
    TranslationFailed {
        plugin: String,
        agent: PathBuf,
        #[source]
        source: TranslationError,
    },

    #[error("plugin '{plugin}': failed to write {kind} target {path}: {source}")]
    WriteFailed {
        plugin: String,
        kind: ComponentKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin '{plugin}': failed to read {kind} source {path}: {source}")]
    ReadFailed {
        plugin: String,
        kind: ComponentKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("existing MCP config {path} is not valid: {reason}")]
    InvalidMcpConfig { path: PathBuf, reason: String },
}

impl InstallError {
    /// Component kind the failure belongs to.
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::ConflictingSkill { .. } => ComponentKind::Skills,
            Self::TranslationFailed { .. } => ComponentKind::Agents,
            Self::WriteFailed { kind, .. } | Self::ReadFailed { kind, .. } => *kind,
            Self::InvalidMcpConfig { .. } => ComponentKind::McpServers,
        }
    }
}

/// Failures of the installed-plugin registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin '{name}' is not installed")]
    NotFound { name: String },

    #[error("registry store {path} could not be written: {source}")]
    StoreUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry store {path} could not be read: {source}")]
    StoreUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry store {path} is corrupt: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] plugport_config::Error),

    #[error("plugin directory declares '{found}', expected '{expected}'")]
    NameMismatch { expected: String, found: String },

    #[error("failed to remove {path} while uninstalling '{plugin}': {source}")]
    CleanupFailed {
        plugin: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
