use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

// ── Plugin manifest ──────────────────────────────────────────────────────────

/// Version recorded when the manifest does not declare one.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Identity and metadata of a plugin, parsed fresh on every install/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Where the plugin came from (`host/owner/repo` or an absolute path).
    pub source: String,
    pub author: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<String>,
    pub license: Option<String>,
    pub keywords: Vec<String>,
}

// ── Components ───────────────────────────────────────────────────────────────

/// Installable component classes, in installation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ComponentKind {
    Skills,
    Agents,
    McpServers,
    Commands,
    Hooks,
}

impl ComponentKind {
    pub const ALL: [Self; 5] = [
        Self::Skills,
        Self::Agents,
        Self::McpServers,
        Self::Commands,
        Self::Hooks,
    ];
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skills => write!(f, "skills"),
            Self::Agents => write!(f, "agents"),
            Self::McpServers => write!(f, "mcpServers"),
            Self::Commands => write!(f, "commands"),
            Self::Hooks => write!(f, "hooks"),
        }
    }
}

/// Outcome of installing one component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Installed,
    /// Not installed on purpose; a warning explains why.
    Skipped,
    /// Only ever seen on a failed run, which is rolled back and never recorded.
    Failed,
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A skill bundle: a directory holding a `SKILL.md`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillEntry {
    pub name: String,
    /// Canonical path of the skill directory.
    pub path: PathBuf,
}

/// An agent definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentEntry {
    pub name: String,
    pub path: PathBuf,
}

/// A file copied verbatim (commands, hooks).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Canonical source path.
    pub path: PathBuf,
    /// Path relative to the kind folder, reused under the target area.
    pub relative: PathBuf,
}

/// One MCP server declaration.
///
/// `command`/`args`/`env` cover stdio servers; anything else (`type`, `url`,
/// `headers`, ...) is preserved as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl McpServerConfig {
    /// JSON form as written into the shared MCP config.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Everything installable found under a plugin root.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComponentInventory {
    pub skills: Vec<SkillEntry>,
    pub agents: Vec<AgentEntry>,
    pub commands: Vec<FileEntry>,
    pub hooks: Vec<FileEntry>,
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

impl ComponentInventory {
    /// Whether the plugin ships anything of this kind.
    pub fn has(&self, kind: ComponentKind) -> bool {
        self.count(kind) > 0
    }

    pub fn count(&self, kind: ComponentKind) -> usize {
        match kind {
            ComponentKind::Skills => self.skills.len(),
            ComponentKind::Agents => self.agents.len(),
            ComponentKind::McpServers => self.mcp_servers.len(),
            ComponentKind::Commands => self.commands.len(),
            ComponentKind::Hooks => self.hooks.len(),
        }
    }
}

/// A parsed plugin directory.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedPlugin {
    /// Canonical plugin root.
    pub root: PathBuf,
    pub manifest: PluginManifest,
    pub inventory: ComponentInventory,
}

impl ParsedPlugin {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Replace the recorded origin (e.g. with the `owner/repo` it was fetched from).
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.manifest.source = source.into();
        self
    }

    /// Component counts keyed by kind, omitting empty kinds.
    pub fn summary(&self) -> BTreeMap<ComponentKind, usize> {
        ComponentKind::ALL
            .into_iter()
            .filter(|k| self.inventory.has(*k))
            .map(|k| (k, self.inventory.count(k)))
            .collect()
    }
}

// ── Agent definitions ────────────────────────────────────────────────────────

/// An agent's structured header plus its untouched body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentDefinition {
    pub header: serde_yaml::Mapping,
    pub body: String,
}

// ── Installation record ──────────────────────────────────────────────────────

/// Persisted state for one installed plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationRecord {
    /// Registry key; not repeated inside the stored record.
    #[serde(skip)]
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub source: String,
    /// RFC 3339 timestamp of the first install.
    pub installed_at: String,
    /// RFC 3339 timestamp of the last update that changed anything on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub components: BTreeMap<ComponentKind, ComponentStatus>,
    /// Installed component names per kind.
    #[serde(default)]
    pub items: BTreeMap<ComponentKind, Vec<String>>,
    /// Target paths owned by this plugin, sorted.
    pub paths: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// MCP servers merged into the shared config, as installed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    /// Source directory each installed skill link points at.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub skill_sources: BTreeMap<String, String>,
}

impl InstallationRecord {
    pub fn owns(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| Path::new(p) == path)
    }

    pub fn owned_paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(Path::new)
    }

    /// Whether `target` is the source this plugin linked skill `name` to.
    pub fn linked_skill(&self, name: &str, target: &Path) -> bool {
        self.skill_sources
            .get(name)
            .is_some_and(|source| Path::new(source) == target)
    }
}
