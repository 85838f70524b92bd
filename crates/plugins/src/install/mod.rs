//! Component installation.
//!
//! Each component kind has a planner that compares the desired state with
//! what is on disk and emits only the [`FsAction`]s needed to reconcile
//! them. Actions are applied through a [`Journal`] so the caller can undo a
//! failed run.

pub mod actions;
pub(crate) mod agents;
mod copies;
pub(crate) mod mcp;
mod skills;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use {
    plugport_config::{ExtensionFields, InstallPaths, PlugportConfig},
    tracing::{debug, warn},
};

pub use actions::{FsAction, Journal};

use crate::{
    error::InstallError,
    types::{ComponentKind, ComponentStatus, InstallationRecord, McpServerConfig, ParsedPlugin},
};

/// Installer switches derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    pub commands: bool,
    pub hooks: bool,
    pub extension_fields: ExtensionFields,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            commands: true,
            hooks: true,
            extension_fields: ExtensionFields::default(),
        }
    }
}

impl InstallOptions {
    pub fn from_config(config: &PlugportConfig) -> Self {
        Self {
            commands: config.install.commands,
            hooks: config.install.hooks,
            extension_fields: config.translate.extension_fields,
        }
    }

    fn enabled(&self, kind: ComponentKind) -> bool {
        match kind {
            ComponentKind::Commands => self.commands,
            ComponentKind::Hooks => self.hooks,
            _ => true,
        }
    }
}

/// Desired state of one component kind.
#[derive(Debug, Default)]
pub(crate) struct KindPlan {
    pub actions: Vec<FsAction>,
    /// Target paths the plugin owns once the plan is applied.
    pub owned: Vec<PathBuf>,
    pub items: Vec<String>,
    pub warnings: Vec<String>,
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    /// Skill name to the source directory its link points at.
    pub skill_sources: BTreeMap<String, PathBuf>,
}

/// Result of a successful installer run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallRun {
    pub components: BTreeMap<ComponentKind, ComponentStatus>,
    pub items: BTreeMap<ComponentKind, Vec<String>>,
    /// Owned target paths, sorted and deduplicated.
    pub paths: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    pub skill_sources: BTreeMap<String, PathBuf>,
    /// Number of filesystem actions applied.
    pub actions: usize,
}

/// Applies the per-kind installation policy to one parsed plugin.
#[derive(Debug, Clone)]
pub struct ComponentInstaller {
    paths: InstallPaths,
    options: InstallOptions,
}

impl ComponentInstaller {
    pub fn new(paths: InstallPaths, options: InstallOptions) -> Self {
        Self { paths, options }
    }

    pub fn paths(&self) -> &InstallPaths {
        &self.paths
    }

    pub fn options(&self) -> InstallOptions {
        self.options
    }

    /// Install every component kind of `plugin`.
    ///
    /// All kinds are attempted even after one fails; the first failure is
    /// returned. Applied actions stay recorded in `journal` either way, and
    /// undoing them is up to the caller.
    pub fn install(
        &self,
        plugin: &ParsedPlugin,
        previous: Option<&InstallationRecord>,
        journal: &mut Journal,
    ) -> Result<InstallRun, InstallError> {
        let mut run = InstallRun::default();
        let mut errors = Vec::new();
        let applied_before = journal.applied();

        for kind in ComponentKind::ALL {
            let declared = plugin.inventory.has(kind);
            let stale_servers = kind == ComponentKind::McpServers
                && previous.is_some_and(|r| !r.mcp_servers.is_empty());
            if !declared && !stale_servers {
                continue;
            }

            if !self.options.enabled(kind) {
                run.components.insert(kind, ComponentStatus::Skipped);
                run.warnings.push(format!(
                    "{kind} disabled by configuration; {} item(s) not installed",
                    plugin.inventory.count(kind)
                ));
                continue;
            }

            match self.install_kind(kind, plugin, previous, journal) {
                Ok(plan) => {
                    if declared {
                        run.components.insert(kind, ComponentStatus::Installed);
                        run.items.insert(kind, plan.items);
                    }
                    run.paths.extend(plan.owned);
                    run.warnings.extend(plan.warnings);
                    run.mcp_servers.extend(plan.mcp_servers);
                    run.skill_sources.extend(plan.skill_sources);
                },
                Err(e) => {
                    warn!(plugin = %plugin.name(), kind = %kind, error = %e, "component install failed");
                    run.components.insert(kind, ComponentStatus::Failed);
                    errors.push(e);
                },
            }
        }

        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }

        run.paths.sort();
        run.paths.dedup();
        run.actions = journal.applied() - applied_before;
        debug!(
            plugin = %plugin.name(),
            actions = run.actions,
            paths = run.paths.len(),
            "components installed"
        );
        Ok(run)
    }

    fn install_kind(
        &self,
        kind: ComponentKind,
        plugin: &ParsedPlugin,
        previous: Option<&InstallationRecord>,
        journal: &mut Journal,
    ) -> Result<KindPlan, InstallError> {
        let inventory = &plugin.inventory;
        let plan = match kind {
            ComponentKind::Skills => skills::plan(&self.paths.skills, plugin, previous)?,
            ComponentKind::Agents => {
                agents::plan(&self.paths.agents, plugin, self.options.extension_fields)?
            },
            ComponentKind::McpServers => mcp::plan(&self.paths.mcp_config, plugin, previous)?,
            ComponentKind::Commands => copies::plan(
                kind,
                &self.paths.commands,
                plugin.name(),
                &inventory.commands,
            )?,
            ComponentKind::Hooks => {
                copies::plan(kind, &self.paths.hooks, plugin.name(), &inventory.hooks)?
            },
        };

        for action in &plan.actions {
            journal
                .apply(action)
                .map_err(|source| InstallError::WriteFailed {
                    plugin: plugin.name().to_string(),
                    kind,
                    path: action.path().to_path_buf(),
                    source,
                })?;
        }
        debug!(
            plugin = %plugin.name(),
            kind = %kind,
            actions = plan.actions.len(),
            "installed component kind"
        );
        Ok(plan)
    }
}

/// Whether `path` is a regular file holding exactly `contents`.
pub(crate) fn file_matches(path: &Path, contents: &[u8]) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|m| m.is_file())
        && std::fs::read(path).is_ok_and(|current| current == contents)
}
