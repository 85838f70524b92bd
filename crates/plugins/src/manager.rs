//! Install orchestration: parse, install, register, with rollback.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use {
    plugport_config::{InstallPaths, PlugportConfig},
    serde::Serialize,
    time::{OffsetDateTime, format_description::well_known::Rfc3339},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, InstallError, Result},
    fs_util,
    install::{ComponentInstaller, InstallOptions, InstallRun, Journal, actions, agents, mcp},
    manifest,
    registry::Registry,
    types::{ComponentKind, InstallationRecord, PluginManifest},
};

/// Stages of a single install or update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Parsing,
    Installing,
    Registering,
    Done,
    Failed,
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Parsing => "parsing",
            Self::Installing => "installing",
            Self::Registering => "registering",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Result of a successful install or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallOutcome {
    pub record: InstallationRecord,
    /// Warnings in the order they were produced.
    pub warnings: Vec<String>,
    /// Whether anything on disk changed.
    pub changed: bool,
}

/// Result of removing a plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoveOutcome {
    pub removed: Vec<PathBuf>,
    /// Recorded paths that were already gone.
    pub missing: Vec<PathBuf>,
    /// Recorded paths outside the managed areas, left in place.
    pub skipped: Vec<PathBuf>,
    /// MCP servers taken out of the shared config.
    pub mcp_servers: Vec<String>,
    pub warnings: Vec<String>,
}

/// Dry-run summary of a plugin directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub manifest: PluginManifest,
    pub components: BTreeMap<ComponentKind, usize>,
    pub warnings: Vec<String>,
}

/// Entry point for install, update, remove and inspection of plugins.
#[derive(Debug)]
pub struct PluginManager {
    installer: ComponentInstaller,
    registry: Registry,
}

impl PluginManager {
    /// Manager over `paths`, with the registry stored at `paths.registry`.
    pub fn new(paths: InstallPaths, options: InstallOptions) -> Self {
        let registry = Registry::open(paths.registry.clone());
        Self {
            installer: ComponentInstaller::new(paths, options),
            registry,
        }
    }

    pub fn from_config(config: &PlugportConfig) -> Result<Self> {
        let paths = InstallPaths::resolve(&config.paths)?;
        Ok(Self::new(paths, InstallOptions::from_config(config)))
    }

    /// Manager built from the discovered config file, or defaults.
    pub fn discover() -> Result<Self> {
        Self::from_config(&plugport_config::discover_and_load())
    }

    /// Replace the registry, e.g. with an in-memory store.
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn paths(&self) -> &InstallPaths {
        self.installer.paths()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Install the plugin at `plugin_dir`. Installing a name that is already
    /// registered replaces its record.
    ///
    /// `source` is the origin recorded for the plugin; defaults to the
    /// canonical plugin directory.
    pub fn install(&self, plugin_dir: &Path, source: Option<&str>) -> Result<InstallOutcome> {
        self.run(plugin_dir, source, None)
    }

    /// Reinstall a registered plugin from `plugin_dir`, keeping its source.
    pub fn update(&self, name: &str, plugin_dir: &Path) -> Result<InstallOutcome> {
        let existing = self.registry.get(name)?;
        self.run(plugin_dir, Some(&existing.source), Some(name))
    }

    pub fn list(&self) -> Result<Vec<InstallationRecord>> {
        Ok(self.registry.list()?)
    }

    pub fn show(&self, name: &str) -> Result<InstallationRecord> {
        Ok(self.registry.get(name)?)
    }

    /// Parse the plugin and translate every agent without writing anything.
    pub fn validate(&self, plugin_dir: &Path) -> Result<ValidationReport> {
        let plugin = manifest::parse_plugin(plugin_dir)?;
        let options = self.installer.options();
        let mut warnings = Vec::new();

        for agent in &plugin.inventory.agents {
            let (_, agent_warnings) =
                agents::translate_file(plugin.name(), agent, options.extension_fields)?;
            warnings.extend(
                agent_warnings
                    .into_iter()
                    .map(|w| format!("agent '{}': {w}", agent.name)),
            );
        }
        for (kind, enabled) in [
            (ComponentKind::Commands, options.commands),
            (ComponentKind::Hooks, options.hooks),
        ] {
            let count = plugin.inventory.count(kind);
            if count == 0 {
                continue;
            }
            if enabled {
                warnings.push(format!("{count} {kind} file(s) will need manual wiring"));
            } else {
                warnings.push(format!("{count} {kind} file(s) will be skipped by configuration"));
            }
        }

        Ok(ValidationReport {
            components: plugin.summary(),
            manifest: plugin.manifest,
            warnings,
        })
    }

    /// Remove a plugin's installed files, its MCP servers and its record.
    ///
    /// Files go first: if cleanup fails the record stays, so the removal can
    /// be retried.
    pub fn remove(&self, name: &str) -> Result<RemoveOutcome> {
        let record = self.registry.get(name)?;
        let mut outcome = RemoveOutcome::default();

        for path in record.owned_paths() {
            let Some(area) = self.area_of(path) else {
                warn!(plugin = %name, path = %path.display(), "not removing path outside managed areas");
                outcome.skipped.push(path.to_path_buf());
                outcome
                    .warnings
                    .push(format!("left {} in place: outside managed areas", path.display()));
                continue;
            };
            if self.foreign_skill_link(&record, path) {
                warn!(plugin = %name, path = %path.display(), "skill link no longer ours; leaving it");
                outcome.skipped.push(path.to_path_buf());
                outcome.warnings.push(format!(
                    "left {} in place: it no longer points at this plugin's skill",
                    path.display()
                ));
                continue;
            }
            match fs_util::remove_path(path) {
                Ok(true) => outcome.removed.push(path.to_path_buf()),
                Ok(false) => {
                    debug!(plugin = %name, path = %path.display(), "already gone");
                    outcome.missing.push(path.to_path_buf());
                },
                Err(source) => {
                    return Err(Error::CleanupFailed {
                        plugin: name.to_string(),
                        path: path.to_path_buf(),
                        source,
                    });
                },
            }
            if let Some(parent) = path.parent() {
                fs_util::prune_empty_parents(parent, area);
            }
        }

        outcome.mcp_servers = self.unmerge_mcp_servers(&record, &mut outcome.warnings)?;
        let others = self.registry.list()?;
        self.registry.remove(name)?;

        for server in &outcome.mcp_servers {
            let declared_by: Vec<&str> = others
                .iter()
                .filter(|r| r.name != name && r.mcp_servers.contains_key(server))
                .map(|r| r.name.as_str())
                .collect();
            if declared_by.is_empty() {
                continue;
            }
            warn!(plugin = %name, server = %server, "removed MCP server still declared by other plugins");
            outcome.warnings.push(format!(
                "MCP server '{server}' is also declared by {}; reinstall to restore it",
                declared_by.join(", ")
            ));
        }

        info!(
            plugin = %name,
            removed = outcome.removed.len(),
            missing = outcome.missing.len(),
            "plugin removed"
        );
        Ok(outcome)
    }

    fn run(
        &self,
        plugin_dir: &Path,
        source: Option<&str>,
        expected: Option<&str>,
    ) -> Result<InstallOutcome> {
        let label = expected.map_or_else(|| plugin_dir.display().to_string(), str::to_string);
        let mut phase = InstallPhase::Parsing;
        debug!(plugin = %label, phase = %phase, "install phase");

        let result = self.run_phases(plugin_dir, source, expected, &mut phase);
        match &result {
            Ok(outcome) => {
                info!(
                    plugin = %outcome.record.name,
                    version = %outcome.record.version,
                    changed = outcome.changed,
                    warnings = outcome.warnings.len(),
                    "plugin installed"
                );
            },
            Err(e) => {
                warn!(plugin = %label, phase = %phase, error = %e, "plugin install failed");
                debug!(plugin = %label, phase = %InstallPhase::Failed, "install phase");
            },
        }
        result
    }

    fn run_phases(
        &self,
        plugin_dir: &Path,
        source: Option<&str>,
        expected: Option<&str>,
        phase: &mut InstallPhase,
    ) -> Result<InstallOutcome> {
        let mut plugin = manifest::parse_plugin(plugin_dir)?;
        if let Some(expected) = expected
            && plugin.name() != expected
        {
            return Err(Error::NameMismatch {
                expected: expected.to_string(),
                found: plugin.name().to_string(),
            });
        }
        if let Some(source) = source {
            plugin = plugin.with_source(source);
        }
        // Loaded before any write so a corrupt store fails closed.
        let previous = self.registry.find(plugin.name())?;

        advance(phase, InstallPhase::Installing, plugin.name());
        let mut journal = Journal::new();
        let run = match self
            .installer
            .install(&plugin, previous.as_ref(), &mut journal)
        {
            Ok(run) => run,
            Err(e) => {
                roll_back(plugin.name(), journal);
                return Err(e.into());
            },
        };

        advance(phase, InstallPhase::Registering, plugin.name());
        let record = build_record(&plugin.manifest, previous.as_ref(), &run);
        if let Err(e) = self.registry.upsert(record.clone()) {
            roll_back(plugin.name(), journal);
            return Err(e.into());
        }

        let stale = previous
            .as_ref()
            .map_or(0, |previous| self.remove_stale_paths(previous, &record));

        advance(phase, InstallPhase::Done, plugin.name());
        Ok(InstallOutcome {
            record,
            warnings: run.warnings,
            changed: run.actions > 0 || stale > 0,
        })
    }

    /// Best-effort removal of paths the previous install owned and this one
    /// does not. Returns how many were removed.
    fn remove_stale_paths(
        &self,
        previous: &InstallationRecord,
        current: &InstallationRecord,
    ) -> usize {
        let mut removed = 0;
        for path in previous.owned_paths().filter(|p| !current.owns(p)) {
            let Some(area) = self.area_of(path) else {
                continue;
            };
            if self.foreign_skill_link(previous, path) {
                debug!(plugin = %current.name, path = %path.display(), "stale skill link no longer ours");
                continue;
            }
            match fs_util::remove_path(path) {
                Ok(true) => {
                    debug!(plugin = %current.name, path = %path.display(), "removed stale path");
                    removed += 1;
                },
                Ok(false) => {},
                Err(e) => {
                    warn!(plugin = %current.name, path = %path.display(), error = %e, "failed to remove stale path");
                },
            }
            if let Some(parent) = path.parent() {
                fs_util::prune_empty_parents(parent, area);
            }
        }
        removed
    }

    /// Take the record's MCP servers out of the shared config, leaving any
    /// server whose config was changed since install.
    fn unmerge_mcp_servers(
        &self,
        record: &InstallationRecord,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<String>> {
        if record.mcp_servers.is_empty() {
            return Ok(Vec::new());
        }
        let path = &self.paths().mcp_config;

        let mut doc = match mcp::load_config(path, &record.name) {
            Ok(doc) => doc,
            Err(InstallError::ReadFailed { source, .. }) => {
                return Err(Error::CleanupFailed {
                    plugin: record.name.clone(),
                    path: path.clone(),
                    source,
                });
            },
            Err(e) => {
                warn!(plugin = %record.name, error = %e, "leaving MCP config untouched");
                warnings.push(format!("MCP servers not removed: {e}"));
                return Ok(Vec::new());
            },
        };
        let servers = match mcp::servers_mut(&mut doc, path) {
            Ok(servers) => servers,
            Err(e) => {
                warnings.push(format!("MCP servers not removed: {e}"));
                return Ok(Vec::new());
            },
        };

        let mut removed = Vec::new();
        for (name, installed) in &record.mcp_servers {
            match servers.get(name) {
                Some(current) if *current == installed.to_value() => {
                    servers.remove(name);
                    removed.push(name.clone());
                },
                Some(_) => {
                    warnings.push(format!(
                        "MCP server '{name}' was changed after install; left in place"
                    ));
                },
                None => {},
            }
        }

        if !removed.is_empty() {
            let cleanup_failed = |source| Error::CleanupFailed {
                plugin: record.name.clone(),
                path: path.clone(),
                source,
            };
            let mut contents = serde_json::to_vec_pretty(&serde_json::Value::Object(doc))
                .map_err(|e| cleanup_failed(std::io::Error::other(e)))?;
            contents.push(b'\n');
            let permissions = std::fs::metadata(path).ok().map(|m| m.permissions());
            actions::write_atomic(path, &contents, permissions.as_ref()).map_err(cleanup_failed)?;
        }
        Ok(removed)
    }

    /// Whether `path` sits in the skills area but is no longer the link
    /// `record` created. Absent paths are not foreign.
    fn foreign_skill_link(&self, record: &InstallationRecord, path: &Path) -> bool {
        if path.parent() != Some(self.paths().skills.as_path())
            || std::fs::symlink_metadata(path).is_err()
        {
            return false;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        !fs_util::read_link(path).is_some_and(|target| record.linked_skill(&name, &target))
    }

    /// Managed area containing `path`, if any.
    fn area_of<'a>(&'a self, path: &Path) -> Option<&'a Path> {
        let paths = self.paths();
        if !paths.is_managed(path) {
            return None;
        }
        paths
            .managed_areas()
            .into_iter()
            .find(|area| path.starts_with(area))
    }
}

fn advance(phase: &mut InstallPhase, next: InstallPhase, plugin: &str) {
    *phase = next;
    debug!(plugin = %plugin, phase = %next, "install phase");
}

fn roll_back(plugin: &str, journal: Journal) {
    let steps = journal.applied();
    let failures = journal.rollback();
    if failures.is_empty() {
        debug!(plugin = %plugin, steps, "rolled back");
    } else {
        warn!(plugin = %plugin, steps, failed = failures.len(), "rollback incomplete");
    }
}

fn build_record(
    manifest: &PluginManifest,
    previous: Option<&InstallationRecord>,
    run: &InstallRun,
) -> InstallationRecord {
    let now = timestamp();
    let mut record = InstallationRecord {
        name: manifest.name.clone(),
        version: manifest.version.clone(),
        description: manifest.description.clone(),
        source: manifest.source.clone(),
        installed_at: previous.map_or_else(|| now.clone(), |p| p.installed_at.clone()),
        updated_at: previous.and_then(|p| p.updated_at.clone()),
        components: run.components.clone(),
        items: run.items.clone(),
        paths: run
            .paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        warnings: run.warnings.clone(),
        mcp_servers: run.mcp_servers.clone(),
        skill_sources: run
            .skill_sources
            .iter()
            .map(|(name, source)| (name.clone(), source.to_string_lossy().into_owned()))
            .collect(),
    };
    if let Some(previous) = previous
        && (run.actions > 0 || !same_install(previous, &record))
    {
        record.updated_at = Some(now);
    }
    record
}

/// Whether two records describe the same installed state. Warnings are
/// diagnostics of a run and do not count.
fn same_install(a: &InstallationRecord, b: &InstallationRecord) -> bool {
    InstallationRecord {
        warnings: Vec::new(),
        ..a.clone()
    } == InstallationRecord {
        warnings: Vec::new(),
        ..b.clone()
    }
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
