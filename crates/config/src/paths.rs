//! Resolution of the fixed target installation areas.

use std::path::{Component, Path, PathBuf};

use crate::{
    error::{Error, Result},
    schema::PathsConfig,
};

/// Environment variable overriding the data home.
pub const HOME_ENV: &str = "PLUGPORT_HOME";

/// Default data home: `$PLUGPORT_HOME`, else `~/.plugport`.
pub fn data_dir() -> Result<PathBuf> {
    data_dir_with(|name| std::env::var_os(name).map(PathBuf::from), || {
        directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
    })
}

fn data_dir_with(
    env: impl Fn(&str) -> Option<PathBuf>,
    home: impl Fn() -> Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = env(HOME_ENV).filter(|p| !p.as_os_str().is_empty()) {
        return Ok(dir);
    }
    home().map(|h| h.join(".plugport")).ok_or(Error::NoHomeDir)
}

/// Locations the host ecosystem reads installed content from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub home: PathBuf,
    /// One link per installed skill.
    pub skills: PathBuf,
    /// Translated agents, one subdirectory per plugin.
    pub agents: PathBuf,
    /// Copied commands, one subdirectory per plugin.
    pub commands: PathBuf,
    /// Copied hook files, one subdirectory per plugin.
    pub hooks: PathBuf,
    /// Shared MCP server configuration.
    pub mcp_config: PathBuf,
    /// Installed-plugin registry store.
    pub registry: PathBuf,
}

impl InstallPaths {
    /// Standard layout under `home`.
    pub fn under(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            skills: home.join("skills"),
            agents: home.join("agents"),
            commands: home.join("commands"),
            hooks: home.join("hooks"),
            mcp_config: home.join("mcp.json"),
            registry: home.join("plugins.json"),
            home,
        }
    }

    /// Apply `[paths]` overrides on top of the standard layout.
    pub fn resolve(cfg: &PathsConfig) -> Result<Self> {
        let home = match &cfg.home {
            Some(home) => home.clone(),
            None => data_dir()?,
        };
        let mut paths = Self::under(home);
        let overrides = [
            (&cfg.skills, &mut paths.skills),
            (&cfg.agents, &mut paths.agents),
            (&cfg.commands, &mut paths.commands),
            (&cfg.hooks, &mut paths.hooks),
            (&cfg.mcp_config, &mut paths.mcp_config),
            (&cfg.registry, &mut paths.registry),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
        Ok(paths)
    }

    /// Areas whose contents are owned by installed plugins.
    pub fn managed_areas(&self) -> [&Path; 4] {
        [&self.skills, &self.agents, &self.commands, &self.hooks]
    }

    /// Whether `path` lies inside one of the managed areas. Paths with `..`
    /// components are never managed.
    pub fn is_managed(&self, path: &Path) -> bool {
        if path.components().any(|c| c == Component::ParentDir) {
            return false;
        }
        self.managed_areas()
            .iter()
            .any(|area| path != *area && path.starts_with(area))
    }
}
