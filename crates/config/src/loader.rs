use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::PlugportConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "plugport.toml",
    "plugport.yaml",
    "plugport.yml",
    "plugport.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<PlugportConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./plugport.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/plugport/plugport.{toml,yaml,yml,json}` (user-global)
///
/// Returns `PlugportConfig::default()` if no usable config file is found.
pub fn discover_and_load() -> PlugportConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return PlugportConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            PlugportConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Returns the user-global config directory (`~/.config/plugport/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "plugport").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<PlugportConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let parsed: std::result::Result<PlugportConfig, String> = match ext {
        "toml" => toml::from_str(raw).map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| e.to_string()),
        "json" => serde_json::from_str(raw).map_err(|e| e.to_string()),
        _ => {
            return Err(Error::UnsupportedFormat {
                extension: ext.to_string(),
            });
        },
    };
    parsed.map_err(|reason| Error::Parse {
        path: path.to_path_buf(),
        reason,
    })
}
