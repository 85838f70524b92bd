//! Merge of a plugin's MCP servers into the shared MCP config.
//!
//! The shared file has the shape `{"mcpServers": {name: config}, ...}`.
//! Unrelated servers and other top-level keys are preserved. A server with
//! the same name but a different config is overwritten (last install wins)
//! and a warning is recorded.

use std::path::Path;

use {
    serde_json::{Map, Value},
    tracing::{debug, warn},
};

use crate::{
    error::InstallError,
    install::{KindPlan, actions::FsAction},
    types::{ComponentKind, InstallationRecord, ParsedPlugin},
};

const SERVERS_KEY: &str = "mcpServers";

pub(crate) fn plan(
    config_path: &Path,
    plugin: &ParsedPlugin,
    previous: Option<&InstallationRecord>,
) -> Result<KindPlan, InstallError> {
    let original = load_config(config_path, plugin.name())?;
    let mut doc = original.clone();
    let mut plan = KindPlan::default();

    let servers = servers_mut(&mut doc, config_path)?;

    // Servers this plugin installed before but no longer declares.
    if let Some(previous) = previous {
        for (name, installed) in &previous.mcp_servers {
            if plugin.inventory.mcp_servers.contains_key(name) {
                continue;
            }
            if servers.get(name) == Some(&installed.to_value()) {
                debug!(plugin = %plugin.name(), server = %name, "dropping stale MCP server");
                servers.remove(name);
            }
        }
    }

    for (name, config) in &plugin.inventory.mcp_servers {
        let value = config.to_value();
        let warning = overwrite_warning(name);
        // The displacement warning of an earlier install stays on the record
        // for as long as the server is still the one this plugin put there.
        let carried = previous.is_some_and(|r| r.warnings.contains(&warning));
        match servers.get(name) {
            Some(existing) => {
                let ours = previous
                    .and_then(|r| r.mcp_servers.get(name))
                    .is_some_and(|installed| installed.to_value() == *existing);
                if ours && carried {
                    plan.warnings.push(warning);
                } else if !ours && *existing != value {
                    warn!(plugin = %plugin.name(), server = %name, "overwriting MCP server config");
                    plan.warnings.push(warning);
                }
                if *existing != value {
                    servers.insert(name.clone(), value);
                }
            },
            None => {
                servers.insert(name.clone(), value);
            },
        }
        plan.items.push(name.clone());
    }
    plan.mcp_servers = plugin.inventory.mcp_servers.clone();

    if doc != original {
        let mut contents =
            serde_json::to_vec_pretty(&Value::Object(doc)).map_err(|e| {
                InstallError::InvalidMcpConfig {
                    path: config_path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
        contents.push(b'\n');
        plan.actions.push(FsAction::Write {
            path: config_path.to_path_buf(),
            contents,
            permissions: None,
        });
    }

    Ok(plan)
}

fn overwrite_warning(name: &str) -> String {
    format!("MCP server '{name}' was already configured differently; replaced by this plugin's config")
}

/// Load the shared config. A missing or blank file is an empty document.
pub(crate) fn load_config(path: &Path, plugin: &str) -> Result<Map<String, Value>, InstallError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(source) => {
            return Err(InstallError::ReadFailed {
                plugin: plugin.to_string(),
                kind: ComponentKind::McpServers,
                path: path.to_path_buf(),
                source,
            });
        },
    };
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(InstallError::InvalidMcpConfig {
            path: path.to_path_buf(),
            reason: "top level is not an object".into(),
        }),
        Err(e) => Err(InstallError::InvalidMcpConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

/// The `mcpServers` object of `doc`, created if absent.
pub(crate) fn servers_mut<'a>(
    doc: &'a mut Map<String, Value>,
    path: &Path,
) -> Result<&'a mut Map<String, Value>, InstallError> {
    match doc
        .entry(SERVERS_KEY)
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(servers) => Ok(servers),
        _ => Err(InstallError::InvalidMcpConfig {
            path: path.to_path_buf(),
            reason: format!("'{SERVERS_KEY}' is not an object"),
        }),
    }
}
