//! Plugin directory parsing: manifest plus component inventory.
//!
//! Layout of a plugin root:
//!
//! ```text
//! .claude-plugin/plugin.json   (or plugin.json at the root)
//! skills/<name>/SKILL.md
//! agents/*.md
//! commands/*.md
//! hooks/**/{hooks.json,*.sh,*.py,...}
//! .mcp.json
//! ```
//!
//! Parsing is read-only.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use {
    serde::Deserialize,
    tracing::{debug, warn},
};

use crate::{
    error::ManifestError,
    frontmatter,
    types::{
        AgentEntry, ComponentInventory, ComponentKind, FileEntry, McpServerConfig,
        ParsedPlugin, PluginManifest, SkillEntry, UNKNOWN_VERSION,
    },
};

/// Manifest locations, checked in order.
const MANIFEST_PATHS: &[&str] = &[".claude-plugin/plugin.json", "plugin.json"];

/// File that marks a directory under `skills/` as a skill bundle.
pub const SKILL_MARKER: &str = "SKILL.md";

/// MCP server declaration file at the plugin root.
pub const MCP_FILE: &str = ".mcp.json";

/// Extensions picked up under `hooks/`.
const HOOK_EXTENSIONS: &[&str] = &["json", "sh", "py", "cmd", "ps1", "js", "ts"];

/// Maximum directory depth scanned under `hooks/`.
const HOOK_SCAN_DEPTH: usize = 4;

/// Raw `plugin.json` shape.
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<RawAuthor>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    repository: Option<RawRepository>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default, rename = "mcpServers")]
    mcp_servers: Option<serde_json::Value>,
}

/// Author can be a string or an object with `name` (and optionally `email`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAuthor {
    Simple(String),
    Object { name: String },
}

/// Repository can be a URL string or `{type, url}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRepository {
    Simple(String),
    Object { url: String },
}

/// Parse a plugin directory into its manifest and component inventory.
pub fn parse_plugin(plugin_dir: &Path) -> Result<ParsedPlugin, ManifestError> {
    if !plugin_dir.is_dir() {
        return Err(ManifestError::NotADirectory {
            path: plugin_dir.to_path_buf(),
        });
    }
    let root = canonicalize(plugin_dir)?;

    let (manifest_path, raw) = read_manifest(&root)?;
    let name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ManifestError::MalformedManifest {
            path: manifest_path.clone(),
            reason: "missing required field 'name'".into(),
        })?
        .to_string();
    if !is_safe_name(&name) {
        return Err(ManifestError::MalformedManifest {
            path: manifest_path,
            reason: format!("plugin name '{name}' is not a valid directory name"),
        });
    }

    let manifest = PluginManifest {
        version: raw
            .version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
        description: raw.description.unwrap_or_default(),
        source: root.display().to_string(),
        author: raw.author.map(|a| match a {
            RawAuthor::Simple(s) => s,
            RawAuthor::Object { name } => name,
        }),
        homepage: raw.homepage,
        repository: raw.repository.map(|r| match r {
            RawRepository::Simple(s) => s,
            RawRepository::Object { url } => url,
        }),
        license: raw.license,
        keywords: raw.keywords,
        name,
    };

    let inventory = ComponentInventory {
        skills: discover_skills(&root, &manifest.name)?,
        agents: discover_agents(&root, &manifest.name)?,
        commands: discover_files(&root, "commands", &["md"], 1)?,
        hooks: discover_files(&root, "hooks", HOOK_EXTENSIONS, HOOK_SCAN_DEPTH)?,
        mcp_servers: discover_mcp_servers(
            &root,
            &manifest.name,
            &manifest_path,
            raw.mcp_servers,
        )?,
    };

    debug!(
        plugin = %manifest.name,
        skills = inventory.skills.len(),
        agents = inventory.agents.len(),
        commands = inventory.commands.len(),
        hooks = inventory.hooks.len(),
        mcp_servers = inventory.mcp_servers.len(),
        "parsed plugin"
    );

    Ok(ParsedPlugin {
        root,
        manifest,
        inventory,
    })
}

/// Whether `name` can be used as a single path component.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && name.trim() == name
}

fn read_manifest(root: &Path) -> Result<(PathBuf, RawManifest), ManifestError> {
    let path = MANIFEST_PATHS
        .iter()
        .map(|p| root.join(p))
        .find(|p| p.is_file())
        .ok_or_else(|| ManifestError::MissingManifest {
            root: root.to_path_buf(),
        })?;
    let content = read_to_string(&path)?;
    let raw = serde_json::from_str(&content).map_err(|e| ManifestError::MalformedManifest {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok((path, raw))
}

fn discover_skills(root: &Path, plugin: &str) -> Result<Vec<SkillEntry>, ManifestError> {
    let mut skills = Vec::new();
    for dir in sorted_entries(&root.join("skills"))? {
        if !dir.is_dir() || !dir.join(SKILL_MARKER).is_file() {
            continue;
        }
        let path = canonicalize_within(&dir, root)?;
        let name = skill_name(&dir);
        skills.push(SkillEntry { name, path });
    }
    ensure_unique(plugin, ComponentKind::Skills, skills.iter().map(|s| &s.name))?;
    Ok(skills)
}

/// Skill name: the SKILL.md `name` field if readable, else the directory name.
fn skill_name(dir: &Path) -> String {
    let from_marker = std::fs::read_to_string(dir.join(SKILL_MARKER))
        .ok()
        .and_then(|content| frontmatter::parse(&content).ok())
        .and_then(|def| frontmatter::header_name(&def.header).map(str::to_string));
    from_marker.unwrap_or_else(|| file_name(dir))
}

fn discover_agents(root: &Path, plugin: &str) -> Result<Vec<AgentEntry>, ManifestError> {
    let mut agents = Vec::new();
    for path in sorted_entries(&root.join("agents"))? {
        if !path.is_file() || !has_extension(&path, &["md"]) {
            continue;
        }
        let path = canonicalize_within(&path, root)?;
        let content = read_to_string(&path)?;
        // Unreadable headers are reported by the translator at install time.
        let name = frontmatter::parse(&content)
            .ok()
            .and_then(|def| frontmatter::header_name(&def.header).map(str::to_string))
            .unwrap_or_else(|| file_stem(&path));
        agents.push(AgentEntry { name, path });
    }
    ensure_unique(plugin, ComponentKind::Agents, agents.iter().map(|a| &a.name))?;
    Ok(agents)
}

fn discover_files(
    root: &Path,
    folder: &str,
    extensions: &[&str],
    max_depth: usize,
) -> Result<Vec<FileEntry>, ManifestError> {
    let base = root.join(folder);
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(&base)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| ManifestError::Io {
            path: e.path().map_or_else(|| base.clone(), Path::to_path_buf),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
        })?;
        let path = entry.path();
        if !path.is_file() || !has_extension(path, extensions) {
            continue;
        }
        let relative = path
            .strip_prefix(&base)
            .map(Path::to_path_buf)
            .map_err(|_| ManifestError::OutsideRoot {
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            })?;
        files.push(FileEntry {
            path: canonicalize_within(path, root)?,
            relative,
        });
    }
    Ok(files)
}

fn discover_mcp_servers(
    root: &Path,
    plugin: &str,
    manifest_path: &Path,
    inline: Option<serde_json::Value>,
) -> Result<BTreeMap<String, McpServerConfig>, ManifestError> {
    let mut servers = match inline {
        Some(value) => server_map(value, manifest_path)?,
        None => BTreeMap::new(),
    };

    let mcp_path = root.join(MCP_FILE);
    if mcp_path.is_file() {
        let content = read_to_string(&mcp_path)?;
        let mut value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ManifestError::MalformedManifest {
                path: mcp_path.clone(),
                reason: e.to_string(),
            })?;
        if let Some(wrapped) = value.get_mut("mcpServers") {
            value = wrapped.take();
        }
        for (name, config) in server_map(value, &mcp_path)? {
            if servers.contains_key(&name) {
                return Err(ManifestError::DuplicateComponent {
                    plugin: plugin.to_string(),
                    kind: ComponentKind::McpServers,
                    name,
                });
            }
            servers.insert(name, config);
        }
    }

    Ok(servers)
}

fn server_map(
    value: serde_json::Value,
    path: &Path,
) -> Result<BTreeMap<String, McpServerConfig>, ManifestError> {
    serde_json::from_value(value).map_err(|e| ManifestError::MalformedManifest {
        path: path.to_path_buf(),
        reason: format!("invalid MCP server declaration: {e}"),
    })
}

fn ensure_unique<'a>(
    plugin: &str,
    kind: ComponentKind,
    names: impl Iterator<Item = &'a String>,
) -> Result<(), ManifestError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !is_safe_name(name) {
            return Err(ManifestError::InvalidComponentName {
                plugin: plugin.to_string(),
                kind,
                name: name.clone(),
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(ManifestError::DuplicateComponent {
                plugin: plugin.to_string(),
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Immediate children of `dir`, sorted. A missing directory yields nothing.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| ManifestError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(e) => warn!(dir = %dir.display(), error = %e, "skipping unreadable entry"),
        }
    }
    paths.sort();
    Ok(paths)
}

fn canonicalize(path: &Path) -> Result<PathBuf, ManifestError> {
    std::fs::canonicalize(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn canonicalize_within(path: &Path, root: &Path) -> Result<PathBuf, ManifestError> {
    let resolved = canonicalize(path)?;
    if !resolved.starts_with(root) {
        return Err(ManifestError::OutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        });
    }
    Ok(resolved)
}

fn read_to_string(path: &Path) -> Result<String, ManifestError> {
    std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        walkdir::WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| (e.path().to_path_buf(), std::fs::read(e.path()).unwrap()))
            .collect()
    }

    fn full_plugin(root: &Path) {
        write(
            root,
            ".claude-plugin/plugin.json",
            r#"{"name":"demo","version":"1.2.0","description":"Demo plugin","author":{"name":"acme","email":"a@b.c"},"keywords":["x"]}"#,
        );
        write(root, "skills/foo/SKILL.md", "---\nname: foo\n---\nDo foo.");
        write(root, "skills/no-marker/README.md", "not a skill");
        write(root, "agents/reviewer.md", "---\nname: reviewer\n---\nReview.");
        write(root, "agents/notes.txt", "ignored");
        write(root, "commands/ship.md", "Ship it.");
        write(root, "hooks/hooks.json", "{}");
        write(root, "hooks/scripts/pre.sh", "#!/bin/sh\n");
        write(root, "hooks/README.md", "ignored");
        write(
            root,
            ".mcp.json",
            r#"{"mcpServers":{"db":{"command":"db-server","args":["--ro"],"env":{"PORT":"5432"}}}}"#,
        );
    }

    #[test]
    fn parses_full_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        full_plugin(tmp.path());

        let plugin = parse_plugin(tmp.path()).unwrap();
        assert_eq!(plugin.manifest.name, "demo");
        assert_eq!(plugin.manifest.version, "1.2.0");
        assert_eq!(plugin.manifest.author.as_deref(), Some("acme"));
        assert_eq!(plugin.manifest.keywords, vec!["x".to_string()]);

        let inv = &plugin.inventory;
        assert_eq!(inv.skills.len(), 1);
        assert_eq!(inv.skills[0].name, "foo");
        assert_eq!(inv.agents.len(), 1);
        assert_eq!(inv.agents[0].name, "reviewer");
        assert_eq!(inv.commands.len(), 1);
        assert_eq!(inv.commands[0].relative, PathBuf::from("ship.md"));
        let hooks: Vec<_> = inv.hooks.iter().map(|h| h.relative.clone()).collect();
        assert_eq!(hooks, vec![
            PathBuf::from("hooks.json"),
            PathBuf::from("scripts/pre.sh")
        ]);
        assert_eq!(inv.mcp_servers["db"].command, "db-server");
        assert_eq!(inv.mcp_servers["db"].env["PORT"], "5432");
    }

    #[test]
    fn missing_manifest_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "skills/foo/SKILL.md", "x");
        assert!(matches!(
            parse_plugin(tmp.path()),
            Err(ManifestError::MissingManifest { .. })
        ));
    }

    #[test]
    fn parsing_is_read_only() {
        let tmp = tempfile::tempdir().unwrap();
        full_plugin(tmp.path());
        let before = snapshot(tmp.path());
        parse_plugin(tmp.path()).unwrap();
        assert_eq!(snapshot(tmp.path()), before);

        let empty = tempfile::tempdir().unwrap();
        let before = snapshot(empty.path());
        assert!(parse_plugin(empty.path()).is_err());
        assert_eq!(snapshot(empty.path()), before);
    }

    #[test]
    fn root_manifest_fallback_and_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "plugin.json", r#"{"name":"bare"}"#);
        let plugin = parse_plugin(tmp.path()).unwrap();
        assert_eq!(plugin.manifest.version, UNKNOWN_VERSION);
        assert_eq!(plugin.manifest.description, "");
        assert_eq!(plugin.inventory, ComponentInventory::default());
        assert_eq!(plugin.manifest.source, plugin.root.display().to_string());
    }

    #[test]
    fn malformed_manifest_variants() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "plugin.json", "{not json");
        assert!(matches!(
            parse_plugin(tmp.path()),
            Err(ManifestError::MalformedManifest { .. })
        ));

        write(tmp.path(), "plugin.json", r#"{"version":"1.0.0"}"#);
        assert!(matches!(
            parse_plugin(tmp.path()),
            Err(ManifestError::MalformedManifest { .. })
        ));

        write(tmp.path(), "plugin.json", r#"{"name":"../escape"}"#);
        assert!(matches!(
            parse_plugin(tmp.path()),
            Err(ManifestError::MalformedManifest { .. })
        ));
    }

    #[test]
    fn duplicate_agent_names_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "plugin.json", r#"{"name":"dup"}"#);
        write(tmp.path(), "agents/a.md", "---\nname: same\n---\n");
        write(tmp.path(), "agents/b.md", "---\nname: same\n---\n");
        match parse_plugin(tmp.path()) {
            Err(ManifestError::DuplicateComponent { kind, name, .. }) => {
                assert_eq!(kind, ComponentKind::Agents);
                assert_eq!(name, "same");
            },
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_skill_names_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "plugin.json", r#"{"name":"dup"}"#);
        write(tmp.path(), "skills/one/SKILL.md", "---\nname: shared\n---\n");
        write(tmp.path(), "skills/two/SKILL.md", "---\nname: shared\n---\n");
        assert!(matches!(
            parse_plugin(tmp.path()),
            Err(ManifestError::DuplicateComponent {
                kind: ComponentKind::Skills,
                ..
            })
        ));
    }

    #[test]
    fn agent_name_falls_back_to_stem() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "plugin.json", r#"{"name":"p"}"#);
        write(tmp.path(), "agents/helper.md", "No header here.");
        write(tmp.path(), "agents/broken.md", "---\nname: [unclosed\n");
        let plugin = parse_plugin(tmp.path()).unwrap();
        let names: Vec<_> = plugin.inventory.agents.iter().map(|a| &a.name).collect();
        assert_eq!(names, vec!["broken", "helper"]);
    }

    #[test]
    fn bare_mcp_map_and_inline_servers() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "plugin.json",
            r#"{"name":"p","mcpServers":{"inline":{"command":"a"}}}"#,
        );
        write(tmp.path(), ".mcp.json", r#"{"file":{"type":"http","url":"https://x"}}"#);
        let plugin = parse_plugin(tmp.path()).unwrap();
        let names: Vec<_> = plugin.inventory.mcp_servers.keys().cloned().collect();
        assert_eq!(names, vec!["file".to_string(), "inline".to_string()]);
    }

    #[test]
    fn server_declared_twice_is_duplicate() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "plugin.json",
            r#"{"name":"p","mcpServers":{"db":{"command":"a"}}}"#,
        );
        write(tmp.path(), ".mcp.json", r#"{"mcpServers":{"db":{"command":"b"}}}"#);
        assert!(matches!(
            parse_plugin(tmp.path()),
            Err(ManifestError::DuplicateComponent {
                kind: ComponentKind::McpServers,
                ..
            })
        ));
    }

    #[test]
    fn malformed_mcp_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "plugin.json", r#"{"name":"p"}"#);
        write(tmp.path(), ".mcp.json", r#"{"db":{"command":42}}"#);
        assert!(matches!(
            parse_plugin(tmp.path()),
            Err(ManifestError::MalformedManifest { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn skill_symlink_escaping_root_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        write(outside.path(), "evil/SKILL.md", "x");

        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "plugin.json", r#"{"name":"p"}"#);
        std::fs::create_dir_all(tmp.path().join("skills")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("evil"),
            tmp.path().join("skills/evil"),
        )
        .unwrap();
        assert!(matches!(
            parse_plugin(tmp.path()),
            Err(ManifestError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn parse_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        full_plugin(tmp.path());
        let a = parse_plugin(tmp.path()).unwrap();
        let b = parse_plugin(tmp.path()).unwrap();
        assert_eq!(a.manifest, b.manifest);
        assert_eq!(a.inventory, b.inventory);
    }
}
