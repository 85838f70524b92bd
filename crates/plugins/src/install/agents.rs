//! Agents are translated into the target header schema and written under a
//! per-plugin directory of the agents area.

use std::path::Path;

use plugport_config::ExtensionFields;

use crate::{
    error::InstallError,
    frontmatter,
    install::{KindPlan, actions::FsAction, file_matches},
    translate::{TranslationWarning, translate_header},
    types::{AgentDefinition, AgentEntry, ComponentKind, ParsedPlugin},
};

/// Translate one agent file into the target document.
pub(crate) fn translate_file(
    plugin: &str,
    agent: &AgentEntry,
    extension_fields: ExtensionFields,
) -> Result<(String, Vec<TranslationWarning>), InstallError> {
    let content =
        std::fs::read_to_string(&agent.path).map_err(|source| InstallError::ReadFailed {
            plugin: plugin.to_string(),
            kind: ComponentKind::Agents,
            path: agent.path.clone(),
            source,
        })?;
    let failed = |source| InstallError::TranslationFailed {
        plugin: plugin.to_string(),
        agent: agent.path.clone(),
        source,
    };

    let definition = frontmatter::parse(&content).map_err(failed)?;
    let translation = translate_header(&definition.header, extension_fields).map_err(failed)?;
    let rendered = frontmatter::render(&AgentDefinition {
        header: translation.header,
        body: definition.body,
    })
    .map_err(failed)?;
    Ok((rendered, translation.warnings))
}

pub(crate) fn plan(
    area: &Path,
    plugin: &ParsedPlugin,
    extension_fields: ExtensionFields,
) -> Result<KindPlan, InstallError> {
    let mut plan = KindPlan::default();
    let dir = area.join(plugin.name());

    for agent in &plugin.inventory.agents {
        let (rendered, warnings) = translate_file(plugin.name(), agent, extension_fields)?;
        plan.warnings.extend(
            warnings
                .into_iter()
                .map(|w| format!("agent '{}': {w}", agent.name)),
        );

        let file_name = agent
            .path
            .file_name()
            .map_or_else(|| format!("{}.md", agent.name).into(), ToOwned::to_owned);
        let target = dir.join(file_name);
        plan.items.push(agent.name.clone());
        plan.owned.push(target.clone());

        if !file_matches(&target, rendered.as_bytes()) {
            plan.actions.push(FsAction::Write {
                path: target,
                contents: rendered.into_bytes(),
                permissions: None,
            });
        }
    }

    Ok(plan)
}
