//! Commands and hooks are copied verbatim; wiring them into the host is left
//! to the user, so every copied file produces a warning.

use std::path::Path;

use crate::{
    error::InstallError,
    install::{KindPlan, actions::FsAction, file_matches},
    types::{ComponentKind, FileEntry},
};

pub(crate) fn plan(
    kind: ComponentKind,
    area: &Path,
    plugin: &str,
    files: &[FileEntry],
) -> Result<KindPlan, InstallError> {
    let mut plan = KindPlan::default();
    let dir = area.join(plugin);

    for file in files {
        let read_failed = |source: std::io::Error| InstallError::ReadFailed {
            plugin: plugin.to_string(),
            kind,
            path: file.path.clone(),
            source,
        };
        let contents = std::fs::read(&file.path).map_err(&read_failed)?;
        let permissions = std::fs::metadata(&file.path)
            .map_err(read_failed)?
            .permissions();
        let target = dir.join(&file.relative);
        let label = file.relative.display().to_string();

        plan.warnings.push(follow_up(kind, &label, &target));
        plan.items.push(label);
        plan.owned.push(target.clone());

        let same_mode = std::fs::metadata(&target).is_ok_and(|m| m.permissions() == permissions);
        if !same_mode || !file_matches(&target, &contents) {
            plan.actions.push(FsAction::Write {
                path: target,
                contents,
                permissions: Some(permissions),
            });
        }
    }

    Ok(plan)
}

fn follow_up(kind: ComponentKind, label: &str, target: &Path) -> String {
    match kind {
        ComponentKind::Commands => format!(
            "command '{label}' copied to {}; slash-command wiring needs manual follow-up",
            target.display()
        ),
        ComponentKind::Hooks => format!(
            "hook '{label}' copied to {}; hook configuration needs manual follow-up",
            target.display()
        ),
        other => format!("{other} '{label}' copied to {}", target.display()),
    }
}
