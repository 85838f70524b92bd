//! Skills are installed by reference: one link per skill, pointing at the
//! skill directory inside the plugin source.

use std::path::Path;

use crate::{
    error::InstallError,
    fs_util,
    install::{KindPlan, actions::FsAction},
    types::{InstallationRecord, ParsedPlugin},
};

pub(crate) fn plan(
    area: &Path,
    plugin: &ParsedPlugin,
    previous: Option<&InstallationRecord>,
) -> Result<KindPlan, InstallError> {
    let mut plan = KindPlan::default();

    for skill in &plugin.inventory.skills {
        let link = area.join(&skill.name);
        plan.items.push(skill.name.clone());
        plan.owned.push(link.clone());
        plan.skill_sources.insert(skill.name.clone(), skill.path.clone());

        let current = fs_util::read_link(&link);
        if current.as_ref() == Some(&skill.path) {
            continue;
        }

        // An occupied path may only be repointed when it is still the link
        // this plugin created.
        let occupied = std::fs::symlink_metadata(&link).is_ok();
        let ours = current.is_some_and(|target| {
            previous.is_some_and(|r| r.owns(&link) && r.linked_skill(&skill.name, &target))
        });
        if occupied && !ours {
            return Err(InstallError::ConflictingSkill {
                plugin: plugin.name().to_string(),
                skill: skill.name.clone(),
                existing: link,
                source_dir: skill.path.clone(),
            });
        }

        plan.actions.push(FsAction::Link {
            path: link,
            target: skill.path.clone(),
        });
    }

    Ok(plan)
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::types::{ComponentInventory, PluginManifest, SkillEntry},
    };

    fn plugin_with_skill(source: &Path) -> ParsedPlugin {
        ParsedPlugin {
            root: source.parent().unwrap().to_path_buf(),
            manifest: PluginManifest {
                name: "demo".into(),
                version: "1.0.0".into(),
                description: String::new(),
                source: "local".into(),
                author: None,
                homepage: None,
                repository: None,
                license: None,
                keywords: Vec::new(),
            },
            inventory: ComponentInventory {
                skills: vec![SkillEntry {
                    name: "foo".into(),
                    path: source.to_path_buf(),
                }],
                ..Default::default()
            },
        }
    }

    fn record_linking(path: &Path, source: &Path) -> InstallationRecord {
        InstallationRecord {
            name: "demo".into(),
            version: "0.9.0".into(),
            description: String::new(),
            source: "local".into(),
            installed_at: "2026-01-01T00:00:00Z".into(),
            updated_at: None,
            components: Default::default(),
            items: Default::default(),
            paths: vec![path.display().to_string()],
            warnings: Vec::new(),
            mcp_servers: Default::default(),
            skill_sources: [("foo".to_string(), source.display().to_string())].into(),
        }
    }

    #[test]
    fn fresh_skill_emits_link() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src/foo");
        std::fs::create_dir_all(&source).unwrap();
        let area = tmp.path().join("skills");

        let plan = plan(&area, &plugin_with_skill(&source), None).unwrap();
        assert_eq!(plan.actions, vec![FsAction::Link {
            path: area.join("foo"),
            target: source,
        }]);
        assert_eq!(plan.items, vec!["foo".to_string()]);
    }

    #[test]
    fn link_already_in_place_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src/foo");
        std::fs::create_dir_all(&source).unwrap();
        let area = tmp.path().join("skills");
        std::fs::create_dir_all(&area).unwrap();
        fs_util::symlink_dir(&source, &area.join("foo")).unwrap();

        let plan = plan(&area, &plugin_with_skill(&source), None).unwrap();
        assert!(plan.actions.is_empty());
        assert_eq!(plan.owned, vec![area.join("foo")]);
    }

    #[test]
    fn foreign_skill_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src/foo");
        let other = tmp.path().join("other/foo");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&other).unwrap();
        let area = tmp.path().join("skills");
        std::fs::create_dir_all(&area).unwrap();
        fs_util::symlink_dir(&other, &area.join("foo")).unwrap();

        let err = plan(&area, &plugin_with_skill(&source), None).unwrap_err();
        match err {
            InstallError::ConflictingSkill { skill, existing, .. } => {
                assert_eq!(skill, "foo");
                assert_eq!(existing, area.join("foo"));
            },
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn own_previous_link_is_repointed() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("v2/foo");
        let old = tmp.path().join("v1/foo");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&old).unwrap();
        let area = tmp.path().join("skills");
        std::fs::create_dir_all(&area).unwrap();
        let link = area.join("foo");
        fs_util::symlink_dir(&old, &link).unwrap();

        let previous = record_linking(&link, &old);
        let plan = plan(&area, &plugin_with_skill(&source), Some(&previous)).unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].path(), link.as_path());
        assert_eq!(plan.skill_sources["foo"], source);
    }

    #[test]
    fn link_taken_over_by_another_source_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("alpha/foo");
        let other = tmp.path().join("beta/foo");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&other).unwrap();
        let area = tmp.path().join("skills");
        std::fs::create_dir_all(&area).unwrap();
        let link = area.join("foo");
        fs_util::symlink_dir(&other, &link).unwrap();

        // Recorded as ours, but the link now points somewhere we never linked.
        let previous = record_linking(&link, &source);
        let err = plan(&area, &plugin_with_skill(&source), Some(&previous)).unwrap_err();
        assert!(matches!(err, InstallError::ConflictingSkill { .. }));
        assert_eq!(fs_util::read_link(&link), Some(other));
    }
}
