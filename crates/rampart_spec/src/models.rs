//! Project entries of a resolved organization document.
//!
//! The pipeline works on [`ValueTree`]s throughout. These helpers locate the
//! project entries (central and regular) inside an organization tree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::ValueTree;

/// Record location used when `generated_fields_path` is not set.
pub const DEFAULT_GENERATED_FIELDS_PATH: &str = "generated_fields.yaml";

/// Where a project entry sits in the organization document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    Devops,
    AuditLogs,
    Forseti,
    Regular,
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProjectRole::Devops => "devops.project",
            ProjectRole::AuditLogs => "audit_logs_project",
            ProjectRole::Forseti => "forseti.project",
            ProjectRole::Regular => "projects",
        };
        f.write_str(name)
    }
}

/// A borrowed project entry together with its location.
#[derive(Debug, Clone, Copy)]
pub struct ProjectEntry<'a> {
    pub role: ProjectRole,
    /// Position within `projects`; `None` for the central projects.
    pub index: Option<usize>,
    pub tree: &'a ValueTree,
}

impl<'a> ProjectEntry<'a> {
    pub fn location(&self) -> String {
        match self.index {
            Some(index) => format!("{}[{}]", self.role, index),
            None => self.role.to_string(),
        }
    }

    /// The project id, if the entry has one.
    pub fn project_id(&self) -> Option<&'a str> {
        self.tree.str_at("project_id")
    }

    /// Dataset identifier derived from the project id: hyphens become underscores.
    pub fn derived_dataset_id(&self) -> Option<String> {
        self.project_id().map(|id| id.replace('-', "_"))
    }

    /// Extra properties that apply to this entry: the project's own
    /// `properties`, plus `forseti.properties` for the Forseti project.
    pub fn properties(&self, organization: &'a ValueTree) -> Vec<&'a ValueTree> {
        let mut found = Vec::new();
        if let Some(own) = self.tree.get("properties") {
            found.push(own);
        }
        if self.role == ProjectRole::Forseti {
            if let Some(shared) = organization.get_path("forseti.properties") {
                found.push(shared);
            }
        }
        found
    }
}

/// List project entries in emission order: the central devops, audit-logs and
/// Forseti projects first, then `projects` as declared.
pub fn project_entries(organization: &ValueTree) -> Vec<ProjectEntry<'_>> {
    let mut entries = Vec::new();

    let central = [
        (ProjectRole::Devops, "devops.project"),
        (ProjectRole::AuditLogs, "audit_logs_project"),
        (ProjectRole::Forseti, "forseti.project"),
    ];
    for (role, path) in central {
        if let Some(tree) = organization.get_path(path).filter(|t| !t.is_null()) {
            entries.push(ProjectEntry {
                role,
                index: None,
                tree,
            });
        }
    }

    if let Some(projects) = organization.get("projects").and_then(ValueTree::as_sequence) {
        for (index, tree) in projects.iter().enumerate() {
            entries.push(ProjectEntry {
                role: ProjectRole::Regular,
                index: Some(index),
                tree,
            });
        }
    }

    entries
}

/// Replace the project entry at `role`/`index` inside the organization tree.
/// Entries that do not exist are left alone.
pub fn replace_project_entry(
    organization: &mut ValueTree,
    role: ProjectRole,
    index: Option<usize>,
    value: ValueTree,
) {
    let section = role.to_string();
    let mut node = organization;
    for key in section.split('.') {
        let ValueTree::Mapping(map) = node else {
            return;
        };
        let Some(next) = map.get_mut(key) else {
            return;
        };
        node = next;
    }
    match (node, index) {
        (ValueTree::Sequence(items), Some(i)) if i < items.len() => items[i] = value,
        (slot, None) => *slot = value,
        _ => {}
    }
}
