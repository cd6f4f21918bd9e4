//! Generated-fields store.
//!
//! Values the engine computes itself (bucket names, sink names) are recorded
//! under `projects.<project_id>.<field>` so later runs reuse them instead of
//! generating new identifiers. The record is read once when a run starts and
//! written once, atomically, after the run succeeded.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rampart_spec::{
    merge, project_entries, replace_project_entry, DocumentReader, DocumentWriter, Mapping, Merger,
    StagedDocument, ValueTree,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{IacError, IacResult};

pub const STATE_STORAGE_BUCKET: &str = "state_storage_bucket";
pub const LOG_SINK_NAME: &str = "log_sink_name";
pub const DEFAULT_LOG_SINK_NAME: &str = "audit-logs-to-bigquery";

const PROJECTS_KEY: &str = "projects";

/// Persisted record of engine-generated values.
#[derive(Debug, Clone)]
pub struct GeneratedFieldsStore {
    path: PathBuf,
    persisted: ValueTree,
    staged: ValueTree,
    regenerate: BTreeSet<String>,
}

impl GeneratedFieldsStore {
    /// Create an empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            persisted: ValueTree::mapping(),
            staged: ValueTree::mapping(),
            regenerate: BTreeSet::new(),
        }
    }

    /// Load the record at `path`. A missing file is an empty record.
    pub fn load(path: impl Into<PathBuf>) -> IacResult<Self> {
        let path = path.into();
        let mut store = Self::empty(&path);
        if !path.exists() {
            info!("No generated fields record at {:?}, starting empty", path);
            return Ok(store);
        }

        let record = DocumentReader::read(&path)?;
        store.persisted = match record {
            ValueTree::Null => ValueTree::mapping(),
            ValueTree::Mapping(_) => record,
            other => {
                return Err(IacError::InvalidRecord {
                    path,
                    message: format!("expected a mapping, found {}", other.kind()),
                })
            }
        };

        if let Some(projects) = store.persisted.get(PROJECTS_KEY) {
            if projects.as_mapping().is_none() {
                return Err(IacError::InvalidRecord {
                    path,
                    message: format!("'{}' must be a mapping", PROJECTS_KEY),
                });
            }
        }

        info!(
            "Loaded generated fields for {} project(s) from {:?}",
            store.project_ids().len(),
            store.path
        );
        Ok(store)
    }

    /// Treat the listed `project_id/field` entries as stale.
    pub fn with_regenerate<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regenerate.extend(entries.into_iter().map(Into::into));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Values generated or reused during this run.
    pub fn staged(&self) -> &ValueTree {
        &self.staged
    }

    /// Project ids present in the persisted record.
    pub fn project_ids(&self) -> Vec<&str> {
        self.persisted
            .get(PROJECTS_KEY)
            .and_then(ValueTree::as_mapping)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_stale(&self, project_id: &str, field: &str) -> bool {
        self.regenerate.contains(&format!("{}/{}", project_id, field))
    }

    /// Look up a value, preferring this run's staged value.
    pub fn get(&self, project_id: &str, field: &str) -> Option<&ValueTree> {
        lookup(&self.staged, project_id, field).or_else(|| {
            if self.is_stale(project_id, field) {
                None
            } else {
                lookup(&self.persisted, project_id, field)
            }
        })
    }

    /// Reuse the stored value for `project_id/field` or compute and stage a
    /// fresh one.
    pub fn get_or_generate<F>(&mut self, project_id: &str, field: &str, compute: F) -> ValueTree
    where
        F: FnOnce() -> ValueTree,
    {
        if let Some(existing) = self.get(project_id, field) {
            let existing = existing.clone();
            self.stage_value(project_id, field, existing.clone());
            return existing;
        }

        let fresh = compute();
        debug!("Generated {}/{} = {:?}", project_id, field, fresh);
        self.stage_value(project_id, field, fresh.clone());
        fresh
    }

    fn stage_value(&mut self, project_id: &str, field: &str, value: ValueTree) {
        let mut fields = Mapping::new();
        fields.insert(field.to_string(), value);
        let mut project = Mapping::new();
        project.insert(project_id.to_string(), ValueTree::Mapping(fields));
        let mut overlay = Mapping::new();
        overlay.insert(PROJECTS_KEY.to_string(), ValueTree::Mapping(project));

        self.staged = merge(&self.staged, &ValueTree::Mapping(overlay));
    }

    /// Fill generated fields into a single project tree.
    ///
    /// Returns a new tree; `devops.state_storage_bucket.name` is only
    /// generated when the user did not set it.
    pub fn apply_to_project(&mut self, project: &ValueTree, location: &str) -> IacResult<ValueTree> {
        let project_id = project
            .str_at("project_id")
            .ok_or_else(|| IacError::MissingProjectId(location.to_string()))?
            .to_string();

        let mut overlay = Mapping::new();

        let bucket_path = "devops.state_storage_bucket.name";
        if project.get_path(bucket_path).map_or(true, ValueTree::is_null) {
            let name = self.get_or_generate(&project_id, STATE_STORAGE_BUCKET, || {
                ValueTree::from(state_bucket_name(&project_id))
            });
            overlay.insert(
                "devops".to_string(),
                nested(&["state_storage_bucket", "name"], name),
            );
        }

        let sink = self.get_or_generate(&project_id, LOG_SINK_NAME, || {
            ValueTree::from(DEFAULT_LOG_SINK_NAME)
        });
        overlay.insert("audit".to_string(), nested(&[LOG_SINK_NAME], sink));

        Ok(merge(project, &ValueTree::Mapping(overlay)))
    }

    /// Fill generated fields into every project of an organization tree.
    pub fn apply_to_organization(&mut self, organization: &ValueTree) -> IacResult<ValueTree> {
        let mut result = organization.clone();
        let entries: Vec<_> = project_entries(organization)
            .into_iter()
            .map(|e| (e.role, e.index, e.location(), e.tree.clone()))
            .collect();

        for (role, index, location, tree) in entries {
            let filled = self.apply_to_project(&tree, &location)?;
            replace_project_entry(&mut result, role, index, filled);
        }
        Ok(result)
    }

    /// The record that a successful run writes: the persisted record with this
    /// run's values merged over it.
    pub fn reconciled(&self) -> IacResult<ValueTree> {
        Ok(Merger::new().merge_strict(&self.persisted, &self.staged)?)
    }

    /// Atomically overwrite the record file with the reconciled values.
    pub fn persist(&self) -> IacResult<()> {
        self.stage()?.commit()?;
        info!("Persisted generated fields to {:?}", self.path);
        Ok(())
    }

    /// Write the reconciled record next to the record file without replacing
    /// it yet.
    pub fn stage(&self) -> IacResult<StagedDocument> {
        let record = self.reconciled()?;
        Ok(DocumentWriter::stage(&self.path, &record)?)
    }
}

fn lookup<'a>(record: &'a ValueTree, project_id: &str, field: &str) -> Option<&'a ValueTree> {
    record
        .get(PROJECTS_KEY)
        .and_then(|p| p.get(project_id))
        .and_then(|p| p.get(field))
}

/// Derive a state bucket name such as `hipaa-example-state-3fa2c1`.
pub fn state_bucket_name(project_id: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-state-{}", project_id, &suffix[..6])
}

fn nested(keys: &[&str], leaf: ValueTree) -> ValueTree {
    keys.iter().rev().fold(leaf, |inner, key| {
        let mut map = Mapping::new();
        map.insert(key.to_string(), inner);
        ValueTree::Mapping(map)
    })
}
