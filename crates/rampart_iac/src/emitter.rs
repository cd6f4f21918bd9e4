//! Artifact emission.
//!
//! The emitter turns a resolved, validated and policy-compliant organization
//! tree into one infra-as-code unit per project. Units are planned as
//! format-neutral [`ResourceSpec`]s first and then rendered by a
//! [`UnitRenderer`] for the selected [`OutputFormat`].
//!
//! Interpolation strings such as `${google_compute_router.forseti-router.name}`
//! are copied verbatim; the downstream tool resolves them at apply time.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rampart_spec::{project_entries, ProjectRole, ValueTree};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::deployment_manager::DeploymentManagerRenderer;
use crate::error::{IacError, IacResult};
use crate::generated::DEFAULT_LOG_SINK_NAME;
use crate::runner::{ApplyPlan, PlannedUnit};
use crate::terraform::TerraformRenderer;

/// Name of the organization-level unit.
pub const ORGANIZATION_UNIT: &str = "organization";

/// File name of the apply plan written next to the units.
pub const APPLY_PLAN_FILE: &str = "apply_plan.json";

/// Target infra-as-code format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Terraform,
    DeploymentManager,
}

impl OutputFormat {
    /// File written for every unit.
    pub fn file_name(&self) -> &'static str {
        match self {
            OutputFormat::Terraform => "main.tf.json",
            OutputFormat::DeploymentManager => "deployment.yaml",
        }
    }

    fn renderer(&self) -> Box<dyn UnitRenderer> {
        match self {
            OutputFormat::Terraform => Box::new(TerraformRenderer),
            OutputFormat::DeploymentManager => Box::new(DeploymentManagerRenderer),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Terraform => write!(f, "terraform"),
            OutputFormat::DeploymentManager => write!(f, "deployment_manager"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = IacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "terraform" | "tf" => Ok(OutputFormat::Terraform),
            "deployment_manager" | "dm" => Ok(OutputFormat::DeploymentManager),
            other => Err(IacError::UnknownFormat(other.to_string())),
        }
    }
}

/// Kinds of resources the emitter knows how to plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    OrganizationAuditConfig,
    Project,
    AuditDataset,
    AuditLogSink,
    StateBucket,
    Network,
    Bucket,
    Dataset,
}

impl ResourceKind {
    /// Map a `resources.<type>` key to a resource kind.
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "network" => Some(ResourceKind::Network),
            "gcs_bucket" => Some(ResourceKind::Bucket),
            "bq_dataset" => Some(ResourceKind::Dataset),
            _ => None,
        }
    }
}

/// A format-neutral resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    /// Resource name, unique per kind within a unit.
    pub name: String,
    /// Owning project; empty for organization resources.
    pub project_id: String,
    /// Source settings, copied from the configuration.
    pub properties: ValueTree,
}

impl ResourceSpec {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        project_id: impl Into<String>,
        properties: ValueTree,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            project_id: project_id.into(),
            properties,
        }
    }
}

/// Whether a unit covers the organization or a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Organization,
    Project,
}

/// A planned unit before rendering.
#[derive(Debug, Clone)]
pub struct UnitPlan {
    pub name: String,
    pub kind: UnitKind,
    pub resources: Vec<ResourceSpec>,
    /// Native configuration merged over the rendered unit.
    pub overrides: Option<ValueTree>,
    /// Organization settings every unit may refer to.
    pub organization_id: Option<String>,
    pub billing_account: Option<String>,
}

/// One rendered infra-as-code unit.
#[derive(Debug, Clone)]
pub struct ArtifactUnit {
    pub name: String,
    pub kind: UnitKind,
    /// Path of the unit file relative to the artifacts directory.
    pub file: PathBuf,
    pub content: ValueTree,
}

/// Renders a planned unit into a target format.
pub trait UnitRenderer {
    fn render(&self, unit: &UnitPlan) -> IacResult<ValueTree>;

    /// Serialize a rendered unit to file content.
    fn to_text(&self, content: &ValueTree) -> IacResult<String>;
}

/// Walks the organization tree and writes one unit per project.
pub struct ArtifactEmitter {
    format: OutputFormat,
}

impl ArtifactEmitter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Plan every unit in emission order: organization first, then the
    /// central projects, then `projects` as declared.
    pub fn plan(&self, organization: &ValueTree) -> IacResult<Vec<UnitPlan>> {
        let organization_id = organization
            .get_path("overall.organization_id")
            .and_then(ValueTree::scalar_text);
        let billing_account = organization.str_at("overall.billing_account").map(String::from);

        let mut units = Vec::new();
        units.push(UnitPlan {
            name: ORGANIZATION_UNIT.to_string(),
            kind: UnitKind::Organization,
            resources: organization_resources(organization_id.as_deref()),
            overrides: native_overrides(organization),
            organization_id: organization_id.clone(),
            billing_account: billing_account.clone(),
        });

        let mut names: HashSet<String> = HashSet::new();
        names.insert(ORGANIZATION_UNIT.to_string());

        for entry in project_entries(organization) {
            let project_id = entry
                .project_id()
                .ok_or_else(|| IacError::MissingProjectId(entry.location()))?;
            if !names.insert(project_id.to_string()) {
                return Err(IacError::DuplicateUnit(project_id.to_string()));
            }

            debug!("Planning unit '{}' ({})", project_id, entry.location());
            let mut tree = entry.tree.clone();
            if entry.role == ProjectRole::Forseti {
                if let Some(shared) = organization.get_path("forseti.properties") {
                    tree = rampart_spec::merge(
                        &ValueTree::Mapping(
                            [("properties".to_string(), shared.clone())]
                                .into_iter()
                                .collect(),
                        ),
                        &tree,
                    );
                }
            }

            units.push(UnitPlan {
                name: project_id.to_string(),
                kind: UnitKind::Project,
                resources: project_resources(project_id, &tree),
                overrides: native_overrides(&tree),
                organization_id: organization_id.clone(),
                billing_account: tree
                    .str_at("billing_account")
                    .map(String::from)
                    .or_else(|| billing_account.clone()),
            });
        }

        Ok(units)
    }

    /// Plan and render every unit.
    pub fn build_units(&self, organization: &ValueTree) -> IacResult<Vec<ArtifactUnit>> {
        let renderer = self.format.renderer();
        self.plan(organization)?
            .iter()
            .map(|plan| {
                Ok(ArtifactUnit {
                    name: plan.name.clone(),
                    kind: plan.kind,
                    file: PathBuf::from(&plan.name).join(self.format.file_name()),
                    content: renderer.render(plan)?,
                })
            })
            .collect()
    }

    /// Write `units` and the apply plan to `output_dir`.
    ///
    /// Everything is written to a staging directory next to `output_dir`
    /// first; the previous output is only replaced once every file was
    /// written. On failure the previous output is left untouched.
    pub fn write(&self, units: &[ArtifactUnit], output_dir: &Path) -> IacResult<ApplyPlan> {
        Ok(self.stage(units, output_dir)?.promote()?.finish())
    }

    /// Write `units` and the apply plan to a staging directory next to
    /// `output_dir`. Nothing at `output_dir` changes until
    /// [`StagedOutput::promote`].
    pub fn stage(&self, units: &[ArtifactUnit], output_dir: &Path) -> IacResult<StagedOutput> {
        let parent = match output_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let dir_name = output_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                IacError::EmissionFailed(format!("invalid output directory {:?}", output_dir))
            })?;
        fs::create_dir_all(&parent)?;

        let token = Uuid::new_v4().simple().to_string();
        let staging = parent.join(format!(".{}.staging-{}", dir_name, &token[..8]));
        let backup = parent.join(format!(".{}.previous-{}", dir_name, &token[..8]));

        let plan = ApplyPlan {
            artifacts_dir: output_dir.to_path_buf(),
            format: self.format,
            sequence: units
                .iter()
                .map(|u| PlannedUnit {
                    name: u.name.clone(),
                    kind: u.kind,
                    file: u.file.clone(),
                })
                .collect(),
        };

        if let Err(e) = self.write_staging(units, &plan, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        debug!("Staged {} unit(s) in {:?}", units.len(), staging);

        Ok(StagedOutput {
            staging,
            backup,
            plan,
        })
    }

    fn write_staging(&self, units: &[ArtifactUnit], plan: &ApplyPlan, staging: &Path) -> IacResult<()> {
        let renderer = self.format.renderer();
        fs::create_dir_all(staging)?;

        for unit in units {
            let target = staging.join(&unit.file);
            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&target, renderer.to_text(&unit.content)?)?;
            debug!("Wrote unit '{}' to {:?}", unit.name, unit.file);
        }

        let plan_json = serde_json::to_string_pretty(plan)?;
        fs::write(staging.join(APPLY_PLAN_FILE), plan_json + "\n")?;
        Ok(())
    }
}

/// Emitted artifacts waiting in a staging directory.
#[derive(Debug)]
pub struct StagedOutput {
    staging: PathBuf,
    backup: PathBuf,
    plan: ApplyPlan,
}

impl StagedOutput {
    /// Swap the staging directory into place. The previous output is kept
    /// aside until [`PromotedOutput::finish`] or [`PromotedOutput::rollback`].
    pub fn promote(self) -> IacResult<PromotedOutput> {
        let output_dir = &self.plan.artifacts_dir;
        let backup = if output_dir.exists() {
            if let Err(e) = fs::rename(output_dir, &self.backup) {
                let _ = fs::remove_dir_all(&self.staging);
                return Err(e.into());
            }
            Some(self.backup)
        } else {
            None
        };

        if let Err(e) = fs::rename(&self.staging, output_dir) {
            // Put the previous output back.
            if let Some(backup) = &backup {
                let _ = fs::rename(backup, output_dir);
            }
            let _ = fs::remove_dir_all(&self.staging);
            return Err(e.into());
        }
        info!(
            "Emitted {} unit(s) as {} to {:?}",
            self.plan.sequence.len(),
            self.plan.format,
            output_dir
        );
        Ok(PromotedOutput {
            backup,
            plan: self.plan,
        })
    }

    /// Remove the staging directory.
    pub fn discard(self) {
        if let Err(e) = fs::remove_dir_all(&self.staging) {
            warn!("Could not remove staged output {:?}: {}", self.staging, e);
        }
    }
}

/// Artifacts in place at the output directory, with the previous output
/// still available for a rollback.
#[derive(Debug)]
pub struct PromotedOutput {
    backup: Option<PathBuf>,
    plan: ApplyPlan,
}

impl PromotedOutput {
    /// Drop the previous output and return the apply plan.
    pub fn finish(self) -> ApplyPlan {
        if let Some(backup) = &self.backup {
            if let Err(e) = fs::remove_dir_all(backup) {
                warn!("Could not remove previous output {:?}: {}", backup, e);
            }
        }
        self.plan
    }

    /// Restore the previous output, or remove the new one when there was
    /// none.
    pub fn rollback(self) -> IacResult<()> {
        let output_dir = &self.plan.artifacts_dir;
        fs::remove_dir_all(output_dir)?;
        if let Some(backup) = &self.backup {
            fs::rename(backup, output_dir)?;
        }
        warn!("Rolled back emitted artifacts in {:?}", output_dir);
        Ok(())
    }
}

fn organization_resources(organization_id: Option<&str>) -> Vec<ResourceSpec> {
    match organization_id {
        Some(id) => vec![ResourceSpec::new(
            ResourceKind::OrganizationAuditConfig,
            "all-services",
            "",
            ValueTree::Mapping(
                [("org_id".to_string(), ValueTree::from(id))]
                    .into_iter()
                    .collect(),
            ),
        )],
        None => Vec::new(),
    }
}

fn project_resources(project_id: &str, project: &ValueTree) -> Vec<ResourceSpec> {
    let mut resources = vec![ResourceSpec::new(
        ResourceKind::Project,
        project_id,
        project_id,
        project.clone(),
    )];

    let dataset = project.get_path("audit.logs_bigquery_dataset");
    if let Some(dataset) = dataset.filter(|d| !d.is_empty_section()) {
        let dataset_id = dataset
            .str_at("dataset_id")
            .map(String::from)
            .unwrap_or_else(|| project_id.replace('-', "_"));
        resources.push(ResourceSpec::new(
            ResourceKind::AuditDataset,
            dataset_id.clone(),
            project_id,
            dataset.clone(),
        ));

        let sink = project
            .str_at("audit.log_sink_name")
            .unwrap_or(DEFAULT_LOG_SINK_NAME);
        let destination = format!(
            "bigquery.googleapis.com/projects/{}/datasets/{}",
            project_id, dataset_id
        );
        resources.push(ResourceSpec::new(
            ResourceKind::AuditLogSink,
            sink,
            project_id,
            ValueTree::Mapping(
                [
                    ("destination".to_string(), ValueTree::from(destination)),
                    ("dataset_id".to_string(), ValueTree::from(dataset_id)),
                ]
                .into_iter()
                .collect(),
            ),
        ));
    }

    let bucket = project.get_path("devops.state_storage_bucket");
    if let Some(bucket) = bucket.filter(|b| !b.is_empty_section()) {
        if let Some(name) = bucket.str_at("name") {
            resources.push(ResourceSpec::new(
                ResourceKind::StateBucket,
                name,
                project_id,
                bucket.clone(),
            ));
        }
    }

    if let Some(types) = project.get("resources").and_then(ValueTree::as_mapping) {
        for (resource_type, docs) in types {
            let Some(kind) = ResourceKind::from_resource_type(resource_type) else {
                warn!(
                    "Project '{}': no emitter for resource type '{}', skipping",
                    project_id, resource_type
                );
                continue;
            };
            for doc in docs.as_sequence().unwrap_or_default() {
                let name = doc
                    .get("name")
                    .and_then(ValueTree::scalar_text)
                    .unwrap_or_else(|| format!("{}-{}", project_id, resource_type));
                resources.push(ResourceSpec::new(kind, name, project_id, doc.clone()));
            }
        }
    }

    resources
}

/// The native configuration to merge over a unit:
/// `terraform_deployments.resources.config`.
fn native_overrides(tree: &ValueTree) -> Option<ValueTree> {
    tree.get_path("terraform_deployments.resources.config")
        .filter(|c| !c.is_empty_section())
        .cloned()
}
