//! The configuration pipeline.
//!
//! A run goes through these stages, strictly in order:
//!
//! 1. resolve `imports` from the root document
//! 2. merge `project_defaults` beneath every project entry
//! 3. validate the organization, every project and every resource document,
//!    then fill in schema defaults
//! 4. enforce policy
//! 5. fill generated fields from the persisted record
//! 6. emit artifacts and persist the record, swapping both in only once both
//!    were written
//!
//! Validation and policy findings are collected across all projects before
//! the run aborts. Nothing is written unless every stage succeeded.

use std::path::{Path, PathBuf};

use rampart_iac::{
    hand_off, ApplyPlan, ArtifactEmitter, DeploymentRunner, GeneratedFieldsStore, RunnerStatus,
};
use rampart_policy::{PolicyEnforcer, ORGANIZATION_SCOPE};
use rampart_spec::{
    project_entries, replace_project_entry, Mapping, Merger, ProjectEntry, SchemaRegistry,
    SchemaValidator, ValidationError, ValueTree, DEFAULT_GENERATED_FIELDS_PATH,
    ORGANIZATION_SCHEMA, PROJECT_SCHEMA,
};
use rampart_templates::ImportResolver;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::report::{Diagnostic, RunReport};

const PROJECT_DEFAULTS_KEY: &str = "project_defaults";
const RESOURCES_KEY: &str = "resources";

/// Runs the pipeline for one root configuration.
pub struct Engine {
    config: EngineConfig,
    registry: SchemaRegistry,
    enforcer: PolicyEnforcer,
}

impl Engine {
    /// Build an engine from settings, loading any extra schemas.
    pub fn new(config: EngineConfig) -> CoreResult<Self> {
        let mut registry = SchemaRegistry::builtin()?;
        if let Some(dir) = &config.schema_dir {
            let loaded = registry.load_dir(dir)?;
            debug!("Loaded {} extra schema(s) from {:?}", loaded, dir);
        }
        let enforcer = PolicyEnforcer::with_rules(config.rule_set()?);

        Ok(Self {
            config,
            registry,
            enforcer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Run stages 1 to 4 only. Writes nothing.
    pub fn check(&self, root: &Path) -> CoreResult<RunReport> {
        let mut report = RunReport::new(Uuid::new_v4());
        let span = info_span!("run", run_id = %report.run_id);
        let _guard = span.enter();

        self.prepare(root, &mut report)?;
        report.finish();
        info!("Check passed: {}", report.summary());
        Ok(report)
    }

    /// Run the whole pipeline and write artifacts plus the generated-fields
    /// record.
    pub fn run(&self, root: &Path) -> CoreResult<RunReport> {
        let mut report = RunReport::new(Uuid::new_v4());
        let span = info_span!("run", run_id = %report.run_id);
        let _guard = span.enter();

        let organization = self.prepare(root, &mut report)?;

        let record_path = record_path(root, &organization);
        let mut store = GeneratedFieldsStore::load(&record_path)?
            .with_regenerate(self.config.regenerate.iter().cloned());
        let organization = store.apply_to_organization(&organization)?;
        info!("Stage 5: generated fields applied");

        let emitter = ArtifactEmitter::new(self.config.format);
        let units = emitter.build_units(&organization)?;

        // Both the artifacts and the record are fully written before either
        // replaces its previous version.
        let staged = emitter.stage(&units, &self.config.output_dir)?;
        let record = match store.stage() {
            Ok(record) => record,
            Err(e) => {
                staged.discard();
                return Err(e.into());
            }
        };

        let promoted = staged.promote()?;
        if let Err(e) = record.commit() {
            error!("Could not persist generated fields, restoring previous artifacts");
            if let Err(rollback) = promoted.rollback() {
                error!("Rollback failed: {}", rollback);
            }
            return Err(e.into());
        }
        let plan = promoted.finish();
        info!("Stage 6: artifacts emitted, generated fields persisted");

        report.apply_plan = Some(plan);
        report.finish();
        info!("Run complete: {}", report.summary());
        Ok(report)
    }

    /// Feed every unit of `plan` to `runner`, stopping at the first failure.
    pub async fn hand_off(
        &self,
        runner: &dyn DeploymentRunner,
        plan: &ApplyPlan,
    ) -> CoreResult<Vec<RunnerStatus>> {
        info!(
            "Handing {} unit(s) in {:?} to the runner",
            plan.sequence.len(),
            plan.artifacts_dir
        );
        Ok(hand_off(runner, plan).await?)
    }

    /// Stages 1 to 4. Returns the validated tree with defaults applied.
    fn prepare(&self, root: &Path, report: &mut RunReport) -> CoreResult<ValueTree> {
        let resolved = ImportResolver::with_merge_options(self.config.merge_options()).resolve(root)?;
        info!("Stage 1: imports resolved");

        let merged = self.apply_project_defaults(&resolved);
        info!("Stage 2: project defaults merged");

        let diagnostics = self.validate(&merged)?;
        if !diagnostics.is_empty() {
            return Err(CoreError::Validation(diagnostics));
        }
        let organization = self.apply_schema_defaults(&merged)?;
        info!("Stage 3: schema validation passed");

        let policy = self.enforcer.enforce(&organization);
        report.warnings = policy.warnings().into_iter().cloned().collect();
        if !policy.passed() {
            return Err(CoreError::PolicyViolations(
                policy.violations().into_iter().cloned().collect(),
            ));
        }
        info!(
            "Stage 4: policy passed with {} warning(s)",
            report.warnings.len()
        );

        report.projects = project_entries(&organization)
            .iter()
            .filter_map(|e| e.project_id().map(String::from))
            .collect();
        Ok(organization)
    }

    fn apply_project_defaults(&self, organization: &ValueTree) -> ValueTree {
        let Some(defaults) = organization
            .get(PROJECT_DEFAULTS_KEY)
            .filter(|d| d.as_mapping().is_some())
        else {
            return organization.clone();
        };

        let merger = Merger::with_options(self.config.merge_options());
        let mut result = organization.clone();
        for entry in project_entries(organization) {
            let merged = merger.merge(defaults, entry.tree);
            replace_project_entry(&mut result, entry.role, entry.index, merged);
        }
        result
    }

    /// Collect schema errors for the organization, every project and every
    /// resource document.
    fn validate(&self, organization: &ValueTree) -> CoreResult<Vec<Diagnostic>> {
        let org_schema = self.registry.require(ORGANIZATION_SCHEMA)?;
        let project_schema = self.registry.require(PROJECT_SCHEMA)?;

        let mut diagnostics: Vec<Diagnostic> =
            SchemaValidator::collect_errors(organization, org_schema)
                .into_iter()
                .map(|e| located(ORGANIZATION_SCOPE, "", e))
                .collect();

        for entry in project_entries(organization) {
            let owner = owner(&entry);
            diagnostics.extend(
                SchemaValidator::collect_errors(entry.tree, project_schema)
                    .into_iter()
                    .map(|e| located(&owner, "", e)),
            );
            diagnostics.extend(self.validate_resources(&owner, entry.tree));
        }

        for diagnostic in &diagnostics {
            debug!("Validation: {}", diagnostic);
        }
        Ok(diagnostics)
    }

    fn validate_resources(&self, owner: &str, project: &ValueTree) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let Some(types) = project.get(RESOURCES_KEY).and_then(ValueTree::as_mapping) else {
            return diagnostics;
        };

        for (resource_type, docs) in types {
            let Some(schema) = self.registry.get(resource_type) else {
                warn!(
                    "Project '{}': no schema for resource type '{}', skipping validation",
                    owner, resource_type
                );
                continue;
            };
            let prefix = format!("{}.{}", RESOURCES_KEY, resource_type);
            let Some(docs) = docs.as_sequence() else {
                diagnostics.push(Diagnostic::new(
                    owner,
                    prefix,
                    format!("TypeMismatch: must be array, found {}", docs.kind()),
                ));
                continue;
            };
            for (i, doc) in docs.iter().enumerate() {
                let prefix = format!("{}[{}]", prefix, i);
                diagnostics.extend(
                    SchemaValidator::collect_errors(doc, schema)
                        .into_iter()
                        .map(|e| located(owner, &prefix, e)),
                );
            }
        }
        diagnostics
    }

    /// Return a copy with schema defaults filled into the organization,
    /// every project and every resource document.
    fn apply_schema_defaults(&self, organization: &ValueTree) -> CoreResult<ValueTree> {
        let org_schema = self.registry.require(ORGANIZATION_SCHEMA)?;
        let project_schema = self.registry.require(PROJECT_SCHEMA)?;

        let mut result = SchemaValidator::apply_defaults(organization, org_schema);
        for entry in project_entries(organization) {
            let mut project = SchemaValidator::apply_defaults(entry.tree, project_schema);
            if let ValueTree::Mapping(map) = &mut project {
                if let Some(ValueTree::Mapping(types)) = map.get(RESOURCES_KEY) {
                    let filled = self.resource_defaults(types);
                    map.insert(RESOURCES_KEY.to_string(), ValueTree::Mapping(filled));
                }
            }
            replace_project_entry(&mut result, entry.role, entry.index, project);
        }
        Ok(result)
    }

    fn resource_defaults(&self, types: &Mapping) -> Mapping {
        types
            .iter()
            .map(|(resource_type, docs)| {
                let filled = match (self.registry.get(resource_type), docs) {
                    (Some(schema), ValueTree::Sequence(items)) => ValueTree::Sequence(
                        items
                            .iter()
                            .map(|doc| SchemaValidator::apply_defaults(doc, schema))
                            .collect(),
                    ),
                    _ => docs.clone(),
                };
                (resource_type.clone(), filled)
            })
            .collect()
    }
}

/// Where the generated-fields record lives: `generated_fields_path`,
/// relative to the root document's directory.
fn record_path(root: &Path, organization: &ValueTree) -> PathBuf {
    let configured = PathBuf::from(
        organization
            .str_at("generated_fields_path")
            .unwrap_or(DEFAULT_GENERATED_FIELDS_PATH),
    );
    if configured.is_absolute() {
        return configured;
    }
    match root.parent() {
        Some(dir) => dir.join(configured),
        None => configured,
    }
}

fn owner(entry: &ProjectEntry<'_>) -> String {
    entry
        .project_id()
        .map(String::from)
        .unwrap_or_else(|| entry.location())
}

fn located(owner: &str, prefix: &str, error: ValidationError) -> Diagnostic {
    let path = match (prefix.is_empty(), error.path.as_str()) {
        (true, path) => path.to_string(),
        (false, "<root>") => prefix.to_string(),
        (false, path) => format!("{}.{}", prefix, path),
    };
    Diagnostic::new(owner, path, error.kind.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn yaml(text: &str) -> ValueTree {
        serde_yaml::from_str(text).unwrap()
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_project_defaults_sit_beneath_projects() {
        let org = yaml(
            r#"
project_defaults:
  owners_group: owners@example.com
  enabled_apis: [bigquery-json.googleapis.com]
projects:
  - project_id: hipaa-data
    enabled_apis: [storage-api.googleapis.com]
audit_logs_project:
  project_id: hipaa-audit
  owners_group: audit-owners@example.com
"#,
        );
        let merged = engine().apply_project_defaults(&org);

        let project = &merged.get("projects").and_then(ValueTree::as_sequence).unwrap()[0];
        assert_eq!(project.str_at("owners_group"), Some("owners@example.com"));
        assert_eq!(
            project.get("enabled_apis"),
            Some(&yaml("[storage-api.googleapis.com]"))
        );
        assert_eq!(
            merged.str_at("audit_logs_project.owners_group"),
            Some("audit-owners@example.com")
        );
    }

    #[test]
    fn test_resource_errors_are_located() {
        let org = yaml(
            r#"
overall:
  organization_id: "433637338589"
  billing_account: 01AB23-45CD67-89EF01
  domain: example.com
projects:
  - project_id: hipaa-data
    owners_group: owners@example.com
    auditors_group: auditors@example.com
    resources:
      network:
        - name: private-net
          colour: blue
"#,
        );
        let diagnostics = engine().validate(&org).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].project, "hipaa-data");
        assert_eq!(diagnostics[0].path, "resources.network[0].colour");
        assert!(diagnostics[0].message.starts_with("UnknownField"));
    }

    #[test]
    fn test_record_path_is_relative_to_root() {
        let org = yaml("generated_fields_path: state/fields.yaml\n");
        assert_eq!(
            record_path(Path::new("/etc/rampart/org.yaml"), &org),
            PathBuf::from("/etc/rampart/state/fields.yaml")
        );
        assert_eq!(
            record_path(Path::new("/etc/rampart/org.yaml"), &yaml("{}")),
            PathBuf::from("/etc/rampart/generated_fields.yaml")
        );
    }

    #[test]
    fn test_extra_schema_dir() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("firewall.schema.yaml"),
            "additionalProperties: false\nproperties:\n  name:\n    type: string\n",
        )
        .unwrap();

        let engine = Engine::new(EngineConfig::default().with_schema_dir(temp.path())).unwrap();
        assert!(engine.registry().get("firewall").is_some());
        assert!(engine.registry().get("network").is_some());
    }
}
