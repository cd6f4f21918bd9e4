//! End-to-end tests for the configuration pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rampart_core::{CoreError, Engine, EngineConfig};
use rampart_iac::{DeploymentRunner, IacResult, OutputFormat, PlannedUnit, RunnerStatus};
use rampart_policy::PolicyError;
use tempfile::{tempdir, TempDir};

const OVERALL: &str = r#"
overall:
  organization_id: "433637338589"
  billing_account: 01AB23-45CD67-89EF01
  domain: example.com
"#;

fn project(id: &str, dataset: &str) -> String {
    format!(
        r#"
  - project_id: {id}
    owners_group: {id}-owners@example.com
    auditors_group: {id}-auditors@example.com
    audit:
      logs_bigquery_dataset:
        dataset_id: {dataset}
        location: US
    devops:
      state_storage_bucket:
        location: US
"#
    )
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(body: &str) -> Self {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("org.yaml"), format!("{}{}", OVERALL, body)).unwrap();
        Self { dir }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("org.yaml")
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn record(&self) -> PathBuf {
        self.dir.path().join("generated_fields.yaml")
    }

    fn engine(&self) -> Engine {
        Engine::new(EngineConfig::default().with_output_dir(self.output())).unwrap()
    }
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

#[test]
fn test_underscored_dataset_passes() {
    let fixture = Fixture::new(&format!("projects:{}", project("hipaa-example", "hipaa_example")));
    let report = fixture.engine().run(&fixture.root()).unwrap();

    assert_eq!(report.projects, vec!["hipaa-example"]);
    assert!(report.warnings.is_empty());
    assert!(fixture.output().join("hipaa-example").join("main.tf.json").is_file());
    assert!(fixture.record().is_file());
}

#[test]
fn test_hyphenated_dataset_is_a_violation() {
    let fixture = Fixture::new(&format!("projects:{}", project("hipaa-example", "hipaa-example")));
    let err = fixture.engine().run(&fixture.root()).unwrap_err();

    let violations = match err {
        CoreError::PolicyViolations(violations) => violations,
        other => panic!("expected policy violations, got {other}"),
    };
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule_id, "dataset-naming");
    assert_eq!(violations[0].suggestion.as_deref(), Some("hipaa_example"));
    assert!(!fixture.output().exists());
    assert!(!fixture.record().exists());
}

#[test]
fn test_dataset_must_match_project_id() {
    let fixture = Fixture::new(&format!("projects:{}", project("hipaa-example", "unrelated_logs")));
    let err = fixture.engine().run(&fixture.root()).unwrap_err();

    let violations = match err {
        CoreError::PolicyViolations(violations) => violations,
        other => panic!("expected policy violations, got {other}"),
    };
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule_id, "dataset-naming");
    assert_eq!(violations[0].path, "audit.logs_bigquery_dataset.dataset_id");
    assert_eq!(violations[0].suggestion.as_deref(), Some("hipaa_example"));
    assert!(!fixture.output().exists());
    assert!(!fixture.record().exists());
}

#[test]
fn test_mandatory_rules_cannot_be_disabled() {
    for id in ["required-sections", "required-groups", "dataset-naming", "unique-project-ids"] {
        let result = Engine::new(EngineConfig::default().with_disabled_rule(id));
        match result {
            Err(CoreError::Policy(PolicyError::MandatoryRule(rule))) => assert_eq!(rule, id),
            Err(other) => panic!("expected a mandatory rule error, got {other}"),
            Ok(_) => panic!("'{id}' was disabled"),
        }
    }

    let engine = Engine::new(EngineConfig::default().with_disabled_rule("locations-set")).unwrap();
    assert_eq!(engine.config().disabled_rules, vec!["locations-set"]);
}

#[test]
fn test_private_forseti_without_nat_warns_and_emits() {
    let forseti = r#"
forseti:
  project:
    project_id: hipaa-forseti
    owners_group: forseti-owners@example.com
    auditors_group: forseti-auditors@example.com
    audit:
      logs_bigquery_dataset:
        dataset_id: hipaa_forseti
        location: US
    devops:
      state_storage_bucket:
        location: US
  properties:
    server_private: true
"#;
    let fixture = Fixture::new(&format!(
        "{}projects:{}",
        forseti,
        project("hipaa-data", "hipaa_data")
    ));
    let report = fixture.engine().run(&fixture.root()).unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].rule_id, "private-instance-nat");
    assert_eq!(report.warnings[0].project, "hipaa-forseti");

    let plan = report.apply_plan.unwrap();
    let names: Vec<_> = plan.sequence.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["organization", "hipaa-forseti", "hipaa-data"]);
    assert!(fixture.output().join("hipaa-forseti").join("main.tf.json").is_file());
}

#[test]
fn test_private_forseti_with_nat_override_is_clean() {
    let forseti = r#"
forseti:
  project:
    project_id: hipaa-forseti
    owners_group: forseti-owners@example.com
    auditors_group: forseti-auditors@example.com
    audit:
      logs_bigquery_dataset:
        dataset_id: hipaa_forseti
        location: US
    devops:
      state_storage_bucket:
        location: US
    terraform_deployments:
      resources:
        config:
          resource:
            - google_compute_router:
                forseti-router:
                  name: forseti-router
                  network: default
            - google_compute_router_nat:
                forseti-nat:
                  router: "${google_compute_router.forseti-router.name}"
  properties:
    server_private: true
projects: []
"#;
    let fixture = Fixture::new(forseti);
    let report = fixture.engine().run(&fixture.root()).unwrap();
    assert!(report.warnings.is_empty());

    let unit = fs::read_to_string(fixture.output().join("hipaa-forseti").join("main.tf.json"))
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&unit).unwrap();
    assert_eq!(
        json["resource"]["google_compute_router_nat"]["forseti-nat"]["router"],
        "${google_compute_router.forseti-router.name}"
    );
    assert!(json["resource"]["google_project"]["hipaa-forseti"].is_object());
}

#[test]
fn test_duplicate_project_ids_write_nothing() {
    let fixture = Fixture::new(&format!(
        "projects:{}{}",
        project("hipaa-data", "hipaa_data"),
        project("hipaa-data", "hipaa_data_copy")
    ));
    let err = fixture.engine().run(&fixture.root()).unwrap_err();

    let violations = match err {
        CoreError::PolicyViolations(violations) => violations,
        other => panic!("expected policy violations, got {other}"),
    };
    assert!(violations.iter().any(|v| v.rule_id == "unique-project-ids"));
    assert!(!fixture.output().exists());
    assert!(!fixture.record().exists());
}

#[test]
fn test_generated_record_is_stable() {
    let fixture = Fixture::new(&format!(
        "projects:{}{}",
        project("hipaa-data", "hipaa_data"),
        project("hipaa-web", "hipaa_web")
    ));
    let engine = fixture.engine();

    engine.run(&fixture.root()).unwrap();
    let record = read(&fixture.record());
    let unit = read(&fixture.output().join("hipaa-web").join("main.tf.json"));

    engine.run(&fixture.root()).unwrap();
    assert_eq!(read(&fixture.record()), record);
    assert_eq!(read(&fixture.output().join("hipaa-web").join("main.tf.json")), unit);

    let text = String::from_utf8(record).unwrap();
    assert!(text.contains("hipaa-web-state-"));
    assert!(text.contains("audit-logs-to-bigquery"));
}

#[test]
fn test_unwritable_record_leaves_previous_artifacts() {
    let fixture = Fixture::new(&format!(
        "generated_fields_path: state/fields.yaml\nprojects:{}",
        project("hipaa-data", "hipaa_data")
    ));
    fs::write(fixture.dir.path().join("state"), "not a directory").unwrap();
    fs::create_dir_all(fixture.output().join("previous")).unwrap();
    fs::write(fixture.output().join("previous").join("main.tf.json"), "{}").unwrap();

    let err = fixture.engine().run(&fixture.root()).unwrap_err();
    assert!(matches!(err, CoreError::Iac(_) | CoreError::Spec(_) | CoreError::Io(_)));

    assert!(fixture.output().join("previous").join("main.tf.json").is_file());
    assert!(!fixture.output().join("hipaa-data").exists());
    let entries: Vec<_> = fs::read_dir(fixture.dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries.len(), 3, "{entries:?}");
}

#[test]
fn test_unwritable_record_on_first_run_writes_nothing() {
    let fixture = Fixture::new(&format!(
        "generated_fields_path: state/fields.yaml\nprojects:{}",
        project("hipaa-data", "hipaa_data")
    ));
    fs::write(fixture.dir.path().join("state"), "not a directory").unwrap();

    assert!(fixture.engine().run(&fixture.root()).is_err());
    assert!(!fixture.output().exists());
}

#[test]
fn test_unknown_network_field_fails_validation() {
    let fixture = Fixture::new(&format!(
        "projects:{}    resources:\n      network:\n        - name: private-net\n          mtu: 1460\n",
        project("hipaa-data", "hipaa_data")
    ));
    let err = fixture.engine().run(&fixture.root()).unwrap_err();

    let diagnostics = match err {
        CoreError::Validation(diagnostics) => diagnostics,
        other => panic!("expected validation errors, got {other}"),
    };
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].project, "hipaa-data");
    assert_eq!(diagnostics[0].path, "resources.network[0].mtu");
    assert!(diagnostics[0].message.contains("UnknownField"));
    assert!(!fixture.output().exists());
}

#[test]
fn test_validation_errors_are_collected_across_projects() {
    let fixture = Fixture::new(
        "projects:\n  - project_id: hipaa-data\n  - project_id: hipaa-web\n    owners_group: owners@example.com\n",
    );
    let err = fixture.engine().check(&fixture.root()).unwrap_err();

    let diagnostics = match err {
        CoreError::Validation(diagnostics) => diagnostics,
        other => panic!("expected validation errors, got {other}"),
    };
    let projects: Vec<_> = diagnostics.iter().map(|d| d.project.as_str()).collect();
    assert!(projects.contains(&"hipaa-data"));
    assert!(projects.contains(&"hipaa-web"));
    assert!(diagnostics.iter().all(|d| d.message.starts_with("MissingRequiredField")));
}

#[test]
fn test_imports_and_templates_feed_the_run() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("base.yaml"), OVERALL).unwrap();
    fs::write(
        dir.path().join("defaults.tmpl.yaml"),
        r#"
project_defaults:
  owners_group: "{{OWNERS}}"
  auditors_group: "{{ .AUDITORS }}"
  devops:
    state_storage_bucket:
      location: "{{LOCATION}}"
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("org.yaml"),
        r#"
imports:
  - base.yaml
  - path: defaults.tmpl.yaml
    data:
      OWNERS: owners@example.com
      AUDITORS: auditors@example.com
      LOCATION: EU
projects:
  - project_id: hipaa-data
    audit:
      logs_bigquery_dataset:
        dataset_id: hipaa_data
        location: EU
"#,
    )
    .unwrap();

    let output = dir.path().join("dm");
    let engine = Engine::new(
        EngineConfig::default()
            .with_output_dir(&output)
            .with_format(OutputFormat::DeploymentManager),
    )
    .unwrap();
    engine.run(&dir.path().join("org.yaml")).unwrap();

    let unit = fs::read_to_string(output.join("hipaa-data").join("deployment.yaml")).unwrap();
    assert!(unit.contains("storage.v1.bucket"));
    assert!(unit.contains("location: EU"));
}

#[test]
fn test_check_writes_nothing() {
    let fixture = Fixture::new(&format!("projects:{}", project("hipaa-data", "hipaa_data")));
    let report = fixture.engine().check(&fixture.root()).unwrap();

    assert_eq!(report.projects, vec!["hipaa-data"]);
    assert!(report.apply_plan.is_none());
    assert!(!fixture.output().exists());
    assert!(!fixture.record().exists());
}

const AUDIT_LOGS_PROJECT: &str = r#"
audit_logs_project:
  project_id: hipaa-audit
  owners_group: audit-owners@example.com
  auditors_group: audit-auditors@example.com
  audit:
    logs_bigquery_dataset:
      dataset_id: hipaa_audit
      location: US
  devops:
    state_storage_bucket:
      location: US
"#;

struct RecordingRunner {
    applied: Mutex<Vec<String>>,
}

#[async_trait]
impl DeploymentRunner for RecordingRunner {
    async fn apply(&self, artifacts_dir: &Path, unit: &PlannedUnit) -> IacResult<RunnerStatus> {
        assert!(artifacts_dir.join(&unit.file).is_file());
        self.applied.lock().unwrap().push(unit.name.clone());
        Ok(RunnerStatus::success(&unit.name, "applied"))
    }
}

#[tokio::test]
async fn test_hand_off_applies_in_emission_order() {
    let fixture = Fixture::new(&format!(
        "{}projects:{}",
        AUDIT_LOGS_PROJECT,
        project("hipaa-data", "hipaa_data")
    ));
    let engine = fixture.engine();
    let report = engine.run(&fixture.root()).unwrap();
    let plan = report.apply_plan.unwrap();

    let runner = RecordingRunner {
        applied: Mutex::new(Vec::new()),
    };
    let statuses = engine.hand_off(&runner, &plan).await.unwrap();

    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|s| s.succeeded));
    assert_eq!(
        *runner.applied.lock().unwrap(),
        vec!["organization", "hipaa-audit", "hipaa-data"]
    );
}
