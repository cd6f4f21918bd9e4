//! Integration tests for generated fields, emission and runner hand-off.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use mockall::mock;
use rampart_iac::{
    hand_off, ApplyPlan, ArtifactEmitter, DeploymentRunner, GeneratedFieldsStore, IacResult,
    OutputFormat, PlannedUnit, RunnerStatus, APPLY_PLAN_FILE,
};
use rampart_spec::ValueTree;
use tempfile::tempdir;

mock! {
    pub Runner {}

    #[async_trait]
    impl DeploymentRunner for Runner {
        async fn apply(&self, artifacts_dir: &Path, unit: &PlannedUnit) -> IacResult<RunnerStatus>;
    }
}

const ORG: &str = r#"
overall:
  organization_id: "433637338589"
  billing_account: 01AB23-45CD67-89EF01
  domain: example.com
devops:
  project:
    project_id: hipaa-devops
    devops:
      state_storage_bucket:
        name: hipaa-devops-state
        location: US
projects:
  - project_id: hipaa-data
    audit:
      logs_bigquery_dataset:
        dataset_id: hipaa_data
        location: US
    devops:
      state_storage_bucket:
        location: US
  - project_id: hipaa-web
    audit:
      logs_bigquery_dataset:
        dataset_id: hipaa_web
        location: US
"#;

fn org() -> ValueTree {
    serde_yaml::from_str(ORG).unwrap()
}

fn run_once(record: &Path, output: &Path) -> ApplyPlan {
    let mut store = GeneratedFieldsStore::load(record).unwrap();
    let filled = store.apply_to_organization(&org()).unwrap();
    let emitter = ArtifactEmitter::new(OutputFormat::Terraform);
    let units = emitter.build_units(&filled).unwrap();
    let plan = emitter.write(&units, output).unwrap();
    store.persist().unwrap();
    plan
}

#[test]
fn test_generated_fields_stable_across_runs() {
    let temp = tempdir().unwrap();
    let record = temp.path().join("generated_fields.yaml");
    let output = temp.path().join("out");

    run_once(&record, &output);
    let first_record = fs::read(&record).unwrap();
    let first_unit = fs::read(output.join("hipaa-data").join("main.tf.json")).unwrap();

    run_once(&record, &output);
    assert_eq!(fs::read(&record).unwrap(), first_record);
    assert_eq!(
        fs::read(output.join("hipaa-data").join("main.tf.json")).unwrap(),
        first_unit
    );
}

#[test]
fn test_user_bucket_name_is_not_recorded() {
    let temp = tempdir().unwrap();
    let record = temp.path().join("generated_fields.yaml");
    run_once(&record, &temp.path().join("out"));

    let store = GeneratedFieldsStore::load(&record).unwrap();
    assert!(store.get("hipaa-devops", "state_storage_bucket").is_none());
    let generated = store.get("hipaa-data", "state_storage_bucket").unwrap();
    assert!(generated.as_str().unwrap().starts_with("hipaa-data-state-"));
}

#[test]
fn test_emit_writes_plan_in_order() {
    let temp = tempdir().unwrap();
    let output = temp.path().join("out");
    let plan = run_once(&temp.path().join("generated_fields.yaml"), &output);

    let names: Vec<_> = plan.sequence.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["organization", "hipaa-devops", "hipaa-data", "hipaa-web"]);

    let loaded = ApplyPlan::load(output.join(APPLY_PLAN_FILE)).unwrap();
    assert_eq!(loaded, plan);
    for unit in &plan.sequence {
        assert!(output.join(&unit.file).is_file(), "missing {:?}", unit.file);
    }

    let content = fs::read_to_string(output.join("hipaa-web").join("main.tf.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(
        json["resource"]["google_logging_project_sink"]["audit-logs-to-bigquery"]["destination"],
        "bigquery.googleapis.com/projects/hipaa-web/datasets/hipaa_web"
    );
}

#[test]
fn test_emit_deployment_manager() {
    let temp = tempdir().unwrap();
    let output = temp.path().join("dm");
    let emitter = ArtifactEmitter::new(OutputFormat::DeploymentManager);
    let units = emitter.build_units(&org()).unwrap();
    emitter.write(&units, &output).unwrap();

    let content = fs::read_to_string(output.join("hipaa-data").join("deployment.yaml")).unwrap();
    assert!(content.contains("bigquery.v2.dataset"));
    assert!(content.contains("logging.v2.sink"));
}

#[tokio::test]
async fn test_hand_off_stops_on_failure() {
    let temp = tempdir().unwrap();
    let plan = run_once(
        &temp.path().join("generated_fields.yaml"),
        &temp.path().join("out"),
    );

    let mut runner = MockRunner::new();
    runner
        .expect_apply()
        .times(3)
        .returning(|_, unit| {
            if unit.name == "hipaa-data" {
                Ok(RunnerStatus::failure(&unit.name, "permission denied"))
            } else {
                Ok(RunnerStatus::success(&unit.name, "applied"))
            }
        });

    let statuses = hand_off(&runner, &plan).await.unwrap();
    let applied: Vec<_> = statuses.iter().map(|s| (s.unit.as_str(), s.succeeded)).collect();
    assert_eq!(
        applied,
        vec![
            ("organization", true),
            ("hipaa-devops", true),
            ("hipaa-data", false)
        ]
    );
}
