//! Integration tests for import resolution and templates.

use std::fs;
use std::path::Path;

use rampart_spec::{MergeOptions, SpecError, ValueTree};
use rampart_templates::{ImportResolver, TemplateError};
use tempfile::tempdir;

const NAT_TEMPLATE: &str = r#"
terraform_deployments:
  resources:
    config:
      resource:
        - google_compute_router:
            "{{ROUTER}}":
              name: "{{ROUTER}}"
              network: "{{NETWORK}}"
              region: "{{REGION}}"
        - google_compute_router_nat:
            "{{ROUTER}}-nat":
              router: ${google_compute_router.{{ROUTER}}.name}
              region: "{{REGION}}"
"#;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn nat_root(data: &str) -> String {
    format!(
        "imports:\n  - path: templates/nat.yaml\n    data:\n{}\nproject_id: hipaa-forseti\n",
        data
    )
}

/// A template whose data supplies exactly its placeholders resolves.
#[test]
fn test_template_with_exact_data() {
    let temp = tempdir().unwrap();
    write(temp.path(), "templates/nat.yaml", NAT_TEMPLATE);
    write(
        temp.path(),
        "forseti.yaml",
        &nat_root("      ROUTER: forseti-router\n      NETWORK: private\n      REGION: us-central1"),
    );

    let tree = ImportResolver::new()
        .resolve(temp.path().join("forseti.yaml"))
        .unwrap();

    let resources = tree
        .get_path("terraform_deployments.resources.config.resource")
        .and_then(ValueTree::as_sequence)
        .unwrap();
    assert_eq!(
        resources[0].str_at("google_compute_router.forseti-router.network"),
        Some("private")
    );
    let nat = resources[1]
        .get("google_compute_router_nat")
        .and_then(|n| n.get("forseti-router-nat"))
        .unwrap();
    assert_eq!(
        nat.str_at("router"),
        Some("${google_compute_router.forseti-router.name}")
    );
    assert_eq!(tree.str_at("project_id"), Some("hipaa-forseti"));
}

/// Removing a required data key is an unresolved placeholder.
#[test]
fn test_missing_data_key() {
    let temp = tempdir().unwrap();
    write(temp.path(), "templates/nat.yaml", NAT_TEMPLATE);
    write(
        temp.path(),
        "forseti.yaml",
        &nat_root("      ROUTER: forseti-router\n      NETWORK: private"),
    );

    let err = ImportResolver::new()
        .resolve(temp.path().join("forseti.yaml"))
        .unwrap_err();
    assert!(matches!(
        err,
        TemplateError::UnresolvedPlaceholder { ref token, .. } if token == "REGION"
    ));
}

/// An extra data key is an unused parameter.
#[test]
fn test_extra_data_key() {
    let temp = tempdir().unwrap();
    write(temp.path(), "templates/nat.yaml", NAT_TEMPLATE);
    write(
        temp.path(),
        "forseti.yaml",
        &nat_root(
            "      ROUTER: forseti-router\n      NETWORK: private\n      REGION: us-central1\n      ZONE: us-central1-a",
        ),
    );

    let err = ImportResolver::new()
        .resolve(temp.path().join("forseti.yaml"))
        .unwrap_err();
    assert!(matches!(err, TemplateError::UnusedParameter { ref key, .. } if key == "ZONE"));
}

/// Nested imports resolve relative to the importing document.
#[test]
fn test_nested_relative_imports() {
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        "shared/defaults.yaml",
        "imports: [apis.yaml]\nproject_defaults:\n  owners_group: owners@example.com\n",
    );
    write(
        temp.path(),
        "shared/apis.yaml",
        "overall:\n  allowed_apis: [compute.googleapis.com]\n",
    );
    write(
        temp.path(),
        "org.yaml",
        "imports: [shared/defaults.yaml]\noverall:\n  domain: example.com\n  allowed_apis: [bigquery.googleapis.com]\n",
    );

    let tree = ImportResolver::new()
        .resolve(temp.path().join("org.yaml"))
        .unwrap();
    assert_eq!(tree.str_at("overall.domain"), Some("example.com"));
    assert_eq!(
        tree.str_at("project_defaults.owners_group"),
        Some("owners@example.com")
    );
    assert_eq!(
        tree.get_path("overall.allowed_apis")
            .and_then(ValueTree::as_sequence)
            .map(|s| s.len()),
        Some(1)
    );

    let additive = ImportResolver::with_merge_options(
        MergeOptions::new().with_additive_field("overall.allowed_apis"),
    );
    let tree = additive.resolve(temp.path().join("org.yaml")).unwrap();
    assert_eq!(
        tree.get_path("overall.allowed_apis")
            .and_then(ValueTree::as_sequence)
            .map(|s| s.len()),
        Some(2)
    );
}

/// Two documents importing each other form a cycle.
#[test]
fn test_import_cycle() {
    let temp = tempdir().unwrap();
    write(temp.path(), "a.yaml", "imports: [b.yaml]\n");
    write(temp.path(), "b.yaml", "imports: [a.yaml]\n");

    let err = ImportResolver::new()
        .resolve(temp.path().join("a.yaml"))
        .unwrap_err();
    match err {
        TemplateError::ImportCycle { chain } => {
            assert!(chain.contains("a.yaml"));
            assert!(chain.contains("b.yaml"));
        }
        other => panic!("expected ImportCycle, got {:?}", other),
    }
}

/// The same file imported twice is not a cycle.
#[test]
fn test_diamond_imports() {
    let temp = tempdir().unwrap();
    write(temp.path(), "common.yaml", "location: US\n");
    write(temp.path(), "left.yaml", "imports: [common.yaml]\nleft: true\n");
    write(temp.path(), "right.yaml", "imports: [common.yaml]\nright: true\n");
    write(temp.path(), "root.yaml", "imports: [left.yaml, right.yaml]\n");

    let tree = ImportResolver::new()
        .resolve(temp.path().join("root.yaml"))
        .unwrap();
    assert_eq!(tree.str_at("location"), Some("US"));
    assert_eq!(tree.get("left"), Some(&ValueTree::Bool(true)));
    assert_eq!(tree.get("right"), Some(&ValueTree::Bool(true)));
}

/// Missing and non-mapping imports fail.
#[test]
fn test_missing_and_non_mapping_imports() {
    let temp = tempdir().unwrap();
    write(temp.path(), "root.yaml", "imports: [absent.yaml]\n");
    assert!(matches!(
        ImportResolver::new().resolve(temp.path().join("root.yaml")),
        Err(TemplateError::Spec(SpecError::NotFound(_)))
    ));

    write(temp.path(), "list.yaml", "- a\n");
    write(temp.path(), "root.yaml", "imports: [list.yaml]\n");
    assert!(matches!(
        ImportResolver::new().resolve(temp.path().join("root.yaml")),
        Err(TemplateError::Spec(SpecError::NotAMapping(_)))
    ));
}
