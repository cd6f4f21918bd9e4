//! Terraform JSON rendering.
//!
//! Each unit becomes a `main.tf.json` document. Project overrides from
//! `terraform_deployments.resources.config` are deep-merged over the
//! generated configuration, so operators can add or replace any block.

use rampart_spec::{Mapping, Merger, ValueTree};
use tracing::debug;

use crate::emitter::{ResourceKind, ResourceSpec, UnitPlan, UnitRenderer};
use crate::error::IacResult;

/// Top-level Terraform JSON keys that may be written as a list of blocks.
const BLOCK_KEYS: &[&str] = &["resource", "data", "module", "output", "variable"];

const AUDIT_LOG_TYPES: &[&str] = &["ADMIN_READ", "DATA_READ", "DATA_WRITE"];

/// Renders units as Terraform JSON configuration.
pub struct TerraformRenderer;

impl UnitRenderer for TerraformRenderer {
    fn render(&self, unit: &UnitPlan) -> IacResult<ValueTree> {
        let mut resources = Mapping::new();
        let mut backend_bucket = None;

        for spec in &unit.resources {
            for (resource_type, key, body) in self.blocks(spec, unit) {
                let entry = resources
                    .entry(resource_type.to_string())
                    .or_insert_with(ValueTree::mapping);
                if let ValueTree::Mapping(by_name) = entry {
                    by_name.insert(key, body);
                }
            }
            if spec.kind == ResourceKind::StateBucket {
                backend_bucket = Some(spec.name.clone());
            }
        }

        let mut root = Mapping::new();
        if let Some(bucket) = backend_bucket {
            root.insert(
                "terraform".to_string(),
                object([(
                    "backend",
                    object([(
                        "gcs",
                        object([
                            ("bucket", ValueTree::from(bucket)),
                            ("prefix", ValueTree::from(unit.name.as_str())),
                        ]),
                    )]),
                )]),
            );
        }
        if !resources.is_empty() {
            root.insert("resource".to_string(), ValueTree::Mapping(resources));
        }

        let rendered = ValueTree::Mapping(root);
        Ok(match &unit.overrides {
            Some(overrides) => {
                debug!("Merging terraform_deployments overrides into '{}'", unit.name);
                Merger::new().merge(&rendered, &normalize_blocks(overrides))
            }
            None => rendered,
        })
    }

    fn to_text(&self, content: &ValueTree) -> IacResult<String> {
        Ok(serde_json::to_string_pretty(content)? + "\n")
    }
}

impl TerraformRenderer {
    /// Terraform blocks for one resource: `(type, name, body)`.
    fn blocks(&self, spec: &ResourceSpec, unit: &UnitPlan) -> Vec<(&'static str, String, ValueTree)> {
        let props = &spec.properties;
        let project = ValueTree::from(spec.project_id.as_str());
        let key = resource_key(&spec.name);

        match spec.kind {
            ResourceKind::OrganizationAuditConfig => vec![(
                "google_organization_iam_audit_config",
                key,
                object([
                    ("org_id", props.get("org_id").cloned().unwrap_or_default()),
                    ("service", ValueTree::from("allServices")),
                    (
                        "audit_log_config",
                        ValueTree::Sequence(
                            AUDIT_LOG_TYPES
                                .iter()
                                .map(|t| object([("log_type", ValueTree::from(*t))]))
                                .collect(),
                        ),
                    ),
                ]),
            )],
            ResourceKind::Project => {
                let mut body = Mapping::new();
                body.insert("project_id".to_string(), project.clone());
                body.insert("name".to_string(), project.clone());
                match props.get("folder_id") {
                    Some(folder) => {
                        body.insert("folder_id".to_string(), folder.clone());
                    }
                    None => {
                        if let Some(org) = &unit.organization_id {
                            body.insert("org_id".to_string(), ValueTree::from(org.as_str()));
                        }
                    }
                }
                if let Some(billing) = &unit.billing_account {
                    body.insert(
                        "billing_account".to_string(),
                        ValueTree::from(billing.as_str()),
                    );
                }

                let mut blocks = vec![("google_project", key, ValueTree::Mapping(body))];
                for api in props
                    .get("enabled_apis")
                    .and_then(ValueTree::as_sequence)
                    .unwrap_or_default()
                {
                    if let Some(api) = api.as_str() {
                        blocks.push((
                            "google_project_service",
                            resource_key(&format!("{}-{}", spec.project_id, api)),
                            object([
                                ("project", project.clone()),
                                ("service", ValueTree::from(api)),
                            ]),
                        ));
                    }
                }
                blocks
            }
            ResourceKind::AuditDataset | ResourceKind::Dataset => {
                let mut body = vec![
                    ("project", project),
                    ("dataset_id", ValueTree::from(spec.name.as_str())),
                ];
                copy(props, &mut body, &[("location", "location"), ("description", "description")]);
                copy(
                    props,
                    &mut body,
                    &[
                        ("default_table_expiration_ms", "default_table_expiration_ms"),
                        ("labels", "labels"),
                    ],
                );
                vec![("google_bigquery_dataset", key, object(body))]
            }
            ResourceKind::AuditLogSink => vec![(
                "google_logging_project_sink",
                key,
                object([
                    ("project", project),
                    ("name", ValueTree::from(spec.name.as_str())),
                    (
                        "destination",
                        props.get("destination").cloned().unwrap_or_default(),
                    ),
                    ("unique_writer_identity", ValueTree::Bool(true)),
                ]),
            )],
            ResourceKind::StateBucket | ResourceKind::Bucket => {
                let mut body = vec![
                    ("project", project),
                    ("name", ValueTree::from(spec.name.as_str())),
                ];
                copy(props, &mut body, &[("location", "location"), ("storage_class", "storage_class")]);
                let versioning = props.get("versioning").cloned().unwrap_or(ValueTree::Bool(true));
                body.push(("versioning", object([("enabled", versioning)])));
                copy(props, &mut body, &[("labels", "labels")]);
                if let Some(days) = props.get("ttl_days") {
                    body.push((
                        "lifecycle_rule",
                        object([
                            ("action", object([("type", ValueTree::from("Delete"))])),
                            ("condition", object([("age", days.clone())])),
                        ]),
                    ));
                }
                vec![("google_storage_bucket", key, object(body))]
            }
            ResourceKind::Network => {
                let mut body = vec![
                    ("project", project.clone()),
                    ("name", ValueTree::from(spec.name.as_str())),
                    (
                        "auto_create_subnetworks",
                        props
                            .get("autoCreateSubnetworks")
                            .cloned()
                            .unwrap_or(ValueTree::Bool(false)),
                    ),
                ];
                copy(props, &mut body, &[("routingMode", "routing_mode")]);

                let mut blocks = vec![("google_compute_network", key.clone(), object(body))];
                let self_link = format!("${{google_compute_network.{}.self_link}}", key);
                for subnet in props
                    .get("subnetworks")
                    .and_then(ValueTree::as_sequence)
                    .unwrap_or_default()
                {
                    let Some(name) = subnet.str_at("name") else {
                        continue;
                    };
                    let mut body = vec![
                        ("project", project.clone()),
                        ("name", ValueTree::from(name)),
                        ("network", ValueTree::from(self_link.as_str())),
                    ];
                    copy(
                        subnet,
                        &mut body,
                        &[
                            ("region", "region"),
                            ("ip_cidr_range", "ip_cidr_range"),
                            ("private_ip_google_access", "private_ip_google_access"),
                        ],
                    );
                    blocks.push(("google_compute_subnetwork", resource_key(name), object(body)));
                }
                blocks
            }
        }
    }
}

/// Fold list-form blocks (`resource: [{type: {...}}, ...]`) into the mapping
/// form so they merge with generated blocks instead of replacing them.
pub fn normalize_blocks(config: &ValueTree) -> ValueTree {
    let ValueTree::Mapping(map) = config else {
        return config.clone();
    };

    let merger = Merger::new();
    let mut out = Mapping::with_capacity(map.len());
    for (key, value) in map {
        let value = match value {
            ValueTree::Sequence(items) if BLOCK_KEYS.contains(&key.as_str()) => {
                merger.merge_all(items.iter())
            }
            other => other.clone(),
        };
        out.insert(key.clone(), value);
    }
    ValueTree::Mapping(out)
}

/// Terraform block names may only use letters, digits, `_` and `-` and must
/// not start with a digit.
pub fn resource_key(name: &str) -> String {
    let mut key: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if key.chars().next().map_or(true, |c| c.is_ascii_digit() || c == '-') {
        key.insert(0, '_');
    }
    key
}

fn object<'a>(pairs: impl IntoIterator<Item = (&'a str, ValueTree)>) -> ValueTree {
    ValueTree::Mapping(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn copy<'a>(
    props: &ValueTree,
    body: &mut Vec<(&'a str, ValueTree)>,
    fields: &[(&str, &'a str)],
) {
    for (from, to) in fields {
        if let Some(value) = props.get(from).filter(|v| !v.is_null()) {
            body.push((*to, value.clone()));
        }
    }
}
