//! Deployment Manager rendering.
//!
//! Each unit becomes a `deployment.yaml` with a flat `resources` list.
//! Cross-resource links use the `$(ref.<name>.<field>)` syntax.

use rampart_spec::{DocumentWriter, Mapping, ValueTree};
use tracing::debug;

use crate::emitter::{ResourceKind, ResourceSpec, UnitPlan, UnitRenderer};
use crate::error::IacResult;

/// Renders units as Deployment Manager configuration.
pub struct DeploymentManagerRenderer;

impl UnitRenderer for DeploymentManagerRenderer {
    fn render(&self, unit: &UnitPlan) -> IacResult<ValueTree> {
        let mut resources = Vec::new();
        for spec in &unit.resources {
            resources.extend(self.resources(spec, unit));
        }

        if unit.overrides.is_some() {
            debug!(
                "Unit '{}': terraform_deployments overrides only apply to terraform output",
                unit.name
            );
        }

        let mut root = Mapping::new();
        root.insert("resources".to_string(), ValueTree::Sequence(resources));
        Ok(ValueTree::Mapping(root))
    }

    fn to_text(&self, content: &ValueTree) -> IacResult<String> {
        Ok(DocumentWriter::to_yaml_string(content)?)
    }
}

impl DeploymentManagerRenderer {
    fn resources(&self, spec: &ResourceSpec, unit: &UnitPlan) -> Vec<ValueTree> {
        let props = &spec.properties;
        let name = spec.name.as_str();

        match spec.kind {
            ResourceKind::OrganizationAuditConfig => {
                debug!("Organization audit config is not rendered for Deployment Manager");
                Vec::new()
            }
            ResourceKind::Project => {
                let parent = match props.get("folder_id") {
                    Some(folder) => Some(pairs([
                        ("type", ValueTree::from("folder")),
                        ("id", folder.clone()),
                    ])),
                    None => unit.organization_id.as_deref().map(|id| {
                        pairs([
                            ("type", ValueTree::from("organization")),
                            ("id", ValueTree::from(id)),
                        ])
                    }),
                };
                let mut properties = vec![
                    ("name", ValueTree::from(name)),
                    ("projectId", ValueTree::from(spec.project_id.as_str())),
                ];
                if let Some(parent) = parent {
                    properties.push(("parent", parent));
                }
                vec![resource(name, "cloudresourcemanager.v1.project", pairs(properties))]
            }
            ResourceKind::AuditDataset | ResourceKind::Dataset => {
                let mut properties = vec![(
                    "datasetReference",
                    pairs([
                        ("datasetId", ValueTree::from(name)),
                        ("projectId", ValueTree::from(spec.project_id.as_str())),
                    ]),
                )];
                if let Some(location) = props.get("location") {
                    properties.push(("location", location.clone()));
                }
                vec![resource(name, "bigquery.v2.dataset", pairs(properties))]
            }
            ResourceKind::AuditLogSink => vec![resource(
                name,
                "logging.v2.sink",
                pairs([
                    ("sink", ValueTree::from(name)),
                    (
                        "destination",
                        props.get("destination").cloned().unwrap_or_default(),
                    ),
                    ("uniqueWriterIdentity", ValueTree::Bool(true)),
                ]),
            )],
            ResourceKind::StateBucket | ResourceKind::Bucket => {
                let mut properties = vec![
                    ("name", ValueTree::from(name)),
                    ("project", ValueTree::from(spec.project_id.as_str())),
                ];
                if let Some(location) = props.get("location") {
                    properties.push(("location", location.clone()));
                }
                if let Some(class) = props.get("storage_class") {
                    properties.push(("storageClass", class.clone()));
                }
                let versioning = props.get("versioning").cloned().unwrap_or(ValueTree::Bool(true));
                properties.push(("versioning", pairs([("enabled", versioning)])));
                vec![resource(name, "storage.v1.bucket", pairs(properties))]
            }
            ResourceKind::Network => {
                let mut properties = vec![
                    ("name", ValueTree::from(name)),
                    (
                        "autoCreateSubnetworks",
                        props
                            .get("autoCreateSubnetworks")
                            .cloned()
                            .unwrap_or(ValueTree::Bool(false)),
                    ),
                ];
                if let Some(mode) = props.get("routingMode") {
                    properties.push(("routingConfig", pairs([("routingMode", mode.clone())])));
                }

                let mut out = vec![resource(name, "compute.v1.network", pairs(properties))];
                let self_link = format!("$(ref.{}.selfLink)", name);
                for subnet in props
                    .get("subnetworks")
                    .and_then(ValueTree::as_sequence)
                    .unwrap_or_default()
                {
                    let Some(subnet_name) = subnet.str_at("name") else {
                        continue;
                    };
                    let mut properties = vec![
                        ("name", ValueTree::from(subnet_name)),
                        ("network", ValueTree::from(self_link.as_str())),
                    ];
                    for (from, to) in [
                        ("region", "region"),
                        ("ip_cidr_range", "ipCidrRange"),
                        ("private_ip_google_access", "privateIpGoogleAccess"),
                    ] {
                        if let Some(value) = subnet.get(from) {
                            properties.push((to, value.clone()));
                        }
                    }
                    out.push(resource(subnet_name, "compute.v1.subnetwork", pairs(properties)));
                }
                out
            }
        }
    }
}

fn resource(name: &str, resource_type: &str, properties: ValueTree) -> ValueTree {
    pairs([
        ("name", ValueTree::from(name)),
        ("type", ValueTree::from(resource_type)),
        ("properties", properties),
    ])
}

fn pairs<'a>(items: impl IntoIterator<Item = (&'a str, ValueTree)>) -> ValueTree {
    ValueTree::Mapping(items.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}
