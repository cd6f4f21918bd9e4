//! Policy enforcement engine.
//!
//! Runs every enabled rule of a [`RuleSet`] against a resolved organization
//! tree and collects all findings. Nothing stops at the first failure, so
//! operators can fix every issue in one pass.

use std::collections::HashMap;
use std::fmt;

use rampart_spec::{project_entries, ProjectEntry, ValueTree};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::rules::{PolicyRule, RuleSet, RuleSeverity, RuleType};

/// Label used for findings that are not tied to a project.
pub const ORGANIZATION_SCOPE: &str = "organization";

const NAT_RESOURCE_TYPES: &[&str] = &["google_compute_router_nat", "google_compute_router"];
const PRIVATE_FLAGS: &[&str] = &["server_private", "client_private"];

/// A single policy finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub rule_id: String,
    pub severity: RuleSeverity,
    /// Project id (or document location) the finding belongs to.
    pub project: String,
    /// Dotted path inside the project or organization document.
    pub path: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl PolicyViolation {
    fn new(
        rule: &PolicyRule,
        project: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule.id.clone(),
            severity: rule.severity,
            project: project.into(),
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity.blocks()
    }
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}: {}",
            self.severity, self.rule_id, self.project, self.path, self.message
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (suggested: {})", suggestion)?;
        }
        Ok(())
    }
}

/// Result of enforcing a rule set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyReport {
    pub rule_set: String,
    pub findings: Vec<PolicyViolation>,
}

impl PolicyReport {
    pub fn new(rule_set: impl Into<String>) -> Self {
        Self {
            rule_set: rule_set.into(),
            findings: Vec::new(),
        }
    }

    pub fn add(&mut self, finding: PolicyViolation) {
        self.findings.push(finding);
    }

    /// Hard violations.
    pub fn violations(&self) -> Vec<&PolicyViolation> {
        self.findings.iter().filter(|f| f.is_blocking()).collect()
    }

    /// Soft warnings.
    pub fn warnings(&self) -> Vec<&PolicyViolation> {
        self.findings.iter().filter(|f| !f.is_blocking()).collect()
    }

    /// True when no hard violation was found.
    pub fn passed(&self) -> bool {
        self.findings.iter().all(|f| !f.is_blocking())
    }

    /// Human-readable report.
    pub fn report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("Policy: {}\n", self.rule_set));
        report.push_str(&format!(
            "Status: {}\n",
            if self.passed() { "PASSED" } else { "FAILED" }
        ));

        let violations = self.violations();
        if !violations.is_empty() {
            report.push_str("\nViolations:\n");
            for violation in violations {
                report.push_str(&format!("  {}\n", violation));
            }
        }

        let warnings = self.warnings();
        if !warnings.is_empty() {
            report.push_str("\nWarnings:\n");
            for warning in warnings {
                report.push_str(&format!("  {}\n", warning));
            }
        }

        report
    }
}

/// Checks organization-wide and per-project invariants.
pub struct PolicyEnforcer {
    rules: RuleSet,
    billing_pattern: Regex,
}

impl Default for PolicyEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEnforcer {
    /// Create an enforcer with the standard rule set.
    pub fn new() -> Self {
        Self::with_rules(RuleSet::standard())
    }

    pub fn with_rules(rules: RuleSet) -> Self {
        Self {
            rules,
            billing_pattern: Regex::new(r"^[0-9A-F]{6}-[0-9A-F]{6}-[0-9A-F]{6}$")
                .expect("billing account pattern is valid"),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Enforce every enabled rule against a resolved organization tree.
    pub fn enforce(&self, organization: &ValueTree) -> PolicyReport {
        let mut report = PolicyReport::new(&self.rules.name);
        let entries = project_entries(organization);

        info!(
            "Enforcing {} policy rule(s) on {} project(s)",
            self.rules.enabled().count(),
            entries.len()
        );

        for rule in self.rules.enabled() {
            let before = report.findings.len();
            match rule.rule_type {
                RuleType::RequiredSections => {
                    for entry in &entries {
                        self.check_required_sections(rule, entry, &mut report);
                    }
                }
                RuleType::RequiredGroups => {
                    for entry in &entries {
                        self.check_required_groups(rule, entry, &mut report);
                    }
                }
                RuleType::DatasetNaming => {
                    for entry in &entries {
                        self.check_dataset_naming(rule, entry, &mut report);
                    }
                }
                RuleType::UniqueProjectIds => {
                    self.check_unique_ids(rule, &entries, &mut report);
                }
                RuleType::PrivateInstanceNat => {
                    for entry in &entries {
                        self.check_private_nat(rule, entry, organization, &mut report);
                    }
                }
                RuleType::BillingAccountFormat => {
                    self.check_billing_accounts(rule, organization, &entries, &mut report);
                }
                RuleType::OrganizationIdFormat => {
                    self.check_organization_id(rule, organization, &mut report);
                }
                RuleType::LocationsSet => {
                    for entry in &entries {
                        self.check_locations(rule, entry, &mut report);
                    }
                }
            }
            debug!(
                "Rule '{}' produced {} finding(s)",
                rule.id,
                report.findings.len() - before
            );
        }

        for warning in report.warnings() {
            warn!("{}", warning);
        }

        report
    }

    fn check_required_sections(
        &self,
        rule: &PolicyRule,
        entry: &ProjectEntry<'_>,
        report: &mut PolicyReport,
    ) {
        for path in ["audit.logs_bigquery_dataset", "devops.state_storage_bucket"] {
            if entry.tree.get_path(path).map_or(true, ValueTree::is_empty_section) {
                report.add(PolicyViolation::new(
                    rule,
                    project_label(entry),
                    path,
                    format!("required section '{}' is missing or empty", path),
                ));
            }
        }
    }

    fn check_required_groups(
        &self,
        rule: &PolicyRule,
        entry: &ProjectEntry<'_>,
        report: &mut PolicyReport,
    ) {
        for key in ["owners_group", "auditors_group"] {
            if entry.tree.get(key).map_or(true, ValueTree::is_empty_section) {
                report.add(PolicyViolation::new(
                    rule,
                    project_label(entry),
                    key,
                    format!("'{}' must be set", key),
                ));
            }
        }
    }

    fn check_dataset_naming(
        &self,
        rule: &PolicyRule,
        entry: &ProjectEntry<'_>,
        report: &mut PolicyReport,
    ) {
        let path = "audit.logs_bigquery_dataset.dataset_id";
        let Some(dataset) = entry.tree.get_path(path) else {
            return;
        };
        if dataset.is_reference() {
            return;
        }
        let Some(dataset_id) = dataset.as_str() else {
            return;
        };

        if dataset_id.contains('-') {
            let expected = entry
                .derived_dataset_id()
                .unwrap_or_else(|| dataset_id.replace('-', "_"));
            report.add(
                PolicyViolation::new(
                    rule,
                    project_label(entry),
                    path,
                    format!(
                        "dataset id '{}' contains hyphens; dataset ids use underscores",
                        dataset_id
                    ),
                )
                .with_suggestion(expected),
            );
            return;
        }

        if let Some(expected) = entry.derived_dataset_id() {
            if dataset_id != expected {
                report.add(
                    PolicyViolation::new(
                        rule,
                        project_label(entry),
                        path,
                        format!(
                            "dataset id '{}' does not match the id derived from the project",
                            dataset_id
                        ),
                    )
                    .with_suggestion(expected),
                );
            }
        }
    }

    fn check_unique_ids(
        &self,
        rule: &PolicyRule,
        entries: &[ProjectEntry<'_>],
        report: &mut PolicyReport,
    ) {
        let mut seen: HashMap<&str, String> = HashMap::new();
        for entry in entries {
            let Some(id) = entry.project_id() else {
                continue;
            };
            match seen.get(id) {
                Some(first) => report.add(PolicyViolation::new(
                    rule,
                    id,
                    format!("{}.project_id", entry.location()),
                    format!("duplicate project id, already declared at {}", first),
                )),
                None => {
                    seen.insert(id, entry.location());
                }
            }
        }
    }

    fn check_private_nat(
        &self,
        rule: &PolicyRule,
        entry: &ProjectEntry<'_>,
        organization: &ValueTree,
        report: &mut PolicyReport,
    ) {
        let mut flagged: Vec<&ValueTree> = entry.properties(organization);
        if let Some(resources) = entry.tree.get("resources").and_then(ValueTree::as_mapping) {
            for docs in resources.values() {
                for doc in docs.as_sequence().unwrap_or_default() {
                    if let Some(props) = doc.get("properties") {
                        flagged.push(props);
                    }
                }
            }
        }

        let Some(flag) = flagged.iter().find_map(|props| {
            PRIVATE_FLAGS
                .iter()
                .find(|flag| props.get(**flag) == Some(&ValueTree::Bool(true)))
        }) else {
            return;
        };

        let has_nat = entry
            .tree
            .get("terraform_deployments")
            .map_or(false, contains_nat_override);
        if !has_nat {
            report.add(PolicyViolation::new(
                rule,
                project_label(entry),
                "terraform_deployments",
                format!(
                    "'{}' is set but no NAT router override is declared in terraform_deployments",
                    flag
                ),
            ));
        }
    }

    fn check_billing_accounts(
        &self,
        rule: &PolicyRule,
        organization: &ValueTree,
        entries: &[ProjectEntry<'_>],
        report: &mut PolicyReport,
    ) {
        let mut check = |value: Option<&ValueTree>, project: String, path: &str| {
            let Some(value) = value.filter(|v| !v.is_reference()) else {
                return;
            };
            let account = value.scalar_text().unwrap_or_default();
            if !self.billing_pattern.is_match(&account) {
                report.add(PolicyViolation::new(
                    rule,
                    project,
                    path,
                    format!(
                        "billing account '{}' does not match XXXXXX-XXXXXX-XXXXXX",
                        account
                    ),
                ));
            }
        };

        check(
            organization.get_path("overall.billing_account"),
            ORGANIZATION_SCOPE.to_string(),
            "overall.billing_account",
        );
        for entry in entries {
            check(
                entry.tree.get("billing_account"),
                project_label(entry),
                "billing_account",
            );
        }
    }

    fn check_organization_id(
        &self,
        rule: &PolicyRule,
        organization: &ValueTree,
        report: &mut PolicyReport,
    ) {
        let path = "overall.organization_id";
        let Some(value) = organization.get_path(path).filter(|v| !v.is_reference()) else {
            return;
        };
        let id = value.scalar_text().unwrap_or_default();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            report.add(PolicyViolation::new(
                rule,
                ORGANIZATION_SCOPE,
                path,
                format!("organization id '{}' must be numeric", id),
            ));
        }
    }

    fn check_locations(&self, rule: &PolicyRule, entry: &ProjectEntry<'_>, report: &mut PolicyReport) {
        for section in ["audit.logs_bigquery_dataset", "devops.state_storage_bucket"] {
            let Some(tree) = entry.tree.get_path(section).filter(|t| !t.is_empty_section()) else {
                continue;
            };
            if tree.get("location").map_or(true, ValueTree::is_empty_section) {
                report.add(PolicyViolation::new(
                    rule,
                    project_label(entry),
                    format!("{}.location", section),
                    "location must be set",
                ));
            }
        }
    }
}

fn project_label(entry: &ProjectEntry<'_>) -> String {
    entry
        .project_id()
        .map(str::to_string)
        .unwrap_or_else(|| entry.location())
}

/// True when the tree declares a NAT or router resource anywhere.
fn contains_nat_override(tree: &ValueTree) -> bool {
    match tree {
        ValueTree::Mapping(map) => map
            .iter()
            .any(|(key, value)| NAT_RESOURCE_TYPES.contains(&key.as_str()) || contains_nat_override(value)),
        ValueTree::Sequence(items) => items.iter().any(contains_nat_override),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(projects: &str) -> ValueTree {
        let text = format!(
            r#"
overall:
  organization_id: "433637338589"
  billing_account: 01AB23-45CD67-89EF01
  domain: example.com
projects:
{}"#,
            projects
        );
        serde_yaml::from_str(&text).unwrap()
    }

    const COMPLIANT: &str = r#"
  - project_id: hipaa-example
    owners_group: owners@example.com
    auditors_group: auditors@example.com
    audit:
      logs_bigquery_dataset:
        dataset_id: hipaa_example
        location: US
    devops:
      state_storage_bucket:
        location: US
"#;

    #[test]
    fn test_compliant_organization() {
        let report = PolicyEnforcer::new().enforce(&org(COMPLIANT));
        assert!(report.passed(), "{}", report.report());
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_hyphenated_dataset_is_a_violation() {
        let tree = org(&COMPLIANT.replace("dataset_id: hipaa_example", "dataset_id: hipaa-example"));
        let report = PolicyEnforcer::new().enforce(&tree);

        let violations = report.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, "dataset-naming");
        assert_eq!(violations[0].project, "hipaa-example");
        assert_eq!(violations[0].suggestion.as_deref(), Some("hipaa_example"));
    }

    #[test]
    fn test_dataset_differing_from_project_id_is_a_violation() {
        let tree = org(&COMPLIANT.replace("dataset_id: hipaa_example", "dataset_id: unrelated_logs"));
        let report = PolicyEnforcer::new().enforce(&tree);

        let violations = report.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, "dataset-naming");
        assert!(violations[0].message.contains("unrelated_logs"));
        assert_eq!(violations[0].suggestion.as_deref(), Some("hipaa_example"));
    }

    #[test]
    fn test_missing_sections_are_collected() {
        let tree = org("  - project_id: bare-project\n");
        let report = PolicyEnforcer::new().enforce(&tree);

        let rules: Vec<_> = report.violations().iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(
            rules,
            vec![
                "required-sections",
                "required-sections",
                "required-groups",
                "required-groups"
            ]
        );
    }

    #[test]
    fn test_duplicate_project_ids_across_central_projects() {
        let mut tree = org(&format!("{}{}", COMPLIANT, COMPLIANT));
        if let ValueTree::Mapping(map) = &mut tree {
            let devops: ValueTree =
                serde_yaml::from_str("project:\n  project_id: hipaa-example\n").unwrap();
            map.insert("devops".to_string(), devops);
        }

        let report = PolicyEnforcer::new().enforce(&tree);

        let duplicates: Vec<_> = report
            .violations()
            .into_iter()
            .filter(|v| v.rule_id == "unique-project-ids")
            .collect();
        assert_eq!(duplicates.len(), 2);
        assert_eq!(duplicates[0].path, "projects[0].project_id");
        assert!(duplicates[0].message.contains("devops.project"));
    }

    #[test]
    fn test_private_instance_without_nat_warns_once() {
        let tree = org(&COMPLIANT.replace(
            "    devops:",
            "    properties:\n      server_private: true\n      client_private: true\n    devops:",
        ));
        let report = PolicyEnforcer::new().enforce(&tree);

        assert!(report.passed());
        assert_eq!(report.warnings().len(), 1);
        assert_eq!(report.warnings()[0].rule_id, "private-instance-nat");
    }

    #[test]
    fn test_private_instance_with_nat_override() {
        let tree = org(&COMPLIANT.replace(
            "    devops:",
            r#"    properties:
      server_private: true
    terraform_deployments:
      resources:
        config:
          resource:
            - google_compute_router_nat:
                forseti-nat:
                  router: ${google_compute_router.forseti-router.name}
    devops:"#,
        ));
        let report = PolicyEnforcer::new().enforce(&tree);
        assert!(report.warnings().is_empty());
    }

    #[test]
    fn test_organization_formats() {
        let mut tree = org(COMPLIANT);
        if let ValueTree::Mapping(map) = &mut tree {
            let overall: ValueTree = serde_yaml::from_str(
                "organization_id: example-org\nbilling_account: 1234-5678\ndomain: example.com\n",
            )
            .unwrap();
            map.insert("overall".to_string(), overall);
        }

        let report = PolicyEnforcer::new().enforce(&tree);
        let rules: Vec<_> = report.violations().iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(rules, vec!["billing-account-format", "organization-id-format"]);
        assert!(report.violations().iter().all(|v| v.project == ORGANIZATION_SCOPE));
    }

    #[test]
    fn test_missing_location() {
        let tree = org(&COMPLIANT.replace("        location: US\n    devops", "        location: \"\"\n    devops"));
        let report = PolicyEnforcer::new().enforce(&tree);
        let violations = report.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "audit.logs_bigquery_dataset.location");
    }

    #[test]
    fn test_report_serializes() {
        let tree = org(&COMPLIANT.replace("dataset_id: hipaa_example", "dataset_id: hipaa-example"));
        let report = PolicyEnforcer::new().enforce(&tree);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["findings"][0]["severity"], "error");
        assert!(report.report().contains("dataset-naming"));
    }
}
