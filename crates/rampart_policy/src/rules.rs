//! Policy rules and rule sets.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};

/// A policy rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: RuleSeverity,
    pub rule_type: RuleType,
    pub enabled: bool,
    /// Mandatory rules guard invariants of every run and cannot be disabled.
    #[serde(default)]
    pub mandatory: bool,
}

/// Rule severity levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    /// Hard violation; aborts the pipeline.
    Error,
    /// Soft warning; reported but does not block emission.
    Warning,
}

impl RuleSeverity {
    /// Whether a finding of this severity blocks artifact emission.
    pub fn blocks(&self) -> bool {
        matches!(self, RuleSeverity::Error)
    }
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSeverity::Error => write!(f, "PolicyViolation"),
            RuleSeverity::Warning => write!(f, "PolicyWarning"),
        }
    }
}

/// Types of rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// `audit.logs_bigquery_dataset` and `devops.state_storage_bucket` are set.
    RequiredSections,
    /// Owners and auditors groups are set.
    RequiredGroups,
    /// Dataset identifiers use underscores and match the project id.
    DatasetNaming,
    /// No project id appears twice across the organization.
    UniqueProjectIds,
    /// Private instances come with a NAT/router override.
    PrivateInstanceNat,
    /// Billing accounts look like `XXXXXX-XXXXXX-XXXXXX`.
    BillingAccountFormat,
    /// Organization ids are numeric.
    OrganizationIdFormat,
    /// Audit dataset and state bucket locations are set.
    LocationsSet,
}

impl PolicyRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        rule_type: RuleType,
        severity: RuleSeverity,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            severity,
            rule_type,
            enabled: true,
            mandatory: false,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// A set of policy rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    pub rules: Vec<PolicyRule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Create the standard compliance rule set.
    pub fn standard() -> Self {
        let mut rules = Self::new("Standard Rules");

        rules.add(
            PolicyRule::new(
                "required-sections",
                "Audit and DevOps Sections Required",
                RuleType::RequiredSections,
                RuleSeverity::Error,
            )
            .with_description(
                "Every project needs audit.logs_bigquery_dataset and devops.state_storage_bucket",
            )
            .mandatory(),
        );

        rules.add(
            PolicyRule::new(
                "required-groups",
                "Owner and Auditor Groups Required",
                RuleType::RequiredGroups,
                RuleSeverity::Error,
            )
            .with_description("Every project needs non-empty owners_group and auditors_group")
            .mandatory(),
        );

        rules.add(
            PolicyRule::new(
                "dataset-naming",
                "Dataset Identifiers Use Underscores",
                RuleType::DatasetNaming,
                RuleSeverity::Error,
            )
            .with_description(
                "BigQuery dataset identifiers use underscores and match the id derived from \
                 the project id",
            )
            .mandatory(),
        );

        rules.add(
            PolicyRule::new(
                "unique-project-ids",
                "Unique Project IDs",
                RuleType::UniqueProjectIds,
                RuleSeverity::Error,
            )
            .with_description(
                "A project id may appear only once across projects, devops.project, \
                 audit_logs_project and forseti.project",
            )
            .mandatory(),
        );

        rules.add(
            PolicyRule::new(
                "private-instance-nat",
                "NAT for Private Instances",
                RuleType::PrivateInstanceNat,
                RuleSeverity::Warning,
            )
            .with_description(
                "Projects with server_private or client_private instances need a NAT router \
                 in terraform_deployments",
            ),
        );

        rules.add(
            PolicyRule::new(
                "billing-account-format",
                "Billing Account Format",
                RuleType::BillingAccountFormat,
                RuleSeverity::Error,
            )
            .with_description("Billing accounts must look like XXXXXX-XXXXXX-XXXXXX"),
        );

        rules.add(
            PolicyRule::new(
                "organization-id-format",
                "Numeric Organization ID",
                RuleType::OrganizationIdFormat,
                RuleSeverity::Error,
            )
            .with_description("overall.organization_id must be numeric"),
        );

        rules.add(
            PolicyRule::new(
                "locations-set",
                "Locations Required",
                RuleType::LocationsSet,
                RuleSeverity::Error,
            )
            .with_description("Audit dataset and state bucket locations must be set"),
        );

        rules
    }

    /// Add a rule to the set.
    pub fn add(&mut self, rule: PolicyRule) {
        self.rules.push(rule);
    }

    pub fn get(&self, id: &str) -> Option<&PolicyRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Disable a rule by id. Mandatory rules cannot be disabled.
    pub fn disable(&mut self, id: &str) -> PolicyResult<()> {
        match self.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) if rule.mandatory => Err(PolicyError::MandatoryRule(id.to_string())),
            Some(rule) => {
                debug!("Disabling policy rule '{}'", id);
                rule.enabled = false;
                Ok(())
            }
            None => Err(PolicyError::UnknownRule(id.to_string())),
        }
    }

    /// Enabled rules, in declaration order.
    pub fn enabled(&self) -> impl Iterator<Item = &PolicyRule> {
        self.rules.iter().filter(|r| r.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_rules() {
        let rules = RuleSet::standard();
        assert_eq!(rules.rules.len(), 8);
        assert_eq!(
            rules.get("private-instance-nat").map(|r| r.severity),
            Some(RuleSeverity::Warning)
        );
        assert!(rules
            .rules
            .iter()
            .filter(|r| r.id != "private-instance-nat")
            .all(|r| r.severity.blocks()));
    }

    #[test]
    fn test_disable_rule() {
        let mut rules = RuleSet::standard();
        rules.disable("locations-set").unwrap();
        assert_eq!(rules.enabled().count(), 7);

        assert!(matches!(
            rules.disable("no-such-rule"),
            Err(PolicyError::UnknownRule(_))
        ));
    }

    #[test]
    fn test_mandatory_rules_stay_enabled() {
        let mut rules = RuleSet::standard();
        for id in [
            "required-sections",
            "required-groups",
            "dataset-naming",
            "unique-project-ids",
        ] {
            assert!(matches!(
                rules.disable(id),
                Err(PolicyError::MandatoryRule(ref rule)) if rule == id
            ));
        }
        assert_eq!(rules.enabled().count(), 8);
    }
}
