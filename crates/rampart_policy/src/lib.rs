//! # rampart_policy
//!
//! Cross-field and cross-project compliance checks for rampart.
//!
//! Schemas describe the shape of a single document; the rules here encode what
//! a schema cannot express:
//! - **Required sections**: audit logging and state storage for every project
//! - **Naming**: dataset identifiers, billing accounts and organization ids
//! - **Uniqueness**: a project id is declared once across the organization
//! - **Private networking**: private instances need an operator-supplied NAT
//!
//! Hard violations block artifact emission; warnings are only reported.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rampart_policy::{PolicyEnforcer, RuleSet};
//! use rampart_spec::DocumentReader;
//!
//! let organization = DocumentReader::read_mapping("org.yaml").unwrap();
//!
//! let mut rules = RuleSet::standard();
//! rules.disable("billing-account-format").unwrap();
//!
//! let report = PolicyEnforcer::with_rules(rules).enforce(&organization);
//! if !report.passed() {
//!     println!("{}", report.report());
//! }
//! ```

pub mod engine;
pub mod error;
pub mod rules;

pub use engine::{PolicyEnforcer, PolicyReport, PolicyViolation, ORGANIZATION_SCOPE};
pub use error::{PolicyError, PolicyResult};
pub use rules::{PolicyRule, RuleSet, RuleSeverity, RuleType};
