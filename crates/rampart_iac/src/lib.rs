//! # rampart_iac
//!
//! Generated fields, infra-as-code emission and runner hand-off for rampart.
//!
//! ## Features
//!
//! - Persistent generated fields (state bucket names, log sink names)
//! - One Terraform JSON or Deployment Manager unit per project
//! - Atomic replacement of the output directory plus an `apply_plan.json`
//! - Pluggable [`DeploymentRunner`] for applying units in order
//!
//! ## Example
//!
//! ```rust,no_run
//! use rampart_iac::{ArtifactEmitter, GeneratedFieldsStore, OutputFormat};
//! use rampart_spec::DocumentReader;
//! use std::path::Path;
//!
//! let org = DocumentReader::read_mapping("org.yaml").unwrap();
//! let mut store = GeneratedFieldsStore::load("generated_fields.yaml").unwrap();
//! let org = store.apply_to_organization(&org).unwrap();
//!
//! let emitter = ArtifactEmitter::new(OutputFormat::Terraform);
//! let units = emitter.build_units(&org).unwrap();
//! emitter.write(&units, Path::new("out")).unwrap();
//! store.persist().unwrap();
//! ```

pub mod deployment_manager;
pub mod emitter;
pub mod error;
pub mod generated;
pub mod runner;
pub mod terraform;

pub use deployment_manager::DeploymentManagerRenderer;
pub use emitter::{
    ArtifactEmitter, ArtifactUnit, OutputFormat, PromotedOutput, ResourceKind, ResourceSpec,
    StagedOutput, UnitKind, UnitPlan, UnitRenderer, APPLY_PLAN_FILE, ORGANIZATION_UNIT,
};
pub use error::{IacError, IacResult};
pub use generated::{
    state_bucket_name, GeneratedFieldsStore, DEFAULT_LOG_SINK_NAME, LOG_SINK_NAME,
    STATE_STORAGE_BUCKET,
};
pub use runner::{
    hand_off, ApplyPlan, CommandRunner, CommandStep, DeploymentRunner, PlannedUnit, RunnerStatus,
    FILE_PLACEHOLDER, UNIT_PLACEHOLDER,
};
pub use terraform::{normalize_blocks, resource_key, TerraformRenderer};
