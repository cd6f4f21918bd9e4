//! # rampart_spec
//!
//! Document model, deep merge and schema validation for rampart.
//!
//! Every YAML document is decoded into a [`ValueTree`] (ordered, string-keyed)
//! before any interpretation. On top of that tree this crate provides:
//!
//! - **Loading and writing**: [`DocumentReader`] and [`DocumentWriter`], the
//!   latter replacing files atomically
//! - **Deep merge**: [`Merger`] with wholesale sequence replacement, null
//!   tombstones and a strict variant that refuses type conflicts
//! - **Schemas**: [`Schema`] documents, the built-in [`SchemaRegistry`] and the
//!   non-mutating [`SchemaValidator`]
//! - **Project entries**: [`project_entries`] walks the central and regular
//!   projects of an organization in emission order
//!
//! ## Example
//!
//! ```rust,no_run
//! use rampart_spec::{DocumentReader, Merger, SchemaRegistry, SchemaValidator};
//!
//! let base = DocumentReader::read_mapping("base.yaml").unwrap();
//! let project = DocumentReader::read_mapping("project.yaml").unwrap();
//! let merged = Merger::new().merge(&base, &project);
//!
//! let registry = SchemaRegistry::builtin().unwrap();
//! let schema = registry.require("project").unwrap();
//! if let Err(errors) = SchemaValidator::validate(&merged, schema) {
//!     for error in &errors {
//!         eprintln!("{}", error);
//!     }
//! }
//! ```

pub mod error;
pub mod merge;
pub mod models;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod validator;
pub mod value;
pub mod writer;

pub use error::{MergeError, SpecError, SpecResult};
pub use merge::{merge, MergeOptions, Merger};
pub use models::*;
pub use reader::DocumentReader;
pub use registry::{SchemaRegistry, ORGANIZATION_SCHEMA, PROJECT_SCHEMA};
pub use schema::{FieldSpec, FieldType, Schema};
pub use validator::{SchemaValidator, ValidatedTree, ValidationError, ValidationErrorKind};
pub use value::{Mapping, ValueKind, ValueTree};
pub use writer::{DocumentWriter, StagedDocument};
