//! # rampart_templates
//!
//! Import resolution and template parameter substitution for rampart.
//!
//! A document may pull in other documents through its `imports` list. Each
//! entry is either a plain path or a `{path, data}` mapping; with `data`, the
//! imported document is treated as a template and its `{{KEY}}` placeholders
//! are replaced one-to-one by the supplied parameters.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rampart_spec::MergeOptions;
//! use rampart_templates::ImportResolver;
//!
//! let resolver = ImportResolver::with_merge_options(
//!     MergeOptions::new().with_additive_field("overall.allowed_apis"),
//! );
//! let organization = resolver.resolve("config/org.yaml").unwrap();
//! ```

pub mod error;
pub mod renderer;
pub mod resolver;

pub use error::{TemplateError, TemplateResult};
pub use renderer::TemplateRenderer;
pub use resolver::{ImportDirective, ImportResolver, IMPORTS_KEY};
