//! # rampart_core
//!
//! Pipeline orchestration for rampart.
//!
//! The [`Engine`] takes a root organization document through import
//! resolution, project defaults, schema validation, policy enforcement,
//! generated fields and artifact emission. Hard errors from any stage abort
//! the run before anything is written.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use rampart_core::{Engine, EngineConfig};
//!
//! let config = EngineConfig::default().with_output_dir("out");
//! let engine = Engine::new(config).unwrap();
//! let report = engine.run(Path::new("org.yaml")).unwrap();
//! println!("{}", report.summary());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod report;

pub use config::{EngineConfig, CONFIG_FILE};
pub use engine::Engine;
pub use error::{CoreError, CoreResult};
pub use report::{Diagnostic, RunReport};
