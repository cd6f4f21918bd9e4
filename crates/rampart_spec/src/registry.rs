//! Schema registry.
//!
//! Holds the built-in organization, project and resource schemas, optionally
//! extended from a directory of `<resource_type>.schema.yaml` or
//! `<resource_type>.py.schema` files.

use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{SpecError, SpecResult};
use crate::schema::Schema;

pub const ORGANIZATION_SCHEMA: &str = "organization";
pub const PROJECT_SCHEMA: &str = "project";

const BUILTIN_SCHEMAS: &[(&str, &str)] = &[
    (ORGANIZATION_SCHEMA, include_str!("../schemas/organization.schema.yaml")),
    (PROJECT_SCHEMA, include_str!("../schemas/project.schema.yaml")),
    ("network", include_str!("../schemas/network.schema.yaml")),
    ("gcs_bucket", include_str!("../schemas/gcs_bucket.schema.yaml")),
    ("bq_dataset", include_str!("../schemas/bq_dataset.schema.yaml")),
];

/// Registry of schemas keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, Schema>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in schemas.
    pub fn builtin() -> SpecResult<Self> {
        let mut registry = Self::new();
        for (name, content) in BUILTIN_SCHEMAS {
            registry.register(Schema::from_yaml_str(name, content)?);
        }
        Ok(registry)
    }

    /// Register a schema, replacing any schema of the same name.
    pub fn register(&mut self, schema: Schema) {
        if self.schemas.contains_key(&schema.name) {
            debug!("Overriding schema '{}'", schema.name);
        }
        self.schemas.insert(schema.name.clone(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.get(name)
    }

    /// Get a schema that must exist.
    pub fn require(&self, name: &str) -> SpecResult<&Schema> {
        self.get(name)
            .ok_or_else(|| SpecError::UnknownSchema(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Load every schema file found directly inside `dir`.
    pub fn load_dir(&mut self, dir: &Path) -> SpecResult<usize> {
        if !dir.exists() {
            warn!("Schema directory does not exist: {:?}", dir);
            return Ok(0);
        }

        let mut files: Vec<_> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file() && is_schema_file(p))
            .collect();
        files.sort();

        for path in &files {
            let schema = Schema::load(path)?;
            info!("Loaded schema '{}' from {:?}", schema.name, path);
            self.register(schema);
        }

        Ok(files.len())
    }
}

fn is_schema_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.ends_with(".schema.yaml") || name.ends_with(".schema.yml") || name.ends_with(".schema")
}
