//! Engine settings, loaded from an optional `rampart.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use rampart_iac::OutputFormat;
use rampart_policy::RuleSet;
use rampart_spec::MergeOptions;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Default settings file name.
pub const CONFIG_FILE: &str = "rampart.toml";

/// Settings for one engine run. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where artifacts are written.
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    /// Dotted paths whose sequences concatenate instead of replacing.
    pub additive_fields: Vec<String>,
    /// `project_id/field` entries to recompute.
    pub regenerate: Vec<String>,
    /// Extra resource schemas, layered over the built-in ones.
    pub schema_dir: Option<PathBuf>,
    /// Policy rule ids to skip.
    pub disabled_rules: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            format: OutputFormat::default(),
            additive_fields: Vec::new(),
            regenerate: Vec::new(),
            schema_dir: None,
            disabled_rules: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| CoreError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!("Loaded engine settings from {:?}", path);
        Ok(config)
    }

    /// Load `path` if given, otherwise `rampart.toml` from `dir` when it
    /// exists, otherwise the defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> CoreResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let candidate = dir.join(CONFIG_FILE);
                if candidate.is_file() {
                    Self::load(candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_additive_field(mut self, path: impl Into<String>) -> Self {
        self.additive_fields.push(path.into());
        self
    }

    pub fn with_regenerate(mut self, entry: impl Into<String>) -> Self {
        self.regenerate.push(entry.into());
        self
    }

    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = Some(dir.into());
        self
    }

    pub fn with_disabled_rule(mut self, id: impl Into<String>) -> Self {
        self.disabled_rules.push(id.into());
        self
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions::new().with_additive_fields(self.additive_fields.iter().cloned())
    }

    /// The standard rule set minus `disabled_rules`.
    pub fn rule_set(&self) -> CoreResult<RuleSet> {
        let mut rules = RuleSet::standard();
        for id in &self.disabled_rules {
            rules.disable(id)?;
        }
        Ok(rules)
    }
}
