//! CLI command definitions.
//!
//! Each subcommand maps to one engine entry point.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rampart_core::EngineConfig;
use rampart_iac::OutputFormat;

pub mod generate;
pub mod validate;

/// rampart - configuration resolution and policy generation for compliant
/// cloud projects
#[derive(Parser)]
#[command(name = "rampart")]
#[command(version, about = "Resolve, validate and emit compliant cloud project configuration")]
#[command(long_about = r#"
rampart resolves a root organization document and its imports, validates it
against the built-in schemas, enforces compliance policy and emits one
infra-as-code unit per project.

COMMANDS:
  generate  → Run the whole pipeline and write artifacts
  validate  → Resolve, validate and enforce policy without writing anything

EXIT CODES:
  0 - Success
  1 - General error
  3 - Validation or policy failure
  4 - Import or template error
  5 - IaC emission or apply error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline and write artifacts
    Generate(generate::GenerateArgs),

    /// Check a configuration without writing anything
    Validate(validate::ValidateArgs),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Root organization document
    #[arg(short, long, env = "RAMPART_CONFIG")]
    pub config: PathBuf,

    /// Settings file (defaults to rampart.toml next to the root document)
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    /// Directory of extra resource schemas
    #[arg(long)]
    pub schema_dir: Option<PathBuf>,

    /// Dotted path, relative to the merged document, whose sequences
    /// concatenate (repeatable), e.g. enabled_apis for project defaults
    #[arg(long = "additive", value_name = "PATH")]
    pub additive_fields: Vec<String>,

    /// Policy rule id to skip (repeatable)
    #[arg(long = "disable-rule", value_name = "RULE")]
    pub disabled_rules: Vec<String>,
}

impl ConfigArgs {
    /// Load settings and apply command line overrides.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let dir = self
            .config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut config = EngineConfig::discover(self.settings.as_deref(), dir)
            .context("failed to load settings")?;

        if let Some(schema_dir) = &self.schema_dir {
            config = config.with_schema_dir(schema_dir);
        }
        for path in &self.additive_fields {
            config = config.with_additive_field(path);
        }
        for id in &self.disabled_rules {
            config = config.with_disabled_rule(id);
        }
        Ok(config)
    }
}

/// Parse an output format name.
pub fn parse_format(value: &str) -> Result<OutputFormat, String> {
    value.parse::<OutputFormat>().map_err(|e| e.to_string())
}
