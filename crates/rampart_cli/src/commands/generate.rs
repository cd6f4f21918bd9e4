//! Generate command - run the whole pipeline.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use rampart_core::Engine;
use rampart_iac::{CommandRunner, IacError, OutputFormat};

use super::{parse_format, ConfigArgs};

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Artifacts directory (overrides the settings file)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Output format: terraform or deployment_manager
    #[arg(short, long, value_parser = parse_format)]
    pub format: Option<OutputFormat>,

    /// Recompute a generated field, as project_id/field (repeatable)
    #[arg(long, value_name = "PROJECT/FIELD")]
    pub regenerate: Vec<String>,

    /// Apply the emitted units with the format's deployment tool
    #[arg(long)]
    pub apply: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub async fn execute(args: GenerateArgs) -> Result<()> {
    let mut config = args.config.engine_config()?;
    if let Some(dir) = &args.output_dir {
        config = config.with_output_dir(dir);
    }
    if let Some(format) = args.format {
        config = config.with_format(format);
    }
    for entry in &args.regenerate {
        config = config.with_regenerate(entry);
    }

    info!("Generating from {:?}", args.config.config);
    let engine = Engine::new(config)?;
    let mut report = engine.run(&args.config.config)?;

    for warning in &report.warnings {
        println!("   ⚠️  {}", warning);
    }

    if args.apply {
        if let Some(plan) = report.apply_plan.clone() {
            let runner = CommandRunner::for_format(plan.format);
            report.runner_statuses = engine.hand_off(&runner, &plan).await?;
            for status in &report.runner_statuses {
                let mark = if status.succeeded { "✅" } else { "❌" };
                println!("   {} {}", mark, status.unit);
            }
        }
    }

    if let Some(path) = &args.report {
        report.save(path)?;
    }

    println!("✅ {}", report.summary());
    if !report.applied_cleanly() {
        return Err(IacError::Runner("apply stopped at a failed unit".to_string()).into());
    }
    Ok(())
}
