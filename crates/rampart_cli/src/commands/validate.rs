//! Validate command - resolve, validate and enforce policy only.

use anyhow::Result;
use clap::Args;
use tracing::info;

use rampart_core::Engine;

use super::ConfigArgs;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

pub async fn execute(args: ValidateArgs) -> Result<()> {
    info!("Validating {:?}", args.config.config);

    let engine = Engine::new(args.config.engine_config()?)?;
    let report = engine.check(&args.config.config)?;

    println!("📋 Projects: {}", report.projects.join(", "));
    for warning in &report.warnings {
        println!("   ⚠️  {}", warning);
    }
    println!("✅ All validations passed!");
    Ok(())
}
