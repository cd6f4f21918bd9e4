//! rampart CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 3: Validation or policy failure
//! - 4: Import or template error
//! - 5: IaC error

use std::process::ExitCode;

use clap::Parser;
use rampart_core::CoreError;
use rampart_iac::IacError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const TEMPLATE_ERROR: u8 = 4;
    pub const IAC_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "rampart=debug"
    } else if cli.quiet {
        "warn"
    } else {
        "rampart=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    // Ignore the error when a subscriber is already installed.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Generate(args) => commands::generate::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Map an error to its exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(core) = e.downcast_ref::<CoreError>() {
        return match core {
            CoreError::Validation(_) | CoreError::PolicyViolations(_) => {
                ExitCodes::VALIDATION_FAILURE
            }
            CoreError::Template(_) => ExitCodes::TEMPLATE_ERROR,
            CoreError::Iac(_) => ExitCodes::IAC_ERROR,
            _ => ExitCodes::GENERAL_ERROR,
        };
    }
    if e.downcast_ref::<IacError>().is_some() {
        return ExitCodes::IAC_ERROR;
    }
    ExitCodes::GENERAL_ERROR
}
