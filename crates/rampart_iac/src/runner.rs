//! Hand-off of emitted artifacts to an external deployment tool.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::emitter::{OutputFormat, UnitKind};
use crate::error::{IacError, IacResult};

/// Ordered list of units to apply, written as `apply_plan.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyPlan {
    pub artifacts_dir: PathBuf,
    pub format: OutputFormat,
    pub sequence: Vec<PlannedUnit>,
}

impl ApplyPlan {
    /// Load a previously written plan.
    pub fn load(path: impl AsRef<Path>) -> IacResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// One entry of the apply sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedUnit {
    pub name: String,
    pub kind: UnitKind,
    /// Unit file relative to `artifacts_dir`.
    pub file: PathBuf,
}

/// Outcome of applying one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerStatus {
    pub unit: String,
    pub succeeded: bool,
    pub detail: String,
}

impl RunnerStatus {
    pub fn success(unit: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            succeeded: true,
            detail: detail.into(),
        }
    }

    pub fn failure(unit: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            succeeded: false,
            detail: detail.into(),
        }
    }
}

/// A tool that applies one emitted unit.
#[async_trait]
pub trait DeploymentRunner: Send + Sync {
    /// Apply `unit` from `artifacts_dir`.
    async fn apply(&self, artifacts_dir: &Path, unit: &PlannedUnit) -> IacResult<RunnerStatus>;
}

/// Apply every unit of `plan` in order, stopping at the first failure.
///
/// The returned statuses cover every unit that was attempted.
pub async fn hand_off(
    runner: &dyn DeploymentRunner,
    plan: &ApplyPlan,
) -> IacResult<Vec<RunnerStatus>> {
    let mut statuses = Vec::with_capacity(plan.sequence.len());

    for unit in &plan.sequence {
        info!("Applying unit '{}'", unit.name);
        let status = runner.apply(&plan.artifacts_dir, unit).await?;
        let failed = !status.succeeded;
        if failed {
            error!("Unit '{}' failed: {}", unit.name, status.detail);
        }
        statuses.push(status);
        if failed {
            break;
        }
    }

    Ok(statuses)
}

/// Placeholder replaced by the unit name in command arguments.
pub const UNIT_PLACEHOLDER: &str = "{unit}";
/// Placeholder replaced by the unit file name in command arguments.
pub const FILE_PLACEHOLDER: &str = "{file}";

/// One external command of a [`CommandRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStep {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandStep {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments with `{unit}` and `{file}` filled in for `unit`.
    pub fn args_for(&self, unit: &PlannedUnit) -> Vec<String> {
        let file = unit
            .file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(UNIT_PLACEHOLDER, &unit.name)
                    .replace(FILE_PLACEHOLDER, &file)
            })
            .collect()
    }
}

/// Runs external commands inside each unit's directory, one step after the
/// other, e.g. `terraform init` then `terraform apply`.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    steps: Vec<CommandStep>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step. Arguments may use `{unit}` and `{file}`.
    pub fn with_step<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(CommandStep::new(program, args));
        self
    }

    pub fn steps(&self) -> &[CommandStep] {
        &self.steps
    }

    /// The default commands for `format`.
    pub fn for_format(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Terraform => Self::new()
                .with_step("terraform", ["init", "-input=false"])
                .with_step("terraform", ["apply", "-input=false", "-auto-approve"]),
            OutputFormat::DeploymentManager => Self::new().with_step(
                "gcloud",
                [
                    "deployment-manager",
                    "deployments",
                    "create",
                    UNIT_PLACEHOLDER,
                    "--config",
                    FILE_PLACEHOLDER,
                ],
            ),
        }
    }
}

#[async_trait]
impl DeploymentRunner for CommandRunner {
    async fn apply(&self, artifacts_dir: &Path, unit: &PlannedUnit) -> IacResult<RunnerStatus> {
        let file = artifacts_dir.join(&unit.file);
        let workdir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| artifacts_dir.to_path_buf());

        let mut stdout = String::new();
        for step in &self.steps {
            let args = step.args_for(unit);
            debug!("Running {} {:?} in {:?}", step.program, args, workdir);
            let output = Command::new(&step.program)
                .args(&args)
                .current_dir(&workdir)
                .output()
                .await
                .map_err(|e| {
                    IacError::Runner(format!("failed to start '{}': {}", step.program, e))
                })?;

            stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let detail = if stderr.is_empty() { stdout } else { stderr };
                return Ok(RunnerStatus::failure(
                    &unit.name,
                    format!("{} {}: {}", step.program, args.join(" "), detail),
                ));
            }
        }

        Ok(RunnerStatus::success(&unit.name, stdout))
    }
}
