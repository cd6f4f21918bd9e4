//! Run results and located diagnostics.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use rampart_iac::{ApplyPlan, RunnerStatus};
use rampart_policy::PolicyViolation;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreResult;

/// A schema error tagged with the project it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Project id, or the document location when the id is unknown.
    pub project: String,
    /// Dotted path inside the project or organization document.
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        project: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.project, self.path, self.message)
    }
}

/// Outcome of a check or a full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Project ids in emission order.
    pub projects: Vec<String>,
    /// Soft policy findings; they never abort a run.
    pub warnings: Vec<PolicyViolation>,
    /// Set once artifacts were written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_plan: Option<ApplyPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runner_statuses: Vec<RunnerStatus>,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            projects: Vec::new(),
            warnings: Vec::new(),
            apply_plan: None,
            runner_statuses: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Whether every attempted unit applied cleanly.
    pub fn applied_cleanly(&self) -> bool {
        self.runner_statuses.iter().all(|s| s.succeeded)
    }

    /// One-line summary for the operator.
    pub fn summary(&self) -> String {
        let units = self
            .apply_plan
            .as_ref()
            .map(|p| p.sequence.len())
            .unwrap_or(0);
        format!(
            "run {}: {} project(s), {} unit(s) emitted, {} warning(s)",
            self.run_id,
            self.projects.len(),
            units,
            self.warnings.len()
        )
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)? + "\n")?;
        debug!("Saved run report to {:?}", path);
        Ok(())
    }
}
