//! Shared result types for pipeline runs.
//!
//! These types define stable contracts between pipeline phases. They are
//! persisted verbatim into the run artifacts tree, so field names and
//! ordering must remain stable across releases.

use serde::{Deserialize, Serialize};

use crate::core::plan::BuildPlan;

/// Terminal status of one fan-out task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Outcome of one planned task.
///
/// Appended to the run's event log as the task completes and never mutated
/// afterward. `blocking_issues` is empty exactly when `status` is success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    /// Resolved owner id, or the raw owner token when resolution failed.
    pub owner: String,
    pub status: TaskStatus,
    /// Where the task's manifest was (or would have been) written.
    pub manifest_path: String,
    pub blocking_issues: Vec<String>,
}

/// Durable record of a whole run (`artifacts/<run_id>/run_summary.json`).
///
/// Written once at the end of every run, including runs that abort with a
/// fatal error; `error` carries the abort cause in that case so the summary
/// stays diagnosable on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    /// Snapshot of the validated plan; absent when the spine failed before
    /// producing one.
    pub build_plan: Option<BuildPlan>,
    pub task_results: Vec<TaskResult>,
    /// Union of applied and provisioned absolute paths, sorted and deduped.
    pub written_files: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
