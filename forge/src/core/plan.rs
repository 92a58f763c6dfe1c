//! Structured outputs of the spine stages.
//!
//! Each stage of the spine ingests the previous stage's output and produces
//! one of these records. They arrive from generative workers as JSON and are
//! schema-checked at the ingestion boundary before deserialization; the
//! invariants here (notably the planned-task cap) are enforced again on the
//! typed values so no non-conforming plan can enter pipeline state.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Hard cap on fan-out width. Enforced at plan validation, never configurable.
pub const MAX_PLANNED_TASKS: usize = 3;

/// Structured output of the specification-intake stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecPack {
    pub functional_requirements: Vec<String>,
    pub non_functional_constraints: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub out_of_scope: Vec<String>,
    pub open_questions: Vec<String>,
}

/// One module in the design's breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSpec {
    pub name: String,
    pub responsibility: String,
    pub public_api: Vec<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataModelSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub invariants: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceSpec {
    pub name: String,
    pub description: String,
    pub signatures: Vec<String>,
}

/// Owner token plus the modules assigned to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipSpec {
    pub owner: String,
    pub modules: Vec<String>,
}

/// Structured output of the design stage: architecture and contracts only,
/// no implementation code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignPack {
    pub architecture_summary: String,
    pub module_breakdown: Vec<ModuleSpec>,
    pub data_models: Vec<DataModelSpec>,
    pub interfaces: Vec<InterfaceSpec>,
    pub ownership: Vec<OwnershipSpec>,
    pub risks: Vec<String>,
    pub assumptions: Vec<String>,
    pub open_questions: Vec<String>,
}

/// One unit of fan-out work from the plan stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannedTask {
    pub task_id: String,
    /// Loosely-specified owner token; resolved to a canonical worker id
    /// before execution (see [`crate::core::owners`]).
    pub owner: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub expected_deliverables: Vec<String>,
}

/// Structured output of the plan stage.
///
/// Immutable once validated: at most [`MAX_PLANNED_TASKS`] planned tasks,
/// each with a non-empty, unique task id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildPlan {
    pub run_id: String,
    pub planned_tasks: Vec<PlannedTask>,
    pub test_strategy: Vec<String>,
    pub integration_notes: Vec<String>,
}

impl BuildPlan {
    /// Check plan invariants. Must be called at every ingestion point before
    /// the plan enters pipeline state.
    pub fn validate(&self) -> Result<()> {
        if self.planned_tasks.len() > MAX_PLANNED_TASKS {
            bail!(
                "build plan has {} planned tasks; at most {MAX_PLANNED_TASKS} are allowed",
                self.planned_tasks.len()
            );
        }
        for task in &self.planned_tasks {
            if task.task_id.trim().is_empty() {
                bail!("build plan contains a task with an empty task_id");
            }
        }
        let mut ids: Vec<&str> = self
            .planned_tasks
            .iter()
            .map(|task| task.task_id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.planned_tasks.len() {
            bail!("build plan contains duplicate task ids");
        }
        Ok(())
    }
}
