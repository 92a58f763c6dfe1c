//! Brief builder for deterministic worker input.
//!
//! Each pipeline phase sends the worker a rendered brief: a fixed contract
//! section plus the upstream artifact it must transform. Templates are
//! compiled in, so a deployed binary cannot drift from its briefs.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::owners::Owner;
use crate::core::plan::{MAX_PLANNED_TASKS, PlannedTask};
use crate::io::skeleton::BASELINE_FILES;

const INTAKE_TEMPLATE: &str = include_str!("briefs/intake.md");
const DESIGN_TEMPLATE: &str = include_str!("briefs/design.md");
const PLAN_TEMPLATE: &str = include_str!("briefs/plan.md");
const TASK_TEMPLATE: &str = include_str!("briefs/task.md");

/// Renders phase briefs from compiled-in templates.
pub struct BriefBuilder {
    env: Environment<'static>,
}

impl BriefBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("intake", INTAKE_TEMPLATE)
            .expect("intake template should be valid");
        env.add_template("design", DESIGN_TEMPLATE)
            .expect("design template should be valid");
        env.add_template("plan", PLAN_TEMPLATE)
            .expect("plan template should be valid");
        env.add_template("task", TASK_TEMPLATE)
            .expect("task template should be valid");
        Self { env }
    }

    /// Brief for the intake stage: raw specification text in, spec pack out.
    pub fn intake(&self, role: &str, spec_text: &str) -> Result<String> {
        let template = self.env.get_template("intake")?;
        template
            .render(context! {
                role => role,
                spec_text => spec_text.trim(),
            })
            .context("render intake brief")
    }

    /// Brief for the design stage: spec pack in, design pack out.
    pub fn design(&self, role: &str, spec_pack_json: &str, roster: &[Owner]) -> Result<String> {
        let template = self.env.get_template("design")?;
        template
            .render(context! {
                role => role,
                spec_pack => spec_pack_json.trim(),
                owner_ids => owner_id_list(roster),
            })
            .context("render design brief")
    }

    /// Brief for the planning stage: design pack in, build plan out.
    pub fn plan(
        &self,
        role: &str,
        design_pack_json: &str,
        run_id: &str,
        roster: &[Owner],
    ) -> Result<String> {
        let template = self.env.get_template("plan")?;
        template
            .render(context! {
                role => role,
                design_pack => design_pack_json.trim(),
                run_id => run_id,
                max_tasks => MAX_PLANNED_TASKS,
                owner_ids => owner_id_list(roster),
            })
            .context("render plan brief")
    }

    /// Brief for one fan-out task: planned task in, file manifest out.
    pub fn task(
        &self,
        role: &str,
        owner: &str,
        task: &PlannedTask,
        design_pack_json: &str,
    ) -> Result<String> {
        let template = self.env.get_template("task")?;
        template
            .render(context! {
                role => role,
                owner => owner,
                task_id => &task.task_id,
                description => task.description.trim(),
                acceptance_criteria => &task.acceptance_criteria,
                expected_deliverables => &task.expected_deliverables,
                baseline_files => BASELINE_FILES,
                design_pack => design_pack_json.trim(),
            })
            .context("render task brief")
    }
}

impl Default for BriefBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn owner_id_list(roster: &[Owner]) -> String {
    roster
        .iter()
        .map(|owner| owner.id)
        .collect::<Vec<_>>()
        .join(", ")
}
