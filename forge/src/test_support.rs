//! Test-only helpers: a scripted worker backend and fixture builders.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::core::plan::PlannedTask;
use crate::io::worker::{Worker, WorkerRequest};

/// Worker that plays back predetermined JSON outputs without spawning
/// processes.
///
/// Each `invoke` pops the next scripted value and writes it to the request's
/// output path. A `Value::Null` entry writes nothing, simulating a worker
/// that exited without producing output. An exhausted script is an error.
pub struct ScriptedWorker {
    outputs: RefCell<VecDeque<Value>>,
}

impl ScriptedWorker {
    pub fn new(outputs: Vec<Value>) -> Self {
        Self { outputs: RefCell::new(outputs.into()) }
    }

    /// Number of scripted outputs not yet consumed.
    pub fn remaining(&self) -> usize {
        self.outputs.borrow().len()
    }
}

impl Worker for ScriptedWorker {
    fn invoke(&self, request: &WorkerRequest) -> Result<()> {
        let value = self
            .outputs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted worker has no output left for {}", request.owner))?;
        if value.is_null() {
            return Ok(());
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent).context("create output dir")?;
        }
        let mut buf = serde_json::to_string_pretty(&value).context("serialize scripted output")?;
        buf.push('\n');
        fs::write(&request.output_path, buf).context("write scripted output")
    }
}

/// Planned task with deterministic defaults.
pub fn planned_task(task_id: &str, owner: &str) -> PlannedTask {
    PlannedTask {
        task_id: task_id.to_string(),
        owner: owner.to_string(),
        description: format!("{task_id} description"),
        acceptance_criteria: vec![format!("{task_id} acceptance")],
        expected_deliverables: vec![format!("src/{task_id}.py")],
    }
}
