//! End-to-end pipeline: staged spine, bounded fan-out, manifest
//! application, durable summary.
//!
//! The spine runs intake, design, and plan in sequence; each stage's output
//! is schema-checked, persisted, and fed to the next. The plan fans out into
//! at most [`crate::core::plan::MAX_PLANNED_TASKS`] task invocations; their
//! manifests are applied once the whole fan-out has completed, and the
//! baseline skeleton is provisioned last. Task failures are isolated: one
//! bad task never stops its siblings. Safety violations while applying a
//! manifest are fatal. `run_summary.json` is written on every exit path,
//! including fatal ones.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use crate::core::manifest::FileManifest;
use crate::core::owners::{Owner, default_roster, resolve_owner};
use crate::core::plan::{BuildPlan, DesignPack, PlannedTask, SpecPack};
use crate::core::types::{RunSummary, TaskResult, TaskStatus};
use crate::io::apply::apply_manifest;
use crate::io::artifacts::{
    RunPaths, append_event, ensure_event_log, init_run, new_run_id, unique_run_id, write_json,
    write_spec,
};
use crate::io::brief::BriefBuilder;
use crate::io::config::PipelineConfig;
use crate::io::skeleton::{BASELINE_FILES, ensure_skeleton};
use crate::io::worker::{Worker, WorkerRequest, invoke_and_load, write_output_schema};

const SPEC_PACK_SCHEMA: &str = include_str!("../schemas/spec_pack.schema.json");
const DESIGN_PACK_SCHEMA: &str = include_str!("../schemas/design_pack.schema.json");
const BUILD_PLAN_SCHEMA: &str = include_str!("../schemas/build_plan.schema.json");
const FILE_MANIFEST_SCHEMA: &str = include_str!("../schemas/file_manifest.schema.json");

/// One line of `callbacks.log.jsonl`, appended as each task completes.
#[derive(Debug, Clone, Serialize)]
struct CallbackEvent<'a> {
    run_id: &'a str,
    task_id: &'a str,
    owner: &'a str,
    status: &'a str,
    manifest_path: &'a str,
    blocking_issues: &'a [String],
}

/// Run the whole pipeline for one specification.
///
/// Returns the summary on success. On a fatal error the summary is still
/// written under the run's artifacts directory before the error propagates.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_pipeline(
    root: &Path,
    spec_text: &str,
    worker: &dyn Worker,
    config: &PipelineConfig,
) -> Result<RunSummary> {
    config.validate()?;
    let run_id = unique_run_id(root, &new_run_id())?;
    let paths = init_run(root, &run_id)?;
    write_spec(&paths, spec_text)?;
    ensure_event_log(&paths.event_log_path)?;
    info!(run_id, "run initialized");

    let mut summary = RunSummary {
        run_id: run_id.clone(),
        started_at: now_utc(),
        finished_at: String::new(),
        build_plan: None,
        task_results: Vec::new(),
        written_files: Vec::new(),
        warnings: Vec::new(),
        error: None,
    };

    let outcome = execute(&paths, spec_text, worker, config, &mut summary);

    summary.finished_at = now_utc();
    summary.written_files.sort_unstable();
    summary.written_files.dedup();
    if let Err(err) = &outcome {
        summary.error = Some(format!("{err:#}"));
        warn!(run_id, error = %summary.error.as_deref().unwrap_or_default(), "run failed");
    }
    write_json(&paths.summary_path, &summary)
        .with_context(|| format!("write run summary for {run_id}"))?;

    outcome.map(|()| summary)
}

fn execute(
    paths: &RunPaths,
    spec_text: &str,
    worker: &dyn Worker,
    config: &PipelineConfig,
    summary: &mut RunSummary,
) -> Result<()> {
    let roster = default_roster();
    let briefs = BriefBuilder::new();

    // Spine: intake -> design -> plan, each schema-checked and persisted.
    let lead = owner_by_id(&roster, "lead-owner");
    let core = owner_by_id(&roster, "core-owner");

    let spec_pack: SpecPack = run_stage(
        worker,
        paths,
        config,
        "intake",
        lead,
        briefs.intake(lead.role, spec_text)?,
        SPEC_PACK_SCHEMA,
    )
    .context("intake stage")?;
    write_json(&paths.spec_pack_path, &spec_pack)?;
    let spec_pack_json = serde_json::to_string_pretty(&spec_pack)?;

    let design_pack: DesignPack = run_stage(
        worker,
        paths,
        config,
        "design",
        core,
        briefs.design(core.role, &spec_pack_json, &roster)?,
        DESIGN_PACK_SCHEMA,
    )
    .context("design stage")?;
    write_json(&paths.design_pack_path, &design_pack)?;
    let design_pack_json = serde_json::to_string_pretty(&design_pack)?;

    let mut plan: BuildPlan = run_stage(
        worker,
        paths,
        config,
        "plan",
        lead,
        briefs.plan(lead.role, &design_pack_json, &paths.run_id, &roster)?,
        BUILD_PLAN_SCHEMA,
    )
    .context("plan stage")?;
    // The run id is pipeline identity; whatever the planner echoed, the
    // persisted plan carries the real one.
    plan.run_id = paths.run_id.clone();
    plan.validate().context("validate build plan")?;
    write_json(&paths.build_plan_path, &plan)?;
    summary.build_plan = Some(plan.clone());
    info!(tasks = plan.planned_tasks.len(), "build plan accepted");

    // Fan-out: every task runs to a recorded result before anything is
    // applied. One bad task never stops its siblings.
    let mut manifests: Vec<FileManifest> = Vec::new();
    for task in &plan.planned_tasks {
        let result = run_task(worker, paths, config, &roster, &briefs, task, &design_pack_json);
        let (task_result, manifest) = match result {
            Ok((task_result, manifest)) => (task_result, manifest),
            Err(err) => (failed_result(paths, task, format!("{err:#}")), None),
        };

        append_event(
            &paths.event_log_path,
            &CallbackEvent {
                run_id: &paths.run_id,
                task_id: &task_result.task_id,
                owner: &task_result.owner,
                status: task_result.status.as_str(),
                manifest_path: &task_result.manifest_path,
                blocking_issues: &task_result.blocking_issues,
            },
        )?;
        summary.task_results.push(task_result);
        manifests.extend(manifest);
    }

    // Applying: a manifest that violates a safety rule aborts the run.
    for manifest in &manifests {
        let outcome = apply_manifest(
            manifest,
            &paths.generated_app_dir,
            BASELINE_FILES,
            config.max_file_bytes,
        )
        .with_context(|| format!("apply manifest for task {}", manifest.task_id))?;
        summary.written_files.extend(outcome.written_files);
        summary.warnings.extend(outcome.warnings);
    }

    // Provisioning: additive to the applied set, never overwrites.
    let provisioned = ensure_skeleton(&paths.generated_app_dir)?;
    summary
        .written_files
        .extend(provisioned.iter().map(|p| p.to_string_lossy().into_owned()));

    Ok(())
}

/// Run one spine stage: materialize its schema, invoke the worker, load the
/// schema-checked output.
fn run_stage<T: DeserializeOwned>(
    worker: &dyn Worker,
    paths: &RunPaths,
    config: &PipelineConfig,
    stage: &str,
    owner: &Owner,
    brief: String,
    schema_text: &str,
) -> Result<T> {
    let schema_path = paths.state_dir.join(format!("{stage}.schema.json"));
    write_output_schema(&schema_path, schema_text)?;
    let request = WorkerRequest {
        owner: owner.id.to_string(),
        workdir: paths.artifacts_dir.clone(),
        brief,
        output_schema_path: schema_path,
        output_path: paths.state_dir.join(format!("{stage}.output.json")),
        worker_log_path: paths.state_dir.join(format!("{stage}.worker.log")),
        timeout: config.worker_timeout(),
        output_limit_bytes: config.worker_output_limit_bytes,
    };
    invoke_and_load(worker, &request)
}

/// Run one fan-out task through to a persisted manifest.
///
/// Any error here is a task failure, not a run failure; the caller converts
/// it into a failed [`TaskResult`].
fn run_task(
    worker: &dyn Worker,
    paths: &RunPaths,
    config: &PipelineConfig,
    roster: &[Owner],
    briefs: &BriefBuilder,
    task: &PlannedTask,
    design_pack_json: &str,
) -> Result<(TaskResult, Option<FileManifest>)> {
    let owner_id = resolve_owner(&task.owner, roster)?;
    let owner = owner_by_id(roster, &owner_id);
    let manifest_path = paths.manifest_path(&task.task_id);

    let schema_path = paths.state_dir.join("file_manifest.schema.json");
    write_output_schema(&schema_path, FILE_MANIFEST_SCHEMA)?;
    let request = WorkerRequest {
        owner: owner_id.clone(),
        workdir: paths.generated_app_dir.clone(),
        brief: briefs.task(owner.role, &owner_id, task, design_pack_json)?,
        output_schema_path: schema_path,
        output_path: paths.state_dir.join(format!("{}.output.json", task.task_id)),
        worker_log_path: paths.state_dir.join(format!("{}.worker.log", task.task_id)),
        timeout: config.worker_timeout(),
        output_limit_bytes: config.worker_output_limit_bytes,
    };
    let manifest: FileManifest = invoke_and_load(worker, &request)
        .with_context(|| format!("task {} worker", task.task_id))?;

    if manifest.task_id != task.task_id {
        let issue = format!(
            "manifest task_id {:?} does not match planned task {:?}",
            manifest.task_id, task.task_id
        );
        warn!(task_id = %task.task_id, "{issue}");
        return Ok((
            TaskResult {
                task_id: task.task_id.clone(),
                owner: owner_id,
                status: TaskStatus::Failed,
                manifest_path: manifest_path.to_string_lossy().into_owned(),
                blocking_issues: vec![issue],
            },
            None,
        ));
    }

    write_json(&manifest_path, &manifest)?;
    info!(task_id = %task.task_id, owner = %owner_id, files = manifest.files.len(), "task manifest persisted");
    Ok((
        TaskResult {
            task_id: task.task_id.clone(),
            owner: owner_id,
            status: TaskStatus::Success,
            manifest_path: manifest_path.to_string_lossy().into_owned(),
            blocking_issues: Vec::new(),
        },
        Some(manifest),
    ))
}

fn failed_result(paths: &RunPaths, task: &PlannedTask, issue: String) -> TaskResult {
    TaskResult {
        task_id: task.task_id.clone(),
        // Resolution may be the thing that failed; keep the raw token so the
        // summary shows what the planner actually said.
        owner: task.owner.clone(),
        status: TaskStatus::Failed,
        manifest_path: paths.manifest_path(&task.task_id).to_string_lossy().into_owned(),
        blocking_issues: vec![issue],
    }
}

fn owner_by_id<'a>(roster: &'a [Owner], id: &str) -> &'a Owner {
    roster
        .iter()
        .find(|owner| owner.id == id)
        .expect("default roster contains the spine owners")
}

fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedWorker;
    use serde_json::{Value, json};
    use std::fs;

    fn spine_outputs() -> Vec<Value> {
        vec![
            json!({
                "functional_requirements": ["store tasks"],
                "acceptance_criteria": ["demo runs"],
            }),
            json!({
                "architecture_summary": "single package",
                "module_breakdown": [
                    {"name": "domain", "responsibility": "task records"}
                ],
                "ownership": [{"owner": "core-owner", "modules": ["domain"]}],
            }),
            json!({
                "run_id": "whatever-the-planner-said",
                "planned_tasks": [
                    {
                        "task_id": "task-1",
                        "owner": "Domain Engineer",
                        "description": "implement the domain",
                    },
                    {
                        "task_id": "task-2",
                        "owner": "QA Engineer",
                        "description": "write tests",
                    }
                ],
            }),
        ]
    }

    fn manifest(task_id: &str, path: &str, content: &str) -> Value {
        json!({
            "task_id": task_id,
            "files": [{"path": path, "content": content}],
        })
    }

    #[test]
    fn happy_path_applies_manifests_and_writes_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut outputs = spine_outputs();
        outputs.push(manifest("task-1", "src/app/extra.py", "VALUE = 1\n"));
        outputs.push(manifest("task-2", "tests/test_extra.py", "def test_ok():\n    pass\n"));
        let worker = ScriptedWorker::new(outputs);

        let summary = run_pipeline(temp.path(), "Build a todo app.", &worker, &PipelineConfig::default())
            .expect("run");

        assert!(summary.error.is_none());
        assert_eq!(worker.remaining(), 0);
        assert_eq!(summary.task_results.len(), 2);
        assert!(summary.task_results.iter().all(|r| r.status == TaskStatus::Success));
        // Owners resolved to canonical ids.
        assert_eq!(summary.task_results[0].owner, "core-owner");
        assert_eq!(summary.task_results[1].owner, "infra-owner");
        // Written paths are absolute: applied entries and baseline alike.
        assert!(summary
            .written_files
            .iter()
            .all(|p| std::path::Path::new(p).is_absolute()));
        assert!(summary.written_files.iter().any(|p| p.ends_with("src/app/extra.py")));
        assert!(summary.written_files.iter().any(|p| p.ends_with("pyproject.toml")));

        let run_dir = temp.path().join("artifacts").join(&summary.run_id);
        assert!(run_dir.join("spec.md").is_file());
        assert!(run_dir.join("spec_pack.json").is_file());
        assert!(run_dir.join("design_pack.json").is_file());
        assert!(run_dir.join("build_plan.json").is_file());
        assert!(run_dir.join("manifests/task-1.json").is_file());
        assert!(run_dir.join("generated_app/src/app/extra.py").is_file());
        assert!(run_dir.join("run_summary.json").is_file());

        // The plan on disk carries the real run id, not the planner's echo.
        let plan: BuildPlan =
            crate::io::artifacts::read_json(&run_dir.join("build_plan.json")).expect("plan");
        assert_eq!(plan.run_id, summary.run_id);

        let log = fs::read_to_string(run_dir.join("callbacks.log.jsonl")).expect("log");
        assert_eq!(log.lines().count(), 2);
        let first: Value = serde_json::from_str(log.lines().next().expect("line")).expect("json");
        assert_eq!(first["task_id"], "task-1");
        assert_eq!(first["status"], "success");
    }

    #[test]
    fn oversized_plan_is_fatal_but_summary_is_written() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut outputs = spine_outputs();
        outputs[2] = json!({
            "run_id": "x",
            "planned_tasks": (1..=4).map(|i| json!({
                "task_id": format!("task-{i}"),
                "owner": "core-owner",
                "description": "d",
            })).collect::<Vec<_>>(),
        });
        let worker = ScriptedWorker::new(outputs);

        let err = run_pipeline(temp.path(), "spec", &worker, &PipelineConfig::default())
            .expect_err("cap violation");
        assert!(format!("{err:#}").contains("at most 3"));

        let summaries: Vec<_> = fs::read_dir(temp.path().join("artifacts"))
            .expect("artifacts")
            .map(|e| e.expect("entry").path().join("run_summary.json"))
            .collect();
        assert_eq!(summaries.len(), 1);
        let summary: crate::core::types::RunSummary =
            crate::io::artifacts::read_json(&summaries[0]).expect("summary");
        assert!(summary.error.as_deref().unwrap_or_default().contains("at most 3"));
        assert!(summary.build_plan.is_none());
    }

    #[test]
    fn task_id_mismatch_fails_that_task_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut outputs = spine_outputs();
        outputs.push(manifest("wrong-id", "a.py", "x"));
        outputs.push(manifest("task-2", "b.py", "y"));
        let worker = ScriptedWorker::new(outputs);

        let summary = run_pipeline(temp.path(), "spec", &worker, &PipelineConfig::default())
            .expect("run completes");

        assert_eq!(summary.task_results[0].status, TaskStatus::Failed);
        assert!(summary.task_results[0].blocking_issues[0].contains("wrong-id"));
        assert_eq!(summary.task_results[1].status, TaskStatus::Success);
        let run_dir = temp.path().join("artifacts").join(&summary.run_id);
        assert!(!run_dir.join("generated_app/a.py").exists());
        assert!(run_dir.join("generated_app/b.py").is_file());
        // The baseline survives partial failure.
        for rel in crate::io::skeleton::BASELINE_FILES {
            assert!(
                run_dir.join("generated_app").join(rel).is_file(),
                "missing baseline {rel}"
            );
        }
    }

    #[test]
    fn worker_failure_is_isolated_to_its_task() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut outputs = spine_outputs();
        outputs.push(Value::Null); // ScriptedWorker treats null as "write nothing"
        outputs.push(manifest("task-2", "b.py", "y"));
        let worker = ScriptedWorker::new(outputs);

        let summary = run_pipeline(temp.path(), "spec", &worker, &PipelineConfig::default())
            .expect("run completes");

        assert_eq!(summary.task_results[0].status, TaskStatus::Failed);
        assert!(summary.task_results[0].blocking_issues[0].contains("missing worker output"));
        assert_eq!(summary.task_results[1].status, TaskStatus::Success);

        let log = fs::read_to_string(
            temp.path()
                .join("artifacts")
                .join(&summary.run_id)
                .join("callbacks.log.jsonl"),
        )
        .expect("log");
        assert_eq!(log.lines().count(), 2);
    }

    #[test]
    fn unsafe_manifest_path_aborts_the_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut outputs = spine_outputs();
        outputs.push(manifest("task-1", "../escape.py", "x"));
        let worker = ScriptedWorker::new(outputs);

        let err = run_pipeline(temp.path(), "spec", &worker, &PipelineConfig::default())
            .expect_err("unsafe path");
        assert!(format!("{err:#}").contains("unsafe path"));
        assert!(!temp.path().join("escape.py").exists());
    }

    #[test]
    fn protected_baseline_files_survive_manifests() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut outputs = spine_outputs();
        outputs.push(manifest("task-1", "pyproject.toml", "hijacked"));
        outputs.push(manifest("task-2", "b.py", "y"));
        let worker = ScriptedWorker::new(outputs);

        let summary = run_pipeline(temp.path(), "spec", &worker, &PipelineConfig::default())
            .expect("run");
        assert!(summary.warnings.iter().any(|w| w.contains("pyproject.toml")));

        let pyproject = temp
            .path()
            .join("artifacts")
            .join(&summary.run_id)
            .join("generated_app/pyproject.toml");
        let contents = fs::read_to_string(pyproject).expect("read");
        assert!(contents.contains("generated_app"));
        assert!(!contents.contains("hijacked"));
    }
}
