//! Durable run artifacts: identifiers, directory layout, event log, and
//! JSON codecs.
//!
//! Everything a run produces lives under `artifacts/<run_id>/`. The event
//! log is append-only newline-delimited JSON so a crashed run can still be
//! diagnosed post hoc; `run_summary.json` is the queryable record written at
//! the end.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// All canonical paths of one run under `artifacts/<run_id>/`.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub run_id: String,
    pub artifacts_dir: PathBuf,
    pub generated_app_dir: PathBuf,
    pub manifests_dir: PathBuf,
    pub state_dir: PathBuf,
    pub spec_path: PathBuf,
    pub event_log_path: PathBuf,
    pub spec_pack_path: PathBuf,
    pub design_pack_path: PathBuf,
    pub build_plan_path: PathBuf,
    pub summary_path: PathBuf,
}

impl RunPaths {
    pub fn new(root: impl Into<PathBuf>, run_id: &str) -> Self {
        let artifacts_dir = root.into().join("artifacts").join(run_id);
        Self {
            run_id: run_id.to_string(),
            generated_app_dir: artifacts_dir.join("generated_app"),
            manifests_dir: artifacts_dir.join("manifests"),
            state_dir: artifacts_dir.join("state"),
            spec_path: artifacts_dir.join("spec.md"),
            event_log_path: artifacts_dir.join("callbacks.log.jsonl"),
            spec_pack_path: artifacts_dir.join("spec_pack.json"),
            design_pack_path: artifacts_dir.join("design_pack.json"),
            build_plan_path: artifacts_dir.join("build_plan.json"),
            summary_path: artifacts_dir.join("run_summary.json"),
            artifacts_dir,
        }
    }

    /// Where a task's manifest is persisted.
    pub fn manifest_path(&self, task_id: &str) -> PathBuf {
        self.manifests_dir.join(format!("{task_id}.json"))
    }
}

/// Generate a lexically sortable run id (UTC, second granularity).
///
/// Second granularity means concurrent invocations can collide; callers must
/// reserve the id against the artifacts tree via [`unique_run_id`] rather
/// than assuming uniqueness.
pub fn new_run_id() -> String {
    Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}

/// Reserve a run id with no existing artifacts directory.
///
/// Same-second collisions get a numeric suffix instead of silently reusing a
/// prior run's directory.
pub fn unique_run_id(root: &Path, base: &str) -> Result<String> {
    for suffix in 1..=999u32 {
        let id = if suffix == 1 {
            base.to_string()
        } else {
            format!("{base}-{suffix}")
        };
        if !root.join("artifacts").join(&id).exists() {
            return Ok(id);
        }
    }
    Err(anyhow!(
        "unable to reserve a run id from base '{base}' (too many existing run directories)"
    ))
}

/// Create the run's directory layout. Idempotent: existing directories are
/// left as-is.
pub fn init_run(root: &Path, run_id: &str) -> Result<RunPaths> {
    let paths = RunPaths::new(root, run_id);
    for dir in [
        &paths.artifacts_dir,
        &paths.generated_app_dir,
        &paths.manifests_dir,
        &paths.state_dir,
    ] {
        fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    }
    debug!(run_id, artifacts_dir = %paths.artifacts_dir.display(), "run directories ready");
    Ok(paths)
}

/// Persist the input specification text into the run directory.
pub fn write_spec(paths: &RunPaths, spec_text: &str) -> Result<()> {
    fs::write(&paths.spec_path, spec_text)
        .with_context(|| format!("write {}", paths.spec_path.display()))
}

/// Create the event log if missing. Never truncates an existing log.
pub fn ensure_event_log(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, "").with_context(|| format!("create event log {}", path.display()))
}

/// Append one newline-delimited JSON record to the event log.
///
/// Opens in append mode so prior records are never rewritten.
pub fn append_event<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(record).context("serialize event record")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open event log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append to event log {}", path.display()))
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Serialize `value` to pretty-printed JSON with trailing newline,
/// creating parent directories as needed. Overwrites.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        task_id: String,
        status: String,
    }

    #[test]
    fn init_run_creates_layout_and_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_run(temp.path(), "20260101T000000Z").expect("init");

        assert!(paths.artifacts_dir.is_dir());
        assert!(paths.generated_app_dir.is_dir());
        assert!(paths.manifests_dir.is_dir());
        assert!(paths.state_dir.is_dir());

        // A second init over the same directories must not fail.
        init_run(temp.path(), "20260101T000000Z").expect("re-init");
    }

    #[test]
    fn unique_run_id_suffixes_on_collision() {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = "20260101T000000Z";

        assert_eq!(unique_run_id(temp.path(), base).expect("fresh"), base);

        fs::create_dir_all(temp.path().join("artifacts").join(base)).expect("occupy base");
        assert_eq!(
            unique_run_id(temp.path(), base).expect("suffixed"),
            format!("{base}-2")
        );

        fs::create_dir_all(temp.path().join("artifacts").join(format!("{base}-2")))
            .expect("occupy suffix");
        assert_eq!(
            unique_run_id(temp.path(), base).expect("suffixed again"),
            format!("{base}-3")
        );
    }

    #[test]
    fn append_event_accumulates_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("callbacks.log.jsonl");
        ensure_event_log(&log).expect("ensure");

        append_event(&log, &Record { task_id: "t1".into(), status: "success".into() })
            .expect("append 1");
        append_event(&log, &Record { task_id: "t2".into(), status: "failed".into() })
            .expect("append 2");

        let contents = fs::read_to_string(&log).expect("read log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Record = serde_json::from_str(lines[0]).expect("parse line 1");
        assert_eq!(first.task_id, "t1");
        let second: Record = serde_json::from_str(lines[1]).expect("parse line 2");
        assert_eq!(second.status, "failed");
    }

    #[test]
    fn ensure_event_log_never_truncates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("callbacks.log.jsonl");
        fs::write(&log, "{\"prior\":true}\n").expect("seed");

        ensure_event_log(&log).expect("ensure");
        let contents = fs::read_to_string(&log).expect("read");
        assert_eq!(contents, "{\"prior\":true}\n");
    }

    #[test]
    fn json_round_trips_pretty_with_trailing_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("record.json");
        let record = Record { task_id: "t1".into(), status: "success".into() };

        write_json(&path, &record).expect("write");
        let raw = fs::read_to_string(&path).expect("read raw");
        assert!(raw.ends_with('\n'));
        assert!(raw.contains("  \"task_id\""));

        let loaded: Record = read_json(&path).expect("read");
        assert_eq!(loaded, record);
    }

    #[test]
    fn run_id_shape_is_lexically_sortable() {
        let id = new_run_id();
        assert_eq!(id.len(), "20260101T000000Z".len());
        assert!(id.ends_with('Z'));
        assert!(id.chars().filter(|c| *c == 'T').count() == 1);
    }
}
