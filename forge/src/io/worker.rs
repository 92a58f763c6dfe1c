//! Worker abstraction for generative stage and task invocations.
//!
//! The [`Worker`] trait decouples the pipeline from the actual generative
//! backend (currently `codex exec`). Tests use scripted workers that return
//! predetermined outputs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Parameters for a single worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    /// Canonical owner id this invocation runs as.
    pub owner: String,
    /// Working directory for the worker process.
    pub workdir: PathBuf,
    /// Brief text to feed to the worker.
    pub brief: String,
    /// Path to the JSON Schema that constrains worker output.
    pub output_schema_path: PathBuf,
    /// Path where the worker must write its output JSON.
    pub output_path: PathBuf,
    /// Path to write worker stdout/stderr log.
    pub worker_log_path: PathBuf,
    /// Maximum time to wait for the worker to complete.
    pub timeout: Duration,
    /// Truncate worker output logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over generative worker backends.
pub trait Worker {
    /// Run the worker with the given request. Must write output to
    /// `request.output_path`.
    fn invoke(&self, request: &WorkerRequest) -> Result<()>;
}

/// Worker that spawns `codex exec`.
pub struct CodexWorker;

impl Worker for CodexWorker {
    #[instrument(skip_all, fields(owner = %request.owner, timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &WorkerRequest) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting codex exec");

        if !request.output_schema_path.exists() {
            return Err(anyhow!(
                "missing output schema {}",
                request.output_schema_path.display()
            ));
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        let mut cmd = Command::new("codex");
        cmd.arg("exec")
            .arg("--sandbox")
            .arg("workspace-write")
            // Allow running in directories without a git repository. Required
            // for tests that use temp directories, and for artifact trees not
            // under version control.
            .arg("--skip-git-repo-check")
            .arg("--output-schema")
            .arg(&request.output_schema_path)
            .arg("--output-last-message")
            .arg(&request.output_path)
            .arg("-")
            .current_dir(&request.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(request.brief.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run codex exec")?;

        write_worker_log(&request.worker_log_path, &output, request.output_limit_bytes)?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "codex exec timed out");
            return Err(anyhow!("codex exec timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "codex exec failed");
            return Err(anyhow!(
                "codex exec failed with status {:?}",
                output.status.code()
            ));
        }

        debug!("codex exec completed successfully");
        Ok(())
    }
}

/// Invoke the worker, then load and schema-check its output.
///
/// Schema validation runs before deserialization so a malformed output is
/// reported with instance paths instead of a serde type error.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn invoke_and_load<W: Worker + ?Sized, T: DeserializeOwned>(
    worker: &W,
    request: &WorkerRequest,
) -> Result<T> {
    worker.invoke(request)?;
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing worker output {}",
            request.output_path.display()
        ));
    }
    let contents = fs::read_to_string(&request.output_path)
        .with_context(|| format!("read worker output {}", request.output_path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", request.output_path.display()))?;
    validate_schema(&request.output_schema_path, &value)?;
    serde_json::from_value(value)
        .with_context(|| format!("deserialize {}", request.output_path.display()))
}

/// Validate a JSON value against a Draft 2020-12 schema file.
pub fn validate_schema(schema_path: &Path, value: &serde_json::Value) -> Result<()> {
    let schema_contents = fs::read_to_string(schema_path)
        .with_context(|| format!("read schema {}", schema_path.display()))?;
    let schema: serde_json::Value = serde_json::from_str(&schema_contents)
        .with_context(|| format!("parse schema {}", schema_path.display()))?;
    let validator = jsonschema::options()
        .with_draft(jsonschema::Draft::Draft202012)
        .build(&schema)
        .with_context(|| format!("compile schema {}", schema_path.display()))?;

    let messages: Vec<String> = validator
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "output does not match schema {}:\n- {}",
            schema_path.display(),
            messages.join("\n- ")
        ))
    }
}

/// Materialize a bundled schema next to the run's state files so the worker
/// backend can read it from disk.
pub fn write_output_schema(path: &Path, schema_text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create schema dir {}", parent.display()))?;
    }
    fs::write(path, schema_text).with_context(|| format!("write schema {}", path.display()))
}

fn write_worker_log(path: &Path, output: &CommandOutput, output_limit: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create worker log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str(&output.stdout_truncated_notice("worker"));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.stderr_truncated_notice("worker"));
    if output.timed_out {
        buf.push_str("\n[worker timed out]\n");
    }

    if buf.len() > output_limit {
        // The limit is in bytes; back off to a char boundary so the slice
        // cannot split a multibyte character.
        let mut cut = output_limit;
        while !buf.is_char_boundary(cut) {
            cut -= 1;
        }
        let truncated = format!("{}\n[truncated {} bytes]\n", &buf[..cut], buf.len() - cut);
        fs::write(path, truncated)
            .with_context(|| format!("write worker log {}", path.display()))?;
        return Ok(());
    }

    fs::write(path, buf).with_context(|| format!("write worker log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Output {
        summary: String,
    }

    struct FakeWorker {
        output: Option<serde_json::Value>,
    }

    impl Worker for FakeWorker {
        fn invoke(&self, request: &WorkerRequest) -> Result<()> {
            if let Some(output) = &self.output {
                let mut buf = serde_json::to_string_pretty(output)?;
                buf.push('\n');
                fs::write(&request.output_path, buf)?;
            }
            Ok(())
        }
    }

    fn request_in(dir: &Path) -> WorkerRequest {
        WorkerRequest {
            owner: "core-owner".to_string(),
            workdir: dir.to_path_buf(),
            brief: "brief".to_string(),
            output_schema_path: dir.join("schema.json"),
            output_path: dir.join("output.json"),
            worker_log_path: dir.join("worker.log"),
            timeout: Duration::from_secs(1),
            output_limit_bytes: 1000,
        }
    }

    fn write_summary_schema(path: &Path) {
        let schema = json!({
            "type": "object",
            "required": ["summary"],
            "properties": {"summary": {"type": "string"}},
        });
        fs::write(path, schema.to_string()).expect("write schema");
    }

    #[test]
    fn invoke_and_load_reads_valid_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request_in(temp.path());
        write_summary_schema(&request.output_schema_path);
        let fake = FakeWorker { output: Some(json!({"summary": "ok"})) };

        let output: Output = invoke_and_load(&fake, &request).expect("load");
        assert_eq!(output.summary, "ok");
    }

    #[test]
    fn invoke_and_load_errors_on_missing_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request_in(temp.path());
        write_summary_schema(&request.output_schema_path);
        let fake = FakeWorker { output: None };

        let err = invoke_and_load::<_, Output>(&fake, &request).unwrap_err();
        assert!(err.to_string().contains("missing worker output"));
    }

    #[test]
    fn worker_log_truncation_respects_char_boundaries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cmd = std::process::Command::new("sh");
        cmd.args(["-c", "printf 'ééééé'"]);
        let output = run_command_with_timeout(cmd, None, Duration::from_secs(5), 1000)
            .expect("run");

        // Byte 16 of the formatted log falls inside a two-byte character;
        // truncation must back off instead of panicking.
        let log_path = temp.path().join("worker.log");
        write_worker_log(&log_path, &output, 16).expect("log written");

        let contents = fs::read_to_string(&log_path).expect("read");
        assert!(contents.contains("[truncated"));
        assert!(!contents.contains('\u{fffd}'));
    }

    #[test]
    fn invoke_and_load_rejects_schema_violations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = request_in(temp.path());
        write_summary_schema(&request.output_schema_path);
        let fake = FakeWorker { output: Some(json!({"summary": 42})) };

        let err = invoke_and_load::<_, Output>(&fake, &request).unwrap_err();
        assert!(err.to_string().contains("does not match schema"));
    }
}
