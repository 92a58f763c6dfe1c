//! Sandboxed manifest application.
//!
//! Takes a worker's [`FileManifest`] and materializes it under the run's
//! `generated_app/` directory. Textual path checks come from
//! [`crate::core::manifest`]; this module adds the filesystem half: resolved
//! paths must stay inside the target root even through symlinks.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::manifest::{
    ContentMode, FileManifest, extract_fenced_code, has_hidden_segment, is_unsafe_relpath,
    normalize_entry_path,
};

/// A manifest entry the applier refuses to write. All variants are fatal for
/// the run: a worker that emits one cannot be trusted about the rest of its
/// manifest.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("unsafe path in manifest: {path:?}")]
    UnsafePath { path: String },

    #[error("hidden path segment in manifest: {path:?}")]
    HiddenPath { path: String },

    #[error("path resolves outside the output root: {path:?}")]
    OutsideRoot { path: String },

    #[error("file too large: {path:?} is {size} bytes (limit {limit})")]
    FileTooLarge { path: String, size: usize, limit: usize },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ApplyError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }
}

/// What a manifest application produced.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Absolute paths actually written, in manifest order.
    pub written_files: Vec<String>,
    /// Non-fatal notices (skips, fence fallbacks).
    pub warnings: Vec<String>,
}

/// Write a manifest's files under `target_root`.
///
/// Entries are processed in order. An entry naming a `protected` path is
/// skipped with a warning whether or not the file exists yet; generated
/// output never claims a baseline path. An unsafe or oversized entry aborts
/// the whole application with an [`ApplyError`] — earlier entries stay
/// written.
pub fn apply_manifest(
    manifest: &FileManifest,
    target_root: &Path,
    protected: &[&str],
    max_file_bytes: usize,
) -> Result<ApplyOutcome, ApplyError> {
    let mut outcome = ApplyOutcome::default();

    for entry in &manifest.files {
        let rel = normalize_entry_path(&entry.path);
        if is_unsafe_relpath(&rel) {
            return Err(ApplyError::UnsafePath { path: entry.path.clone() });
        }
        if has_hidden_segment(&rel) {
            return Err(ApplyError::HiddenPath { path: entry.path.clone() });
        }

        if protected.contains(&rel.as_str()) {
            warn!(path = %rel, "skipping protected baseline file");
            outcome
                .warnings
                .push(format!("skipped protected baseline file {rel}"));
            continue;
        }

        let target = resolve_contained(target_root, &rel)?;
        if !entry.overwrite && target.exists() {
            debug!(path = %rel, "skipping existing file (overwrite=false)");
            continue;
        }

        let content = match entry.content_mode {
            ContentMode::Literal => entry.content.clone(),
            ContentMode::FencedCode => {
                let (inner, fell_back) = extract_fenced_code(&entry.content);
                if fell_back {
                    warn!(path = %rel, "no fenced code block found, writing content literally");
                    outcome
                        .warnings
                        .push(format!("no fenced code block in {rel}, wrote content literally"));
                }
                inner
            }
        };

        if content.len() > max_file_bytes {
            return Err(ApplyError::FileTooLarge {
                path: rel,
                size: content.len(),
                limit: max_file_bytes,
            });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ApplyError::io(format!("create directory {}", parent.display()), e))?;
        }
        // Directories created above may themselves be symlinks planted by an
        // earlier entry's target tree; re-check before the actual write.
        let target = resolve_contained(target_root, &rel)?;
        fs::write(&target, content)
            .map_err(|e| ApplyError::io(format!("write {}", target.display()), e))?;
        let written = fs::canonicalize(&target)
            .map_err(|e| ApplyError::io(format!("resolve {}", target.display()), e))?;

        debug!(path = %rel, "wrote manifest entry");
        outcome.written_files.push(written.to_string_lossy().into_owned());
    }

    info!(
        task_id = %manifest.task_id,
        written = outcome.written_files.len(),
        warnings = outcome.warnings.len(),
        "manifest applied"
    );
    Ok(outcome)
}

/// Resolve `rel` under `root` and verify the result cannot escape `root`.
///
/// The target may not exist yet, so canonicalize the deepest existing
/// ancestor and check containment there. This catches symlinked directories
/// that textual checks cannot see.
fn resolve_contained(root: &Path, rel: &str) -> Result<PathBuf, ApplyError> {
    let canonical_root = fs::canonicalize(root)
        .map_err(|e| ApplyError::io(format!("resolve output root {}", root.display()), e))?;
    let candidate = root.join(rel);

    let mut existing = candidate.as_path();
    while !existing.exists() {
        existing = existing
            .parent()
            .ok_or_else(|| ApplyError::OutsideRoot { path: rel.to_string() })?;
    }
    let resolved = fs::canonicalize(existing)
        .map_err(|e| ApplyError::io(format!("resolve {}", existing.display()), e))?;
    if !resolved.starts_with(&canonical_root) {
        return Err(ApplyError::OutsideRoot { path: rel.to_string() });
    }
    Ok(candidate)
}
