//! File manifest types and path-safety predicates.
//!
//! A manifest is a worker's proposed set of files for one planned task. The
//! predicates here are the textual half of the applier's safety rules; they
//! are pure so they can be tested exhaustively without touching a
//! filesystem. The filesystem half (resolved-path containment) lives in
//! [`crate::io::apply`].

use std::path::{Component, Path};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

static FENCE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"```[^\n]*\n([\s\S]*?)\n```").unwrap());

/// How a [`FileEntry`]'s content should be materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    /// Write content as-is.
    #[default]
    Literal,
    /// Extract the first triple-backtick code block and write its inner text.
    FencedCode,
}

/// A single file to be written under the run's generated output tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub content_mode: ContentMode,
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

fn default_overwrite() -> bool {
    true
}

/// A worker's proposed set of files for one planned task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub task_id: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Normalize a manifest path from worker output.
///
/// Workers commonly echo the `generated_app/` prefix back even though entry
/// paths are relative to that directory; strip it and unify separators.
pub fn normalize_entry_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    match unified.strip_prefix("generated_app/") {
        Some(stripped) => stripped.to_string(),
        None => unified,
    }
}

/// Reject absolute paths, home markers, drive-letter prefixes, surrounding
/// whitespace, and parent-directory traversal anywhere in the path.
pub fn is_unsafe_relpath(path: &str) -> bool {
    if path.is_empty() || path.trim() != path {
        return true;
    }
    if path.starts_with('/') || path.starts_with('\\') || path.starts_with('~') {
        return true;
    }
    let first = path.split(['/', '\\']).next().unwrap_or_default();
    if first.contains(':') {
        return true;
    }
    Path::new(path)
        .components()
        .any(|part| matches!(part, Component::ParentDir))
}

/// Reject any path segment that begins with a dot. Generated output must not
/// contain hidden files.
pub fn has_hidden_segment(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|part| part.as_os_str().to_string_lossy().starts_with('.'))
}

/// Extract the first fenced code block's inner text.
///
/// Returns `(content, fell_back)`. Workers sometimes declare `fenced_code`
/// without actually emitting fences; fall back to the literal content so a
/// formatting slip never hard-fails a run.
pub fn extract_fenced_code(content: &str) -> (String, bool) {
    match FENCE_RE.captures(content) {
        Some(caps) => (caps[1].to_string(), false),
        None => (content.to_string(), true),
    }
}
