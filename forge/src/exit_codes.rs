//! Stable exit codes for forge CLI commands.

/// Command succeeded. Failed tasks inside an otherwise-complete run still
/// exit 0; consult `run_summary.json` for per-task status.
pub const OK: i32 = 0;
/// Fatal error: bad input, an invalid plan, a safety violation while
/// applying a manifest, or an I/O failure.
pub const FATAL: i32 = 1;
