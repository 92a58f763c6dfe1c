//! Development-time tracing for debugging the pipeline.
//!
//! Tracing here is dev diagnostics via `RUST_LOG`, output to stderr, never
//! persisted. Product observability lives in the run artifacts instead:
//! `callbacks.log.jsonl` and `run_summary.json` are always written,
//! unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=forge=debug cargo run -- run spec.md
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
