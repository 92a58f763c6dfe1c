//! Spec-to-project generation pipeline.
//!
//! Takes a free-form product specification and drives it through a staged
//! spine (intake, design, plan) and a bounded fan-out of generative worker
//! invocations, materializing the result as a runnable application under a
//! sandboxed output tree. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan invariants, path safety,
//!   owner resolution). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (artifact tree, process
//!   execution, manifest application). Isolated to enable scripted workers
//!   in tests.
//!
//! [`pipeline`] coordinates core logic with I/O to implement the CLI
//! commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
