//! I/O helpers for pipeline phases.

pub mod apply;
pub mod artifacts;
pub mod brief;
pub mod config;
pub mod process;
pub mod skeleton;
pub mod worker;
