//! Spec-to-project generation pipeline CLI.
//!
//! `forge run` drives a specification through intake, design, and plan, then
//! fans out at most three worker tasks and materializes their manifests
//! under `artifacts/<run_id>/generated_app/`. `forge provision` creates the
//! baseline skeleton in an arbitrary directory without running a pipeline.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use forge::exit_codes;
use forge::io::config::load_config;
use forge::io::skeleton::ensure_skeleton;
use forge::io::worker::CodexWorker;
use forge::logging;
use forge::pipeline::run_pipeline;

#[derive(Parser)]
#[command(
    name = "forge",
    version,
    about = "Staged spec-to-project generation pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline against a specification.
    Run {
        /// Path to the specification file.
        spec_file: Option<PathBuf>,
        /// Specification text given directly on the command line.
        #[arg(long, conflicts_with = "spec_file")]
        inline: Option<String>,
        /// Project root; artifacts land under `<root>/artifacts/`.
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Config file path (default: `<root>/forge.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Create the baseline application skeleton in a directory.
    Provision {
        /// Target directory; created if missing, existing files untouched.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::FATAL);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { spec_file, inline, root, config } => {
            cmd_run(spec_file, inline, root, config)
        }
        Command::Provision { dir } => cmd_provision(dir),
    }
}

fn cmd_run(
    spec_file: Option<PathBuf>,
    inline: Option<String>,
    root: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let spec_text = match (spec_file, inline) {
        (Some(path), None) => fs::read_to_string(&path)
            .with_context(|| format!("read specification {}", path.display()))?,
        (None, Some(text)) => text,
        (None, None) => bail!("provide a specification file or --inline text"),
        (Some(_), Some(_)) => unreachable!("clap rejects conflicting spec inputs"),
    };
    if spec_text.trim().is_empty() {
        bail!("specification is empty");
    }

    let config_path = config_path.unwrap_or_else(|| root.join("forge.toml"));
    let config = load_config(&config_path)?;

    let summary = run_pipeline(&root, &spec_text, &CodexWorker, &config)?;
    let failed = summary
        .task_results
        .iter()
        .filter(|result| result.status == forge::core::types::TaskStatus::Failed)
        .count();
    println!(
        "run {} finished: {} task(s), {} failed, {} file(s) written",
        summary.run_id,
        summary.task_results.len(),
        failed,
        summary.written_files.len()
    );
    for result in &summary.task_results {
        println!("  {} [{}]: {}", result.task_id, result.owner, result.status.as_str());
    }
    println!(
        "summary: {}",
        root.join("artifacts")
            .join(&summary.run_id)
            .join("run_summary.json")
            .display()
    );
    Ok(())
}

fn cmd_provision(dir: PathBuf) -> Result<()> {
    let written = ensure_skeleton(&dir)?;
    println!("provisioned {} file(s) in {}", written.len(), dir.display());
    Ok(())
}
