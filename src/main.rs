//! Crane - multi-agent review conversations
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crane::cli::{run_conversation, RunRequest};
use crane::core::AgentRole;
use crane::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Crane - reviewers critique, a moderator summarizes, a feedback agent rewrites
#[derive(Parser, Debug)]
#[command(name = "crane")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Change request text
    #[arg(long, short = 't', conflicts_with = "task_file")]
    task: Option<String>,

    /// Read the change request from a file
    #[arg(long)]
    task_file: Option<PathBuf>,

    /// File holding the artifact under review
    #[arg(long, short = 'i')]
    input_file: Option<PathBuf>,

    /// Label for the feedback output record
    #[arg(long)]
    change_name: Option<String>,

    /// Let a human play one role (moderator, reviewer or feedback)
    #[arg(long)]
    human_role: Option<AgentRole>,

    /// Override the number of iterations
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if args.print_config {
        println!("{}", Config::default_config_toml());
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;

    // CLI overrides
    if let Some(change_name) = args.change_name {
        config.run.change_name = change_name;
    }
    if let Some(role) = args.human_role {
        config.run.human_role = Some(role);
    }
    if let Some(max_iterations) = args.max_iterations {
        config.run.max_iterations = max_iterations;
    }

    let task = match (args.task, args.task_file) {
        (Some(task), _) => task,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading task from {}", path.display()))?,
        (None, None) => anyhow::bail!("a change request is required (--task or --task-file)"),
    };

    let input = match args.input_file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading input from {}", path.display()))?,
        None => String::new(),
    };

    info!("Starting Crane");

    let report = run_conversation(&config, &RunRequest { task, input }).await?;

    println!("{}", report.status_line());
    if report.token_usage.total_tokens > 0 {
        println!(
            "tokens: {} prompt, {} completion, {} total",
            report.token_usage.prompt_tokens,
            report.token_usage.completion_tokens,
            report.token_usage.total_tokens
        );
    }
    if !report.final_input.is_empty() {
        println!("\n{}", report.final_input);
    }

    if !report.is_completed() {
        std::process::exit(1);
    }
    Ok(())
}
