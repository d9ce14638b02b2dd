//! CLI for the agent run orchestrator.
//!
//! One `run` invocation launches one external coding agent against one
//! task and records the outcome under the log tree. `heartbeat` and
//! `notify` are small operational helpers for the surrounding scheduler.

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};

use agent_runner::core::types::AgentKind;
use agent_runner::exit_codes;
use agent_runner::heartbeat::run_heartbeat;
use agent_runner::io::agents::CliExecutor;
use agent_runner::io::config::Config;
use agent_runner::io::notify::{Notification, Notify, NtfyNotifier};
use agent_runner::logging;
use agent_runner::run::{RunOptions, execute_run};

#[derive(Parser)]
#[command(
    name = "agent-runner",
    version,
    about = "Launch a coding agent against a task and record the run"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one agent against one task and record the outcome.
    Run(RunArgs),
    /// Append a liveness stamp to the heartbeat logs.
    Heartbeat,
    /// Send a standalone notification to the configured topic.
    Notify(NotifyArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Agent to launch (codex|claude|gemini|kilo|ollama|opencode|qwen).
    #[arg(long)]
    agent: String,
    /// Task name from the registry.
    #[arg(long)]
    task: String,
    /// Raise dev diagnostics to debug level.
    #[arg(long)]
    debug: bool,
    /// Substitute an alternate prompt from the catalogue.
    #[arg(long)]
    debug_prompt: Option<String>,
    /// Skip agent execution and record a synthetic result.
    #[arg(long)]
    dry_run: bool,
    /// Wall-clock limit for the agent, in seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args)]
struct NotifyArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    body: String,
    /// min|lowest|low|default|high|max|urgent (unknown maps to default).
    #[arg(long, default_value = "default")]
    priority: String,
    /// Comma-separated tag list.
    #[arg(long, default_value = "")]
    tags: String,
    /// Mark as a test message (minimum priority, "[test]" title prefix).
    #[arg(long)]
    test: bool,
}

fn main() {
    let cli = Cli::parse();
    let debug = matches!(&cli.command, Command::Run(args) if args.debug);
    logging::init(debug);
    match dispatch(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILURE);
        }
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    let cfg = Config::load()?;
    match cli.command {
        Command::Run(args) => {
            let agent = AgentKind::from_name(&args.agent).ok_or_else(|| {
                anyhow!(
                    "unknown agent '{}' (known: {})",
                    args.agent,
                    AgentKind::names().join(", ")
                )
            })?;
            let opts = RunOptions {
                agent,
                task: args.task,
                debug_prompt: args.debug_prompt,
                dry_run: args.dry_run,
                timeout_secs: args.timeout,
            };
            let executor = CliExecutor {
                agent,
                task_name: opts.task.clone(),
                config: cfg.clone(),
            };
            let notifier = NtfyNotifier::new(&cfg.ntfy_server, &cfg.ntfy_topic)?;
            execute_run(&cfg, &opts, &executor, &notifier)
        }
        Command::Heartbeat => {
            run_heartbeat(&cfg)?;
            Ok(exit_codes::OK)
        }
        Command::Notify(args) => {
            let notifier = NtfyNotifier::new(&cfg.ntfy_server, &cfg.ntfy_topic)?;
            let (title, priority) = if args.test {
                (format!("[test] {}", args.title), "min".to_string())
            } else {
                (args.title, args.priority)
            };
            notifier.send(&Notification {
                title,
                body: args.body,
                priority,
                tags: args.tags,
            })?;
            Ok(exit_codes::OK)
        }
    }
}
