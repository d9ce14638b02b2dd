//! Agent descriptors, argv templates and the executor seam.
//!
//! Each supported agent maps to a fixed argv template; the prompt is
//! always the final positional argument. The [`AgentExecutor`] trait
//! decouples orchestration from process spawning so tests can script
//! outcomes without children.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::error::{FailureKind, RunFailure};
use crate::core::types::{AgentKind, ProcessResult};
use crate::io::config::Config;
use crate::io::process::run_streamed;

/// The task whose codex runs depend on an auxiliary MCP server.
const MCP_PREFLIGHT_TASK: &str = "agent_management";

/// How to launch one agent: binary, argv pieces and environment overlay.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub name: &'static str,
    pub binary: PathBuf,
    /// Optional first positional argument (e.g. `exec`).
    pub subcommand: Option<String>,
    /// Ordered extra args appended after the template, before the prompt.
    pub base_args: Vec<String>,
    /// Environment overlay; always carries a `PATH` entry. The `PATH`
    /// value replaces the parent's.
    pub env: Vec<(String, String)>,
}

pub fn descriptor(agent: AgentKind, cfg: &Config) -> AgentDescriptor {
    let subcommand = match agent {
        AgentKind::Codex => Some("exec".to_string()),
        AgentKind::Ollama => Some("launch".to_string()),
        AgentKind::Opencode => Some("run".to_string()),
        _ => None,
    };
    AgentDescriptor {
        name: agent.name(),
        binary: cfg.binary(agent),
        subcommand,
        base_args: Vec::new(),
        env: vec![("PATH".to_string(), overlay_path(cfg))],
    }
}

fn overlay_path(cfg: &Config) -> String {
    let parent = env::var("PATH").unwrap_or_default();
    match &cfg.path_prefix {
        Some(prefix) => format!("{}:{parent}", prefix.display()),
        None => parent,
    }
}

/// A fully resolved agent invocation, ready to spawn.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    /// Everything between the binary and the trailing prompt.
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Set when the agent is instructed to write its final message to a file.
    pub last_message_path: Option<PathBuf>,
}

/// Assemble the per-agent argv template.
pub fn build_invocation(
    agent: AgentKind,
    cfg: &Config,
    last_message_path: &Path,
) -> Invocation {
    let desc = descriptor(agent, cfg);
    let repo = cfg.repo_root.display().to_string();
    let (mut args, cwd, last_message): (Vec<String>, Option<PathBuf>, Option<PathBuf>) = match agent
    {
        AgentKind::Codex => {
            let last = last_message_path.to_path_buf();
            let mut args = vec![
                "--config".to_string(),
                "model_reasoning_effort=high".to_string(),
                "--search".to_string(),
                desc.subcommand.clone().unwrap_or_else(|| "exec".to_string()),
                "-C".to_string(),
                repo,
                "--sandbox".to_string(),
                "workspace-write".to_string(),
                "--full-auto".to_string(),
                "--ephemeral".to_string(),
                "-o".to_string(),
            ];
            args.push(last.display().to_string());
            (args, None, Some(last))
        }
        AgentKind::Claude => (
            vec![
                "-p".to_string(),
                "--model".to_string(),
                "sonnet".to_string(),
                "--effort".to_string(),
                "high".to_string(),
                "--dangerously-skip-permissions".to_string(),
                "--no-session-persistence".to_string(),
            ],
            Some(cfg.repo_root.clone()),
            None,
        ),
        AgentKind::Gemini => (
            vec![
                "--model".to_string(),
                cfg.gemini_model.clone(),
                "--output-format".to_string(),
                "json".to_string(),
                "--prompt".to_string(),
            ],
            None,
            None,
        ),
        AgentKind::Ollama => (
            vec![
                desc.subcommand
                    .clone()
                    .unwrap_or_else(|| "launch".to_string()),
                "claude".to_string(),
                "--model".to_string(),
                cfg.ollama_model.clone(),
                "--".to_string(),
                "-p".to_string(),
                "--dangerously-skip-permissions".to_string(),
                "--no-session-persistence".to_string(),
            ],
            Some(cfg.repo_root.clone()),
            None,
        ),
        AgentKind::Kilo => (Vec::new(), None, None),
        AgentKind::Opencode => (
            vec![desc.subcommand.clone().unwrap_or_else(|| "run".to_string())],
            None,
            None,
        ),
        AgentKind::Qwen => (
            vec!["--yolo".to_string(), "--prompt".to_string()],
            None,
            None,
        ),
    };
    args.extend(desc.base_args.iter().cloned());
    Invocation {
        program: desc.binary,
        args,
        env: desc.env,
        cwd,
        last_message_path: last_message,
    }
}

/// Pre-flight checks before spawning. Codex runs of the
/// `agent_management` task require the configured MCP server.
#[instrument(skip_all, fields(agent = agent.name(), task = task_name))]
pub fn preflight(agent: AgentKind, task_name: &str, cfg: &Config) -> Result<()> {
    if agent != AgentKind::Codex || task_name != MCP_PREFLIGHT_TASK {
        return Ok(());
    }
    let binary = cfg.binary(agent);
    debug!(binary = %binary.display(), "probing codex MCP configuration");
    let output = Command::new(&binary)
        .args(["mcp", "list"])
        .output()
        .with_context(|| format!("probe {} mcp list", binary.display()))?;
    let listing = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() || !listing.contains(&cfg.codex_mcp_server) {
        return Err(RunFailure::new(
            FailureKind::MetadataError,
            format!(
                "codex MCP server '{}' is not configured (required by {MCP_PREFLIGHT_TASK})",
                cfg.codex_mcp_server
            ),
        )
        .into());
    }
    Ok(())
}

/// Parameters for one agent execution.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Prompt text, passed as the final positional argument.
    pub prompt: String,
    /// Streaming capture target, opened before spawn.
    pub transcript_path: PathBuf,
    /// Fixed location for the agent's last-message file, used by adapters
    /// that request one.
    pub last_message_path: PathBuf,
    /// Wall-clock limit for the child.
    pub timeout: Option<Duration>,
}

/// Abstraction over agent execution backends.
pub trait AgentExecutor {
    /// Run the agent to completion, streaming output to the transcript.
    fn execute(&self, request: &ExecRequest) -> Result<ProcessResult>;
}

/// Executor that spawns the real agent CLI.
pub struct CliExecutor {
    pub agent: AgentKind,
    pub task_name: String,
    pub config: Config,
}

impl AgentExecutor for CliExecutor {
    #[instrument(skip_all, fields(agent = self.agent.name()))]
    fn execute(&self, request: &ExecRequest) -> Result<ProcessResult> {
        preflight(self.agent, &self.task_name, &self.config)?;
        let invocation = build_invocation(self.agent, &self.config, &request.last_message_path);
        info!(program = %invocation.program.display(), "launching agent");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).arg(&request.prompt);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }

        let output = run_streamed(cmd, &request.transcript_path, request.timeout)?;
        if output.timed_out {
            let secs = request.timeout.map(|t| t.as_secs()).unwrap_or_default();
            return Err(RunFailure::new(
                FailureKind::Timeout,
                format!("agent exceeded the {secs}s timeout and was terminated"),
            )
            .into());
        }
        Ok(ProcessResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.combined).into_owned(),
            last_message_path: invocation.last_message_path,
        })
    }
}
