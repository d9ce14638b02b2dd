//! Per-run directory layout under the log root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// UTC timestamp run id, chosen once at startup. A run is uniquely
/// addressed by `(task, agent, run_id)`.
pub fn new_run_id(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Immutable paths for one run. The run directory is created before the
/// child process is spawned; file names inside it are fixed.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub task_name: String,
    pub agent_name: String,
    /// `<log_root>/<task>/<agent>/<run_id>`
    pub run_dir: PathBuf,
    pub stdout_path: PathBuf,
    pub transcript_path: PathBuf,
    pub metadata_path: PathBuf,
    pub summary_path: PathBuf,
    pub runner_log_path: PathBuf,
    /// Only written when the adapter requests a last-message file.
    pub last_message_path: PathBuf,
    /// `<log_root>/<task>/task.log`, shared across runs (append-only).
    pub task_log_path: PathBuf,
    /// `<log_root>/<task>/<agent>/agent.log`, shared across runs.
    pub agent_log_path: PathBuf,
}

impl RunContext {
    /// Build the layout and create `run_dir`. Idempotent on an existing
    /// directory; never deletes.
    pub fn build(log_root: &Path, task_name: &str, agent_name: &str, run_id: &str) -> Result<Self> {
        let task_dir = log_root.join(task_name);
        let agent_dir = task_dir.join(agent_name);
        let run_dir = agent_dir.join(run_id);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("create run dir {}", run_dir.display()))?;
        Ok(Self {
            run_id: run_id.to_string(),
            task_name: task_name.to_string(),
            agent_name: agent_name.to_string(),
            stdout_path: run_dir.join("stdout.log"),
            transcript_path: run_dir.join("transcript.log"),
            metadata_path: run_dir.join("metadata.json"),
            summary_path: run_dir.join("summary.txt"),
            runner_log_path: run_dir.join("runner.log"),
            last_message_path: run_dir.join("last_message.txt"),
            task_log_path: task_dir.join("task.log"),
            agent_log_path: agent_dir.join("agent.log"),
            run_dir,
        })
    }
}
