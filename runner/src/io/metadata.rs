//! Persistence of the authoritative run record and the append-only
//! summary logs.
//!
//! Everything here is product output: always written, unaffected by the
//! tracing filter.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::core::types::CommitInfo;

/// Success-shape run record (`metadata.json`).
#[derive(Debug, Clone, Serialize)]
pub struct SuccessRecord {
    pub run_id: String,
    pub agent: String,
    pub task: String,
    pub start_time: String,
    pub end_time: String,
    pub elapsed_seconds: f64,
    pub exit_code: i32,
    pub token_count: Option<u64>,
    pub last_message: String,
    pub commits: Vec<CommitInfo>,
    pub files_changed: Vec<String>,
    pub insertions: u64,
    pub deletions: u64,
    pub debug_prompt: Option<String>,
    pub dry_run: bool,
    pub requires_commit: bool,
    /// Always null on the success shape.
    pub classified_error: Option<String>,
}

/// Error-shape run record.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub run_id: String,
    pub agent: String,
    pub task: String,
    pub start_time: String,
    pub end_time: String,
    pub elapsed_seconds: f64,
    /// Always null on the error shape.
    pub exit_code: Option<i32>,
    pub error: String,
    pub classified_error: Option<String>,
    pub debug_prompt: Option<String>,
    pub dry_run: bool,
    pub requires_commit: bool,
}

/// Write the run record: sorted keys, 2-space indent, trailing newline.
pub fn write_metadata<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    // Route through Value so object keys serialize sorted.
    let value = serde_json::to_value(record).context("serialize run record")?;
    let mut payload = serde_json::to_string_pretty(&value).context("render run record")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Write the final merged child output.
pub fn write_stdout(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("write {}", path.display()))
}

/// Append one summary block to the task- and agent-scoped logs and write
/// it as the run's own `summary.txt` (truncated, one block per run).
pub fn record_summary(
    task_log: &Path,
    agent_log: &Path,
    summary_path: &Path,
    block: &str,
) -> Result<()> {
    append_block(task_log, block)?;
    append_block(agent_log, block)?;
    fs::write(summary_path, block).with_context(|| format!("write {}", summary_path.display()))?;
    Ok(())
}

fn append_block(path: &Path, block: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    // One write call per block so concurrent runners interleave at block
    // granularity under POSIX append semantics.
    file.write_all(block.as_bytes())
        .with_context(|| format!("append to {}", path.display()))?;
    Ok(())
}

/// Process-level log inside the run directory. Write failures are logged
/// and never escalate.
pub struct RunLog {
    file: Option<File>,
}

impl RunLog {
    pub fn create(path: &Path) -> Self {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self { file: Some(file) },
            Err(e) => {
                warn!(err = %e, path = %path.display(), "cannot open runner log");
                Self { file: None }
            }
        }
    }

    pub fn line(&mut self, message: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let stamped = format!("{} {message}\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        if let Err(e) = file
            .write_all(stamped.as_bytes())
            .and_then(|()| file.flush())
        {
            warn!(err = %e, "runner log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn success_record() -> SuccessRecord {
        SuccessRecord {
            run_id: "20250301_090507".to_string(),
            agent: "codex".to_string(),
            task: "debug_hello_simple".to_string(),
            start_time: "2025-03-01T09:05:07+00:00".to_string(),
            end_time: "2025-03-01T09:07:10+00:00".to_string(),
            elapsed_seconds: 123.4,
            exit_code: 0,
            token_count: Some(8665),
            last_message: "Hello world".to_string(),
            commits: Vec::new(),
            files_changed: Vec::new(),
            insertions: 0,
            deletions: 0,
            debug_prompt: None,
            dry_run: false,
            requires_commit: false,
            classified_error: None,
        }
    }

    #[test]
    fn metadata_has_sorted_keys_and_trailing_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("metadata.json");
        write_metadata(&path, &success_record()).expect("write");

        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.ends_with('\n'));
        let keys: Vec<&str> = contents
            .lines()
            .filter_map(|line| {
                let trimmed = line.trim_start();
                trimmed
                    .strip_prefix('"')
                    .and_then(|rest| rest.split_once('"'))
                    .map(|(key, _)| key)
            })
            .collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);

        let value: Value = serde_json::from_str(&contents).expect("parse");
        assert_eq!(value["exit_code"], 0);
        assert_eq!(value["classified_error"], Value::Null);
        assert_eq!(value["token_count"], 8665);
    }

    #[test]
    fn error_record_serializes_null_exit_code() {
        let record = ErrorRecord {
            run_id: "r".to_string(),
            agent: "claude".to_string(),
            task: "t".to_string(),
            start_time: "s".to_string(),
            end_time: "e".to_string(),
            elapsed_seconds: 1.0,
            exit_code: None,
            error: "Claude usage limit detected".to_string(),
            classified_error: Some("usage_limit".to_string()),
            debug_prompt: None,
            dry_run: false,
            requires_commit: true,
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["exit_code"], Value::Null);
        assert_eq!(value["classified_error"], "usage_limit");
    }

    #[test]
    fn summary_blocks_append_and_truncate_where_expected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let task_log = temp.path().join("task/task.log");
        let agent_log = temp.path().join("task/agent/agent.log");
        let summary = temp.path().join("summary.txt");

        record_summary(&task_log, &agent_log, &summary, "first block\n").expect("write");
        record_summary(&task_log, &agent_log, &summary, "second block\n").expect("write");

        let appended = fs::read_to_string(&task_log).expect("read task log");
        assert_eq!(appended, "first block\nsecond block\n");
        let appended = fs::read_to_string(&agent_log).expect("read agent log");
        assert_eq!(appended, "first block\nsecond block\n");
        // summary.txt holds only the latest block.
        assert_eq!(
            fs::read_to_string(&summary).expect("read summary"),
            "second block\n"
        );
    }

    #[test]
    fn run_log_appends_stamped_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("runner.log");
        let mut log = RunLog::create(&path);
        log.line("run started");
        log.line("agent exited code=0");

        let contents = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("run started"));
        assert!(lines[0].contains("UTC"));
    }

    #[test]
    fn run_log_swallows_open_failures() {
        let mut log = RunLog::create(Path::new("/nonexistent/dir/runner.log"));
        log.line("still fine");
    }
}
