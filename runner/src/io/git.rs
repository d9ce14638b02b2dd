//! Read-only git facade for run attribution.
//!
//! The orchestrator only observes the repository: HEAD before and after
//! the agent, and the commit range between them. A small, explicit
//! wrapper around `git` subprocess calls is all that is needed.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::numstat::parse_numstat;
use crate::core::types::{CommitInfo, CommitSummary};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Current HEAD SHA.
    #[instrument(skip_all)]
    pub fn head(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Summarize the commit range `(before, after]`, oldest first.
    /// Returns an empty summary when the endpoints are equal.
    #[instrument(skip_all, fields(before, after))]
    pub fn summarize(&self, before: &str, after: &str) -> Result<CommitSummary> {
        if before == after {
            debug!("HEAD unchanged, empty summary");
            return Ok(CommitSummary::default());
        }
        let range = format!("{before}..{after}");
        let log = self.run_capture(&["log", "--reverse", "--format=%H%x09%s%x09%an%x09%cI", &range])?;
        let mut commits = Vec::new();
        for line in log.lines().filter(|line| !line.trim().is_empty()) {
            commits.push(parse_log_line(line)?);
        }
        let numstat = self.run_capture(&["diff", "--numstat", &range])?;
        let totals = parse_numstat(&numstat);
        debug!(
            commits = commits.len(),
            files = totals.files_changed.len(),
            "summarized commit range"
        );
        Ok(CommitSummary {
            commits,
            files_changed: totals.files_changed,
            insertions: totals.insertions,
            deletions: totals.deletions,
        })
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_log_line(line: &str) -> Result<CommitInfo> {
    let mut fields = line.splitn(4, '\t');
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(commit), Some(subject), Some(author), Some(date)) => Ok(CommitInfo {
            commit: commit.to_string(),
            subject: subject.to_string(),
            author: author.to_string(),
            date: date.trim().to_string(),
        }),
        _ => Err(anyhow!("unexpected git log line: '{line}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_separated_log_line() {
        let info = parse_log_line(
            "0123abc\tfix parser\tJane Dev\t2025-03-01T12:00:00+09:00",
        )
        .expect("parse");
        assert_eq!(
            info,
            CommitInfo {
                commit: "0123abc".to_string(),
                subject: "fix parser".to_string(),
                author: "Jane Dev".to_string(),
                date: "2025-03-01T12:00:00+09:00".to_string(),
            }
        );
    }

    #[test]
    fn final_field_absorbs_remaining_tabs() {
        let info = parse_log_line("sha\tsubject\tauthor\tdate\twith\ttabs").expect("parse");
        assert_eq!(info.date, "date\twith\ttabs");
    }

    #[test]
    fn short_log_line_is_rejected() {
        assert!(parse_log_line("sha\tsubject only").is_err());
    }
}
