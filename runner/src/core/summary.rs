//! Human-readable rendering shared by summary logs and notifications.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::core::types::CommitSummary;

/// Render elapsed wall-clock seconds as `<m>m<ss>s`.
pub fn format_elapsed(elapsed_seconds: f64) -> String {
    let total = elapsed_seconds.max(0.0).round() as u64;
    format!("{}m{:02}s", total / 60, total % 60)
}

pub fn format_tokens(tokens: Option<u64>) -> String {
    tokens.map_or_else(|| "n/a".to_string(), |count| count.to_string())
}

/// `YYYY-MM-DD HH:MM:SS UTC` stamp used in summary blocks and log lines.
pub fn utc_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// ISO-8601 with an explicit `+00:00` offset, the run-record format.
pub fn iso_utc(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Inputs for the fixed two-line summary block.
#[derive(Debug, Clone)]
pub struct SummaryLine<'a> {
    pub at: DateTime<Utc>,
    pub agent: &'a str,
    pub task: &'a str,
    pub elapsed_seconds: f64,
    pub tokens: Option<u64>,
    pub files: usize,
    pub insertions: u64,
    pub deletions: u64,
    pub last_message: &'a str,
}

/// The block appended to `task.log` and `agent.log`. The format is fixed
/// so downstream consumers parse it unambiguously.
pub fn summary_block(line: &SummaryLine<'_>) -> String {
    format!(
        "{} [{}/{}] elapsed={} tokens={} files={} loc=+{}/-{}\nlast_message: {}\n",
        utc_stamp(line.at),
        line.agent,
        line.task,
        format_elapsed(line.elapsed_seconds),
        format_tokens(line.tokens),
        line.files,
        line.insertions,
        line.deletions,
        single_line(line.last_message),
    )
}

fn single_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim_end()
}

fn short_sha(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}

/// Inputs for the notification bodies.
#[derive(Debug, Clone)]
pub struct RunReport<'a> {
    pub agent: &'a str,
    pub task: &'a str,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub tokens: Option<u64>,
    pub summary: &'a CommitSummary,
    pub last_message: &'a str,
}

/// Success notification body.
pub fn success_body(report: &RunReport<'_>) -> String {
    let mut body = format!(
        "agent: {}\ntask: {}\nstart: {}\nend: {}\nelapsed: {}\ntokens: {}\n\ncommits:\n",
        report.agent,
        report.task,
        utc_stamp(report.start),
        utc_stamp(report.end),
        format_elapsed(report.elapsed_seconds),
        format_tokens(report.tokens),
    );
    if report.summary.commits.is_empty() {
        body.push_str("(no commits)\n");
    } else {
        for commit in &report.summary.commits {
            body.push_str(&format!(
                "- {} ({})\n",
                commit.subject,
                short_sha(&commit.commit)
            ));
        }
    }
    let files = if report.summary.files_changed.is_empty() {
        "(no files)".to_string()
    } else {
        report.summary.files_changed.join(", ")
    };
    body.push_str(&format!(
        "\nfiles: {}\nloc: +{}/-{}\n\nlast_message:\n{}\n",
        files, report.summary.insertions, report.summary.deletions, report.last_message,
    ));
    body
}

/// Error notification body. The detail line is omitted when empty.
pub fn error_body(
    agent: &str,
    task: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    elapsed_seconds: f64,
    kind_label: &str,
    detail: &str,
) -> String {
    let mut body = format!(
        "Agent: {}\nTask: {}\nStart: {}\nEnd: {}\nElapsed: {}\n\nError: {}\n",
        agent,
        task,
        utc_stamp(start),
        utc_stamp(end),
        format_elapsed(elapsed_seconds),
        kind_label,
    );
    if !detail.trim().is_empty() {
        body.push_str(detail.trim_end());
        body.push('\n');
    }
    body
}
