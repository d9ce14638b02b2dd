//! Shared domain types for the run pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The fixed set of supported agent CLIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Codex,
    Claude,
    Gemini,
    Kilo,
    Ollama,
    Opencode,
    Qwen,
}

impl AgentKind {
    pub const ALL: [AgentKind; 7] = [
        AgentKind::Codex,
        AgentKind::Claude,
        AgentKind::Gemini,
        AgentKind::Kilo,
        AgentKind::Ollama,
        AgentKind::Opencode,
        AgentKind::Qwen,
    ];

    /// Lowercase identifier used on the CLI, in paths and in records.
    pub fn name(self) -> &'static str {
        match self {
            AgentKind::Codex => "codex",
            AgentKind::Claude => "claude",
            AgentKind::Gemini => "gemini",
            AgentKind::Kilo => "kilo",
            AgentKind::Ollama => "ollama",
            AgentKind::Opencode => "opencode",
            AgentKind::Qwen => "qwen",
        }
    }

    /// Capitalized name for human-facing messages.
    pub fn display_name(self) -> &'static str {
        match self {
            AgentKind::Codex => "Codex",
            AgentKind::Claude => "Claude",
            AgentKind::Gemini => "Gemini",
            AgentKind::Kilo => "Kilo",
            AgentKind::Ollama => "Ollama",
            AgentKind::Opencode => "Opencode",
            AgentKind::Qwen => "Qwen",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|agent| agent.name() == name)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.into_iter().map(Self::name).collect()
    }
}

/// Outcome of one agent child process.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    /// Combined stdout+stderr, decoded lossily as UTF-8.
    pub stdout: String,
    /// Where the agent was instructed to write its final message, if anywhere.
    pub last_message_path: Option<PathBuf>,
}

/// One commit observed in the run's range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Full SHA.
    pub commit: String,
    /// First line of the commit message.
    pub subject: String,
    pub author: String,
    /// ISO-8601 with offset.
    pub date: String,
}

/// Commits, files and line counts attributable to a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// Oldest first.
    pub commits: Vec<CommitInfo>,
    /// Sorted and deduplicated.
    pub files_changed: Vec<String>,
    pub insertions: u64,
    pub deletions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_names_round_trip() {
        for agent in AgentKind::ALL {
            assert_eq!(AgentKind::from_name(agent.name()), Some(agent));
        }
        assert_eq!(AgentKind::from_name("cursor"), None);
    }

    #[test]
    fn display_names_capitalize() {
        assert_eq!(AgentKind::Claude.display_name(), "Claude");
        assert_eq!(AgentKind::Opencode.display_name(), "Opencode");
    }
}
