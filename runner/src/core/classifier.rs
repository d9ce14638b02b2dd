//! Usage-limit detection from agent output.
//!
//! Each agent reports provider throttling in its own words; a small table
//! of case-insensitive substrings per agent is enough to classify them.
//! Classification happens exactly once, at the orchestrator boundary,
//! after the combined output is finalized.

use crate::core::error::{FailureKind, RunFailure};
use crate::core::types::AgentKind;

const CLAUDE_PATTERNS: &[&str] = &["hit your limit", "usage limit"];
const CODEX_PATTERNS: &[&str] = &[
    "rate limit",
    "quota",
    "too many requests",
    "429",
    "hit your usage limit",
];
const GEMINI_PATTERNS: &[&str] = &["rate limit", "quota", "resource_exhausted", "429"];

fn patterns(agent: AgentKind) -> &'static [&'static str] {
    match agent {
        AgentKind::Claude => CLAUDE_PATTERNS,
        AgentKind::Codex => CODEX_PATTERNS,
        AgentKind::Gemini | AgentKind::Ollama => GEMINI_PATTERNS,
        AgentKind::Kilo | AgentKind::Opencode | AgentKind::Qwen => &[],
    }
}

/// Return a `usage_limit` failure when any per-agent pattern matches.
/// Agents without a pattern table never classify.
pub fn classify_usage_limit(agent: AgentKind, output: &str) -> Option<RunFailure> {
    let haystack = output.to_lowercase();
    patterns(agent)
        .iter()
        .copied()
        .find(|pattern| haystack.contains(pattern))
        .map(|pattern| {
            RunFailure::new(
                FailureKind::UsageLimit,
                format!(
                    "{} usage limit detected (matched \"{pattern}\")",
                    agent.display_name()
                ),
            )
        })
}
