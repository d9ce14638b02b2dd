//! Task registry: named prompts plus per-task policy flags.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use crate::io::config::Config;

/// A unit of agent work: a prompt file plus policy flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Identifier shown in logs and notifications.
    pub name: &'static str,
    /// Prompt-catalogue key; the prompt lives at `<prompts_dir>/<task_key>.md`.
    pub task_key: &'static str,
    pub requires_commit: bool,
    pub notify: bool,
}

const TASKS: &[Task] = &[
    Task {
        name: "agent_management",
        task_key: "agent_management",
        requires_commit: true,
        notify: true,
    },
    Task {
        name: "document_coverage",
        task_key: "document_coverage",
        requires_commit: true,
        notify: true,
    },
    Task {
        name: "document_test_alignment",
        task_key: "document_test_alignment",
        requires_commit: true,
        notify: true,
    },
    Task {
        name: "debug_smoke_commit",
        task_key: "debug_smoke_commit",
        requires_commit: true,
        notify: true,
    },
    Task {
        name: "debug_hello_world",
        task_key: "debug_hello_world",
        requires_commit: true,
        notify: true,
    },
    Task {
        name: "debug_hello_simple",
        task_key: "debug_hello_simple",
        requires_commit: false,
        notify: true,
    },
];

/// Look up a task by name.
pub fn resolve(name: &str) -> Result<Task> {
    TASKS
        .iter()
        .find(|task| task.name == name)
        .cloned()
        .ok_or_else(|| {
            anyhow!(
                "unknown task '{name}' (known: {})",
                known_names().join(", ")
            )
        })
}

pub fn known_names() -> Vec<&'static str> {
    TASKS.iter().map(|task| task.name).collect()
}

impl Task {
    pub fn prompt_path(&self, cfg: &Config) -> PathBuf {
        cfg.prompts_dir.join(format!("{}.md", self.task_key))
    }
}

/// Read the prompt text for a run. A debug prompt substitutes an
/// alternate file from the same catalogue.
pub fn load_prompt(cfg: &Config, task: &Task, debug_prompt: Option<&str>) -> Result<String> {
    let path = match debug_prompt {
        Some(name) => cfg.prompts_dir.join(format!("{name}.md")),
        None => task.prompt_path(cfg),
    };
    fs::read_to_string(&path).with_context(|| format!("read prompt {}", path.display()))
}
