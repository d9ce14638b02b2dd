//! Shared fixtures for orchestrator tests: a scratch git repository,
//! scripted executors and a recording notifier.

use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use anyhow::Result;

use crate::core::error::RunFailure;
use crate::core::types::ProcessResult;
use crate::io::agents::{AgentExecutor, ExecRequest};
use crate::io::config::Config;
use crate::io::notify::{Notification, Notify};

/// Executor returning a canned result without spawning a child. Mirrors
/// the real executor by writing the transcript file.
pub struct ScriptedExecutor {
    exit_code: i32,
    stdout: String,
    side_effect: Option<Box<dyn Fn()>>,
}

impl ScriptedExecutor {
    pub fn new(exit_code: i32, stdout: &str) -> Self {
        Self {
            exit_code,
            stdout: stdout.to_string(),
            side_effect: None,
        }
    }

    /// Run `effect` during execution, e.g. to commit into the scratch repo.
    pub fn with_side_effect(mut self, effect: impl Fn() + 'static) -> Self {
        self.side_effect = Some(Box::new(effect));
        self
    }
}

impl AgentExecutor for ScriptedExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ProcessResult> {
        std::fs::write(&request.transcript_path, &self.stdout).expect("write transcript");
        if let Some(effect) = &self.side_effect {
            effect();
        }
        Ok(ProcessResult {
            exit_code: self.exit_code,
            stdout: self.stdout.clone(),
            last_message_path: None,
        })
    }
}

/// Executor that fails with a fixed [`RunFailure`].
pub struct FailingExecutor {
    failure: RunFailure,
}

impl FailingExecutor {
    pub fn new(failure: RunFailure) -> Self {
        Self { failure }
    }
}

impl AgentExecutor for FailingExecutor {
    fn execute(&self, _request: &ExecRequest) -> Result<ProcessResult> {
        Err(self.failure.clone().into())
    }
}

/// Notifier that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Record the message, then report a delivery failure.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

impl Notify for RecordingNotifier {
    fn send(&self, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .expect("notifier lock")
            .push(notification.clone());
        if self.fail {
            anyhow::bail!("simulated delivery failure");
        }
        Ok(())
    }
}

/// Initialize a scratch git repository with one seed commit.
pub fn init_git_repo(root: &Path) {
    git(root, &["init"]);
    git(root, &["config", "user.email", "runner@example.com"]);
    git(root, &["config", "user.name", "Runner Test"]);
    std::fs::write(root.join("README.md"), "seed\n").expect("write seed file");
    git(root, &["add", "."]);
    git(root, &["commit", "-m", "seed"]);
}

/// Write a file and commit it.
pub fn commit_file(root: &Path, name: &str, contents: &str, message: &str) {
    std::fs::write(root.join(name), contents).expect("write file");
    git(root, &["add", name]);
    git(root, &["commit", "-m", message]);
}

fn git(root: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Config rooted in a scratch directory, with a prompt file for every
/// registered task.
pub fn test_config(root: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.repo_root = root.to_path_buf();
    cfg.log_root = root.join("logs");
    cfg.prompts_dir = root.join("prompts");
    std::fs::create_dir_all(&cfg.prompts_dir).expect("create prompts dir");
    for task in crate::io::tasks::known_names() {
        std::fs::write(
            cfg.prompts_dir.join(format!("{task}.md")),
            format!("# {task}\n"),
        )
        .expect("write prompt");
    }
    cfg
}
