//! Single-run orchestration: snapshot, execute, classify, attribute,
//! persist, notify.
//!
//! Once the run context exists, every terminal path (success or any
//! failure) writes `metadata.json` exactly once, appends a summary block
//! and, when the task asks for it, dispatches a notification as the last
//! action. `HEAD` is always captured before the child is spawned so the
//! observed commit range belongs to this run.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::core::classifier::classify_usage_limit;
use crate::core::error::{FailureKind, RunFailure, failure_from};
use crate::core::summary::{RunReport, SummaryLine, error_body, iso_utc, success_body, summary_block};
use crate::core::transcript;
use crate::core::types::{AgentKind, CommitSummary, ProcessResult};
use crate::exit_codes;
use crate::io::agents::{AgentExecutor, ExecRequest};
use crate::io::config::Config;
use crate::io::context::{RunContext, new_run_id};
use crate::io::git::Git;
use crate::io::metadata::{
    ErrorRecord, RunLog, SuccessRecord, record_summary, write_metadata, write_stdout,
};
use crate::io::notify::{Notification, Notify};
use crate::io::tasks::{self, Task};

/// Options for one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub agent: AgentKind,
    pub task: String,
    /// Alternate prompt-catalogue entry, recorded in the run record.
    pub debug_prompt: Option<String>,
    /// Skip agent execution and record a synthetic result.
    pub dry_run: bool,
    /// Wall-clock limit for the child, in seconds.
    pub timeout_secs: Option<u64>,
}

/// Everything the success record needs from the pipeline.
struct RunSuccess {
    process: ProcessResult,
    summary: CommitSummary,
    last_message: String,
    token_count: Option<u64>,
}

/// Execute one run end to end; returns the process exit code.
///
/// Failures before the run context exists (unknown task, unreadable
/// prompt, filesystem errors creating the run directory) bubble up as
/// plain errors and exit 1 in `main`.
#[instrument(skip_all, fields(agent = opts.agent.name(), task = %opts.task))]
pub fn execute_run(
    cfg: &Config,
    opts: &RunOptions,
    executor: &dyn AgentExecutor,
    notifier: &dyn Notify,
) -> Result<i32> {
    let task = tasks::resolve(&opts.task)?;
    let prompt = tasks::load_prompt(cfg, &task, opts.debug_prompt.as_deref())?;
    let start = Utc::now();
    let run_id = new_run_id(start);
    let ctx = RunContext::build(&cfg.log_root, task.name, opts.agent.name(), &run_id)?;
    let mut run_log = RunLog::create(&ctx.runner_log_path);
    run_log.line(&format!(
        "run started agent={} task={} run_id={}",
        opts.agent.name(),
        task.name,
        run_id
    ));
    info!(run_id = %run_id, "run started");

    let outcome = pipeline(cfg, opts, &task, &prompt, &ctx, executor, &mut run_log);
    let end = Utc::now();
    let elapsed = elapsed_seconds(start, end);

    match outcome {
        Ok(success) => {
            finish_success(opts, &task, &ctx, notifier, &mut run_log, start, end, elapsed, &success)?;
            info!(run_id = %run_id, "run succeeded");
            Ok(exit_codes::OK)
        }
        Err(err) => {
            let failure = failure_from(&err);
            finish_failure(opts, &task, &ctx, notifier, &mut run_log, start, end, elapsed, &failure)?;
            eprintln!("{failure}");
            Ok(failure.kind.exit_code())
        }
    }
}

fn pipeline(
    cfg: &Config,
    opts: &RunOptions,
    task: &Task,
    prompt: &str,
    ctx: &RunContext,
    executor: &dyn AgentExecutor,
    run_log: &mut RunLog,
) -> Result<RunSuccess> {
    let git = Git::new(&cfg.repo_root);
    let head_before = git.head().context("snapshot HEAD before run")?;
    run_log.line(&format!("HEAD before: {head_before}"));

    let process = if opts.dry_run {
        run_log.line("dry-run: agent execution skipped");
        ProcessResult {
            exit_code: 0,
            stdout: "(dry-run)".to_string(),
            last_message_path: None,
        }
    } else {
        let request = ExecRequest {
            prompt: prompt.to_string(),
            transcript_path: ctx.transcript_path.clone(),
            last_message_path: ctx.last_message_path.clone(),
            timeout: opts.timeout_secs.map(Duration::from_secs),
        };
        executor.execute(&request)?
    };
    run_log.line(&format!("agent exited code={}", process.exit_code));

    write_stdout(&ctx.stdout_path, &process.stdout)?;

    // Single classification point, after stdout is finalized.
    if let Some(limit) = classify_usage_limit(opts.agent, &process.stdout) {
        return Err(limit.into());
    }
    if process.exit_code != 0 {
        return Err(RunFailure::new(
            FailureKind::ProcessError,
            format!(
                "agent exited with code {} (see {})",
                process.exit_code,
                ctx.stdout_path.display()
            ),
        )
        .into());
    }

    let head_after = git.head().context("snapshot HEAD after run")?;
    let summary = git.summarize(&head_before, &head_after)?;
    run_log.line(&format!("commits observed: {}", summary.commits.len()));

    if task.requires_commit && !opts.dry_run && summary.commits.is_empty() {
        return Err(RunFailure::new(
            FailureKind::CommitMissing,
            "commit detection found no new commits (HEAD unchanged; the task requires a commit)",
        )
        .into());
    }

    let file_message = read_last_message_file(process.last_message_path.as_deref());
    let mut last_message = transcript::last_message(&process.stdout, file_message.as_deref());
    let mut token_count = transcript::token_count(&process.stdout, file_message.as_deref());
    if opts.agent == AgentKind::Gemini {
        let (message, tokens) = transcript::parse_json_envelope(&process.stdout);
        if let Some(message) = message {
            last_message = message;
        }
        if let Some(tokens) = tokens {
            token_count = Some(tokens);
        }
    }

    Ok(RunSuccess {
        process,
        summary,
        last_message,
        token_count,
    })
}

fn read_last_message_file(path: Option<&Path>) -> Option<String> {
    std::fs::read_to_string(path?).ok()
}

#[allow(clippy::too_many_arguments)]
fn finish_success(
    opts: &RunOptions,
    task: &Task,
    ctx: &RunContext,
    notifier: &dyn Notify,
    run_log: &mut RunLog,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    elapsed: f64,
    success: &RunSuccess,
) -> Result<()> {
    let record = SuccessRecord {
        run_id: ctx.run_id.clone(),
        agent: ctx.agent_name.clone(),
        task: ctx.task_name.clone(),
        start_time: iso_utc(start),
        end_time: iso_utc(end),
        elapsed_seconds: elapsed,
        exit_code: success.process.exit_code,
        token_count: success.token_count,
        last_message: success.last_message.clone(),
        commits: success.summary.commits.clone(),
        files_changed: success.summary.files_changed.clone(),
        insertions: success.summary.insertions,
        deletions: success.summary.deletions,
        debug_prompt: opts.debug_prompt.clone(),
        dry_run: opts.dry_run,
        requires_commit: task.requires_commit,
        classified_error: None,
    };
    write_metadata(&ctx.metadata_path, &record)?;
    run_log.line("metadata written");

    let block = summary_block(&SummaryLine {
        at: end,
        agent: &ctx.agent_name,
        task: &ctx.task_name,
        elapsed_seconds: elapsed,
        tokens: success.token_count,
        files: success.summary.files_changed.len(),
        insertions: success.summary.insertions,
        deletions: success.summary.deletions,
        last_message: &success.last_message,
    });
    record_summary(&ctx.task_log_path, &ctx.agent_log_path, &ctx.summary_path, &block)?;

    if task.notify {
        let body = success_body(&RunReport {
            agent: &ctx.agent_name,
            task: &ctx.task_name,
            start,
            end,
            elapsed_seconds: elapsed,
            tokens: success.token_count,
            summary: &success.summary,
            last_message: &success.last_message,
        });
        dispatch(
            notifier,
            run_log,
            Notification {
                title: format!("{}/{} completed", ctx.agent_name, ctx.task_name),
                body,
                priority: "default".to_string(),
                tags: "white_check_mark".to_string(),
            },
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn finish_failure(
    opts: &RunOptions,
    task: &Task,
    ctx: &RunContext,
    notifier: &dyn Notify,
    run_log: &mut RunLog,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    elapsed: f64,
    failure: &RunFailure,
) -> Result<()> {
    run_log.line(&format!("run failed: {failure}"));
    let record = ErrorRecord {
        run_id: ctx.run_id.clone(),
        agent: ctx.agent_name.clone(),
        task: ctx.task_name.clone(),
        start_time: iso_utc(start),
        end_time: iso_utc(end),
        elapsed_seconds: elapsed,
        exit_code: None,
        error: failure.detail.clone(),
        classified_error: failure.kind.classified_error().map(str::to_string),
        debug_prompt: opts.debug_prompt.clone(),
        dry_run: opts.dry_run,
        requires_commit: task.requires_commit,
    };
    write_metadata(&ctx.metadata_path, &record)?;
    run_log.line("metadata written");

    let block = summary_block(&SummaryLine {
        at: end,
        agent: &ctx.agent_name,
        task: &ctx.task_name,
        elapsed_seconds: elapsed,
        tokens: None,
        files: 0,
        insertions: 0,
        deletions: 0,
        last_message: &failure.to_string(),
    });
    record_summary(&ctx.task_log_path, &ctx.agent_log_path, &ctx.summary_path, &block)?;

    if task.notify {
        let body = error_body(
            &ctx.agent_name,
            &ctx.task_name,
            start,
            end,
            elapsed,
            failure.kind.label(),
            &failure.detail,
        );
        dispatch(
            notifier,
            run_log,
            Notification {
                title: format!("{}/{} failed", ctx.agent_name, ctx.task_name),
                body,
                priority: "high".to_string(),
                tags: "x".to_string(),
            },
        );
    }
    Ok(())
}

/// Delivery failures are logged but never change the run's outcome.
fn dispatch(notifier: &dyn Notify, run_log: &mut RunLog, notification: Notification) {
    match notifier.send(&notification) {
        Ok(()) => run_log.line("notification sent"),
        Err(e) => {
            warn!(err = %e, "notification delivery failed");
            run_log.line(&format!("notification failed: {e:#}"));
        }
    }
}

fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        FailingExecutor, RecordingNotifier, ScriptedExecutor, commit_file, init_git_repo,
        test_config,
    };
    use serde_json::Value;

    fn opts(agent: AgentKind, task: &str) -> RunOptions {
        RunOptions {
            agent,
            task: task.to_string(),
            debug_prompt: None,
            dry_run: false,
            timeout_secs: None,
        }
    }

    fn read_metadata(cfg: &Config, task: &str, agent: &str) -> Value {
        let agent_dir = cfg.log_root.join(task).join(agent);
        let run_dir = std::fs::read_dir(&agent_dir)
            .expect("read agent dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| path.is_dir())
            .expect("run dir exists");
        let contents =
            std::fs::read_to_string(run_dir.join("metadata.json")).expect("read metadata");
        serde_json::from_str(&contents).expect("parse metadata")
    }

    #[test]
    fn successful_debug_run_writes_success_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let executor = ScriptedExecutor::new(0, "Working on it...\nHello world\n");
        let notifier = RecordingNotifier::default();

        let code = execute_run(
            &cfg,
            &opts(AgentKind::Codex, "debug_hello_simple"),
            &executor,
            &notifier,
        )
        .expect("run");
        assert_eq!(code, exit_codes::OK);

        let metadata = read_metadata(&cfg, "debug_hello_simple", "codex");
        assert_eq!(metadata["exit_code"], 0);
        assert_eq!(metadata["classified_error"], Value::Null);
        assert_eq!(metadata["last_message"], "Hello world");
        assert_eq!(metadata["requires_commit"], false);
        assert_eq!(metadata["commits"], Value::Array(Vec::new()));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].priority, "default");
        assert_eq!(sent[0].tags, "white_check_mark");
        assert!(sent[0].body.contains("(no commits)"));
    }

    #[test]
    fn run_artifacts_exist_on_the_success_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let executor = ScriptedExecutor::new(0, "Hello world\n");
        let notifier = RecordingNotifier::default();

        execute_run(
            &cfg,
            &opts(AgentKind::Codex, "debug_hello_simple"),
            &executor,
            &notifier,
        )
        .expect("run");

        let agent_dir = cfg.log_root.join("debug_hello_simple").join("codex");
        let run_dir = std::fs::read_dir(&agent_dir)
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| path.is_dir())
            .expect("run dir");
        for name in ["stdout.log", "transcript.log", "metadata.json", "summary.txt", "runner.log"] {
            assert!(run_dir.join(name).is_file(), "{name} missing");
        }
        assert!(agent_dir.join("agent.log").is_file());
        assert!(
            cfg.log_root
                .join("debug_hello_simple")
                .join("task.log")
                .is_file()
        );
    }

    #[test]
    fn usage_limit_terminates_with_exit_10() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let executor = ScriptedExecutor::new(0, "I hit your limit, retry later");
        let notifier = RecordingNotifier::default();

        let code = execute_run(
            &cfg,
            &opts(AgentKind::Claude, "debug_hello_simple"),
            &executor,
            &notifier,
        )
        .expect("run");
        assert_eq!(code, exit_codes::USAGE_LIMIT);

        let metadata = read_metadata(&cfg, "debug_hello_simple", "claude");
        assert_eq!(metadata["classified_error"], "usage_limit");
        assert_eq!(metadata["exit_code"], Value::Null);
        assert!(
            metadata["error"]
                .as_str()
                .expect("error string")
                .contains("Claude usage limit")
        );

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].priority, "high");
        assert_eq!(sent[0].tags, "x");
    }

    #[test]
    fn missing_commit_fails_the_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let executor = ScriptedExecutor::new(0, "did some work\n");
        let notifier = RecordingNotifier::default();

        let code = execute_run(
            &cfg,
            &opts(AgentKind::Codex, "debug_smoke_commit"),
            &executor,
            &notifier,
        )
        .expect("run");
        assert_eq!(code, exit_codes::FAILURE);

        let metadata = read_metadata(&cfg, "debug_smoke_commit", "codex");
        assert_eq!(metadata["classified_error"], Value::Null);
        assert!(
            metadata["error"]
                .as_str()
                .expect("error string")
                .contains("commit detection")
        );
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn produced_commits_are_attributed() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let repo = temp.path().to_path_buf();
        let executor = ScriptedExecutor::new(0, "committed\n").with_side_effect(move || {
            commit_file(&repo, "feature.txt", "new\n", "add feature");
        });
        let notifier = RecordingNotifier::default();

        let code = execute_run(
            &cfg,
            &opts(AgentKind::Codex, "debug_smoke_commit"),
            &executor,
            &notifier,
        )
        .expect("run");
        assert_eq!(code, exit_codes::OK);

        let metadata = read_metadata(&cfg, "debug_smoke_commit", "codex");
        let commits = metadata["commits"].as_array().expect("commits array");
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0]["subject"], "add feature");
        assert_eq!(
            metadata["files_changed"],
            Value::Array(vec![Value::String("feature.txt".to_string())])
        );
        assert_eq!(metadata["insertions"], 1);
    }

    #[test]
    fn process_error_maps_to_exit_1() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let executor = ScriptedExecutor::new(3, "boom\n");
        let notifier = RecordingNotifier::default();

        let code = execute_run(
            &cfg,
            &opts(AgentKind::Codex, "debug_hello_simple"),
            &executor,
            &notifier,
        )
        .expect("run");
        assert_eq!(code, exit_codes::FAILURE);

        let metadata = read_metadata(&cfg, "debug_hello_simple", "codex");
        assert_eq!(metadata["classified_error"], Value::Null);
        assert!(
            metadata["error"]
                .as_str()
                .expect("error string")
                .contains("exited with code 3")
        );
    }

    #[test]
    fn timeout_failure_maps_to_exit_11() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let executor = FailingExecutor::new(RunFailure::new(
            FailureKind::Timeout,
            "agent exceeded the 5s timeout and was terminated",
        ));
        let notifier = RecordingNotifier::default();

        let code = execute_run(
            &cfg,
            &opts(AgentKind::Codex, "debug_hello_simple"),
            &executor,
            &notifier,
        )
        .expect("run");
        assert_eq!(code, exit_codes::TIMEOUT);

        let metadata = read_metadata(&cfg, "debug_hello_simple", "codex");
        assert_eq!(metadata["classified_error"], "timeout");
    }

    #[test]
    fn notifier_failure_does_not_change_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let executor = ScriptedExecutor::new(0, "Hello world\n");
        let notifier = RecordingNotifier::failing();

        let code = execute_run(
            &cfg,
            &opts(AgentKind::Codex, "debug_hello_simple"),
            &executor,
            &notifier,
        )
        .expect("run");
        assert_eq!(code, exit_codes::OK);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn dry_run_skips_execution_and_commit_checks() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let executor = FailingExecutor::new(RunFailure::new(
            FailureKind::ProcessError,
            "must not be called",
        ));
        let notifier = RecordingNotifier::default();

        let mut options = opts(AgentKind::Codex, "debug_smoke_commit");
        options.dry_run = true;
        let code = execute_run(&cfg, &options, &executor, &notifier).expect("run");
        assert_eq!(code, exit_codes::OK);

        let metadata = read_metadata(&cfg, "debug_smoke_commit", "codex");
        assert_eq!(metadata["dry_run"], true);
        assert_eq!(metadata["last_message"], "(dry-run)");
        assert_eq!(metadata["commits"], Value::Array(Vec::new()));
    }

    #[test]
    fn unknown_task_fails_before_any_run_context() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let executor = ScriptedExecutor::new(0, "unused");
        let notifier = RecordingNotifier::default();

        let err = execute_run(
            &cfg,
            &opts(AgentKind::Codex, "no_such_task"),
            &executor,
            &notifier,
        )
        .expect_err("should fail");
        assert!(err.to_string().contains("unknown task"));
        assert!(!cfg.log_root.join("no_such_task").exists());
    }

    #[test]
    fn gemini_json_envelope_overrides_parsing() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let cfg = test_config(temp.path());
        let stdout = r#"{"response":"Hello","stats":{"models":{"m":{"tokens":{"total":42}}}}}"#;
        let executor = ScriptedExecutor::new(0, stdout);
        let notifier = RecordingNotifier::default();

        let code = execute_run(
            &cfg,
            &opts(AgentKind::Gemini, "debug_hello_simple"),
            &executor,
            &notifier,
        )
        .expect("run");
        assert_eq!(code, exit_codes::OK);

        let metadata = read_metadata(&cfg, "debug_hello_simple", "gemini");
        assert_eq!(metadata["last_message"], "Hello");
        assert_eq!(metadata["token_count"], 42);
    }
}
