//! Liveness stamping for the external scheduler.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::io::config::Config;

/// Append one UTC-stamped line to `<repo_root>/heartbeat.log` and to
/// `<log_root>/heartbeat/task.log`.
pub fn run_heartbeat(cfg: &Config) -> Result<()> {
    let stamp = format!("{} heartbeat\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    append_line(&cfg.repo_root.join("heartbeat.log"), &stamp)?;
    append_line(&cfg.log_root.join("heartbeat").join("task.log"), &stamp)?;
    debug!("heartbeat recorded");
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append to {}", path.display()))
}
