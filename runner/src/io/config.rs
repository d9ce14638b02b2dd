//! Runner configuration: compiled defaults, an optional TOML file, and
//! `AGENT_RUNNER_*` environment overrides.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::AgentKind;

/// Prefix shared by every configuration override variable.
pub const ENV_PREFIX: &str = "AGENT_RUNNER_";

/// Resolved paths, endpoints and agent settings for one invocation.
///
/// Intended to be automatable: every field has a default, the optional
/// file (named by `AGENT_RUNNER_CONFIG`) may set any subset, and
/// individual `AGENT_RUNNER_*` variables win over both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Git working copy the agents operate on.
    pub repo_root: PathBuf,
    /// Root of the per-run log tree.
    pub log_root: PathBuf,
    /// Directory holding the markdown prompt catalogue.
    pub prompts_dir: PathBuf,
    /// ntfy-compatible server base URL.
    pub ntfy_server: String,
    /// Topic notifications are published to.
    pub ntfy_topic: String,
    /// Directory prepended to `PATH` for every agent child process.
    pub path_prefix: Option<PathBuf>,
    /// Model passed to the gemini CLI.
    pub gemini_model: String,
    /// Model the ollama adapter launches claude with (`OLLAMA_MODEL`).
    pub ollama_model: String,
    /// MCP server codex must have configured for the agent_management task.
    pub codex_mcp_server: String,
    /// Per-agent binary overrides; unlisted agents resolve via `PATH`.
    pub binaries: BTreeMap<String, PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            log_root: PathBuf::from("logs"),
            prompts_dir: PathBuf::from("prompts"),
            ntfy_server: "https://ntfy.sh".to_string(),
            ntfy_topic: "agent-runner".to_string(),
            path_prefix: None,
            gemini_model: "gemini-2.5-pro".to_string(),
            ollama_model: "qwen3-coder".to_string(),
            codex_mcp_server: "github".to_string(),
            binaries: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load defaults, then the optional TOML file, then env overrides.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Same as [`Config::load`] with an injectable variable lookup.
    pub fn load_with(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = match get("AGENT_RUNNER_CONFIG") {
            Some(path) => load_file(Path::new(&path))?,
            None => Self::default(),
        };
        cfg.apply_overrides(&get);
        cfg.validate()?;
        Ok(cfg.resolve_paths())
    }

    fn apply_overrides(&mut self, get: &impl Fn(&str) -> Option<String>) {
        let var = |key: &str| get(&format!("{ENV_PREFIX}{key}")).filter(|value| !value.is_empty());
        if let Some(value) = var("REPO_ROOT") {
            self.repo_root = PathBuf::from(value);
        }
        if let Some(value) = var("LOG_ROOT") {
            self.log_root = PathBuf::from(value);
        }
        if let Some(value) = var("PROMPTS_DIR") {
            self.prompts_dir = PathBuf::from(value);
        }
        if let Some(value) = var("NTFY_SERVER") {
            self.ntfy_server = value;
        }
        if let Some(value) = var("NTFY_TOPIC") {
            self.ntfy_topic = value;
        }
        if let Some(value) = var("PATH_PREFIX") {
            self.path_prefix = Some(PathBuf::from(value));
        }
        if let Some(value) = var("GEMINI_MODEL") {
            self.gemini_model = value;
        }
        if let Some(value) = var("CODEX_MCP_SERVER") {
            self.codex_mcp_server = value;
        }
        for agent in AgentKind::ALL {
            let key = format!("{}_BIN", agent.name().to_uppercase());
            if let Some(value) = var(&key) {
                self.binaries
                    .insert(agent.name().to_string(), PathBuf::from(value));
            }
        }
        // Legacy knob without the shared prefix.
        if let Some(value) = get("OLLAMA_MODEL").filter(|value| !value.is_empty()) {
            self.ollama_model = value;
        }
    }

    /// Binary for an agent: explicit override, or the bare name resolved
    /// through `PATH`.
    pub fn binary(&self, agent: AgentKind) -> PathBuf {
        self.binaries
            .get(agent.name())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(agent.name()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.ntfy_server.trim().is_empty() {
            return Err(anyhow!("ntfy_server must not be empty"));
        }
        if self.ntfy_topic.trim().is_empty() {
            return Err(anyhow!("ntfy_topic must not be empty"));
        }
        if self.gemini_model.trim().is_empty() {
            return Err(anyhow!("gemini_model must not be empty"));
        }
        Ok(())
    }

    fn resolve_paths(mut self) -> Self {
        if self.log_root.is_relative() {
            self.log_root = self.repo_root.join(&self.log_root);
        }
        if self.prompts_dir.is_relative() {
            self.prompts_dir = self.repo_root.join(&self.prompts_dir);
        }
        self
    }
}

/// Load config from a TOML file. A missing file yields the defaults.
fn load_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
