//! Push notifications to an ntfy-compatible endpoint.
//!
//! Delivery is best-effort: the orchestrator logs a failure but the run
//! outcome never depends on it.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// A single push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: String,
    /// Comma-separated tag list.
    pub tags: String,
}

/// Delivery seam so tests can record instead of send.
pub trait Notify {
    fn send(&self, notification: &Notification) -> Result<()>;
}

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifier that POSTs to a configured topic. The body carries the
/// message text; title, priority and tags travel in headers and must be
/// Latin-1 safe.
pub struct NtfyNotifier {
    server: String,
    topic: String,
    client: reqwest::blocking::Client,
}

impl NtfyNotifier {
    pub fn new(server: &str, topic: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            server: server.trim_end_matches('/').to_string(),
            topic: topic.to_string(),
            client,
        })
    }
}

impl Notify for NtfyNotifier {
    #[instrument(skip_all, fields(topic = %self.topic))]
    fn send(&self, notification: &Notification) -> Result<()> {
        let url = format!("{}/{}", self.server, self.topic);
        let response = self
            .client
            .post(&url)
            .header("Title", latin1(&notification.title))
            .header("Priority", normalize_priority(&notification.priority))
            .header("Tags", sanitize_tags(&notification.tags))
            .body(notification.body.clone())
            .send()
            .with_context(|| format!("post notification to {url}"))?;
        if !response.status().is_success() {
            return Err(anyhow!("ntfy returned {}", response.status()));
        }
        debug!("notification delivered");
        Ok(())
    }
}

/// Map a priority tag onto the recognized set; unknown values become
/// `default`.
pub fn normalize_priority(priority: &str) -> &'static str {
    match priority.trim().to_lowercase().as_str() {
        "min" | "lowest" => "min",
        "low" => "low",
        "default" => "default",
        "high" => "high",
        "max" | "urgent" => "max",
        _ => "default",
    }
}

/// Trim tag elements and strip characters outside Latin-1.
pub fn sanitize_tags(tags: &str) -> String {
    tags.split(',')
        .map(|tag| latin1(tag.trim()))
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

fn latin1(text: &str) -> String {
    text.chars().filter(|c| (*c as u32) < 256).collect()
}
