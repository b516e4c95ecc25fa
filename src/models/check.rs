use chrono::{DateTime, Utc};
use serde::Serialize;

use super::channel::ChannelStatus;

/// Per-channel result inside a check run
#[derive(Debug, Clone, Serialize)]
pub struct CheckDetail {
    pub url: String,
    pub name: String,
    pub status: ChannelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Alternate URL that replaced `url` after a successful repair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repaired_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

/// Progress of one checker invocation.
///
/// Only the checker mutates it, through `record` and `finish`; everybody
/// else sees clones.
#[derive(Debug, Clone, Serialize)]
pub struct CheckRun {
    pub run_id: String,
    pub total: usize,
    pub completed: usize,
    pub online_count: usize,
    pub offline_count: usize,
    pub repaired_count: usize,
    pub is_running: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub details: Vec<CheckDetail>,
}

impl CheckRun {
    pub fn new(total: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            total,
            completed: 0,
            online_count: 0,
            offline_count: 0,
            repaired_count: 0,
            is_running: true,
            started_at: Utc::now(),
            finished_at: None,
            details: Vec::with_capacity(total),
        }
    }

    pub(crate) fn record(&mut self, detail: CheckDetail) {
        if !self.is_running {
            return;
        }

        self.completed += 1;
        match detail.status {
            ChannelStatus::Online => self.online_count += 1,
            _ => self.offline_count += 1,
        }
        if detail.repaired_url.is_some() {
            self.repaired_count += 1;
        }
        self.details.push(detail);
    }

    pub(crate) fn finish(&mut self) {
        self.is_running = false;
        self.finished_at = Some(Utc::now());
    }

    /// Completion ratio in percent
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total as f64 * 100.0).round()
    }
}
