use chrono::{DateTime, Utc};
use serde::Serialize;

use super::channel::Channel;

/// What happened to one incoming channel during a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeOutcome {
    Added,
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeDetail {
    pub url: String,
    pub name: String,
    pub outcome: MergeOutcome,
}

/// Counters and per-entry details of one merge
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub total: usize,
    pub added: usize,
    pub skipped: usize,
    pub details: Vec<MergeDetail>,
}

impl MergeReport {
    pub fn absorb(&mut self, other: MergeReport) {
        self.total += other.total;
        self.added += other.added;
        self.skipped += other.skipped;
        self.details.extend(other.details);
    }
}

/// Group name with its channel count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub channel_count: usize,
}

/// Result of removing offline channels
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub remaining: usize,
    pub removed_channels: Vec<Channel>,
}

/// What started a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineTrigger {
    Startup,
    Interval,
    Manual,
}

impl std::fmt::Display for PipelineTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineTrigger::Startup => write!(f, "startup"),
            PipelineTrigger::Interval => write!(f, "interval"),
            PipelineTrigger::Manual => write!(f, "manual"),
        }
    }
}

/// Outcome of one subscription inside a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct FeedReport {
    pub source_url: String,
    pub success: bool,
    pub channel_count: usize,
    pub added: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a fetch → parse → merge pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub run_id: String,
    pub trigger: PipelineTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub feeds: Vec<FeedReport>,
    /// Merge counters and per-entry outcomes across all feeds
    #[serde(flatten)]
    pub merge: MergeReport,
    pub catalog_size: usize,
}

impl PipelineSummary {
    pub fn failed_feeds(&self) -> usize {
        self.feeds.iter().filter(|f| !f.success).count()
    }
}
