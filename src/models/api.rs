use serde::{Deserialize, Serialize};

use super::channel::{Channel, ChannelStatus};
use super::report::GroupInfo;

/// Query parameters for the catalog listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<ChannelStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

/// Filtered catalog page
#[derive(Debug, Serialize)]
pub struct CatalogPage {
    pub channels: Vec<Channel>,
    pub groups: Vec<GroupInfo>,
    /// Number of channels matching the filter, before pagination
    pub total: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Groups response
#[derive(Debug, Serialize)]
pub struct GroupsResponse {
    pub groups: Vec<GroupInfo>,
    pub total: usize,
}

/// Request to register a feed
#[derive(Debug, Deserialize)]
pub struct AddSubscriptionRequest {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Query carrying a single URL (channel or subscription removal)
#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: String,
}

/// Request to start a check run; missing fields fall back to configuration
#[derive(Debug, Default, Deserialize)]
pub struct StartCheckRequest {
    #[serde(default)]
    pub concurrency: Option<i64>,
    #[serde(default)]
    pub timeout_ms: Option<i64>,
    #[serde(default)]
    pub auto_repair: Option<bool>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub urls: Option<Vec<String>>,
}

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    M3u,
    Json,
}

/// Query parameters for export
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub only_online: bool,
}
