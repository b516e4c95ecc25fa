use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Group label used when a channel carries no `group-title`
pub const UNCATEGORIZED: &str = "uncategorized";

/// Display name used when a channel has an empty name
pub const UNNAMED: &str = "unnamed";

/// Reachability status of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Unknown,
    Online,
    Offline,
    /// URL line without a usable `#EXTINF` header
    Malformed,
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Unknown => write!(f, "unknown"),
            ChannelStatus::Online => write!(f, "online"),
            ChannelStatus::Offline => write!(f, "offline"),
            ChannelStatus::Malformed => write!(f, "malformed"),
        }
    }
}

impl std::str::FromStr for ChannelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "malformed" => Ok(Self::Malformed),
            other => Err(format!("unknown channel status: {}", other)),
        }
    }
}

/// Single stream entry of the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default)]
    pub status: ChannelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Subscription the channel was first seen in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Alternate stream URLs listed next to `url` in the feed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
}

impl Channel {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            group_title: None,
            logo_url: None,
            tvg_id: None,
            resolution: None,
            status: ChannelStatus::Unknown,
            last_checked: None,
            latency_ms: None,
            last_error: None,
            source: None,
            mirrors: Vec::new(),
        }
    }

    /// Entry for a URL line that had no valid `#EXTINF` before it
    pub fn malformed(url: impl Into<String>) -> Self {
        Self {
            status: ChannelStatus::Malformed,
            ..Self::new(String::new(), url)
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_title = Some(group.into());
        self
    }

    /// Group label, `uncategorized` when missing or blank
    pub fn group(&self) -> &str {
        match self.group_title.as_deref().map(str::trim) {
            Some(g) if !g.is_empty() => g,
            _ => UNCATEGORIZED,
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            UNNAMED
        } else {
            &self.name
        }
    }
}

/// Outcome of the last fetch of a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub success: bool,
    pub channel_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Upstream M3U feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetched: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<FetchResult>,
}

impl Subscription {
    pub fn new(source_url: impl Into<String>, name: Option<String>) -> Self {
        Self {
            source_url: source_url.into(),
            name,
            added_at: Utc::now(),
            last_fetched: None,
            last_result: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_defaults_to_uncategorized() {
        let mut channel = Channel::new("News", "http://a/1");
        assert_eq!(channel.group(), UNCATEGORIZED);

        channel.group_title = Some("   ".to_string());
        assert_eq!(channel.group(), UNCATEGORIZED);

        channel.group_title = Some("Sports".to_string());
        assert_eq!(channel.group(), "Sports");
    }

    #[test]
    fn test_malformed_channel() {
        let channel = Channel::malformed("http://a/raw");
        assert_eq!(channel.status, ChannelStatus::Malformed);
        assert_eq!(channel.name, "");
        assert_eq!(channel.display_name(), UNNAMED);
        assert!(channel.group_title.is_none());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&ChannelStatus::Offline).unwrap();
        assert_eq!(json, "\"offline\"");
        assert_eq!("ONLINE".parse::<ChannelStatus>().unwrap(), ChannelStatus::Online);
        assert!("bogus".parse::<ChannelStatus>().is_err());
    }
}
