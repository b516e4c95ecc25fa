//! Channel catalog: the deduplicated, insertion-ordered channel collection
//!
//! - Merging folds parsed feeds in, first write wins on the dedup key
//! - Groups are derived on read
//! - Status updates come from the checker, removals from explicit calls

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use crate::models::{
    CatalogPage, CatalogQuery, Channel, ChannelStatus, CleanupReport, GroupInfo, MergeDetail,
    MergeOutcome, MergeReport,
};
use crate::services::m3u_parser::hash_url;

/// Catalog shared between the pipeline, the checker and the HTTP layer
pub type SharedCatalog = Arc<RwLock<Catalog>>;

/// Dedup key of a stream URL.
///
/// Scheme + host (+ explicit non-default port) + path + query. Scheme and
/// host compare case-insensitively, trailing slashes are ignored, user info
/// and fragments are dropped. Unparseable input keys on its trimmed text.
pub fn dedup_key(url: &str) -> String {
    let trimmed = url.trim();

    let parsed = match Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() => parsed,
        _ => return trimmed.trim_end_matches('/').to_string(),
    };

    let mut key = format!(
        "{}://{}",
        parsed.scheme().to_ascii_lowercase(),
        parsed.host_str().unwrap_or_default().to_ascii_lowercase()
    );
    if let Some(port) = parsed.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(parsed.path().trim_end_matches('/'));
    if let Some(query) = parsed.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

/// Stable channel identifier, the SHA1 of the dedup key
pub fn channel_id(url: &str) -> String {
    hash_url(&dedup_key(url))
}

/// Catalog of channels keyed by normalized URL
#[derive(Debug, Default)]
pub struct Catalog {
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted channels, dropping later duplicates
    pub fn from_channels(channels: Vec<Channel>) -> Self {
        let mut catalog = Self::new();
        let report = catalog.merge(channels);
        if report.skipped > 0 {
            tracing::warn!("Dropped {} duplicate channels from stored catalog", report.skipped);
        }
        catalog
    }

    pub fn shared(self) -> SharedCatalog {
        Arc::new(RwLock::new(self))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(&dedup_key(url))
    }

    pub fn get(&self, url: &str) -> Option<&Channel> {
        self.index.get(&dedup_key(url)).map(|&i| &self.channels[i])
    }

    pub fn get_mut(&mut self, url: &str) -> Option<&mut Channel> {
        match self.index.get(&dedup_key(url)) {
            Some(&i) => Some(&mut self.channels[i]),
            None => None,
        }
    }

    /// Merge incoming channels. Known keys are reported as duplicates and
    /// leave the existing entry untouched.
    pub fn merge(&mut self, incoming: Vec<Channel>) -> MergeReport {
        let mut report = MergeReport {
            total: incoming.len(),
            ..Default::default()
        };

        for channel in incoming {
            let key = dedup_key(&channel.url);
            let outcome = if self.index.contains_key(&key) {
                report.skipped += 1;
                MergeOutcome::Duplicate
            } else {
                report.added += 1;
                MergeOutcome::Added
            };

            report.details.push(MergeDetail {
                url: channel.url.clone(),
                name: channel.name.clone(),
                outcome,
            });

            if outcome == MergeOutcome::Added {
                self.index.insert(key, self.channels.len());
                self.channels.push(channel);
            }
        }

        report
    }

    /// Move a channel to a new URL. Fails when the new key is taken by
    /// another channel or the old one is unknown. The new URL leaves the
    /// mirror list and the old one joins its end.
    pub fn replace_url(&mut self, old_url: &str, new_url: &str) -> bool {
        let old_key = dedup_key(old_url);
        let new_key = dedup_key(new_url);

        let Some(&idx) = self.index.get(&old_key) else {
            return false;
        };
        if old_key != new_key && self.index.contains_key(&new_key) {
            return false;
        }

        self.index.remove(&old_key);
        self.index.insert(new_key.clone(), idx);

        let channel = &mut self.channels[idx];
        let old = std::mem::replace(&mut channel.url, new_url.to_string());
        channel.mirrors.retain(|m| dedup_key(m) != new_key);
        if old_key != new_key {
            channel.mirrors.push(old);
        }
        true
    }

    pub fn remove(&mut self, url: &str) -> Option<Channel> {
        let idx = self.index.remove(&dedup_key(url))?;
        let channel = self.channels.remove(idx);
        self.reindex();
        Some(channel)
    }

    /// Remove channels that are offline and were last checked before the
    /// retention window. Unchecked channels are kept.
    pub fn cleanup_offline(&mut self, retention: Duration, now: DateTime<Utc>) -> CleanupReport {
        let cutoff = now - retention;
        let (removed, kept): (Vec<Channel>, Vec<Channel>) =
            std::mem::take(&mut self.channels).into_iter().partition(|c| {
                c.status == ChannelStatus::Offline
                    && c.last_checked.map_or(false, |checked| checked <= cutoff)
            });

        self.channels = kept;
        self.reindex();

        CleanupReport {
            removed: removed.len(),
            remaining: self.channels.len(),
            removed_channels: removed,
        }
    }

    /// Distinct groups with channel counts, sorted by name
    pub fn groups(&self) -> Vec<GroupInfo> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for channel in &self.channels {
            *counts.entry(channel.group()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(name, channel_count)| GroupInfo {
                name: name.to_string(),
                channel_count,
            })
            .collect()
    }

    /// Filtered, paginated listing. `max_page` caps the page size.
    pub fn query(&self, query: &CatalogQuery, max_page: usize) -> CatalogPage {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let group = query.group.as_deref().map(str::trim).filter(|g| !g.is_empty());

        let matching: Vec<&Channel> = self
            .channels
            .iter()
            .filter(|c| group.map_or(true, |g| c.group() == g))
            .filter(|c| query.status.map_or(true, |s| c.status == s))
            .filter(|c| {
                search.as_deref().map_or(true, |needle| {
                    c.name.to_lowercase().contains(needle) || c.url.to_lowercase().contains(needle)
                })
            })
            .collect();

        let total = matching.len();
        let limit = query.limit.unwrap_or(max_page).min(max_page);
        let channels: Vec<Channel> = matching
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect();
        let has_more = query.offset + channels.len() < total;

        CatalogPage {
            channels,
            groups: self.groups(),
            total,
            offset: query.offset,
            has_more,
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .channels
            .iter()
            .enumerate()
            .map(|(i, c)| (dedup_key(&c.url), i))
            .collect();
    }
}
