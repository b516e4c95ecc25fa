use lazy_static::lazy_static;
use regex::Regex;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use url::Url;

use crate::models::Channel;

lazy_static! {
    /// Regex to normalize multiple whitespaces into single space
    static ref MULTI_SPACE_REGEX: Regex = Regex::new(r"\s{2,}").unwrap();
    /// EXTINF attributes, quoted or bare (tvg-logo="...", group-title=News)
    static ref ATTR_REGEX: Regex =
        Regex::new(r#"([A-Za-z0-9_-]+)=(?:"([^"]*)"|([^\s",]+))"#).unwrap();
    /// Separators between several URLs written on one line
    static ref URL_SPLIT_REGEX: Regex = Regex::new(r"[;#\s]+").unwrap();
}

const STREAM_SCHEMES: [&str; 3] = ["http://", "https://", "rtmp://"];

/// Parsed EXTINF line data
#[derive(Debug, Default)]
struct ExtinfData {
    attributes: HashMap<String, String>,
    title: String,
}

impl ExtinfData {
    fn attr(&self, key: &str) -> Option<String> {
        self.attributes
            .get(key)
            .map(|v| normalize_text(v))
            .filter(|v| !v.is_empty())
    }
}

/// Parse an EXTINF line
/// Format: #EXTINF:duration tvg-id="..." tvg-logo="..." group-title="...",Title
///
/// The title starts after the first comma outside a quoted value. A line
/// without such a comma is invalid.
fn parse_extinf(line: &str) -> Option<ExtinfData> {
    let content = line.strip_prefix("#EXTINF:")?;

    let mut in_quotes = false;
    let mut split_at = None;
    for (idx, ch) in content.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                split_at = Some(idx);
                break;
            }
            _ => {}
        }
    }
    let split_at = split_at?;

    let header = &content[..split_at];
    let title = normalize_text(&content[split_at + 1..]);

    let mut attributes = HashMap::new();
    for caps in ATTR_REGEX.captures_iter(header) {
        let key = caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        attributes.insert(key, value);
    }

    Some(ExtinfData { attributes, title })
}

/// Normalize text: trim and collapse multiple spaces into single space
fn normalize_text(text: &str) -> String {
    let trimmed = text.trim();
    MULTI_SPACE_REGEX.replace_all(trimmed, " ").to_string()
}

/// Characters allowed in a URI reference
fn is_uri_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~:/?#[]@!$&'()*+,;=%".contains(c)
}

/// Stream URLs of a URL line, main URL first.
///
/// Some feeds put several mirrors on one line; every token with a stream
/// scheme is kept, in order. A line with none is accepted only as a
/// relative reference resolved against `base`. Anything else yields an
/// empty list.
fn extract_stream_urls(line: &str, base: Option<&Url>) -> Vec<String> {
    let streams: Vec<String> = URL_SPLIT_REGEX
        .split(line)
        .filter(|token| {
            let lower = token.to_ascii_lowercase();
            STREAM_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
        })
        .map(str::to_string)
        .collect();

    if !streams.is_empty() {
        return streams;
    }

    if !line.chars().all(is_uri_char) {
        return Vec::new();
    }

    base.and_then(|base| base.join(line).ok())
        .filter(|resolved| matches!(resolved.scheme(), "http" | "https"))
        .map(|resolved| vec![resolved.to_string()])
        .unwrap_or_default()
}

/// SHA1 hex digest, used as a stable identifier for dedup keys
pub fn hash_url(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Parse M3U text into channels, in input order.
///
/// Never fails: a URL line with no valid `#EXTINF` before it becomes a
/// `malformed` channel, everything else that is not understood is skipped.
pub fn parse(raw: &str) -> Vec<Channel> {
    parse_with_base(raw, None)
}

/// Same as [`parse`], resolving relative stream URLs against the feed URL
pub fn parse_with_base(raw: &str, base: Option<&Url>) -> Vec<Channel> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let mut channels = Vec::new();
    let mut current_extinf: Option<ExtinfData> = None;
    let mut malformed = 0usize;
    let mut skipped = 0usize;

    for line in raw.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("#EXTINF:") {
            if current_extinf.is_some() {
                tracing::debug!("EXTINF without stream URL dropped");
            }
            current_extinf = parse_extinf(trimmed);
            continue;
        }

        if let Some(group) = trimmed.strip_prefix("#EXTGRP:") {
            if let Some(extinf) = current_extinf.as_mut() {
                extinf
                    .attributes
                    .entry("group-title".to_string())
                    .or_insert_with(|| group.to_string());
            }
            continue;
        }

        // Header and any other directive or comment
        if trimmed.starts_with('#') {
            continue;
        }

        let mut urls = extract_stream_urls(trimmed, base).into_iter();
        let Some(stream_url) = urls.next() else {
            skipped += 1;
            if current_extinf.take().is_some() {
                tracing::debug!("EXTINF followed by an unusable URL line dropped");
            }
            continue;
        };

        let mut channel = match current_extinf.take() {
            Some(extinf) => {
                let mut channel = Channel::new(extinf.title.clone(), stream_url);
                channel.group_title = extinf.attr("group-title");
                channel.logo_url = extinf.attr("tvg-logo");
                channel.tvg_id = extinf.attr("tvg-id");
                channel
            }
            None => {
                malformed += 1;
                Channel::malformed(stream_url)
            }
        };
        channel.mirrors = urls.collect();
        channels.push(channel);
    }

    if malformed > 0 || skipped > 0 {
        tracing::warn!(
            "Parsed {} channels ({} malformed, {} unusable lines skipped)",
            channels.len(),
            malformed,
            skipped
        );
    } else {
        tracing::debug!("Parsed {} channels", channels.len());
    }

    channels
}
