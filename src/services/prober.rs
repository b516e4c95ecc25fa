//! Single-URL reachability probe
//!
//! Playlists get a GET with a bounded partial read, everything else a HEAD
//! (falling back to a bounded GET when HEAD is not supported). No retries
//! happen here; the checker owns retry policy.

use futures::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::{Duration, Instant};
use url::Url;

use crate::models::ChannelStatus;

/// Upper bound of bytes read from a stream body
const PROBE_READ_BYTES: usize = 4 * 1024;

lazy_static! {
    static ref RESOLUTION_REGEX: Regex = Regex::new(r"RESOLUTION=(\d+)x(\d+)").unwrap();
}

/// Result of one probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub status: ChannelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Highest `RESOLUTION=` advertised by a master playlist, if read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl ProbeOutcome {
    pub fn online(latency: Duration, resolution: Option<String>) -> Self {
        Self {
            status: ChannelStatus::Online,
            latency_ms: Some(latency.as_millis() as u64),
            reason: None,
            resolution,
        }
    }

    pub fn offline(reason: impl Into<String>) -> Self {
        Self {
            status: ChannelStatus::Offline,
            latency_ms: None,
            reason: Some(reason.into()),
            resolution: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ChannelStatus::Online
    }
}

/// Short human-readable reason for a transport error
fn describe_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timeout".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else if err.is_redirect() {
        "too many redirects".to_string()
    } else {
        format!("request failed: {}", err)
    }
}

fn is_playlist_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

/// Highest resolution advertised in a master playlist chunk
fn extract_resolution(body: &str) -> Option<String> {
    RESOLUTION_REGEX
        .captures_iter(body)
        .filter_map(|caps| {
            let w: u32 = caps.get(1)?.as_str().parse().ok()?;
            let h: u32 = caps.get(2)?.as_str().parse().ok()?;
            Some((w, h))
        })
        .max_by_key(|(w, h)| u64::from(*w) * u64::from(*h))
        .map(|(w, h)| format!("{}x{}", w, h))
}

/// Read at most `PROBE_READ_BYTES` of the body
async fn read_head(response: Response) -> Result<Vec<u8>, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::with_capacity(PROBE_READ_BYTES);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = PROBE_READ_BYTES - buf.len();
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buf.len() >= PROBE_READ_BYTES {
            break;
        }
    }

    Ok(buf)
}

/// HTTP reachability prober
#[derive(Clone)]
pub struct Prober {
    client: Client,
}

impl Prober {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .danger_accept_invalid_certs(true) // Plenty of IPTV hosts run self-signed certs
            .build()?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Probe one URL. Never errors: every failure is an offline outcome.
    pub async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let parsed = match Url::parse(url.trim()) {
            Ok(parsed) => parsed,
            Err(_) => return ProbeOutcome::offline("invalid url"),
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return ProbeOutcome::offline(format!("unsupported scheme: {}", parsed.scheme()));
        }

        // Hard bound on the whole probe, body read included
        match tokio::time::timeout(timeout, self.probe_inner(parsed, timeout)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::offline("timeout"),
        }
    }

    async fn probe_inner(&self, url: Url, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();

        if is_playlist_url(&url) {
            return self.probe_get(url, timeout, start, true).await;
        }

        let response = match self.client.head(url.clone()).timeout(timeout).send().await {
            Ok(resp) => resp,
            Err(e) => return ProbeOutcome::offline(describe_error(&e)),
        };

        match response.status() {
            status if status.is_success() => ProbeOutcome::online(start.elapsed(), None),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                tracing::debug!("HEAD not supported by {}, falling back to GET", url);
                self.probe_get(url, timeout, start, false).await
            }
            status => ProbeOutcome::offline(format!("HTTP {}", status.as_u16())),
        }
    }

    async fn probe_get(
        &self,
        url: Url,
        timeout: Duration,
        start: Instant,
        expect_playlist: bool,
    ) -> ProbeOutcome {
        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(resp) => resp,
            Err(e) => return ProbeOutcome::offline(describe_error(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            return ProbeOutcome::offline(format!("HTTP {}", status.as_u16()));
        }
        let latency = start.elapsed();

        let head = match read_head(response).await {
            Ok(head) => head,
            Err(e) => return ProbeOutcome::offline(describe_error(&e)),
        };
        if head.is_empty() {
            return ProbeOutcome::offline("empty response");
        }

        if !expect_playlist {
            return ProbeOutcome::online(latency, None);
        }

        let text = String::from_utf8_lossy(&head);
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if !text.starts_with("#EXTM3U") && !text.contains("#EXTINF") {
            return ProbeOutcome::offline("not a playlist");
        }

        ProbeOutcome::online(latency, extract_resolution(text))
    }
}
