use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::io::StreamReader;

use crate::error::FetchError;

/// Retrieves the raw body of one subscription
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Whether text looks like an M3U playlist
pub fn is_m3u_content(content: &str) -> bool {
    let content = content.trim_start_matches('\u{feff}').trim_start();
    let head_end = content
        .char_indices()
        .nth(1000)
        .map(|(i, _)| i)
        .unwrap_or(content.len());
    content.starts_with("#EXTM3U") || content[..head_end].contains("#EXTINF:")
}

/// HTTP feed fetcher with retry on 429 and network errors
pub struct HttpFeedFetcher {
    client: Client,
    max_retries: u32,
    max_size_mb: usize,
}

impl HttpFeedFetcher {
    pub fn new(
        user_agent: &str,
        timeout_ms: u64,
        max_retries: u32,
        max_size_mb: usize,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            max_retries,
            max_size_mb,
        })
    }

    fn max_bytes(&self) -> u64 {
        (self.max_size_mb as u64) * 1024 * 1024
    }

    fn backoff(attempt: u32) -> Duration {
        Duration::from_millis((1u64 << attempt).saturating_mul(500).min(10_000))
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Response, FetchError> {
        let mut attempt = 0;

        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        if let Some(len) = resp.content_length() {
                            if len > self.max_bytes() {
                                return Err(FetchError::TooLarge {
                                    size_mb: len as f64 / 1024f64 / 1024f64,
                                    limit_mb: self.max_size_mb,
                                });
                            }
                        }
                        return Ok(resp);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                        let backoff = Self::backoff(attempt);
                        tracing::warn!("fetch_retry" = attempt + 1, "reason" = "429", "backoff_ms" = backoff.as_millis() as u64);
                        sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(FetchError::Http {
                        status: status.as_u16(),
                        reason: status.canonical_reason().unwrap_or("Error").to_string(),
                    });
                }
                Err(err) => {
                    if attempt < self.max_retries {
                        let backoff = Self::backoff(attempt);
                        tracing::warn!("fetch_retry" = attempt + 1, "reason" = "network", "backoff_ms" = backoff.as_millis() as u64);
                        sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.fetch_with_retry(url).await?;

        if let Some(len) = response.content_length() {
            tracing::info!("Playlist size: {:.2} MB", len as f64 / 1024.0 / 1024.0);
        }

        // Stream the body with a hard cap, servers often omit Content-Length
        let stream_reader = StreamReader::new(
            response
                .bytes_stream()
                .map(|result| result.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))),
        );
        let limit = self.max_bytes();
        let mut body = Vec::new();
        stream_reader
            .take(limit + 1)
            .read_to_end(&mut body)
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if body.len() as u64 > limit {
            return Err(FetchError::TooLarge {
                size_mb: body.len() as f64 / 1024f64 / 1024f64,
                limit_mb: self.max_size_mb,
            });
        }

        let content = String::from_utf8_lossy(&body).into_owned();
        if !is_m3u_content(&content) {
            return Err(FetchError::NotPlaylist);
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;
    use axum::{http::StatusCode, routing::get, Router};

    #[test]
    fn test_is_m3u_content() {
        assert!(is_m3u_content("\u{feff}#EXTM3U\n"));
        assert!(is_m3u_content("\n#EXTINF:-1,A\nhttp://a/1"));
        assert!(!is_m3u_content("<html></html>"));
    }

    #[tokio::test]
    async fn test_fetch_playlist() {
        let app = Router::new()
            .route("/ok.m3u", get(|| async { "#EXTM3U\n#EXTINF:-1,A\nhttp://a/1\n" }))
            .route("/html", get(|| async { "<html>login</html>" }))
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "") }));
        let addr = spawn_server(app).await;
        let fetcher = HttpFeedFetcher::new("test-agent", 2_000, 0, 1).unwrap();

        let body = fetcher.fetch(&format!("http://{}/ok.m3u", addr)).await.unwrap();
        assert!(body.contains("http://a/1"));

        let err = fetcher.fetch(&format!("http://{}/html", addr)).await.unwrap_err();
        assert!(matches!(err, FetchError::NotPlaylist));

        let err = fetcher.fetch(&format!("http://{}/missing", addr)).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let big = format!("#EXTM3U\n{}", "#".repeat(2 * 1024 * 1024));
        let app = Router::new().route("/big.m3u", get(move || async move { big }));
        let addr = spawn_server(app).await;
        let fetcher = HttpFeedFetcher::new("test-agent", 5_000, 0, 1).unwrap();

        let err = fetcher.fetch(&format!("http://{}/big.m3u", addr)).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit_mb: 1, .. }));
    }
}
