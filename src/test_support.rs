//! Helpers shared by async tests

use async_trait::async_trait;
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::error::FetchError;
use crate::services::fetcher::FeedFetcher;

/// Serve `app` on an ephemeral local port
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Fetcher answering from a fixed map; unknown URLs fail with HTTP 404
#[derive(Default)]
pub struct StaticFetcher {
    pub feeds: HashMap<String, String>,
    pub delay: Option<std::time::Duration>,
}

impl StaticFetcher {
    pub fn new(feeds: &[(&str, &str)]) -> Self {
        Self {
            feeds: feeds
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
            delay: None,
        }
    }
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.feeds.get(url).cloned().ok_or(FetchError::Http {
            status: 404,
            reason: "Not Found".to_string(),
        })
    }
}

/// M3U text for `count` channels under `host`, named `<prefix> <i>`
pub fn m3u_feed(host: &str, prefix: &str, count: usize) -> String {
    let mut out = String::from("#EXTM3U\n");
    for i in 0..count {
        out.push_str(&format!(
            "#EXTINF:-1 group-title=\"{}\",{} {}\nhttp://{}/{}/{}\n",
            prefix, prefix, i, host, prefix, i
        ));
    }
    out
}
