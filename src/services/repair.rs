//! Alternate-URL strategies used by the checker's auto-repair mode.
//!
//! A strategy only proposes a candidate; the checker probes it before
//! accepting.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::services::catalog::SharedCatalog;

/// Proposes an alternate URL for a stream that failed its probe
#[async_trait]
pub trait RepairStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve_alternate(&self, url: &str) -> Option<String>;

    /// Every candidate in preference order. Strategies that know more than
    /// one alternate override this.
    async fn alternates(&self, url: &str) -> Vec<String> {
        self.resolve_alternate(url).await.into_iter().collect()
    }
}

/// Proposes the mirror URLs the feed listed next to the channel
pub struct MirrorRepair {
    catalog: SharedCatalog,
}

impl MirrorRepair {
    pub fn new(catalog: SharedCatalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl RepairStrategy for MirrorRepair {
    fn name(&self) -> &'static str {
        "mirror"
    }

    async fn resolve_alternate(&self, url: &str) -> Option<String> {
        self.alternates(url).await.into_iter().next()
    }

    async fn alternates(&self, url: &str) -> Vec<String> {
        self.catalog
            .read()
            .await
            .get(url)
            .map(|c| c.mirrors.clone())
            .unwrap_or_default()
    }
}

/// Follows the redirect chain and proposes the final location
pub struct RedirectResolver {
    client: Client,
    timeout: Duration,
}

impl RedirectResolver {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl RepairStrategy for RedirectResolver {
    fn name(&self) -> &'static str {
        "redirect"
    }

    async fn resolve_alternate(&self, url: &str) -> Option<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .ok()?;

        let final_url = response.url().to_string();
        (final_url != url).then_some(final_url)
    }
}

/// Swaps http and https
pub struct SchemeSwap;

#[async_trait]
impl RepairStrategy for SchemeSwap {
    fn name(&self) -> &'static str {
        "scheme-swap"
    }

    async fn resolve_alternate(&self, url: &str) -> Option<String> {
        if let Some(rest) = url.strip_prefix("https://") {
            Some(format!("http://{}", rest))
        } else {
            url.strip_prefix("http://").map(|rest| format!("https://{}", rest))
        }
    }
}
