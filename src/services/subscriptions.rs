use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use crate::error::CoreError;
use crate::models::{FetchResult, Subscription};
use crate::services::store::CatalogStore;

/// Registry of feed sources, persisted after every change
pub struct SubscriptionRegistry {
    subscriptions: RwLock<Vec<Subscription>>,
    store: Arc<dyn CatalogStore>,
}

impl SubscriptionRegistry {
    /// Load the registry from the store
    pub async fn load(store: Arc<dyn CatalogStore>) -> Result<Self, CoreError> {
        let subscriptions = store.load_subscriptions().await?;
        tracing::info!("Loaded {} subscriptions", subscriptions.len());
        Ok(Self {
            subscriptions: RwLock::new(subscriptions),
            store,
        })
    }

    pub async fn list(&self) -> Vec<Subscription> {
        self.subscriptions.read().await.clone()
    }

    pub async fn add(&self, url: &str, name: Option<String>) -> Result<Subscription, CoreError> {
        let url = url.trim();
        let parsed = Url::parse(url).map_err(|_| CoreError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CoreError::InvalidUrl(format!("{} (expected http or https)", url)));
        }

        let mut subscriptions = self.subscriptions.write().await;
        if subscriptions.iter().any(|s| s.source_url == url) {
            return Err(CoreError::SubscriptionExists(url.to_string()));
        }

        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let subscription = Subscription::new(url, name);
        subscriptions.push(subscription.clone());

        if let Err(e) = self.store.save_subscriptions(&subscriptions).await {
            subscriptions.pop();
            return Err(e.into());
        }

        tracing::info!("Subscription added: {}", url);
        Ok(subscription)
    }

    pub async fn remove(&self, url: &str) -> Result<(), CoreError> {
        let url = url.trim();
        let mut subscriptions = self.subscriptions.write().await;
        let position = subscriptions
            .iter()
            .position(|s| s.source_url == url)
            .ok_or_else(|| CoreError::SubscriptionNotFound(url.to_string()))?;

        let removed = subscriptions.remove(position);
        if let Err(e) = self.store.save_subscriptions(&subscriptions).await {
            subscriptions.insert(position, removed);
            return Err(e.into());
        }

        tracing::info!("Subscription removed: {}", url);
        Ok(())
    }

    /// Record the outcome of a fetch. Not persisted here; the pipeline
    /// saves once per run.
    pub async fn record_result(&self, url: &str, result: FetchResult) {
        let mut subscriptions = self.subscriptions.write().await;
        if let Some(sub) = subscriptions.iter_mut().find(|s| s.source_url == url) {
            sub.last_fetched = Some(Utc::now());
            sub.last_result = Some(result);
        }
    }

    pub async fn persist(&self) -> Result<(), CoreError> {
        let subscriptions = self.subscriptions.read().await;
        self.store.save_subscriptions(&subscriptions).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;

    async fn registry() -> (SubscriptionRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let registry = SubscriptionRegistry::load(store.clone()).await.unwrap();
        (registry, store)
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let (registry, store) = registry().await;

        registry.add("http://feeds.tv/a.m3u", Some(" A ".into())).await.unwrap();
        registry.add("https://feeds.tv/b.m3u", None).await.unwrap();

        let subs = registry.list().await;
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].name.as_deref(), Some("A"));
        assert_eq!(store.subscriptions.lock().len(), 2);

        registry.remove("http://feeds.tv/a.m3u").await.unwrap();
        assert_eq!(registry.list().await.len(), 1);
        assert_eq!(store.subscriptions.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_duplicates_and_bad_urls() {
        let (registry, _) = registry().await;
        registry.add("http://feeds.tv/a.m3u", None).await.unwrap();

        assert!(matches!(
            registry.add("http://feeds.tv/a.m3u", None).await,
            Err(CoreError::SubscriptionExists(_))
        ));
        assert!(matches!(
            registry.add("ftp://feeds.tv/a.m3u", None).await,
            Err(CoreError::InvalidUrl(_))
        ));
        assert!(matches!(
            registry.add("feeds.tv", None).await,
            Err(CoreError::InvalidUrl(_))
        ));
        assert!(matches!(
            registry.remove("http://nope").await,
            Err(CoreError::SubscriptionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_record_result() {
        let (registry, _) = registry().await;
        registry.add("http://feeds.tv/a.m3u", None).await.unwrap();

        registry
            .record_result(
                "http://feeds.tv/a.m3u",
                FetchResult {
                    success: true,
                    channel_count: 12,
                    error: None,
                },
            )
            .await;

        let sub = &registry.list().await[0];
        assert!(sub.last_fetched.is_some());
        assert_eq!(sub.last_result.as_ref().unwrap().channel_count, 12);
    }
}
