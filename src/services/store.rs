//! Persistence of the catalog and the subscription registry
//!
//! The core only sees the `CatalogStore` trait. The file store keeps one
//! JSON document per collection and replaces it atomically (tmp + rename).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::models::{Channel, Subscription};

const CHANNELS_FILE: &str = "channels.json";
const SUBSCRIPTIONS_FILE: &str = "subscriptions.json";

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load_catalog(&self) -> Result<Vec<Channel>>;
    async fn save_catalog(&self, channels: &[Channel]) -> Result<()>;
    async fn load_subscriptions(&self) -> Result<Vec<Subscription>>;
    async fn save_subscriptions(&self, subscriptions: &[Subscription]) -> Result<()>;
}

/// JSON files under a data directory
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// Create the store, creating the data directory if needed
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    /// Missing file reads as empty; unreadable content is an error
    async fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.data_dir.join(file);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).with_context(|| format!("Corrupt data file {}", path.display()))
    }

    async fn write_json<T: Serialize>(&self, file: &str, items: &[T]) -> Result<()> {
        let final_path = self.data_dir.join(file);
        let tmp_path = self.data_dir.join(format!("{}.tmp", file));

        let bytes = serde_json::to_vec_pretty(items)?;
        let mut writer = BufWriter::new(File::create(&tmp_path).await?);
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        drop(writer);

        fs::rename(&tmp_path, &final_path)
            .await
            .with_context(|| format!("Failed to replace {}", final_path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for JsonFileStore {
    async fn load_catalog(&self) -> Result<Vec<Channel>> {
        self.read_json(CHANNELS_FILE).await
    }

    async fn save_catalog(&self, channels: &[Channel]) -> Result<()> {
        self.write_json(CHANNELS_FILE, channels).await?;
        tracing::debug!("Saved {} channels", channels.len());
        Ok(())
    }

    async fn load_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.read_json(SUBSCRIPTIONS_FILE).await
    }

    async fn save_subscriptions(&self, subscriptions: &[Subscription]) -> Result<()> {
        self.write_json(SUBSCRIPTIONS_FILE, subscriptions).await
    }
}

#[cfg(test)]
pub use memory::MemoryStore;

#[cfg(test)]
mod memory {
    use super::*;
    use parking_lot::Mutex;

    /// In-memory store for tests
    #[derive(Default)]
    pub struct MemoryStore {
        pub channels: Mutex<Vec<Channel>>,
        pub subscriptions: Mutex<Vec<Subscription>>,
        pub catalog_saves: Mutex<usize>,
    }

    #[async_trait]
    impl CatalogStore for MemoryStore {
        async fn load_catalog(&self) -> Result<Vec<Channel>> {
            Ok(self.channels.lock().clone())
        }

        async fn save_catalog(&self, channels: &[Channel]) -> Result<()> {
            *self.channels.lock() = channels.to_vec();
            *self.catalog_saves.lock() += 1;
            Ok(())
        }

        async fn load_subscriptions(&self) -> Result<Vec<Subscription>> {
            Ok(self.subscriptions.lock().clone())
        }

        async fn save_subscriptions(&self, subscriptions: &[Subscription]) -> Result<()> {
            *self.subscriptions.lock() = subscriptions.to_vec();
            Ok(())
        }
    }
}
