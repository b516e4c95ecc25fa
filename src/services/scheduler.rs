//! Update pipeline and its background scheduler
//!
//! One run fetches every subscription in turn, parses and merges it into the
//! catalog, then persists the catalog and the registry. A failing feed is
//! recorded and skipped. Runs never overlap: a manual trigger is rejected,
//! an interval tick is skipped.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use url::Url;

use crate::error::CoreError;
use crate::models::{FeedReport, FetchResult, MergeReport, PipelineSummary, PipelineTrigger, Subscription};
use crate::services::catalog::SharedCatalog;
use crate::services::checker::{CheckOptions, CheckSelection, Checker};
use crate::services::fetcher::FeedFetcher;
use crate::services::flight::SingleFlight;
use crate::services::m3u_parser;
use crate::services::metrics;
use crate::services::store::CatalogStore;
use crate::services::subscriptions::SubscriptionRegistry;

/// Configuration for the scheduler task
pub struct SchedulerConfig {
    /// Seconds between runs, 0 disables the periodic run
    pub interval_secs: u64,
    pub run_on_startup: bool,
}

pub struct Pipeline {
    catalog: SharedCatalog,
    subscriptions: Arc<SubscriptionRegistry>,
    store: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn FeedFetcher>,
    post_check: Option<(Arc<Checker>, CheckOptions)>,
    flight: SingleFlight,
}

impl Pipeline {
    pub fn new(
        catalog: SharedCatalog,
        subscriptions: Arc<SubscriptionRegistry>,
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn FeedFetcher>,
    ) -> Self {
        Self {
            catalog,
            subscriptions,
            store,
            fetcher,
            post_check: None,
            flight: SingleFlight::new(),
        }
    }

    /// Check the whole catalog after every successful update
    pub fn with_post_check(mut self, checker: Arc<Checker>, options: CheckOptions) -> Self {
        self.post_check = Some((checker, options));
        self
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_active()
    }

    /// Fetch, parse and merge every subscription, then persist
    pub async fn run(&self, trigger: PipelineTrigger) -> Result<PipelineSummary, CoreError> {
        let _guard = self
            .flight
            .try_acquire()
            .ok_or(CoreError::PipelineAlreadyRunning)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let subscriptions = self.subscriptions.list().await;
        tracing::info!(%run_id, %trigger, feeds = subscriptions.len(), "Pipeline run started");

        let mut feeds = Vec::with_capacity(subscriptions.len());
        let mut merge = MergeReport::default();
        for subscription in &subscriptions {
            let (report, merged) = self.update_feed(subscription).await;
            merge.absorb(merged);
            self.subscriptions
                .record_result(
                    &subscription.source_url,
                    FetchResult {
                        success: report.success,
                        channel_count: report.channel_count,
                        error: report.error.clone(),
                    },
                )
                .await;
            feeds.push(report);
        }

        let (channels, catalog_size) = {
            let catalog = self.catalog.read().await;
            (catalog.channels().to_vec(), catalog.len())
        };
        metrics::CATALOG_SIZE.set(catalog_size as i64);

        let persisted = match self.store.save_catalog(&channels).await {
            Ok(()) => self.subscriptions.persist().await,
            Err(e) => Err(CoreError::from(e)),
        };
        if let Err(e) = persisted {
            metrics::PIPELINE_RUNS.with_label_values(&["failed"]).inc();
            tracing::error!(%run_id, "Pipeline failed to persist: {}", e);
            return Err(e);
        }

        let summary = PipelineSummary {
            run_id,
            trigger,
            started_at,
            finished_at: Utc::now(),
            feeds,
            merge,
            catalog_size,
        };

        let outcome = if summary.failed_feeds() == 0 { "success" } else { "partial" };
        metrics::PIPELINE_RUNS.with_label_values(&[outcome]).inc();
        tracing::info!(
            run_id = %summary.run_id,
            added = summary.merge.added,
            skipped = summary.merge.skipped,
            failed_feeds = summary.failed_feeds(),
            catalog_size,
            "Pipeline run finished"
        );

        if let Some((checker, options)) = &self.post_check {
            match checker.check(CheckSelection::All, options.clone()).await {
                Ok(run) => tracing::info!(
                    "Post-update check: {} online, {} offline",
                    run.online_count,
                    run.offline_count
                ),
                Err(CoreError::CheckAlreadyRunning) => {
                    tracing::info!("Post-update check skipped, a check is already running")
                }
                Err(e) => tracing::warn!("Post-update check failed: {}", e),
            }
        }

        Ok(summary)
    }

    async fn update_feed(&self, subscription: &Subscription) -> (FeedReport, MergeReport) {
        let source_url = subscription.source_url.clone();

        let body = match self.fetcher.fetch(&source_url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Feed {} failed: {}", source_url, e);
                let report = FeedReport {
                    source_url,
                    success: false,
                    channel_count: 0,
                    added: 0,
                    skipped: 0,
                    error: Some(e.to_string()),
                };
                return (report, MergeReport::default());
            }
        };

        let base = Url::parse(&source_url).ok();
        let mut channels = m3u_parser::parse_with_base(&body, base.as_ref());
        for channel in &mut channels {
            channel.source = Some(source_url.clone());
        }
        let channel_count = channels.len();

        let report = self.catalog.write().await.merge(channels);
        tracing::info!(
            "Feed {}: {} channels, {} added, {} duplicates",
            source_url,
            channel_count,
            report.added,
            report.skipped
        );

        let feed = FeedReport {
            source_url,
            success: true,
            channel_count,
            added: report.added,
            skipped: report.skipped,
            error: None,
        };
        (feed, report)
    }
}

/// One scheduled run; an overlapping run is logged and skipped
pub async fn run_scheduled(pipeline: &Pipeline, trigger: PipelineTrigger) -> Option<PipelineSummary> {
    match pipeline.run(trigger).await {
        Ok(summary) => Some(summary),
        Err(CoreError::PipelineAlreadyRunning) => {
            tracing::info!("Skipping {} update, previous run still in progress", trigger);
            None
        }
        Err(e) => {
            tracing::error!("Scheduled update failed: {}", e);
            None
        }
    }
}

/// Start the background update task
///
/// Optionally runs once on startup, then every `interval_secs`.
/// Spawn it with `tokio::spawn`.
pub async fn start_scheduler_task(pipeline: Arc<Pipeline>, config: SchedulerConfig) {
    tracing::info!(
        "Starting scheduler (interval: {}s, on startup: {})",
        config.interval_secs,
        config.run_on_startup
    );

    if config.run_on_startup {
        run_scheduled(&pipeline, PipelineTrigger::Startup).await;
    }

    if config.interval_secs == 0 {
        tracing::info!("Periodic updates disabled");
        return;
    }

    let mut interval = time::interval(Duration::from_secs(config.interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // first tick completes immediately

    loop {
        interval.tick().await;

        let pipeline = Arc::clone(&pipeline);
        // Detached: an overlapping tick is rejected by the single-flight guard
        tokio::spawn(async move {
            run_scheduled(&pipeline, PipelineTrigger::Interval).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MergeOutcome;
    use crate::services::catalog::Catalog;
    use crate::services::prober::Prober;
    use crate::services::store::MemoryStore;
    use crate::test_support::{m3u_feed, spawn_server, StaticFetcher};
    use axum::{routing::get, Router};

    const FEED_A: &str = "http://feeds.test/a.m3u";
    const FEED_B: &str = "http://feeds.test/b.m3u";

    async fn pipeline_with(fetcher: StaticFetcher, feeds: &[&str]) -> (Pipeline, SharedCatalog, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(SubscriptionRegistry::load(store.clone()).await.unwrap());
        for url in feeds {
            registry.add(url, None).await.unwrap();
        }
        let catalog = Catalog::new().shared();
        let pipeline = Pipeline::new(catalog.clone(), registry, store.clone(), Arc::new(fetcher));
        (pipeline, catalog, store)
    }

    #[tokio::test]
    async fn test_two_feeds_sharing_one_url() {
        let feed_a = m3u_feed("cdn.test", "a", 5);
        let feed_b = format!(
            "{}#EXTINF:-1,Copy of a 0\nhttp://CDN.test/a/0/\n",
            m3u_feed("cdn.test", "b", 3)
        );
        let fetcher = StaticFetcher::new(&[(FEED_A, feed_a.as_str()), (FEED_B, feed_b.as_str())]);
        let (pipeline, catalog, store) = pipeline_with(fetcher, &[FEED_A, FEED_B]).await;

        let summary = pipeline.run(PipelineTrigger::Manual).await.unwrap();

        assert_eq!(summary.feeds.len(), 2);
        assert_eq!(summary.feeds[0].added, 5);
        assert_eq!(summary.feeds[1].channel_count, 4);
        assert_eq!(summary.feeds[1].added, 3);
        assert_eq!(summary.feeds[1].skipped, 1);
        assert_eq!(summary.catalog_size, 8);
        assert_eq!(
            (summary.merge.total, summary.merge.added, summary.merge.skipped),
            (9, 8, 1)
        );
        assert_eq!(summary.merge.details.len(), 9);
        let duplicate = summary
            .merge
            .details
            .iter()
            .find(|d| d.outcome == MergeOutcome::Duplicate)
            .unwrap();
        assert_eq!(duplicate.url, "http://CDN.test/a/0/");
        assert_eq!(duplicate.name, "Copy of a 0");

        let catalog = catalog.read().await;
        assert_eq!(catalog.len(), 8);
        let shared = catalog.get("http://cdn.test/a/0").unwrap();
        assert_eq!(shared.name, "a 0");
        assert_eq!(shared.source.as_deref(), Some(FEED_A));
        assert_eq!(store.channels.lock().len(), 8);
    }

    #[tokio::test]
    async fn test_failing_feed_is_isolated() {
        let feed_b = m3u_feed("cdn.test", "b", 2);
        let fetcher = StaticFetcher::new(&[(FEED_B, feed_b.as_str())]);
        let (pipeline, catalog, store) = pipeline_with(fetcher, &[FEED_A, FEED_B]).await;

        let summary = pipeline.run(PipelineTrigger::Interval).await.unwrap();

        assert_eq!(summary.failed_feeds(), 1);
        assert!(!summary.feeds[0].success);
        assert!(summary.feeds[0].error.as_deref().unwrap().contains("404"));
        assert!(summary.feeds[1].success);
        assert_eq!(catalog.read().await.len(), 2);

        let subs = store.subscriptions.lock().clone();
        let a = subs.iter().find(|s| s.source_url == FEED_A).unwrap();
        assert!(!a.last_result.as_ref().unwrap().success);
        let b = subs.iter().find(|s| s.source_url == FEED_B).unwrap();
        assert_eq!(b.last_result.as_ref().unwrap().channel_count, 2);
    }

    #[tokio::test]
    async fn test_relative_urls_resolve_against_feed() {
        let feed = "#EXTM3U\n#EXTINF:-1,Local\nstreams/one.m3u8\n";
        let fetcher = StaticFetcher::new(&[(FEED_A, feed)]);
        let (pipeline, catalog, _) = pipeline_with(fetcher, &[FEED_A]).await;

        pipeline.run(PipelineTrigger::Manual).await.unwrap();

        assert!(catalog.read().await.contains("http://feeds.test/streams/one.m3u8"));
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let feed = m3u_feed("cdn.test", "a", 2);
        let mut fetcher = StaticFetcher::new(&[(FEED_A, feed.as_str())]);
        fetcher.delay = Some(Duration::from_millis(300));
        let (pipeline, catalog, _) = pipeline_with(fetcher, &[FEED_A]).await;
        let pipeline = Arc::new(pipeline);

        let first = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.run(PipelineTrigger::Interval).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pipeline.is_running());

        let second = pipeline.run(PipelineTrigger::Manual).await;
        assert!(matches!(second, Err(CoreError::PipelineAlreadyRunning)));
        assert!(run_scheduled(&pipeline, PipelineTrigger::Interval).await.is_none());

        let summary = first.await.unwrap().unwrap();
        assert_eq!(summary.merge.added, 2);
        assert_eq!(catalog.read().await.len(), 2);
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn test_post_update_check() {
        let app = Router::new().route("/live/:id", get(|| async { "ok" }));
        let addr = spawn_server(app).await;
        let feed = format!(
            "#EXTM3U\n#EXTINF:-1,Up\nhttp://{0}/live/1\n#EXTINF:-1,Down\nhttp://{0}/gone\n",
            addr
        );
        let fetcher = StaticFetcher::new(&[(FEED_A, feed.as_str())]);
        let (pipeline, catalog, store) = pipeline_with(fetcher, &[FEED_A]).await;

        let checker = Arc::new(Checker::new(
            catalog.clone(),
            store.clone(),
            Prober::new("test-agent").unwrap(),
            Vec::new(),
            4,
            0,
        ));
        let pipeline = pipeline.with_post_check(
            checker.clone(),
            CheckOptions::new(2, 1_000, false).unwrap(),
        );

        pipeline.run(PipelineTrigger::Startup).await.unwrap();

        let run = checker.progress().unwrap();
        assert_eq!(run.total, 2);
        assert_eq!(run.online_count, 1);
        assert_eq!(run.offline_count, 1);
    }
}
