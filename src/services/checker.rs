//! Concurrent stream checker
//!
//! One run at a time over the catalog (or a subset of it). Probes run on a
//! bounded pool; every completion updates the shared `CheckRun` and the
//! channel in the catalog. Readers poll `progress()` for a snapshot.

use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;
use crate::models::{Channel, ChannelStatus, CheckDetail, CheckRun};
use crate::services::catalog::{dedup_key, SharedCatalog};
use crate::services::flight::{FlightGuard, SingleFlight};
use crate::services::metrics;
use crate::services::prober::{ProbeOutcome, Prober};
use crate::services::repair::RepairStrategy;
use crate::services::store::CatalogStore;

/// Validated knobs of one run
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub concurrency: usize,
    pub timeout: Duration,
    pub auto_repair: bool,
}

impl CheckOptions {
    /// Reject non-positive values before any probing starts
    pub fn new(concurrency: i64, timeout_ms: i64, auto_repair: bool) -> Result<Self, CoreError> {
        if concurrency <= 0 {
            return Err(CoreError::InvalidConfig(format!(
                "concurrency must be positive, got {}",
                concurrency
            )));
        }
        if timeout_ms <= 0 {
            return Err(CoreError::InvalidConfig(format!(
                "timeout must be positive, got {}ms",
                timeout_ms
            )));
        }

        Ok(Self {
            concurrency: concurrency as usize,
            timeout: Duration::from_millis(timeout_ms as u64),
            auto_repair,
        })
    }
}

/// Which channels a run covers
#[derive(Debug, Clone, Default)]
pub enum CheckSelection {
    #[default]
    All,
    Group(String),
    Urls(Vec<String>),
}

#[derive(Debug, Clone)]
struct Target {
    url: String,
    name: String,
    /// Parsed without an EXTINF header; never reported online as-is
    malformed: bool,
}

/// Successful repair: alternate URL, its probe and the strategy that found it
struct Repair {
    url: String,
    outcome: ProbeOutcome,
    strategy: &'static str,
}

pub struct Checker {
    catalog: SharedCatalog,
    store: Arc<dyn CatalogStore>,
    prober: Prober,
    repairers: Vec<Arc<dyn RepairStrategy>>,
    max_concurrency: usize,
    retries: u32,
    flight: SingleFlight,
    current: Mutex<Option<CheckRun>>,
}

impl Checker {
    pub fn new(
        catalog: SharedCatalog,
        store: Arc<dyn CatalogStore>,
        prober: Prober,
        repairers: Vec<Arc<dyn RepairStrategy>>,
        max_concurrency: usize,
        retries: u32,
    ) -> Self {
        Self {
            catalog,
            store,
            prober,
            repairers,
            max_concurrency: max_concurrency.max(1),
            retries,
            flight: SingleFlight::new(),
            current: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_active()
    }

    /// Snapshot of the current (or last finished) run
    pub fn progress(&self) -> Option<CheckRun> {
        self.current.lock().clone()
    }

    /// Start a run in the background and return its initial snapshot
    pub async fn start_check(
        self: &Arc<Self>,
        selection: CheckSelection,
        options: CheckOptions,
    ) -> Result<CheckRun, CoreError> {
        let (guard, targets, options, snapshot) = self.prepare(selection, options).await?;

        let checker = Arc::clone(self);
        tokio::spawn(async move {
            checker.execute(guard, targets, options).await;
        });

        Ok(snapshot)
    }

    /// Run to completion and return the final snapshot. The run lives in its
    /// own task, so dropping this future does not strand the progress state.
    pub async fn check(
        self: &Arc<Self>,
        selection: CheckSelection,
        options: CheckOptions,
    ) -> Result<CheckRun, CoreError> {
        let (guard, targets, options, _) = self.prepare(selection, options).await?;

        let checker = Arc::clone(self);
        tokio::spawn(async move { checker.execute(guard, targets, options).await })
            .await
            .map_err(|e| CoreError::Storage(anyhow::anyhow!("check run aborted: {}", e)))
    }

    async fn prepare(
        &self,
        selection: CheckSelection,
        mut options: CheckOptions,
    ) -> Result<(FlightGuard, Vec<Target>, CheckOptions, CheckRun), CoreError> {
        if options.concurrency > self.max_concurrency {
            tracing::warn!(
                "Requested concurrency {} capped to {}",
                options.concurrency,
                self.max_concurrency
            );
            options.concurrency = self.max_concurrency;
        }

        let guard = self.flight.try_acquire().ok_or(CoreError::CheckAlreadyRunning)?;

        let targets = self.select_targets(&selection).await;
        let run = CheckRun::new(targets.len());
        *self.current.lock() = Some(run.clone());

        tracing::info!(
            run_id = %run.run_id,
            total = targets.len(),
            concurrency = options.concurrency,
            timeout_ms = options.timeout.as_millis() as u64,
            auto_repair = options.auto_repair,
            "Check run started"
        );

        Ok((guard, targets, options, run))
    }

    async fn select_targets(&self, selection: &CheckSelection) -> Vec<Target> {
        let catalog = self.catalog.read().await;
        let to_target = |c: &Channel| Target {
            url: c.url.clone(),
            name: c.display_name().to_string(),
            malformed: c.status == ChannelStatus::Malformed,
        };

        match selection {
            CheckSelection::All => catalog.channels().iter().map(to_target).collect(),
            CheckSelection::Group(group) => catalog
                .channels()
                .iter()
                .filter(|c| c.group() == group.as_str())
                .map(to_target)
                .collect(),
            CheckSelection::Urls(urls) => {
                let mut seen = HashSet::new();
                urls.iter()
                    .filter_map(|url| catalog.get(url))
                    .filter(|c| seen.insert(dedup_key(&c.url)))
                    .map(to_target)
                    .collect()
            }
        }
    }

    async fn execute(&self, guard: FlightGuard, targets: Vec<Target>, options: CheckOptions) -> CheckRun {
        let options = &options;

        futures::stream::iter(targets)
            .for_each_concurrent(options.concurrency, |target| async move {
                let detail = self.check_one(&target, options).await;
                let detail = self.apply(&target, detail).await;
                if let Some(run) = self.current.lock().as_mut() {
                    run.record(detail);
                }
            })
            .await;

        if let Err(e) = self.persist().await {
            tracing::error!("Failed to persist catalog after check: {:#}", e);
        }

        // A run reported as finished must accept a new start
        let snapshot = {
            let mut current = self.current.lock();
            let run = current.get_or_insert_with(|| CheckRun::new(0));
            run.finish();
            drop(guard);
            run.clone()
        };

        tracing::info!(
            run_id = %snapshot.run_id,
            total = snapshot.total,
            online = snapshot.online_count,
            offline = snapshot.offline_count,
            repaired = snapshot.repaired_count,
            "Check run finished"
        );

        snapshot
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let channels = self.catalog.read().await.channels().to_vec();
        self.store.save_catalog(&channels).await
    }

    /// Probe, retrying per policy
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let mut outcome = self.prober.probe(url, timeout).await;
        let mut attempt = 0;
        while !outcome.is_online() && attempt < self.retries {
            attempt += 1;
            tracing::debug!(url, attempt, "Retrying probe");
            outcome = self.prober.probe(url, timeout).await;
        }

        let label = outcome.status.to_string();
        metrics::PROBES_TOTAL.with_label_values(&[label.as_str()]).inc();
        if let Some(ms) = outcome.latency_ms {
            metrics::PROBE_LATENCY.observe(ms as f64 / 1000.0);
        }

        outcome
    }

    async fn check_one(&self, target: &Target, options: &CheckOptions) -> CheckDetail {
        let outcome = if target.malformed {
            ProbeOutcome::offline("malformed")
        } else {
            self.probe(&target.url, options.timeout).await
        };

        let (outcome, repaired_url) = if !outcome.is_online() && options.auto_repair {
            match self.try_repair(&target.url, options.timeout).await {
                Some(repair) => {
                    tracing::info!(
                        "Repaired {} via {}: {}",
                        target.url,
                        repair.strategy,
                        repair.url
                    );
                    metrics::REPAIRS_TOTAL.with_label_values(&[repair.strategy]).inc();
                    (repair.outcome, Some(repair.url))
                }
                None => (outcome, None),
            }
        } else {
            (outcome, None)
        };

        CheckDetail {
            url: target.url.clone(),
            name: target.name.clone(),
            status: outcome.status,
            latency_ms: outcome.latency_ms,
            reason: outcome.reason,
            repaired_url,
            resolution: outcome.resolution,
        }
    }

    /// First alternate that is new to the catalog and probes online
    async fn try_repair(&self, url: &str, timeout: Duration) -> Option<Repair> {
        let original_key = dedup_key(url);

        for strategy in &self.repairers {
            for candidate in strategy.alternates(url).await {
                if dedup_key(&candidate) == original_key || self.catalog.read().await.contains(&candidate) {
                    continue;
                }

                let outcome = self.probe(&candidate, timeout).await;
                if outcome.is_online() {
                    return Some(Repair {
                        url: candidate,
                        outcome,
                        strategy: strategy.name(),
                    });
                }
            }
        }

        None
    }

    /// Write the result into the catalog. A repair whose URL got taken in
    /// the meantime is downgraded to offline.
    async fn apply(&self, target: &Target, mut detail: CheckDetail) -> CheckDetail {
        let mut catalog = self.catalog.write().await;

        if let Some(new_url) = detail.repaired_url.clone() {
            if !catalog.replace_url(&target.url, &new_url) {
                tracing::warn!("Repair of {} rejected, {} already in catalog", target.url, new_url);
                detail.status = ChannelStatus::Offline;
                detail.latency_ms = None;
                detail.reason = Some("alternate already in catalog".to_string());
                detail.repaired_url = None;
                detail.resolution = None;
            }
        }

        let url = detail.repaired_url.as_deref().unwrap_or(&target.url);
        if let Some(channel) = catalog.get_mut(url) {
            channel.status = detail.status;
            channel.last_checked = Some(Utc::now());
            channel.latency_ms = detail.latency_ms;
            channel.last_error = detail.reason.clone();
            if detail.resolution.is_some() {
                channel.resolution = detail.resolution.clone();
            }
        } else {
            tracing::debug!("Channel {} left the catalog during the check", target.url);
        }

        detail
    }
}
