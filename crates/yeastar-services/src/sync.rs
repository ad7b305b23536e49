//! PBX sync
//!
//! Pulls the extension list and recent CDRs from the Yeastar OpenAPI. CDRs
//! go through the same pipeline as webhooks, so calls that were already
//! delivered by webhook collapse into their existing record.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use yeastar_core::{config::PbxConfig, models::UpsertOutcome, AppError, AppResult};
use yeastar_pbx::{
    page::{extract_items, has_more},
    webhook::scalar_text,
    PbxApi,
};

use crate::mapper::ExtensionMapper;
use crate::pipeline::WebhookProcessor;

/// Window used when no sync has succeeded yet
const INITIAL_LOOKBACK_HOURS: i64 = 24;

/// Upper bound on pages per endpoint and run
const MAX_PAGES: u32 = 1000;

const EXTENSION_KEYS: &[&str] = &["extension", "ext", "number"];
const EXTENSION_NAME_KEYS: &[&str] = &["name", "username", "display_name", "caller_id_name"];

/// Counts from one sync run
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SyncReport {
    pub extensions: usize,
    pub call_logs: usize,
    pub created: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

pub struct SyncService {
    api: Arc<dyn PbxApi>,
    processor: Arc<WebhookProcessor>,
    mapper: Arc<ExtensionMapper>,
    config: PbxConfig,
    last_sync: parking_lot::Mutex<Option<DateTime<Utc>>>,
    /// Held for the whole run so manual and scheduled runs never overlap
    running: AsyncMutex<()>,
}

impl SyncService {
    pub fn new(
        api: Arc<dyn PbxApi>,
        processor: Arc<WebhookProcessor>,
        mapper: Arc<ExtensionMapper>,
        config: PbxConfig,
    ) -> Self {
        Self {
            api,
            processor,
            mapper,
            config,
            last_sync: parking_lot::Mutex::new(None),
            running: AsyncMutex::new(()),
        }
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock()
    }

    fn page_size(&self) -> u32 {
        self.config.page_size.max(1)
    }

    /// Run one sync pass
    ///
    /// The CDR window starts at the last successful run, or at
    /// `pbx.sync_from` (24 hours ago when unset) on the first run, and ends now. The start only advances when the whole pass succeeds.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> AppResult<SyncReport> {
        let _running = self.running.lock().await;

        let now = Utc::now();
        let start = self
            .last_sync()
            .or(self.config.sync_from)
            .unwrap_or_else(|| now - ChronoDuration::hours(INITIAL_LOOKBACK_HOURS))
            .min(now);

        let mut report = SyncReport {
            window_start: Some(start),
            window_end: Some(now),
            ..SyncReport::default()
        };

        info!("Starting PBX sync from {} to {}", start, now);

        if self.config.sync_extensions {
            report.extensions = self.sync_extensions().await?;
        }

        self.sync_call_logs(start, now, &mut report).await?;

        *self.last_sync.lock() = Some(now);

        info!(
            extensions = report.extensions,
            call_logs = report.call_logs,
            created = report.created,
            updated = report.updated,
            duplicates = report.duplicates,
            skipped = report.skipped,
            "PBX sync completed"
        );

        Ok(report)
    }

    async fn sync_extensions(&self) -> AppResult<usize> {
        let page_size = self.page_size();
        let mut synced = 0;

        for page in 1..=MAX_PAGES {
            let response = self.api.fetch_extensions(page, page_size).await?;
            let items = extract_items(&response);
            if items.is_empty() {
                break;
            }

            for item in &items {
                let Some(extension) = first_text(item, EXTENSION_KEYS) else {
                    debug!("Skipping extension entry without a number");
                    continue;
                };
                let name = first_text(item, EXTENSION_NAME_KEYS).unwrap_or_else(|| extension.clone());

                self.mapper.sync_from_pbx(&extension, &name).await?;
                synced += 1;
            }

            if !has_more(&response, page, page_size, items.len()) {
                break;
            }
        }

        debug!("Synced {} extensions", synced);
        Ok(synced)
    }

    async fn sync_call_logs(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> AppResult<()> {
        let page_size = self.page_size();

        for page in 1..=MAX_PAGES {
            let response = self.api.fetch_call_logs(start, end, page, page_size).await?;
            let items = extract_items(&response);
            if items.is_empty() {
                break;
            }

            for record in &items {
                report.call_logs += 1;

                let update = match self.processor.normalizer().normalize_cdr(record, Utc::now()) {
                    Ok(update) => update,
                    Err(e) => {
                        warn!("Skipping CDR: {}", e);
                        report.skipped += 1;
                        continue;
                    }
                };

                match self.processor.apply(update).await?.outcome {
                    UpsertOutcome::Created => report.created += 1,
                    UpsertOutcome::Updated => report.updated += 1,
                    UpsertOutcome::Duplicate => report.duplicates += 1,
                    UpsertOutcome::Unrecognized => report.skipped += 1,
                }
            }

            if !has_more(&response, page, page_size, items.len()) {
                break;
            }
        }

        Ok(())
    }

    /// Run on a fixed interval until the returned handle is shut down
    pub fn spawn(self: Arc<Self>) -> SyncHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = Duration::from_secs(self.config.sync_interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            info!("PBX sync scheduled every {}s", period.as_secs());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!("PBX sync failed: {}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("PBX sync stopped");
        });

        SyncHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }
}

/// Handle to the background sync loop
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the loop and wait for an in-flight run to finish
    pub async fn shutdown(self) -> AppResult<()> {
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .map_err(|e| AppError::Internal(format!("Sync task failed: {}", e)))
    }
}

fn first_text(item: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| item.get(*k))
        .find_map(scalar_text)
}
