//! Shared application state
//!
//! One `AppState` is built at startup and handed to every worker as
//! `web::Data<AppState>`. Services are behind `Arc`, so cloning is cheap.

use std::sync::Arc;
use yeastar_cache::RedisCache;
use yeastar_core::{config::WebhookConfig, traits::CallLogRepository};
use yeastar_db::PgPool;
use yeastar_services::{ExtensionMapper, SyncService, WebhookProcessor};

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<WebhookProcessor>,
    pub call_logs: Arc<dyn CallLogRepository>,
    pub mapper: Arc<ExtensionMapper>,
    /// Present when PBX credentials are configured
    pub sync: Option<Arc<SyncService>>,
    pub webhook: WebhookConfig,
    /// Probed by the health endpoint when present
    pub pool: Option<PgPool>,
    pub redis: Option<Arc<RedisCache>>,
}

impl AppState {
    pub fn new(
        processor: Arc<WebhookProcessor>,
        call_logs: Arc<dyn CallLogRepository>,
        mapper: Arc<ExtensionMapper>,
        webhook: WebhookConfig,
    ) -> Self {
        Self {
            processor,
            call_logs,
            mapper,
            sync: None,
            webhook,
            pool: None,
            redis: None,
        }
    }

    pub fn with_sync(mut self, sync: Arc<SyncService>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_redis(mut self, redis: Arc<RedisCache>) -> Self {
        self.redis = Some(redis);
        self
    }
}
