//! Common traits for repositories and services
//!
//! Defines the storage seams of the webhook pipeline. Postgres
//! implementations live in `yeastar-db`; all traits are object safe so the
//! API layer can hold them as `Arc<dyn ...>`.

use crate::error::AppError;
use crate::models::{
    Agent, ApplyResult, CallEventRecord, CallLog, CallLogFilter, CallUpdate, NewParty, Party,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Call log store
#[async_trait]
pub trait CallLogRepository: Send + Sync {
    /// Find a call log by PBX call id
    async fn find_by_call_id(&self, call_id: &str) -> Result<Option<CallLog>, AppError>;

    /// List call logs, newest first
    async fn list_filtered(
        &self,
        filter: &CallLogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<CallLog>, i64), AppError>;

    /// Audit trail of deliveries for a call, oldest first
    async fn list_events(&self, call_id: &str) -> Result<Vec<CallEventRecord>, AppError>;

    /// Apply a recognized event atomically
    ///
    /// Records the delivery in the audit trail keyed on
    /// `(call_id, event_type)`; a repeated key is reported as
    /// `Duplicate` without touching the record. Otherwise the call log is
    /// inserted or merged under a row lock.
    async fn apply_update(&self, update: &CallUpdate) -> Result<ApplyResult, AppError>;

    /// Store an event whose type was not recognized
    ///
    /// Only the audit trail and the raw payload of an existing record change.
    async fn record_unrecognized(
        &self,
        call_id: &str,
        event_type: &str,
        payload: &JsonValue,
        received_at: DateTime<Utc>,
    ) -> Result<ApplyResult, AppError>;
}

/// Customer and Lead lookup
#[async_trait]
pub trait PartyRepository: Send + Sync {
    /// Exact match on the normalized number
    ///
    /// Customers win over Leads; within a type the oldest record wins.
    async fn find_by_phone(&self, phone_normalized: &str) -> Result<Option<Party>, AppError>;

    /// Match on the trailing digits of the normalized number
    async fn find_by_phone_suffix(&self, digits: &str) -> Result<Option<Party>, AppError>;

    /// Create a party
    async fn create(&self, party: &NewParty) -> Result<Party, AppError>;
}

/// Extension mapping table
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Find mapping by extension
    async fn find_by_extension(&self, extension: &str) -> Result<Option<Agent>, AppError>;

    /// All mappings ordered by extension
    async fn list(&self) -> Result<Vec<Agent>, AppError>;

    /// Create or replace a mapping (administrator write)
    async fn upsert(
        &self,
        extension: &str,
        agent_name: &str,
        user_id: Option<&str>,
    ) -> Result<Agent, AppError>;

    /// Create a mapping or refresh its name from the PBX
    ///
    /// Never changes `user_id` of an existing row.
    async fn upsert_from_pbx(&self, extension: &str, agent_name: &str) -> Result<Agent, AppError>;

    /// Delete a mapping
    async fn delete(&self, extension: &str) -> Result<bool, AppError>;
}

/// Key/value cache
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get a raw value
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Set a raw value with TTL
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError>;

    /// Delete a value
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
