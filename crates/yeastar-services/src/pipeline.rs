//! Webhook processing pipeline
//!
//! ```text
//! payload ──► normalize ──► resolve agent ──► link party ──► upsert call log
//!                 │
//!                 └─ unknown type ──► audit trail only
//! ```
//!
//! Every step for one call id runs under that id's [`CallLocks`] entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use yeastar_core::{
    models::{CallLog, CallStatus, CallUpdate, UpsertOutcome},
    traits::CallLogRepository,
    AppResult,
};
use yeastar_pbx::{EventNormalizer, NormalizeError, WebhookPayload};

use crate::call_locks::CallLocks;
use crate::linker::EntityLinker;
use crate::mapper::ExtensionMapper;

/// What happened to one delivery
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub call_id: String,
    pub outcome: UpsertOutcome,
    /// Stored status after the delivery; absent when no call log exists
    pub status: Option<CallStatus>,
    #[serde(skip)]
    pub call_log: Option<CallLog>,
}

pub struct WebhookProcessor {
    normalizer: EventNormalizer,
    call_logs: Arc<dyn CallLogRepository>,
    mapper: Arc<ExtensionMapper>,
    linker: EntityLinker,
    locks: CallLocks,
}

impl WebhookProcessor {
    pub fn new(
        normalizer: EventNormalizer,
        call_logs: Arc<dyn CallLogRepository>,
        mapper: Arc<ExtensionMapper>,
        linker: EntityLinker,
    ) -> Self {
        Self {
            normalizer,
            call_logs,
            mapper,
            linker,
            locks: CallLocks::new(),
        }
    }

    pub fn normalizer(&self) -> &EventNormalizer {
        &self.normalizer
    }

    /// Process one webhook delivery
    ///
    /// # Errors
    ///
    /// `AppError::MissingField` when the call id or event type is absent;
    /// store errors otherwise. An unknown event type is not an error.
    #[instrument(skip(self, payload))]
    pub async fn process(
        &self,
        payload: &WebhookPayload,
        received_at: DateTime<Utc>,
    ) -> AppResult<ProcessOutcome> {
        match self.normalizer.normalize(payload, received_at) {
            Ok(update) => self.apply(update).await,
            Err(NormalizeError::UnknownEventType {
                call_id,
                event_type,
            }) => {
                let _guard = self.locks.lock(&call_id).await;
                let result = self
                    .call_logs
                    .record_unrecognized(&call_id, &event_type, payload.raw(), received_at)
                    .await?;

                warn!(
                    call_id = %call_id,
                    event_type = %event_type,
                    outcome = result.outcome.as_str(),
                    "Stored payload with unrecognized event type"
                );

                Ok(ProcessOutcome {
                    status: result.call_log.as_ref().map(|l| l.status),
                    call_id,
                    outcome: result.outcome,
                    call_log: result.call_log,
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Enrich and store a normalized update
    ///
    /// Used for webhooks and for CDRs pulled by the sync job.
    #[instrument(skip(self, update), fields(call_id = %update.call_id, status = %update.status))]
    pub async fn apply(&self, mut update: CallUpdate) -> AppResult<ProcessOutcome> {
        let _guard = self.locks.lock(&update.call_id).await;

        if let Some(extension) = update.extension.as_deref() {
            update.agent_user = self.mapper.resolve(extension).await?.into_user_id();
        }

        // A linked call keeps its party; skip the lookup (and any lead creation)
        let existing = self.call_logs.find_by_call_id(&update.call_id).await?;
        let already_linked = existing.is_some_and(|log| log.linked_party.is_some());
        if !already_linked {
            update.linked_party = self.linker.link(&update).await?;
        }

        let result = self.call_logs.apply_update(&update).await?;

        match result.outcome {
            UpsertOutcome::Duplicate => debug!("Duplicate delivery ignored"),
            outcome => info!(
                outcome = outcome.as_str(),
                agent = update.agent_user.as_deref().unwrap_or("-"),
                linked = update.linked_party.is_some() || already_linked,
                "Call log stored"
            ),
        }

        Ok(ProcessOutcome {
            call_id: update.call_id,
            outcome: result.outcome,
            status: result.call_log.as_ref().map(|l| l.status),
            call_log: result.call_log,
        })
    }
}
