//! Webhook acknowledgement bodies

use serde::Serialize;
use yeastar_core::models::{CallStatus, UpsertOutcome};
use yeastar_services::ProcessOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<UpsertOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookResponse {
    /// Delivery acknowledged without being stored
    pub fn disabled() -> Self {
        Self {
            ok: false,
            call_id: None,
            outcome: None,
            status: None,
            message: Some("connector disabled".to_string()),
        }
    }
}

impl From<ProcessOutcome> for WebhookResponse {
    fn from(outcome: ProcessOutcome) -> Self {
        Self {
            ok: true,
            call_id: Some(outcome.call_id),
            outcome: Some(outcome.outcome),
            status: outcome.status,
            message: None,
        }
    }
}
