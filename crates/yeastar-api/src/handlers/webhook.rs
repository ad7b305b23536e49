//! Webhook receiver
//!
//! `POST /api/v1/webhook/yeastar`
//!
//! The body is read as raw bytes so malformed JSON is reported through
//! the standard error body instead of the extractor's plain-text error.

use crate::dto::WebhookResponse;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use yeastar_core::{AppError, AppResult};
use yeastar_pbx::WebhookPayload;

/// Headers that may carry the shared secret
const SECRET_HEADERS: &[&str] = &["X-Yeastar-Secret", "X-Webhook-Secret"];

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhook/yeastar", web::post().to(receive_webhook));
}

#[instrument(skip(state, req, body), fields(bytes = body.len()))]
pub async fn receive_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    if !state.webhook.enabled {
        debug!("Connector disabled, delivery dropped");
        return Ok(HttpResponse::Ok().json(WebhookResponse::disabled()));
    }

    let expected = state
        .webhook
        .secret
        .as_deref()
        .filter(|s| !s.is_empty());

    // A header secret is checked before the body is even parsed
    let header_secret = header_secret(&req);
    if let (Some(expected), Some(provided)) = (expected, header_secret.as_deref()) {
        verify_secret(expected, Some(provided))?;
    }

    let payload = WebhookPayload::parse(&body).map_err(|e| {
        warn!("Rejected webhook body: {}", e);
        e
    })?;

    if let Some(expected) = expected {
        if header_secret.is_none() {
            verify_secret(expected, payload.secret().as_deref())?;
        }
    }

    let outcome = state.processor.process(&payload, Utc::now()).await?;

    info!(
        call_id = %outcome.call_id,
        outcome = outcome.outcome.as_str(),
        "Webhook processed"
    );

    Ok(HttpResponse::Ok().json(WebhookResponse::from(outcome)))
}

fn header_secret(req: &HttpRequest) -> Option<String> {
    SECRET_HEADERS
        .iter()
        .filter_map(|name| req.headers().get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn verify_secret(expected: &str, provided: Option<&str>) -> AppResult<()> {
    match provided {
        None => {
            warn!("Webhook rejected: secret missing");
            Err(AppError::MissingWebhookSecret)
        }
        Some(provided) if constant_time_eq(expected.as_bytes(), provided.as_bytes()) => Ok(()),
        Some(_) => {
            warn!("Webhook rejected: secret mismatch");
            Err(AppError::InvalidWebhookSecret)
        }
    }
}

/// Byte comparison whose timing does not depend on where inputs differ
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"s3cret!"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_verify_secret() {
        assert!(verify_secret("abc", Some("abc")).is_ok());
        assert!(matches!(
            verify_secret("abc", None),
            Err(AppError::MissingWebhookSecret)
        ));
        assert!(matches!(
            verify_secret("abc", Some("abd")),
            Err(AppError::InvalidWebhookSecret)
        ));
    }
}
