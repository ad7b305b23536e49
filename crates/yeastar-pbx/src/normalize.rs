//! Event normalization
//!
//! Turns a [`WebhookPayload`] (or a CDR row from the OpenAPI) into a
//! [`CallUpdate`]. This is a pure transformation: no I/O and no lookups.
//! Agent resolution and entity linking happen later in the pipeline.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use yeastar_core::{
    config::{LinkingConfig, PbxConfig},
    models::{CallDirection, CallStatus, CallUpdate},
    AppError, AppResult, PhoneNormalizer,
};

use crate::webhook::{keys, scalar_text, WebhookPayload};

/// Naive timestamp layouts accepted from the PBX
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

/// Values above this are Unix milliseconds rather than seconds
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// CDR status fields, checked to tell answered from missed calls
const CDR_STATUS_KEYS: &[&str] = &["disposition", "status", "call_status"];

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown event type '{event_type}' for call {call_id}")]
    UnknownEventType { call_id: String, event_type: String },

    #[error("Record is not a JSON object")]
    NotAnObject,
}

impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        match err {
            NormalizeError::MissingField(field) => AppError::MissingField(field.to_string()),
            other => AppError::MalformedPayload(other.to_string()),
        }
    }
}

/// Maps vendor payloads to call updates
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    phone: PhoneNormalizer,
    tz: Tz,
}

impl EventNormalizer {
    pub fn new(phone: PhoneNormalizer, tz: Tz) -> Self {
        Self { phone, tz }
    }

    /// Build from configuration
    ///
    /// # Errors
    ///
    /// `AppError::Config` if `pbx.timezone` is not a known zone name
    pub fn from_config(linking: &LinkingConfig, pbx: &PbxConfig) -> AppResult<Self> {
        let tz: Tz = pbx.timezone.parse().map_err(|e| {
            AppError::Config(format!("Invalid pbx.timezone '{}': {}", pbx.timezone, e))
        })?;
        Ok(Self::new(PhoneNormalizer::from_config(linking), tz))
    }

    pub fn phone(&self) -> &PhoneNormalizer {
        &self.phone
    }

    /// Normalize a webhook delivery
    pub fn normalize(
        &self,
        payload: &WebhookPayload,
        received_at: DateTime<Utc>,
    ) -> Result<CallUpdate, NormalizeError> {
        let call_id = payload
            .call_id()
            .ok_or(NormalizeError::MissingField("call_id"))?;
        let event_type = payload
            .event_type()
            .ok_or(NormalizeError::MissingField("type"))?;

        let status = CallStatus::from_event_type(&event_type).ok_or_else(|| {
            warn!(call_id = %call_id, event_type = %event_type, "Unrecognized event type");
            NormalizeError::UnknownEventType {
                call_id: call_id.clone(),
                event_type: event_type.clone(),
            }
        })?;

        Ok(self.build(payload, call_id, status, received_at))
    }

    /// Normalize a CDR row pulled from the OpenAPI
    ///
    /// CDRs describe finished calls, so the status is `missed` when the
    /// disposition says the call was not answered and `ended` otherwise.
    /// Rows without an id get one derived from start time and numbers.
    pub fn normalize_cdr(
        &self,
        record: &JsonValue,
        received_at: DateTime<Utc>,
    ) -> Result<CallUpdate, NormalizeError> {
        let payload =
            WebhookPayload::from_value(record.clone()).map_err(|_| NormalizeError::NotAnObject)?;

        let call_id = match payload.call_id() {
            Some(id) => id,
            None => {
                let parts = [
                    payload.text(keys::START_TIME),
                    payload.text(keys::CALLER),
                    payload.text(keys::CALLEE),
                ];
                if parts.iter().all(Option::is_none) {
                    return Err(NormalizeError::MissingField("call_id"));
                }
                parts
                    .iter()
                    .map(|p| p.as_deref().unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join("-")
            }
        };

        let status = match payload.text(CDR_STATUS_KEYS) {
            Some(s) if is_unanswered(&s) => CallStatus::Missed,
            _ => CallStatus::Ended,
        };

        Ok(self.build(&payload, call_id, status, received_at))
    }

    fn build(
        &self,
        payload: &WebhookPayload,
        call_id: String,
        status: CallStatus,
        received_at: DateTime<Utc>,
    ) -> CallUpdate {
        let mut update = CallUpdate::new(call_id, status, payload.raw().clone());
        update.received_at = received_at;

        update.direction = payload
            .text(keys::DIRECTION)
            .map(|d| CallDirection::parse(&d))
            .unwrap_or_default();

        update.caller_number = payload.text(keys::CALLER);
        update.callee_number = payload.text(keys::CALLEE);
        update.caller_normalized = update
            .caller_number
            .as_deref()
            .and_then(|n| self.phone.normalize_external(n));
        update.callee_normalized = update
            .callee_number
            .as_deref()
            .and_then(|n| self.phone.normalize_external(n));

        update.extension = payload.text(keys::EXTENSION);
        update.recording_url = payload.text(keys::RECORDING);
        update.recording_id = payload.text(keys::RECORDING_ID);

        update.start_time = self.timestamp(payload, keys::START_TIME);
        update.answer_time = self.timestamp(payload, keys::ANSWER_TIME);
        update.end_time = self.timestamp(payload, keys::END_TIME);
        update.duration = payload.value(keys::DURATION).and_then(parse_duration);

        // The delivery itself marks the moment of the transition
        match status {
            CallStatus::Ringing if update.start_time.is_none() => {
                update.start_time = Some(received_at)
            }
            CallStatus::Answered if update.answer_time.is_none() => {
                update.answer_time = Some(received_at)
            }
            CallStatus::Ended | CallStatus::Missed if update.end_time.is_none() => {
                update.end_time = Some(received_at)
            }
            _ => {}
        }

        update
    }

    fn timestamp(&self, payload: &WebhookPayload, aliases: &[&str]) -> Option<DateTime<Utc>> {
        let value = payload.value(aliases)?;
        let parsed = parse_timestamp(value, self.tz);
        if parsed.is_none() {
            debug!("Dropping unparseable timestamp {} for {:?}", value, aliases);
        }
        parsed
    }
}

fn is_unanswered(status: &str) -> bool {
    let key: String = status
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    key == "failed" || CallStatus::from_event_type(status) == Some(CallStatus::Missed)
}

/// Parse a timestamp value
///
/// Accepts Unix seconds (or milliseconds above 10^12) as numbers or digit
/// strings, RFC 3339, and naive `YYYY-MM-DD HH:MM:SS` read in `tz`.
pub fn parse_timestamp(value: &JsonValue, tz: Tz) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_epoch),
        JsonValue::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                return s.parse::<i64>().ok().and_then(from_epoch);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .and_then(|naive| tz.from_local_datetime(&naive).earliest())
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    }
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n <= 0 {
        return None;
    }
    if n > MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

fn parse_duration(value: &JsonValue) -> Option<i32> {
    let secs = match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        other => scalar_text(other).and_then(|s| s.parse::<i64>().ok()),
    }?;
    if secs < 0 {
        return None;
    }
    i32::try_from(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    fn normalizer() -> EventNormalizer {
        EventNormalizer::new(PhoneNormalizer::new("+966", 6), chrono_tz::Asia::Riyadh)
    }

    fn payload(value: JsonValue) -> WebhookPayload {
        WebhookPayload::from_value(value).unwrap()
    }

    #[test]
    fn test_answered_event() {
        let now = Utc::now();
        let update = normalizer()
            .normalize(
                &payload(json!({
                    "call_id": "c1",
                    "type": "answered",
                    "from": "+1555123456",
                    "ext": "101",
                    "direction": "Incoming"
                })),
                now,
            )
            .unwrap();

        assert_eq!(update.call_id, "c1");
        assert_eq!(update.status, CallStatus::Answered);
        assert_eq!(update.direction, CallDirection::Inbound);
        assert_eq!(update.caller_number.as_deref(), Some("+1555123456"));
        assert_eq!(update.caller_normalized.as_deref(), Some("+1555123456"));
        assert_eq!(update.extension.as_deref(), Some("101"));
        assert_eq!(update.answer_time, Some(now));
        assert_eq!(update.received_at, now);
    }

    #[test]
    fn test_unknown_event_type() {
        let err = normalizer()
            .normalize(&payload(json!({"call_id": "c1", "type": "transfer"})), Utc::now())
            .unwrap_err();

        match err {
            NormalizeError::UnknownEventType { call_id, event_type } => {
                assert_eq!(call_id, "c1");
                assert_eq!(event_type, "transfer");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_fields() {
        let n = normalizer();
        assert!(matches!(
            n.normalize(&payload(json!({"type": "ringing"})), Utc::now()),
            Err(NormalizeError::MissingField("call_id"))
        ));
        assert!(matches!(
            n.normalize(&payload(json!({"call_id": "c1"})), Utc::now()),
            Err(NormalizeError::MissingField("type"))
        ));
    }

    #[test]
    fn test_internal_extension_is_not_normalized() {
        let update = normalizer()
            .normalize(
                &payload(json!({"call_id": "c2", "type": "ringing", "from": "101", "to": "0555123456"})),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(update.caller_number.as_deref(), Some("101"));
        assert_eq!(update.caller_normalized, None);
        assert_eq!(update.callee_normalized.as_deref(), Some("+966555123456"));
    }

    #[test]
    fn test_duration_forms() {
        assert_eq!(parse_duration(&json!(42)), Some(42));
        assert_eq!(parse_duration(&json!("42")), Some(42));
        assert_eq!(parse_duration(&json!(41.6)), Some(42));
        assert_eq!(parse_duration(&json!(-3)), None);
        assert_eq!(parse_duration(&json!("abc")), None);
        assert_eq!(parse_duration(&json!(true)), None);
    }

    #[test]
    fn test_timestamp_forms() {
        let tz = chrono_tz::Asia::Riyadh;
        let expected = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        assert_eq!(parse_timestamp(&json!(1_700_000_000), tz), Some(expected));
        assert_eq!(parse_timestamp(&json!("1700000000"), tz), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_700_000_000_000i64), tz), Some(expected));
        assert_eq!(
            parse_timestamp(&json!("2023-11-14T22:13:20Z"), tz),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("yesterday"), tz), None);
        assert_eq!(parse_timestamp(&json!(0), tz), None);
    }

    #[test]
    fn test_naive_timestamp_uses_pbx_timezone() {
        // Riyadh is UTC+3 with no daylight saving
        let parsed = parse_timestamp(&json!("2024-05-01 12:00:00"), chrono_tz::Asia::Riyadh).unwrap();
        assert_eq!(parsed.hour(), 9);

        let parsed = parse_timestamp(&json!("2024-05-01 12:00:00"), chrono_tz::UTC).unwrap();
        assert_eq!(parsed.hour(), 12);
    }

    #[test]
    fn test_cdr_status() {
        let n = normalizer();
        let now = Utc::now();

        let answered = n
            .normalize_cdr(
                &json!({"uniqueid": "u1", "src": "0555123456", "dst": "101", "disposition": "ANSWERED", "billsec": 30}),
                now,
            )
            .unwrap();
        assert_eq!(answered.status, CallStatus::Ended);
        assert_eq!(answered.duration, Some(30));
        assert_eq!(answered.end_time, Some(now));

        let missed = n
            .normalize_cdr(&json!({"id": 77, "disposition": "NO ANSWER"}), now)
            .unwrap();
        assert_eq!(missed.call_id, "77");
        assert_eq!(missed.status, CallStatus::Missed);

        let busy = n.normalize_cdr(&json!({"id": 78, "status": "BUSY"}), now).unwrap();
        assert_eq!(busy.status, CallStatus::Missed);
    }

    #[test]
    fn test_cdr_without_id_gets_derived_one() {
        let n = normalizer();
        let update = n
            .normalize_cdr(
                &json!({"start_time": 1700000000, "src": "0555123456", "dst": "101"}),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(update.call_id, "1700000000-0555123456-101");

        assert!(matches!(
            n.normalize_cdr(&json!({"disposition": "ANSWERED"}), Utc::now()),
            Err(NormalizeError::MissingField("call_id"))
        ));
        assert!(matches!(
            n.normalize_cdr(&json!([1]), Utc::now()),
            Err(NormalizeError::NotAnObject)
        ));
    }

    #[test]
    fn test_cdr_keeps_recording_id() {
        let n = normalizer();
        let update = n
            .normalize_cdr(
                &json!({"id": 80, "disposition": "ANSWERED", "recordid": 4512, "record_url": "/rec/4512.wav"}),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(update.recording_id.as_deref(), Some("4512"));
        assert_eq!(update.recording_url.as_deref(), Some("/rec/4512.wav"));
    }

    #[test]
    fn test_from_config_rejects_bad_timezone() {
        let pbx = PbxConfig {
            timezone: "Mars/Olympus".to_string(),
            ..PbxConfig::default()
        };
        assert!(EventNormalizer::from_config(&LinkingConfig::default(), &pbx).is_err());
    }
}
