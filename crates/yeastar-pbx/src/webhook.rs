//! Webhook payload parsing
//!
//! Yeastar firmware versions disagree on field names and on whether the
//! call data sits at the top level, under a `data` object, or inside a
//! JSON-encoded `msg` string. [`WebhookPayload`] flattens all of these into
//! one lookup table and answers alias queries against it.

use serde_json::{Map, Value as JsonValue};
use tracing::debug;
use yeastar_core::{AppError, AppResult};

/// Field aliases, first non-empty value wins
pub mod keys {
    pub const CALL_ID: &[&str] = &["call_id", "callId", "unique_id", "uniqueid", "call_uuid", "id"];
    pub const EVENT_TYPE: &[&str] = &["type", "event", "event_type", "status", "state"];
    pub const DIRECTION: &[&str] = &["direction", "call_direction"];
    pub const CALLER: &[&str] = &["from", "caller", "caller_number", "callerNumber", "src"];
    pub const CALLEE: &[&str] = &["to", "callee", "callee_number", "calleeNumber", "dst"];
    pub const EXTENSION: &[&str] = &[
        "extension",
        "ext",
        "agent_extension",
        "extension_number",
        "agent_ext",
    ];
    pub const START_TIME: &[&str] = &["start_time", "startTime", "timestamp"];
    pub const ANSWER_TIME: &[&str] = &["answer_time", "answerTime"];
    pub const END_TIME: &[&str] = &["end_time", "endTime"];
    pub const DURATION: &[&str] = &["duration", "billsec", "talk_time"];
    pub const RECORDING: &[&str] = &["recording_url", "recordingUrl", "recording", "record_url"];
    pub const RECORDING_ID: &[&str] = &["recording_id", "recordingId", "record_id", "recordid"];
    pub const SECRET: &[&str] = &["secret", "webhook_secret"];
}

/// Envelope keys that may wrap the call data
const ENVELOPE_KEYS: &[&str] = &["data", "msg"];

/// A parsed webhook body
#[derive(Debug, Clone)]
pub struct WebhookPayload {
    /// Body exactly as received
    raw: JsonValue,
    /// Inner call data merged over the top-level fields
    fields: Map<String, JsonValue>,
}

impl WebhookPayload {
    /// Parse a request body
    ///
    /// # Errors
    ///
    /// `AppError::MalformedPayload` for invalid JSON or a non-object body
    pub fn parse(body: &[u8]) -> AppResult<Self> {
        let value: JsonValue = serde_json::from_slice(body)
            .map_err(|e| AppError::MalformedPayload(format!("Invalid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Build from an already decoded JSON value
    pub fn from_value(raw: JsonValue) -> AppResult<Self> {
        let top = raw
            .as_object()
            .ok_or_else(|| AppError::MalformedPayload("Body must be a JSON object".to_string()))?;

        let fields = if lookup_text(top, keys::CALL_ID).is_some() {
            top.clone()
        } else {
            match unwrap_envelope(top) {
                Some(mut inner) => {
                    for (k, v) in top {
                        inner.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                    inner
                }
                None => top.clone(),
            }
        };

        Ok(Self { raw, fields })
    }

    /// First non-empty string or number among `aliases`, as text
    pub fn text(&self, aliases: &[&str]) -> Option<String> {
        lookup_text(&self.fields, aliases)
    }

    /// First present, non-null value among `aliases`
    pub fn value(&self, aliases: &[&str]) -> Option<&JsonValue> {
        aliases
            .iter()
            .filter_map(|k| self.fields.get(*k))
            .find(|v| match v {
                JsonValue::Null => false,
                JsonValue::String(s) => !s.trim().is_empty(),
                _ => true,
            })
    }

    pub fn call_id(&self) -> Option<String> {
        self.text(keys::CALL_ID)
    }

    pub fn event_type(&self) -> Option<String> {
        self.text(keys::EVENT_TYPE)
    }

    /// Secret carried in the body, if any
    pub fn secret(&self) -> Option<String> {
        self.text(keys::SECRET)
    }

    /// Call id and event type, both required
    pub fn identity(&self) -> AppResult<(String, String)> {
        let call_id = self
            .call_id()
            .ok_or_else(|| AppError::MissingField("call_id".to_string()))?;
        let event_type = self
            .event_type()
            .ok_or_else(|| AppError::MissingField("type".to_string()))?;
        Ok((call_id, event_type))
    }

    /// Body exactly as received
    pub fn raw(&self) -> &JsonValue {
        &self.raw
    }

    pub fn into_raw(self) -> JsonValue {
        self.raw
    }
}

fn unwrap_envelope(top: &Map<String, JsonValue>) -> Option<Map<String, JsonValue>> {
    for key in ENVELOPE_KEYS {
        match top.get(*key) {
            Some(JsonValue::Object(inner)) => return Some(inner.clone()),
            Some(JsonValue::String(encoded)) => {
                match serde_json::from_str::<JsonValue>(encoded) {
                    Ok(JsonValue::Object(inner)) => return Some(inner),
                    _ => debug!("Envelope field '{}' is not a JSON object", key),
                }
            }
            _ => {}
        }
    }
    None
}

fn lookup_text(map: &Map<String, JsonValue>, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|k| map.get(*k))
        .find_map(scalar_text)
}

/// Strings and numbers only; booleans and nested values are not identifiers
pub fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_payload() {
        let payload = WebhookPayload::from_value(json!({
            "call_id": "c1",
            "type": "answered",
            "from": "+1555",
            "ext": 101
        }))
        .unwrap();

        assert_eq!(payload.identity().unwrap(), ("c1".to_string(), "answered".to_string()));
        assert_eq!(payload.text(keys::CALLER).as_deref(), Some("+1555"));
        assert_eq!(payload.text(keys::EXTENSION).as_deref(), Some("101"));
    }

    #[test]
    fn test_aliases_skip_empty_values() {
        let payload = WebhookPayload::from_value(json!({
            "call_id": "  ",
            "uniqueid": "1700000000.42",
            "event": "hangup"
        }))
        .unwrap();

        assert_eq!(payload.call_id().as_deref(), Some("1700000000.42"));
        assert_eq!(payload.event_type().as_deref(), Some("hangup"));
    }

    #[test]
    fn test_booleans_and_objects_are_not_identifiers() {
        let payload = WebhookPayload::from_value(json!({
            "call_id": true,
            "id": {"nested": 1},
            "type": "ringing"
        }))
        .unwrap();

        assert!(payload.call_id().is_none());
        assert!(matches!(payload.identity(), Err(AppError::MissingField(_))));
    }

    #[test]
    fn test_data_envelope() {
        let payload = WebhookPayload::from_value(json!({
            "secret": "s3cret",
            "data": {"callId": "c7", "status": "Ringing", "caller": "0555123456"}
        }))
        .unwrap();

        assert_eq!(payload.call_id().as_deref(), Some("c7"));
        assert_eq!(payload.event_type().as_deref(), Some("Ringing"));
        assert_eq!(payload.secret().as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_msg_string_envelope() {
        let payload = WebhookPayload::from_value(json!({
            "type": "answered",
            "msg": "{\"call_id\":\"c8\",\"from\":\"+966555000111\"}"
        }))
        .unwrap();

        assert_eq!(payload.call_id().as_deref(), Some("c8"));
        assert_eq!(payload.event_type().as_deref(), Some("answered"));
        assert_eq!(payload.raw()["type"], "answered");
    }

    #[test]
    fn test_inner_fields_take_priority() {
        let payload = WebhookPayload::from_value(json!({
            "type": "outer",
            "data": {"call_id": "c9", "type": "ended"}
        }))
        .unwrap();

        assert_eq!(payload.event_type().as_deref(), Some("ended"));
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(
            WebhookPayload::parse(b"{not json"),
            Err(AppError::MalformedPayload(_))
        ));
        assert!(matches!(
            WebhookPayload::parse(b"[1, 2, 3]"),
            Err(AppError::MalformedPayload(_))
        ));
        assert!(matches!(
            WebhookPayload::parse(br#"{"type": "answered"}"#).unwrap().identity(),
            Err(AppError::MissingField(_))
        ));
    }
}
