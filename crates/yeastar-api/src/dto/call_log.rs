//! Call log DTOs

use super::common::PaginationParams;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::Validate;
use yeastar_core::{
    models::{CallDirection, CallEventRecord, CallLog, CallLogFilter, CallStatus, LinkedParty, PartyType},
    AppError, AppResult,
};

/// Call log list query
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CallLogFilterParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub pagination: PaginationParams,

    /// `ringing`, `answered`, `ended` or `missed`
    pub status: Option<String>,

    /// `inbound`, `outbound`, `internal` or `unknown`
    pub direction: Option<String>,

    #[validate(length(min = 1, max = 32))]
    pub extension: Option<String>,

    /// `customer` or `lead`
    pub party_type: Option<String>,

    /// Lower bound on creation time, RFC 3339 or `YYYY-MM-DD`
    pub from: Option<String>,

    /// Exclusive upper bound on creation time
    pub to: Option<String>,
}

impl CallLogFilterParams {
    /// Convert to a store filter
    ///
    /// # Errors
    ///
    /// `AppError::InvalidInput` for unknown enum values or unparseable dates
    pub fn to_filter(&self) -> AppResult<CallLogFilter> {
        let status = self
            .status
            .as_deref()
            .map(|s| {
                CallStatus::parse(s.trim())
                    .ok_or_else(|| AppError::InvalidInput(format!("Unknown status '{}'", s)))
            })
            .transpose()?;

        let direction = self
            .direction
            .as_deref()
            .map(|d| {
                let parsed = CallDirection::parse(d);
                if parsed.is_known() || d.trim().eq_ignore_ascii_case("unknown") {
                    Ok(parsed)
                } else {
                    Err(AppError::InvalidInput(format!("Unknown direction '{}'", d)))
                }
            })
            .transpose()?;

        let party_type = self
            .party_type
            .as_deref()
            .map(|p| {
                PartyType::parse(p)
                    .ok_or_else(|| AppError::InvalidInput(format!("Unknown party type '{}'", p)))
            })
            .transpose()?;

        let from = parse_optional_date(self.from.as_deref(), "from")?;
        let to = parse_optional_date(self.to.as_deref(), "to")?;
        if let (Some(from), Some(to)) = (from, to) {
            if from >= to {
                return Err(AppError::InvalidInput("'from' must be before 'to'".to_string()));
            }
        }

        Ok(CallLogFilter {
            status,
            direction,
            extension: self.extension.as_ref().map(|e| e.trim().to_string()),
            party_type,
            from,
            to,
        })
    }
}

/// Accepts RFC 3339 or a plain date (midnight UTC)
fn parse_optional_date(raw: Option<&str>, field: &str) -> AppResult<Option<DateTime<Utc>>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| AppError::InvalidInput(format!("Invalid '{}' date '{}'", field, raw)))
}

/// Call log as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct CallLogResponse {
    pub call_id: String,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub caller_number: Option<String>,
    pub callee_number: Option<String>,
    pub caller_normalized: Option<String>,
    pub callee_normalized: Option<String>,
    pub extension: Option<String>,
    pub agent_user: Option<String>,
    pub linked_party: Option<LinkedParty>,
    pub start_time: Option<DateTime<Utc>>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    /// `MM:SS`
    pub duration_display: Option<String>,
    pub answered: bool,
    pub recording_url: Option<String>,
    pub recording_id: Option<String>,
    pub last_event_type: String,
    pub event_count: i32,
    pub raw_payload: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CallLog> for CallLogResponse {
    fn from(log: CallLog) -> Self {
        let duration_display = log.display_duration();
        let answered = log.was_answered();

        Self {
            call_id: log.call_id,
            direction: log.direction,
            status: log.status,
            caller_number: log.caller_number,
            callee_number: log.callee_number,
            caller_normalized: log.caller_normalized,
            callee_normalized: log.callee_normalized,
            extension: log.extension,
            agent_user: log.agent_user,
            linked_party: log.linked_party,
            start_time: log.start_time,
            answer_time: log.answer_time,
            end_time: log.end_time,
            duration: log.duration,
            duration_display,
            answered,
            recording_url: log.recording_url,
            recording_id: log.recording_id,
            last_event_type: log.last_event_type,
            event_count: log.event_count,
            raw_payload: log.raw_payload,
            created_at: log.created_at,
            updated_at: log.updated_at,
        }
    }
}

/// Audit trail entry as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct CallEventResponse {
    pub id: i64,
    pub event_type: String,
    pub recognized: bool,
    pub payload: JsonValue,
    pub received_at: DateTime<Utc>,
}

impl From<CallEventRecord> for CallEventResponse {
    fn from(event: CallEventRecord) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            recognized: event.recognized,
            payload: event.payload,
            received_at: event.received_at,
        }
    }
}
