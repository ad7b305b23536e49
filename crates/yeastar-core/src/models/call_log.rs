//! Call log model
//!
//! A call log is the durable record of one PBX call. It is created by the
//! first lifecycle event seen for a call id and merged with every later one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use super::party::LinkedParty;

/// Call direction as seen from the PBX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
    Internal,
    #[default]
    Unknown,
}

impl CallDirection {
    /// Parse a vendor direction string (case-insensitive)
    ///
    /// Anything unrecognized maps to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "inbound" | "incoming" | "in" => CallDirection::Inbound,
            "outbound" | "outgoing" | "out" => CallDirection::Outbound,
            "internal" | "local" => CallDirection::Internal,
            _ => CallDirection::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
            CallDirection::Internal => "internal",
            CallDirection::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, CallDirection::Unknown)
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Answered,
    Ended,
    Missed,
}

impl CallStatus {
    /// Map a vendor event type to a status
    ///
    /// Matching ignores case, spaces, dashes, and underscores, so
    /// `"No Answer"`, `"no_answer"` and `"NOANSWER"` are the same event.
    pub fn from_event_type(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-' | '.'))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "ringing" | "ring" | "started" | "start" | "callstart" | "dialing" | "alerting" => {
                Some(CallStatus::Ringing)
            }
            "answered" | "answer" | "connected" | "callanswered" => Some(CallStatus::Answered),
            "ended" | "end" | "hangup" | "hungup" | "completed" | "callend" | "bye" => {
                Some(CallStatus::Ended)
            }
            "missed" | "noanswer" | "unanswered" | "abandoned" | "busy" | "callmissed" => {
                Some(CallStatus::Missed)
            }
            _ => None,
        }
    }

    /// Parse the canonical name stored in the database
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ringing" => Some(CallStatus::Ringing),
            "answered" => Some(CallStatus::Answered),
            "ended" => Some(CallStatus::Ended),
            "missed" => Some(CallStatus::Missed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::Ended => "ended",
            CallStatus::Missed => "missed",
        }
    }

    /// Position in the call lifecycle; status never moves to a lower rank
    pub fn rank(&self) -> u8 {
        match self {
            CallStatus::Ringing => 1,
            CallStatus::Answered => 2,
            CallStatus::Ended | CallStatus::Missed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Ended | CallStatus::Missed)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized content of one lifecycle event
///
/// Produced by the event normalizer, enriched with the agent and linked
/// party by the pipeline, then merged into the stored [`CallLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct CallUpdate {
    pub call_id: String,
    pub status: CallStatus,
    pub direction: CallDirection,
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
    pub recording_url: Option<String>,
    /// PBX recording identifier, used to fetch the file later
    pub recording_id: Option<String>,
    pub raw_payload: JsonValue,
    pub received_at: DateTime<Utc>,
}

impl CallUpdate {
    /// Create an update carrying only the identity and status
    pub fn new(call_id: impl Into<String>, status: CallStatus, raw_payload: JsonValue) -> Self {
        Self {
            call_id: call_id.into(),
            status,
            direction: CallDirection::Unknown,
            caller_number: None,
            callee_number: None,
            caller_normalized: None,
            callee_normalized: None,
            extension: None,
            agent_user: None,
            linked_party: None,
            start_time: None,
            answer_time: None,
            end_time: None,
            duration: None,
            recording_url: None,
            recording_id: None,
            raw_payload,
            received_at: Utc::now(),
        }
    }

    /// Canonical event type used for idempotency
    pub fn event_type(&self) -> &'static str {
        self.status.as_str()
    }

    /// Normalized number of the external party, chosen by direction
    ///
    /// Outbound calls look at the callee and inbound calls at the caller.
    /// With no known direction the caller is preferred, falling back to the
    /// callee when the caller is an internal extension. Internal calls have
    /// no external party.
    pub fn party_number(&self) -> Option<&str> {
        match self.direction {
            CallDirection::Internal => None,
            CallDirection::Outbound => self.callee_normalized.as_deref(),
            CallDirection::Inbound => self.caller_normalized.as_deref(),
            CallDirection::Unknown => self
                .caller_normalized
                .as_deref()
                .or(self.callee_normalized.as_deref()),
        }
    }
}

/// Durable call record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallLog {
    /// PBX call identifier, stable across lifecycle updates
    pub call_id: String,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub caller_number: Option<String>,
    pub callee_number: Option<String>,
    pub caller_normalized: Option<String>,
    pub callee_normalized: Option<String>,
    pub extension: Option<String>,
    /// User resolved from the extension; `None` means unmapped
    pub agent_user: Option<String>,
    pub linked_party: Option<LinkedParty>,
    pub start_time: Option<DateTime<Utc>>,
    pub answer_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Duration in seconds
    pub duration: Option<i32>,
    pub recording_url: Option<String>,
    pub recording_id: Option<String>,
    /// Payload of the most recent delivery
    pub raw_payload: JsonValue,
    pub last_event_type: String,
    /// Number of distinct deliveries applied
    pub event_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallLog {
    /// Build the first record for a call from its first event
    pub fn from_update(update: &CallUpdate) -> Self {
        let mut log = Self {
            call_id: update.call_id.clone(),
            direction: update.direction,
            status: update.status,
            caller_number: update.caller_number.clone(),
            callee_number: update.callee_number.clone(),
            caller_normalized: update.caller_normalized.clone(),
            callee_normalized: update.callee_normalized.clone(),
            extension: update.extension.clone(),
            agent_user: update.agent_user.clone(),
            linked_party: update.linked_party.clone(),
            start_time: update.start_time,
            answer_time: update.answer_time,
            end_time: update.end_time,
            duration: update.duration,
            recording_url: update.recording_url.clone(),
            recording_id: update.recording_id.clone(),
            raw_payload: update.raw_payload.clone(),
            last_event_type: update.event_type().to_string(),
            event_count: 1,
            created_at: update.received_at,
            updated_at: update.received_at,
        };
        log.derive_duration();
        log
    }

    /// Merge a later event into this record
    ///
    /// - caller, callee, direction, start time, and the linked party keep
    ///   their first known value
    /// - status only advances; a terminal status is final
    /// - extension, agent, timing, and recording take any new non-empty value,
    ///   except that a finished call only fills missing answer and end times
    ///   and never records an answer after its end
    /// - raw payload and bookkeeping always reflect the latest delivery
    pub fn merge(&mut self, update: &CallUpdate) {
        let was_terminal = self.status.is_terminal();

        fill_once(&mut self.caller_number, &update.caller_number);
        fill_once(&mut self.callee_number, &update.callee_number);
        fill_once(&mut self.caller_normalized, &update.caller_normalized);
        fill_once(&mut self.callee_normalized, &update.callee_normalized);
        fill_once(&mut self.linked_party, &update.linked_party);
        fill_once(&mut self.start_time, &update.start_time);

        if !self.direction.is_known() && update.direction.is_known() {
            self.direction = update.direction;
        }

        if update.status.rank() > self.status.rank() {
            self.status = update.status;
        }

        if update.extension.is_some() {
            self.extension = update.extension.clone();
            self.agent_user = update.agent_user.clone();
        }

        if was_terminal {
            fill_once(&mut self.end_time, &update.end_time);
            let answered_in_time = update
                .answer_time
                .is_some_and(|t| self.end_time.map_or(true, |end| t <= end));
            if answered_in_time {
                fill_once(&mut self.answer_time, &update.answer_time);
            }
        } else {
            overwrite(&mut self.answer_time, &update.answer_time);
            overwrite(&mut self.end_time, &update.end_time);
        }
        overwrite(&mut self.duration, &update.duration);
        overwrite(&mut self.recording_url, &update.recording_url);
        overwrite(&mut self.recording_id, &update.recording_id);

        self.derive_duration();
        self.record_delivery(update.event_type(), &update.raw_payload, update.received_at);
    }

    /// Record a delivery whose event type was not understood
    ///
    /// Only the audit fields change; normalized fields stay as they are.
    pub fn record_unrecognized(&mut self, event_type: &str, payload: &JsonValue, at: DateTime<Utc>) {
        self.record_delivery(event_type, payload, at);
    }

    fn record_delivery(&mut self, event_type: &str, payload: &JsonValue, at: DateTime<Utc>) {
        self.raw_payload = payload.clone();
        self.last_event_type = event_type.to_string();
        self.event_count += 1;
        if at > self.updated_at {
            self.updated_at = at;
        }
    }

    fn derive_duration(&mut self) {
        if self.duration.is_some() || !self.status.is_terminal() {
            return;
        }
        if let (Some(answered), Some(ended)) = (self.answer_time, self.end_time) {
            let secs = (ended - answered).num_seconds();
            if secs >= 0 {
                self.duration = i32::try_from(secs).ok();
            }
        }
    }

    /// Duration formatted as `MM:SS`
    pub fn display_duration(&self) -> Option<String> {
        self.duration
            .map(|d| format!("{:02}:{:02}", d / 60, d % 60))
    }

    pub fn was_answered(&self) -> bool {
        self.answer_time.is_some() || self.status == CallStatus::Answered
    }
}

fn fill_once<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(incoming);
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        slot.clone_from(incoming);
    }
}

/// Audit trail entry for one webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallEventRecord {
    pub id: i64,
    pub call_id: String,
    /// Canonical status name, or the raw type when unrecognized
    pub event_type: String,
    pub recognized: bool,
    pub payload: JsonValue,
    pub received_at: DateTime<Utc>,
}

/// What the store did with a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    /// First event for this call id
    Created,
    /// Merged into an existing record
    Updated,
    /// Same (call id, event type) was already applied
    Duplicate,
    /// Event type not understood; only the audit trail changed
    Unrecognized,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Duplicate => "duplicate",
            UpsertOutcome::Unrecognized => "unrecognized",
        }
    }
}

/// Result of applying one delivery to the store
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub outcome: UpsertOutcome,
    /// Stored record after the delivery; absent for an unrecognized first event
    pub call_log: Option<CallLog>,
}

/// Filters for listing call logs
#[derive(Debug, Clone, Default)]
pub struct CallLogFilter {
    pub status: Option<CallStatus>,
    pub direction: Option<CallDirection>,
    pub extension: Option<String>,
    pub party_type: Option<super::party::PartyType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl CallLogFilter {
    /// In-memory predicate equivalent to the SQL filter
    pub fn matches(&self, log: &CallLog) -> bool {
        if self.status.is_some_and(|s| s != log.status) {
            return false;
        }
        if self.direction.is_some_and(|d| d != log.direction) {
            return false;
        }
        if let Some(ext) = &self.extension {
            if log.extension.as_deref() != Some(ext.as_str()) {
                return false;
            }
        }
        if let Some(pt) = self.party_type {
            if log.linked_party.as_ref().map(|p| p.party_type) != Some(pt) {
                return false;
            }
        }
        if self.from.is_some_and(|from| log.created_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| log.created_at >= to) {
            return false;
        }
        true
    }
}
