//! In-memory repositories
//!
//! Same semantics as the PostgreSQL repositories, backed by
//! `parking_lot` mutexes. Each operation runs entirely under one lock, which
//! gives the same atomicity as the transactional Postgres versions. Used by
//! the service and API test suites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use yeastar_core::{
    models::{
        Agent, ApplyResult, CallEventRecord, CallLog, CallLogFilter, CallUpdate, NewParty, Party,
        UpsertOutcome,
    },
    traits::{AgentRepository, CallLogRepository, PartyRepository},
    AppResult,
};

#[derive(Default)]
struct CallStore {
    logs: HashMap<String, CallLog>,
    events: Vec<CallEventRecord>,
}

impl CallStore {
    /// Append an audit row unless `(call_id, event_type)` is already present
    fn insert_event(
        &mut self,
        call_id: &str,
        event_type: &str,
        recognized: bool,
        payload: &JsonValue,
        received_at: DateTime<Utc>,
    ) -> bool {
        let exists = self
            .events
            .iter()
            .any(|e| e.call_id == call_id && e.event_type == event_type);
        if exists {
            return false;
        }

        let id = self.events.len() as i64 + 1;
        self.events.push(CallEventRecord {
            id,
            call_id: call_id.to_string(),
            event_type: event_type.to_string(),
            recognized,
            payload: payload.clone(),
            received_at,
        });
        true
    }
}

/// In-memory call log store
#[derive(Default)]
pub struct MemoryCallLogRepository {
    store: Mutex<CallStore>,
}

impl MemoryCallLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored call logs
    pub fn len(&self) -> usize {
        self.store.lock().logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CallLogRepository for MemoryCallLogRepository {
    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CallLog>> {
        Ok(self.store.lock().logs.get(call_id).cloned())
    }

    async fn list_filtered(
        &self,
        filter: &CallLogFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CallLog>, i64)> {
        let store = self.store.lock();
        let mut matching: Vec<&CallLog> =
            store.logs.values().filter(|l| filter.matches(l)).collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.call_id.cmp(&b.call_id))
        });

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn list_events(&self, call_id: &str) -> AppResult<Vec<CallEventRecord>> {
        let store = self.store.lock();
        let mut events: Vec<CallEventRecord> = store
            .events
            .iter()
            .filter(|e| e.call_id == call_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.received_at.cmp(&b.received_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn apply_update(&self, update: &CallUpdate) -> AppResult<ApplyResult> {
        let mut store = self.store.lock();

        let fresh = store.insert_event(
            &update.call_id,
            update.event_type(),
            true,
            &update.raw_payload,
            update.received_at,
        );
        if !fresh {
            return Ok(ApplyResult {
                outcome: UpsertOutcome::Duplicate,
                call_log: store.logs.get(&update.call_id).cloned(),
            });
        }

        let (outcome, log) = match store.logs.get_mut(&update.call_id) {
            Some(log) => {
                log.merge(update);
                (UpsertOutcome::Updated, log.clone())
            }
            None => {
                let log = CallLog::from_update(update);
                store.logs.insert(log.call_id.clone(), log.clone());
                (UpsertOutcome::Created, log)
            }
        };

        Ok(ApplyResult {
            outcome,
            call_log: Some(log),
        })
    }

    async fn record_unrecognized(
        &self,
        call_id: &str,
        event_type: &str,
        payload: &JsonValue,
        received_at: DateTime<Utc>,
    ) -> AppResult<ApplyResult> {
        let mut store = self.store.lock();

        let fresh = store.insert_event(call_id, event_type, false, payload, received_at);
        if fresh {
            if let Some(log) = store.logs.get_mut(call_id) {
                log.record_unrecognized(event_type, payload, received_at);
            }
        }

        Ok(ApplyResult {
            outcome: if fresh {
                UpsertOutcome::Unrecognized
            } else {
                UpsertOutcome::Duplicate
            },
            call_log: store.logs.get(call_id).cloned(),
        })
    }
}

/// In-memory Customer/Lead store
#[derive(Default)]
pub struct MemoryPartyRepository {
    parties: Mutex<Vec<Party>>,
}

impl MemoryPartyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a party directly, e.g. an existing Customer
    pub fn insert(&self, party: NewParty, created_at: DateTime<Utc>) -> Party {
        let mut parties = self.parties.lock();
        let stored = Party {
            id: parties.len() as i64 + 1,
            party_type: party.party_type,
            name: party.name,
            phone: party.phone,
            mobile_no: party.mobile_no,
            phone_normalized: party.phone_normalized,
            mobile_normalized: party.mobile_normalized,
            created_at,
        };
        parties.push(stored.clone());
        stored
    }

    pub fn all(&self) -> Vec<Party> {
        self.parties.lock().clone()
    }

    fn best_match(&self, pred: impl Fn(&str) -> bool) -> Option<Party> {
        self.parties
            .lock()
            .iter()
            .filter(|p| p.any_number(&pred))
            .min_by(|a, b| {
                a.party_type
                    .precedence()
                    .cmp(&b.party_type.precedence())
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .cloned()
    }
}

#[async_trait]
impl PartyRepository for MemoryPartyRepository {
    async fn find_by_phone(&self, phone_normalized: &str) -> AppResult<Option<Party>> {
        Ok(self.best_match(|p| p == phone_normalized))
    }

    async fn find_by_phone_suffix(&self, digits: &str) -> AppResult<Option<Party>> {
        Ok(self.best_match(|p| p.ends_with(digits)))
    }

    async fn create(&self, party: &NewParty) -> AppResult<Party> {
        Ok(self.insert(party.clone(), Utc::now()))
    }
}

/// In-memory extension mapping table
#[derive(Default)]
pub struct MemoryAgentRepository {
    agents: Mutex<BTreeMap<String, Agent>>,
}

impl MemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for MemoryAgentRepository {
    async fn find_by_extension(&self, extension: &str) -> AppResult<Option<Agent>> {
        Ok(self.agents.lock().get(extension).cloned())
    }

    async fn list(&self) -> AppResult<Vec<Agent>> {
        Ok(self.agents.lock().values().cloned().collect())
    }

    async fn upsert(
        &self,
        extension: &str,
        agent_name: &str,
        user_id: Option<&str>,
    ) -> AppResult<Agent> {
        let agent = Agent {
            extension: extension.to_string(),
            agent_name: agent_name.to_string(),
            user_id: user_id
                .filter(|u| !u.trim().is_empty())
                .map(String::from),
            updated_at: Utc::now(),
        };
        self.agents
            .lock()
            .insert(extension.to_string(), agent.clone());
        Ok(agent)
    }

    async fn upsert_from_pbx(&self, extension: &str, agent_name: &str) -> AppResult<Agent> {
        let mut agents = self.agents.lock();
        let agent = agents
            .entry(extension.to_string())
            .and_modify(|a| {
                a.agent_name = agent_name.to_string();
                a.updated_at = Utc::now();
            })
            .or_insert_with(|| Agent {
                extension: extension.to_string(),
                agent_name: agent_name.to_string(),
                user_id: None,
                updated_at: Utc::now(),
            });
        Ok(agent.clone())
    }

    async fn delete(&self, extension: &str) -> AppResult<bool> {
        Ok(self.agents.lock().remove(extension).is_some())
    }
}
