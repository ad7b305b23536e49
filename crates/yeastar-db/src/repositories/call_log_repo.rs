//! Call log repository implementation
//!
//! PostgreSQL-backed call log store. Every delivery runs in one
//! transaction: the audit row is inserted first (its unique key makes
//! redelivery a no-op), then the call log row is locked with
//! `SELECT ... FOR UPDATE` and merged, so concurrent webhooks for the
//! same call never lose updates, even across server instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, instrument};
use yeastar_core::{
    models::{
        ApplyResult, CallDirection, CallEventRecord, CallLog, CallLogFilter, CallStatus,
        CallUpdate, LinkedParty, PartyType, UpsertOutcome,
    },
    traits::CallLogRepository,
    AppError, AppResult,
};

/// PostgreSQL implementation of CallLogRepository
pub struct PgCallLogRepository {
    pool: PgPool,
}

impl PgCallLogRepository {
    /// Create a new call log repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CALL_LOG_COLUMNS: &str = r#"
    call_id, direction, status,
    caller_number, callee_number, caller_normalized, callee_normalized,
    extension, agent_user,
    linked_party_type, linked_party_id, linked_party_name,
    start_time, answer_time, end_time, duration, recording_url, recording_id,
    raw_payload, last_event_type, event_count,
    created_at, updated_at
"#;

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    error!("Database error {}: {}", context, e);
    AppError::Database(format!("Failed to {}: {}", context, e))
}

/// Insert an audit row; returns false when `(call_id, event_type)` already exists
async fn insert_event(
    conn: &mut PgConnection,
    call_id: &str,
    event_type: &str,
    recognized: bool,
    payload: &JsonValue,
    received_at: DateTime<Utc>,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO call_events (call_id, event_type, recognized, payload, received_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (call_id, event_type) DO NOTHING
        "#,
    )
    .bind(call_id)
    .bind(event_type)
    .bind(recognized)
    .bind(payload)
    .bind(received_at)
    .execute(conn)
    .await
    .map_err(|e| db_error("record call event", e))?;

    Ok(result.rows_affected() > 0)
}

async fn select_call_log(
    conn: &mut PgConnection,
    call_id: &str,
    for_update: bool,
) -> AppResult<Option<CallLog>> {
    let query = format!(
        "SELECT {} FROM call_logs WHERE call_id = $1{}",
        CALL_LOG_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );

    let row = sqlx::query_as::<Postgres, CallLogRow>(&query)
        .bind(call_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| db_error("load call log", e))?;

    row.map(CallLog::try_from).transpose()
}

/// Insert a new call log; returns false if another transaction created it first
async fn insert_call_log(conn: &mut PgConnection, log: &CallLog) -> AppResult<bool> {
    let (party_type, party_id, party_name) = split_party(&log.linked_party);

    let result = sqlx::query(
        r#"
        INSERT INTO call_logs (
            call_id, direction, status,
            caller_number, callee_number, caller_normalized, callee_normalized,
            extension, agent_user,
            linked_party_type, linked_party_id, linked_party_name,
            start_time, answer_time, end_time, duration, recording_url,
            raw_payload, last_event_type, event_count,
            created_at, updated_at, recording_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23)
        ON CONFLICT (call_id) DO NOTHING
        "#,
    )
    .bind(&log.call_id)
    .bind(log.direction.as_str())
    .bind(log.status.as_str())
    .bind(&log.caller_number)
    .bind(&log.callee_number)
    .bind(&log.caller_normalized)
    .bind(&log.callee_normalized)
    .bind(&log.extension)
    .bind(&log.agent_user)
    .bind(party_type)
    .bind(party_id)
    .bind(party_name)
    .bind(log.start_time)
    .bind(log.answer_time)
    .bind(log.end_time)
    .bind(log.duration)
    .bind(&log.recording_url)
    .bind(&log.raw_payload)
    .bind(&log.last_event_type)
    .bind(log.event_count)
    .bind(log.created_at)
    .bind(log.updated_at)
    .bind(&log.recording_id)
    .execute(conn)
    .await
    .map_err(|e| db_error("insert call log", e))?;

    Ok(result.rows_affected() > 0)
}

async fn update_call_log(conn: &mut PgConnection, log: &CallLog) -> AppResult<()> {
    let (party_type, party_id, party_name) = split_party(&log.linked_party);

    sqlx::query(
        r#"
        UPDATE call_logs
        SET direction = $2,
            status = $3,
            caller_number = $4,
            callee_number = $5,
            caller_normalized = $6,
            callee_normalized = $7,
            extension = $8,
            agent_user = $9,
            linked_party_type = $10,
            linked_party_id = $11,
            linked_party_name = $12,
            start_time = $13,
            answer_time = $14,
            end_time = $15,
            duration = $16,
            recording_url = $17,
            raw_payload = $18,
            last_event_type = $19,
            event_count = $20,
            updated_at = $21,
            recording_id = $22
        WHERE call_id = $1
        "#,
    )
    .bind(&log.call_id)
    .bind(log.direction.as_str())
    .bind(log.status.as_str())
    .bind(&log.caller_number)
    .bind(&log.callee_number)
    .bind(&log.caller_normalized)
    .bind(&log.callee_normalized)
    .bind(&log.extension)
    .bind(&log.agent_user)
    .bind(party_type)
    .bind(party_id)
    .bind(party_name)
    .bind(log.start_time)
    .bind(log.answer_time)
    .bind(log.end_time)
    .bind(log.duration)
    .bind(&log.recording_url)
    .bind(&log.raw_payload)
    .bind(&log.last_event_type)
    .bind(log.event_count)
    .bind(log.updated_at)
    .bind(&log.recording_id)
    .execute(conn)
    .await
    .map_err(|e| db_error("update call log", e))?;

    Ok(())
}

fn split_party(party: &Option<LinkedParty>) -> (Option<&'static str>, Option<i64>, Option<&str>) {
    match party {
        Some(p) => (
            Some(p.party_type.as_str()),
            Some(p.party_id),
            Some(p.name.as_str()),
        ),
        None => (None, None, None),
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &CallLogFilter) {
    builder.push(" WHERE TRUE");

    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(direction) = filter.direction {
        builder.push(" AND direction = ").push_bind(direction.as_str());
    }
    if let Some(extension) = &filter.extension {
        builder.push(" AND extension = ").push_bind(extension.clone());
    }
    if let Some(party_type) = filter.party_type {
        builder
            .push(" AND linked_party_type = ")
            .push_bind(party_type.as_str());
    }
    if let Some(from) = filter.from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND created_at < ").push_bind(to);
    }
}

#[async_trait]
impl CallLogRepository for PgCallLogRepository {
    #[instrument(skip(self))]
    async fn find_by_call_id(&self, call_id: &str) -> AppResult<Option<CallLog>> {
        debug!("Finding call log: {}", call_id);

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::Pool(e.to_string()))?;

        select_call_log(&mut *conn, call_id, false).await
    }

    #[instrument(skip(self))]
    async fn list_filtered(
        &self,
        filter: &CallLogFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CallLog>, i64)> {
        debug!(
            "Listing call logs: filter={:?}, limit={}, offset={}",
            filter, limit, offset
        );

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM call_logs");
        push_filters(&mut count, filter);

        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("count call logs", e))?;

        let mut data = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM call_logs",
            CALL_LOG_COLUMNS
        ));
        push_filters(&mut data, filter);
        data.push(" ORDER BY created_at DESC, call_id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<CallLogRow> = data
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list call logs", e))?;

        let logs = rows
            .into_iter()
            .map(CallLog::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((logs, total))
    }

    #[instrument(skip(self))]
    async fn list_events(&self, call_id: &str) -> AppResult<Vec<CallEventRecord>> {
        let rows = sqlx::query_as::<Postgres, CallEventRow>(
            r#"
            SELECT id, call_id, event_type, recognized, payload, received_at
            FROM call_events
            WHERE call_id = $1
            ORDER BY received_at, id
            "#,
        )
        .bind(call_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list call events", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, update), fields(call_id = %update.call_id, event = update.event_type()))]
    async fn apply_update(&self, update: &CallUpdate) -> AppResult<ApplyResult> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let fresh = insert_event(
            &mut *tx,
            &update.call_id,
            update.event_type(),
            true,
            &update.raw_payload,
            update.received_at,
        )
        .await?;

        if !fresh {
            debug!("Duplicate delivery ignored");
            let existing = select_call_log(&mut *tx, &update.call_id, false).await?;
            tx.commit()
                .await
                .map_err(|e| AppError::Transaction(e.to_string()))?;
            return Ok(ApplyResult {
                outcome: UpsertOutcome::Duplicate,
                call_log: existing,
            });
        }

        let (outcome, log) = match select_call_log(&mut *tx, &update.call_id, true).await? {
            Some(mut log) => {
                log.merge(update);
                update_call_log(&mut *tx, &log).await?;
                (UpsertOutcome::Updated, log)
            }
            None => {
                let log = CallLog::from_update(update);
                if insert_call_log(&mut *tx, &log).await? {
                    (UpsertOutcome::Created, log)
                } else {
                    // Lost the insert race; merge into the winner's row
                    let mut log = select_call_log(&mut *tx, &update.call_id, true)
                        .await?
                        .ok_or_else(|| {
                            AppError::Database(format!(
                                "Call log {} vanished during upsert",
                                update.call_id
                            ))
                        })?;
                    log.merge(update);
                    update_call_log(&mut *tx, &log).await?;
                    (UpsertOutcome::Updated, log)
                }
            }
        };

        tx.commit().await.map_err(|e| {
            error!("Failed to commit call log {}: {}", update.call_id, e);
            AppError::Transaction(format!("Failed to commit: {}", e))
        })?;

        Ok(ApplyResult {
            outcome,
            call_log: Some(log),
        })
    }

    #[instrument(skip(self, payload))]
    async fn record_unrecognized(
        &self,
        call_id: &str,
        event_type: &str,
        payload: &JsonValue,
        received_at: DateTime<Utc>,
    ) -> AppResult<ApplyResult> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let fresh = insert_event(&mut *tx, call_id, event_type, false, payload, received_at).await?;

        let mut existing = select_call_log(&mut *tx, call_id, fresh).await?;
        if fresh {
            if let Some(log) = existing.as_mut() {
                log.record_unrecognized(event_type, payload, received_at);
                update_call_log(&mut *tx, log).await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Transaction(format!("Failed to commit: {}", e)))?;

        Ok(ApplyResult {
            outcome: if fresh {
                UpsertOutcome::Unrecognized
            } else {
                UpsertOutcome::Duplicate
            },
            call_log: existing,
        })
    }
}

/// Helper struct for mapping database rows to domain model
#[derive(Debug, sqlx::FromRow)]
struct CallLogRow {
    call_id: String,
    direction: String,
    status: String,
    caller_number: Option<String>,
    callee_number: Option<String>,
    caller_normalized: Option<String>,
    callee_normalized: Option<String>,
    extension: Option<String>,
    agent_user: Option<String>,
    linked_party_type: Option<String>,
    linked_party_id: Option<i64>,
    linked_party_name: Option<String>,
    start_time: Option<DateTime<Utc>>,
    answer_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    duration: Option<i32>,
    recording_url: Option<String>,
    recording_id: Option<String>,
    raw_payload: JsonValue,
    last_event_type: String,
    event_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CallLogRow> for CallLog {
    type Error = AppError;

    fn try_from(row: CallLogRow) -> Result<Self, Self::Error> {
        let status = CallStatus::parse(&row.status).ok_or_else(|| {
            AppError::Database(format!(
                "Call log {} has invalid status '{}'",
                row.call_id, row.status
            ))
        })?;

        // A link whose party was deleted keeps only the type and name; drop it
        let linked_party = match (
            row.linked_party_type.as_deref().and_then(PartyType::parse),
            row.linked_party_id,
        ) {
            (Some(party_type), Some(party_id)) => Some(LinkedParty {
                party_type,
                party_id,
                name: row.linked_party_name.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(CallLog {
            call_id: row.call_id,
            direction: CallDirection::parse(&row.direction),
            status,
            caller_number: row.caller_number,
            callee_number: row.callee_number,
            caller_normalized: row.caller_normalized,
            callee_normalized: row.callee_normalized,
            extension: row.extension,
            agent_user: row.agent_user,
            linked_party,
            start_time: row.start_time,
            answer_time: row.answer_time,
            end_time: row.end_time,
            duration: row.duration,
            recording_url: row.recording_url,
            recording_id: row.recording_id,
            raw_payload: row.raw_payload,
            last_event_type: row.last_event_type,
            event_count: row.event_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CallEventRow {
    id: i64,
    call_id: String,
    event_type: String,
    recognized: bool,
    payload: JsonValue,
    received_at: DateTime<Utc>,
}

impl From<CallEventRow> for CallEventRecord {
    fn from(row: CallEventRow) -> Self {
        Self {
            id: row.id,
            call_id: row.call_id,
            event_type: row.event_type,
            recognized: row.recognized,
            payload: row.payload,
            received_at: row.received_at,
        }
    }
}
