//! Agent repository implementation
//!
//! Extension to user mappings. Rows are created either by an administrator
//! or by the PBX extension sync; the sync never overwrites `user_id`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, error, info, instrument};
use yeastar_core::{models::Agent, traits::AgentRepository, AppError, AppResult};

/// PostgreSQL implementation of AgentRepository
pub struct PgAgentRepository {
    pool: PgPool,
}

impl PgAgentRepository {
    /// Create a new agent repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AgentRow {
    extension: String,
    agent_name: String,
    user_id: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Agent {
            extension: row.extension,
            agent_name: row.agent_name,
            user_id: row.user_id.filter(|u| !u.trim().is_empty()),
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl AgentRepository for PgAgentRepository {
    #[instrument(skip(self))]
    async fn find_by_extension(&self, extension: &str) -> AppResult<Option<Agent>> {
        debug!("Finding agent for extension {}", extension);

        let row = sqlx::query_as::<_, AgentRow>(
            "SELECT extension, agent_name, user_id, updated_at FROM agents WHERE extension = $1",
        )
        .bind(extension)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding agent {}: {}", extension, e);
            AppError::Database(format!("Failed to find agent: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list(&self) -> AppResult<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            "SELECT extension, agent_name, user_id, updated_at FROM agents ORDER BY extension",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing agents: {}", e);
            AppError::Database(format!("Failed to list agents: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn upsert(
        &self,
        extension: &str,
        agent_name: &str,
        user_id: Option<&str>,
    ) -> AppResult<Agent> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            INSERT INTO agents (extension, agent_name, user_id, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (extension) DO UPDATE
            SET agent_name = EXCLUDED.agent_name,
                user_id = EXCLUDED.user_id,
                updated_at = NOW()
            RETURNING extension, agent_name, user_id, updated_at
            "#,
        )
        .bind(extension)
        .bind(agent_name)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error saving agent {}: {}", extension, e);
            AppError::Database(format!("Failed to save agent: {}", e))
        })?;

        info!("Agent mapping saved: {} -> {:?}", extension, row.user_id);
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn upsert_from_pbx(&self, extension: &str, agent_name: &str) -> AppResult<Agent> {
        let row = sqlx::query_as::<_, AgentRow>(
            r#"
            INSERT INTO agents (extension, agent_name, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (extension) DO UPDATE
            SET agent_name = EXCLUDED.agent_name,
                updated_at = NOW()
            RETURNING extension, agent_name, user_id, updated_at
            "#,
        )
        .bind(extension)
        .bind(agent_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error syncing agent {}: {}", extension, e);
            AppError::Database(format!("Failed to sync agent: {}", e))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn delete(&self, extension: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE extension = $1")
            .bind(extension)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting agent {}: {}", extension, e);
                AppError::Database(format!("Failed to delete agent: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
