//! Extension mapping DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
use yeastar_core::models::Agent;

/// Body of `PUT /agents/{extension}`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AgentUpsertRequest {
    #[validate(length(min = 1, max = 140))]
    pub agent_name: String,

    /// Internal user to map the extension to; omit to leave it unmapped
    #[validate(length(min = 1, max = 140))]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub extension: String,
    pub agent_name: String,
    pub user_id: Option<String>,
    pub mapped: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<Agent> for AgentResponse {
    fn from(agent: Agent) -> Self {
        Self {
            mapped: agent.user_id.is_some(),
            extension: agent.extension,
            agent_name: agent.agent_name,
            user_id: agent.user_id,
            updated_at: agent.updated_at,
        }
    }
}
