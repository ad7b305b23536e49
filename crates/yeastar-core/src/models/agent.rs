//! Agent model
//!
//! Maps a PBX extension to an internal user account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extension mapping row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    /// PBX extension number (unique)
    pub extension: String,

    /// Display name, from the PBX or set by an administrator
    pub agent_name: String,

    /// Internal user identifier; `None` until an administrator maps it
    pub user_id: Option<String>,

    pub updated_at: DateTime<Utc>,
}

/// Result of resolving an extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "user_id", rename_all = "lowercase")]
pub enum AgentResolution {
    Mapped(String),
    Unmapped,
}

impl AgentResolution {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            AgentResolution::Mapped(user) => Some(user),
            AgentResolution::Unmapped => None,
        }
    }

    pub fn into_user_id(self) -> Option<String> {
        match self {
            AgentResolution::Mapped(user) => Some(user),
            AgentResolution::Unmapped => None,
        }
    }
}

impl From<Option<&Agent>> for AgentResolution {
    fn from(agent: Option<&Agent>) -> Self {
        match agent.and_then(|a| a.user_id.as_deref()) {
            Some(user) if !user.trim().is_empty() => AgentResolution::Mapped(user.to_string()),
            _ => AgentResolution::Unmapped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(user_id: Option<&str>) -> Agent {
        Agent {
            extension: "101".to_string(),
            agent_name: "Front desk".to_string(),
            user_id: user_id.map(String::from),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_agent_without_user_is_unmapped() {
        assert_eq!(AgentResolution::from(Some(&agent(None))), AgentResolution::Unmapped);
        assert_eq!(AgentResolution::from(Some(&agent(Some(" ")))), AgentResolution::Unmapped);
        assert_eq!(AgentResolution::from(None), AgentResolution::Unmapped);
    }

    #[test]
    fn test_mapped_agent() {
        let resolution = AgentResolution::from(Some(&agent(Some("alice"))));
        assert_eq!(resolution.user_id(), Some("alice"));
        assert_eq!(resolution.into_user_id(), Some("alice".to_string()));
    }
}
