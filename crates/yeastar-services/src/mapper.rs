//! Extension mapper
//!
//! Resolves a PBX extension to the internal user it is mapped to, with an
//! optional read-through cache. Admin writes go through this service so
//! cached resolutions are invalidated.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use yeastar_cache::{get_json, keys, set_json};
use yeastar_core::{
    models::{Agent, AgentResolution},
    traits::{AgentRepository, CacheService},
    AppError, AppResult,
};

pub struct ExtensionMapper {
    agents: Arc<dyn AgentRepository>,
    cache: Option<Arc<dyn CacheService>>,
    ttl_secs: u64,
}

impl ExtensionMapper {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        cache: Option<Arc<dyn CacheService>>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            agents,
            cache,
            ttl_secs,
        }
    }

    /// Resolve an extension
    ///
    /// Unknown extensions and rows without a user are `Unmapped`; only a
    /// failing mapping table is an error. Cache failures are logged and
    /// bypassed.
    #[instrument(skip(self))]
    pub async fn resolve(&self, extension: &str) -> AppResult<AgentResolution> {
        let extension = extension.trim();
        if extension.is_empty() {
            return Ok(AgentResolution::Unmapped);
        }

        let key = keys::agent_key(extension);

        if let Some(cache) = &self.cache {
            match get_json::<AgentResolution>(cache.as_ref(), &key).await {
                Ok(Some(hit)) => {
                    debug!("Extension {} resolved from cache", extension);
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => warn!("Agent cache read failed for {}: {}", extension, e),
            }
        }

        let agent = self.agents.find_by_extension(extension).await?;
        let resolution = AgentResolution::from(agent.as_ref());

        if let Some(cache) = &self.cache {
            if let Err(e) = set_json(cache.as_ref(), &key, &resolution, self.ttl_secs).await {
                warn!("Agent cache write failed for {}: {}", extension, e);
            }
        }

        if resolution == AgentResolution::Unmapped {
            debug!("Extension {} is not mapped to a user", extension);
        }

        Ok(resolution)
    }

    /// Drop the cached resolution for an extension
    pub async fn invalidate(&self, extension: &str) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.delete(&keys::agent_key(extension)).await {
                warn!("Agent cache invalidation failed for {}: {}", extension, e);
            }
        }
    }

    pub async fn get(&self, extension: &str) -> AppResult<Agent> {
        self.agents
            .find_by_extension(extension)
            .await?
            .ok_or_else(|| AppError::AgentNotFound(extension.to_string()))
    }

    pub async fn list(&self) -> AppResult<Vec<Agent>> {
        self.agents.list().await
    }

    /// Create or replace a mapping
    #[instrument(skip(self))]
    pub async fn save(
        &self,
        extension: &str,
        agent_name: &str,
        user_id: Option<&str>,
    ) -> AppResult<Agent> {
        let agent = self.agents.upsert(extension, agent_name, user_id).await?;
        self.invalidate(extension).await;
        info!("Extension {} mapped to {:?}", extension, agent.user_id);
        Ok(agent)
    }

    /// Delete a mapping
    #[instrument(skip(self))]
    pub async fn remove(&self, extension: &str) -> AppResult<()> {
        if !self.agents.delete(extension).await? {
            return Err(AppError::AgentNotFound(extension.to_string()));
        }
        self.invalidate(extension).await;
        Ok(())
    }

    /// Create or rename a mapping from the PBX extension list
    pub async fn sync_from_pbx(&self, extension: &str, agent_name: &str) -> AppResult<Agent> {
        self.agents.upsert_from_pbx(extension, agent_name).await
    }
}
