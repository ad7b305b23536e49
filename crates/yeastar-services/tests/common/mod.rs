//! Shared wiring for service tests

#![allow(dead_code)]

use std::sync::Arc;
use yeastar_cache::MemoryCache;
use yeastar_core::{config::LinkingConfig, PhoneNormalizer};
use yeastar_db::memory::{MemoryAgentRepository, MemoryCallLogRepository, MemoryPartyRepository};
use yeastar_pbx::EventNormalizer;
use yeastar_services::{EntityLinker, ExtensionMapper, WebhookProcessor};

pub struct Harness {
    pub processor: Arc<WebhookProcessor>,
    pub mapper: Arc<ExtensionMapper>,
    pub call_logs: Arc<MemoryCallLogRepository>,
    pub parties: Arc<MemoryPartyRepository>,
    pub agents: Arc<MemoryAgentRepository>,
}

pub fn harness() -> Harness {
    harness_with(LinkingConfig::default())
}

pub fn harness_with(linking: LinkingConfig) -> Harness {
    let call_logs = Arc::new(MemoryCallLogRepository::new());
    let parties = Arc::new(MemoryPartyRepository::new());
    let agents = Arc::new(MemoryAgentRepository::new());

    let mapper = Arc::new(ExtensionMapper::new(
        agents.clone(),
        Some(Arc::new(MemoryCache::new())),
        300,
    ));
    let normalizer = EventNormalizer::new(PhoneNormalizer::from_config(&linking), chrono_tz::UTC);
    let linker = EntityLinker::new(parties.clone(), &linking);

    let processor = Arc::new(WebhookProcessor::new(
        normalizer,
        call_logs.clone(),
        mapper.clone(),
        linker,
    ));

    Harness {
        processor,
        mapper,
        call_logs,
        parties,
        agents,
    }
}
