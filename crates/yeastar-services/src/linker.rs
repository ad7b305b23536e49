//! Entity linker
//!
//! Finds the Customer or Lead a call belongs to. The number used depends on
//! the direction: the callee for outbound calls, the caller otherwise, and
//! nothing for internal calls.

use std::sync::Arc;
use tracing::{debug, info, instrument};
use yeastar_core::{
    config::LinkingConfig,
    models::{CallUpdate, LinkedParty, NewParty},
    phone::digit_suffix,
    traits::PartyRepository,
    AppResult,
};

pub struct EntityLinker {
    parties: Arc<dyn PartyRepository>,
    suffix_match_digits: usize,
    create_lead_if_not_found: bool,
}

impl EntityLinker {
    pub fn new(parties: Arc<dyn PartyRepository>, config: &LinkingConfig) -> Self {
        Self {
            parties,
            suffix_match_digits: config.suffix_match_digits,
            create_lead_if_not_found: config.create_lead_if_not_found,
        }
    }

    /// Party for this update, if any
    ///
    /// Zero matches is not an error; the call is stored unlinked.
    #[instrument(skip(self, update), fields(call_id = %update.call_id))]
    pub async fn link(&self, update: &CallUpdate) -> AppResult<Option<LinkedParty>> {
        let Some(number) = update.party_number() else {
            return Ok(None);
        };

        if let Some(party) = self.parties.find_by_phone(number).await? {
            debug!("Matched {} {} by number", party.party_type, party.id);
            return Ok(Some(party.as_link()));
        }

        if let Some(suffix) = digit_suffix(number, self.suffix_match_digits) {
            if let Some(party) = self.parties.find_by_phone_suffix(suffix).await? {
                debug!("Matched {} {} by trailing digits", party.party_type, party.id);
                return Ok(Some(party.as_link()));
            }
        }

        if self.create_lead_if_not_found {
            let lead = self.parties.create(&NewParty::lead_from_phone(number)).await?;
            info!("Created lead {} for unknown number {}", lead.id, number);
            return Ok(Some(lead.as_link()));
        }

        debug!("No party matches {}", number);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use yeastar_core::models::{CallDirection, CallStatus, PartyType};
    use yeastar_db::memory::MemoryPartyRepository;

    fn customer(phone: &str) -> NewParty {
        NewParty {
            party_type: PartyType::Customer,
            name: "Acme Trading".to_string(),
            phone: Some(phone.to_string()),
            mobile_no: None,
            phone_normalized: Some(phone.to_string()),
            mobile_normalized: None,
        }
    }

    fn inbound_from(number: &str) -> CallUpdate {
        let mut update = CallUpdate::new("c1", CallStatus::Ringing, json!({}));
        update.direction = CallDirection::Inbound;
        update.caller_normalized = Some(number.to_string());
        update
    }

    #[tokio::test]
    async fn test_single_customer_match() {
        let parties = Arc::new(MemoryPartyRepository::new());
        let acme = parties.insert(customer("+966555123456"), Utc::now());
        let linker = EntityLinker::new(parties, &LinkingConfig::default());

        let link = linker.link(&inbound_from("+966555123456")).await.unwrap();
        assert_eq!(link, Some(acme.as_link()));
    }

    #[tokio::test]
    async fn test_no_match_is_unlinked() {
        let parties = Arc::new(MemoryPartyRepository::new());
        let linker = EntityLinker::new(parties.clone(), &LinkingConfig::default());

        assert_eq!(linker.link(&inbound_from("+966500000000")).await.unwrap(), None);
        assert!(parties.all().is_empty());
    }

    #[tokio::test]
    async fn test_outbound_uses_callee_and_internal_skips() {
        let parties = Arc::new(MemoryPartyRepository::new());
        parties.insert(customer("+966555000222"), Utc::now());
        let linker = EntityLinker::new(parties, &LinkingConfig::default());

        let mut update = inbound_from("+966555000111");
        update.callee_normalized = Some("+966555000222".to_string());
        assert_eq!(linker.link(&update).await.unwrap(), None);

        update.direction = CallDirection::Outbound;
        assert!(linker.link(&update).await.unwrap().is_some());

        update.direction = CallDirection::Internal;
        assert_eq!(linker.link(&update).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oldest_of_same_type_wins() {
        let parties = Arc::new(MemoryPartyRepository::new());
        let now = Utc::now();
        parties.insert(customer("+966555123456"), now);
        let older = parties.insert(customer("+966555123456"), now - Duration::days(30));
        let linker = EntityLinker::new(parties, &LinkingConfig::default());

        let link = linker.link(&inbound_from("+966555123456")).await.unwrap().unwrap();
        assert_eq!(link.party_id, older.id);
    }

    #[tokio::test]
    async fn test_suffix_match_when_enabled() {
        let parties = Arc::new(MemoryPartyRepository::new());
        parties.insert(customer("+966555123456"), Utc::now());

        let strict = EntityLinker::new(parties.clone(), &LinkingConfig::default());
        assert_eq!(strict.link(&inbound_from("+1555123456")).await.unwrap(), None);

        let config = LinkingConfig {
            suffix_match_digits: 8,
            ..LinkingConfig::default()
        };
        let fuzzy = EntityLinker::new(parties, &config);
        assert!(fuzzy.link(&inbound_from("+1555123456")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_lead_if_not_found() {
        let parties = Arc::new(MemoryPartyRepository::new());
        let config = LinkingConfig {
            create_lead_if_not_found: true,
            ..LinkingConfig::default()
        };
        let linker = EntityLinker::new(parties.clone(), &config);

        let link = linker.link(&inbound_from("+966500000001")).await.unwrap().unwrap();
        assert_eq!(link.party_type, PartyType::Lead);
        assert_eq!(link.name, "+966500000001");
        assert_eq!(parties.all().len(), 1);
    }
}
