//! Party model
//!
//! Customers and Leads are the contact records a call can be linked to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of contact record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyType {
    Customer,
    Lead,
}

impl PartyType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Some(PartyType::Customer),
            "lead" => Some(PartyType::Lead),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartyType::Customer => "customer",
            PartyType::Lead => "lead",
        }
    }

    /// Lookup precedence: Customers are preferred over Leads
    pub fn precedence(&self) -> u8 {
        match self {
            PartyType::Customer => 0,
            PartyType::Lead => 1,
        }
    }
}

impl fmt::Display for PartyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact record (Customer or Lead)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Party {
    pub id: i64,
    pub party_type: PartyType,
    pub name: String,
    pub phone: Option<String>,
    pub mobile_no: Option<String>,
    /// Normalized form of `phone`, used for matching
    pub phone_normalized: Option<String>,
    /// Normalized form of `mobile_no`, used for matching
    pub mobile_normalized: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Party {
    /// Whether either stored number satisfies `pred`
    pub fn any_number(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.mobile_normalized.as_deref().is_some_and(&pred)
            || self.phone_normalized.as_deref().is_some_and(&pred)
    }

    /// Reference stored on a call log
    pub fn as_link(&self) -> LinkedParty {
        LinkedParty {
            party_type: self.party_type,
            party_id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Data needed to create a party
#[derive(Debug, Clone)]
pub struct NewParty {
    pub party_type: PartyType,
    pub name: String,
    pub phone: Option<String>,
    pub mobile_no: Option<String>,
    pub phone_normalized: Option<String>,
    pub mobile_normalized: Option<String>,
}

impl NewParty {
    /// Lead created from an unknown caller
    pub fn lead_from_phone(phone_normalized: &str) -> Self {
        Self {
            party_type: PartyType::Lead,
            name: phone_normalized.to_string(),
            phone: None,
            mobile_no: Some(phone_normalized.to_string()),
            phone_normalized: None,
            mobile_normalized: Some(phone_normalized.to_string()),
        }
    }
}

/// Link from a call log to at most one party
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkedParty {
    pub party_type: PartyType,
    pub party_id: i64,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_type_parse() {
        assert_eq!(PartyType::parse("Customer"), Some(PartyType::Customer));
        assert_eq!(PartyType::parse(" lead "), Some(PartyType::Lead));
        assert_eq!(PartyType::parse("supplier"), None);
    }

    #[test]
    fn test_customer_precedes_lead() {
        assert!(PartyType::Customer.precedence() < PartyType::Lead.precedence());
    }

    #[test]
    fn test_lead_from_phone() {
        let lead = NewParty::lead_from_phone("+966555123456");
        assert_eq!(lead.party_type, PartyType::Lead);
        assert_eq!(lead.name, "+966555123456");
        assert_eq!(lead.mobile_normalized.as_deref(), Some("+966555123456"));
        assert_eq!(lead.phone_normalized, None);
    }

    #[test]
    fn test_any_number_checks_mobile_and_phone() {
        let party = Party {
            id: 1,
            party_type: PartyType::Customer,
            name: "Acme".to_string(),
            phone: Some("011 234 5678".to_string()),
            mobile_no: Some("055 512 3456".to_string()),
            phone_normalized: Some("+966112345678".to_string()),
            mobile_normalized: Some("+966555123456".to_string()),
            created_at: Utc::now(),
        };

        assert!(party.any_number(|p| p == "+966555123456"));
        assert!(party.any_number(|p| p == "+966112345678"));
        assert!(!party.any_number(|p| p == "+966500000000"));
    }
}
