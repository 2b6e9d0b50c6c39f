//! Profile record and onboarding data models.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identity::IdentityId;

use super::state::OnboardingStep;

/// Stored value for the "no limit" weekly cap.
const NO_LIMIT: &str = "no_limit";

static CAP_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$?\s*(\d{1,7}(?:\.\d{1,2})?)$").expect("valid cap regex")
});

/// Weekly ceiling on automated giving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum WeeklyCap {
    NoLimit,
    Amount(Decimal),
}

impl WeeklyCap {
    /// Parse free-form input such as `No limit`, `$25` or `15.50`.
    pub fn parse_input(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("Choose a weekly cap or enter your own.".to_string());
        }
        if trimmed.eq_ignore_ascii_case("no limit") || trimmed == NO_LIMIT {
            return Ok(Self::NoLimit);
        }
        let caps = CAP_AMOUNT
            .captures(trimmed)
            .ok_or_else(|| format!("\"{trimmed}\" isn't a dollar amount."))?;
        let amount: Decimal = caps[1]
            .parse()
            .map_err(|_| format!("\"{trimmed}\" isn't a dollar amount."))?;
        if amount <= Decimal::ZERO {
            return Err("A weekly cap must be more than $0.".to_string());
        }
        Ok(Self::Amount(amount.normalize()))
    }

    /// Column encoding.
    pub fn to_db(&self) -> String {
        match self {
            Self::NoLimit => NO_LIMIT.to_string(),
            Self::Amount(amount) => amount.to_string(),
        }
    }

    /// Decode a column value. Unparseable values read as unset.
    pub fn from_db(raw: &str) -> Option<Self> {
        if raw == NO_LIMIT {
            return Some(Self::NoLimit);
        }
        raw.parse::<Decimal>().ok().map(Self::Amount)
    }

    /// Human label used on the dashboard.
    pub fn label(&self) -> String {
        match self {
            Self::NoLimit => "No limit".to_string(),
            Self::Amount(amount) => format!("${} per week", amount.normalize()),
        }
    }
}

/// The single persisted row tracking one identity's onboarding progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRecord {
    pub identity_id: IdentityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub onboarding_step: OnboardingStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub church_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly_cap: Option<WeeklyCap>,
    pub bank_connected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRecord {
    /// A freshly provisioned profile at the first step.
    pub fn new(identity_id: IdentityId, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            identity_id,
            email,
            onboarding_step: OnboardingStep::Church,
            church_id: None,
            weekly_cap: None,
            bank_connected: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Values used when provisioning a missing profile.
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub email: Option<String>,
}

/// Field-level update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePatch {
    /// Advance-only: ignored when the stored step is already at or past it.
    pub advance_to: Option<OnboardingStep>,
    pub church_id: Option<String>,
    pub weekly_cap: Option<WeeklyCap>,
    pub bank_connected: Option<bool>,
}


/// A church that can be chosen during onboarding.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Church {
    pub id: &'static str,
    pub name: &'static str,
    pub mission: &'static str,
    pub goal: &'static str,
    pub cadence: &'static str,
}

/// Churches currently accepting donors.
pub static CHURCHES: &[Church] = &[
    Church {
        id: "countryside",
        name: "Countryside Christian Church",
        mission: "Helping Hands Foundation",
        goal: "120 families",
        cadence: "Weekly",
    },
    Church {
        id: "grace",
        name: "Grace Community Church",
        mission: "Local Food Relief",
        goal: "90 families",
        cadence: "Weekly",
    },
];

/// Look up a church by id.
pub fn find_church(id: &str) -> Option<&'static Church> {
    CHURCHES.iter().find(|c| c.id == id)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn cap_presets_parse() {
        assert_eq!(WeeklyCap::parse_input("No limit"), Ok(WeeklyCap::NoLimit));
        assert_eq!(WeeklyCap::parse_input("no LIMIT"), Ok(WeeklyCap::NoLimit));
        assert_eq!(WeeklyCap::parse_input("$25"), Ok(WeeklyCap::Amount(dec!(25))));
        assert_eq!(WeeklyCap::parse_input(" 15.50 "), Ok(WeeklyCap::Amount(dec!(15.5))));
        assert_eq!(WeeklyCap::parse_input("$ 100"), Ok(WeeklyCap::Amount(dec!(100))));
    }

    #[test]
    fn cap_rejects_bad_input() {
        assert!(WeeklyCap::parse_input("").is_err());
        assert!(WeeklyCap::parse_input("   ").is_err());
        assert!(WeeklyCap::parse_input("$0").is_err());
        assert!(WeeklyCap::parse_input("-5").is_err());
        assert!(WeeklyCap::parse_input("lots").is_err());
        assert!(WeeklyCap::parse_input("$1.234").is_err());
    }

    #[test]
    fn cap_db_encoding() {
        assert_eq!(WeeklyCap::NoLimit.to_db(), "no_limit");
        assert_eq!(WeeklyCap::from_db("no_limit"), Some(WeeklyCap::NoLimit));
        assert_eq!(WeeklyCap::from_db("25"), Some(WeeklyCap::Amount(dec!(25))));
        assert_eq!(WeeklyCap::from_db("garbage"), None);
    }

    #[test]
    fn cap_labels() {
        assert_eq!(WeeklyCap::NoLimit.label(), "No limit");
        assert_eq!(WeeklyCap::Amount(dec!(25.00)).label(), "$25 per week");
        assert_eq!(WeeklyCap::Amount(dec!(12.5)).label(), "$12.5 per week");
    }

    #[test]
    fn church_catalog_lookup() {
        assert_eq!(find_church("grace").map(|c| c.name), Some("Grace Community Church"));
        assert!(find_church("unknown").is_none());
    }

    #[test]
    fn profile_serde_roundtrip_keeps_cap() {
        let mut record = ProfileRecord::new(IdentityId::from("u1"), Some("a@b.co".into()));
        record.weekly_cap = Some(WeeklyCap::Amount(dec!(50)));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["onboarding_step"], "church");
        assert_eq!(json["weekly_cap"]["kind"], "amount");
        let parsed: ProfileRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }
}
