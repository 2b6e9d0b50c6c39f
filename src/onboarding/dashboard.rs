//! Dashboard summary shown once onboarding is done.

use serde::Serialize;

use super::model::{ProfileRecord, find_church};

/// Read-only view of a completed profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub display_name: String,
    pub church_name: String,
    pub weekly_cap: String,
    pub bank_connected: bool,
    pub bank_status: &'static str,
}

impl DashboardSummary {
    pub fn from_profile(profile: &ProfileRecord, session_email: Option<&str>) -> Self {
        let church_name = profile
            .church_id
            .as_deref()
            .and_then(find_church)
            .map(|c| c.name.to_string())
            .unwrap_or_else(|| "Not selected".to_string());
        let weekly_cap = profile
            .weekly_cap
            .as_ref()
            .map(|cap| cap.label())
            .unwrap_or_else(|| "Not set".to_string());
        let email = profile.email.as_deref().or(session_email);

        Self {
            display_name: display_name(email),
            church_name,
            weekly_cap,
            bank_connected: profile.bank_connected,
            bank_status: if profile.bank_connected {
                "Connected"
            } else {
                "Not connected"
            },
        }
    }
}

/// "jane.doe42@example.com" → "Jane Doe".
pub fn display_name(email: Option<&str>) -> String {
    let local = email
        .and_then(|e| e.split('@').next())
        .unwrap_or_default();
    let words: Vec<String> = local
        .split(['.', '_', '-', '+'])
        .map(|w| w.chars().filter(|c| !c.is_ascii_digit()).collect::<String>())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        "Friend".to_string()
    } else {
        words.join(" ")
    }
}
