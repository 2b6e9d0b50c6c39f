//! Leaf screens — the onboarding forms' save contract.
//!
//! A confirm validates its input, writes its one field plus the next step,
//! and hands back the next canonical path. Screens never touch gate state;
//! the gate picks up the write on the following navigation.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::model::{CHURCHES, Church, ProfilePatch, ProfileRecord, WeeklyCap, find_church};
use super::state::OnboardingStep;
use crate::error::ScreenError;
use crate::identity::IdentityId;
use crate::store::ProfileStore;

/// Cap choices offered as one-tap presets.
pub const CAP_PRESETS: [&str; 5] = ["No limit", "$10", "$25", "$50", "$100"];

/// Where to go after a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenOutcome {
    pub next: &'static str,
}

/// What a screen shows when (re)visited.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum ScreenView {
    Church {
        churches: &'static [Church],
        selected: Option<String>,
    },
    Cap {
        presets: [&'static str; 5],
        current: Option<WeeklyCap>,
    },
    Bank {
        bank_connected: bool,
    },
}

/// The three onboarding forms, backed by the profile store.
pub struct LeafScreens {
    profiles: Arc<dyn ProfileStore>,
}

impl LeafScreens {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Pre-fill for a screen from the stored profile.
    pub async fn view(&self, identity_id: &IdentityId, step: OnboardingStep) -> Result<ScreenView, ScreenError> {
        let profile = self.load(identity_id).await?;
        Ok(match step {
            OnboardingStep::Church => ScreenView::Church {
                churches: CHURCHES,
                selected: profile.church_id,
            },
            OnboardingStep::Cap => ScreenView::Cap {
                presets: CAP_PRESETS,
                current: profile.weekly_cap,
            },
            OnboardingStep::Bank | OnboardingStep::Done => ScreenView::Bank {
                bank_connected: profile.bank_connected,
            },
        })
    }

    /// Church selection → giving cap.
    pub async fn select_church(&self, identity_id: &IdentityId, church_id: &str) -> Result<ScreenOutcome, ScreenError> {
        let church_id = church_id.trim();
        if church_id.is_empty() {
            return Err(ScreenError::Invalid("Please choose a church.".into()));
        }
        let church = find_church(church_id)
            .ok_or_else(|| ScreenError::Invalid(format!("Unknown church \"{church_id}\".")))?;

        self.save(
            identity_id,
            OnboardingStep::Church,
            ProfilePatch {
                church_id: Some(church.id.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    /// Weekly cap → bank.
    pub async fn set_giving_cap(&self, identity_id: &IdentityId, input: &str) -> Result<ScreenOutcome, ScreenError> {
        let cap = WeeklyCap::parse_input(input).map_err(ScreenError::Invalid)?;
        self.save(
            identity_id,
            OnboardingStep::Cap,
            ProfilePatch {
                weekly_cap: Some(cap),
                ..Default::default()
            },
        )
        .await
    }

    /// Bank connect or skip → done.
    pub async fn finish_bank(&self, identity_id: &IdentityId, bank_connected: bool) -> Result<ScreenOutcome, ScreenError> {
        self.save(
            identity_id,
            OnboardingStep::Bank,
            ProfilePatch {
                bank_connected: Some(bank_connected),
                ..Default::default()
            },
        )
        .await
    }

    async fn load(&self, identity_id: &IdentityId) -> Result<ProfileRecord, ScreenError> {
        match self.profiles.get_profile(identity_id).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(ScreenError::ProfileMissing),
            Err(e) => Err(ScreenError::SaveFailed(e)),
        }
    }

    /// Check the screen is reachable, then write `patch` plus the step after
    /// `screen`.
    async fn save(
        &self,
        identity_id: &IdentityId,
        screen: OnboardingStep,
        mut patch: ProfilePatch,
    ) -> Result<ScreenOutcome, ScreenError> {
        let profile = self.load(identity_id).await?;
        if profile.onboarding_step.rank() < screen.rank() {
            return Err(ScreenError::OutOfOrder {
                expected_path: profile.onboarding_step.landing_path(),
            });
        }

        patch.advance_to = screen.next();
        if let Err(e) = self.profiles.update_profile(identity_id, &patch).await {
            warn!(identity_id = %identity_id, screen = %screen, "Screen save failed: {e}");
            return Err(ScreenError::SaveFailed(e));
        }
        info!(identity_id = %identity_id, screen = %screen, "Screen saved");
        Ok(ScreenOutcome {
            next: screen.next_path(),
        })
    }
}
