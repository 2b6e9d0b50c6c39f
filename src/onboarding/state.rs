//! Onboarding step model — the progress enum and the canonical route table.

use serde::{Deserialize, Serialize};

/// Route that owns the church selection step.
pub const CHURCH_ROUTE: &str = "/church-select";
/// Route that owns the weekly giving cap step.
pub const CAP_ROUTE: &str = "/giving-cap";
/// Route that owns the bank step.
pub const BANK_ROUTE: &str = "/bank";
/// Where a completed identity lands.
pub const DASHBOARD_ROUTE: &str = "/dashboard";

const ONBOARDING_ROUTES: [&str; 3] = [CHURCH_ROUTE, CAP_ROUTE, BANK_ROUTE];

/// How far an identity has progressed through setup.
///
/// Progresses linearly: Church → Cap → Bank → Done. Once `Done`, never
/// moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Church,
    Cap,
    Bank,
    Done,
}

impl OnboardingStep {
    /// Parse a stored step value. Unknown values restart at `Church`.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim() {
            "church" => Self::Church,
            "cap" => Self::Cap,
            "bank" => Self::Bank,
            "done" | "complete" => Self::Done,
            other => {
                tracing::warn!(step = other, "Unrecognized onboarding step, restarting at church");
                Self::Church
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Church => "church",
            Self::Cap => "cap",
            Self::Bank => "bank",
            Self::Done => "done",
        }
    }

    /// Position in the sequence. Used for advance-only writes.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Church => 0,
            Self::Cap => 1,
            Self::Bank => 2,
            Self::Done => 3,
        }
    }

    /// Whether onboarding is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Next step in the linear progression, if any.
    pub fn next(&self) -> Option<OnboardingStep> {
        match self {
            Self::Church => Some(Self::Cap),
            Self::Cap => Some(Self::Bank),
            Self::Bank => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// The later of two steps.
    pub fn furthest(self, other: OnboardingStep) -> OnboardingStep {
        if other.rank() > self.rank() { other } else { self }
    }

    /// Canonical route for this step. `Done` has no enforced route.
    pub fn route(&self) -> Option<&'static str> {
        route_for(*self)
    }

    /// Where to send an identity whose stored step is `self`.
    pub fn landing_path(&self) -> &'static str {
        self.route().unwrap_or(DASHBOARD_ROUTE)
    }

    /// Where a leaf screen for `self` navigates after a successful save.
    pub fn next_path(&self) -> &'static str {
        self.next().unwrap_or(Self::Done).landing_path()
    }
}

impl Default for OnboardingStep {
    fn default() -> Self {
        Self::Church
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical route for a step.
pub fn route_for(step: OnboardingStep) -> Option<&'static str> {
    match step {
        OnboardingStep::Church => Some(CHURCH_ROUTE),
        OnboardingStep::Cap => Some(CAP_ROUTE),
        OnboardingStep::Bank => Some(BANK_ROUTE),
        OnboardingStep::Done => None,
    }
}

/// Whether `path` is one of the onboarding screens.
pub fn is_onboarding_route(path: &str) -> bool {
    let path = normalize_path(path);
    ONBOARDING_ROUTES.contains(&path)
}

/// Strip query, fragment and trailing slashes so `/bank/?x=1` compares
/// equal to `/bank`.
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}
