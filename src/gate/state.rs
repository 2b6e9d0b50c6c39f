//! Gate states and the pure decision rules.
//!
//! Everything here is synchronous and side-effect free; the async machine
//! in `machine.rs` only feeds resolutions in and reads decisions out.

use serde::Serialize;

use crate::config::GateConfig;
use crate::onboarding::state::{
    CHURCH_ROUTE, OnboardingStep, is_onboarding_route, normalize_path, route_for,
};

use super::resolution::{GateResolution, Resolution};

/// Collapsed gate state for one (resolution, route) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum GateState {
    /// Session or profile still in flight. No decision is made.
    Loading,
    Unauthenticated,
    BypassAllowed,
    /// Profile could not be read or provisioned.
    ProfileMissing,
    StepEnforced(OnboardingStep),
    Complete,
}

/// What the host should do with the requested route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "location", rename_all = "snake_case")]
pub enum Decision {
    /// Show a neutral placeholder.
    Wait,
    Render,
    Redirect(String),
}

impl Decision {
    fn redirect(to: &str) -> Self {
        Self::Redirect(to.to_string())
    }
}

/// A state and the decision it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub route: String,
    #[serde(flatten)]
    pub state: GateState,
    #[serde(flatten)]
    pub decision: Decision,
}

impl Verdict {
    pub fn for_route(route: &str, resolution: &GateResolution, config: &GateConfig) -> Self {
        let route = normalize_path(route);
        let state = evaluate(resolution, route, config);
        Self {
            route: route.to_string(),
            state,
            decision: state.decide(route, config),
        }
    }
}

/// Collapse both axes into a state for `route`.
pub fn evaluate(resolution: &GateResolution, route: &str, config: &GateConfig) -> GateState {
    match &resolution.session {
        Resolution::Unresolved => GateState::Loading,
        Resolution::Absent => GateState::Unauthenticated,
        Resolution::Present(_) => {
            if config.is_bypass(route) {
                return GateState::BypassAllowed;
            }
            match &resolution.profile {
                Resolution::Unresolved => GateState::Loading,
                Resolution::Absent => GateState::ProfileMissing,
                Resolution::Present(profile) => match profile.onboarding_step {
                    OnboardingStep::Done => GateState::Complete,
                    step => GateState::StepEnforced(step),
                },
            }
        }
    }
}

impl GateState {
    /// The transition this state takes for `route`.
    pub fn decide(&self, route: &str, config: &GateConfig) -> Decision {
        let route = normalize_path(route);
        match self {
            Self::Loading => Decision::Wait,
            Self::Unauthenticated => Decision::redirect(&config.landing_route),
            Self::BypassAllowed | Self::Complete => Decision::Render,
            Self::ProfileMissing => {
                if route == CHURCH_ROUTE {
                    Decision::Render
                } else {
                    Decision::redirect(CHURCH_ROUTE)
                }
            }
            Self::StepEnforced(step) => match route_for(*step) {
                Some(canonical) if route != canonical && !is_onboarding_route(route) => {
                    Decision::redirect(canonical)
                }
                _ => Decision::Render,
            },
        }
    }
}

/// Public-only pages: anonymous visitors render, signed-in identities are
/// sent to wherever they belong.
pub fn decide_public(resolution: &GateResolution, config: &GateConfig) -> Decision {
    match (&resolution.session, &resolution.profile) {
        (Resolution::Unresolved, _) => Decision::Wait,
        (Resolution::Absent, _) => Decision::Render,
        (Resolution::Present(_), Resolution::Unresolved) => Decision::Wait,
        (Resolution::Present(_), Resolution::Absent) => Decision::redirect(CHURCH_ROUTE),
        (Resolution::Present(_), Resolution::Present(profile)) => match profile.onboarding_step.route() {
            Some(route) => Decision::redirect(route),
            None => Decision::redirect(&config.complete_route),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityId, Session};
    use crate::onboarding::model::ProfileRecord;

    const ROUTES: [&str; 8] = [
        "/church-select",
        "/giving-cap",
        "/bank",
        "/dashboard",
        "/settings",
        "/verified",
        "/bank/",
        "/dashboard?tab=impact",
    ];

    fn signed_in(step: Option<OnboardingStep>) -> GateResolution {
        let session = Session::new("u1", Some("pat@example.com"));
        let profile = match step {
            Some(step) => {
                let mut p = ProfileRecord::new(IdentityId::from("u1"), None);
                p.onboarding_step = step;
                Resolution::Present(p)
            }
            None => Resolution::Absent,
        };
        GateResolution {
            session: Resolution::Present(session),
            profile,
        }
    }

    #[test]
    fn unresolved_session_waits() {
        let cfg = GateConfig::default();
        let res = GateResolution::default();
        for route in ROUTES {
            let verdict = Verdict::for_route(route, &res, &cfg);
            assert_eq!(verdict.state, GateState::Loading);
            assert_eq!(verdict.decision, Decision::Wait);
        }
    }

    #[test]
    fn unresolved_profile_waits_outside_bypass() {
        let cfg = GateConfig::default();
        let mut res = signed_in(None);
        res.profile = Resolution::Unresolved;
        assert_eq!(evaluate(&res, "/bank", &cfg), GateState::Loading);
        assert_eq!(evaluate(&res, "/verified", &cfg), GateState::BypassAllowed);
    }

    #[test]
    fn no_session_always_redirects_to_landing() {
        let cfg = GateConfig::default();
        let res = GateResolution {
            session: Resolution::Absent,
            profile: Resolution::Unresolved,
        };
        for route in ROUTES {
            let verdict = Verdict::for_route(route, &res, &cfg);
            assert_eq!(verdict.state, GateState::Unauthenticated);
            assert_eq!(verdict.decision, Decision::Redirect("/".into()), "route {route}");
        }
    }

    #[test]
    fn step_enforcement_for_every_step_and_route() {
        let cfg = GateConfig::default();
        for step in [OnboardingStep::Church, OnboardingStep::Cap, OnboardingStep::Bank] {
            let res = signed_in(Some(step));
            let canonical = route_for(step).unwrap();
            for route in ROUTES {
                let verdict = Verdict::for_route(route, &res, &cfg);
                if cfg.is_bypass(route) {
                    assert_eq!(verdict.decision, Decision::Render);
                } else if normalize_path(route) == canonical || is_onboarding_route(route) {
                    assert_eq!(verdict.state, GateState::StepEnforced(step));
                    assert_eq!(verdict.decision, Decision::Render, "{step} at {route}");
                } else {
                    assert_eq!(
                        verdict.decision,
                        Decision::Redirect(canonical.to_string()),
                        "{step} at {route}"
                    );
                }
            }
        }
    }

    #[test]
    fn done_renders_everything() {
        let cfg = GateConfig::default();
        let res = signed_in(Some(OnboardingStep::Done));
        for route in ROUTES {
            let verdict = Verdict::for_route(route, &res, &cfg);
            assert!(
                matches!(verdict.state, GateState::Complete | GateState::BypassAllowed),
                "{route}"
            );
            assert_eq!(verdict.decision, Decision::Render);
        }
    }

    #[test]
    fn bank_step_may_revisit_giving_cap() {
        let cfg = GateConfig::default();
        let verdict = Verdict::for_route("/giving-cap", &signed_in(Some(OnboardingStep::Bank)), &cfg);
        assert_eq!(verdict.decision, Decision::Render);
    }

    #[test]
    fn profile_missing_restarts_onboarding_without_looping() {
        let cfg = GateConfig::default();
        let res = signed_in(None);
        assert_eq!(evaluate(&res, "/dashboard", &cfg), GateState::ProfileMissing);
        assert_eq!(
            GateState::ProfileMissing.decide("/dashboard", &cfg),
            Decision::Redirect("/church-select".into())
        );
        assert_eq!(GateState::ProfileMissing.decide("/church-select", &cfg), Decision::Render);
    }

    #[test]
    fn bypass_skips_step_enforcement() {
        let cfg = GateConfig::default();
        let verdict = Verdict::for_route("/verified", &signed_in(Some(OnboardingStep::Church)), &cfg);
        assert_eq!(verdict.state, GateState::BypassAllowed);
        assert_eq!(verdict.decision, Decision::Render);
    }

    #[test]
    fn public_pages_send_signed_in_users_onward() {
        let cfg = GateConfig::default();
        let anon = GateResolution {
            session: Resolution::Absent,
            profile: Resolution::Unresolved,
        };
        assert_eq!(decide_public(&anon, &cfg), Decision::Render);
        assert_eq!(decide_public(&GateResolution::default(), &cfg), Decision::Wait);
        assert_eq!(
            decide_public(&signed_in(Some(OnboardingStep::Cap)), &cfg),
            Decision::Redirect("/giving-cap".into())
        );
        assert_eq!(
            decide_public(&signed_in(Some(OnboardingStep::Done)), &cfg),
            Decision::Redirect("/dashboard".into())
        );
        assert_eq!(
            decide_public(&signed_in(None), &cfg),
            Decision::Redirect("/church-select".into())
        );
    }

    #[test]
    fn verdict_serializes_flat() {
        let cfg = GateConfig::default();
        let verdict = Verdict::for_route("/dashboard", &signed_in(Some(OnboardingStep::Cap)), &cfg);
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["route"], "/dashboard");
        assert_eq!(json["state"], "step_enforced");
        assert_eq!(json["step"], "cap");
        assert_eq!(json["decision"], "redirect");
        assert_eq!(json["location"], "/giving-cap");
    }
}
