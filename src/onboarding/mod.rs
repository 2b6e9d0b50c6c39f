//! Onboarding — the church → cap → bank walk-through every new donor
//! completes before reaching the dashboard.
//!
//! The step model lives in `state`, the persisted record in `model`, and the
//! three form screens in `screens`. The gate decides *where* a donor may be;
//! the screens decide what a confirm writes.

pub mod dashboard;
pub mod model;
pub mod routes;
pub mod screens;
pub mod state;

pub use dashboard::DashboardSummary;
pub use model::{Church, NewProfile, ProfilePatch, ProfileRecord, WeeklyCap};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use screens::{LeafScreens, ScreenOutcome, ScreenView};
pub use state::OnboardingStep;
