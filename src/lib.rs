//! Stewarding Gate — onboarding-aware route authorization for the donor app.

pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod onboarding;
pub mod store;
