//! The gate — the authorization state machine guarding protected routes.
//!
//! For each navigation the gate resolves the session, re-reads (or
//! provisions) the profile, and compares the requested route with the
//! route the onboarding step demands. Leaf screens write the profile
//! directly and then navigate, so the gate never trusts a profile read
//! issued for an earlier navigation.

pub mod machine;
pub mod resolution;
pub mod routes;
pub mod state;

pub use machine::{Gate, Navigation};
pub use resolution::{GateResolution, Resolution};
pub use routes::{GateRouteState, gate_routes};
pub use state::{Decision, GateState, Verdict, decide_public, evaluate};
