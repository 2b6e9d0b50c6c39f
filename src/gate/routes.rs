//! REST endpoints that put the gate in front of a browser front end.
//!
//! Each request mounts a gate for the caller's bearer token, evaluates one
//! navigation, and drops it. The front end renders or redirects from the
//! returned verdict.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, warn};

use super::machine::{Gate, Navigation};
use crate::config::GateConfig;
use crate::identity::{IdentityClient, IdentityConnector, bearer_token};
use crate::onboarding::model::NewProfile;
use crate::store::ProfileStore;

/// Landing page after email verification.
const VERIFIED_ROUTE: &str = "/verified";
/// Sign-in page for callbacks without a session.
const SIGNIN_ROUTE: &str = "/signin";

/// Shared state for gate routes.
#[derive(Clone)]
pub struct GateRouteState {
    pub identity: Arc<dyn IdentityConnector>,
    pub profiles: Arc<dyn ProfileStore>,
    pub config: Arc<GateConfig>,
}

impl GateRouteState {
    fn identity_for(&self, headers: &HeaderMap) -> Arc<dyn IdentityClient> {
        self.identity.connect(bearer_token(headers))
    }

    fn gate_for(&self, headers: &HeaderMap) -> Arc<Gate> {
        Gate::new(
            self.identity_for(headers),
            Arc::clone(&self.profiles),
            Arc::clone(&self.config),
        )
    }
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: String,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "stewarding-gate"
    }))
}

/// GET /api/gate?path=/bank
///
/// Verdict for a protected route: state, decision and redirect location.
async fn check_route(
    State(state): State<GateRouteState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let gate = state.gate_for(&headers);
    let navigation = gate.navigate(&query.path).await;
    gate.unmount().await;
    match navigation {
        Navigation::Applied(verdict) => Json(verdict).into_response(),
        Navigation::Discarded => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": "Navigation superseded"})),
        )
            .into_response(),
    }
}

/// GET /api/public?path=/signin
///
/// Public-only guard: signed-in callers are told where to go instead.
async fn check_public(
    State(state): State<GateRouteState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let gate = state.gate_for(&headers);
    let decision = gate.check_public(&query.path).await;
    gate.unmount().await;
    Json(decision)
}

/// POST /api/auth/callback
///
/// After email verification: make sure the profile exists, then send the
/// caller to the verified landing page.
async fn auth_callback(State(state): State<GateRouteState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(session) = state.identity_for(&headers).current_session().await else {
        return Json(serde_json::json!({"next": SIGNIN_ROUTE}));
    };

    let defaults = NewProfile {
        email: session.email.clone(),
    };
    match state
        .profiles
        .create_profile_if_absent(&session.identity_id, &defaults)
        .await
    {
        Ok(profile) => info!(
            identity_id = %session.identity_id,
            step = %profile.onboarding_step,
            "Profile ready after verification"
        ),
        // The gate provisions again on first navigation.
        Err(e) => warn!(identity_id = %session.identity_id, "Profile upsert failed: {e}"),
    }
    Json(serde_json::json!({"next": VERIFIED_ROUTE}))
}

/// POST /api/session/sign-out
async fn sign_out(State(state): State<GateRouteState>, headers: HeaderMap) -> impl IntoResponse {
    match state.identity_for(&headers).sign_out().await {
        Ok(()) => Json(serde_json::json!({"next": state.config.landing_route})).into_response(),
        Err(e) => {
            warn!("Sign-out failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "Sign-out failed"})),
            )
                .into_response()
        }
    }
}

/// Build the gate REST routes.
pub fn gate_routes(state: GateRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/gate", get(check_route))
        .route("/api/public", get(check_public))
        .route("/api/auth/callback", post(auth_callback))
        .route("/api/session/sign-out", post(sign_out))
        .with_state(state)
}
