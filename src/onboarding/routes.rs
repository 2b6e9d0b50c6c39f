//! REST endpoints for the onboarding screens, profile and dashboard.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, error};

use super::dashboard::DashboardSummary;
use super::screens::LeafScreens;
use super::state::OnboardingStep;
use crate::error::ScreenError;
use crate::identity::{IdentityConnector, Session, bearer_token};
use crate::store::ProfileStore;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub screens: Arc<LeafScreens>,
    pub identity: Arc<dyn IdentityConnector>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl OnboardingRouteState {
    pub fn new(identity: Arc<dyn IdentityConnector>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            screens: Arc::new(LeafScreens::new(Arc::clone(&profiles))),
            identity,
            profiles,
        }
    }

    async fn session(&self, headers: &HeaderMap) -> Result<Session, Response> {
        self.identity
            .connect(bearer_token(headers))
            .current_session()
            .await
            .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Sign in to continue"))
    }
}

#[derive(Debug, Deserialize)]
struct ChurchForm {
    #[serde(default)]
    church_id: String,
}

#[derive(Debug, Deserialize)]
struct CapForm {
    #[serde(default)]
    cap: String,
}

#[derive(Debug, Deserialize)]
struct BankForm {
    connected: bool,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

impl IntoResponse for ScreenError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        if self.is_user_error() {
            debug!("Rejected onboarding input: {message}");
        }
        match self {
            ScreenError::Invalid(_) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &message),
            ScreenError::OutOfOrder { expected_path } => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({"error": message, "next": expected_path})),
            )
                .into_response(),
            ScreenError::ProfileMissing => error_response(StatusCode::NOT_FOUND, &message),
            ScreenError::SaveFailed(ref e) => {
                error!("Onboarding store error: {e}");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, &message)
            }
        }
    }
}

async fn view_step(state: &OnboardingRouteState, headers: &HeaderMap, step: OnboardingStep) -> Response {
    let session = match state.session(headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    match state.screens.view(&session.identity_id, step).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/onboarding/church
async fn view_church(State(state): State<OnboardingRouteState>, headers: HeaderMap) -> Response {
    view_step(&state, &headers, OnboardingStep::Church).await
}

/// GET /api/onboarding/cap
async fn view_cap(State(state): State<OnboardingRouteState>, headers: HeaderMap) -> Response {
    view_step(&state, &headers, OnboardingStep::Cap).await
}

/// GET /api/onboarding/bank
async fn view_bank(State(state): State<OnboardingRouteState>, headers: HeaderMap) -> Response {
    view_step(&state, &headers, OnboardingStep::Bank).await
}

/// POST /api/onboarding/church
///
/// Body: `{"church_id": "grace"}`. Returns `{"next": "/giving-cap"}`.
async fn select_church(
    State(state): State<OnboardingRouteState>,
    headers: HeaderMap,
    Json(form): Json<ChurchForm>,
) -> Response {
    let session = match state.session(&headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    match state.screens.select_church(&session.identity_id, &form.church_id).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/onboarding/cap
///
/// Body: `{"cap": "$25"}` or `{"cap": "No limit"}`.
async fn set_cap(
    State(state): State<OnboardingRouteState>,
    headers: HeaderMap,
    Json(form): Json<CapForm>,
) -> Response {
    let session = match state.session(&headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    match state.screens.set_giving_cap(&session.identity_id, &form.cap).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/onboarding/bank
///
/// Body: `{"connected": true}`; `false` skips linking.
async fn finish_bank(
    State(state): State<OnboardingRouteState>,
    headers: HeaderMap,
    Json(form): Json<BankForm>,
) -> Response {
    let session = match state.session(&headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    match state.screens.finish_bank(&session.identity_id, form.connected).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/profile
///
/// Returns the caller's profile, or 404 if none exists yet.
async fn get_profile(State(state): State<OnboardingRouteState>, headers: HeaderMap) -> Response {
    let session = match state.session(&headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    match state.profiles.get_profile(&session.identity_id).await {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "No profile exists yet"),
        Err(e) => {
            error!(identity_id = %session.identity_id, "Profile read failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load profile")
        }
    }
}

/// GET /api/dashboard
async fn get_dashboard(State(state): State<OnboardingRouteState>, headers: HeaderMap) -> Response {
    let session = match state.session(&headers).await {
        Ok(session) => session,
        Err(resp) => return resp,
    };
    match state.profiles.get_profile(&session.identity_id).await {
        Ok(Some(profile)) => {
            Json(DashboardSummary::from_profile(&profile, session.email.as_deref())).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "No profile exists yet"),
        Err(e) => {
            error!(identity_id = %session.identity_id, "Dashboard read failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load dashboard")
        }
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/church", get(view_church).post(select_church))
        .route("/api/onboarding/cap", get(view_cap).post(set_cap))
        .route("/api/onboarding/bank", get(view_bank).post(finish_bank))
        .route("/api/profile", get(get_profile))
        .route("/api/dashboard", get(get_dashboard))
        .with_state(state)
}
