//! HTTP identity client — talks to a GoTrue-style auth API
//! (`/auth/v1/user`, `/auth/v1/logout`).

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::session::{AuthEvent, IdentityClient, IdentityConnector, IdentityId, Session, SessionEvents};
use crate::error::IdentityError;

/// Per-request timeout against the identity service.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shape of `GET /auth/v1/user`.
#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Shared connection settings for the identity service.
#[derive(Clone)]
pub struct HttpIdentityService {
    client: reqwest::Client,
    base_url: String,
    api_key: Arc<SecretString>,
    events: SessionEvents,
}

impl HttpIdentityService {
    pub fn new(base_url: &str, api_key: SecretString) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IdentityError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: Arc::new(api_key),
            events: SessionEvents::new(),
        })
    }
}

impl IdentityConnector for HttpIdentityService {
    fn connect(&self, access_token: Option<&str>) -> Arc<dyn IdentityClient> {
        Arc::new(HttpIdentityClient {
            service: self.clone(),
            access_token: access_token.map(|t| SecretString::from(t.to_string())),
            identity: Arc::new(RwLock::new(None)),
        })
    }
}

/// Identity client bound to one access token.
///
/// The event bus is shared by every caller of the service, so session
/// changes are filtered down to the identity this token resolved to.
pub struct HttpIdentityClient {
    service: HttpIdentityService,
    access_token: Option<SecretString>,
    identity: Arc<RwLock<Option<IdentityId>>>,
}

impl HttpIdentityClient {
    fn known_identity(&self) -> Option<IdentityId> {
        self.identity.read().ok().and_then(|id| id.clone())
    }

    fn remember(&self, identity_id: &IdentityId) {
        if let Ok(mut id) = self.identity.write() {
            *id = Some(identity_id.clone());
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.service.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder, token: &SecretString) -> reqwest::RequestBuilder {
        builder
            .header("apikey", self.service.api_key.expose_secret())
            .bearer_auth(token.expose_secret())
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn fetch_session(&self) -> Result<Option<Session>, IdentityError> {
        let Some(ref token) = self.access_token else {
            return Ok(None);
        };

        let resp = self
            .authorized(self.service.client.get(self.url("user")), token)
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => {
                let user: UserResponse = resp
                    .json()
                    .await
                    .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
                if user.id.is_empty() {
                    return Err(IdentityError::InvalidResponse("empty user id".into()));
                }
                let session = Session::new(user.id, user.email.as_deref());
                self.remember(&session.identity_id);
                Ok(Some(session))
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(IdentityError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    fn session_changes(&self) -> BoxStream<'static, Option<Session>> {
        let identity = Arc::clone(&self.identity);
        self.service.events.session_changes_where(move |event| {
            identity
                .read()
                .ok()
                .is_some_and(|id| (*id).as_ref() == Some(&event.identity_id))
        })
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let Some(ref token) = self.access_token else {
            return Ok(());
        };
        let identity = match self.known_identity() {
            Some(id) => Some(id),
            None => self.fetch_session().await.ok().flatten().map(|s| s.identity_id),
        };

        let resp = self
            .authorized(self.service.client.post(self.url("logout")), token)
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;

        // An already-expired token is as signed out as it gets.
        let status = resp.status();
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if let Some(identity_id) = identity {
            self.service.events.publish(AuthEvent::signed_out(identity_id));
        }
        Ok(())
    }
}

/// Pull the access token out of an `Authorization: Bearer …` header.
pub fn bearer_token(headers: &reqwest::header::HeaderMap) -> Option<&str> {
    headers
        .get(reqwest::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    use super::*;

    async fn fake_auth_server() -> String {
        async fn user(headers: HeaderMap) -> axum::response::Response {
            use axum::response::IntoResponse;
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            match auth {
                "Bearer good" => Json(serde_json::json!({"id": "u-1", "email": "pat@example.com"}))
                    .into_response(),
                "Bearer other" => Json(serde_json::json!({"id": "u-2"})).into_response(),
                "Bearer broken" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                _ => StatusCode::UNAUTHORIZED.into_response(),
            }
        }

        let app = Router::new()
            .route("/auth/v1/user", get(user))
            .route("/auth/v1/logout", post(|| async { StatusCode::NO_CONTENT }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{port}/")
    }

    #[tokio::test]
    async fn resolves_session_from_bearer_token() {
        let base = fake_auth_server().await;
        let service = HttpIdentityService::new(&base, SecretString::from("anon")).unwrap();

        let session = service.connect(Some("good")).current_session().await.unwrap();
        assert_eq!(session.identity_id.as_str(), "u-1");
        assert_eq!(session.email.as_deref(), Some("pat@example.com"));

        assert!(service.connect(Some("expired")).current_session().await.is_none());
        assert!(service.connect(None).current_session().await.is_none());
    }

    #[tokio::test]
    async fn service_errors_fail_safe_to_absent() {
        let base = fake_auth_server().await;
        let service = HttpIdentityService::new(&base, SecretString::from("anon")).unwrap();
        let client = service.connect(Some("broken"));

        assert!(matches!(
            client.fetch_session().await,
            Err(IdentityError::Status { status: 500, .. })
        ));
        assert!(client.current_session().await.is_none());
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn sign_out_publishes_event() {
        use futures::StreamExt;

        let base = fake_auth_server().await;
        let service = HttpIdentityService::new(&base, SecretString::from("anon")).unwrap();
        let client = service.connect(Some("good"));
        let mut changes = client.session_changes();

        client.sign_out().await.unwrap();
        let change = tokio::time::timeout(Duration::from_secs(1), changes.next())
            .await
            .unwrap();
        assert_eq!(change, Some(None));
    }

    #[tokio::test]
    async fn sign_out_is_not_seen_by_other_callers() {
        use futures::StreamExt;

        let base = fake_auth_server().await;
        let service = HttpIdentityService::new(&base, SecretString::from("anon")).unwrap();
        let pat = service.connect(Some("good"));
        let other = service.connect(Some("other"));
        assert!(pat.current_session().await.is_some());
        assert!(other.current_session().await.is_some());

        let mut pat_changes = pat.session_changes();
        let mut other_changes = other.session_changes();
        pat.sign_out().await.unwrap();

        let change = tokio::time::timeout(Duration::from_secs(1), pat_changes.next())
            .await
            .unwrap();
        assert_eq!(change, Some(None));
        assert!(
            tokio::time::timeout(Duration::from_millis(100), other_changes.next())
                .await
                .is_err(),
            "another caller's sign-out must not reach this client"
        );
    }
}
