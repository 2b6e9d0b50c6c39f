//! Session types and the identity client seam.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::IdentityError;

/// Default broadcast channel capacity for auth events.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Opaque, stable identity id issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IdentityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for IdentityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A verified identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity_id: IdentityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Session {
    pub fn new(identity_id: impl Into<IdentityId>, email: Option<&str>) -> Self {
        Self {
            identity_id: identity_id.into(),
            email: email.map(str::to_string),
        }
    }
}

/// Kinds of event the identity service emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// Raw event from the identity service, tagged with the identity it
/// concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub identity_id: IdentityId,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: AuthEventKind::SignedIn,
            identity_id: session.identity_id.clone(),
            session: Some(session),
        }
    }

    pub fn signed_out(identity_id: IdentityId) -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            identity_id,
            session: None,
        }
    }

    /// The session change this event represents, if the gate should care.
    ///
    /// Only sign-in and sign-out re-evaluate the gate.
    pub fn as_session_change(&self) -> Option<Option<Session>> {
        match self.kind {
            AuthEventKind::SignedIn => Some(self.session.clone()),
            AuthEventKind::SignedOut => Some(None),
            AuthEventKind::InitialSession
            | AuthEventKind::TokenRefreshed
            | AuthEventKind::UserUpdated
            | AuthEventKind::PasswordRecovery => None,
        }
    }
}

/// Fan-out of raw auth events to every subscriber.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Fine if nobody is listening.
    pub fn publish(&self, event: AuthEvent) {
        tracing::debug!(kind = ?event.kind, "Auth event");
        let _ = self.tx.send(event);
    }

    /// Stream of sign-in/sign-out changes for every identity on the bus.
    /// Other event kinds are dropped, and lagged receivers skip ahead rather
    /// than erroring.
    pub fn session_changes(&self) -> BoxStream<'static, Option<Session>> {
        self.session_changes_where(|_| true)
    }

    /// Like [`session_changes`](Self::session_changes), keeping only events
    /// `accept` lets through.
    pub fn session_changes_where<F>(&self, accept: F) -> BoxStream<'static, Option<Session>>
    where
        F: Fn(&AuthEvent) -> bool + Send + 'static,
    {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(move |event| {
                let change = match event {
                    Ok(event) if accept(&event) => event.as_session_change(),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!("Auth event subscriber lagged: {e}");
                        None
                    }
                };
                std::future::ready(change)
            })
            .boxed()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps the external identity service.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Ask the identity service who the caller is. `Ok(None)` means no
    /// session.
    async fn fetch_session(&self) -> Result<Option<Session>, IdentityError>;

    /// Sign-in and sign-out changes after subscription.
    fn session_changes(&self) -> BoxStream<'static, Option<Session>>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Current session, failing safe: errors resolve to `None`.
    async fn current_session(&self) -> Option<Session> {
        match self.fetch_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Session lookup failed, treating as signed out: {e}");
                None
            }
        }
    }
}

/// Builds an identity client for one caller's access token.
pub trait IdentityConnector: Send + Sync {
    fn connect(&self, access_token: Option<&str>) -> std::sync::Arc<dyn IdentityClient>;
}
