//! The gate — resolves session and profile for every navigation and turns
//! them into a render/redirect decision.
//!
//! Each navigation takes a fresh request token. Every await point is
//! followed by a token check, so a result that belongs to an older
//! navigation, an older session, or an unmounted gate is dropped instead of
//! applied.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::error::DatabaseError;
use crate::identity::{IdentityClient, IdentityId, Session};
use crate::onboarding::model::{NewProfile, ProfileRecord};
use crate::onboarding::state::normalize_path;
use crate::store::ProfileStore;

use super::resolution::{GateResolution, Resolution};
use super::state::{Decision, Verdict, decide_public};

/// Result of one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// The decision was computed from results issued for this navigation.
    Applied(Verdict),
    /// A newer navigation, a session change, or unmount overtook this one.
    Discarded,
}

impl Navigation {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Applied(verdict) => Some(verdict),
            Self::Discarded => None,
        }
    }
}

/// A profile read kept for reuse by the very next resolution.
#[derive(Debug, Clone)]
struct ProfileRead {
    identity_id: IdentityId,
    route: String,
    token: u64,
    at: Instant,
    profile: ProfileRecord,
}

#[derive(Debug)]
struct GateInner {
    token: u64,
    mounted: bool,
    route: Option<String>,
    resolution: GateResolution,
    /// Identity of the most recently resolved session.
    observed: Option<IdentityId>,
    /// Last profile seen at `Done` for `observed`. `Done` never regresses.
    completed: Option<ProfileRecord>,
    last_read: Option<ProfileRead>,
    watcher: Option<JoinHandle<()>>,
}

impl GateInner {
    fn is_current(&self, token: u64) -> bool {
        self.mounted && self.token == token
    }

    fn forget_identity(&mut self) {
        self.completed = None;
        self.last_read = None;
    }

    /// Record the session and drop caches that belonged to someone else.
    fn observe(&mut self, session: Resolution<Session>) {
        let identity = session.present().map(|s| s.identity_id.clone());
        if identity != self.observed {
            self.forget_identity();
            self.observed = identity;
        }
        self.resolution.session = session;
    }

    /// A profile that may stand in for a store read, if any.
    fn reusable_profile(
        &self,
        identity_id: &IdentityId,
        route: &str,
        token: u64,
        config: &GateConfig,
    ) -> Option<ProfileRecord> {
        if let Some(ref done) = self.completed {
            if &done.identity_id == identity_id {
                return Some(done.clone());
            }
        }
        let read = self.last_read.as_ref()?;
        let fresh = &read.identity_id == identity_id
            && read.route == route
            && read.token + 1 == token
            && read.at.elapsed() <= config.fresh_read_window;
        fresh.then(|| read.profile.clone())
    }
}

/// Authorization state machine for the protected region.
pub struct Gate {
    identity: Arc<dyn IdentityClient>,
    profiles: Arc<dyn ProfileStore>,
    config: Arc<GateConfig>,
    inner: Mutex<GateInner>,
    verdicts: watch::Sender<Option<Verdict>>,
}

impl Gate {
    /// Mount a gate. It starts in `Loading` with no route.
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        profiles: Arc<dyn ProfileStore>,
        config: Arc<GateConfig>,
    ) -> Arc<Self> {
        let (verdicts, _rx) = watch::channel(None);
        Arc::new(Self {
            identity,
            profiles,
            config,
            inner: Mutex::new(GateInner {
                token: 0,
                mounted: true,
                route: None,
                resolution: GateResolution::default(),
                observed: None,
                completed: None,
                last_read: None,
                watcher: None,
            }),
            verdicts,
        })
    }

    /// Latest applied verdict, including `Loading` while a navigation is in
    /// flight.
    pub fn subscribe(&self) -> watch::Receiver<Option<Verdict>> {
        self.verdicts.subscribe()
    }

    pub async fn is_mounted(&self) -> bool {
        self.inner.lock().await.mounted
    }

    /// Evaluate `route`. Re-enters `Loading`, resolves the session, then
    /// re-reads the profile unless a cached one is still trustworthy.
    pub async fn navigate(&self, route: &str) -> Navigation {
        let route = normalize_path(route).to_string();
        let token = {
            let mut inner = self.inner.lock().await;
            if !inner.mounted {
                return Navigation::Discarded;
            }
            inner.token += 1;
            inner.route = Some(route.clone());
            inner.resolution.reset();
            self.publish(&route, &inner.resolution);
            inner.token
        };
        debug!(token, route = %route, "Gate navigation");

        let session = Resolution::from(self.identity.current_session().await);
        let session = {
            let mut inner = self.inner.lock().await;
            if !inner.is_current(token) {
                debug!(token, route = %route, "Session result superseded");
                return Navigation::Discarded;
            }
            inner.observe(session);
            match inner.resolution.session.present().cloned() {
                Some(session) if !self.config.is_bypass(&route) => session,
                _ => return self.apply(&inner, token, &route),
            }
        };

        let cached = {
            let inner = self.inner.lock().await;
            inner.reusable_profile(&session.identity_id, &route, token, &self.config)
        };
        let reused = cached.is_some();
        let profile = match cached {
            Some(profile) => {
                debug!(token, route = %route, step = %profile.onboarding_step, "Reusing profile read");
                Resolution::Present(profile)
            }
            None => self.load_profile(&session).await,
        };

        let mut inner = self.inner.lock().await;
        if !inner.is_current(token) {
            debug!(token, route = %route, "Profile result superseded");
            return Navigation::Discarded;
        }
        if let Resolution::Present(ref profile) = profile {
            if profile.onboarding_step.is_terminal() {
                inner.completed = Some(profile.clone());
            }
            if !reused {
                inner.last_read = Some(ProfileRead {
                    identity_id: session.identity_id.clone(),
                    route: route.clone(),
                    token,
                    at: Instant::now(),
                    profile: profile.clone(),
                });
            }
        }
        inner.resolution.profile = profile;
        self.apply(&inner, token, &route)
    }

    /// Handle a sign-in or sign-out. Everything cached is dropped and the
    /// current route, if any, is evaluated again.
    pub async fn on_session_change(&self, session: Option<Session>) -> Option<Navigation> {
        let route = {
            let mut inner = self.inner.lock().await;
            if !inner.mounted {
                return Some(Navigation::Discarded);
            }
            inner.token += 1;
            inner.resolution.reset();
            inner.forget_identity();
            inner.observed = session.as_ref().map(|s| s.identity_id.clone());
            inner.route.clone()
        };
        info!(
            signed_in = session.is_some(),
            "Session changed, re-evaluating gate"
        );
        match route {
            Some(route) => Some(self.navigate(&route).await),
            None => None,
        }
    }

    /// Follow the identity client's sign-in/sign-out stream until unmount.
    pub async fn watch_session_changes(self: &Arc<Self>) {
        let gate = Arc::clone(self);
        let mut changes = self.identity.session_changes();
        let handle = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                if !gate.is_mounted().await {
                    break;
                }
                if let Some(Navigation::Applied(verdict)) = gate.on_session_change(change).await {
                    debug!(state = ?verdict.state, "Gate re-evaluated after session change");
                }
            }
        });

        let mut inner = self.inner.lock().await;
        if let Some(old) = inner.watcher.replace(handle) {
            old.abort();
        }
    }

    /// Tear the gate down. In-flight results are dropped from here on.
    pub async fn unmount(&self) {
        let mut inner = self.inner.lock().await;
        inner.mounted = false;
        inner.token += 1;
        if let Some(watcher) = inner.watcher.take() {
            watcher.abort();
        }
        debug!("Gate unmounted");
    }

    /// Public-only pages: anonymous visitors render, signed-in identities
    /// are sent to their current step (or the completion route).
    pub async fn check_public(&self, route: &str) -> Decision {
        let route = normalize_path(route);
        if !self.config.is_public_only(route) {
            return Decision::Render;
        }
        let mut resolution = GateResolution {
            session: Resolution::from(self.identity.current_session().await),
            profile: Resolution::Unresolved,
        };
        if let Some(session) = resolution.session.present().cloned() {
            resolution.profile = self.load_profile(&session).await;
        }
        decide_public(&resolution, &self.config)
    }

    /// Read the profile, provisioning it once if missing or unreadable.
    pub async fn load_profile(&self, session: &Session) -> Resolution<ProfileRecord> {
        let identity_id = &session.identity_id;
        let read = self
            .bounded("get_profile", self.config.profile_attempts, || {
                self.profiles.get_profile(identity_id)
            })
            .await;
        match read {
            Ok(Some(profile)) => return Resolution::Present(profile),
            Ok(None) => debug!(identity_id = %identity_id, "No profile yet, provisioning"),
            Err(e) => warn!(identity_id = %identity_id, "Profile read failed, attempting provision: {e}"),
        }

        let defaults = NewProfile {
            email: session.email.clone(),
        };
        match self
            .bounded("create_profile_if_absent", 1, || {
                self.profiles.create_profile_if_absent(identity_id, &defaults)
            })
            .await
        {
            Ok(profile) => Resolution::Present(profile),
            Err(e) => {
                warn!(identity_id = %identity_id, "Profile provisioning failed, restarting onboarding: {e}");
                Resolution::Absent
            }
        }
    }

    /// Run a store call under the configured timeout, retrying up to
    /// `attempts` times.
    async fn bounded<T, F, Fut>(
        &self,
        operation: &'static str,
        attempts: u32,
        mut call: F,
    ) -> Result<T, DatabaseError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DatabaseError>>,
    {
        let timeout = self.config.profile_timeout;
        let mut last = DatabaseError::Timeout { operation, timeout };
        for attempt in 1..=attempts.max(1) {
            match tokio::time::timeout(timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    warn!(operation, attempt, "Profile store call failed: {e}");
                    last = e;
                }
                Err(_) => {
                    warn!(operation, attempt, ?timeout, "Profile store call timed out");
                    last = DatabaseError::Timeout { operation, timeout };
                }
            }
        }
        Err(last)
    }

    fn apply(&self, inner: &GateInner, token: u64, route: &str) -> Navigation {
        let verdict = Verdict::for_route(route, &inner.resolution, &self.config);
        debug!(
            token,
            route,
            state = ?verdict.state,
            decision = ?verdict.decision,
            "Gate decision"
        );
        self.verdicts.send_replace(Some(verdict.clone()));
        Navigation::Applied(verdict)
    }

    fn publish(&self, route: &str, resolution: &GateResolution) {
        self.verdicts
            .send_replace(Some(Verdict::for_route(route, resolution, &self.config)));
    }
}
