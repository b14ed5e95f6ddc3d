//! Session context
//!
//! One [`SessionContext`] per client tab. It follows the identity service's
//! event stream, keeps the profile-wide markers and the tab's bearer
//! credential in step with it, and publishes [`SessionSnapshot`]s.
//!
//! Transitions (events, login, logout) are serialized, so the last event
//! observed always determines the state.

use chrono::Duration;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::refresh;
use super::storage::{MarkerJar, TabStorage};
use crate::identity::{AuthEvent, Identity, IdentityError, IdentityService};

/// Authorization from the two local signals. Either one suffices: the
/// marker survives reloads before the identity stream resolves, the
/// identity covers a missing or expired marker.
pub fn authorization_signal(has_marker: bool, has_identity: bool) -> bool {
    has_marker || has_identity
}

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No identity event received yet
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub is_authorized: bool,
    pub is_initializing: bool,
    pub phase: SessionPhase,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            identity: None,
            is_authorized: false,
            is_initializing: true,
            phase: SessionPhase::Initializing,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    identity: Option<Identity>,
    resolved: bool,
}

/// Client authentication state for one tab
pub struct SessionContext {
    identity_service: Arc<dyn IdentityService>,
    jar: MarkerJar,
    tab: TabStorage,
    marker_max_age: Duration,
    state: RwLock<State>,
    transition: Mutex<()>,
    snapshots: watch::Sender<SessionSnapshot>,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionContext {
    /// Context sharing `jar` with the other tabs of the profile
    pub fn new(identity_service: Arc<dyn IdentityService>, jar: MarkerJar) -> Self {
        Self {
            identity_service,
            jar,
            tab: TabStorage::new(),
            marker_max_age: Duration::hours(24),
            state: RwLock::new(State::default()),
            transition: Mutex::new(()),
            snapshots: watch::channel(SessionSnapshot::initial()).0,
            listener: StdMutex::new(None),
        }
    }

    pub fn with_marker_max_age(mut self, max_age: Duration) -> Self {
        self.marker_max_age = max_age;
        self
    }

    /// Subscribe to the identity service. Calling it again while the
    /// listener runs does nothing.
    pub fn init(self: &Arc<Self>) {
        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if listener.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let mut events = self.identity_service.subscribe();
        let context = Arc::downgrade(self);
        *listener = Some(tokio::spawn(async move {
            loop {
                match context.upgrade() {
                    Some(context) => context.follow(&mut events).await,
                    None => break,
                }
                if events.changed().await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Stop following the identity service
    pub fn teardown(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Apply the latest event of the stream. It is read under the
    /// transition lock so a logout in progress is never overtaken by an
    /// older event.
    async fn follow(&self, events: &mut watch::Receiver<Option<AuthEvent>>) {
        let _transition = self.transition.lock().await;
        let event = events.borrow_and_update().clone();
        self.apply_locked(event).await;
    }

    /// Apply one identity event. `None` means the service has not resolved
    /// yet and only republishes the snapshot.
    pub async fn apply_event(&self, event: Option<AuthEvent>) {
        let _transition = self.transition.lock().await;
        self.apply_locked(event).await;
    }

    async fn apply_locked(&self, event: Option<AuthEvent>) {
        match event {
            None => {}
            Some(AuthEvent::SignedIn(identity)) => {
                let known = {
                    let state = self.state.read().await;
                    state.resolved && state.identity.as_ref() == Some(&identity)
                };
                let needs_refresh = !known || self.tab.bearer().await.is_none();

                {
                    let mut state = self.state.write().await;
                    state.identity = Some(identity.clone());
                    state.resolved = true;
                }
                self.jar.set_markers(&identity.name, self.marker_max_age).await;

                if needs_refresh {
                    refresh::refresh_credential(self.identity_service.as_ref(), &self.tab).await;
                }
            }
            Some(AuthEvent::SignedOut) => {
                let previous = {
                    let mut state = self.state.write().await;
                    state.resolved = true;
                    state.identity.take()
                };
                // A cold start resolving to signed-out keeps a surviving marker
                if let Some(previous) = previous {
                    tracing::info!("{} signed out", previous);
                    self.jar.clear_markers().await;
                }
                self.tab.clear().await;
            }
        }

        self.publish().await;
    }

    /// Sign in through the identity service and apply the result at once.
    pub async fn login(&self, identity: &str, secret: &str) -> Result<Identity, IdentityError> {
        let signed_in = self
            .identity_service
            .sign_in_with_credentials(identity, secret)
            .await?;
        self.apply_event(Some(AuthEvent::SignedIn(signed_in.clone())))
            .await;
        Ok(signed_in)
    }

    /// Sign out remotely, then clear the markers, the bearer and the
    /// identity whatever the remote outcome. The remote error, if any, is
    /// returned after the local state is gone.
    pub async fn logout(&self) -> Result<(), IdentityError> {
        let _transition = self.transition.lock().await;

        let result = self.identity_service.sign_out().await;

        let previous = {
            let mut state = self.state.write().await;
            state.resolved = true;
            state.identity.take()
        };
        self.jar.clear_markers().await;
        self.tab.clear().await;
        self.publish().await;

        match (&result, previous) {
            (Ok(()), Some(identity)) => tracing::info!("Logged out {}", identity),
            (Ok(()), None) => tracing::debug!("Logout with no identity held"),
            (Err(e), _) => tracing::warn!("Remote sign-out failed, local session cleared: {}", e),
        }
        result
    }

    /// Bearer credential for a data call, refreshing when none is cached
    pub async fn ensure_credential(&self) -> Option<String> {
        refresh::ensure_credential(self.identity_service.as_ref(), &self.tab).await
    }

    /// Live view combining the held identity with the shared jar
    pub async fn snapshot(&self) -> SessionSnapshot {
        let (identity, resolved) = {
            let state = self.state.read().await;
            (state.identity.clone(), state.resolved)
        };
        let is_authorized = authorization_signal(self.jar.has_marker().await, identity.is_some());
        let phase = match (resolved, is_authorized) {
            (false, _) => SessionPhase::Initializing,
            (true, true) => SessionPhase::Authenticated,
            (true, false) => SessionPhase::Unauthenticated,
        };

        SessionSnapshot {
            identity,
            is_authorized,
            is_initializing: !resolved,
            phase,
        }
    }

    /// Snapshots published on every transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.state.read().await.identity.clone()
    }

    pub async fn is_authorized(&self) -> bool {
        self.snapshot().await.is_authorized
    }

    pub async fn is_initializing(&self) -> bool {
        !self.state.read().await.resolved
    }

    /// Bearer credential cached in this tab
    pub async fn bearer(&self) -> Option<String> {
        self.tab.bearer().await
    }

    pub fn jar(&self) -> &MarkerJar {
        &self.jar
    }

    async fn publish(&self) {
        let snapshot = self.snapshot().await;
        self.snapshots.send_replace(snapshot);
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityAuthority, IdentityClient};
    use crate::testing::{
        test_authority, test_session, wait_for, FlakyBackend, ADMIN_IDENTITY, ADMIN_SECRET,
    };
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_either_signal_authorizes(marker: bool, identity: bool) {
            prop_assert_eq!(authorization_signal(marker, identity), marker || identity);
        }
    }

    async fn signed_out_session() -> (Arc<IdentityAuthority>, Arc<IdentityClient>, Arc<SessionContext>) {
        let (authority, _pool) = test_authority().await;
        let (client, session) = test_session(authority.clone(), MarkerJar::new());
        client.restore(None).await.unwrap();
        session.init();
        wait_for(&session, |s| !s.is_initializing).await;
        (authority, client, session)
    }

    #[tokio::test]
    async fn test_initializing_until_first_event() {
        let (authority, _pool) = test_authority().await;
        let (client, session) = test_session(authority, MarkerJar::new());
        session.init();

        assert!(session.is_initializing().await);
        assert_eq!(session.snapshot().await.phase, SessionPhase::Initializing);

        client.restore(None).await.unwrap();
        let snapshot = wait_for(&session, |s| !s.is_initializing).await;
        assert_eq!(snapshot.phase, SessionPhase::Unauthenticated);
        assert!(!snapshot.is_authorized);
    }

    #[tokio::test]
    async fn test_login_sets_markers_and_bearer() {
        let (authority, _client, session) = signed_out_session().await;

        let identity = session.login(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.identity, Some(identity));
        assert_eq!(snapshot.phase, SessionPhase::Authenticated);
        assert!(session.jar().has_marker().await);
        assert_eq!(session.jar().identity_label().await.as_deref(), Some(ADMIN_IDENTITY));
        let bearer = session.bearer().await.expect("bearer cached");
        assert!(authority.verify(&bearer).await.is_ok());
    }

    #[tokio::test]
    async fn test_identity_alone_authorizes() {
        let (_authority, _client, session) = signed_out_session().await;
        session.login(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        session.jar().clear_markers().await;

        assert!(session.is_authorized().await);
    }

    #[tokio::test]
    async fn test_marker_alone_authorizes_on_cold_start() {
        let (authority, _pool) = test_authority().await;
        let jar = MarkerJar::new();
        jar.set_markers(ADMIN_IDENTITY, Duration::hours(24)).await;
        let (client, session) = test_session(authority, jar.clone());
        session.init();

        // Marker counts while the identity stream is still unresolved
        assert!(session.is_authorized().await);

        client.restore(None).await.unwrap();
        let snapshot = wait_for(&session, |s| !s.is_initializing).await;
        assert!(snapshot.identity.is_none());
        assert!(snapshot.is_authorized);
        assert!(jar.has_marker().await, "cold-start sign-out keeps the marker");
    }

    #[tokio::test]
    async fn test_startup_with_live_session_refreshes_bearer() {
        let (authority, _pool) = test_authority().await;
        let first = IdentityClient::new(authority.clone());
        first.sign_in_with_credentials(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        let (client, session) = test_session(authority, MarkerJar::new());
        client.restore(first.refresh_token().await).await.unwrap();
        session.init();

        let snapshot = wait_for(&session, |s| s.phase == SessionPhase::Authenticated).await;
        assert_eq!(snapshot.identity.map(|i| i.name).as_deref(), Some(ADMIN_IDENTITY));
        assert!(session.bearer().await.is_some());
        assert!(session.jar().has_marker().await);
    }

    #[tokio::test]
    async fn test_logout_clears_everything_and_is_idempotent() {
        let (_authority, _client, session) = signed_out_session().await;
        session.login(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        session.logout().await.unwrap();
        let once = session.snapshot().await;
        assert!(!once.is_authorized);
        assert!(once.identity.is_none());
        assert!(!session.jar().has_marker().await);
        assert!(session.jar().identity_label().await.is_none());
        assert!(session.bearer().await.is_none());

        session.logout().await.unwrap();
        assert_eq!(session.snapshot().await, once);
    }

    #[tokio::test]
    async fn test_logout_clears_locally_when_remote_fails() {
        let (authority, _pool) = test_authority().await;
        let backend = Arc::new(FlakyBackend::new(authority));
        let client = Arc::new(IdentityClient::new(backend.clone()));
        let session = Arc::new(SessionContext::new(client.clone(), MarkerJar::new()));
        session.init();
        session.login(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        backend.fail_revoke(true);
        let result = session.logout().await;

        assert!(matches!(result, Err(IdentityError::Unavailable(_))));
        assert!(!session.is_authorized().await);
        assert!(!session.jar().has_marker().await);
        assert!(session.bearer().await.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_event_after_identity_clears_markers() {
        let (_authority, client, session) = signed_out_session().await;
        session.login(ADMIN_IDENTITY, ADMIN_SECRET).await.unwrap();

        // Signed out elsewhere (not through the context)
        client.sign_out().await.unwrap();

        let snapshot = wait_for(&session, |s| s.identity.is_none()).await;
        assert!(!snapshot.is_authorized);
        assert_eq!(snapshot.phase, SessionPhase::Unauthenticated);
        assert!(!session.jar().has_marker().await);
        assert!(session.bearer().await.is_none());
    }

    #[tokio::test]
    async fn test_teardown_stops_following_events() {
        let (_authority, client, session) = signed_out_session().await;
        session.teardown();

        client
            .sign_in_with_credentials(ADMIN_IDENTITY, ADMIN_SECRET)
            .await
            .unwrap();
        tokio::task::yield_now().await;

        assert!(session.identity().await.is_none());
    }
}
