//! Session controller: the single owner of the current token and claims.
//!
//! Every transition (initialize, login, logout, expiry, external storage
//! change) replaces token and claims together under one lock and bumps a
//! generation counter. Expiry timers and in-flight fetches carry the
//! generation or token they started with, so stale work cannot resurrect
//! a session that has since changed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::expiry::{ExpiryHandle, ExpiryScheduler};
use super::store::TokenStore;
use super::token::{self, Claims};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Storage has not been consulted yet
    Loading,
    Anonymous,
    Authenticated,
}

/// Read model handed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub claims: Option<Claims>,
}

impl SessionSnapshot {
    fn loading() -> Self {
        Self {
            is_loading: true,
            is_authenticated: false,
            claims: None,
        }
    }
}

struct SessionState {
    status: SessionStatus,
    token: Option<String>,
    claims: Option<Claims>,
    generation: u64,
    /// The token is (or was adopted from) the shared durable slot
    shared: bool,
    expiry: ExpiryScheduler,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        let claims = match self.status {
            SessionStatus::Authenticated => self.claims.clone(),
            _ => None,
        };
        let is_authenticated = self.token.is_some()
            && claims
                .as_ref()
                .is_some_and(|c| !c.is_expired_at(Utc::now()));
        SessionSnapshot {
            is_loading: self.status == SessionStatus::Loading,
            is_authenticated,
            claims,
        }
    }
}

struct Inner {
    store: TokenStore,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<SessionSnapshot>,
}

/// Handle to the session. Clones share the same state; construct one per
/// application context and pass it to whatever needs the session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Create a controller in the `Loading` state. Call [`initialize`]
    /// to consult storage.
    ///
    /// [`initialize`]: SessionController::initialize
    pub fn new(store: TokenStore) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::loading());
        Self {
            inner: Arc::new(Inner {
                store,
                state: Mutex::new(SessionState {
                    status: SessionStatus::Loading,
                    token: None,
                    claims: None,
                    generation: 0,
                    shared: false,
                    expiry: ExpiryScheduler::new(),
                }),
                snapshots,
            }),
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    /// Restore the session from storage. Invalid or expired tokens are
    /// removed from storage.
    pub fn initialize(&self) {
        let mut state = self.lock();
        let slots = self.inner.store.slots();
        let shared = slots.durable.is_some();
        let restored = match slots.durable.or(slots.session) {
            Some(raw) => match token::decode(&raw) {
                Some(claims) => Some((raw, claims)),
                None => {
                    info!("Stored token is invalid or expired, clearing it");
                    self.inner.store.clear();
                    None
                }
            },
            None => None,
        };
        debug!(restored = restored.is_some(), shared, "Session initialized");
        match restored {
            Some((raw, claims)) => self.authenticate(state, raw, claims, shared),
            None => self.set_anonymous(&mut state),
        }
    }

    /// Persist and adopt `token`. Returns whether the session is now
    /// authenticated; an undecodable or expired token logs out instead.
    ///
    /// Storage is written under the session lock so a concurrent external
    /// change cannot land between the write and the transition.
    pub fn login(&self, token: &str, remember: bool) -> bool {
        let mut state = self.lock();
        self.inner.store.save(token, remember);
        match token::decode(token) {
            Some(claims) => {
                info!(sub = %claims.sub, remember, "Signed in");
                self.authenticate(state, token.to_string(), claims, remember);
                true
            }
            None => {
                warn!("Rejected token at login");
                self.inner.store.clear();
                self.set_anonymous(&mut state);
                false
            }
        }
    }

    /// Clear storage, disarm the expiry timer and become anonymous.
    pub fn logout(&self) {
        let mut state = self.lock();
        self.inner.store.clear();
        self.set_anonymous(&mut state);
    }

    /// Log out only if the session still holds `token` (`None` matches an
    /// anonymous session). Returns whether it did.
    pub fn logout_if_current(&self, token: Option<&str>) -> bool {
        let mut state = self.lock();
        if state.token.as_deref() != token {
            debug!("Ignoring invalidation for a superseded token");
            return false;
        }
        self.inner.store.clear();
        self.set_anonymous(&mut state);
        true
    }

    /// Another context changed the shared key: derive state from the
    /// durable slot.
    ///
    /// A removed key ends any session that shares it. A token kept only in
    /// this context's session slot is left alone.
    pub fn on_external_change(&self) {
        let mut state = self.lock();
        match self.inner.store.slots().durable {
            None if state.status == SessionStatus::Authenticated && !state.shared => {
                debug!("Shared token removed, keeping session-only token");
            }
            None => {
                debug!("Token removed by another context");
                self.inner.store.clear();
                self.set_anonymous(&mut state);
            }
            Some(raw) if state.token.as_deref() == Some(raw.as_str()) => {
                state.shared = true;
            }
            Some(raw) => match token::decode(&raw) {
                Some(claims) => {
                    debug!("Token changed by another context");
                    self.authenticate(state, raw, claims, true);
                }
                None => {
                    debug!("Another context stored an unusable token");
                    self.set_anonymous(&mut state);
                }
            },
        }
    }

    /// Follow storage notifications from other contexts until the bus closes
    /// or every controller handle is dropped.
    pub fn spawn_storage_listener(&self) -> JoinHandle<()> {
        let mut events = self.inner.store.subscribe();
        let key = self.inner.store.key().to_string();
        let origin = self.inner.store.origin();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.key != key || event.origin == origin => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Storage listener lagged, re-reading storage");
                    }
                    Err(RecvError::Closed) => break,
                }
                match Self::upgrade(&weak) {
                    Some(session) => session.on_external_change(),
                    None => break,
                }
            }
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Watch every transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot().is_loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated
    }

    pub fn claims(&self) -> Option<Claims> {
        self.snapshot().claims
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    /// `Bearer <token>` when a token is held
    pub fn auth_header(&self) -> Option<String> {
        self.token().map(|token| format!("Bearer {token}"))
    }

    /// Increases with every transition
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn has_pending_expiry(&self) -> bool {
        self.lock().expiry.is_pending()
    }

    /// Run `f` against the current claims only if the session still holds
    /// `token`. Results of work started under an older token are dropped.
    pub fn apply_if_current<T>(&self, token: &str, f: impl FnOnce(&Claims) -> T) -> Option<T> {
        let state = self.lock();
        if state.status != SessionStatus::Authenticated || state.token.as_deref() != Some(token) {
            debug!("Discarding result for a superseded session");
            return None;
        }
        state.claims.as_ref().map(f)
    }

    /// Replace token and claims, then arm expiry for the new claims once
    /// the lock is released.
    fn authenticate(
        &self,
        mut state: MutexGuard<'_, SessionState>,
        token: String,
        claims: Claims,
        shared: bool,
    ) {
        state.expiry.disarm();
        state.generation += 1;
        state.status = SessionStatus::Authenticated;
        state.token = Some(token);
        state.claims = Some(claims.clone());
        state.shared = shared;
        self.publish(&state);
        let generation = state.generation;
        drop(state);

        // Armed without the lock held: an already-past expiry fires inline.
        let weak = Arc::downgrade(&self.inner);
        let handle = ExpiryScheduler::arm(Some(&claims), move || {
            if let Some(session) = Self::upgrade(&weak) {
                session.expire(generation);
            }
        });
        self.install_expiry(generation, handle);
    }

    fn install_expiry(&self, generation: u64, handle: ExpiryHandle) {
        let mut state = self.lock();
        if state.generation == generation {
            state.expiry.replace(handle);
        }
        // Otherwise the session moved on and dropping the handle disarms it
    }

    fn expire(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation || state.status != SessionStatus::Authenticated {
            return;
        }
        info!("Session token expired");
        self.inner.store.clear();
        self.set_anonymous(&mut state);
    }

    fn set_anonymous(&self, state: &mut SessionState) {
        state.expiry.disarm();
        state.generation += 1;
        state.status = SessionStatus::Anonymous;
        state.token = None;
        state.claims = None;
        state.shared = false;
        self.publish(state);
    }

    fn publish(&self, state: &SessionState) {
        self.inner.snapshots.send_replace(state.snapshot());
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}
