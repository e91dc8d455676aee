use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

/// Credentials
///
/// A username/password pair submitted by a login attempt. Borrowed so the
/// caller's strings are never copied into long-lived state.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// AuthenticationPolicy
///
/// Capability interface deciding whether a set of credentials is valid.
/// The session only ever asks `verify`, so the comparator can be swapped for a
/// real identity provider without touching the session or the navigation guard.
pub trait AuthenticationPolicy: Send + Sync {
    fn verify(&self, credentials: &Credentials<'_>) -> bool;
}

/// FixedCredentialPolicy
///
/// Placeholder policy comparing against one configured username/password pair.
/// No hashing, no rate limiting, no lockout. The pair comes from `AppConfig`.
#[derive(Debug, Clone)]
pub struct FixedCredentialPolicy {
    username: String,
    password: String,
}

impl FixedCredentialPolicy {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl AuthenticationPolicy for FixedCredentialPolicy {
    fn verify(&self, credentials: &Credentials<'_>) -> bool {
        credentials.username == self.username && credentials.password == self.password
    }
}

/// SessionEvent
///
/// Emitted to every listener after a session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoginRejected,
    LoggedOut,
}

/// Identifies a registered listener so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener callback: receives the event and the resulting authentication flag.
pub type SessionListener = Arc<dyn Fn(SessionEvent, bool) + Send + Sync>;

struct SessionInner {
    authenticated: AtomicBool,
    policy: Arc<dyn AuthenticationPolicy>,
    listeners: Mutex<Vec<(ListenerId, SessionListener)>>,
    next_listener: AtomicU64,
}

/// SessionState
///
/// The process-wide authentication flag. It is constructed once by the
/// application root and handed by reference (cheap `Clone`, shared `Arc`) to the
/// router, the navigation guard and the handlers. Starts unauthenticated and is
/// never persisted.
///
/// The flag is atomic because login/logout and guard evaluation run on
/// different tokio worker threads.
#[derive(Clone)]
pub struct SessionState {
    inner: Arc<SessionInner>,
}

impl SessionState {
    pub fn new(policy: Arc<dyn AuthenticationPolicy>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                authenticated: AtomicBool::new(false),
                policy,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// attempt_login
    ///
    /// Asks the policy to verify the credentials. On success the session
    /// becomes authenticated and `true` is returned; on failure the session is
    /// forced back to unauthenticated (even if it was authenticated before)
    /// and `false` is returned. Never errors.
    pub fn attempt_login(&self, username: &str, password: &str) -> bool {
        let accepted = self.inner.policy.verify(&Credentials { username, password });
        self.inner.authenticated.store(accepted, Ordering::SeqCst);

        let event = if accepted {
            SessionEvent::LoggedIn
        } else {
            SessionEvent::LoginRejected
        };
        self.notify(event, accepted);
        accepted
    }

    /// Unconditionally clears the flag.
    pub fn logout(&self) {
        self.inner.authenticated.store(false, Ordering::SeqCst);
        self.notify(SessionEvent::LoggedOut, false);
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst)
    }

    /// subscribe
    ///
    /// Registers a listener invoked after every login attempt and logout.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(SessionEvent, bool) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn notify(&self, event: SessionEvent, authenticated: bool) {
        // Snapshot first so a listener may (un)subscribe without deadlocking.
        let listeners: Vec<SessionListener> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(event, authenticated);
        }
    }
}
