use super::{EventPublisher, RenewalScheduler};
use crate::application_port::{AuthenticationError, RenewalError, SessionManager};
use crate::domain_model::*;
use crate::domain_port::*;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::time::Instant;

type LoginFuture = Shared<BoxFuture<'static, Result<VaultToken, AuthenticationError>>>;

#[derive(Default)]
struct Slot {
    session: Option<Session>,
    /// Bumped on every login and every re-arm; timers carry the value they
    /// were armed with.
    generation: u64,
    task: Option<TaskHandle>,
}

/// Owns the single session token.
///
/// Logins are single-flight: concurrent callers that find no usable token
/// all await the same login future and observe the same result. The token
/// is replaced only once a new one is installed, or dropped when a forced
/// re-authentication fails.
pub struct AuthenticationSession {
    authentication: Arc<dyn ClientAuthentication>,
    tokens: Arc<dyn TokenOperations>,
    scheduler: Arc<RenewalScheduler>,
    publisher: Arc<EventPublisher>,
    slot: Mutex<Slot>,
    login: Mutex<Option<LoginFuture>>,
    closed: AtomicBool,
    me: Weak<AuthenticationSession>,
}

impl AuthenticationSession {
    pub fn new(
        authentication: Arc<dyn ClientAuthentication>,
        tokens: Arc<dyn TokenOperations>,
        scheduler: Arc<RenewalScheduler>,
        publisher: Arc<EventPublisher>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            authentication,
            tokens,
            scheduler,
            publisher,
            slot: Mutex::new(Slot::default()),
            login: Mutex::new(None),
            closed: AtomicBool::new(false),
            me: me.clone(),
        })
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Option<Session> {
        self.slot().session.clone()
    }

    /// A usable token, unless the session is still at `replacing` (the
    /// generation a forced re-authentication wants to get rid of).
    fn usable_token(&self, replacing: Option<u64>) -> Option<VaultToken> {
        let slot = self.slot();
        if replacing.is_some_and(|generation| generation == slot.generation) {
            return None;
        }
        slot.session
            .as_ref()
            .filter(|session| session.is_valid_at(Instant::now()))
            .map(|session| session.token.clone())
    }

    async fn login_once(&self, replacing: Option<u64>) -> Result<VaultToken, AuthenticationError> {
        let login = {
            let mut inflight = self.login.lock().unwrap_or_else(PoisonError::into_inner);
            // a login may have completed between the caller's check and here
            if let Some(token) = self.usable_token(replacing) {
                return Ok(token);
            }
            match inflight.as_ref() {
                Some(login) => login.clone(),
                None => {
                    let login = self.start_login();
                    *inflight = Some(login.clone());
                    login
                }
            }
        };

        let result = login.clone().await;

        let mut inflight = self.login.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight.as_ref().is_some_and(|current| current.ptr_eq(&login)) {
            *inflight = None;
        }
        result
    }

    fn start_login(&self) -> LoginFuture {
        let me = self.me.clone();
        async move {
            match me.upgrade() {
                Some(session) => session.perform_login().await,
                None => Err(AuthenticationError::Closed),
            }
        }
        .boxed()
        .shared()
    }

    async fn perform_login(&self) -> Result<VaultToken, AuthenticationError> {
        let timeout = self.scheduler.config().request_timeout;
        let result = match tokio::time::timeout(timeout, self.authentication.login()).await {
            Ok(result) => result,
            Err(_) => Err(AuthenticationError::Timeout(timeout)),
        };

        match result {
            Ok(login) => {
                let token = login.token.clone();
                if self.install(login) {
                    return Ok(token);
                }
                tracing::info!(token = %token, "session closed during login, discarding token");
                if self.scheduler.config().revoke_on_close {
                    self.revoke_token(&token).await;
                }
                Err(AuthenticationError::Closed)
            }
            Err(e) => {
                tracing::error!("login failed: {e}");
                self.publisher
                    .publish(LifecycleEvent::session(SessionEvent::Error {
                        error: e.to_string(),
                    }));
                Err(e)
            }
        }
    }

    /// Makes `login` the current session. Returns false, installing nothing,
    /// once `close` has started.
    fn install(&self, login: LoginToken) -> bool {
        let session = Session::from_login(login, Instant::now());
        let (generation, previous) = {
            let mut slot = self.slot();
            // close sets the flag before taking the slot lock
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            slot.generation += 1;
            slot.session = Some(session.clone());
            (slot.generation, slot.task.take())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }

        tracing::info!(token = %session.token, ttl = ?session.ttl, renewable = session.renewable, "logged in");
        self.publisher
            .publish(LifecycleEvent::session(SessionEvent::LoggedIn {
                fingerprint: session.token.fingerprint(),
                ttl: session.ttl,
            }));
        self.arm(&session, generation);
        true
    }

    fn arm(&self, session: &Session, generation: u64) {
        match self
            .scheduler
            .schedule_session(self.me.clone(), session, generation)
        {
            Ok(Some(handle)) => {
                let mut slot = self.slot();
                if slot.generation == generation {
                    slot.task = Some(handle);
                } else {
                    handle.cancel();
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("session timer rejected: {e}");
                if let Some(current) = self.slot().session.as_mut() {
                    current.state = CredentialState::Error;
                }
                self.publisher
                    .publish(LifecycleEvent::session(SessionEvent::Error {
                        error: e.to_string(),
                    }));
            }
        }
    }

    /// Renewal timer callback. Falls back to a full login when the backend
    /// refuses to renew; a failed login is published, never returned.
    pub async fn renew(&self, generation: u64) {
        let token = {
            let mut slot = self.slot();
            if slot.generation != generation {
                return;
            }
            slot.task = None;
            let Some(session) = slot.session.as_mut() else {
                return;
            };
            if !session.state.can_transition_to(CredentialState::Renewing) {
                return;
            }
            session.state = CredentialState::Renewing;
            session.token.clone()
        };

        match self.scheduler.call(self.tokens.renew_self(&token)).await {
            Ok(renewed) => self.on_renewed(generation, renewed),
            Err(e) => self.reauthenticate(generation, e).await,
        }
    }

    fn on_renewed(&self, generation: u64, renewed: LoginToken) {
        let now = Instant::now();
        let (session, next) = {
            let mut slot = self.slot();
            if slot.generation != generation {
                return;
            }
            slot.generation += 1;
            let next = slot.generation;
            let Some(session) = slot.session.as_mut() else {
                return;
            };
            session.token = renewed.token;
            session.ttl = renewed.ttl;
            session.renewable = renewed.renewable;
            session.issued_at = now;
            session.last_renewed = Some(now);
            session.state = CredentialState::Active;
            session.attempts = 0;
            (session.clone(), next)
        };

        tracing::info!(token = %session.token, ttl = ?session.ttl, "token renewed");
        self.publisher
            .publish(LifecycleEvent::session(SessionEvent::TokenRenewed {
                fingerprint: session.token.fingerprint(),
                ttl: session.ttl,
            }));
        self.arm(&session, next);
    }

    async fn reauthenticate(&self, generation: u64, error: RenewalError) {
        tracing::warn!("token renewal failed, re-authenticating: {error}");
        {
            let mut slot = self.slot();
            if slot.generation != generation {
                return;
            }
            if let Some(session) = slot.session.as_mut() {
                session.state = CredentialState::Error;
                session.attempts += 1;
            }
        }

        if self.login_once(Some(generation)).await.is_err() {
            let mut slot = self.slot();
            if slot.generation == generation {
                slot.session = None;
            }
        }
    }

    /// Expiry timer callback for tokens that cannot be renewed. The next
    /// `get_token` logs in again.
    pub fn expire(&self, generation: u64) {
        let expired = {
            let mut slot = self.slot();
            if slot.generation != generation {
                return;
            }
            slot.task = None;
            slot.session.take()
        };
        if let Some(session) = expired {
            tracing::info!(token = %session.token, "token expired");
            self.publisher
                .publish(LifecycleEvent::session(SessionEvent::TokenExpired {
                    fingerprint: session.token.fingerprint(),
                }));
        }
    }

    /// Stops the session. With `revoke` the current token is revoked on the
    /// backend (best effort).
    pub async fn close(&self, revoke: bool) {
        self.closed.store(true, Ordering::Release);
        let (session, task) = {
            let mut slot = self.slot();
            slot.generation += 1;
            (slot.session.take(), slot.task.take())
        };
        if let Some(task) = task {
            task.cancel();
        }
        let Some(session) = session else {
            return;
        };
        if !revoke {
            return;
        }

        if self.revoke_token(&session.token).await {
            self.publisher
                .publish(LifecycleEvent::session(SessionEvent::TokenRevoked {
                    fingerprint: session.token.fingerprint(),
                }));
        }
    }

    /// Best-effort backend revocation; failures are only logged.
    async fn revoke_token(&self, token: &VaultToken) -> bool {
        let timeout = self.scheduler.config().request_timeout;
        match tokio::time::timeout(timeout, self.tokens.revoke_self(token)).await {
            Ok(Ok(())) => {
                tracing::info!(token = %token, "token revoked");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(token = %token, "token revocation failed: {e}");
                false
            }
            Err(_) => {
                tracing::warn!(token = %token, "token revocation timed out");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl SessionManager for AuthenticationSession {
    async fn get_token(&self) -> Result<VaultToken, AuthenticationError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AuthenticationError::Closed);
        }
        if let Some(token) = self.usable_token(None) {
            return Ok(token);
        }
        self.login_once(None).await
    }
}
