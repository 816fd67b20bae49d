use super::BackendPorts;
use crate::application_port::{AuthenticationError, RenewalError, RevocationError};
use crate::domain_model::*;
use crate::domain_port::*;
use nanoid::nanoid;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct FakeBackendConfig {
    pub lease_ttl: Duration,
    pub lease_renewable: bool,
    pub token_ttl: Option<Duration>,
    pub token_renewable: bool,
}

impl Default for FakeBackendConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(30),
            lease_renewable: true,
            token_ttl: Some(Duration::from_secs(60)),
            token_renewable: true,
        }
    }
}

#[derive(Default)]
struct FakeState {
    logins: u32,
    login_delay: Duration,
    login_failures: VecDeque<AuthenticationError>,
    token_renewals: u32,
    token_renew_failures: VecDeque<RenewalError>,
    revoked_tokens: Vec<VaultToken>,
    renewals: Vec<(LeaseId, Instant)>,
    renew_failures: VecDeque<RenewalError>,
    renew_ttl: Option<Duration>,
    reissues: Vec<String>,
    reissue_delay: Duration,
    revoke_delay: Duration,
    reissue_failures: VecDeque<RenewalError>,
    revoked_leases: Vec<LeaseId>,
}

/// In-memory backend with scripted failures and call records.
pub struct FakeVaultBackend {
    config: FakeBackendConfig,
    state: Mutex<FakeState>,
}

impl FakeVaultBackend {
    pub fn new(config: FakeBackendConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(FakeState::default()),
        })
    }

    pub fn ports(self: &Arc<Self>) -> BackendPorts {
        BackendPorts {
            authentication: self.clone(),
            tokens: self.clone(),
            leases: self.clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // region scripting

    pub fn fail_logins(&self, count: usize, error: AuthenticationError) {
        self.state()
            .login_failures
            .extend(std::iter::repeat_n(error, count));
    }

    pub fn set_login_delay(&self, delay: Duration) {
        self.state().login_delay = delay;
    }

    pub fn fail_token_renewals(&self, count: usize, error: RenewalError) {
        self.state()
            .token_renew_failures
            .extend(std::iter::repeat_n(error, count));
    }

    pub fn fail_renewals(&self, count: usize, error: RenewalError) {
        self.state()
            .renew_failures
            .extend(std::iter::repeat_n(error, count));
    }

    pub fn fail_reissues(&self, count: usize, error: RenewalError) {
        self.state()
            .reissue_failures
            .extend(std::iter::repeat_n(error, count));
    }

    pub fn set_reissue_delay(&self, delay: Duration) {
        self.state().reissue_delay = delay;
    }

    /// Delay before a lease revocation is recorded and acknowledged.
    pub fn set_revoke_delay(&self, delay: Duration) {
        self.state().revoke_delay = delay;
    }

    /// TTL returned by subsequent lease renewals instead of the default.
    pub fn set_renew_ttl(&self, ttl: Duration) {
        self.state().renew_ttl = Some(ttl);
    }

    // endregion

    // region records

    pub fn login_count(&self) -> u32 {
        self.state().logins
    }

    pub fn token_renewal_count(&self) -> u32 {
        self.state().token_renewals
    }

    pub fn revoked_tokens(&self) -> Vec<VaultToken> {
        self.state().revoked_tokens.clone()
    }

    /// Every attempted lease renewal with the instant it reached the backend.
    pub fn renewals(&self) -> Vec<(LeaseId, Instant)> {
        self.state().renewals.clone()
    }

    pub fn reissues(&self) -> Vec<String> {
        self.state().reissues.clone()
    }

    pub fn revoked_leases(&self) -> Vec<LeaseId> {
        self.state().revoked_leases.clone()
    }

    // endregion

    fn new_login(&self) -> LoginToken {
        LoginToken {
            token: VaultToken::new(format!("hvs.{}", uuid::Uuid::new_v4().simple())),
            ttl: self.config.token_ttl,
            renewable: self.config.token_renewable,
        }
    }
}

#[async_trait::async_trait]
impl ClientAuthentication for FakeVaultBackend {
    async fn login(&self) -> Result<LoginToken, AuthenticationError> {
        let delay = {
            let mut state = self.state();
            state.logins += 1;
            state.login_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.state().login_failures.pop_front() {
            return Err(error);
        }
        Ok(self.new_login())
    }
}

#[async_trait::async_trait]
impl TokenOperations for FakeVaultBackend {
    async fn renew_self(&self, token: &VaultToken) -> Result<LoginToken, RenewalError> {
        let mut state = self.state();
        state.token_renewals += 1;
        if let Some(error) = state.token_renew_failures.pop_front() {
            return Err(error);
        }
        Ok(LoginToken {
            token: token.clone(),
            ttl: self.config.token_ttl,
            renewable: self.config.token_renewable,
        })
    }

    async fn revoke_self(&self, token: &VaultToken) -> Result<(), RevocationError> {
        self.state().revoked_tokens.push(token.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl LeaseOperations for FakeVaultBackend {
    async fn renew(&self, id: &LeaseId) -> Result<Duration, RenewalError> {
        let mut state = self.state();
        state.renewals.push((id.clone(), Instant::now()));
        if let Some(error) = state.renew_failures.pop_front() {
            return Err(error);
        }
        if !self.config.lease_renewable {
            return Err(RenewalError::NotRenewable(id.clone()));
        }
        Ok(state.renew_ttl.unwrap_or(self.config.lease_ttl))
    }

    async fn revoke(&self, id: &LeaseId) -> Result<(), RevocationError> {
        let delay = self.state().revoke_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state().revoked_leases.push(id.clone());
        Ok(())
    }

    async fn reissue(&self, path: &str) -> Result<IssuedLease, RenewalError> {
        let delay = {
            let mut state = self.state();
            state.reissues.push(path.to_owned());
            state.reissue_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        if let Some(error) = state.reissue_failures.pop_front() {
            return Err(error);
        }
        let mut payload = SecretPayload::new();
        payload.insert("username".to_owned(), json!(format!("v-{}", nanoid!(8))));
        payload.insert("password".to_owned(), json!(nanoid!(24)));
        Ok(IssuedLease {
            id: LeaseId(format!("{}/{}", path.trim_end_matches('/'), nanoid!(12))),
            payload,
            ttl: self.config.lease_ttl,
            renewable: self.config.lease_renewable,
        })
    }
}
