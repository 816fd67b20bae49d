use crate::domain_model::VaultToken;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticationError {
    #[error("login rejected: {0}")]
    Rejected(String),
    #[error("login timed out after {0:?}")]
    Timeout(Duration),
    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),
    #[error("session manager is closed")]
    Closed,
}

#[async_trait::async_trait]
pub trait SessionManager: Send + Sync {
    /// Current token, logging in first when there is none or it has expired.
    async fn get_token(&self) -> Result<VaultToken, AuthenticationError>;
}
