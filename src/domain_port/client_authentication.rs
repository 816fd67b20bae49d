use crate::application_port::AuthenticationError;
use crate::domain_model::LoginToken;

/// Authentication strategy used to obtain a session token.
#[async_trait::async_trait]
pub trait ClientAuthentication: Send + Sync {
    async fn login(&self) -> Result<LoginToken, AuthenticationError>;
}
