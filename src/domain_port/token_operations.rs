use crate::application_port::{RenewalError, RevocationError};
use crate::domain_model::{LoginToken, VaultToken};

#[async_trait::async_trait]
pub trait TokenOperations: Send + Sync {
    async fn renew_self(&self, token: &VaultToken) -> Result<LoginToken, RenewalError>;
    async fn revoke_self(&self, token: &VaultToken) -> Result<(), RevocationError>;
}
