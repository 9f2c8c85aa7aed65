//! Port for the external identity provider's role claims.

use async_trait::async_trait;

use crate::domain::appointment::AccountId;
use crate::domain::role::Role;

use super::macros::define_port_error;

define_port_error! {
    /// Errors raised by identity provider adapters.
    pub enum IdentityProviderError {
        /// The provider could not apply the claim.
        Backend { message: String } =>
            "identity provider failure: {message}",
    }
}

/// Port for pushing role claims back to the identity provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Attach a role claim to an account's tokens.
    async fn set_role_claim(&self, uid: &AccountId, role: Role)
    -> Result<(), IdentityProviderError>;
}

/// Fixture implementation for tests that do not assert on claims.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureIdentityProvider;

#[async_trait]
impl IdentityProvider for FixtureIdentityProvider {
    async fn set_role_claim(
        &self,
        _uid: &AccountId,
        _role: Role,
    ) -> Result<(), IdentityProviderError> {
        Ok(())
    }
}
