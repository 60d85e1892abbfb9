//! Collaborator Traits
//!
//! Contracts of the external services the gate calls into. Implementations
//! live in the infrastructure layer.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::entity::{Identity, LocalOverride};
use crate::domain::value_object::Email;
use crate::error::GateResult;

/// Identity-change notifications, oldest first.
/// `None` means nobody is signed in.
pub type IdentityReceiver = mpsc::UnboundedReceiver<Option<Identity>>;

/// Failures reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Wrong email/password pair. Never says which half was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Transport failure or an unexpected provider answer
    #[error("Identity provider unavailable: {0}")]
    Network(String),

    #[error("Sign-out failed: {0}")]
    SignOut(String),
}

/// Identity provider as seen by one client
#[trait_variant::make(IdentityProvider: Send)]
pub trait LocalIdentityProvider {
    /// Verify credentials. On success the provider also emits the new
    /// identity to its subscribers.
    async fn sign_in(&self, email: &Email, password: &str) -> Result<Identity, IdentityError>;

    /// End the provider session. On success subscribers receive `None`.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Subscribe to identity changes. The current state is delivered first.
    fn subscribe(&self) -> IdentityReceiver;
}

/// Persisted slot holding at most one [`LocalOverride`]
///
/// Synchronous and object safe so it can be handed around as
/// `Option<Arc<dyn OverrideStore>>` and left out of production wiring.
pub trait OverrideStore: Send + Sync {
    fn read(&self) -> GateResult<Option<LocalOverride>>;

    fn write(&self, record: &LocalOverride) -> GateResult<()>;

    /// Remove the record. Deleting an empty slot is not an error.
    fn delete(&self) -> GateResult<()>;
}
