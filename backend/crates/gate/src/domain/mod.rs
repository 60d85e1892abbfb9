//! Domain Layer
//!
//! Entities, value objects, collaborator traits and the authorization rules.

pub mod entity;
pub mod provider;
pub mod services;
pub mod value_object;

// Re-exports
pub use entity::{Identity, LocalOverride, Session, SessionPhase};
pub use provider::{IdentityError, IdentityProvider, IdentityReceiver, OverrideStore};
pub use services::{Authorization, Decision, authorize, default_route_for};
pub use value_object::{Email, Role, Sector};
