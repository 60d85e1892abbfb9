//! Infrastructure Layer
//!
//! Identity provider and override slot implementations.

mod broadcast;
pub mod file_override;
pub mod identity_toolkit;
pub mod memory;

pub use file_override::JsonFileOverrideStore;
pub use identity_toolkit::{IdentityToolkitConfig, IdentityToolkitProvider};
pub use memory::{InMemoryIdentityDirectory, InMemoryIdentityProvider, MemoryOverrideStore};
