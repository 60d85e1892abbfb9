//! Application Layer
//!
//! Session tracking, sector login gates and per-client state.

pub mod account_lockout;
pub mod client_registry;
pub mod client_token;
pub mod config;
#[cfg(feature = "dev-bypass")]
pub mod dev_bypass;
pub mod login_gate;
pub mod role_resolver;
pub mod session_state;

// Re-exports
pub use account_lockout::AccountLockouts;
pub use client_registry::{ClientContext, ClientRegistry, OverrideSlotFactory, ProviderFactory, ResolvedClient};
pub use client_token::ClientTokenSigner;
pub use config::GateConfig;
#[cfg(feature = "dev-bypass")]
pub use dev_bypass::DevSignInUseCase;
pub use login_gate::{LoginGate, SignedIn};
pub use role_resolver::RoleDirectory;
pub use session_state::SessionState;
