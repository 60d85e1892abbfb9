//! Entity Module

pub mod identity;
pub mod local_override;
pub mod login_attempts;
pub mod session;

pub use identity::Identity;
pub use local_override::LocalOverride;
pub use login_attempts::{AttemptStatus, FailureOutcome, GatePhase, LoginAttempts, Refusal};
pub use session::{Session, SessionPhase};
