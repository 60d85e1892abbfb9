//! Presentation Layer
//!
//! HTTP handlers, DTOs, router, and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use handlers::{GateAccess, GateAppState, GateClient};
pub use middleware::{RoleGuard, require_roles};
pub use router::{admin_router, gate_router};
