//! Gate (Admin Access Control) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Roles, sectors, session and attempt state, authorization rules
//! - `application/` - Session tracking, sector login gates, client registry
//! - `infra/` - Identity provider and override slot implementations
//! - `presentation/` - HTTP handlers, DTOs, router, role guard
//!
//! ## Features
//! - Email/password sign-in per sector through an external identity provider
//! - Role resolution from a fixed table of administrative emails
//! - Five failed attempts lock a sector's form for sixty seconds
//! - Guarded admin areas that redirect instead of rendering
//! - Developer role override behind the `dev-bypass` feature
//!
//! ## Security Model
//! - Roles are never inferred from an email's domain
//! - Client cookies are HMAC-signed and bound to the User-Agent fingerprint
//! - Sign-in errors never reveal whether an email exists

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::GateConfig;
pub use application::{ClientRegistry, RoleDirectory};
pub use error::{GateError, GateResult};
pub use presentation::router::{admin_router, gate_router};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}

pub mod handlers {
    pub use crate::presentation::handlers::*;
}

pub mod router {
    pub use crate::presentation::router::*;
}

pub mod middleware {
    pub use crate::presentation::middleware::*;
}
