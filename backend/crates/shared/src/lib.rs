//! Shared Kernel - Domain-crossing minimal core
//!
//! The vocabulary every crate of the portal agrees on:
//! - Unified error type ([`error::app_error::AppError`]) and its HTTP classification
//! - Typed identifiers for long-lived entities (client contexts)
//!
//! Anything gate-specific lives in the `gate` crate, not here.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
