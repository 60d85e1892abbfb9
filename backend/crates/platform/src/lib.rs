//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations for the portal:
//! - Cryptographic utilities (SHA-256, Base64, random bytes)
//! - Client identification (User-Agent fingerprint, client IP)
//! - Cookie management
//! - Lockout policy and the cancellable countdown behind it

pub mod client;
pub mod cookie;
pub mod crypto;
pub mod lockout;
