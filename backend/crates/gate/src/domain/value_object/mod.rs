//! Value Object Module

pub mod email;
pub mod role;
pub mod sector;

pub use email::Email;
pub use role::Role;
pub use sector::{ADMIN_ROOT, PUBLIC_HOME, Sector};
