//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};

use crate::domain::entity::{LocalOverride, Session, SessionPhase};
use crate::domain::value_object::Role;

// ============================================================================
// Session
// ============================================================================

/// Session snapshot response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub phase: SessionPhase,
    pub authenticated: bool,
    pub email: Option<String>,
    pub role: Role,
    pub is_admin: bool,
    /// Landing route for the effective role
    pub default_route: &'static str,
    /// Developer override in force, if any
    pub local_override: Option<LocalOverride>,
}

impl SessionResponse {
    pub fn new(session: &Session, local_override: Option<LocalOverride>) -> Self {
        let effective_role = local_override
            .as_ref()
            .map(|record| record.role)
            .unwrap_or(session.role());

        Self {
            phase: session.phase(),
            authenticated: session.is_authenticated(),
            email: session.email().map(str::to_string),
            role: session.role(),
            is_admin: session.is_admin(),
            default_route: effective_role.default_route(),
            local_override,
        }
    }
}

// ============================================================================
// Sign In
// ============================================================================

/// Sector sign-in request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Sector sign-in response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    /// Where the client should navigate next
    pub redirect: &'static str,
    pub email: Option<String>,
    pub role: Role,
}

// ============================================================================
// Admin Areas
// ============================================================================

/// Body rendered for an authorized admin area
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAreaResponse {
    pub area: String,
    pub role: Role,
    pub email: Option<String>,
    pub via_override: bool,
}

// ============================================================================
// Developer Sign-In
// ============================================================================

#[cfg(feature = "dev-bypass")]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevLoginRequest {
    pub role: Role,
    pub email: String,
}

#[cfg(feature = "dev-bypass")]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevLoginResponse {
    pub redirect: &'static str,
    pub local_override: LocalOverride,
}
