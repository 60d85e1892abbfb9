//! Session Entity
//!
//! The locally derived view of the current identity. Fields are private so
//! `is_admin == (role != User)` holds for every value that can exist.

use serde::Serialize;

use super::identity::Identity;
use crate::domain::value_object::Role;

/// Whether the first identity notification has arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    identity: Option<Identity>,
    role: Role,
    is_admin: bool,
    phase: SessionPhase,
}

impl Session {
    /// State before the identity provider has reported anything
    pub fn loading() -> Self {
        Self {
            identity: None,
            role: Role::User,
            is_admin: false,
            phase: SessionPhase::Loading,
        }
    }

    /// Ready state with nobody signed in
    pub fn signed_out() -> Self {
        Self::resolved(None, Role::User)
    }

    /// Ready state for `identity` holding `role`.
    ///
    /// Without an identity the role is always `User`, whatever was passed.
    pub fn resolved(identity: Option<Identity>, role: Role) -> Self {
        let role = if identity.is_some() { role } else { Role::User };
        Self {
            identity,
            role,
            is_admin: role.is_admin(),
            phase: SessionPhase::Ready,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn email(&self) -> Option<&str> {
        self.identity.as_ref().and_then(Identity::email)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == SessionPhase::Loading
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}
