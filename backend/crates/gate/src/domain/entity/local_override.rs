//! Local Override Entity
//!
//! Development-only record that simulates a signed-in administrator without
//! the identity provider. When present it wins over the session for every
//! authorization decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::value_object::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalOverride {
    pub role: Role,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl LocalOverride {
    pub fn new(role: Role, email: impl Into<String>) -> Self {
        Self {
            role,
            email: email.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether the record has outlived `ttl`. No ttl means it never expires.
    pub fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        let Some(ttl) = ttl else {
            return false;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now >= self.created_at + ttl,
            // Too large to represent: effectively unbounded
            Err(_) => false,
        }
    }
}
