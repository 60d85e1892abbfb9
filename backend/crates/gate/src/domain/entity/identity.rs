//! Identity Entity
//!
//! An authenticated principal as the identity provider reports it. The gate
//! never creates or destroys one; it only observes them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-assigned opaque id
    pub uid: String,
    /// Email attribute, when the provider has one
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
        }
    }

    pub fn with_email(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self::new(uid, Some(email.into()))
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}
