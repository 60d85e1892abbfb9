//! Application Configuration
//!
//! Configuration for the gate application layer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Re-export SameSite from platform
pub use platform::cookie::SameSite;
pub use platform::lockout::LockoutPolicy;

use platform::cookie::CookieConfig;

use crate::application::role_resolver::RoleDirectory;

/// Gate application configuration
#[derive(Clone)]
pub struct GateConfig {
    /// Client token cookie name
    pub client_cookie_name: String,
    /// Secret key for HMAC signing of client tokens (32 bytes)
    pub client_secret: [u8; 32],
    /// Client cookie lifetime; idle contexts older than this are evicted
    pub client_ttl: Duration,
    /// Whether to require Secure cookie
    pub cookie_secure: bool,
    /// SameSite policy
    pub cookie_same_site: SameSite,
    /// Sign-in attempt limit and lockout length
    pub lockout: LockoutPolicy,
    /// Live client contexts; past this the least recently seen one goes
    pub max_clients: usize,
    /// Accounts with recent failures tracked server-wide
    pub max_tracked_accounts: usize,
    /// How long a protected request waits for the first identity notification
    pub session_ready_timeout: Duration,
    /// Age after which a stored local override is ignored (None: never)
    pub override_ttl: Option<Duration>,
    /// Administrative email table
    pub admins: Arc<RoleDirectory>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            client_cookie_name: "gate_client".to_string(),
            client_secret: [0u8; 32],
            client_ttl: Duration::from_secs(12 * 3600), // 12 hours
            cookie_secure: true,
            cookie_same_site: SameSite::Lax,
            lockout: LockoutPolicy::default(),
            max_clients: 10_000,
            max_tracked_accounts: 10_000,
            session_ready_timeout: Duration::from_secs(5),
            override_ttl: None,
            admins: Arc::new(RoleDirectory::default()),
        }
    }
}

impl fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateConfig")
            .field("client_cookie_name", &self.client_cookie_name)
            .field("client_secret", &"<redacted>")
            .field("client_ttl", &self.client_ttl)
            .field("cookie_secure", &self.cookie_secure)
            .field("cookie_same_site", &self.cookie_same_site)
            .field("lockout", &self.lockout)
            .field("max_clients", &self.max_clients)
            .field("max_tracked_accounts", &self.max_tracked_accounts)
            .field("session_ready_timeout", &self.session_ready_timeout)
            .field("override_ttl", &self.override_ttl)
            .field("admins", &self.admins.len())
            .finish()
    }
}

impl GateConfig {
    /// Create config with a random client secret (for development)
    pub fn with_random_secret() -> Self {
        Self {
            client_secret: platform::crypto::random_key(),
            ..Default::default()
        }
    }

    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        Self {
            cookie_secure: false,
            ..Self::with_random_secret()
        }
    }

    pub fn with_admins(mut self, admins: RoleDirectory) -> Self {
        self.admins = Arc::new(admins);
        self
    }

    /// Cookie settings for the client token
    pub fn client_cookie(&self) -> CookieConfig {
        CookieConfig {
            name: self.client_cookie_name.clone(),
            secure: self.cookie_secure,
            http_only: true,
            same_site: self.cookie_same_site,
            path: "/".to_string(),
            max_age_secs: Some(self.client_ttl.as_secs() as i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_lockout_rules() {
        let config = GateConfig::default();
        assert_eq!(config.lockout.max_attempts, 5);
        assert_eq!(config.lockout.lockout_secs, 60);
        assert!(config.override_ttl.is_none());
        assert!(config.cookie_secure);
        assert_eq!(config.max_clients, 10_000);
    }

    #[test]
    fn test_development_config() {
        let config = GateConfig::development();
        assert!(!config.cookie_secure);
        assert_ne!(config.client_secret, [0u8; 32]);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = GateConfig::development();
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_client_cookie() {
        let cookie = GateConfig::default().client_cookie();
        assert_eq!(cookie.name, "gate_client");
        assert!(cookie.http_only);
        assert_eq!(cookie.max_age_secs, Some(12 * 3600));
    }
}
