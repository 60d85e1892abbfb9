//! Role Resolver
//!
//! Maps an authenticated email to a role through a fixed table of
//! administrative addresses. Anything not in the table is `User`.

use std::collections::HashMap;

use crate::domain::value_object::{Email, Role};
use crate::error::{GateError, GateResult};

#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    /// Lowercased email -> non-user role
    entries: HashMap<String, Role>,
}

impl RoleDirectory {
    /// Build the table, rejecting malformed emails, `user` entries and
    /// duplicate addresses (after case folding).
    pub fn from_entries<I, S>(entries: I) -> GateResult<Self>
    where
        I: IntoIterator<Item = (S, Role)>,
        S: AsRef<str>,
    {
        let mut directory = Self::default();
        for (email, role) in entries {
            let key = Self::validated_key(email.as_ref(), role)?;
            if let Some(previous) = directory.entries.insert(key.clone(), role) {
                return Err(GateError::Config(format!(
                    "admin email {key} is mapped twice ({previous} and {role})"
                )));
            }
        }
        Ok(directory)
    }

    /// Like [`RoleDirectory::from_entries`] but never fails: invalid entries
    /// are skipped and on a duplicate the last definition wins. Both are
    /// logged as configuration errors.
    pub fn from_entries_lenient<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Role)>,
        S: AsRef<str>,
    {
        let mut directory = Self::default();
        for (email, role) in entries {
            let key = match Self::validated_key(email.as_ref(), role) {
                Ok(key) => key,
                Err(e) => {
                    tracing::error!(error = %e, "Skipping admin table entry");
                    continue;
                }
            };
            if let Some(previous) = directory.entries.insert(key.clone(), role) {
                tracing::error!(
                    email = %key,
                    previous = %previous,
                    role = %role,
                    "Admin email mapped twice, last definition wins"
                );
            }
        }
        directory
    }

    /// Parse `email=role` pairs separated by commas or newlines.
    ///
    /// ```
    /// use gate::application::role_resolver::RoleDirectory;
    /// use gate::domain::Role;
    ///
    /// let admins = RoleDirectory::parse("head@example.org=super_admin, alms@example.org=charity_amir").unwrap();
    /// assert_eq!(admins.resolve(Some("ALMS@example.org")), Role::CharityAmir);
    /// ```
    pub fn parse(raw: &str) -> GateResult<Self> {
        let pairs = raw
            .split([',', '\n'])
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (email, role) = pair.split_once('=').ok_or_else(|| {
                    GateError::Config(format!("admin table entry '{pair}' is not email=role"))
                })?;
                let role = role
                    .parse::<Role>()
                    .map_err(|e| GateError::Config(e.to_string()))?;
                Ok((email.trim().to_string(), role))
            })
            .collect::<GateResult<Vec<_>>>()?;

        Self::from_entries(pairs)
    }

    fn validated_key(email: &str, role: Role) -> GateResult<String> {
        if !role.is_admin() {
            return Err(GateError::Config(format!(
                "admin table entry {email} maps to {role}"
            )));
        }
        let email = Email::new(email)
            .map_err(|e| GateError::Config(format!("admin table entry {email}: {}", e.message())))?;
        Ok(email.as_str().to_string())
    }

    /// Role for `email`. Case-insensitive exact match; everything else,
    /// including no email at all, resolves to `User`.
    pub fn resolve(&self, email: Option<&str>) -> Role {
        email
            .and_then(|email| self.entries.get(&email.to_lowercase()))
            .copied()
            .unwrap_or(Role::User)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
