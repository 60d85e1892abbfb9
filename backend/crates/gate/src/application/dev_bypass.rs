//! Developer Sign-In
//!
//! Writes a local role override so a developer can reach admin areas
//! without the identity provider. Compiled only with the `dev-bypass`
//! feature.

use std::sync::Arc;

use crate::domain::entity::LocalOverride;
use crate::domain::provider::OverrideStore;
use crate::domain::value_object::{Email, Role};
use crate::error::{GateError, GateResult};

pub struct DevSignInUseCase {
    store: Arc<dyn OverrideStore>,
}

impl DevSignInUseCase {
    pub fn new(store: Arc<dyn OverrideStore>) -> Self {
        Self { store }
    }

    /// Replace the client's override with `role`. Returns the landing route
    /// for that role alongside the stored record.
    pub fn execute(&self, role: Role, email: &str) -> GateResult<(LocalOverride, &'static str)> {
        let email = Email::new(email).map_err(|e| GateError::InvalidEmail(e.message().to_string()))?;
        let record = LocalOverride::new(role, email.as_str());
        self.store.write(&record)?;

        tracing::warn!(role = %role, email = %record.email, "Developer override written");
        Ok((record, role.default_route()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryOverrideStore;

    #[test]
    fn test_writes_override() {
        let store = Arc::new(MemoryOverrideStore::new());
        let use_case = DevSignInUseCase::new(store.clone());

        let (record, route) = use_case.execute(Role::QiratAmir, "Dev@Example.org").unwrap();
        assert_eq!(route, "/admin/qirat");
        assert_eq!(record.email, "dev@example.org");
        assert_eq!(store.read().unwrap(), Some(record));
    }

    #[test]
    fn test_rejects_bad_email() {
        let store = Arc::new(MemoryOverrideStore::new());
        let result = DevSignInUseCase::new(store.clone()).execute(Role::SuperAdmin, "dev");
        assert!(matches!(result, Err(GateError::InvalidEmail(_))));
        assert_eq!(store.read().unwrap(), None);
    }
}
