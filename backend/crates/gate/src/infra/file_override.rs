//! JSON File Override Slot
//!
//! Persists a client's [`LocalOverride`] as a JSON document so developer
//! overrides survive a restart. Writes go to a temporary file that is then
//! renamed over the slot.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kernel::id::ClientId;

use crate::application::client_registry::OverrideSlotFactory;
use crate::domain::entity::LocalOverride;
use crate::domain::provider::OverrideStore;
use crate::error::{GateError, GateResult};

#[derive(Debug, Clone)]
pub struct JsonFileOverrideStore {
    path: PathBuf,
}

impl JsonFileOverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// One `<client id>.json` slot per client under `dir`
    pub fn slot_factory(dir: impl Into<PathBuf>) -> OverrideSlotFactory {
        let dir: PathBuf = dir.into();
        Arc::new(move |client_id: &ClientId| {
            Arc::new(Self::new(dir.join(format!("{client_id}.json")))) as Arc<dyn OverrideStore>
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        temp.into()
    }
}

fn store_error(action: &str, path: &Path, err: impl std::fmt::Display) -> GateError {
    GateError::OverrideStore(format!("{action} {}: {err}", path.display()))
}

impl OverrideStore for JsonFileOverrideStore {
    fn read(&self) -> GateResult<Option<LocalOverride>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_error("read", &self.path, e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| store_error("parse", &self.path, e))
    }

    fn write(&self, record: &LocalOverride) -> GateResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| store_error("create", parent, e))?;
        }

        let json = serde_json::to_vec_pretty(record).map_err(|e| store_error("encode", &self.path, e))?;
        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| store_error("write", &temp, e))?;
        fs::rename(&temp, &self.path).map_err(|e| store_error("replace", &self.path, e))?;
        Ok(())
    }

    fn delete(&self) -> GateResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error("delete", &self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::Role;

    #[test]
    fn test_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOverrideStore::new(dir.path().join("nested").join("slot.json"));
        assert_eq!(store.read().unwrap(), None);

        let record = LocalOverride::new(Role::AcademicAmir, "dev@example.org");
        store.write(&record).unwrap();
        assert_eq!(store.read().unwrap(), Some(record.clone()));
        assert!(!store.temp_path().exists());

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"role\": \"academic_amir\""));
        assert!(raw.contains("createdAt"));

        store.delete().unwrap();
        store.delete().unwrap();
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonFileOverrideStore::new(path);
        assert!(matches!(store.read(), Err(GateError::OverrideStore(_))));
    }

    #[test]
    fn test_slot_factory_separates_clients() {
        let dir = tempfile::tempdir().unwrap();
        let factory = JsonFileOverrideStore::slot_factory(dir.path());

        let a = factory(&ClientId::new());
        let b = factory(&ClientId::new());
        a.write(&LocalOverride::new(Role::SuperAdmin, "dev@example.org")).unwrap();

        assert!(a.read().unwrap().is_some());
        assert!(b.read().unwrap().is_none());
    }
}
