//! Registry Store (§4.1): the single source of truth, persisted as one JSON
//! document with atomic writes. `update` is the only mutation path.

use std::sync::Mutex;

use drone_hub_protocol::Registry;
use tracing::{error, info};

use crate::paths;

pub struct RegistryStore {
    inner: Mutex<Registry>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RegistryStore {
    /// Load the registry document from disk, creating an empty one if it
    /// doesn't exist yet.
    pub fn open() -> Result<Self, RegistryError> {
        let path = paths::registry_path();
        let registry = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            Registry::default()
        };
        Ok(RegistryStore {
            inner: Mutex::new(registry),
        })
    }

    /// Snapshot read. Callers may observe data that is stale by the time
    /// they act on it — there is no long-running read transaction.
    pub fn load(&self) -> Registry {
        self.inner.lock().expect("registry lock poisoned").clone()
    }

    /// Atomic read-modify-write: load, call `mutator` on a working copy,
    /// persist and swap it in only if the mutator succeeded, return its
    /// value. A failing mutator leaves registry state untouched.
    pub fn update<F, R, E>(&self, mutator: F) -> Result<R, E>
    where
        F: FnOnce(&mut Registry) -> Result<R, E>,
        E: From<RegistryError>,
    {
        let mut guard = self.inner.lock().expect("registry lock poisoned");
        let mut working = guard.clone();
        let result = mutator(&mut working)?;
        if let Err(e) = persist(&working) {
            error!(component = "registry", event = "registry.persist_failed", error = %e);
            return Err(e.into());
        }
        *guard = working;
        Ok(result)
    }
}

/// Write-temp + rename: never leaves a torn registry file on disk even if
/// the process is killed mid-write.
fn persist(registry: &Registry) -> Result<(), RegistryError> {
    let path = paths::registry_path();
    let tmp_path = paths::registry_tmp_path();
    let bytes = serde_json::to_vec_pretty(registry)?;
    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, &path)?;
    info!(component = "registry", event = "registry.persisted", bytes = bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    static ENV_LOCK: StdMutex<()> = StdMutex::new(());

    fn with_temp_data_dir<F: FnOnce()>(f: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        paths::init_data_dir(Some(dir.path()));
        f();
        paths::reset_data_dir();
    }

    #[test]
    fn open_creates_empty_registry_when_missing() {
        with_temp_data_dir(|| {
            let store = RegistryStore::open().unwrap();
            let reg = store.load();
            assert!(reg.drones.is_empty());
        });
    }

    #[test]
    fn update_persists_across_reopen() {
        with_temp_data_dir(|| {
            let store = RegistryStore::open().unwrap();
            store
                .update::<_, _, RegistryError>(|reg| {
                    reg.groups.push("infra".to_string());
                    Ok(())
                })
                .unwrap();

            let reopened = RegistryStore::open().unwrap();
            assert_eq!(reopened.load().groups, vec!["infra".to_string()]);
        });
    }

    #[test]
    fn mutator_error_does_not_persist() {
        with_temp_data_dir(|| {
            let store = RegistryStore::open().unwrap();
            let result: Result<(), RegistryError> = store.update(|reg| {
                reg.groups.push("should-not-land".to_string());
                Err(RegistryError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")))
            });
            assert!(result.is_err());
            assert!(store.load().groups.is_empty());
        });
    }
}
