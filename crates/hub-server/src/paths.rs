//! Central path resolution for all Drone Hub data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `DRONE_HUB_DATA_DIR` env
//! > `~/.drone-hub`. All callsites use these helpers instead of constructing
//! paths from `HOME`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

static DATA_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Initialize the global data directory. Returns the resolved path.
///
/// Priority: `explicit` arg > `DRONE_HUB_DATA_DIR` env > `~/.drone-hub`
/// default. Panics if no valid path can be resolved.
pub fn init_data_dir(explicit: Option<&Path>) -> PathBuf {
    let dir = if let Some(p) = explicit {
        p.to_path_buf()
    } else if let Ok(env_val) = std::env::var("DRONE_HUB_DATA_DIR") {
        PathBuf::from(env_val)
    } else {
        dirs::home_dir()
            .expect("HOME directory not found")
            .join(".drone-hub")
    };

    let mut guard = DATA_DIR.write().expect("DATA_DIR lock poisoned");
    *guard = Some(dir.clone());
    dir
}

/// Return the current data directory. Panics if `init_data_dir` hasn't been called.
pub fn data_dir() -> PathBuf {
    DATA_DIR
        .read()
        .expect("DATA_DIR lock poisoned")
        .clone()
        .expect("data_dir() called before init_data_dir()")
}

/// The single JSON registry document (§4.1, §6).
pub fn registry_path() -> PathBuf {
    data_dir().join("registry.json")
}

/// Scratch path for the registry's atomic write-temp + rename.
pub fn registry_tmp_path() -> PathBuf {
    data_dir().join("registry.json.tmp")
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn pid_file_path() -> PathBuf {
    data_dir().join("drone-hub.pid")
}

pub fn token_file_path() -> PathBuf {
    data_dir().join("auth-token")
}

pub fn attachments_dir() -> PathBuf {
    data_dir().join("attachments")
}

pub fn encryption_key_path() -> PathBuf {
    data_dir().join("encryption.key")
}

pub fn repo_imports_dir() -> PathBuf {
    data_dir().join("repo-imports")
}

/// Create all required subdirectories under the data dir.
pub fn ensure_dirs() -> io::Result<()> {
    let base = data_dir();
    std::fs::create_dir_all(&base)?;
    std::fs::create_dir_all(base.join("logs"))?;
    std::fs::create_dir_all(base.join("attachments"))?;
    std::fs::create_dir_all(base.join("repo-imports"))?;
    Ok(())
}

/// Reset data dir — for test isolation only.
#[cfg(test)]
pub fn reset_data_dir() {
    let mut guard = DATA_DIR.write().expect("DATA_DIR lock poisoned");
    *guard = None;
}
