//! File helpers shared by the catalog, the chunked engine and the updater
//!
//! Every record is replaced by writing a temporary sibling, syncing it and
//! renaming it over the target, so readers never observe a partial file.

use crate::storage::error::StorageResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Atomically replace `path` with `bytes`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and atomically write it to `path`
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let content = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &content)
}

/// Read a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let content = std::fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}
