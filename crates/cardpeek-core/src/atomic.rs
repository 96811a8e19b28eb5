//! Atomic file replacement.
//!
//! Implements atomic writes using:
//! 1. Write to a temp file with a unique PID+TID suffix next to the target
//! 2. fsync to ensure data reaches disk
//! 3. Atomic rename over the target path

use crate::{CardpeekError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut contents = String::new();
    File::open(path)
        .and_then(|mut file| file.read_to_string(&mut contents))
        .map_err(|e| CardpeekError::Io {
            message: format!("Failed to read {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;

    let data: T = serde_json::from_str(&contents).map_err(|e| CardpeekError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Serialize `data` as pretty JSON and write it atomically.
///
/// The parent directory must already exist.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(data).map_err(|e| CardpeekError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    atomic_write_bytes(path, serialized.as_bytes())
}

/// Write raw bytes to `path` atomically.
///
/// Readers of `path` observe either the previous content or the new content,
/// never a partial file. The parent directory must already exist.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(path);

    let written = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.flush()?;
            file.sync_all()
        });

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(CardpeekError::Io {
            message: format!("Failed to write temp file {}", temp_path.display()),
            path: Some(temp_path),
            source: Some(e),
        });
    }

    replace_file(&temp_path, path)?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Rename `from` over `to`, removing `from` if the rename fails.
pub fn replace_file(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| {
        let _ = fs::remove_file(from);
        CardpeekError::Io {
            message: format!("Failed to rename {} to {}", from.display(), to.display()),
            path: Some(to.to_path_buf()),
            source: Some(e),
        }
    })
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        process::id(),
        thread_id()
    ))
}

/// Get a unique thread identifier.
fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}
