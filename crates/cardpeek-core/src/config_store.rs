//! Persistent key/value settings.
//!
//! Settings are kept as a flat JSON object of dotted keys, e.g.
//! `"smartcard_list.next_update": 1718000000`. The store is owned by the
//! controller and handed by `&mut` to whichever component needs to mutate it,
//! so there is never more than one writer.

use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
    dirty: bool,
}

impl ConfigStore {
    /// Create an empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load settings from `path`.
    ///
    /// A missing file yields an empty store. An unreadable or corrupt file is
    /// logged and also yields an empty store; it will be overwritten on the next
    /// save.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match atomic_read_json::<BTreeMap<String, Value>>(&path) {
            Ok(Some(values)) => {
                debug!("Loaded {} settings from {}", values.len(), path.display());
                values
            }
            Ok(None) => {
                debug!("No settings file at {}, using defaults", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                warn!("Ignoring unreadable settings file: {}", e);
                BTreeMap::new()
            }
        };

        Self {
            path,
            values,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Boolean setting, or `default` if missing or not a boolean.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// Integer setting, or `default` if missing or not an integer.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.values
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, Value::Bool(value));
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.set(key, Value::from(value));
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.set(key, Value::String(value.into()));
    }

    fn set(&mut self, key: &str, value: Value) {
        if self.values.get(key) != Some(&value) {
            self.values.insert(key.to_string(), value);
            self.dirty = true;
        }
    }

    /// Persist the store if it changed.
    ///
    /// Never creates the state directory: when it does not exist (the user
    /// declined to create it) nothing is written and `Ok(false)` is returned.
    pub fn save(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        match self.path.parent() {
            Some(parent) if parent.is_dir() => {}
            _ => {
                debug!(
                    "Not saving settings: directory of {} does not exist",
                    self.path.display()
                );
                return Ok(false);
            }
        }

        atomic_write_json(&self.path, &self.values)?;
        self.dirty = false;
        debug!("Saved settings to {}", self.path.display());
        Ok(true)
    }
}
