//! Persisted key/value settings.
//!
//! This is an external collaborator, not part of the cache core, included
//! here only because its on-disk format is the same portable binary
//! codec applied to a single `{string -> value}` map — a second real
//! consumer of that codec, stored at `<documents>/_persist_values`.

pub mod errors;

use std::collections::HashMap;
use std::path::PathBuf;

use codec::Value;

use crate::errors::PersistError;

/// A single encoded `{string -> value}` map, read and written in one shot.
#[derive(Debug, Clone, Default)]
pub struct PersistValues {
    path: PathBuf,
    values: HashMap<String, Value>,
}

impl PersistValues {
    /// Opens the persistence file at the OS-conventional location
    /// (`<documents>/_persist_values`), starting from an empty map if it
    /// does not yet exist.
    pub fn open() -> Result<Self, PersistError> {
        let path = storage::paths::persist_values_path().ok_or(PersistError::NoDataDir)?;
        Self::open_at(path)
    }

    /// Opens (or initializes) the persistence file at an explicit path.
    /// Intended for tests and for callers that don't want the OS-default
    /// location.
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();

        let values = match std::fs::read(&path) {
            Ok(bytes) => match Value::decode_from_slice(&bytes)? {
                Value::Map(pairs) => pairs
                    .into_iter()
                    .filter_map(|(k, v)| match k {
                        Value::String(s) => Some((s, v)),
                        _ => None,
                    })
                    .collect(),
                _ => HashMap::new(),
            },
            Err(_) => HashMap::new(),
        };

        Ok(PersistValues { path, values })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Encodes the whole map and overwrites the persistence file.
    pub fn save(&self) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let map = Value::Map(
            self.values
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect(),
        );
        let encoded = map.encode_to_vec()?;
        std::fs::write(&self.path, encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "persist-values-test-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn missing_file_starts_empty() {
        let path = scratch_path("missing");
        let store = PersistValues::open_at(&path).unwrap();
        assert_eq!(store.get("anything"), None);
    }

    #[test]
    fn round_trips_through_save_and_reopen() {
        let path = scratch_path("roundtrip");
        let mut store = PersistValues::open_at(&path).unwrap();
        store.set("volume", Value::Int(7));
        store.set("theme", Value::String("dark".into()));
        store.save().unwrap();

        let reopened = PersistValues::open_at(&path).unwrap();
        assert_eq!(reopened.get("volume"), Some(&Value::Int(7)));
        assert_eq!(
            reopened.get("theme"),
            Some(&Value::String("dark".into()))
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn remove_drops_a_key() {
        let path = scratch_path("remove");
        let mut store = PersistValues::open_at(&path).unwrap();
        store.set("a", Value::Bool(true));
        store.remove("a");
        assert_eq!(store.get("a"), None);
    }
}
