//! Calibration persistence over a string key-value store.
//!
//! Loading never fails: missing keys fall back to defaults one by one, and
//! unreadable or implausible values are logged and replaced by defaults.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use eyre::WrapErr;
use shutter_traits::{HwResult, KeyValueStore};

use crate::error::{Result, ShutterError};
use crate::hw_error::map_hw_error;
use crate::position::CalibrationEndpoints;

pub const OPEN_KEY: &str = "shutter.open_distance_cm";
pub const CLOSED_KEY: &str = "shutter.closed_distance_cm";

/// Reads and writes [`CalibrationEndpoints`] through a [`KeyValueStore`].
pub struct CalibrationStore<K: KeyValueStore> {
    kv: K,
}

impl<K: KeyValueStore> CalibrationStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Stored endpoints, or `None` when neither key holds a usable value.
    /// A single missing key takes the compiled-in default.
    pub fn load(&self) -> Option<CalibrationEndpoints> {
        let open = self.read_cm(OPEN_KEY);
        let closed = self.read_cm(CLOSED_KEY);
        if open.is_none() && closed.is_none() {
            return None;
        }
        let d = CalibrationEndpoints::default();
        Some(CalibrationEndpoints::new(
            open.unwrap_or(d.open_distance_cm),
            closed.unwrap_or(d.closed_distance_cm),
        ))
    }

    /// Like [`load`](Self::load) but each missing key falls back to `defaults`.
    pub fn load_or(&self, defaults: CalibrationEndpoints) -> CalibrationEndpoints {
        CalibrationEndpoints::new(
            self.read_cm(OPEN_KEY).unwrap_or(defaults.open_distance_cm),
            self.read_cm(CLOSED_KEY)
                .unwrap_or(defaults.closed_distance_cm),
        )
    }

    /// Persist both endpoints in one write, so a failure never leaves a
    /// new open endpoint paired with an old closed one.
    pub fn save(&mut self, endpoints: &CalibrationEndpoints) -> Result<()> {
        let open = endpoints.open_distance_cm.to_string();
        let closed = endpoints.closed_distance_cm.to_string();
        self.kv
            .set_many(&[(OPEN_KEY, open.as_str()), (CLOSED_KEY, closed.as_str())])
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("saving calibration")?;
        tracing::debug!(
            open_cm = endpoints.open_distance_cm,
            closed_cm = endpoints.closed_distance_cm,
            "calibration persisted"
        );
        Ok(())
    }

    fn read_cm(&self, key: &str) -> Option<f32> {
        let raw = match self.kv.get(key) {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "calibration store unreadable; using default");
                return None;
            }
        };
        match raw.trim().parse::<f32>() {
            Ok(cm) if cm.is_finite() && cm > 0.0 => Some(cm),
            _ => {
                tracing::warn!(key, value = %raw, "invalid stored calibration value; using default");
                None
            }
        }
    }
}

/// In-process store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    map: Arc<Mutex<HashMap<String, String>>>,
    read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail; reads still work.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, key: &str, value: &str) {
        if let Ok(mut m) = self.map.lock() {
            m.insert(key.to_string(), value.to_string());
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> HwResult<Option<String>> {
        let m = self
            .map
            .lock()
            .map_err(|_| std::io::Error::other("memory store poisoned"))?;
        Ok(m.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> HwResult<()> {
        self.set_many(&[(key, value)])
    }

    fn set_many(&mut self, entries: &[(&str, &str)]) -> HwResult<()> {
        if self.read_only {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "store is read-only",
            )));
        }
        let mut m = self
            .map
            .lock()
            .map_err(|_| std::io::Error::other("memory store poisoned"))?;
        for (key, value) in entries {
            m.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }
}

/// Flat table of string values in a TOML file.
///
/// Every write rewrites the whole file through a temp file and a rename, so
/// a crash mid-write leaves the previous contents intact. `set_many` commits
/// all its keys in that single rewrite.
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> std::result::Result<toml::Table, ShutterError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(toml::Table::new()),
            Err(e) => return Err(ShutterError::Io(format!("{}: {e}", self.path.display()))),
        };
        text.parse::<toml::Table>()
            .map_err(|e| ShutterError::Config(format!("{}: {e}", self.path.display())))
    }
}

impl KeyValueStore for TomlFileStore {
    fn get(&self, key: &str) -> HwResult<Option<String>> {
        let table = self.read_table()?;
        Ok(match table.get(key) {
            Some(toml::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        })
    }

    fn set(&mut self, key: &str, value: &str) -> HwResult<()> {
        self.set_many(&[(key, value)])
    }

    fn set_many(&mut self, entries: &[(&str, &str)]) -> HwResult<()> {
        let mut table = self.read_table()?;
        for (key, value) in entries {
            table.insert((*key).to_string(), toml::Value::String((*value).to_string()));
        }
        let text = toml::to_string(&table)?;
        write_atomic(&self.path, text.as_bytes())?;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_loads_nothing() {
        let store = CalibrationStore::new(MemoryStore::new());
        assert_eq!(store.load(), None);
        assert_eq!(
            store.load_or(CalibrationEndpoints::new(20.0, 80.0)),
            CalibrationEndpoints::new(20.0, 80.0)
        );
    }

    #[test]
    fn each_key_falls_back_independently() {
        let kv = MemoryStore::new();
        kv.insert(CLOSED_KEY, "150.5");
        let store = CalibrationStore::new(kv.clone());
        assert_eq!(store.load(), Some(CalibrationEndpoints::new(10.0, 150.5)));

        kv.insert(OPEN_KEY, "not-a-number");
        assert_eq!(
            store.load_or(CalibrationEndpoints::new(30.0, 90.0)),
            CalibrationEndpoints::new(30.0, 150.5)
        );
    }

    #[test]
    fn rejects_non_positive_values() {
        let kv = MemoryStore::new();
        kv.insert(OPEN_KEY, "-4");
        kv.insert(CLOSED_KEY, "inf");
        assert_eq!(CalibrationStore::new(kv).load(), None);
    }

    /// Accepts only batched writes.
    #[derive(Default)]
    struct BatchOnly {
        batches: Vec<Vec<(String, String)>>,
    }

    impl KeyValueStore for BatchOnly {
        fn get(&self, _key: &str) -> HwResult<Option<String>> {
            Ok(None)
        }
        fn set(&mut self, key: &str, _value: &str) -> HwResult<()> {
            Err(Box::new(std::io::Error::other(format!("single write of {key}"))))
        }
        fn set_many(&mut self, entries: &[(&str, &str)]) -> HwResult<()> {
            self.batches.push(
                entries
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            );
            Ok(())
        }
    }

    #[test]
    fn save_commits_both_endpoints_together() {
        let mut store = CalibrationStore::new(BatchOnly::default());
        store.save(&CalibrationEndpoints::new(12.5, 170.0)).unwrap();
        assert_eq!(
            store.kv.batches,
            vec![vec![
                (OPEN_KEY.to_string(), "12.5".to_string()),
                (CLOSED_KEY.to_string(), "170".to_string()),
            ]]
        );
    }

    #[test]
    fn read_only_store_fails_to_save() {
        let mut store = CalibrationStore::new(MemoryStore::read_only());
        let err = store
            .save(&CalibrationEndpoints::new(12.0, 170.0))
            .expect_err("read-only");
        assert!(matches!(
            err.downcast_ref::<ShutterError>(),
            Some(ShutterError::Io(_))
        ));
    }
}
