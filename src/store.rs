//! Artifact storage: one named slot per problem.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::serde_model::SerializedMlp;
use crate::{Error, Result};

/// A persisted model with the time it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredModel {
    /// Milliseconds since the Unix epoch.
    pub saved_at_ms: u64,
    pub model: SerializedMlp,
}

pub trait ArtifactStore {
    /// Store `model` under `key`, replacing any previous artifact. Returns the
    /// save timestamp.
    fn put(&mut self, key: &str, model: &SerializedMlp) -> Result<u64>;

    /// Fails with [`Error::NotFound`] when nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<StoredModel>;

    fn exists(&self, key: &str) -> bool;
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, StoredModel>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&mut self, key: &str, model: &SerializedMlp) -> Result<u64> {
        let saved_at_ms = now_ms();
        self.entries.insert(
            key.to_owned(),
            StoredModel {
                saved_at_ms,
                model: model.clone(),
            },
        );
        Ok(saved_at_ms)
    }

    fn get(&self, key: &str) -> Result<StoredModel> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no saved model under {key:?}")))
    }

    fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// Keeps `<dir>/<key>.json` per artifact.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Use `dir`, creating it if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::Storage(format!("invalid artifact key {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl ArtifactStore for JsonDirStore {
    fn put(&mut self, key: &str, model: &SerializedMlp) -> Result<u64> {
        let path = self.path_for(key)?;
        let stored = StoredModel {
            saved_at_ms: now_ms(),
            model: model.clone(),
        };
        fs::write(&path, serde_json::to_string_pretty(&stored)?)?;
        debug!("saved {}", path.display());
        Ok(stored.saved_at_ms)
    }

    fn get(&self, key: &str) -> Result<StoredModel> {
        let path = self.path_for(key)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("no saved model under {key:?}")));
            }
            Err(e) => return Err(e.into()),
        };
        let stored: StoredModel = serde_json::from_str(&text)
            .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))?;
        stored.model.validate()?;
        Ok(stored)
    }

    fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_ok_and(|p| p.is_file())
    }
}
