//! In-memory store

use super::ArtifactStore;
use crate::error::{Result, TrainerError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Keeps artifacts in a map; useful for tests and throwaway trainers
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    entries: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Stored paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.entries.read().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.entries.write().insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.entries.read().get(path).cloned().ok_or_else(|| {
            TrainerError::NotFoundError(format!("No artifact at {}", path.display()))
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries.read().contains_key(path)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.entries.write().retain(|key, _| !key.starts_with(path));
        Ok(())
    }
}
