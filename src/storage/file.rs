//! Local filesystem store

use super::ArtifactStore;
use crate::error::{Result, TrainerError};
use std::fs;
use std::path::Path;

/// Stores artifacts as files; paths are used as given
#[derive(Debug, Clone, Copy, Default)]
pub struct FileArtifactStore;

impl FileArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactStore for FileArtifactStore {
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        if !path.exists() {
            return Err(TrainerError::NotFoundError(format!(
                "No artifact at {}",
                path.display()
            )));
        }
        Ok(fs::read(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
