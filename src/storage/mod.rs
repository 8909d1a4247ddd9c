//! Artifact storage backends
//!
//! The trainer persists everything through an [`ArtifactStore`]: the trainer
//! snapshot, per-model artifacts and info records, cached out-of-fold
//! forecasts and the training data. Paths are opaque keys to the store.

mod file;
mod memory;

pub use file::FileArtifactStore;
pub use memory::InMemoryArtifactStore;

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Trainer snapshot file name under the trainer root
pub const TRAINER_FILE: &str = "trainer.json";
/// Trainer info record under the trainer root
pub const INFO_FILE: &str = "info.json";
/// Directory holding one subdirectory per model
pub const MODELS_DIR: &str = "models";
/// Fitted model artifact inside a model directory
pub const MODEL_FILE: &str = "model.json";
/// Per-model info record inside a model directory
pub const MODEL_INFO_FILE: &str = "info.json";
/// Cached out-of-fold forecasts inside a model directory
pub const OOF_FILE: &str = "oof.json";
/// Directory of cached datasets under the trainer root
pub const DATA_DIR: &str = "utils/data";

/// Byte-oriented storage keyed by path
pub trait ArtifactStore: Send + Sync + fmt::Debug {
    /// Write `bytes` at `path`, replacing any previous content
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Read the content stored at `path`
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Whether content exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Remove `path` and anything stored below it
    fn remove(&self, path: &Path) -> Result<()>;
}

/// Serialize `value` as pretty JSON into the store
pub fn save_json<T: Serialize + ?Sized>(store: &dyn ArtifactStore, path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.write(path, &bytes)
}

/// Read and deserialize a JSON document from the store
pub fn load_json<T: DeserializeOwned>(store: &dyn ArtifactStore, path: &Path) -> Result<T> {
    let bytes = store.read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Directory of the named model under `root`
pub fn model_dir(root: &Path, name: &str) -> PathBuf {
    root.join(MODELS_DIR).join(name)
}

/// Path of a cached dataset (`train` or `val`)
pub fn data_path(root: &Path, which: &str) -> PathBuf {
    root.join(DATA_DIR).join(format!("{}.json", which))
}
