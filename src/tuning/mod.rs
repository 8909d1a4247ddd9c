//! Hyperparameter tuning primitives
//!
//! The trainer only wires a time budget into the trial loop; the search itself
//! is delegated to a [`Sampler`].

mod sampler;
mod search_space;

pub use sampler::{create_sampler, DefaultFirstSampler, RandomSampler, Sampler, SamplerType};
pub use search_space::{Hyperparameter, ModelSpec, Params, Space};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Trial count used when neither a trial count nor a time limit is given
pub const DEFAULT_NUM_TRIALS: usize = 10;

/// Outcome of one tuning trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpoTrial {
    /// Where the trial's model artifact was written
    pub path: PathBuf,
    /// Validation score of the trial, if it was scored
    pub val_score: Option<f64>,
    /// Concrete hyperparameters used
    pub hyperparameters: Params,
}
