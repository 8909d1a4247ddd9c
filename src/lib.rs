//! Kolosal Trainer - model-graph training orchestrator
//!
//! Trains a set of candidate forecasting models under a shared time budget,
//! records which models consume which other models' predictions, builds a
//! weighted ensemble over the successful ones and can refit any part of the
//! graph on the full data.
//!
//! # Modules
//!
//! ## Orchestration
//! - [`trainer`] - `Trainer` facade: fit, predict, score, leaderboard, refit-full
//! - [`graph`] - Model dependency graph and per-model records
//!
//! ## Models
//! - [`models`] - `ForecastModel` capability interface, baselines, weighted ensemble
//! - [`tuning`] - Search spaces and trial samplers
//! - [`metrics`] - Forecast metrics and the higher-is-better scorer
//!
//! ## Infrastructure
//! - [`data`] - Multi-item time series frames and forecasts
//! - [`storage`] - Artifact stores (filesystem and in-memory)
//! - [`resources`] - CPU/GPU probing
//! - [`config`] - Trainer and fit configuration
//! - [`logging`] - tracing subscriber setup

// Core error handling
pub mod error;

// Orchestration
pub mod graph;
pub mod trainer;

// Models
pub mod metrics;
pub mod models;
pub mod tuning;

// Infrastructure
pub mod config;
pub mod data;
pub mod logging;
pub mod resources;
pub mod storage;

pub use error::{Result, TrainerError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, TrainerError};

    // Orchestration
    pub use crate::graph::{Attribute, AttributeValue, ModelGraph, ModelRecord};
    pub use crate::trainer::{Leaderboard, LeaderboardRow, Trainer, TrainerInfo};

    // Configuration
    pub use crate::config::{FitOptions, TrainerConfig, TuningConfig};

    // Data
    pub use crate::data::{Forecast, TimeSeriesFrame};

    // Models
    pub use crate::models::{
        FitContext, ForecastModel, ModelInputs, ModelRegistry, ModelState, WeightedEnsemble,
    };

    // Tuning
    pub use crate::tuning::{ModelSpec, SamplerType, Space};

    // Storage
    pub use crate::storage::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore};

    // Resources
    pub use crate::resources::{FixedResources, ResourceProvider, SystemResources};
}
