//! Trainer configuration

use crate::error::{Result, TrainerError};
use crate::metrics::metric_from_name;
use crate::tuning::SamplerType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of a trainer instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Forecast horizon in time steps
    pub prediction_length: usize,

    /// Metric used for validation scores
    pub eval_metric: String,

    /// Seasonal period for scaled metrics (defaults to 1)
    pub eval_metric_seasonal_period: Option<usize>,

    /// Trailing windows held out for validation when no val data is given
    pub num_val_windows: usize,

    /// Whether to fit a weighted ensemble after the base models
    pub enable_ensemble: bool,

    /// Greedy selection rounds of the ensemble
    pub ensemble_size: usize,

    /// Whether to cache train/val data next to the models
    pub save_data: bool,

    /// Reload models from the store instead of keeping them in memory
    pub low_memory: bool,

    /// Covariates whose future values are known at prediction time
    pub known_covariates_names: Vec<String>,

    /// Log verbosity (0 = errors only .. 4 = trace)
    pub verbosity: u8,

    /// Seed for tuning samplers
    pub random_seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            prediction_length: 1,
            eval_metric: "MASE".to_string(),
            eval_metric_seasonal_period: None,
            num_val_windows: 1,
            enable_ensemble: true,
            ensemble_size: 100,
            save_data: true,
            low_memory: true,
            known_covariates_names: Vec::new(),
            verbosity: 2,
            random_seed: Some(0),
        }
    }
}

impl TrainerConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the forecast horizon
    pub fn with_prediction_length(mut self, prediction_length: usize) -> Self {
        self.prediction_length = prediction_length;
        self
    }

    /// Builder method to set the evaluation metric
    pub fn with_eval_metric(mut self, metric: impl Into<String>) -> Self {
        self.eval_metric = metric.into();
        self
    }

    /// Builder method to set the metric seasonal period
    pub fn with_seasonal_period(mut self, period: usize) -> Self {
        self.eval_metric_seasonal_period = Some(period);
        self
    }

    /// Builder method to set the number of validation windows
    pub fn with_num_val_windows(mut self, n: usize) -> Self {
        self.num_val_windows = n;
        self
    }

    /// Builder method to toggle ensembling
    pub fn with_ensemble(mut self, enabled: bool) -> Self {
        self.enable_ensemble = enabled;
        self
    }

    /// Builder method to set ensemble selection rounds
    pub fn with_ensemble_size(mut self, size: usize) -> Self {
        self.ensemble_size = size;
        self
    }

    /// Builder method to toggle data caching
    pub fn with_save_data(mut self, save: bool) -> Self {
        self.save_data = save;
        self
    }

    /// Builder method to toggle the in-memory model cache
    pub fn with_low_memory(mut self, low_memory: bool) -> Self {
        self.low_memory = low_memory;
        self
    }

    /// Builder method to set known covariates
    pub fn with_known_covariates(mut self, names: Vec<String>) -> Self {
        self.known_covariates_names = names;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_random_seed(mut self, seed: Option<u64>) -> Self {
        self.random_seed = seed;
        self
    }

    /// Check values that do not depend on the data
    pub fn validate(&self) -> Result<()> {
        if self.prediction_length == 0 {
            return Err(TrainerError::ConfigError(
                "prediction_length must be at least 1".to_string(),
            ));
        }
        if self.ensemble_size == 0 {
            return Err(TrainerError::ConfigError(
                "ensemble_size must be at least 1".to_string(),
            ));
        }
        if self.eval_metric_seasonal_period == Some(0) {
            return Err(TrainerError::ConfigError(
                "eval_metric_seasonal_period must be at least 1".to_string(),
            ));
        }
        metric_from_name(&self.eval_metric)?;
        Ok(())
    }

    /// Load a config from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Settings of a hyperparameter tuning pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Trials per model; defaults to 10 when no time limit is given either
    pub num_trials: Option<usize>,
    pub sampler: SamplerType,
    /// Overrides the trainer seed when set
    pub random_seed: Option<u64>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            num_trials: None,
            sampler: SamplerType::Random,
            random_seed: None,
        }
    }
}

impl TuningConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the trial count
    pub fn with_num_trials(mut self, n: usize) -> Self {
        self.num_trials = Some(n);
        self
    }

    /// Builder method to set the sampler
    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
}

/// Per-call options of `Trainer::fit`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitOptions {
    /// Wall-clock budget in seconds for the whole call
    pub time_limit: Option<f64>,
    /// Tune models that declare search spaces
    pub tuning: Option<TuningConfig>,
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the time limit
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Builder method to request hyperparameter tuning
    pub fn with_tuning(mut self, tuning: TuningConfig) -> Self {
        self.tuning = Some(tuning);
        self
    }
}
