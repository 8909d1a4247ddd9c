//! Forecasting model capability interface and built-in models
//!
//! Every model the trainer handles implements [`ForecastModel`]. The trainer
//! never looks inside a model; it only relies on the capability flags
//! (`can_refit_full`, `is_ensemble`) and the conversion methods used by
//! refit-full.

mod baselines;
mod ensemble;
mod registry;

pub use baselines::{AverageModel, NaiveModel, SeasonalNaiveModel, SimpleExponentialSmoothing};
pub use ensemble::WeightedEnsemble;
pub use registry::{load_as, BuildFn, LoadFn, ModelRegistry};

use crate::data::{Forecast, TimeSeriesFrame};
use crate::error::{Result, TrainerError};
use crate::tuning::Params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Suffix appended to the name of a model's refit-on-full-data counterpart
pub const REFIT_FULL_SUFFIX: &str = "_FULL";

/// Name of the refit-full counterpart of `name`
pub fn full_name(name: &str) -> String {
    format!("{}{}", name, REFIT_FULL_SUFFIX)
}

/// Bookkeeping shared by every model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    /// Unique name within one trainer
    pub name: String,
    /// Storage location of the model's artifacts
    pub path: PathBuf,
    /// Forecast horizon
    pub prediction_length: usize,
    /// Hyperparameters the model was built with
    #[serde(default)]
    pub hyperparameters: Params,
    /// Fit wall time in seconds
    pub fit_time: Option<f64>,
    /// Validation prediction wall time in seconds
    pub predict_time: Option<f64>,
    /// Validation score, higher is better
    pub val_score: Option<f64>,
}

impl ModelState {
    pub fn new(name: impl Into<String>, prediction_length: usize) -> Self {
        Self {
            name: name.into(),
            path: PathBuf::new(),
            prediction_length,
            hyperparameters: Params::new(),
            fit_time: None,
            predict_time: None,
            val_score: None,
        }
    }

    /// Builder method to set hyperparameters
    pub fn with_hyperparameters(mut self, hyperparameters: Params) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    /// Builder method to set the artifact path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Read an optional float hyperparameter
    pub fn param_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.hyperparameters.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| {
                TrainerError::InvalidParameter {
                    name: key.to_string(),
                    value: value.to_string(),
                    reason: "expected a number".to_string(),
                }
            }),
        }
    }

    /// Read an optional positive integer hyperparameter
    pub fn param_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.hyperparameters.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => match value.as_u64() {
                Some(v) if v > 0 => Ok(Some(v as usize)),
                _ => Err(TrainerError::InvalidParameter {
                    name: key.to_string(),
                    value: value.to_string(),
                    reason: "expected a positive integer".to_string(),
                }),
            },
        }
    }
}

/// Per-fit settings handed to a model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitContext {
    /// Seconds the model may spend fitting, if limited
    pub time_limit: Option<f64>,
    /// CPUs the model may use
    pub num_cpus: usize,
    /// GPUs the model may use
    pub num_gpus: usize,
}

/// What a model consumes at prediction time
#[derive(Debug, Clone, Copy)]
pub enum ModelInputs<'a> {
    /// Raw history, for models that learn from the data
    Data(&'a TimeSeriesFrame),
    /// Forecasts of base models keyed by model name, for ensembles
    Predictions(&'a BTreeMap<String, Forecast>),
}

impl<'a> ModelInputs<'a> {
    /// The raw frame, or a prediction error naming the model
    pub fn data(&self, model: &str) -> Result<&'a TimeSeriesFrame> {
        match self {
            ModelInputs::Data(frame) => Ok(frame),
            ModelInputs::Predictions(_) => Err(TrainerError::PredictionError(format!(
                "Model {} expects raw data, got base model predictions",
                model
            ))),
        }
    }

    /// The base model forecasts, or a prediction error naming the model
    pub fn predictions(&self, model: &str) -> Result<&'a BTreeMap<String, Forecast>> {
        match self {
            ModelInputs::Predictions(preds) => Ok(preds),
            ModelInputs::Data(_) => Err(TrainerError::PredictionError(format!(
                "Ensemble {} expects base model predictions, got raw data",
                model
            ))),
        }
    }
}

/// Summary record written next to every saved model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub model_type: String,
    pub prediction_length: usize,
    pub hyperparameters: Params,
    pub fit_time: Option<f64>,
    pub predict_time: Option<f64>,
    pub val_score: Option<f64>,
    pub can_refit_full: bool,
    pub base_models: Option<Vec<String>>,
}

/// Capability interface of a trainable forecasting model
pub trait ForecastModel: Send + Sync + fmt::Debug {
    /// Registry tag of the implementation
    fn model_type(&self) -> &'static str;

    fn state(&self) -> &ModelState;

    fn state_mut(&mut self) -> &mut ModelState;

    /// Fit on `train`; `val` is only a hint and may be ignored
    fn fit(
        &mut self,
        train: &TimeSeriesFrame,
        val: Option<&TimeSeriesFrame>,
        ctx: &FitContext,
    ) -> Result<()>;

    /// Forecast `prediction_length` steps past the end of every item
    fn predict(
        &self,
        inputs: &ModelInputs<'_>,
        known_covariates: Option<&TimeSeriesFrame>,
    ) -> Result<Forecast>;

    fn clone_box(&self) -> Box<dyn ForecastModel>;

    /// Serializable form of the fitted model
    fn to_artifact(&self) -> Result<serde_json::Value>;

    /// Whether the model can be retrained from scratch on all data
    fn can_refit_full(&self) -> bool {
        false
    }

    /// Whether the model consumes other models' predictions
    fn is_ensemble(&self) -> bool {
        false
    }

    /// Models whose predictions this model consumes
    fn base_model_names(&self) -> Option<Vec<String>> {
        None
    }

    /// Point base model references at renamed models
    fn remap_base_models(&mut self, _names: &BTreeMap<String, String>) {}

    /// Untrained copy with the same hyperparameters, named for refit-full
    fn refit_full_template(&self) -> Result<Box<dyn ForecastModel>> {
        Err(TrainerError::UnsupportedRefitError(format!(
            "{} ({}) cannot be refit from scratch",
            self.name(),
            self.model_type()
        )))
    }

    /// Copy of the fitted model, named for refit-full, without a validation score
    fn refit_full_copy(&self) -> Box<dyn ForecastModel> {
        let mut copy = self.clone_box();
        let state = copy.state_mut();
        state.name = full_name(&self.state().name);
        state.val_score = None;
        copy
    }

    fn name(&self) -> &str {
        &self.state().name
    }

    fn info(&self) -> ModelInfo {
        let state = self.state();
        ModelInfo {
            name: state.name.clone(),
            model_type: self.model_type().to_string(),
            prediction_length: state.prediction_length,
            hyperparameters: state.hyperparameters.clone(),
            fit_time: state.fit_time,
            predict_time: state.predict_time,
            val_score: state.val_score,
            can_refit_full: self.can_refit_full(),
            base_models: self.base_model_names(),
        }
    }
}

impl Clone for Box<dyn ForecastModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Fresh, unfitted state for the refit-full counterpart of `state`
pub(crate) fn refit_template_state(state: &ModelState) -> ModelState {
    ModelState::new(full_name(&state.name), state.prediction_length)
        .with_hyperparameters(state.hyperparameters.clone())
}
