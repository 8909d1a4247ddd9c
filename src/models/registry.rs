//! Model type registry
//!
//! Maps a model type tag to a constructor (used to turn a [`ModelSpec`] into
//! an unfitted model) and a loader (used to restore a saved artifact).
//!
//! [`ModelSpec`]: crate::tuning::ModelSpec

use super::{
    AverageModel, ForecastModel, ModelState, NaiveModel, SeasonalNaiveModel,
    SimpleExponentialSmoothing, WeightedEnsemble,
};
use crate::error::{Result, TrainerError};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;

/// Builds an unfitted model from its initial state
pub type BuildFn = fn(ModelState) -> Result<Box<dyn ForecastModel>>;

/// Restores a fitted model from its artifact
pub type LoadFn = fn(serde_json::Value) -> Result<Box<dyn ForecastModel>>;

#[derive(Clone, Copy)]
struct Entry {
    build: BuildFn,
    load: LoadFn,
}

/// Registry of model implementations by type tag
#[derive(Clone, Default)]
pub struct ModelRegistry {
    entries: HashMap<String, Entry>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.entries.keys().collect();
        types.sort();
        f.debug_struct("ModelRegistry").field("types", &types).finish()
    }
}

/// Deserialize an artifact into a concrete model type
pub fn load_as<M>(artifact: serde_json::Value) -> Result<Box<dyn ForecastModel>>
where
    M: ForecastModel + DeserializeOwned + 'static,
{
    let model: M = serde_json::from_value(artifact)?;
    Ok(Box::new(model))
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in model
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            NaiveModel::TYPE,
            |state| Ok(Box::new(NaiveModel::new(state))),
            load_as::<NaiveModel>,
        );
        registry.register(
            SeasonalNaiveModel::TYPE,
            |state| Ok(Box::new(SeasonalNaiveModel::new(state)?)),
            load_as::<SeasonalNaiveModel>,
        );
        registry.register(
            AverageModel::TYPE,
            |state| Ok(Box::new(AverageModel::new(state)?)),
            load_as::<AverageModel>,
        );
        registry.register(
            SimpleExponentialSmoothing::TYPE,
            |state| Ok(Box::new(SimpleExponentialSmoothing::new(state)?)),
            load_as::<SimpleExponentialSmoothing>,
        );
        registry.register(
            WeightedEnsemble::TYPE,
            |state| Ok(Box::new(WeightedEnsemble::new(state)?)),
            load_as::<WeightedEnsemble>,
        );
        registry
    }

    /// Register (or replace) a model type
    pub fn register(&mut self, model_type: impl Into<String>, build: BuildFn, load: LoadFn) {
        self.entries.insert(model_type.into(), Entry { build, load });
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_model(mut self, model_type: impl Into<String>, build: BuildFn, load: LoadFn) -> Self {
        self.register(model_type, build, load);
        self
    }

    pub fn contains(&self, model_type: &str) -> bool {
        self.entries.contains_key(model_type)
    }

    /// Registered type tags, sorted
    pub fn model_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.entries.keys().cloned().collect();
        types.sort();
        types
    }

    fn entry(&self, model_type: &str) -> Result<&Entry> {
        self.entries.get(model_type).ok_or_else(|| {
            TrainerError::NotFoundError(format!(
                "Unknown model type '{}', registered types: {:?}",
                model_type,
                self.model_types()
            ))
        })
    }

    /// Construct an unfitted model
    pub fn build(&self, model_type: &str, state: ModelState) -> Result<Box<dyn ForecastModel>> {
        (self.entry(model_type)?.build)(state)
    }

    /// Restore a fitted model from its artifact
    pub fn load(&self, model_type: &str, artifact: serde_json::Value) -> Result<Box<dyn ForecastModel>> {
        (self.entry(model_type)?.load)(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TimeSeriesFrame;
    use crate::models::{FitContext, ModelInputs};

    #[test]
    fn test_defaults_registered() {
        let registry = ModelRegistry::with_defaults();
        assert!(registry.contains("Naive"));
        assert!(registry.contains("WeightedEnsemble"));
        assert_eq!(registry.model_types().len(), 5);
    }

    #[test]
    fn test_unknown_type() {
        let registry = ModelRegistry::with_defaults();
        let err = registry.build("DeepAR", ModelState::new("DeepAR", 1)).unwrap_err();
        assert!(matches!(err, TrainerError::NotFoundError(_)));
    }

    #[test]
    fn test_artifact_roundtrip() {
        let registry = ModelRegistry::with_defaults();
        let frame = TimeSeriesFrame::new().with_series("a", vec![1.0, 2.0, 3.0]);
        let mut model = registry.build("Naive", ModelState::new("Naive", 2)).unwrap();
        model.fit(&frame, None, &FitContext::default()).unwrap();

        let restored = registry.load("Naive", model.to_artifact().unwrap()).unwrap();
        assert_eq!(restored.state(), model.state());
        let forecast = restored.predict(&ModelInputs::Data(&frame), None).unwrap();
        assert_eq!(forecast.get("a").unwrap().to_vec(), vec![3.0, 3.0]);
    }
}
