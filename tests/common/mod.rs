//! Shared fixtures for the integration tests

#![allow(dead_code)]

use kolosal_trainer::config::TrainerConfig;
use kolosal_trainer::data::{Forecast, TimeSeriesFrame};
use kolosal_trainer::error::{Result, TrainerError};
use kolosal_trainer::models::{
    load_as, FitContext, ForecastModel, ModelInputs, ModelRegistry, ModelState,
};
use kolosal_trainer::resources::FixedResources;
use kolosal_trainer::storage::InMemoryArtifactStore;
use kolosal_trainer::trainer::Trainer;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Always errors during fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailingModel {
    state: ModelState,
}

impl ForecastModel for FailingModel {
    fn model_type(&self) -> &'static str {
        "Failing"
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn fit(&mut self, _train: &TimeSeriesFrame, _val: Option<&TimeSeriesFrame>, _ctx: &FitContext) -> Result<()> {
        Err(TrainerError::TrainingFailure("fit always fails".to_string()))
    }

    fn predict(&self, _inputs: &ModelInputs<'_>, _known: Option<&TimeSeriesFrame>) -> Result<Forecast> {
        Err(TrainerError::PredictionError("never fitted".to_string()))
    }

    fn clone_box(&self) -> Box<dyn ForecastModel> {
        Box::new(self.clone())
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Panics during fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanickingModel {
    state: ModelState,
}

impl ForecastModel for PanickingModel {
    fn model_type(&self) -> &'static str {
        "Panicking"
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn fit(&mut self, _train: &TimeSeriesFrame, _val: Option<&TimeSeriesFrame>, _ctx: &FitContext) -> Result<()> {
        panic!("model blew up")
    }

    fn predict(&self, _inputs: &ModelInputs<'_>, _known: Option<&TimeSeriesFrame>) -> Result<Forecast> {
        Err(TrainerError::PredictionError("never fitted".to_string()))
    }

    fn clone_box(&self) -> Box<dyn ForecastModel> {
        Box::new(self.clone())
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Forecasts each item's training mean; unseen items fail at prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemMeanModel {
    state: ModelState,
    #[serde(default)]
    means: BTreeMap<String, f64>,
}

impl ForecastModel for ItemMeanModel {
    fn model_type(&self) -> &'static str {
        "ItemMean"
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn fit(&mut self, train: &TimeSeriesFrame, _val: Option<&TimeSeriesFrame>, _ctx: &FitContext) -> Result<()> {
        self.means = train
            .iter()
            .map(|(item, series)| (item.clone(), series.target.mean().unwrap_or(0.0)))
            .collect();
        Ok(())
    }

    fn predict(&self, inputs: &ModelInputs<'_>, _known: Option<&TimeSeriesFrame>) -> Result<Forecast> {
        let data = inputs.data(&self.state.name)?;
        let pl = self.state.prediction_length;
        let mut forecast = Forecast::new(pl);
        for (item, _) in data.iter() {
            let mean = self.means.get(item).ok_or_else(|| {
                TrainerError::PredictionError(format!("item {} was not seen during fit", item))
            })?;
            forecast.insert(item.clone(), Array1::from_elem(pl, *mean))?;
        }
        Ok(forecast)
    }

    fn clone_box(&self) -> Box<dyn ForecastModel> {
        Box::new(self.clone())
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Like [`ItemMeanModel`], but the second tuning trial of any tuned name fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlakyModel {
    state: ModelState,
    #[serde(default)]
    means: BTreeMap<String, f64>,
}

impl ForecastModel for FlakyModel {
    fn model_type(&self) -> &'static str {
        "Flaky"
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn fit(&mut self, train: &TimeSeriesFrame, _val: Option<&TimeSeriesFrame>, _ctx: &FitContext) -> Result<()> {
        if self.state.name.ends_with("/T2") {
            return Err(TrainerError::TrainingFailure("second trial fails".to_string()));
        }
        self.means = train
            .iter()
            .map(|(item, series)| (item.clone(), series.target.mean().unwrap_or(0.0)))
            .collect();
        Ok(())
    }

    fn predict(&self, inputs: &ModelInputs<'_>, _known: Option<&TimeSeriesFrame>) -> Result<Forecast> {
        let data = inputs.data(&self.state.name)?;
        let pl = self.state.prediction_length;
        let mut forecast = Forecast::new(pl);
        for (item, _) in data.iter() {
            let mean = self.means.get(item).copied().unwrap_or(0.0);
            forecast.insert(item.clone(), Array1::from_elem(pl, mean))?;
        }
        Ok(forecast)
    }

    fn clone_box(&self) -> Box<dyn ForecastModel> {
        Box::new(self.clone())
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Built-in models plus the test models above
pub fn registry() -> Arc<ModelRegistry> {
    let registry = ModelRegistry::with_defaults()
        .with_model(
            "Failing",
            |state| Ok(Box::new(FailingModel { state })),
            load_as::<FailingModel>,
        )
        .with_model(
            "Panicking",
            |state| Ok(Box::new(PanickingModel { state })),
            load_as::<PanickingModel>,
        )
        .with_model(
            "ItemMean",
            |state| {
                Ok(Box::new(ItemMeanModel {
                    state,
                    means: BTreeMap::new(),
                }))
            },
            load_as::<ItemMeanModel>,
        )
        .with_model(
            "Flaky",
            |state| {
                Ok(Box::new(FlakyModel {
                    state,
                    means: BTreeMap::new(),
                }))
            },
            load_as::<FlakyModel>,
        );
    Arc::new(registry)
}

/// Two items with a weekly pattern and a mild trend
pub fn sample_frame(length: usize) -> TimeSeriesFrame {
    let series = |offset: f64| -> Vec<f64> {
        (0..length)
            .map(|t| offset + (t % 7) as f64 + 0.1 * t as f64)
            .collect()
    };
    TimeSeriesFrame::new()
        .with_freq("D")
        .with_series("a", series(10.0))
        .with_series("b", series(50.0))
}

pub fn config() -> TrainerConfig {
    TrainerConfig::default()
        .with_prediction_length(3)
        .with_random_seed(Some(42))
}

/// Trainer backed by an in-memory store
pub fn memory_trainer(config: TrainerConfig) -> Trainer {
    Trainer::new("/virtual/run", config)
        .unwrap()
        .with_store(Arc::new(InMemoryArtifactStore::new()))
        .with_registry(registry())
        .with_resources(Arc::new(FixedResources::new(2, 0)))
}

/// Fresh directory under the system temp dir
pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "kolosal_trainer_{}_{}_{}",
        tag,
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Recursively copy a directory tree
pub fn copy_dir(from: &std::path::Path, to: &std::path::Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}
