//! Training orchestrator
//!
//! [`Trainer`] owns the model graph and drives everything around it:
//! scheduling fits under a time budget, building the weighted ensemble,
//! refitting on the full data, prediction with dependency resolution,
//! scoring, the leaderboard and persistence.

mod ensemble;
mod leaderboard;
mod refit;
mod scheduler;

pub use leaderboard::{Leaderboard, LeaderboardRow};
pub use scheduler::unique_name;

use crate::config::TrainerConfig;
use crate::data::{Forecast, TimeSeriesFrame};
use crate::error::{Result, TrainerError};
use crate::graph::ModelGraph;
use crate::logging;
use crate::metrics::Scorer;
use crate::models::{ForecastModel, ModelInfo, ModelInputs, ModelRegistry};
use crate::resources::{ResourceProvider, SystemResources};
use crate::storage::{
    self, data_path, load_json, save_json, ArtifactStore, FileArtifactStore, INFO_FILE,
    MODEL_FILE, MODEL_INFO_FILE, OOF_FILE, TRAINER_FILE,
};
use crate::tuning::HpoTrial;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Summary of a trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerInfo {
    pub best_model: Option<String>,
    pub best_model_score_val: Option<f64>,
    pub num_models_trained: usize,
    pub eval_metric: String,
    pub prediction_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<BTreeMap<String, ModelInfo>>,
}

/// Persisted trainer state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrainerSnapshot {
    path: PathBuf,
    config: TrainerConfig,
    graph: ModelGraph,
    model_best: Option<String>,
    model_full_dict: BTreeMap<String, String>,
    extra_banned_names: BTreeSet<String>,
    hpo_results: BTreeMap<String, BTreeMap<String, HpoTrial>>,
    is_data_saved: bool,
    saved_at: DateTime<Utc>,
}

/// Model-training orchestrator
pub struct Trainer {
    path: PathBuf,
    config: TrainerConfig,
    scorer: Scorer,
    graph: ModelGraph,
    model_best: Option<String>,
    model_full_dict: BTreeMap<String, String>,
    extra_banned_names: BTreeSet<String>,
    hpo_results: BTreeMap<String, BTreeMap<String, HpoTrial>>,
    is_data_saved: bool,
    store: Arc<dyn ArtifactStore>,
    registry: Arc<ModelRegistry>,
    resources: Arc<dyn ResourceProvider>,
    models: HashMap<String, Box<dyn ForecastModel>>,
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("models", &self.graph.model_names(None))
            .field("model_best", &self.model_best)
            .finish()
    }
}

impl Trainer {
    /// Create a trainer rooted at `path`, storing artifacts on the filesystem.
    ///
    /// Installs the fmt subscriber at `config.verbosity` unless the process
    /// already has a global subscriber.
    pub fn new(path: impl Into<PathBuf>, config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        if logging::init(config.verbosity) {
            debug!(verbosity = config.verbosity, "Installed log subscriber");
        }
        let scorer = Scorer::new(
            &config.eval_metric,
            config.prediction_length,
            config.eval_metric_seasonal_period,
        )?;
        Ok(Self {
            path: path.into(),
            config,
            scorer,
            graph: ModelGraph::new(),
            model_best: None,
            model_full_dict: BTreeMap::new(),
            extra_banned_names: BTreeSet::new(),
            hpo_results: BTreeMap::new(),
            is_data_saved: false,
            store: Arc::new(FileArtifactStore::new()),
            registry: Arc::new(ModelRegistry::with_defaults()),
            resources: Arc::new(SystemResources),
            models: HashMap::new(),
        })
    }

    /// Builder method to set the artifact store
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    /// Builder method to set the model registry
    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Builder method to set the resource provider
    pub fn with_resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = resources;
        self
    }

    /// Reserve names that new models must not take
    pub fn ban_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_banned_names.extend(names.into_iter().map(Into::into));
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Original model name to refit-full counterpart
    pub fn model_full_dict(&self) -> &BTreeMap<String, String> {
        &self.model_full_dict
    }

    /// Trials of each tuned model
    pub fn hpo_results(&self) -> &BTreeMap<String, BTreeMap<String, HpoTrial>> {
        &self.hpo_results
    }

    /// Registered model names in registration order, optionally at one level
    pub fn get_model_names(&self, level: Option<usize>) -> Vec<String> {
        self.graph.model_names(level)
    }

    /// Names new models may not use.
    ///
    /// Besides registered and reserved names this holds every tuned model
    /// name and its trial names, since trials are stored below the tuned
    /// model's directory.
    pub fn banned_names(&self) -> BTreeSet<String> {
        let mut banned: BTreeSet<String> = self.graph.model_names(None).into_iter().collect();
        banned.extend(self.extra_banned_names.iter().cloned());
        for (tuned, trials) in &self.hpo_results {
            banned.insert(tuned.clone());
            banned.extend(trials.keys().cloned());
        }
        banned
    }

    /// Best model by validation score (cached after the first lookup)
    pub fn get_model_best(&mut self) -> Result<String> {
        if let Some(best) = &self.model_best {
            return Ok(best.clone());
        }
        let best = self.graph.best_model()?;
        self.model_best = Some(best.clone());
        Ok(best)
    }

    fn model_path(&self, name: &str) -> PathBuf {
        storage::model_dir(&self.path, name)
    }

    /// Write a model's artifact and info record to its path
    fn save_model(&self, model: &dyn ForecastModel) -> Result<()> {
        let dir = &model.state().path;
        save_json(self.store.as_ref(), &dir.join(MODEL_FILE), &model.to_artifact()?)?;
        save_json(self.store.as_ref(), &dir.join(MODEL_INFO_FILE), &model.info())?;
        Ok(())
    }

    /// Add a fitted (and saved) model to the graph
    fn register_model(&mut self, model: Box<dyn ForecastModel>, base_models: Option<&[String]>) -> Result<()> {
        self.graph.add_model(model.as_ref(), base_models)?;
        if !self.config.low_memory {
            self.models.insert(model.name().to_string(), model);
        }
        Ok(())
    }

    /// Load a registered model
    pub fn load_model(&self, name: &str) -> Result<Box<dyn ForecastModel>> {
        if let Some(model) = self.models.get(name) {
            return Ok(model.clone_box());
        }
        let record = self.graph.record(name)?;
        let artifact = load_json(self.store.as_ref(), &record.path.join(MODEL_FILE))?;
        let mut model = self.registry.load(&record.model_type, artifact)?;
        model.state_mut().path = record.path.clone();
        Ok(model)
    }

    fn save_oof(&self, model: &dyn ForecastModel, forecasts: &[Forecast]) -> Result<()> {
        save_json(self.store.as_ref(), &model.state().path.join(OOF_FILE), forecasts)
    }

    /// Cached out-of-fold forecasts of a model, one per validation window
    pub fn load_oof(&self, name: &str) -> Result<Vec<Forecast>> {
        let record = self.graph.record(name)?;
        load_json(self.store.as_ref(), &record.path.join(OOF_FILE))
    }

    fn save_train_data(&self, data: &TimeSeriesFrame) -> Result<()> {
        save_json(self.store.as_ref(), &data_path(&self.path, "train"), data)
    }

    fn save_val_data(&self, data: &TimeSeriesFrame) -> Result<()> {
        save_json(self.store.as_ref(), &data_path(&self.path, "val"), data)
    }

    /// Training data cached by the first fit
    pub fn load_train_data(&self) -> Result<TimeSeriesFrame> {
        let path = data_path(&self.path, "train");
        if !self.store.exists(&path) {
            return Err(TrainerError::NotFoundError(format!(
                "No cached training data at {}",
                path.display()
            )));
        }
        load_json(self.store.as_ref(), &path)
    }

    /// Validation data cached by the first fit, if any was given
    pub fn load_val_data(&self) -> Result<Option<TimeSeriesFrame>> {
        let path = data_path(&self.path, "val");
        if !self.store.exists(&path) {
            return Ok(None);
        }
        load_json(self.store.as_ref(), &path).map(Some)
    }

    /// Predict with `model`, or with the best model when none is named.
    ///
    /// Every model the target depends on is evaluated first. A failure while
    /// predicting is logged and yields `Ok(None)`; an empty graph or an unknown
    /// model name is an error.
    pub fn predict(
        &mut self,
        data: &TimeSeriesFrame,
        known_covariates: Option<&TimeSeriesFrame>,
        model: Option<&str>,
    ) -> Result<Option<Forecast>> {
        let auto_selected = model.is_none();
        let name = match model {
            Some(name) => {
                if !self.graph.contains(name) {
                    return Err(TrainerError::NotFoundError(format!(
                        "Model '{}' is not registered",
                        name
                    )));
                }
                name.to_string()
            }
            None => {
                let best = self.get_model_best()?;
                info!(
                    model = %best,
                    "Model not specified in predict, defaulting to the model with the best validation score"
                );
                best
            }
        };

        match scheduler::catch_failure(|| self.predict_model(data, known_covariates, &name)) {
            Ok(forecast) => Ok(Some(forecast)),
            Err(err) => {
                error!(model = %name, error = %err, "Model failed during prediction");
                debug!(model = %name, error = ?err, "Prediction failure details");
                let others: Vec<String> = self
                    .graph
                    .model_names(None)
                    .into_iter()
                    .filter(|m| *m != name)
                    .collect();
                if auto_selected && !others.is_empty() {
                    info!(
                        models = ?others,
                        "You can call predict with one of the other available models"
                    );
                }
                Ok(None)
            }
        }
    }

    /// Forecast of `name`, computing its dependencies in registration order
    fn predict_model(
        &self,
        data: &TimeSeriesFrame,
        known_covariates: Option<&TimeSeriesFrame>,
        name: &str,
    ) -> Result<Forecast> {
        let mut forecasts: BTreeMap<String, Forecast> = BTreeMap::new();
        for dep in self.graph.minimum_dependency_set(name, true)? {
            let model = self.load_model(&dep)?;
            let forecast = if model.is_ensemble() {
                model.predict(&ModelInputs::Predictions(&forecasts), known_covariates)?
            } else {
                model.predict(&ModelInputs::Data(data), known_covariates)?
            };
            forecasts.insert(dep, forecast);
        }
        forecasts.remove(name).ok_or_else(|| {
            TrainerError::PredictionError(format!("Model '{}' produced no forecast", name))
        })
    }

    fn scorer_for(&self, metric: Option<&str>) -> Result<Scorer> {
        match metric {
            None => Ok(self.scorer.clone()),
            Some(metric) => Scorer::new(
                metric,
                self.config.prediction_length,
                self.config.eval_metric_seasonal_period,
            ),
        }
    }

    /// Score a model on the last `prediction_length` steps of `data`
    pub fn score(&mut self, data: &TimeSeriesFrame, model: Option<&str>, metric: Option<&str>) -> Result<f64> {
        let scorer = self.scorer_for(metric)?;
        let (past, known) = data.model_inputs_for_scoring(
            self.config.prediction_length,
            &self.config.known_covariates_names,
        )?;
        let forecast = self.predict(&past, known.as_ref(), model)?.ok_or_else(|| {
            TrainerError::PredictionError("Model failed to produce predictions".to_string())
        })?;
        scorer.score(data, &forecast)
    }

    /// Summary of the trainer, optionally with every model's info record
    pub fn get_info(&self, include_model_info: bool) -> Result<TrainerInfo> {
        let best_model = match &self.model_best {
            Some(best) => Some(best.clone()),
            None => self.graph.best_model().ok(),
        };
        let best_model_score_val = match &best_model {
            Some(best) => self.graph.record(best)?.val_score,
            None => None,
        };
        let model_info = if include_model_info {
            Some(self.get_models_info(None)?)
        } else {
            None
        };
        Ok(TrainerInfo {
            best_model,
            best_model_score_val,
            num_models_trained: self.graph.len(),
            eval_metric: self.scorer.metric_name().to_string(),
            prediction_length: self.config.prediction_length,
            model_info,
        })
    }

    /// Write the trainer info record next to the snapshot
    pub fn save_info(&self, include_model_info: bool) -> Result<TrainerInfo> {
        let info = self.get_info(include_model_info)?;
        save_json(self.store.as_ref(), &self.path.join(INFO_FILE), &info)?;
        Ok(info)
    }

    /// Saved info records of the given (or all) models
    pub fn get_models_info(&self, models: Option<&[String]>) -> Result<BTreeMap<String, ModelInfo>> {
        let names = match models {
            Some(names) => names.to_vec(),
            None => self.graph.model_names(None),
        };
        names
            .into_iter()
            .map(|name| {
                let record = self.graph.record(&name)?;
                let info = load_json(self.store.as_ref(), &record.path.join(MODEL_INFO_FILE))?;
                Ok((name, info))
            })
            .collect()
    }

    /// Remove models from the graph, and their artifacts when `delete_from_store` is set.
    ///
    /// A model still used by a model that is kept cannot be removed.
    pub fn delete_models(&mut self, names: &[String], delete_from_store: bool) -> Result<()> {
        let doomed: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        for name in &doomed {
            if let Some(user) = self
                .graph
                .dependents(name)?
                .into_iter()
                .find(|user| !doomed.contains(user.as_str()))
            {
                return Err(TrainerError::DependencyError(format!(
                    "Cannot delete '{}', '{}' depends on it",
                    name, user
                )));
            }
        }

        for name in doomed {
            let record = self.graph.remove(name)?;
            self.models.remove(name);
            if delete_from_store {
                self.store.remove(&record.path)?;
            }
            self.model_full_dict.retain(|k, v| k != name && v != name);
            if self.model_best.as_deref() == Some(name) {
                self.model_best = None;
            }
            info!(model = %name, "Deleted model");
        }
        self.save()
    }

    /// Persist the trainer snapshot
    pub fn save(&self) -> Result<()> {
        let snapshot = TrainerSnapshot {
            path: self.path.clone(),
            config: self.config.clone(),
            graph: self.graph.clone(),
            model_best: self.model_best.clone(),
            model_full_dict: self.model_full_dict.clone(),
            extra_banned_names: self.extra_banned_names.clone(),
            hpo_results: self.hpo_results.clone(),
            is_data_saved: self.is_data_saved,
            saved_at: Utc::now(),
        };
        save_json(self.store.as_ref(), &self.path.join(TRAINER_FILE), &snapshot)?;
        debug!(path = %self.path.display(), models = self.graph.len(), "Saved trainer");
        Ok(())
    }

    /// Load a trainer saved under `path` from the filesystem
    pub fn load(path: impl AsRef<Path>, reset_paths: bool) -> Result<Self> {
        Self::load_with(
            path,
            reset_paths,
            Arc::new(FileArtifactStore::new()),
            Arc::new(ModelRegistry::with_defaults()),
        )
    }

    /// Load a trainer from `store`.
    ///
    /// With `reset_paths`, every stored path below the saved root is moved
    /// below `path`, so a trainer directory can be relocated.
    pub fn load_with(
        path: impl AsRef<Path>,
        reset_paths: bool,
        store: Arc<dyn ArtifactStore>,
        registry: Arc<ModelRegistry>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let snapshot: TrainerSnapshot = load_json(store.as_ref(), &path.join(TRAINER_FILE))?;
        let TrainerSnapshot {
            path: saved_path,
            config,
            mut graph,
            model_best,
            model_full_dict,
            extra_banned_names,
            mut hpo_results,
            is_data_saved,
            saved_at,
        } = snapshot;

        let root = if reset_paths {
            graph.rewrite_paths(&saved_path, path);
            for trial in hpo_results.values_mut().flat_map(|t| t.values_mut()) {
                if let Ok(relative) = trial.path.strip_prefix(&saved_path) {
                    trial.path = path.join(relative);
                }
            }
            path.to_path_buf()
        } else {
            saved_path
        };

        let mut trainer = Trainer::new(root, config)?
            .with_store(store)
            .with_registry(registry);
        trainer.graph = graph;
        trainer.model_best = model_best;
        trainer.model_full_dict = model_full_dict;
        trainer.extra_banned_names = extra_banned_names;
        trainer.hpo_results = hpo_results;
        trainer.is_data_saved = is_data_saved;
        info!(
            path = %trainer.path.display(),
            models = trainer.graph.len(),
            saved_at = %saved_at,
            "Loaded trainer"
        );
        Ok(trainer)
    }
}
