//! Fit scheduling under a shared time budget
//!
//! Candidates are trained one after another. A candidate that fails (error
//! or panic) during fit, scoring or saving is logged and left out of the
//! results; the batch always carries on with the next candidate.

use super::Trainer;
use crate::config::{FitOptions, TuningConfig};
use crate::data::{Forecast, TimeSeriesFrame};
use crate::error::{Result, TrainerError};
use crate::models::{FitContext, ForecastModel, ModelInputs, ModelState};
use crate::storage::MODEL_FILE;
use crate::tuning::{create_sampler, HpoTrial, ModelSpec, Params, DEFAULT_NUM_TRIALS};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// First of `base`, `base_2`, `base_3`, ... that is not banned
pub fn unique_name(base: &str, banned: &BTreeSet<String>) -> String {
    if !banned.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|name| !banned.contains(name))
        .unwrap_or_else(|| base.to_string())
}

/// Run `f`, turning a panic into a training failure
pub(crate) fn catch_failure<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(TrainerError::TrainingFailure(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

/// Wall clock shared by every candidate of one call
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeBudget {
    start: Instant,
    limit: Option<f64>,
}

impl TimeBudget {
    pub(crate) fn start(limit: Option<f64>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub(crate) fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Seconds left, if limited (may be negative)
    pub(crate) fn remaining(&self) -> Option<f64> {
        self.limit.map(|limit| limit - self.elapsed())
    }
}

/// Data each model is fitted and validated on
pub(crate) struct ValidationPlan {
    /// Training data with every held-out window removed
    pub(crate) fit_data: TimeSeriesFrame,
    /// Explicit validation data handed to `fit`
    pub(crate) val_hint: Option<TimeSeriesFrame>,
    /// Frames whose last `prediction_length` steps are scored
    pub(crate) windows: Vec<TimeSeriesFrame>,
}

enum Candidate {
    Model(Box<dyn ForecastModel>),
    Search { name: String, spec: ModelSpec },
}

impl Candidate {
    fn name(&self) -> &str {
        match self {
            Candidate::Model(model) => model.name(),
            Candidate::Search { name, .. } => name,
        }
    }
}

impl Trainer {
    /// Train candidates built from model specs.
    ///
    /// Names default to the model type and are made unique against every
    /// registered or reserved name. Returns the names of the models that
    /// were registered, in order; models that fail are simply absent.
    pub fn fit(
        &mut self,
        train_data: &TimeSeriesFrame,
        specs: &[ModelSpec],
        val_data: Option<&TimeSeriesFrame>,
        options: FitOptions,
    ) -> Result<Vec<String>> {
        let tune = options.tuning.is_some();
        let mut banned = self.banned_names();
        let mut candidates = Vec::with_capacity(specs.len());
        for spec in specs {
            let name = unique_name(spec.base_name(), &banned);
            banned.insert(name.clone());
            if tune && spec.contains_search_space() {
                candidates.push(Candidate::Search {
                    name,
                    spec: spec.clone(),
                });
            } else {
                let model = self.build_model(&name, spec, spec.default_params())?;
                candidates.push(Candidate::Model(model));
            }
        }
        self.train_multi(train_data, val_data, candidates, &options)
    }

    /// Train already constructed models, renaming any whose name is taken
    pub fn fit_models(
        &mut self,
        train_data: &TimeSeriesFrame,
        models: Vec<Box<dyn ForecastModel>>,
        val_data: Option<&TimeSeriesFrame>,
        options: FitOptions,
    ) -> Result<Vec<String>> {
        let mut banned = self.banned_names();
        let mut candidates = Vec::with_capacity(models.len());
        for mut model in models {
            let name = unique_name(model.name(), &banned);
            if name != model.name() {
                info!(from = %model.name(), to = %name, "Renaming model to avoid a name collision");
            }
            banned.insert(name.clone());
            let path = self.model_path(&name);
            let state = model.state_mut();
            state.name = name;
            state.path = path;
            candidates.push(Candidate::Model(model));
        }
        self.train_multi(train_data, val_data, candidates, &options)
    }

    fn build_model(&self, name: &str, spec: &ModelSpec, params: Params) -> Result<Box<dyn ForecastModel>> {
        let state = ModelState::new(name, self.config.prediction_length)
            .with_hyperparameters(params)
            .with_path(self.model_path(name));
        self.registry.build(&spec.model_type, state)
    }

    pub(crate) fn validation_plan(
        &self,
        train_data: &TimeSeriesFrame,
        val_data: Option<&TimeSeriesFrame>,
    ) -> Result<ValidationPlan> {
        if train_data.is_empty() {
            return Err(TrainerError::DataError("Training data is empty".to_string()));
        }
        let pl = self.config.prediction_length;
        let num_windows = self.config.num_val_windows;
        match val_data {
            Some(val) => {
                if num_windows > 0 {
                    return Err(TrainerError::ConfigError(
                        "val_data must not be given when num_val_windows > 0".to_string(),
                    ));
                }
                Ok(ValidationPlan {
                    fit_data: train_data.clone(),
                    val_hint: Some(val.clone()),
                    windows: vec![val.clone()],
                })
            }
            None => {
                if num_windows == 0 {
                    return Err(TrainerError::ConfigError(
                        "val_data must be given when num_val_windows is 0".to_string(),
                    ));
                }
                let fit_data = train_data.truncate_end(num_windows * pl)?;
                let windows = (0..num_windows)
                    .map(|w| {
                        let offset = (num_windows - 1 - w) * pl;
                        if offset == 0 {
                            Ok(train_data.clone())
                        } else {
                            train_data.truncate_end(offset)
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ValidationPlan {
                    fit_data,
                    val_hint: None,
                    windows,
                })
            }
        }
    }

    fn train_multi(
        &mut self,
        train_data: &TimeSeriesFrame,
        val_data: Option<&TimeSeriesFrame>,
        candidates: Vec<Candidate>,
        options: &FitOptions,
    ) -> Result<Vec<String>> {
        info!(start = %chrono::Local::now().format("%Y-%m-%d %H:%M:%S"), "Starting training");
        let plan = self.validation_plan(train_data, val_data)?;

        if self.config.save_data && !self.is_data_saved {
            self.save_train_data(train_data)?;
            if let Some(val) = val_data {
                self.save_val_data(val)?;
            }
            self.is_data_saved = true;
        }

        let names: Vec<&str> = candidates.iter().map(Candidate::name).collect();
        info!(models = ?names, "Models that will be trained");

        let budget = TimeBudget::start(options.time_limit);
        // computed once up front; early finishers do not hand time to later candidates
        let split = options
            .time_limit
            .map(|limit| limit / candidates.len().max(1) as f64);

        let mut trained = Vec::new();
        for candidate in candidates {
            match &options.tuning {
                Some(tuning) => {
                    info!(
                        model = candidate.name(),
                        time_limit = ?split,
                        "Hyperparameter tuning model"
                    );
                    let names = match candidate {
                        Candidate::Search { name, spec } => {
                            self.tune_model_hyperparameters(&name, &spec, &plan, split, tuning)?
                        }
                        Candidate::Model(model) => self.train_and_save(&plan, model, split)?,
                    };
                    trained.extend(names);
                }
                None => {
                    let time_left = budget.remaining();
                    if let Some(left) = time_left {
                        if left <= 0.0 {
                            info!(time_left = left, "Stopping training due to lack of time remaining");
                            break;
                        }
                    }
                    info!(model = candidate.name(), time_limit = ?time_left, "Training model");
                    let model = match candidate {
                        Candidate::Model(model) => model,
                        Candidate::Search { name, spec } => {
                            self.build_model(&name, &spec, spec.default_params())?
                        }
                    };
                    trained.extend(self.train_and_save(&plan, model, time_left)?);
                }
            }
        }

        if self.config.enable_ensemble {
            let available: Vec<String> = self
                .graph
                .model_names(Some(0))
                .into_iter()
                .filter(|name| {
                    self.graph
                        .record(name)
                        .map_or(false, |record| record.val_score.is_some())
                })
                .collect();
            let time_left = budget.remaining();
            if matches!(time_left, Some(left) if left <= 0.0) {
                info!(time_left = ?time_left, "Not fitting ensemble due to lack of time remaining");
            } else if available.len() <= 1 {
                info!(
                    available = available.len(),
                    "Not fitting ensemble, it needs at least two trained models"
                );
            } else {
                match catch_failure(|| self.fit_ensemble(&plan.windows, &available, time_left)) {
                    Ok(name) => trained.push(name),
                    Err(err) => {
                        error!(error = %err, "Ensemble training failed");
                        debug!(error = ?err, "Ensemble failure details");
                    }
                }
            }
        }

        self.model_best = None;
        self.save()?;
        info!(
            models = ?trained,
            elapsed = budget.elapsed(),
            "Training complete"
        );
        Ok(trained)
    }

    /// Fit, validate, save and register one model.
    ///
    /// Returns the registered name, or nothing when the model was skipped,
    /// failed or could not be registered.
    pub(crate) fn train_and_save(
        &mut self,
        plan: &ValidationPlan,
        model: Box<dyn ForecastModel>,
        time_limit: Option<f64>,
    ) -> Result<Vec<String>> {
        let name = model.name().to_string();
        if let Some(limit) = time_limit {
            if limit <= 0.0 {
                info!(model = %name, "Skipping model due to lack of time remaining");
                return Ok(Vec::new());
            }
        }

        match catch_failure(|| self.fit_and_score(model, plan, time_limit)) {
            Ok(model) => match self.register_model(model, None) {
                Ok(()) => Ok(vec![name]),
                Err(err) => {
                    error!(model = %name, error = %err, "Could not register model, skipping it");
                    Ok(Vec::new())
                }
            },
            Err(err) => {
                error!(model = %name, error = %err, "Model failed during training, skipping it");
                debug!(model = %name, error = ?err, "Training failure details");
                Ok(Vec::new())
            }
        }
    }

    fn fit_and_score(
        &self,
        mut model: Box<dyn ForecastModel>,
        plan: &ValidationPlan,
        time_limit: Option<f64>,
    ) -> Result<Box<dyn ForecastModel>> {
        let start = Instant::now();
        let ctx = FitContext {
            time_limit,
            num_cpus: self.resources.cpu_count(),
            num_gpus: self.resources.gpu_count(),
        };
        model.fit(&plan.fit_data, plan.val_hint.as_ref(), &ctx)?;
        let state = model.state_mut();
        if state.fit_time.is_none() {
            state.fit_time = Some(start.elapsed().as_secs_f64());
        }

        if !plan.windows.is_empty() {
            self.score_and_cache_oof(model.as_mut(), &plan.windows)?;
        }
        self.log_scores_and_times(model.state());
        self.save_model(model.as_ref())?;
        Ok(model)
    }

    /// Score a level-0 model on every window and cache its forecasts.
    ///
    /// The validation score is the mean window score; the predict time is
    /// the total over windows.
    fn score_and_cache_oof(&self, model: &mut dyn ForecastModel, windows: &[TimeSeriesFrame]) -> Result<()> {
        let pl = self.config.prediction_length;
        let mut forecasts: Vec<Forecast> = Vec::with_capacity(windows.len());
        let mut total_score = 0.0;
        let mut predict_time = 0.0;
        for window in windows {
            let (past, known) = window.model_inputs_for_scoring(pl, &self.config.known_covariates_names)?;
            let start = Instant::now();
            let forecast = model.predict(&ModelInputs::Data(&past), known.as_ref())?;
            predict_time += start.elapsed().as_secs_f64();
            total_score += self.scorer.score(window, &forecast)?;
            forecasts.push(forecast);
        }
        let state = model.state_mut();
        state.val_score = Some(total_score / windows.len() as f64);
        state.predict_time = Some(predict_time);
        self.save_oof(model, &forecasts)
    }

    pub(crate) fn log_scores_and_times(&self, state: &ModelState) {
        if let Some(score) = state.val_score {
            info!(
                model = %state.name,
                "{:<7.4} = Validation score ({}{})",
                score,
                self.scorer.sign_str(),
                self.scorer.metric_name()
            );
        }
        if let Some(fit_time) = state.fit_time {
            info!(model = %state.name, "{:<7.2} s = Training runtime", fit_time);
        }
        if let Some(predict_time) = state.predict_time {
            info!(model = %state.name, "{:<7.2} s = Validation (prediction) runtime", predict_time);
        }
    }

    /// Run tuning trials for one model and register every trial that was
    /// saved successfully.
    fn tune_model_hyperparameters(
        &mut self,
        name: &str,
        spec: &ModelSpec,
        plan: &ValidationPlan,
        time_limit: Option<f64>,
        tuning: &TuningConfig,
    ) -> Result<Vec<String>> {
        let num_trials = match (tuning.num_trials, time_limit) {
            (Some(n), _) => Some(n),
            (None, None) => Some(DEFAULT_NUM_TRIALS),
            (None, Some(_)) => None,
        };
        let budget = TimeBudget::start(time_limit);
        let banned = self.banned_names();
        let mut sampler = create_sampler(tuning.sampler, tuning.random_seed.or(self.config.random_seed));
        let mut history: Vec<(Params, f64)> = Vec::new();
        let mut trials: BTreeMap<String, HpoTrial> = BTreeMap::new();
        let mut fitted: Vec<Box<dyn ForecastModel>> = Vec::new();

        let mut trial = 0usize;
        loop {
            if num_trials.map_or(false, |n| trial >= n) {
                break;
            }
            let time_left = budget.remaining();
            if matches!(time_left, Some(left) if left <= 0.0) {
                break;
            }
            trial += 1;

            let trial_name = format!("{}/T{}", name, trial);
            if banned.contains(&trial_name) {
                warn!(trial = %trial_name, "Trial name is already taken, skipping trial");
                continue;
            }
            let params = sampler.sample(spec, &history);
            let model = match self.build_model(&trial_name, spec, params.clone()) {
                Ok(model) => model,
                Err(err) => {
                    warn!(trial = %trial_name, error = %err, "Could not build trial model");
                    continue;
                }
            };
            let path = model.state().path.clone();
            match catch_failure(|| self.fit_and_score(model, plan, time_left)) {
                Ok(model) => {
                    let val_score = model.state().val_score;
                    if let Some(score) = val_score {
                        history.push((params.clone(), score));
                    }
                    trials.insert(
                        trial_name,
                        HpoTrial {
                            path,
                            val_score,
                            hyperparameters: params,
                        },
                    );
                    fitted.push(model);
                }
                Err(err) => {
                    warn!(trial = %trial_name, error = %err, "Tuning trial failed");
                    trials.insert(
                        trial_name,
                        HpoTrial {
                            path,
                            val_score: None,
                            hyperparameters: params,
                        },
                    );
                }
            }
        }

        let total_tuning_time = budget.elapsed();
        self.hpo_results.insert(name.to_string(), trials);

        let mut trained = Vec::new();
        for model in fitted {
            // only trials whose artifact was written are promoted
            if !self.store.exists(&model.state().path.join(MODEL_FILE)) {
                continue;
            }
            let trial_name = model.name().to_string();
            match self.register_model(model, None) {
                Ok(()) => trained.push(trial_name),
                Err(err) => error!(trial = %trial_name, error = %err, "Could not register trial"),
            }
        }
        info!(model = %name, trained = trained.len(), "Finished tuning");

        let best = trained
            .iter()
            .filter_map(|t| self.graph.record(t).ok())
            .filter_map(|record| record.val_score.map(|s| (record.name.clone(), s)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((best_trial, score)) = best {
            info!(
                model = %name,
                "{:<7.4} = Validation score ({}{})",
                score,
                self.scorer.sign_str(),
                self.scorer.metric_name()
            );
            info!(model = %name, "{:<7.2} s = Total tuning time", total_tuning_time);
            if let Some(params) = self
                .hpo_results
                .get(name)
                .and_then(|t| t.get(&best_trial))
                .map(|t| &t.hyperparameters)
            {
                debug!(model = %name, trial = %best_trial, hyperparameters = ?params, "Best hyperparameter configuration");
            }
        }
        Ok(trained)
    }
}
