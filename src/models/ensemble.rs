//! Greedy weighted ensemble over base model forecasts

use super::{FitContext, ForecastModel, ModelInputs, ModelState};
use crate::data::{Forecast, TimeSeriesFrame};
use crate::error::{Result, TrainerError};
use crate::metrics::Scorer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Convex combination of base model forecasts.
///
/// Weights are found by greedy forward selection with replacement: each round
/// adds the base model that most improves the mean validation score of the
/// running average, and the final weights are the selection frequencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedEnsemble {
    state: ModelState,
    ensemble_size: usize,
    weights: BTreeMap<String, f64>,
}

impl WeightedEnsemble {
    pub const TYPE: &'static str = "WeightedEnsemble";

    /// Reads `ensemble_size` (default 100)
    pub fn new(state: ModelState) -> Result<Self> {
        let ensemble_size = state.param_usize("ensemble_size")?.unwrap_or(100);
        Ok(Self {
            state,
            ensemble_size,
            weights: BTreeMap::new(),
        })
    }

    /// Builder method to set the number of selection rounds
    pub fn with_ensemble_size(mut self, ensemble_size: usize) -> Self {
        self.ensemble_size = ensemble_size.max(1);
        self
    }

    /// Fitted weights by base model name
    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    /// Base models that received a non-zero weight
    pub fn model_names(&self) -> Vec<String> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Fit weights from out-of-fold forecasts.
    ///
    /// `predictions[model][w]` is the forecast of `model` for validation window
    /// `windows[w]`.
    pub fn fit_ensemble(
        &mut self,
        predictions: &BTreeMap<String, Vec<Forecast>>,
        windows: &[TimeSeriesFrame],
        scorer: &Scorer,
        time_limit: Option<f64>,
    ) -> Result<()> {
        if predictions.is_empty() || windows.is_empty() {
            return Err(TrainerError::TrainingFailure(
                "Ensemble needs base model predictions and validation data".to_string(),
            ));
        }
        for (name, preds) in predictions {
            if preds.len() != windows.len() {
                return Err(TrainerError::DataError(format!(
                    "Model {} has {} out-of-fold forecasts for {} validation windows",
                    name,
                    preds.len(),
                    windows.len()
                )));
            }
        }

        let start = Instant::now();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut running: Option<Vec<Forecast>> = None;
        let mut selected = 0usize;

        for round in 0..self.ensemble_size {
            if let Some(limit) = time_limit {
                if start.elapsed().as_secs_f64() > limit {
                    warn!(
                        ensemble = %self.state.name,
                        rounds = round,
                        "Ensemble selection stopped early due to the time limit"
                    );
                    break;
                }
            }

            let mut best: Option<(&str, f64, Vec<Forecast>)> = None;
            for (name, preds) in predictions {
                let candidate = match Self::blend(running.as_deref(), preds, selected) {
                    Ok(candidate) => candidate,
                    Err(err) => {
                        debug!(model = %name, error = %err, "Skipping ensemble candidate");
                        continue;
                    }
                };
                let score = match Self::mean_score(scorer, windows, &candidate) {
                    Ok(score) => score,
                    Err(err) => {
                        debug!(model = %name, error = %err, "Skipping ensemble candidate");
                        continue;
                    }
                };
                if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
                    best = Some((name.as_str(), score, candidate));
                }
            }

            let Some((name, score, blended)) = best else {
                break;
            };
            *counts.entry(name).or_insert(0) += 1;
            selected += 1;
            running = Some(blended);
            debug!(round, model = name, score, "Ensemble selection step");
        }

        if selected == 0 {
            return Err(TrainerError::TrainingFailure(format!(
                "Ensemble {} could not score any base model",
                self.state.name
            )));
        }

        self.weights = predictions
            .keys()
            .map(|name| {
                let count = counts.get(name.as_str()).copied().unwrap_or(0);
                (name.clone(), count as f64 / selected as f64)
            })
            .collect();
        Ok(())
    }

    /// Running average after adding `candidate` to `selected` models
    fn blend(
        running: Option<&[Forecast]>,
        candidate: &[Forecast],
        selected: usize,
    ) -> Result<Vec<Forecast>> {
        match running {
            None => Ok(candidate.to_vec()),
            Some(current) => {
                let keep = selected as f64 / (selected + 1) as f64;
                let add = 1.0 / (selected + 1) as f64;
                current
                    .iter()
                    .zip(candidate)
                    .map(|(cur, cand)| Forecast::weighted_sum(&[(cur, keep), (cand, add)]))
                    .collect()
            }
        }
    }

    fn mean_score(scorer: &Scorer, windows: &[TimeSeriesFrame], forecasts: &[Forecast]) -> Result<f64> {
        let mut total = 0.0;
        for (window, forecast) in windows.iter().zip(forecasts) {
            total += scorer.score(window, forecast)?;
        }
        Ok(total / windows.len() as f64)
    }
}

impl ForecastModel for WeightedEnsemble {
    fn model_type(&self) -> &'static str {
        Self::TYPE
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn fit(&mut self, _train: &TimeSeriesFrame, _val: Option<&TimeSeriesFrame>, _ctx: &FitContext) -> Result<()> {
        Err(TrainerError::TrainingFailure(format!(
            "Ensemble {} is fitted from base model predictions, not raw data",
            self.state.name
        )))
    }

    fn predict(&self, inputs: &ModelInputs<'_>, _known_covariates: Option<&TimeSeriesFrame>) -> Result<Forecast> {
        let preds = inputs.predictions(&self.state.name)?;
        let mut parts = Vec::with_capacity(self.weights.len());
        for (name, weight) in self.weights.iter().filter(|(_, w)| **w > 0.0) {
            let forecast = preds.get(name).ok_or_else(|| {
                TrainerError::PredictionError(format!(
                    "Ensemble {} is missing predictions of base model {}",
                    self.state.name, name
                ))
            })?;
            parts.push((forecast, *weight));
        }
        Forecast::weighted_sum(&parts)
    }

    fn is_ensemble(&self) -> bool {
        true
    }

    fn base_model_names(&self) -> Option<Vec<String>> {
        Some(self.model_names())
    }

    fn remap_base_models(&mut self, names: &BTreeMap<String, String>) {
        self.weights = std::mem::take(&mut self.weights)
            .into_iter()
            .map(|(name, weight)| (names.get(&name).cloned().unwrap_or(name), weight))
            .collect();
    }

    fn clone_box(&self) -> Box<dyn ForecastModel> {
        Box::new(self.clone())
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn forecast(value: f64) -> Forecast {
        let mut f = Forecast::new(1);
        f.insert("a", array![value]).unwrap();
        f
    }

    fn setup() -> (BTreeMap<String, Vec<Forecast>>, Vec<TimeSeriesFrame>, Scorer) {
        // truth for the single window is 10
        let windows = vec![TimeSeriesFrame::new().with_series("a", vec![1.0, 2.0, 10.0])];
        let mut preds = BTreeMap::new();
        preds.insert("good".to_string(), vec![forecast(9.0)]);
        preds.insert("bad".to_string(), vec![forecast(0.0)]);
        preds.insert("over".to_string(), vec![forecast(11.0)]);
        (preds, windows, Scorer::new("MAE", 1, None).unwrap())
    }

    #[test]
    fn test_greedy_selection_prefers_accurate_models() {
        let (preds, windows, scorer) = setup();
        let mut ensemble = WeightedEnsemble::new(ModelState::new("WeightedEnsemble", 1))
            .unwrap()
            .with_ensemble_size(2);
        ensemble.fit_ensemble(&preds, &windows, &scorer, None).unwrap();

        // good then over averages to exactly 10
        assert_eq!(ensemble.weights()["good"], 0.5);
        assert_eq!(ensemble.weights()["over"], 0.5);
        assert_eq!(ensemble.weights()["bad"], 0.0);
        assert_eq!(ensemble.model_names(), vec!["good".to_string(), "over".to_string()]);
    }

    #[test]
    fn test_predict_uses_base_forecasts() {
        let (preds, windows, scorer) = setup();
        let mut ensemble = WeightedEnsemble::new(ModelState::new("WeightedEnsemble", 1))
            .unwrap()
            .with_ensemble_size(2);
        ensemble.fit_ensemble(&preds, &windows, &scorer, None).unwrap();

        let mut inputs = BTreeMap::new();
        inputs.insert("good".to_string(), forecast(9.0));
        inputs.insert("over".to_string(), forecast(11.0));
        let out = ensemble.predict(&ModelInputs::Predictions(&inputs), None).unwrap();
        assert_eq!(out.get("a").unwrap()[0], 10.0);

        inputs.remove("over");
        assert!(ensemble.predict(&ModelInputs::Predictions(&inputs), None).is_err());
    }

    #[test]
    fn test_remap_base_models() {
        let (preds, windows, scorer) = setup();
        let mut ensemble = WeightedEnsemble::new(ModelState::new("WeightedEnsemble", 1)).unwrap();
        ensemble.fit_ensemble(&preds, &windows, &scorer, None).unwrap();

        let mut names = BTreeMap::new();
        names.insert("good".to_string(), "good_FULL".to_string());
        ensemble.remap_base_models(&names);
        let bases = ensemble.base_model_names().unwrap();
        assert!(bases.contains(&"good_FULL".to_string()));
        assert!(!bases.contains(&"good".to_string()));
    }

    #[test]
    fn test_window_count_mismatch() {
        let (mut preds, windows, scorer) = setup();
        preds.insert("short".to_string(), vec![]);
        let mut ensemble = WeightedEnsemble::new(ModelState::new("WeightedEnsemble", 1)).unwrap();
        assert!(matches!(
            ensemble.fit_ensemble(&preds, &windows, &scorer, None),
            Err(TrainerError::DataError(_))
        ));
    }
}
