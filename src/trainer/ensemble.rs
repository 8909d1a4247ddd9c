use super::scheduler::unique_name;
use super::Trainer;
use crate::data::{Forecast, TimeSeriesFrame};
use crate::error::{Result, TrainerError};
use crate::models::{ForecastModel, ModelInputs, ModelState, WeightedEnsemble};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

impl Trainer {
    /// Fit a weighted ensemble over the cached out-of-fold forecasts of
    /// `model_names` and register it on top of the models it selected.
    ///
    /// The ensemble's fit time covers only the weight search; its predict
    /// time is the sum over its base models.
    pub(crate) fn fit_ensemble(
        &mut self,
        windows: &[TimeSeriesFrame],
        model_names: &[String],
        time_limit: Option<f64>,
    ) -> Result<String> {
        let name = unique_name(WeightedEnsemble::TYPE, &self.banned_names());
        info!(ensemble = %name, base_models = ?model_names, "Fitting ensemble");

        let mut predictions: BTreeMap<String, Vec<Forecast>> = BTreeMap::new();
        for base in model_names {
            predictions.insert(base.clone(), self.load_oof(base)?);
        }

        let state = ModelState::new(&name, self.config.prediction_length).with_path(self.model_path(&name));
        let mut ensemble = WeightedEnsemble::new(state)?.with_ensemble_size(self.config.ensemble_size);

        let start = Instant::now();
        ensemble.fit_ensemble(&predictions, windows, &self.scorer, time_limit)?;
        let fit_time = start.elapsed().as_secs_f64();

        let selected = ensemble.model_names();
        let predict_time: f64 = selected
            .iter()
            .filter_map(|base| self.graph.record(base).ok().and_then(|r| r.predict_time))
            .sum();

        let mut forecasts = Vec::with_capacity(windows.len());
        let mut total_score = 0.0;
        for (w, window) in windows.iter().enumerate() {
            let mut inputs: BTreeMap<String, Forecast> = BTreeMap::new();
            for base in &selected {
                let forecast = predictions
                    .get(base)
                    .and_then(|preds| preds.get(w))
                    .ok_or_else(|| {
                        TrainerError::DataError(format!("No out-of-fold forecast of {} for window {}", base, w))
                    })?;
                inputs.insert(base.clone(), forecast.clone());
            }
            let forecast = ensemble.predict(&ModelInputs::Predictions(&inputs), None)?;
            total_score += self.scorer.score(window, &forecast)?;
            forecasts.push(forecast);
        }

        let state = ensemble.state_mut();
        state.fit_time = Some(fit_time);
        state.predict_time = Some(predict_time);
        state.val_score = Some(total_score / windows.len().max(1) as f64);

        self.save_oof(&ensemble, &forecasts)?;
        self.log_scores_and_times(ensemble.state());
        self.save_model(&ensemble)?;
        info!(ensemble = %name, weights = ?ensemble.weights(), "Ensemble weights");
        self.register_model(Box::new(ensemble), Some(&selected))?;
        Ok(name)
    }
}
