//! Baseline forecasting models
//!
//! These read the history passed at prediction time, so a fitted model can
//! forecast items it never saw during training.

use super::{refit_template_state, FitContext, ForecastModel, ModelInputs, ModelState};
use crate::data::{Forecast, TimeSeriesFrame};
use crate::error::{Result, TrainerError};
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

fn ensure_fitted(fitted: bool, name: &str) -> Result<()> {
    if fitted {
        Ok(())
    } else {
        Err(TrainerError::PredictionError(format!(
            "Model {} has not been fitted",
            name
        )))
    }
}

fn ensure_trainable(train: &TimeSeriesFrame, name: &str) -> Result<()> {
    if train.is_empty() || train.min_length() == 0 {
        return Err(TrainerError::DataError(format!(
            "Model {} received no training observations",
            name
        )));
    }
    Ok(())
}

/// Apply `f` to each item's history to build a forecast
fn forecast_each<F>(data: &TimeSeriesFrame, prediction_length: usize, f: F) -> Result<Forecast>
where
    F: Fn(ArrayView1<'_, f64>) -> Array1<f64>,
{
    let mut forecast = Forecast::new(prediction_length);
    for (item_id, series) in data.iter() {
        if series.is_empty() {
            return Err(TrainerError::PredictionError(format!(
                "Item {} has no history to forecast from",
                item_id
            )));
        }
        forecast.insert(item_id.clone(), f(series.target.view()))?;
    }
    Ok(forecast)
}

fn last_value(history: &ArrayView1<'_, f64>) -> f64 {
    history[history.len() - 1]
}

/// Repeats the last observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaiveModel {
    state: ModelState,
    #[serde(default)]
    fitted: bool,
}

impl NaiveModel {
    pub const TYPE: &'static str = "Naive";

    pub fn new(state: ModelState) -> Self {
        Self {
            state,
            fitted: false,
        }
    }
}

impl ForecastModel for NaiveModel {
    fn model_type(&self) -> &'static str {
        Self::TYPE
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn fit(&mut self, train: &TimeSeriesFrame, _val: Option<&TimeSeriesFrame>, _ctx: &FitContext) -> Result<()> {
        ensure_trainable(train, &self.state.name)?;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, inputs: &ModelInputs<'_>, _known_covariates: Option<&TimeSeriesFrame>) -> Result<Forecast> {
        ensure_fitted(self.fitted, &self.state.name)?;
        let data = inputs.data(&self.state.name)?;
        let pl = self.state.prediction_length;
        forecast_each(data, pl, |history| Array1::from_elem(pl, last_value(&history)))
    }

    fn clone_box(&self) -> Box<dyn ForecastModel> {
        Box::new(self.clone())
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Repeats the last observed season
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalNaiveModel {
    state: ModelState,
    season_length: usize,
    #[serde(default)]
    fitted: bool,
}

impl SeasonalNaiveModel {
    pub const TYPE: &'static str = "SeasonalNaive";

    /// Reads `season_length` (default 1)
    pub fn new(state: ModelState) -> Result<Self> {
        let season_length = state.param_usize("season_length")?.unwrap_or(1);
        Ok(Self {
            state,
            season_length,
            fitted: false,
        })
    }
}

impl ForecastModel for SeasonalNaiveModel {
    fn model_type(&self) -> &'static str {
        Self::TYPE
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn fit(&mut self, train: &TimeSeriesFrame, _val: Option<&TimeSeriesFrame>, _ctx: &FitContext) -> Result<()> {
        ensure_trainable(train, &self.state.name)?;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, inputs: &ModelInputs<'_>, _known_covariates: Option<&TimeSeriesFrame>) -> Result<Forecast> {
        ensure_fitted(self.fitted, &self.state.name)?;
        let data = inputs.data(&self.state.name)?;
        let (pl, m) = (self.state.prediction_length, self.season_length);
        forecast_each(data, pl, |history| {
            let n = history.len();
            if n < m {
                // not a full season yet
                return Array1::from_elem(pl, last_value(&history));
            }
            Array1::from_iter((0..pl).map(|h| history[n - m + h % m]))
        })
    }

    fn clone_box(&self) -> Box<dyn ForecastModel> {
        Box::new(self.clone())
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Mean of the trailing window (or the whole history)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AverageModel {
    state: ModelState,
    window: Option<usize>,
    #[serde(default)]
    fitted: bool,
}

impl AverageModel {
    pub const TYPE: &'static str = "Average";

    /// Reads `window` (default: whole history)
    pub fn new(state: ModelState) -> Result<Self> {
        let window = state.param_usize("window")?;
        Ok(Self {
            state,
            window,
            fitted: false,
        })
    }
}

impl ForecastModel for AverageModel {
    fn model_type(&self) -> &'static str {
        Self::TYPE
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn fit(&mut self, train: &TimeSeriesFrame, _val: Option<&TimeSeriesFrame>, _ctx: &FitContext) -> Result<()> {
        ensure_trainable(train, &self.state.name)?;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, inputs: &ModelInputs<'_>, _known_covariates: Option<&TimeSeriesFrame>) -> Result<Forecast> {
        ensure_fitted(self.fitted, &self.state.name)?;
        let data = inputs.data(&self.state.name)?;
        let pl = self.state.prediction_length;
        let window = self.window;
        forecast_each(data, pl, |history| {
            let n = history.len();
            let start = window.map_or(0, |w| n.saturating_sub(w));
            let mean = history.slice(s![start..]).mean().unwrap_or(0.0);
            Array1::from_elem(pl, mean)
        })
    }

    fn clone_box(&self) -> Box<dyn ForecastModel> {
        Box::new(self.clone())
    }

    fn to_artifact(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Simple exponential smoothing with one global smoothing factor.
///
/// When `alpha` is not given it is picked from a grid by the in-sample
/// one-step-ahead squared error over all training items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleExponentialSmoothing {
    state: ModelState,
    alpha: Option<f64>,
    fitted_alpha: Option<f64>,
}

const ALPHA_GRID: [f64; 9] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];

impl SimpleExponentialSmoothing {
    pub const TYPE: &'static str = "SimpleExponentialSmoothing";

    /// Reads `alpha` (must lie in (0, 1] when given)
    pub fn new(state: ModelState) -> Result<Self> {
        let alpha = state.param_f64("alpha")?;
        if let Some(a) = alpha {
            if !(a > 0.0 && a <= 1.0) {
                return Err(TrainerError::InvalidParameter {
                    name: "alpha".to_string(),
                    value: a.to_string(),
                    reason: "must lie in (0, 1]".to_string(),
                });
            }
        }
        Ok(Self {
            state,
            alpha,
            fitted_alpha: None,
        })
    }

    /// Smoothing factor chosen by the last fit
    pub fn fitted_alpha(&self) -> Option<f64> {
        self.fitted_alpha
    }

    fn level(history: ArrayView1<'_, f64>, alpha: f64) -> f64 {
        history
            .iter()
            .skip(1)
            .fold(history[0], |level, &y| alpha * y + (1.0 - alpha) * level)
    }

    fn one_step_sse(history: ArrayView1<'_, f64>, alpha: f64) -> f64 {
        let mut level = history[0];
        let mut sse = 0.0;
        for &y in history.iter().skip(1) {
            sse += (y - level).powi(2);
            level = alpha * y + (1.0 - alpha) * level;
        }
        sse
    }
}

impl ForecastModel for SimpleExponentialSmoothing {
    fn model_type(&self) -> &'static str {
        Self::TYPE
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }

    fn fit(&mut self, train: &TimeSeriesFrame, _val: Option<&TimeSeriesFrame>, _ctx: &FitContext) -> Result<()> {
        ensure_trainable(train, &self.state.name)?;
        let alpha = match self.alpha {
            Some(a) => a,
            None => {
                let mut best = (ALPHA_GRID[0], f64::INFINITY);
                for &candidate in &ALPHA_GRID {
                    let sse: f64 = train
                        .iter()
                        .map(|(_, series)| Self::one_step_sse(series.target.view(), candidate))
                        .sum();
                    if sse < best.1 {
                        best = (candidate, sse);
                    }
                }
                best.0
            }
        };
        debug!(model = %self.state.name, alpha, "Selected smoothing factor");
        self.fitted_alpha = Some(alpha);
        Ok(())
    }

    fn predict(&self, inputs: &ModelInputs<'_>, _known_covariates: Option<&TimeSeriesFrame>) -> Result<Forecast> {
        let alpha = self.fitted_alpha.ok_or_else(|| {
            TrainerError::PredictionError(format!("Model {} has not been fitted", self.state.name))
        })?;
        let data = inputs.data(&self.state.name)?;
        let pl = self.state.prediction_length;
        forecast_each(data, pl, |history| {
            Array1::from_elem(pl, Self::level(history, alpha))
        })
    }

    fn can_refit_full(&self) -> bool {
        true
    }

    fn refit_full_template(&self) -> Result<Box<dyn ForecastModel>> {
        Ok(Box::new(Self::new(refit_template_state(&self.state))?))
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
    use serde_json::json;
    use std::collections::BTreeMap;

    fn frame() -> TimeSeriesFrame {
        TimeSeriesFrame::new()
            .with_series("a", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .with_series("b", vec![2.0, 2.0, 2.0, 2.0, 2.0, 2.0])
    }

    fn state(name: &str, pl: usize, params: serde_json::Value) -> ModelState {
        let params = serde_json::from_value(params).unwrap();
        ModelState::new(name, pl).with_hyperparameters(params)
    }

    #[test]
    fn test_naive_forecast() {
        let mut model = NaiveModel::new(ModelState::new("Naive", 2));
        model.fit(&frame(), None, &FitContext::default()).unwrap();
        let forecast = model.predict(&ModelInputs::Data(&frame()), None).unwrap();
        assert_eq!(forecast.get("a").unwrap().to_vec(), vec![6.0, 6.0]);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = NaiveModel::new(ModelState::new("Naive", 2));
        assert!(model.predict(&ModelInputs::Data(&frame()), None).is_err());
    }

    #[test]
    fn test_seasonal_naive_repeats_season() {
        let mut model = SeasonalNaiveModel::new(state("SN", 3, json!({"season_length": 2}))).unwrap();
        model.fit(&frame(), None, &FitContext::default()).unwrap();
        let forecast = model.predict(&ModelInputs::Data(&frame()), None).unwrap();
        assert_eq!(forecast.get("a").unwrap().to_vec(), vec![5.0, 6.0, 5.0]);
    }

    #[test]
    fn test_average_window() {
        let mut model = AverageModel::new(state("Avg", 1, json!({"window": 2}))).unwrap();
        model.fit(&frame(), None, &FitContext::default()).unwrap();
        let forecast = model.predict(&ModelInputs::Data(&frame()), None).unwrap();
        assert_eq!(forecast.get("a").unwrap().to_vec(), vec![5.5]);
    }

    #[test]
    fn test_ses_selects_alpha_and_refits() {
        let mut model = SimpleExponentialSmoothing::new(ModelState::new("SES", 1)).unwrap();
        model.fit(&frame(), None, &FitContext::default()).unwrap();
        // a trending series favours the most reactive grid value
        assert_eq!(model.fitted_alpha(), Some(0.9));

        let template = model.refit_full_template().unwrap();
        assert_eq!(template.name(), "SES_FULL");
        assert!(template.predict(&ModelInputs::Data(&frame()), None).is_err());
    }

    #[test]
    fn test_ses_rejects_bad_alpha() {
        let result = SimpleExponentialSmoothing::new(state("SES", 1, json!({"alpha": 1.5})));
        assert!(matches!(result, Err(TrainerError::InvalidParameter { .. })));
    }

    #[test]
    fn test_ensemble_inputs_rejected() {
        let mut model = NaiveModel::new(ModelState::new("Naive", 1));
        model.fit(&frame(), None, &FitContext::default()).unwrap();
        let preds = BTreeMap::new();
        assert!(model.predict(&ModelInputs::Predictions(&preds), None).is_err());
    }
}
