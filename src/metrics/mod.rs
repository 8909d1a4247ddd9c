//! Forecast evaluation metrics
//!
//! Metrics report raw error values; a [`Scorer`] multiplies them by the metric
//! coefficient so that higher scores are always better inside the trainer.

mod point;

pub use point::{Mae, Mape, Mase, Rmse, Smape};

use crate::data::{Forecast, TimeSeriesFrame};
use crate::error::{Result, TrainerError};
use std::fmt;
use std::sync::Arc;

/// Settings shared by every metric evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricContext {
    /// Number of trailing steps of each item that are compared to the forecast
    pub prediction_length: usize,
    /// Seasonal period used by scaled metrics
    pub seasonal_period: usize,
}

/// A forecast accuracy metric
pub trait Metric: Send + Sync + fmt::Debug {
    /// Canonical metric name
    fn name(&self) -> &'static str;

    /// +1 when larger raw values are better, -1 when smaller are better
    fn coefficient(&self) -> f64;

    /// Raw metric value of `predictions` against the last
    /// `prediction_length` steps of each item in `data`
    fn compute(
        &self,
        data: &TimeSeriesFrame,
        predictions: &Forecast,
        ctx: &MetricContext,
    ) -> Result<f64>;
}

/// Names accepted by [`metric_from_name`]
pub const AVAILABLE_METRICS: [&str; 5] = ["MAE", "RMSE", "MAPE", "sMAPE", "MASE"];

/// Look up a built-in metric by (case-insensitive) name
pub fn metric_from_name(name: &str) -> Result<Arc<dyn Metric>> {
    let metric: Arc<dyn Metric> = match name.to_ascii_uppercase().as_str() {
        "MAE" => Arc::new(Mae),
        "RMSE" => Arc::new(Rmse),
        "MAPE" => Arc::new(Mape),
        "SMAPE" => Arc::new(Smape),
        "MASE" => Arc::new(Mase),
        _ => {
            return Err(TrainerError::ConfigError(format!(
                "Unknown eval metric '{}', available metrics: {:?}",
                name, AVAILABLE_METRICS
            )))
        }
    };
    Ok(metric)
}

/// Metric bound to a horizon and seasonal period, reporting higher-is-better scores
#[derive(Debug, Clone)]
pub struct Scorer {
    metric: Arc<dyn Metric>,
    ctx: MetricContext,
}

impl Scorer {
    /// Create a scorer for the named metric
    pub fn new(
        metric_name: &str,
        prediction_length: usize,
        seasonal_period: Option<usize>,
    ) -> Result<Self> {
        Ok(Self::with_metric(
            metric_from_name(metric_name)?,
            prediction_length,
            seasonal_period,
        ))
    }

    /// Create a scorer around an already constructed metric
    pub fn with_metric(
        metric: Arc<dyn Metric>,
        prediction_length: usize,
        seasonal_period: Option<usize>,
    ) -> Self {
        Self {
            metric,
            ctx: MetricContext {
                prediction_length,
                seasonal_period: seasonal_period.unwrap_or(1).max(1),
            },
        }
    }

    /// Name of the wrapped metric
    pub fn metric_name(&self) -> &'static str {
        self.metric.name()
    }

    /// Coefficient of the wrapped metric
    pub fn coefficient(&self) -> f64 {
        self.metric.coefficient()
    }

    /// Sign prefix used when logging scores ("-" for error metrics)
    pub fn sign_str(&self) -> &'static str {
        if self.coefficient() < 0.0 {
            "-"
        } else {
            ""
        }
    }

    /// Higher-is-better score of `predictions` on `data`
    pub fn score(&self, data: &TimeSeriesFrame, predictions: &Forecast) -> Result<f64> {
        let raw = self.metric.compute(data, predictions, &self.ctx)?;
        Ok(raw * self.metric.coefficient())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(metric_from_name("smape").unwrap().name(), "sMAPE");
        assert_eq!(metric_from_name("MASE").unwrap().name(), "MASE");
    }

    #[test]
    fn test_unknown_metric() {
        let err = metric_from_name("WQL").unwrap_err();
        assert!(matches!(err, TrainerError::ConfigError(_)));
    }

    #[test]
    fn test_scorer_flips_sign() {
        let data = TimeSeriesFrame::new().with_series("a", vec![1.0, 2.0, 3.0]);
        let mut predictions = Forecast::new(1);
        predictions
            .insert("a", ndarray::Array1::from_vec(vec![5.0]))
            .unwrap();

        let scorer = Scorer::new("MAE", 1, None).unwrap();
        assert_eq!(scorer.score(&data, &predictions).unwrap(), -2.0);
        assert_eq!(scorer.sign_str(), "-");
    }
}
