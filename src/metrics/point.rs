//! Point forecast metrics

use super::{Metric, MetricContext};
use crate::data::{Forecast, TimeSeriesFrame};
use crate::error::{Result, TrainerError};
use ndarray::{s, ArrayView1};

/// Per-item view of history, ground truth and forecast
struct Aligned<'a> {
    past: ArrayView1<'a, f64>,
    truth: ArrayView1<'a, f64>,
    pred: ArrayView1<'a, f64>,
}

fn align<'a>(
    data: &'a TimeSeriesFrame,
    predictions: &'a Forecast,
    ctx: &MetricContext,
) -> Result<Vec<Aligned<'a>>> {
    let horizon = ctx.prediction_length;
    let mut aligned = Vec::with_capacity(data.num_items());
    for (item_id, series) in data.iter() {
        if series.len() < horizon {
            return Err(TrainerError::DataError(format!(
                "Item {} is shorter than the prediction length {}",
                item_id, horizon
            )));
        }
        let pred = predictions.get(item_id).ok_or_else(|| {
            TrainerError::PredictionError(format!("No forecast for item {}", item_id))
        })?;
        if pred.len() != horizon {
            return Err(TrainerError::PredictionError(format!(
                "Forecast for item {} has {} steps, expected {}",
                item_id,
                pred.len(),
                horizon
            )));
        }
        let split = series.len() - horizon;
        aligned.push(Aligned {
            past: series.target.slice(s![..split]),
            truth: series.target.slice(s![split..]),
            pred: pred.view(),
        });
    }
    if aligned.is_empty() {
        return Err(TrainerError::DataError(
            "Cannot score an empty frame".to_string(),
        ));
    }
    Ok(aligned)
}

fn mean_over_points<F>(aligned: &[Aligned<'_>], f: F) -> Result<f64>
where
    F: Fn(f64, f64) -> Option<f64>,
{
    let mut total = 0.0;
    let mut count = 0usize;
    for item in aligned {
        for (&y, &y_hat) in item.truth.iter().zip(item.pred.iter()) {
            if let Some(v) = f(y, y_hat) {
                total += v;
                count += 1;
            }
        }
    }
    if count == 0 {
        return Err(TrainerError::DataError(
            "No valid points to score".to_string(),
        ));
    }
    Ok(total / count as f64)
}

/// Mean absolute error
#[derive(Debug, Clone, Copy, Default)]
pub struct Mae;

impl Metric for Mae {
    fn name(&self) -> &'static str {
        "MAE"
    }

    fn coefficient(&self) -> f64 {
        -1.0
    }

    fn compute(&self, data: &TimeSeriesFrame, predictions: &Forecast, ctx: &MetricContext) -> Result<f64> {
        let aligned = align(data, predictions, ctx)?;
        mean_over_points(&aligned, |y, y_hat| Some((y - y_hat).abs()))
    }
}

/// Root mean squared error
#[derive(Debug, Clone, Copy, Default)]
pub struct Rmse;

impl Metric for Rmse {
    fn name(&self) -> &'static str {
        "RMSE"
    }

    fn coefficient(&self) -> f64 {
        -1.0
    }

    fn compute(&self, data: &TimeSeriesFrame, predictions: &Forecast, ctx: &MetricContext) -> Result<f64> {
        let aligned = align(data, predictions, ctx)?;
        Ok(mean_over_points(&aligned, |y, y_hat| Some((y - y_hat).powi(2)))?.sqrt())
    }
}

/// Mean absolute percentage error; zero targets are skipped
#[derive(Debug, Clone, Copy, Default)]
pub struct Mape;

impl Metric for Mape {
    fn name(&self) -> &'static str {
        "MAPE"
    }

    fn coefficient(&self) -> f64 {
        -1.0
    }

    fn compute(&self, data: &TimeSeriesFrame, predictions: &Forecast, ctx: &MetricContext) -> Result<f64> {
        let aligned = align(data, predictions, ctx)?;
        mean_over_points(&aligned, |y, y_hat| {
            (y != 0.0).then(|| (y - y_hat).abs() / y.abs())
        })
    }
}

/// Symmetric mean absolute percentage error
#[derive(Debug, Clone, Copy, Default)]
pub struct Smape;

impl Metric for Smape {
    fn name(&self) -> &'static str {
        "sMAPE"
    }

    fn coefficient(&self) -> f64 {
        -1.0
    }

    fn compute(&self, data: &TimeSeriesFrame, predictions: &Forecast, ctx: &MetricContext) -> Result<f64> {
        let aligned = align(data, predictions, ctx)?;
        mean_over_points(&aligned, |y, y_hat| {
            let denom = y.abs() + y_hat.abs();
            (denom > 0.0).then(|| 2.0 * (y - y_hat).abs() / denom)
        })
    }
}

/// Mean absolute scaled error.
///
/// Each item's MAE is scaled by the in-sample seasonal naive MAE of its history;
/// items whose scale is zero or undefined are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mase;

impl Metric for Mase {
    fn name(&self) -> &'static str {
        "MASE"
    }

    fn coefficient(&self) -> f64 {
        -1.0
    }

    fn compute(&self, data: &TimeSeriesFrame, predictions: &Forecast, ctx: &MetricContext) -> Result<f64> {
        let aligned = align(data, predictions, ctx)?;
        let m = ctx.seasonal_period.max(1);

        let mut total = 0.0;
        let mut count = 0usize;
        for item in &aligned {
            if item.past.len() <= m {
                continue;
            }
            let scale = item
                .past
                .slice(s![m..])
                .iter()
                .zip(item.past.slice(s![..item.past.len() - m]).iter())
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / (item.past.len() - m) as f64;
            if scale <= f64::EPSILON {
                continue;
            }
            let mae = item
                .truth
                .iter()
                .zip(item.pred.iter())
                .map(|(y, y_hat)| (y - y_hat).abs())
                .sum::<f64>()
                / item.truth.len() as f64;
            total += mae / scale;
            count += 1;
        }

        if count == 0 {
            return Err(TrainerError::DataError(
                "MASE is undefined: no item has a non-zero seasonal naive scale".to_string(),
            ));
        }
        Ok(total / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ctx(prediction_length: usize) -> MetricContext {
        MetricContext {
            prediction_length,
            seasonal_period: 1,
        }
    }

    fn frame_and_forecast() -> (TimeSeriesFrame, Forecast) {
        let data = TimeSeriesFrame::new().with_series("a", vec![1.0, 2.0, 3.0, 4.0, 6.0]);
        let mut forecast = Forecast::new(2);
        forecast.insert("a", array![5.0, 5.0]).unwrap();
        (data, forecast)
    }

    #[test]
    fn test_mae_and_rmse() {
        let (data, forecast) = frame_and_forecast();
        assert!((Mae.compute(&data, &forecast, &ctx(2)).unwrap() - 1.0).abs() < 1e-12);
        assert!((Rmse.compute(&data, &forecast, &ctx(2)).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mape() {
        let (data, forecast) = frame_and_forecast();
        let expected = (1.0 / 4.0 + 1.0 / 6.0) / 2.0;
        assert!((Mape.compute(&data, &forecast, &ctx(2)).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_mase_scales_by_naive_error() {
        let (data, forecast) = frame_and_forecast();
        // history 1,2,3 has a one-step naive MAE of 1.0
        assert!((Mase.compute(&data, &forecast, &ctx(2)).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_item_forecast() {
        let (data, _) = frame_and_forecast();
        let empty = Forecast::new(2);
        assert!(matches!(
            Smape.compute(&data, &empty, &ctx(2)),
            Err(TrainerError::PredictionError(_))
        ));
    }
}
