//! Point forecasts keyed by item

use crate::error::{Result, TrainerError};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point forecast for each item over the prediction horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    prediction_length: usize,
    values: BTreeMap<String, Array1<f64>>,
}

impl Forecast {
    /// Create an empty forecast for the given horizon
    pub fn new(prediction_length: usize) -> Self {
        Self {
            prediction_length,
            values: BTreeMap::new(),
        }
    }

    /// Forecast horizon
    pub fn prediction_length(&self) -> usize {
        self.prediction_length
    }

    /// Add one item's forecast
    pub fn insert(&mut self, item_id: impl Into<String>, values: Array1<f64>) -> Result<()> {
        let item_id = item_id.into();
        if values.len() != self.prediction_length {
            return Err(TrainerError::PredictionError(format!(
                "Forecast for item {} has {} steps, expected {}",
                item_id,
                values.len(),
                self.prediction_length
            )));
        }
        self.values.insert(item_id, values);
        Ok(())
    }

    /// Forecast for one item
    pub fn get(&self, item_id: &str) -> Option<&Array1<f64>> {
        self.values.get(item_id)
    }

    /// Iterate items in id order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Array1<f64>)> {
        self.values.iter()
    }

    /// Number of items
    pub fn num_items(&self) -> usize {
        self.values.len()
    }

    /// Combine several forecasts with the given weights.
    ///
    /// All forecasts must cover the same items and horizon. Weights are used as
    /// given; callers normalize them.
    pub fn weighted_sum(parts: &[(&Forecast, f64)]) -> Result<Forecast> {
        let (first, _) = parts.first().ok_or_else(|| {
            TrainerError::PredictionError("Cannot combine zero forecasts".to_string())
        })?;

        let mut combined = Forecast::new(first.prediction_length);
        for item_id in first.values.keys() {
            let mut acc = Array1::<f64>::zeros(first.prediction_length);
            for (forecast, weight) in parts {
                let values = forecast.get(item_id).ok_or_else(|| {
                    TrainerError::PredictionError(format!(
                        "Item {} missing from one of the combined forecasts",
                        item_id
                    ))
                })?;
                if values.len() != acc.len() {
                    return Err(TrainerError::PredictionError(format!(
                        "Horizon mismatch for item {}",
                        item_id
                    )));
                }
                acc.scaled_add(*weight, values);
            }
            combined.values.insert(item_id.clone(), acc);
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_insert_checks_horizon() {
        let mut forecast = Forecast::new(2);
        assert!(forecast.insert("a", array![1.0, 2.0]).is_ok());
        assert!(forecast.insert("b", array![1.0]).is_err());
    }

    #[test]
    fn test_weighted_sum() {
        let mut f1 = Forecast::new(2);
        f1.insert("a", array![1.0, 1.0]).unwrap();
        let mut f2 = Forecast::new(2);
        f2.insert("a", array![3.0, 5.0]).unwrap();

        let combined = Forecast::weighted_sum(&[(&f1, 0.5), (&f2, 0.5)]).unwrap();
        assert_eq!(combined.get("a").unwrap().to_vec(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_weighted_sum_missing_item() {
        let mut f1 = Forecast::new(1);
        f1.insert("a", array![1.0]).unwrap();
        let f2 = Forecast::new(1);
        assert!(Forecast::weighted_sum(&[(&f1, 0.5), (&f2, 0.5)]).is_err());
    }
}
