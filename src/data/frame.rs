//! Multi-item time series frame

use crate::error::{Result, TrainerError};
use ndarray::{s, Array1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single item's target values and aligned covariates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Target observations, oldest first
    pub target: Array1<f64>,
    /// Covariate columns aligned with `target`
    #[serde(default)]
    pub covariates: BTreeMap<String, Array1<f64>>,
}

impl TimeSeries {
    /// Create a series without covariates
    pub fn new(target: Array1<f64>) -> Self {
        Self {
            target,
            covariates: BTreeMap::new(),
        }
    }

    /// Number of time steps
    pub fn len(&self) -> usize {
        self.target.len()
    }

    /// Whether the series has no observations
    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    /// Keep the first `len` steps of the target and every covariate
    fn head(&self, len: usize) -> Self {
        Self {
            target: self.target.slice(s![..len]).to_owned(),
            covariates: self
                .covariates
                .iter()
                .map(|(name, values)| (name.clone(), values.slice(s![..len.min(values.len())]).to_owned()))
                .collect(),
        }
    }
}

/// Collection of item series sharing a sampling frequency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesFrame {
    items: BTreeMap<String, TimeSeries>,
    freq: Option<String>,
}

impl TimeSeriesFrame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampling frequency tag (e.g. "D", "H")
    pub fn with_freq(mut self, freq: impl Into<String>) -> Self {
        self.freq = Some(freq.into());
        self
    }

    /// Add an item series from raw values
    pub fn with_series(mut self, item_id: impl Into<String>, values: Vec<f64>) -> Self {
        self.items
            .insert(item_id.into(), TimeSeries::new(Array1::from_vec(values)));
        self
    }

    /// Attach a covariate column to an existing item
    pub fn with_covariate(
        mut self,
        item_id: &str,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let series = self
            .items
            .get_mut(item_id)
            .ok_or_else(|| TrainerError::DataError(format!("Unknown item: {}", item_id)))?;
        if values.len() != series.len() {
            return Err(TrainerError::DataError(format!(
                "Covariate length {} does not match target length {} for item {}",
                values.len(),
                series.len(),
                item_id
            )));
        }
        series.covariates.insert(name.into(), Array1::from_vec(values));
        Ok(self)
    }

    /// Insert or replace an item series
    pub fn insert(&mut self, item_id: impl Into<String>, series: TimeSeries) {
        self.items.insert(item_id.into(), series);
    }

    /// Sampling frequency, if known
    pub fn freq(&self) -> Option<&str> {
        self.freq.as_deref()
    }

    /// Number of items
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Whether the frame holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Length of the shortest item series (0 for an empty frame)
    pub fn min_length(&self) -> usize {
        self.items.values().map(TimeSeries::len).min().unwrap_or(0)
    }

    /// Look up one item
    pub fn get(&self, item_id: &str) -> Option<&TimeSeries> {
        self.items.get(item_id)
    }

    /// Iterate items in id order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TimeSeries)> {
        self.items.iter()
    }

    /// Item ids in order
    pub fn item_ids(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }

    /// Drop the last `n` steps of every item.
    ///
    /// Every item must keep at least one observation.
    pub fn truncate_end(&self, n: usize) -> Result<Self> {
        let mut items = BTreeMap::new();
        for (item_id, series) in &self.items {
            if series.len() <= n {
                return Err(TrainerError::DataError(format!(
                    "Item {} has {} observations, cannot drop the last {}",
                    item_id,
                    series.len(),
                    n
                )));
            }
            items.insert(item_id.clone(), series.head(series.len() - n));
        }
        Ok(Self {
            items,
            freq: self.freq.clone(),
        })
    }

    /// Split off a scoring window.
    ///
    /// The test frame is this frame with the last `end_offset` steps removed;
    /// the train frame additionally drops the final `prediction_length` steps.
    pub fn train_test_split(
        &self,
        prediction_length: usize,
        end_offset: usize,
    ) -> Result<(Self, Self)> {
        let test = if end_offset == 0 {
            self.clone()
        } else {
            self.truncate_end(end_offset)?
        };
        let train = test.truncate_end(prediction_length)?;
        Ok((train, test))
    }

    /// Inputs a model sees when it is scored on this frame.
    ///
    /// Returns the past (everything but the final `prediction_length` steps) and,
    /// when covariate names are given, a frame holding only those covariates over
    /// the forecast horizon.
    pub fn model_inputs_for_scoring(
        &self,
        prediction_length: usize,
        known_covariates_names: &[String],
    ) -> Result<(Self, Option<Self>)> {
        let past = self.truncate_end(prediction_length)?;
        if known_covariates_names.is_empty() {
            return Ok((past, None));
        }

        let mut known = Self {
            items: BTreeMap::new(),
            freq: self.freq.clone(),
        };
        for (item_id, series) in &self.items {
            let start = series.len() - prediction_length;
            let mut covariates = BTreeMap::new();
            for name in known_covariates_names {
                let values = series.covariates.get(name).ok_or_else(|| {
                    TrainerError::DataError(format!(
                        "Known covariate {} missing for item {}",
                        name, item_id
                    ))
                })?;
                if values.len() != series.len() {
                    return Err(TrainerError::DataError(format!(
                        "Known covariate {} has length {}, expected {} for item {}",
                        name,
                        values.len(),
                        series.len(),
                        item_id
                    )));
                }
                covariates.insert(name.clone(), values.slice(s![start..]).to_owned());
            }
            known.items.insert(
                item_id.clone(),
                TimeSeries {
                    target: Array1::zeros(0),
                    covariates,
                },
            );
        }
        Ok((past, Some(known)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> TimeSeriesFrame {
        TimeSeriesFrame::new()
            .with_freq("D")
            .with_series("a", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .with_series("b", vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0])
    }

    #[test]
    fn test_truncate_end() {
        let frame = sample_frame().truncate_end(2).unwrap();
        assert_eq!(frame.get("a").unwrap().target.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frame.freq(), Some("D"));
    }

    #[test]
    fn test_truncate_too_far() {
        assert!(sample_frame().truncate_end(6).is_err());
    }

    #[test]
    fn test_train_test_split_with_offset() {
        let (train, test) = sample_frame().train_test_split(2, 1).unwrap();
        assert_eq!(test.get("b").unwrap().len(), 5);
        assert_eq!(train.get("b").unwrap().len(), 3);
    }

    #[test]
    fn test_scoring_inputs_with_covariates() {
        let frame = sample_frame()
            .with_covariate("a", "promo", vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0])
            .unwrap()
            .with_covariate("b", "promo", vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0])
            .unwrap();
        let (past, known) = frame
            .model_inputs_for_scoring(2, &["promo".to_string()])
            .unwrap();
        assert_eq!(past.min_length(), 4);
        let known = known.unwrap();
        assert_eq!(
            known.get("a").unwrap().covariates["promo"].to_vec(),
            vec![1.0, 1.0]
        );
    }

    #[test]
    fn test_scoring_inputs_missing_covariate() {
        let result = sample_frame().model_inputs_for_scoring(1, &["price".to_string()]);
        assert!(matches!(result, Err(TrainerError::DataError(_))));
    }

    #[test]
    fn test_scoring_inputs_short_covariate() {
        let mut frame = sample_frame();
        let mut series = frame.get("a").unwrap().clone();
        series
            .covariates
            .insert("promo".to_string(), Array1::from_vec(vec![1.0]));
        frame.insert("a", series);

        let result = frame.model_inputs_for_scoring(2, &["promo".to_string()]);
        assert!(matches!(result, Err(TrainerError::DataError(_))));
    }
}
