//! Ranked summary of trained models

use super::scheduler::catch_failure;
use super::Trainer;
use crate::data::TimeSeriesFrame;
use crate::error::{Result, TrainerError};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::time::Instant;
use tracing::warn;

/// One leaderboard entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub model: String,
    /// 1-based registration position
    pub fit_order: usize,
    pub score_val: Option<f64>,
    pub fit_time_marginal: Option<f64>,
    pub pred_time_val: Option<f64>,
    /// Set only when test data was given; NaN when scoring failed
    pub score_test: Option<f64>,
    pub pred_time_test: Option<f64>,
}

impl LeaderboardRow {
    fn sort_key(&self, by_test: bool) -> Option<f64> {
        let score = if by_test { self.score_test } else { self.score_val };
        score.filter(|s| !s.is_nan())
    }
}

/// Leaderboard rows sorted best first
#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    rows: Vec<LeaderboardRow>,
    has_test: bool,
}

impl Leaderboard {
    fn new(mut rows: Vec<LeaderboardRow>, has_test: bool) -> Self {
        rows.sort_by(|a, b| {
            let order = match (a.sort_key(has_test), b.sort_key(has_test)) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            order.then_with(|| b.model.cmp(&a.model))
        });
        Self { rows, has_test }
    }

    pub fn rows(&self) -> &[LeaderboardRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether test columns were computed
    pub fn has_test(&self) -> bool {
        self.has_test
    }

    pub fn get(&self, model: &str) -> Option<&LeaderboardRow> {
        self.rows.iter().find(|row| row.model == model)
    }

    /// Model names in ranking order
    pub fn model_names(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.model.as_str()).collect()
    }
}

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_nan() => "NaN".to_string(),
        Some(v) => format!("{:.4}", v),
        None => "-".to_string(),
    }
}

impl fmt::Display for Leaderboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|row| row.model.len())
            .max()
            .unwrap_or(0)
            .max("model".len());
        write!(f, "{:<width$}  {:>9}", "model", "fit_order", width = width)?;
        if self.has_test {
            write!(f, "  {:>12}  {:>14}", "score_test", "pred_time_test")?;
        }
        writeln!(
            f,
            "  {:>12}  {:>13}  {:>17}",
            "score_val", "pred_time_val", "fit_time_marginal"
        )?;
        for row in &self.rows {
            write!(f, "{:<width$}  {:>9}", row.model, row.fit_order, width = width)?;
            if self.has_test {
                write!(f, "  {:>12}  {:>14}", cell(row.score_test), cell(row.pred_time_test))?;
            }
            writeln!(
                f,
                "  {:>12}  {:>13}  {:>17}",
                cell(row.score_val),
                cell(row.pred_time_val),
                cell(row.fit_time_marginal)
            )?;
        }
        Ok(())
    }
}

impl Trainer {
    /// Leaderboard of every registered model.
    ///
    /// With `data`, each model is also scored on its last `prediction_length`
    /// steps; a model that fails there gets NaN test columns instead of
    /// failing the whole leaderboard.
    pub fn leaderboard(&self, data: Option<&TimeSeriesFrame>) -> Result<Leaderboard> {
        if self.graph.is_empty() {
            return Err(TrainerError::NoModelsError(
                "No models have been trained".to_string(),
            ));
        }
        let inputs = match data {
            Some(data) => Some(data.model_inputs_for_scoring(
                self.config.prediction_length,
                &self.config.known_covariates_names,
            )?),
            None => None,
        };

        let mut rows = Vec::with_capacity(self.graph.len());
        for (ix, name) in self.graph.model_names(None).into_iter().enumerate() {
            let record = self.graph.record(&name)?;
            let mut row = LeaderboardRow {
                model: name.clone(),
                fit_order: ix + 1,
                score_val: record.val_score,
                fit_time_marginal: record.fit_time,
                pred_time_val: record.predict_time,
                score_test: None,
                pred_time_test: None,
            };
            if let (Some(data), Some((past, known))) = (data, &inputs) {
                let start = Instant::now();
                let scored = catch_failure(|| {
                    let forecast = self.predict_model(past, known.as_ref(), &name)?;
                    self.scorer.score(data, &forecast)
                });
                match scored {
                    Ok(score) => {
                        row.score_test = Some(score);
                        row.pred_time_test = Some(start.elapsed().as_secs_f64());
                    }
                    Err(err) => {
                        warn!(model = %name, error = %err, "Model failed to score on the leaderboard data");
                        row.score_test = Some(f64::NAN);
                        row.pred_time_test = Some(f64::NAN);
                    }
                }
            }
            rows.push(row);
        }
        Ok(Leaderboard::new(rows, data.is_some()))
    }
}
