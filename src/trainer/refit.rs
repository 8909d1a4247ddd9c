//! Refit-full: a parallel graph of models trained on all data

use super::scheduler::{unique_name, ValidationPlan};
use super::Trainer;
use crate::data::TimeSeriesFrame;
use crate::error::{Result, TrainerError};
use crate::models::{full_name, ForecastModel};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::info;

impl Trainer {
    fn merge_refit_full_data(
        &self,
        train_data: Option<&TimeSeriesFrame>,
        val_data: Option<&TimeSeriesFrame>,
    ) -> Result<TimeSeriesFrame> {
        let val = match val_data {
            Some(val) => Some(val.clone()),
            None => self.load_val_data()?,
        };
        if val.is_some() {
            return Err(TrainerError::UnsupportedRefitError(
                "Refit-full cannot merge separate validation data, use num_val_windows instead".to_string(),
            ));
        }
        match train_data {
            Some(train) => Ok(train.clone()),
            None => self.load_train_data(),
        }
    }

    /// Give a refit model a free name (`<name>_FULL`, then `<name>_FULL_2`, ...)
    /// and the matching path.
    fn assign_refit_name(&self, model: &mut dyn ForecastModel) {
        let name = unique_name(model.name(), &self.banned_names());
        if name != model.name() {
            info!(from = %model.name(), to = %name, "Renaming refit model to avoid a name collision");
        }
        let path = self.model_path(&name);
        let state = model.state_mut();
        state.name = name;
        state.path = path;
    }

    /// Whether `full`, a registered model, is the refit counterpart of `name`
    fn is_refit_of(&self, name: &str, full: &str) -> Result<bool> {
        let original = self.graph.record(name)?;
        let candidate = self.graph.record(full)?;
        Ok(candidate.model_type == original.model_type && candidate.val_score.is_none())
    }

    /// Refit `models` (default: all) on the full training data.
    ///
    /// Models are processed bases first. Refittable models are retrained from
    /// a fresh template; the others are copied as fitted, with ensembles
    /// pointed at the refit counterparts of their bases. Returns the names of
    /// the new models.
    pub fn refit_single_full(
        &mut self,
        train_data: Option<&TimeSeriesFrame>,
        val_data: Option<&TimeSeriesFrame>,
        models: Option<Vec<String>>,
    ) -> Result<Vec<String>> {
        let data = self.merge_refit_full_data(train_data, val_data)?;
        let mut models = models.unwrap_or_else(|| self.graph.model_names(None));
        for name in &models {
            self.graph.record(name)?;
        }
        let levels = self.graph.levels();
        models.sort_by_key(|name| levels.get(name).copied().unwrap_or(0));

        let plan = ValidationPlan {
            fit_data: data,
            val_hint: None,
            windows: Vec::new(),
        };
        let mut new_full: BTreeMap<String, String> = BTreeMap::new();
        let mut refit_names = Vec::new();

        for name in models {
            let model = self.load_model(&name)?;
            let trained = if model.can_refit_full() {
                let mut template = model.refit_full_template()?;
                self.assign_refit_name(template.as_mut());
                self.train_and_save(&plan, template, None)?
            } else {
                let mut copy = model.refit_full_copy();
                self.assign_refit_name(copy.as_mut());
                let base_models = if copy.is_ensemble() {
                    let mut mapping = self.model_full_dict.clone();
                    mapping.extend(new_full.iter().map(|(k, v)| (k.clone(), v.clone())));
                    copy.remap_base_models(&mapping);
                    copy.base_model_names()
                } else {
                    None
                };
                let copy_name = copy.name().to_string();
                self.save_model(copy.as_ref())?;
                self.register_model(copy, base_models.as_deref())?;
                vec![copy_name]
            };
            if let [full] = trained.as_slice() {
                new_full.insert(name.clone(), full.clone());
            }
            refit_names.extend(trained);
        }

        self.model_full_dict.extend(new_full);
        self.save()?;
        Ok(refit_names)
    }

    /// Refit `"all"` models, the `"best"` model, or one named model, together
    /// with everything they depend on.
    ///
    /// Models that already have a refit counterpart, and refit counterparts
    /// themselves, are skipped. An existing `<name>_FULL` model is taken as the
    /// counterpart only when it has the same type and no validation score;
    /// otherwise the refit model gets the next free name. Returns the full original to refit name map.
    pub fn refit_full(&mut self, model: &str) -> Result<BTreeMap<String, String>> {
        let start = Instant::now();
        let candidates = match model {
            "all" => self.graph.model_names(None),
            "best" => {
                let best = self.get_model_best()?;
                self.graph.minimum_dependency_set(&best, true)?
            }
            name => self.graph.minimum_dependency_set(name, true)?,
        };

        let refit_values: BTreeSet<String> = self.model_full_dict.values().cloned().collect();
        let mut pending = Vec::new();
        for name in candidates {
            if refit_values.contains(&name) || self.model_full_dict.contains_key(&name) {
                continue;
            }
            let full = full_name(&name);
            if self.graph.contains(&full)
                && !refit_values.contains(&full)
                && self.is_refit_of(&name, &full)?
            {
                self.model_full_dict.insert(name, full);
                continue;
            }
            pending.push(name);
        }

        if pending.is_empty() {
            info!(scope = model, "All requested models are already refit");
        } else {
            info!(scope = model, models = ?pending, "Refitting models on the full data");
            let refit = self.refit_single_full(None, None, Some(pending))?;
            info!(
                models = ?refit,
                elapsed = start.elapsed().as_secs_f64(),
                "Refit complete"
            );
        }
        Ok(self.model_full_dict.clone())
    }
}
