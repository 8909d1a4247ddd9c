//! Integration test: saving, loading and relocating trainers on disk

mod common;

use common::{config, copy_dir, registry, sample_frame, temp_dir};
use kolosal_trainer::config::{FitOptions, TuningConfig};
use kolosal_trainer::storage::FileArtifactStore;
use kolosal_trainer::trainer::Trainer;
use kolosal_trainer::tuning::{ModelSpec, Space};
use std::sync::Arc;

fn specs() -> Vec<ModelSpec> {
    vec![ModelSpec::new("Naive"), ModelSpec::new("SimpleExponentialSmoothing")]
}

/// Everything about each model except where it is stored
type RecordSummary = (String, String, Option<f64>, Option<f64>, Option<f64>, Vec<String>);

fn record_summaries(trainer: &Trainer) -> Vec<RecordSummary> {
    trainer
        .graph()
        .records()
        .map(|r| {
            (
                r.name.clone(),
                r.model_type.clone(),
                r.fit_time,
                r.predict_time,
                r.val_score,
                trainer.graph().base_models(&r.name).unwrap(),
            )
        })
        .collect()
}

fn load(path: &std::path::Path, reset_paths: bool) -> Trainer {
    Trainer::load_with(path, reset_paths, Arc::new(FileArtifactStore::new()), registry()).unwrap()
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = temp_dir("roundtrip");
    let data = sample_frame(40);
    let mut trainer = Trainer::new(&dir, config()).unwrap().with_registry(registry());
    let trained = trainer.fit(&data, &specs(), None, FitOptions::new()).unwrap();
    let expected = trainer.predict(&data, None, None).unwrap().unwrap();

    let mut loaded = load(&dir, false);

    assert_eq!(loaded.get_model_names(None), trained);
    assert_eq!(loaded.config(), trainer.config());
    assert_eq!(loaded.load_train_data().unwrap(), data);
    let forecast = loaded.predict(&data, None, None).unwrap().unwrap();
    assert_eq!(forecast, expected);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_load_with_reset_paths_after_move() {
    let original = temp_dir("moved_from");
    let moved = temp_dir("moved_to");
    let data = sample_frame(40);
    let mut trainer = Trainer::new(&original, config()).unwrap().with_registry(registry());
    trainer.fit(&data, &specs(), None, FitOptions::new()).unwrap();
    let tuned = vec![ModelSpec::new("SimpleExponentialSmoothing").with_space("alpha", Space::real(0.1, 0.9))];
    trainer
        .fit(
            &data,
            &tuned,
            None,
            FitOptions::new().with_tuning(TuningConfig::new().with_num_trials(2)),
        )
        .unwrap();
    trainer.refit_full("Naive").unwrap();

    let records = record_summaries(&trainer);
    let full_dict = trainer.model_full_dict().clone();
    let hpo_results = trainer.hpo_results().clone();
    assert!(!full_dict.is_empty());
    assert!(!hpo_results.is_empty());

    copy_dir(&original, &moved);
    std::fs::remove_dir_all(&original).unwrap();

    let mut relocated = load(&moved, true);
    assert_eq!(relocated.path(), moved.as_path());
    for record in relocated.graph().records() {
        assert!(record.path.starts_with(&moved), "{:?} was not rewritten", record.path);
    }
    assert_eq!(record_summaries(&relocated), records);
    assert_eq!(relocated.model_full_dict(), &full_dict);
    assert_eq!(relocated.hpo_results().len(), hpo_results.len());
    for (tuned, trials) in &hpo_results {
        let moved_trials = &relocated.hpo_results()[tuned];
        assert_eq!(moved_trials.len(), trials.len());
        for (trial, before) in trials {
            let after = &moved_trials[trial];
            assert!(after.path.starts_with(&moved), "{:?} was not rewritten", after.path);
            assert_eq!(after.path.strip_prefix(&moved).ok(), before.path.strip_prefix(&original).ok());
            assert_eq!(after.val_score, before.val_score);
            assert_eq!(after.hyperparameters, before.hyperparameters);
        }
    }
    assert!(relocated
        .predict(&data, None, Some("SimpleExponentialSmoothing_2/T1"))
        .unwrap()
        .is_some());
    assert!(relocated.predict(&data, None, Some("Naive")).unwrap().is_some());
    assert!(relocated.leaderboard(Some(&sample_frame(43))).is_ok());

    let _ = std::fs::remove_dir_all(&moved);
}

#[test]
fn test_info_records() {
    let dir = temp_dir("info");
    let data = sample_frame(40);
    let mut trainer = Trainer::new(&dir, config()).unwrap().with_registry(registry());
    trainer.fit(&data, &specs(), None, FitOptions::new()).unwrap();

    let info = trainer.save_info(true).unwrap();
    assert_eq!(info.num_models_trained, 3);
    assert_eq!(info.eval_metric, "MASE");
    assert!(info.best_model.is_some());
    assert!(info.best_model_score_val.is_some());
    let model_info = info.model_info.unwrap();
    assert_eq!(model_info.len(), 3);
    assert_eq!(
        model_info["WeightedEnsemble"].base_models.as_ref().map(|b| b.is_empty()),
        Some(false)
    );
    assert!(dir.join("info.json").exists());
    assert!(dir.join("trainer.json").exists());
    assert!(dir.join("models").join("Naive").join("model.json").exists());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_refit_after_reload_uses_cached_data() {
    let dir = temp_dir("refit_reload");
    let data = sample_frame(40);
    let mut trainer = Trainer::new(&dir, config()).unwrap().with_registry(registry());
    trainer.fit(&data, &specs(), None, FitOptions::new()).unwrap();

    let mut loaded = load(&dir, false);
    let mapping = loaded.refit_full("all").unwrap();
    assert_eq!(mapping.len(), 3);

    let reloaded = load(&dir, false);
    assert_eq!(reloaded.model_full_dict(), &mapping);

    let _ = std::fs::remove_dir_all(&dir);
}
