//! End-to-end tests: dataset file to trained model to persisted artifact to
//! predictions and evaluation.

use spamguard_classifiers::prelude::*;
use spamguard_classifiers::{ClassifierConfig, FeaturizerConfig, TrainerConfig};
use spamguard_core::{Error, LabeledExample, Verdict};
use std::io::Write;

const PROBES: &[&str] = &[
    "You won a million dollars!",
    "WIN FREE MONEY NOW",
    "status meeting moved to 6pm",
    "",
    "   ",
    "ÜNÏCÖDÉ ✉️ 🚀 spam?",
    "claim claim claim claim your prize prize",
];

fn toy_dataset() -> Dataset {
    Dataset::from_examples(vec![
        LabeledExample::spam("WIN FREE MONEY NOW"),
        LabeledExample::ham("meeting at 5pm tomorrow"),
        LabeledExample::spam("claim your prize"),
        LabeledExample::ham("project status update"),
    ])
}

fn write_dataset(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("spam.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn test_toy_model_flags_unseen_spam() {
    let model = Trainer::default().fit(&toy_dataset()).unwrap();
    let prediction = Predictor::from_model(model)
        .predict("You won a million dollars!")
        .unwrap();

    assert!(prediction.is_spam, "{:?}", prediction);
    assert!(prediction.probability > 0.5);
}

#[test]
fn test_training_set_accuracy_floor() {
    let dataset = toy_dataset();
    let model = Trainer::default().fit(&dataset).unwrap();
    let metrics = Evaluator::new().evaluate(&model, &dataset).unwrap();

    assert!(metrics.accuracy >= 0.75, "{}", metrics);
    assert_eq!(metrics.examples, 4);
    assert!((0.0..=1.0).contains(&metrics.auc));
}

#[test]
fn test_all_ham_is_insufficient() {
    let dataset = Dataset::from_examples(vec![
        LabeledExample::ham("meeting at 5pm tomorrow"),
        LabeledExample::ham("project status update"),
    ]);
    let err = Trainer::default().fit(&dataset).unwrap_err();
    assert!(matches!(err, Error::InsufficientData { .. }));
}

#[test]
fn test_predict_without_model() {
    let predictor = Predictor::new(ModelHandle::new());
    assert!(matches!(predictor.predict("hi"), Err(Error::ModelNotLoaded)));
}

#[test]
fn test_determinism_across_runs() {
    let a = Trainer::default().fit(&toy_dataset()).unwrap();
    let b = Trainer::default().fit(&toy_dataset()).unwrap();
    for probe in PROBES {
        assert_eq!(a.predict(probe, 0.5), b.predict(probe, 0.5), "probe {:?}", probe);
    }
}

#[test]
fn test_save_load_predictions_match_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let model = Trainer::default().fit(&toy_dataset()).unwrap();

    ModelStore::save(&model, &path).unwrap();
    let loaded = ModelStore::load(&path).unwrap();

    for probe in PROBES {
        assert_eq!(model.predict(probe, 0.5), loaded.predict(probe, 0.5), "probe {:?}", probe);
    }
}

#[test]
fn test_file_to_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dataset(
        &dir,
        "Message;IsSpam\n\
         WIN FREE MONEY NOW;true\n\
         meeting at 5pm tomorrow;false\n\
         claim your prize;true\n\
         project status update;false\n",
    );

    let config = ClassifierConfig::default();
    let dataset = Dataset::load(&path, &config.dataset).unwrap();
    let model = Trainer::from_config(&config).fit(&dataset).unwrap();
    let predictor = Predictor::from_config(ModelHandle::with_model(model), &config).unwrap();

    match predictor.verdict("You won a million dollars!") {
        Verdict::Spam { probability } => assert!(probability > 0.5),
        other => panic!("expected spam, got {:?}", other),
    }
    assert!(predictor.verdict("").is_available());
}

#[test]
fn test_retrain_swap_serves_new_model() {
    let handle = ModelHandle::with_model(Trainer::default().fit(&toy_dataset()).unwrap());
    let predictor = Predictor::new(handle.clone());
    let before = predictor.predict("cheap pills online").unwrap();

    let mut examples = toy_dataset().examples().to_vec();
    examples.push(LabeledExample::spam("cheap pills online"));
    examples.push(LabeledExample::ham("pills for the team offsite"));
    let bigger = Dataset::from_examples(examples);

    let generation = handle
        .replace_with(|| Trainer::default().fit(&bigger))
        .unwrap();
    assert_eq!(generation, 2);

    let after = predictor.predict("cheap pills online").unwrap();
    assert!(after.probability > before.probability);

    // a failed retrain leaves the retrained model in place
    let current = handle.current().unwrap().id();
    assert!(handle.replace_with(|| Trainer::default().fit(&Dataset::default())).is_err());
    assert_eq!(handle.current().unwrap().id(), current);
}

#[test]
fn test_holdout_evaluation() {
    let examples = (0..40).map(|i| {
        if i % 2 == 0 {
            LabeledExample::spam(format!("claim your free prize number {}", i))
        } else {
            LabeledExample::ham(format!("notes from standup {}", i))
        }
    });
    let dataset = Dataset::from_examples(examples);
    let (train, holdout) = dataset.split(0.25, 3).unwrap();
    assert_eq!(holdout.len(), 10);

    let config = TrainerConfig {
        epochs: 30,
        ..Default::default()
    };
    let model = Trainer::new(FeaturizerConfig::default(), config)
        .fit(&train)
        .unwrap();
    let metrics = Evaluator::new().evaluate(&model, &holdout).unwrap();
    assert!(metrics.accuracy >= 0.9, "{}", metrics);
}

#[test]
fn test_evaluate_empty_dataset() {
    let model = Trainer::default().fit(&toy_dataset()).unwrap();
    let err = Evaluator::new().evaluate(&model, &Dataset::default()).unwrap_err();
    assert!(matches!(err, Error::EmptyDataset));
}
