//! Logistic regression training
//!
//! The pipeline order is fixed: featurize, fit the label encoding, scale,
//! fit the classifier, wrap. The classifier is fitted with plain SGD over a
//! seeded shuffle, so the same dataset and seed always produce the same
//! parameters.

use crate::config::{ClassifierConfig, FeaturizerConfig, TrainerConfig};
use crate::dataset::Dataset;
use crate::featurizer::{Featurizer, FittedFeaturizer, MinMaxScaler, SparseFeatures};
use crate::model::{sigmoid, LabelEncoding, LogisticRegression, TrainedModel};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use spamguard_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Per-epoch decay of the step size: `lr / (1 + decay * epoch)`
const LEARNING_RATE_DECAY: f64 = 0.01;

/// Fold the weight scale back into the weights below this value
const MIN_WEIGHT_SCALE: f64 = 1e-9;

/// Fits [`TrainedModel`]s
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    featurizer: FeaturizerConfig,
    config: TrainerConfig,
}

impl Trainer {
    /// Create a trainer
    pub fn new(featurizer: FeaturizerConfig, config: TrainerConfig) -> Self {
        Self { featurizer, config }
    }

    /// Create a trainer from the engine configuration
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(config.featurizer.clone(), config.trainer.clone())
    }

    /// Training settings
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Train a model on a dataset
    pub fn fit(&self, dataset: &Dataset) -> Result<TrainedModel> {
        self.fit_with_cancel(dataset, &AtomicBool::new(false))
    }

    /// Train a model, giving up with [`Error::Timeout`] once `cancel` is set.
    ///
    /// The flag is checked between epochs.
    pub fn fit_with_cancel(&self, dataset: &Dataset, cancel: &AtomicBool) -> Result<TrainedModel> {
        let start = Instant::now();
        let texts = dataset.texts();

        // featurize
        let vectorizer = Featurizer::new(self.featurizer.clone()).fit_vectorizer(&texts)?;
        let raw = vectorizer.vectorize_batch(&texts);

        // encode labels
        let labels = LabelEncoding::fit(&dataset.labels())?;
        let targets: Vec<f64> = dataset.iter().map(|e| labels.encode(e.is_spam)).collect();

        // normalize
        let scaler = MinMaxScaler::fit(vectorizer.dimension(), &raw)?;
        let rows: Vec<SparseFeatures> = raw.iter().map(|row| scaler.scale(row)).collect();
        let featurizer = FittedFeaturizer::new(vectorizer, scaler);

        info!(
            "Training on {} examples ({} spam, {} ham), {} features",
            dataset.len(),
            labels.spam_count,
            labels.ham_count,
            featurizer.dimension()
        );

        // fit classifier
        let fit = Sgd::new(featurizer.dimension(), &self.config).run(&rows, &targets, cancel)?;

        // wrap
        let model = TrainedModel::with_training_stats(
            featurizer,
            labels,
            fit.classifier,
            fit.epochs_run,
            fit.final_loss,
        )?;

        info!(
            "Trained model {} in {:?} ({} epochs, loss {:.6})",
            model.id(),
            start.elapsed(),
            fit.epochs_run,
            fit.final_loss
        );
        Ok(model)
    }
}

struct SgdFit {
    classifier: LogisticRegression,
    epochs_run: usize,
    final_loss: f64,
}

/// SGD state. The true weights are `scale * weights`; L2 shrinkage only
/// touches `scale`, so each step costs the row's non-zeros, not the dimension.
struct Sgd<'a> {
    config: &'a TrainerConfig,
    weights: Vec<f64>,
    scale: f64,
    bias: f64,
}

impl<'a> Sgd<'a> {
    fn new(dimension: usize, config: &'a TrainerConfig) -> Self {
        Self {
            config,
            weights: vec![0.0; dimension],
            scale: 1.0,
            bias: 0.0,
        }
    }

    fn run(mut self, rows: &[SparseFeatures], targets: &[f64], cancel: &AtomicBool) -> Result<SgdFit> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut order: Vec<usize> = (0..rows.len()).collect();
        let mut previous = self.loss(rows, targets);
        let mut epochs_run = 0;

        for epoch in 0..self.config.epochs {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Timeout);
            }

            let eta = self.config.learning_rate / (1.0 + LEARNING_RATE_DECAY * epoch as f64);
            let shrink = 1.0 - eta * self.config.l2_regularization;
            if shrink <= 0.0 {
                return Err(Error::config(format!(
                    "learning_rate {} is too large for l2_regularization {}",
                    eta, self.config.l2_regularization
                )));
            }

            order.shuffle(&mut rng);
            for &i in &order {
                self.step(&rows[i], targets[i], eta, shrink);
            }
            epochs_run = epoch + 1;

            let loss = self.loss(rows, targets);
            debug!("epoch {}: loss {:.6}", epochs_run, loss);
            if !loss.is_finite() {
                return Err(Error::internal(format!("training diverged at epoch {}", epochs_run)));
            }
            if (previous - loss).abs() < self.config.convergence_tolerance {
                debug!("Converged after {} epochs", epochs_run);
                previous = loss;
                break;
            }
            previous = loss;
        }

        Ok(SgdFit {
            classifier: self.into_classifier(),
            epochs_run,
            final_loss: previous,
        })
    }

    fn decision(&self, row: &SparseFeatures) -> f64 {
        let dot: f64 = row.iter().map(|(j, x)| self.weights[j] * x).sum();
        self.scale * dot + self.bias
    }

    fn step(&mut self, row: &SparseFeatures, target: f64, eta: f64, shrink: f64) {
        let gradient = sigmoid(self.decision(row)) - target;

        self.scale *= shrink;
        if self.scale < MIN_WEIGHT_SCALE {
            for w in &mut self.weights {
                *w *= self.scale;
            }
            self.scale = 1.0;
        }

        let update = eta * gradient / self.scale;
        for (j, x) in row.iter() {
            self.weights[j] -= update * x;
        }
        self.bias -= eta * gradient;
    }

    /// Mean logistic loss plus `0.5 * l2 * |w|^2`
    fn loss(&self, rows: &[SparseFeatures], targets: &[f64]) -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        let data: f64 = rows
            .iter()
            .zip(targets)
            .map(|(row, y)| {
                let z = self.decision(row);
                softplus(z) - y * z
            })
            .sum::<f64>()
            / rows.len() as f64;

        let norm: f64 = self.weights.iter().map(|w| w * w).sum::<f64>() * self.scale * self.scale;
        data + 0.5 * self.config.l2_regularization * norm
    }

    fn into_classifier(self) -> LogisticRegression {
        let scale = self.scale;
        LogisticRegression::new(self.weights.into_iter().map(|w| w * scale).collect(), self.bias)
    }
}

/// `ln(1 + e^z)` without overflow
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}
