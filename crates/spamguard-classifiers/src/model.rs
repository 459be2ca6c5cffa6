//! Trained model: fitted featurizer, label encoding and logistic regression

use crate::classifier::SPAM_LABEL;
use crate::featurizer::{FeatureVector, FittedFeaturizer, SparseFeatures};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spamguard_core::{Error, Prediction, Result};
use uuid::Uuid;

/// Numerically stable logistic function
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Binary logistic regression: `p(spam) = sigmoid(w · x + b)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegression {
    /// Create a classifier from explicit parameters
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    /// Number of input features
    pub fn dimension(&self) -> usize {
        self.weights.len()
    }

    /// Feature weights
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Intercept
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Raw score of a dense vector
    pub fn decision(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.weights.len() {
            return Err(Error::internal(format!(
                "feature vector has {} dimensions, classifier expects {}",
                features.len(),
                self.weights.len()
            )));
        }
        let dot: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum();
        Ok(dot + self.bias)
    }

    /// Spam probability of a dense vector
    pub fn probability(&self, features: &[f64]) -> Result<f64> {
        self.decision(features).map(sigmoid)
    }

    /// Raw score of a sparse vector
    pub fn decision_sparse(&self, features: &SparseFeatures) -> f64 {
        let dot: f64 = features
            .iter()
            .map(|(index, value)| self.weights.get(index).copied().unwrap_or(0.0) * value)
            .sum();
        dot + self.bias
    }

    /// Spam probability of a sparse vector
    pub fn probability_sparse(&self, features: &SparseFeatures) -> f64 {
        sigmoid(self.decision_sparse(features))
    }

    fn is_finite(&self) -> bool {
        self.bias.is_finite() && self.weights.iter().all(|w| w.is_finite())
    }
}

/// Mapping between the boolean label and the classifier's target.
///
/// Spam is always the positive class (target 1.0); the mapping is stored
/// with the model and checked on load so the classes can never swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoding {
    /// Name of the positive class
    positive: String,

    /// Spam examples seen during training
    pub spam_count: usize,

    /// Not-spam examples seen during training
    pub ham_count: usize,
}

impl LabelEncoding {
    /// Fit on training labels; both classes must be present
    pub fn fit(labels: &[bool]) -> Result<Self> {
        let spam_count = labels.iter().filter(|l| **l).count();
        let ham_count = labels.len() - spam_count;
        if spam_count == 0 || ham_count == 0 {
            return Err(Error::InsufficientData {
                distinct_labels: usize::from(spam_count > 0) + usize::from(ham_count > 0),
            });
        }
        Ok(Self {
            positive: SPAM_LABEL.to_string(),
            spam_count,
            ham_count,
        })
    }

    /// Classifier target for a label
    pub fn encode(&self, is_spam: bool) -> f64 {
        if is_spam {
            1.0
        } else {
            0.0
        }
    }

    /// Label for a spam probability under an inclusive threshold
    pub fn decode(&self, probability: f64, threshold: f64) -> bool {
        probability >= threshold
    }

    /// Total number of training labels
    pub fn total(&self) -> usize {
        self.spam_count + self.ham_count
    }

    fn validate(&self) -> Result<()> {
        if self.positive != SPAM_LABEL {
            return Err(Error::corrupt(format!(
                "positive class is '{}', expected '{}'",
                self.positive, SPAM_LABEL
            )));
        }
        Ok(())
    }
}

/// Facts about a training run, persisted with the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Unique model identifier
    pub id: Uuid,

    /// When training finished
    pub trained_at: DateTime<Utc>,

    /// Number of training examples
    pub examples: usize,

    /// Feature dimension
    pub dimension: usize,

    /// SGD epochs actually run
    pub epochs_run: usize,

    /// Regularized training loss after the last epoch
    pub final_loss: f64,
}

/// Immutable featurizer + classifier pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    metadata: ModelMetadata,
    featurizer: FittedFeaturizer,
    labels: LabelEncoding,
    classifier: LogisticRegression,
}

impl TrainedModel {
    /// Assemble a model from fitted parts.
    ///
    /// Fails when the featurizer and classifier disagree on dimension.
    pub fn from_parts(
        featurizer: FittedFeaturizer,
        labels: LabelEncoding,
        classifier: LogisticRegression,
    ) -> Result<Self> {
        Self::with_training_stats(featurizer, labels, classifier, 0, f64::NAN)
    }

    pub(crate) fn with_training_stats(
        featurizer: FittedFeaturizer,
        labels: LabelEncoding,
        classifier: LogisticRegression,
        epochs_run: usize,
        final_loss: f64,
    ) -> Result<Self> {
        if featurizer.dimension() != classifier.dimension() {
            return Err(Error::internal(format!(
                "featurizer produces {} features, classifier expects {}",
                featurizer.dimension(),
                classifier.dimension()
            )));
        }

        let metadata = ModelMetadata {
            id: Uuid::new_v4(),
            trained_at: Utc::now(),
            examples: labels.total(),
            dimension: featurizer.dimension(),
            epochs_run,
            final_loss: if final_loss.is_finite() { final_loss } else { 0.0 },
        };

        Ok(Self {
            metadata,
            featurizer,
            labels,
            classifier,
        })
    }

    /// Model identifier
    pub fn id(&self) -> Uuid {
        self.metadata.id
    }

    /// Training metadata
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Feature dimension
    pub fn dimension(&self) -> usize {
        self.featurizer.dimension()
    }

    /// Fitted featurizer
    pub fn featurizer(&self) -> &FittedFeaturizer {
        &self.featurizer
    }

    /// Fitted classifier
    pub fn classifier(&self) -> &LogisticRegression {
        &self.classifier
    }

    /// Label encoding
    pub fn labels(&self) -> &LabelEncoding {
        &self.labels
    }

    /// Featurize a message
    pub fn features(&self, text: &str) -> FeatureVector {
        self.featurizer.transform(text)
    }

    /// Spam probability of a message
    pub fn probability(&self, text: &str) -> f64 {
        self.classifier
            .probability_sparse(&self.featurizer.transform_sparse(text))
    }

    /// Classify a message under an inclusive threshold
    pub fn predict(&self, text: &str, threshold: f64) -> Prediction {
        let probability = self.probability(text);
        Prediction {
            is_spam: self.labels.decode(probability, threshold),
            probability,
        }
    }

    /// Check internal consistency; every failure is a corrupt model
    pub fn validate(&self) -> Result<()> {
        self.featurizer.validate()?;
        self.labels.validate()?;

        if self.classifier.dimension() != self.featurizer.dimension() {
            return Err(Error::corrupt(format!(
                "classifier has {} weights but featurizer produces {} features",
                self.classifier.dimension(),
                self.featurizer.dimension()
            )));
        }
        if self.metadata.dimension != self.featurizer.dimension() {
            return Err(Error::corrupt(format!(
                "metadata declares dimension {} but featurizer produces {}",
                self.metadata.dimension,
                self.featurizer.dimension()
            )));
        }
        if !self.classifier.is_finite() {
            return Err(Error::corrupt("classifier parameters are not finite"));
        }
        Ok(())
    }
}
