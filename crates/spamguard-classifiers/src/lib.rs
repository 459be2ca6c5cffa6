//! SpamGuard Classifiers
//!
//! The spam-classification engine: raw message text in, label and
//! probability out.
//!
//! Components, leaf first:
//! - [`featurizer`]: tokenization, n-gram vocabulary, min-max scaling
//! - [`trainer`]: fits a regularized logistic regression on a [`Dataset`]
//! - [`model_store`]: saves and loads a [`TrainedModel`] as one artifact
//! - [`predictor`]: read-only inference over a swappable [`ModelHandle`]
//! - [`evaluator`]: accuracy, AUC and friends on a held-out dataset
//!
//! Trained models are immutable. Retraining builds a new model and swaps it
//! into the handle once complete, so concurrent predictions never observe a
//! partially trained state.

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod evaluator;
pub mod featurizer;
pub mod model;
pub mod model_store;
pub mod predictor;
pub mod trainer;

pub use classifier::{ClassificationResult, Classifier};
pub use config::{ClassifierConfig, FeaturizerConfig, TrainerConfig};
pub use dataset::{Dataset, DatasetSchema};
pub use evaluator::{ConfusionMatrix, Evaluator, Metrics};
pub use featurizer::{FeatureVector, Featurizer, FittedFeaturizer};
pub use model::{LabelEncoding, LogisticRegression, ModelMetadata, TrainedModel};
pub use model_store::ModelStore;
pub use predictor::{ModelHandle, Predictor};
pub use trainer::Trainer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ClassificationResult, Classifier};
    pub use crate::dataset::{Dataset, DatasetSchema};
    pub use crate::evaluator::{Evaluator, Metrics};
    pub use crate::model::TrainedModel;
    pub use crate::model_store::ModelStore;
    pub use crate::predictor::{ModelHandle, Predictor};
    pub use crate::trainer::Trainer;
}
