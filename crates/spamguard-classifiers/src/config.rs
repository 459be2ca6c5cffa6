//! Configuration for featurization, training and inference

use crate::dataset::DatasetSchema;
use serde::{Deserialize, Serialize};
use spamguard_core::{Error, Result};
use std::path::Path;

/// Configuration for the whole classification engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Training file layout
    #[serde(default)]
    pub dataset: DatasetSchema,

    /// Featurizer settings
    #[serde(default)]
    pub featurizer: FeaturizerConfig,

    /// Classifier training settings
    #[serde(default)]
    pub trainer: TrainerConfig,

    /// Spam decision threshold (inclusive)
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl ClassifierConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid classifier config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        self.dataset.delimiter()?;
        self.featurizer.validate()?;
        self.trainer.validate()
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetSchema::default(),
            featurizer: FeaturizerConfig::default(),
            trainer: TrainerConfig::default(),
            threshold: default_threshold(),
        }
    }
}

/// How text is turned into features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturizerConfig {
    /// Longest word n-gram (1 = unigrams only)
    #[serde(default = "default_word_ngrams")]
    pub word_ngrams: usize,

    /// Character n-gram length, 0 disables character features
    #[serde(default = "default_char_ngrams")]
    pub char_ngrams: usize,

    /// Minimum number of training documents a term must appear in
    #[serde(default = "default_min_document_frequency")]
    pub min_document_frequency: usize,

    /// Keep at most this many terms, most frequent first
    #[serde(default)]
    pub max_features: Option<usize>,
}

impl FeaturizerConfig {
    fn validate(&self) -> Result<()> {
        if self.word_ngrams == 0 && self.char_ngrams == 0 {
            return Err(Error::config(
                "featurizer needs word_ngrams or char_ngrams to be non-zero",
            ));
        }
        if self.min_document_frequency == 0 {
            return Err(Error::config("min_document_frequency must be at least 1"));
        }
        Ok(())
    }
}

impl Default for FeaturizerConfig {
    fn default() -> Self {
        Self {
            word_ngrams: default_word_ngrams(),
            char_ngrams: default_char_ngrams(),
            min_document_frequency: default_min_document_frequency(),
            max_features: None,
        }
    }
}

/// Logistic regression training settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Maximum passes over the training set
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Initial SGD step size
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// L2 penalty on the weights (the bias is not penalized)
    #[serde(default = "default_l2_regularization")]
    pub l2_regularization: f64,

    /// Seed for the per-epoch shuffle
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Stop once the epoch loss improves by less than this
    #[serde(default = "default_convergence_tolerance")]
    pub convergence_tolerance: f64,
}

impl TrainerConfig {
    fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::config("epochs must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::config("learning_rate must be a positive number"));
        }
        if !(self.l2_regularization >= 0.0 && self.l2_regularization.is_finite()) {
            return Err(Error::config("l2_regularization must be non-negative"));
        }
        Ok(())
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            l2_regularization: default_l2_regularization(),
            seed: default_seed(),
            convergence_tolerance: default_convergence_tolerance(),
        }
    }
}

fn default_threshold() -> f64 {
    0.5
}

fn default_word_ngrams() -> usize {
    2
}

fn default_char_ngrams() -> usize {
    3
}

fn default_min_document_frequency() -> usize {
    1
}

fn default_epochs() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.5
}

fn default_l2_regularization() -> f64 {
    1e-4
}

fn default_seed() -> u64 {
    42
}

fn default_convergence_tolerance() -> f64 {
    1e-6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = ClassifierConfig::from_yaml("{}").unwrap();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.dataset.separator, ';');
        assert_eq!(config.featurizer, FeaturizerConfig::default());
        assert_eq!(config.trainer.seed, 42);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
dataset:
  separator: ","
featurizer:
  word_ngrams: 1
  char_ngrams: 0
trainer:
  epochs: 20
  seed: 7
threshold: 0.7
"#;
        let config = ClassifierConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.dataset.separator, ',');
        assert_eq!(config.featurizer.word_ngrams, 1);
        assert_eq!(config.featurizer.char_ngrams, 0);
        assert_eq!(config.trainer.epochs, 20);
        assert_eq!(config.trainer.seed, 7);
        assert_eq!(config.trainer.learning_rate, 0.5);
        assert_eq!(config.threshold, 0.7);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(ClassifierConfig::from_yaml("threshold: 1.5").is_err());
        assert!(ClassifierConfig::from_yaml("trainer:\n  epochs: 0").is_err());
        assert!(
            ClassifierConfig::from_yaml("featurizer:\n  word_ngrams: 0\n  char_ngrams: 0").is_err()
        );
        assert!(ClassifierConfig::from_yaml("dataset:\n  separator: \"é\"").is_err());
    }
}
