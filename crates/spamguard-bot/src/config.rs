//! Bot configuration

use crate::cli::Cli;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use spamguard_classifiers::ClassifierConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Labeled training file
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Where the trained model is saved and loaded
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Retrain from the dataset this often while serving
    #[serde(default)]
    pub retrain_interval_secs: Option<u64>,

    /// Abandon a retrain that takes longer than this
    #[serde(default = "default_retrain_timeout")]
    pub retrain_timeout_secs: u64,

    /// Prometheus listen address, disabled when unset
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,

    /// Dataset layout, featurizer, trainer and threshold
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl BotConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &Path, cli: &Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?
        } else {
            Self::default()
        };

        // Apply CLI overrides
        if let Some(dataset) = &cli.dataset {
            config.dataset_path = dataset.clone();
        }

        if let Some(model) = &cli.model {
            config.model_path = model.clone();
        }

        Ok(config)
    }

    /// Parse and validate YAML
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.classifier.validate()?;
        anyhow::ensure!(
            config.retrain_timeout_secs > 0,
            "retrain_timeout_secs must be at least 1"
        );
        anyhow::ensure!(
            config.retrain_interval_secs != Some(0),
            "retrain_interval_secs must be at least 1"
        );
        Ok(config)
    }

    /// Retrain period, if retraining is enabled
    pub fn retrain_interval(&self) -> Option<Duration> {
        self.retrain_interval_secs.map(Duration::from_secs)
    }

    /// Retrain deadline
    pub fn retrain_timeout(&self) -> Duration {
        Duration::from_secs(self.retrain_timeout_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            model_path: default_model_path(),
            retrain_interval_secs: None,
            retrain_timeout_secs: default_retrain_timeout(),
            metrics_addr: None,
            classifier: ClassifierConfig::default(),
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("spam.csv")
}

fn default_model_path() -> PathBuf {
    PathBuf::from("spam_model.json")
}

fn default_retrain_timeout() -> u64 {
    300
}
