//! Inference over a swappable model
//!
//! [`ModelHandle`] owns the active [`TrainedModel`]. Readers take an `Arc`
//! snapshot that stays valid for the whole call; a retrain builds its model
//! off to the side and swaps the pointer only once the model is complete.
//! The lock is held just long enough to clone or replace the pointer, never
//! while featurizing or training.

use crate::classifier::{ClassificationMetadata, ClassificationResult, Classifier, HAM_LABEL, SPAM_LABEL};
use crate::config::ClassifierConfig;
use crate::model::TrainedModel;
use crate::model_store::ModelStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use spamguard_core::{Error, Prediction, Result, Verdict};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Default decision threshold, inclusive
pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Default)]
struct Slot {
    model: Option<Arc<TrainedModel>>,
    generation: u64,
}

/// Shared, atomically replaceable reference to the active model
#[derive(Clone, Default)]
pub struct ModelHandle {
    slot: Arc<RwLock<Slot>>,
}

impl ModelHandle {
    /// Empty handle; predictions fail with [`Error::ModelNotLoaded`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle holding an initial model
    pub fn with_model(model: TrainedModel) -> Self {
        let handle = Self::new();
        handle.swap(model);
        handle
    }

    /// Current model
    pub fn current(&self) -> Result<Arc<TrainedModel>> {
        self.slot.read().model.clone().ok_or(Error::ModelNotLoaded)
    }

    /// Current model together with its generation
    pub fn snapshot(&self) -> Option<(Arc<TrainedModel>, u64)> {
        let slot = self.slot.read();
        slot.model.clone().map(|model| (model, slot.generation))
    }

    /// Number of swaps so far (0 while empty)
    pub fn generation(&self) -> u64 {
        self.slot.read().generation
    }

    /// Whether a model is loaded
    pub fn is_loaded(&self) -> bool {
        self.slot.read().model.is_some()
    }

    /// Install a new model, returning its generation
    pub fn swap(&self, model: TrainedModel) -> u64 {
        let id = model.id();
        let model = Arc::new(model);
        let generation = {
            let mut slot = self.slot.write();
            slot.model = Some(model);
            slot.generation += 1;
            slot.generation
        };
        info!("Activated model {} (generation {})", id, generation);
        generation
    }

    /// Build a model and install it only if building succeeds.
    ///
    /// On failure the previous model stays active and the error is returned.
    pub fn replace_with<F>(&self, build: F) -> Result<u64>
    where
        F: FnOnce() -> Result<TrainedModel>,
    {
        match build() {
            Ok(model) => Ok(self.swap(model)),
            Err(e) => {
                warn!(
                    "Keeping model at generation {} after failed rebuild: {}",
                    self.generation(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Load an artifact and install it
    pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        self.replace_with(|| ModelStore::load(path))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("ModelHandle")
            .field("model", &slot.model.as_ref().map(|m| m.id()))
            .field("generation", &slot.generation)
            .finish()
    }
}

/// Read-only spam predictor
#[derive(Debug, Clone)]
pub struct Predictor {
    handle: ModelHandle,
    threshold: f64,
    name: String,
}

impl Predictor {
    /// Predictor over a handle with the default threshold
    pub fn new(handle: ModelHandle) -> Self {
        Self {
            handle,
            threshold: DEFAULT_THRESHOLD,
            name: "spam-logreg".to_string(),
        }
    }

    /// Predictor over a fixed model
    pub fn from_model(model: TrainedModel) -> Self {
        Self::new(ModelHandle::with_model(model))
    }

    /// Predictor using the configured threshold
    pub fn from_config(handle: ModelHandle, config: &ClassifierConfig) -> Result<Self> {
        Self::new(handle).with_threshold(config.threshold)
    }

    /// Override the decision threshold
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::config(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        self.threshold = threshold;
        Ok(self)
    }

    /// The handle this predictor reads from
    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    /// Decision threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify a message
    pub fn predict(&self, text: &str) -> Result<Prediction> {
        let model = self.handle.current()?;
        self.score(&model, text)
    }

    /// Classify a message, turning every failure into [`Verdict::Unavailable`]
    pub fn verdict(&self, text: &str) -> Verdict {
        match catch_unwind(AssertUnwindSafe(|| self.predict(text))) {
            Ok(Ok(prediction)) => Verdict::from(prediction),
            Ok(Err(e)) => {
                warn!("Classification unavailable: {}", e);
                Verdict::unavailable(e.to_string())
            }
            Err(_) => {
                warn!("Classification panicked");
                Verdict::unavailable("internal classifier failure")
            }
        }
    }

    fn score(&self, model: &TrainedModel, text: &str) -> Result<Prediction> {
        let probability = model.probability(text);
        if !probability.is_finite() {
            return Err(Error::internal("model produced a non-finite probability"));
        }
        Ok(Prediction::from_probability(probability, self.threshold))
    }
}

#[async_trait]
impl Classifier for Predictor {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        let start = Instant::now();
        let (model, generation) = self.handle.snapshot().ok_or(Error::ModelNotLoaded)?;
        let prediction = self.score(&model, text)?;

        Ok(ClassificationResult {
            label: if prediction.is_spam { SPAM_LABEL } else { HAM_LABEL }.to_string(),
            score: prediction.probability,
            metadata: ClassificationMetadata {
                model: Some(model.id().to_string()),
                generation: Some(generation),
            },
            latency_us: start.elapsed().as_micros() as u64,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
