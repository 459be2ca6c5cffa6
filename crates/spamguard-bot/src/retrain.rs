//! Scheduled retraining
//!
//! Each retrain reloads the dataset and trains on a blocking thread under a
//! deadline. Only a model that finished in time is saved (when a path is
//! configured) and then swapped into the shared handle. A failed or timed-out
//! run leaves both the active model and the artifact on disk untouched.

use spamguard_classifiers::{Dataset, DatasetSchema, ModelHandle, ModelStore, TrainedModel, Trainer};
use spamguard_core::{Error, Result};
use spamguard_telemetry::MetricsCollector;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Rebuilds the active model from the dataset
#[derive(Clone)]
pub struct Retrainer {
    handle: ModelHandle,
    trainer: Trainer,
    dataset_path: PathBuf,
    schema: DatasetSchema,
    model_path: Option<PathBuf>,
    timeout: Duration,
    metrics: MetricsCollector,
}

impl Retrainer {
    /// Create a retrainer that swaps results into `handle`
    pub fn new(
        handle: ModelHandle,
        trainer: Trainer,
        dataset_path: impl Into<PathBuf>,
        schema: DatasetSchema,
        timeout: Duration,
    ) -> Self {
        Self {
            handle,
            trainer,
            dataset_path: dataset_path.into(),
            schema,
            model_path: None,
            timeout,
            metrics: MetricsCollector::new(),
        }
    }

    /// Also persist every retrained model
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Report retrains to a shared collector
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// Retrain once; returns the new generation
    pub async fn retrain_once(&self) -> Result<u64> {
        let outcome = match self.build().await {
            Ok(model) => self.persist(model).await,
            Err(e) => Err(e),
        };
        let result = match outcome {
            Ok(model) => Ok(self.handle.swap(model)),
            Err(e) => {
                warn!(
                    "Retrain failed ({}), keeping model at generation {}",
                    e,
                    self.handle.generation()
                );
                Err(e)
            }
        };
        self.metrics.record_retrain(result.as_ref().ok().copied());
        result
    }

    async fn build(&self) -> Result<TrainedModel> {
        let cancel = Arc::new(AtomicBool::new(false));
        let job = {
            let cancel = Arc::clone(&cancel);
            let trainer = self.trainer.clone();
            let dataset_path = self.dataset_path.clone();
            let schema = self.schema.clone();

            tokio::task::spawn_blocking(move || -> Result<TrainedModel> {
                let dataset = Dataset::load(&dataset_path, &schema)?;
                trainer.fit_with_cancel(&dataset, &cancel)
            })
        };

        match tokio::time::timeout(self.timeout, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::internal(format!("retrain task failed: {}", e))),
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                Err(Error::Timeout)
            }
        }
    }

    /// Save a model that finished within the deadline
    async fn persist(&self, model: TrainedModel) -> Result<TrainedModel> {
        let Some(path) = self.model_path.clone() else {
            return Ok(model);
        };
        tokio::task::spawn_blocking(move || ModelStore::save(&model, path).map(|()| model))
            .await
            .map_err(|e| Error::internal(format!("model save task failed: {}", e)))?
    }

    /// Retrain every `interval` until `shutdown` completes
    pub async fn run<S>(self, interval: Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        info!("Retraining every {:?} from '{}'", interval, self.dataset_path.display());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately; the initial model is already active
        ticker.tick().await;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    // errors are logged and counted in retrain_once
                    let _ = self.retrain_once().await;
                }
            }
        }
        info!("Retrain scheduler stopped");
    }
}
