//! Subcommand implementations

use crate::config::BotConfig;
use crate::dispatch::DispatchLoop;
use crate::retrain::Retrainer;
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use spamguard_classifiers::prelude::*;
use spamguard_telemetry::MetricsCollector;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Seed used for the train/holdout split
const SPLIT_SEED: u64 = 7;

/// Train on the dataset, report metrics and save the model
pub fn train(config: &BotConfig, holdout: Option<f64>) -> anyhow::Result<Metrics> {
    let classifier = &config.classifier;
    let dataset = Dataset::load(&config.dataset_path, &classifier.dataset)
        .with_context(|| format!("loading dataset {}", config.dataset_path.display()))?;

    let (train_set, eval_set) = match holdout {
        Some(fraction) => dataset.split(fraction, SPLIT_SEED)?,
        None => (dataset.clone(), dataset),
    };

    let model = Trainer::from_config(classifier).fit(&train_set)?;
    let metrics = Evaluator::with_threshold(classifier.threshold).evaluate(&model, &eval_set)?;
    metrics.log_report();

    ModelStore::save(&model, &config.model_path)?;
    Ok(metrics)
}

/// Evaluate the saved model on the dataset
pub fn evaluate(config: &BotConfig) -> anyhow::Result<Metrics> {
    let model = load_model(config)?;
    let dataset = Dataset::load(&config.dataset_path, &config.classifier.dataset)
        .with_context(|| format!("loading dataset {}", config.dataset_path.display()))?;

    let metrics = Evaluator::with_threshold(config.classifier.threshold).evaluate(&model, &dataset)?;
    metrics.log_report();
    Ok(metrics)
}

/// Classify each text with the saved model, one verdict per text
pub fn predict(config: &BotConfig, texts: &[String]) -> anyhow::Result<Vec<String>> {
    let model = load_model(config)?;
    let predictor = Predictor::from_config(ModelHandle::with_model(model), &config.classifier)?;
    Ok(texts
        .iter()
        .map(|text| predictor.verdict(text).to_string())
        .collect())
}

/// Serve verdicts for stdin lines until input ends or a shutdown signal
pub async fn serve(config: BotConfig) -> anyhow::Result<()> {
    let metrics = MetricsCollector::new();
    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
    }

    let handle = ModelHandle::new();
    initial_model(&config, &handle).await?;
    let predictor = Predictor::from_config(handle.clone(), &config.classifier)?;

    let (stop_tx, stop_rx) = watch::channel(false);

    let scheduler = config.retrain_interval().map(|interval| {
        let retrainer = Retrainer::new(
            handle.clone(),
            Trainer::from_config(&config.classifier),
            &config.dataset_path,
            config.classifier.dataset.clone(),
            config.retrain_timeout(),
        )
        .with_model_path(&config.model_path)
        .with_metrics(metrics.clone());
        tokio::spawn(retrainer.run(interval, stopped(stop_rx.clone())))
    });

    let dispatch = DispatchLoop::new(Arc::new(predictor), metrics.clone());
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping...");
    };
    dispatch.run(stdin, tokio::io::stdout(), shutdown).await?;

    let _ = stop_tx.send(true);
    if let Some(task) = scheduler {
        if let Err(e) = task.await {
            warn!("Retrain scheduler ended abnormally: {}", e);
        }
    }

    let snapshot = metrics.snapshot();
    info!(
        "Handled {} messages ({:.1}% spam, avg {}us)",
        snapshot.messages,
        snapshot.spam_rate() * 100.0,
        snapshot.avg_latency_us()
    );
    Ok(())
}

fn load_model(config: &BotConfig) -> anyhow::Result<TrainedModel> {
    ModelStore::load(&config.model_path)
        .with_context(|| format!("loading model {}", config.model_path.display()))
}

/// Use the saved model when it loads, otherwise train one from the dataset
async fn initial_model(config: &BotConfig, handle: &ModelHandle) -> anyhow::Result<()> {
    if config.model_path.exists() {
        match handle.reload_from(&config.model_path) {
            Ok(_) => return Ok(()),
            Err(e) => warn!(
                "Unusable model at '{}' ({}), retraining from '{}'",
                config.model_path.display(),
                e,
                config.dataset_path.display()
            ),
        }
    } else {
        info!(
            "No model at '{}', training from '{}'",
            config.model_path.display(),
            config.dataset_path.display()
        );
    }
    let config = config.clone();
    let model = tokio::task::spawn_blocking(move || -> anyhow::Result<TrainedModel> {
        let dataset = Dataset::load(&config.dataset_path, &config.classifier.dataset)?;
        let model = Trainer::from_config(&config.classifier).fit(&dataset)?;
        ModelStore::save(&model, &config.model_path)?;
        Ok(model)
    })
    .await??;
    handle.swap(model);
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Install the Prometheus exporter on `addr`
fn init_metrics(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    spamguard_telemetry::metrics::describe();
    info!("Metrics exporter listening on http://{}/metrics", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config_in(dir: &Path) -> BotConfig {
        std::fs::write(
            dir.join("spam.csv"),
            "Message;IsSpam\n\
             WIN FREE MONEY NOW;true\n\
             meeting at 5pm tomorrow;false\n\
             claim your prize;true\n\
             project status update;false\n",
        )
        .unwrap();
        BotConfig {
            dataset_path: dir.join("spam.csv"),
            model_path: dir.join("models").join("spam_model.json"),
            ..Default::default()
        }
    }

    #[test]
    fn test_train_evaluate_predict() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let trained = train(&config, None).unwrap();
        assert!(trained.accuracy >= 0.75);
        assert!(config.model_path.exists());

        let evaluated = evaluate(&config).unwrap();
        assert_eq!(evaluated.accuracy, trained.accuracy);

        let verdicts = predict(&config, &["You won a million dollars!".to_string()]).unwrap();
        assert!(verdicts[0].starts_with("This message is classified as SPAM!"), "{}", verdicts[0]);
    }

    #[test]
    fn test_predict_without_model_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let err = predict(&config, &["hi".to_string()]).unwrap_err();
        assert!(format!("{:#}", err).contains("file not found"), "{:#}", err);
    }

    #[tokio::test]
    async fn test_initial_model_trains_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let handle = ModelHandle::new();

        initial_model(&config, &handle).await.unwrap();
        assert!(handle.is_loaded());
        assert!(config.model_path.exists());

        // second start loads the saved artifact instead of retraining
        let reloaded = ModelHandle::new();
        initial_model(&config, &reloaded).await.unwrap();
        assert_eq!(reloaded.current().unwrap().id(), handle.current().unwrap().id());
    }

    #[tokio::test]
    async fn test_initial_model_retrains_over_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(config.model_path.parent().unwrap()).unwrap();
        std::fs::write(&config.model_path, b"{ truncated").unwrap();

        let handle = ModelHandle::new();
        initial_model(&config, &handle).await.unwrap();
        assert!(handle.is_loaded());

        let saved = ModelStore::load(&config.model_path).unwrap();
        assert_eq!(saved.id(), handle.current().unwrap().id());
    }
}
