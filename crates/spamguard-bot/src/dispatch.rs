//! Message dispatch loop
//!
//! Reads one message per line from any async reader and writes one verdict
//! line per message to any async writer. Classification failures, including
//! panics inside a classifier, become an "unavailable" reply; only I/O errors
//! on the transport end the loop.

use spamguard_classifiers::classifier::into_verdict;
use spamguard_classifiers::Classifier;
use spamguard_core::Verdict;
use spamguard_telemetry::MetricsCollector;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Counts for one run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Non-blank lines read
    pub received: u64,

    /// Replies flagged as spam
    pub spam: u64,

    /// Replies where no classification was available
    pub unavailable: u64,
}

/// Relays messages to a classifier and verdicts back to the sender
pub struct DispatchLoop {
    classifier: Arc<dyn Classifier>,
    metrics: MetricsCollector,
}

impl DispatchLoop {
    /// Create a loop over a classifier
    pub fn new(classifier: Arc<dyn Classifier>, metrics: MetricsCollector) -> Self {
        Self {
            classifier,
            metrics,
        }
    }

    /// Classify one message; never fails
    pub async fn handle(&self, text: &str) -> Verdict {
        let start = Instant::now();
        let classifier = Arc::clone(&self.classifier);
        let owned = text.to_string();

        // a separate task so a panicking classifier only loses this message
        let verdict = match tokio::spawn(async move { classifier.classify(&owned).await }).await {
            Ok(outcome) => into_verdict(outcome),
            Err(e) => {
                warn!("Classifier task failed: {}", e);
                Verdict::unavailable("internal classifier failure")
            }
        };

        self.metrics
            .record_verdict(&verdict, start.elapsed().as_micros() as u64);
        verdict
    }

    /// Run until the reader is exhausted or `shutdown` completes
    pub async fn run<R, W, S>(&self, mut reader: R, mut writer: W, shutdown: S) -> std::io::Result<DispatchStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        info!("Dispatching messages to classifier '{}'", self.classifier.name());
        let mut buf = Vec::new();
        let mut stats = DispatchStats::default();
        tokio::pin!(shutdown);

        loop {
            buf.clear();
            let read = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping dispatch");
                    break;
                }
                read = reader.read_until(b'\n', &mut buf) => read?,
            };

            if read == 0 {
                debug!("Input closed");
                break;
            }
            // a message that is not valid UTF-8 is still classified, with
            // the bad bytes replaced
            let line = String::from_utf8_lossy(&buf);
            let text = line.trim_end_matches(['\n', '\r']);
            if text.trim().is_empty() {
                continue;
            }

            stats.received += 1;
            let verdict = self.handle(text).await;
            match verdict {
                Verdict::Spam { .. } => stats.spam += 1,
                Verdict::Unavailable { .. } => stats.unavailable += 1,
                Verdict::NotSpam { .. } => {}
            }

            writer.write_all(format!("{}\n", verdict).as_bytes()).await?;
            writer.flush().await?;
        }

        info!(
            "Dispatched {} messages ({} spam, {} unavailable)",
            stats.received, stats.spam, stats.unavailable
        );
        Ok(stats)
    }
}
