//! Metrics collection and reporting

use serde::Serialize;
use spamguard_core::Verdict;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Counter of classified messages, labeled by `verdict`
pub const MESSAGES_TOTAL: &str = "spamguard_messages_total";

/// Histogram of per-message classification latency
pub const CLASSIFICATION_LATENCY_US: &str = "spamguard_classification_latency_us";

/// Counter of retrain attempts, labeled by `outcome`
pub const RETRAINS_TOTAL: &str = "spamguard_retrains_total";

/// Gauge holding the active model generation
pub const MODEL_GENERATION: &str = "spamguard_model_generation";

/// Register descriptions with the installed recorder
pub fn describe() {
    ::metrics::describe_counter!(MESSAGES_TOTAL, "Messages classified, by verdict");
    ::metrics::describe_histogram!(
        CLASSIFICATION_LATENCY_US,
        ::metrics::Unit::Microseconds,
        "Classification latency per message"
    );
    ::metrics::describe_counter!(RETRAINS_TOTAL, "Retrain attempts, by outcome");
    ::metrics::describe_gauge!(MODEL_GENERATION, "Generation of the active model");
}

/// Metrics collector for SpamGuard message handling
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    messages: AtomicU64,
    spam: AtomicU64,
    ham: AtomicU64,
    unavailable: AtomicU64,
    retrains_succeeded: AtomicU64,
    retrains_failed: AtomicU64,
    total_latency_us: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Record one classified message
    pub fn record_verdict(&self, verdict: &Verdict, latency_us: u64) {
        let inner = &self.inner;
        inner.messages.fetch_add(1, Ordering::Relaxed);
        inner.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);

        let label = match verdict {
            Verdict::Spam { .. } => {
                inner.spam.fetch_add(1, Ordering::Relaxed);
                "spam"
            }
            Verdict::NotSpam { .. } => {
                inner.ham.fetch_add(1, Ordering::Relaxed);
                "not_spam"
            }
            Verdict::Unavailable { .. } => {
                inner.unavailable.fetch_add(1, Ordering::Relaxed);
                "unavailable"
            }
        };

        ::metrics::counter!(MESSAGES_TOTAL, "verdict" => label).increment(1);
        ::metrics::histogram!(CLASSIFICATION_LATENCY_US).record(latency_us as f64);
    }

    /// Record a retrain attempt; `generation` is the new model's on success
    pub fn record_retrain(&self, generation: Option<u64>) {
        match generation {
            Some(generation) => {
                self.inner.retrains_succeeded.fetch_add(1, Ordering::Relaxed);
                ::metrics::counter!(RETRAINS_TOTAL, "outcome" => "ok").increment(1);
                ::metrics::gauge!(MODEL_GENERATION).set(generation as f64);
            }
            None => {
                self.inner.retrains_failed.fetch_add(1, Ordering::Relaxed);
                ::metrics::counter!(RETRAINS_TOTAL, "outcome" => "failed").increment(1);
            }
        }
        debug!("Recorded retrain (generation {:?})", generation);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            messages: inner.messages.load(Ordering::Relaxed),
            spam: inner.spam.load(Ordering::Relaxed),
            not_spam: inner.ham.load(Ordering::Relaxed),
            unavailable: inner.unavailable.load(Ordering::Relaxed),
            retrains_succeeded: inner.retrains_succeeded.load(Ordering::Relaxed),
            retrains_failed: inner.retrains_failed.load(Ordering::Relaxed),
            total_latency_us: inner.total_latency_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages: u64,
    pub spam: u64,
    pub not_spam: u64,
    pub unavailable: u64,
    pub retrains_succeeded: u64,
    pub retrains_failed: u64,
    pub total_latency_us: u64,
}

impl MetricsSnapshot {
    /// Average latency per message
    pub fn avg_latency_us(&self) -> u64 {
        if self.messages == 0 {
            0
        } else {
            self.total_latency_us / self.messages
        }
    }

    /// Share of messages flagged as spam
    pub fn spam_rate(&self) -> f64 {
        if self.messages == 0 {
            0.0
        } else {
            self.spam as f64 / self.messages as f64
        }
    }

    /// Share of messages that could not be classified
    pub fn unavailable_rate(&self) -> f64 {
        if self.messages == 0 {
            0.0
        } else {
            self.unavailable as f64 / self.messages as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        let metrics = MetricsCollector::new();

        metrics.record_verdict(&Verdict::Spam { probability: 0.9 }, 3000);
        metrics.record_verdict(&Verdict::NotSpam { probability: 0.1 }, 1000);
        metrics.record_verdict(&Verdict::unavailable("no model"), 2000);
        metrics.record_verdict(&Verdict::Spam { probability: 0.7 }, 2000);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages, 4);
        assert_eq!(snapshot.spam, 2);
        assert_eq!(snapshot.not_spam, 1);
        assert_eq!(snapshot.unavailable, 1);
        assert_eq!(snapshot.avg_latency_us(), 2000);
        assert_eq!(snapshot.spam_rate(), 0.5);
        assert_eq!(snapshot.unavailable_rate(), 0.25);
    }

    #[test]
    fn test_retrain_counts() {
        let metrics = MetricsCollector::new();
        metrics.record_retrain(Some(2));
        metrics.record_retrain(None);
        metrics.record_retrain(Some(3));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.retrains_succeeded, 2);
        assert_eq!(snapshot.retrains_failed, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = MetricsCollector::new();
        let clone = metrics.clone();
        clone.record_verdict(&Verdict::NotSpam { probability: 0.2 }, 10);
        assert_eq!(metrics.snapshot().messages, 1);
        assert_eq!(MetricsCollector::default().snapshot().messages, 0);
    }
}
