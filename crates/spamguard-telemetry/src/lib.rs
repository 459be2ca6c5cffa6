//! SpamGuard Telemetry
//!
//! Counters for classified messages, verdicts, retrains and latency.
//! Every event is kept in an in-process [`MetricsCollector`] and mirrored to
//! the `metrics` facade, so an installed exporter (Prometheus in the bot)
//! picks it up without further wiring.

pub mod metrics;

pub use crate::metrics::{MetricsCollector, MetricsSnapshot};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::{MetricsCollector, MetricsSnapshot};
}
