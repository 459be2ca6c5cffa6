//! Classifier trait and common types

use async_trait::async_trait;
use spamguard_core::{Result, Verdict};

/// Label attached to spam results
pub const SPAM_LABEL: &str = "spam";

/// Label attached to not-spam results
pub const HAM_LABEL: &str = "ham";

/// Trait for anything that can classify an incoming message
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the given text
    async fn classify(&self, text: &str) -> Result<ClassificationResult>;

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Result of classification
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    /// Classification label ([`SPAM_LABEL`] or [`HAM_LABEL`])
    pub label: String,

    /// Spam probability (0.0-1.0)
    pub score: f64,

    /// Additional metadata
    pub metadata: ClassificationMetadata,

    /// Latency in microseconds
    pub latency_us: u64,
}

impl ClassificationResult {
    /// Create a new classification result
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
            metadata: ClassificationMetadata::default(),
            latency_us: 0,
        }
    }

    /// Whether the result carries the spam label
    pub fn is_spam(&self) -> bool {
        self.label == SPAM_LABEL
    }
}

/// Metadata about classification
#[derive(Debug, Clone, Default)]
pub struct ClassificationMetadata {
    /// Identifier of the model that produced the result
    pub model: Option<String>,

    /// Handle generation the model was read from
    pub generation: Option<u64>,
}

impl From<&ClassificationResult> for Verdict {
    fn from(result: &ClassificationResult) -> Self {
        if result.is_spam() {
            Verdict::Spam {
                probability: result.score,
            }
        } else {
            Verdict::NotSpam {
                probability: result.score,
            }
        }
    }
}

/// Collapse a classification outcome into the verdict relayed to the sender.
///
/// Errors never escape: they become [`Verdict::Unavailable`].
pub fn into_verdict(outcome: Result<ClassificationResult>) -> Verdict {
    match outcome {
        Ok(result) => Verdict::from(&result),
        Err(e) => Verdict::unavailable(e.to_string()),
    }
}
