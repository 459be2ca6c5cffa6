//! Core types for SpamGuard

use serde::{Deserialize, Serialize};
use std::fmt;

/// One labeled training message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledExample {
    /// Raw message text (may be empty)
    pub text: String,

    /// Ground truth label
    pub is_spam: bool,
}

impl LabeledExample {
    /// Create a new labeled example
    pub fn new(text: impl Into<String>, is_spam: bool) -> Self {
        Self {
            text: text.into(),
            is_spam,
        }
    }

    /// Create a spam example
    pub fn spam(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    /// Create a not-spam example
    pub fn ham(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }
}

/// Result of classifying a single message
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Whether the message is considered spam
    pub is_spam: bool,

    /// Probability of the spam class, in [0, 1]
    pub probability: f64,
}

impl Prediction {
    /// Build a prediction from a spam probability and a decision threshold.
    ///
    /// The comparison is inclusive: a probability equal to the threshold is spam.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        Self {
            is_spam: probability >= threshold,
            probability,
        }
    }
}

/// Reply relayed back to the sender of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Classified as spam
    Spam { probability: f64 },

    /// Classified as not spam
    NotSpam { probability: f64 },

    /// Classification could not be produced for this message
    Unavailable { reason: String },
}

impl Verdict {
    /// Create an unavailable verdict
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether this verdict flags the message as spam
    pub fn is_spam(&self) -> bool {
        matches!(self, Self::Spam { .. })
    }

    /// Whether a classification was produced
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }

    /// Spam probability, if a classification was produced
    pub fn probability(&self) -> Option<f64> {
        match self {
            Self::Spam { probability } | Self::NotSpam { probability } => Some(*probability),
            Self::Unavailable { .. } => None,
        }
    }
}

impl From<Prediction> for Verdict {
    fn from(prediction: Prediction) -> Self {
        if prediction.is_spam {
            Self::Spam {
                probability: prediction.probability,
            }
        } else {
            Self::NotSpam {
                probability: prediction.probability,
            }
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spam { probability } => write!(
                f,
                "This message is classified as SPAM! (spam probability {:.2}%)",
                probability * 100.0
            ),
            Self::NotSpam { probability } => write!(
                f,
                "This message is NOT SPAM! (spam probability {:.2}%)",
                probability * 100.0
            ),
            Self::Unavailable { .. } => {
                write!(f, "Spam classification is temporarily unavailable.")
            }
        }
    }
}
