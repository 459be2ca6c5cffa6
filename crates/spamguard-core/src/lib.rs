//! SpamGuard Core
//!
//! Core types and error handling shared across SpamGuard components.
//!
//! This crate provides:
//! - Labeled training examples and per-message predictions
//! - The verdict rendered back to a message's sender
//! - The error taxonomy used by training, persistence and inference

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{LabeledExample, Prediction, Verdict};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{LabeledExample, Prediction, Verdict};
}
