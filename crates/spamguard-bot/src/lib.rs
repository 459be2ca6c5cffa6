//! SpamGuard Bot
//!
//! Command-line front end for the spam classifier: train and evaluate
//! models, classify ad-hoc messages, and serve a line-oriented message loop
//! with optional scheduled retraining.

pub mod cli;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod retrain;

pub use cli::{Cli, Commands};
pub use config::BotConfig;
pub use dispatch::{DispatchLoop, DispatchStats};
pub use retrain::Retrainer;
