use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spamguard")]
#[command(author, version, about = "Spam classifier for chat messages")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "spamguard.yaml")]
    pub config: PathBuf,

    /// Training dataset (overrides the config file)
    #[arg(long, global = true, env = "SPAMGUARD_DATASET")]
    pub dataset: Option<PathBuf>,

    /// Model artifact path (overrides the config file)
    #[arg(long, global = true, env = "SPAMGUARD_MODEL")]
    pub model: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model on the dataset and save it
    Train {
        /// Hold out this fraction of the dataset for evaluation
        #[arg(long)]
        holdout: Option<f64>,
    },

    /// Evaluate the saved model on the dataset
    Evaluate,

    /// Classify messages given on the command line
    Predict {
        /// Messages to classify
        #[arg(required = true, num_args = 1..)]
        texts: Vec<String>,
    },

    /// Classify messages from stdin, one per line, replying on stdout
    Serve {
        /// Retrain from the dataset every N seconds (overrides the config file)
        #[arg(long)]
        retrain_interval: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict() {
        let cli = Cli::try_parse_from([
            "spamguard",
            "predict",
            "--model",
            "m.json",
            "free money",
            "hello",
        ])
        .unwrap();
        assert_eq!(cli.model, Some(PathBuf::from("m.json")));
        match cli.command {
            Commands::Predict { texts } => assert_eq!(texts, vec!["free money", "hello"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_predict_requires_text() {
        assert!(Cli::try_parse_from(["spamguard", "predict"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["spamguard", "train", "--holdout", "0.2", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Train { holdout: Some(h) } if h == 0.2));
    }
}
