use clap::Parser;
use spamguard_bot::{commands, BotConfig, Cli, Commands};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let mut config = BotConfig::load(&cli.config, &cli)?;
    info!("Dataset: {}", config.dataset_path.display());
    info!("Model: {}", config.model_path.display());

    match cli.command {
        Commands::Train { holdout } => {
            let metrics = commands::train(&config, holdout)?;
            println!("{}", metrics);
            println!("Model saved to {}", config.model_path.display());
        }

        Commands::Evaluate => {
            let metrics = commands::evaluate(&config)?;
            println!("{}", metrics);
        }

        Commands::Predict { texts } => {
            for (text, verdict) in texts.iter().zip(commands::predict(&config, &texts)?) {
                println!("{}\t{}", text, verdict);
            }
        }

        Commands::Serve { retrain_interval } => {
            if let Some(secs) = retrain_interval {
                anyhow::ensure!(secs > 0, "--retrain-interval must be at least 1");
                config.retrain_interval_secs = Some(secs);
            }
            commands::serve(config).await?;
        }
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("spamguard=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spamguard=info"))
    };

    // stdout carries verdicts, so logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
