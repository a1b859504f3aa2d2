mod args;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let filter = match cli.verbose {
        0 => "audiofetch=info",
        1 => "audiofetch=debug",
        2 => "audiofetch=trace",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Commands::Extract { url, options }) => {
            commands::extract::run(&url, &options, config_path).await
        }
        Some(Commands::Batch {
            input,
            parallel,
            options,
        }) => commands::batch::run(&input, parallel.map(usize::from), &options, config_path).await,
        Some(Commands::Speed) => commands::speed::run(config_path).await,
        Some(Commands::Doctor) => commands::doctor::run(config_path).await,
        Some(Commands::Config) => commands::config::run(config_path).await,
        None => {
            // If URL provided directly, treat as extract command
            if let Some(url) = cli.url {
                commands::extract::run(&url, &cli.options, config_path).await
            } else {
                // No URL, print help
                use clap::CommandFactory;
                Cli::command().print_help()?;
                println!();
                Ok(())
            }
        }
    }
}
