//! errsight -- command-line front end for the tiered log analyzer.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;

use errsight_core::config::GeneralConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = commands::load_config(cli.config.as_deref()).await;
    let general = loaded
        .as_ref()
        .map(|l| l.config.general.clone())
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Err(e) = logging::init_tracing(&general, cli.log_level.as_deref()) {
        eprintln!("error: {e}");
        std::process::exit(2);
    }
    errsight_core::metrics::describe_all();

    if let Err(e) = run(cli, loaded).await {
        tracing::debug!(error = %e, "command failed");
        eprintln!("error: {}", e.user_message());
        std::process::exit(e.exit_code());
    }
}

async fn run(
    cli: Cli,
    loaded: Result<commands::LoadedConfig, errsight_core::error::ErrsightError>,
) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Config(args) => {
            let source_hint = cli
                .config
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| commands::DEFAULT_CONFIG_FILE.to_owned());
            commands::config::execute(args, loaded.as_ref(), &source_hint, &writer)
        }
        Commands::Analyze(args) => commands::analyze::execute(args, &loaded?, &writer).await,
        Commands::Rules(args) => commands::rules::execute(args, &loaded?, &writer).await,
    }
}
