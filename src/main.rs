//! Convergent CLI entry point.

use clap::Parser;

use convergent::cli::commands::{self, load_config};
use convergent::cli::{Cli, Commands};
use convergent::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => convergent::cli::handle_error(err, cli.json),
    };
    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => convergent::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.config, cli.json).await,
        Commands::Resume(args) => commands::resume::execute(args, cli.config, cli.json).await,
        Commands::Methodologies(args) => commands::methodologies::execute(args, cli.json).await,
        Commands::Config(args) => commands::config::execute(args, cli.config, cli.json).await,
    };

    if let Err(err) = result {
        convergent::cli::handle_error(err, cli.json);
    }
}
