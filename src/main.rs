//! patternbase CLI entry point.

use clap::Parser;

use patternbase::cli::{commands, handle_error, Cli};
use patternbase::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match commands::load_config(&cli) {
        Ok(config) => config,
        Err(err) => handle_error(err, json),
    };

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, json),
    };

    if let Err(err) = commands::execute(cli, config).await {
        handle_error(err, json);
    }
}
