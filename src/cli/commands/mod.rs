//! Command handlers.
//!
//! Each invocation loads configuration, starts the runtime, runs one
//! operation and shuts the runtime down again.

pub mod health;
pub mod pattern;

use anyhow::{Context, Result};

use crate::application::KnowledgeRuntime;
use crate::cli::{Cli, Commands};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Load configuration for this invocation.
pub fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Run a parsed command against a freshly started runtime.
pub async fn execute(cli: Cli, config: Config) -> Result<()> {
    let runtime = KnowledgeRuntime::start(config)
        .await
        .context("Failed to start knowledge runtime")?;

    let json = cli.json;
    let result = match cli.command {
        Commands::Health => health::handle_health(&runtime, json),
        Commands::Add { text, meta } => pattern::handle_add(&runtime, &text, meta, json).await,
        Commands::Search {
            query,
            limit,
            min_score,
            filter,
        } => pattern::handle_search(&runtime, query, limit, min_score, filter, json).await,
        Commands::Update { id, text, meta } => {
            pattern::handle_update(&runtime, &id, text, meta, json).await
        }
        Commands::Delete { id } => pattern::handle_delete(&runtime, &id, json).await,
        Commands::Get { id } => pattern::handle_get(&runtime, &id, json).await,
    };

    runtime
        .shutdown()
        .await
        .context("Failed to shut down knowledge runtime")?;
    result
}
