//! Command-line interface.

pub mod commands;
pub mod output;
pub mod table;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::models::{Filter, Metadata, MetadataValue};

#[derive(Parser)]
#[command(name = "patternbase")]
#[command(about = "Semantic pattern store backed by a vector index", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Read configuration from this file instead of .patternbase/
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start all components and report their status
    Health,

    /// Store a pattern
    Add {
        /// Pattern text
        text: String,

        /// Metadata entry as key=value (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        meta: Vec<(String, MetadataValue)>,
    },

    /// Search patterns by meaning
    Search {
        /// Query text
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Drop results scoring below this
        #[arg(long)]
        min_score: Option<f32>,

        /// Require metadata key=value (repeatable, all must match)
        #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        filter: Vec<(String, MetadataValue)>,
    },

    /// Replace the text and/or metadata of a pattern
    Update {
        id: String,

        /// New text; the pattern is re-embedded
        #[arg(long)]
        text: Option<String>,

        /// Replacement metadata entry as key=value (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        meta: Vec<(String, MetadataValue)>,
    },

    /// Delete a pattern
    Delete { id: String },

    /// Show a stored pattern
    Get { id: String },
}

/// Parse `key=value`, inferring the value type: integer, float, boolean,
/// otherwise string.
pub fn parse_key_value(raw: &str) -> Result<(String, MetadataValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), infer_value(value)))
}

fn infer_value(raw: &str) -> MetadataValue {
    if let Ok(v) = raw.parse::<i64>() {
        return MetadataValue::Int(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        if v.is_finite() {
            return MetadataValue::Float(v);
        }
    }
    match raw {
        "true" => MetadataValue::Bool(true),
        "false" => MetadataValue::Bool(false),
        _ => MetadataValue::String(raw.to_string()),
    }
}

/// Collect parsed pairs into a metadata map. Later keys win.
pub fn to_metadata(pairs: Vec<(String, MetadataValue)>) -> Metadata {
    pairs.into_iter().collect()
}

/// Conjunction of equality filters, or `None` when there are none.
pub fn to_filter(pairs: Vec<(String, MetadataValue)>) -> Option<Filter> {
    match pairs.len() {
        0 => None,
        1 => pairs.into_iter().next().map(|(k, v)| Filter::eq(k, v)),
        _ => Some(Filter::all(
            pairs.into_iter().map(|(k, v)| Filter::eq(k, v)).collect(),
        )),
    }
}

/// Print the error and exit with a failure code.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  Caused by: {cause}");
        }
    }
    std::process::exit(1);
}
