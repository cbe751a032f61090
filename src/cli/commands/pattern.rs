use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::KnowledgeRuntime;
use crate::cli::output::{output, CommandOutput};
use crate::cli::table::{format_metadata, format_search_table};
use crate::cli::{to_filter, to_metadata};
use crate::domain::models::{Metadata, MetadataValue, Pattern, SearchResponse};
use crate::services::{PatternUpdate, SearchRequest};

#[derive(Debug, Serialize)]
pub struct AddOutput {
    pub success: bool,
    pub id: String,
}

impl CommandOutput for AddOutput {
    fn to_human(&self) -> String {
        format!("Stored pattern {}", self.id)
    }
}

#[derive(Debug, Serialize)]
pub struct SearchOutput {
    pub query: String,
    #[serde(flatten)]
    pub response: SearchResponse,
}

impl CommandOutput for SearchOutput {
    fn to_human(&self) -> String {
        if self.response.degraded {
            return "Vector index unavailable; no search was performed.".to_string();
        }
        if self.response.is_empty() {
            return format!("No patterns match '{}'.", self.query);
        }
        let count = self.response.len();
        format!(
            "{}\n\n{count} result{}",
            format_search_table(&self.response.results),
            if count == 1 { "" } else { "s" }
        )
    }
}

/// Pattern view without the raw embedding.
#[derive(Debug, Serialize)]
pub struct PatternOutput {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Pattern> for PatternOutput {
    fn from(pattern: Pattern) -> Self {
        Self {
            dimension: pattern.embedding.len(),
            id: pattern.id,
            text: pattern.text,
            metadata: pattern.metadata,
            created_at: pattern.created_at,
            updated_at: pattern.updated_at,
        }
    }
}

impl CommandOutput for PatternOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("ID:        {}", self.id),
            format!("Text:      {}", self.text),
            format!("Dimension: {}", self.dimension),
            format!("Created:   {}", self.created_at.format("%Y-%m-%d %H:%M:%S")),
            format!("Updated:   {}", self.updated_at.format("%Y-%m-%d %H:%M:%S")),
        ];
        if !self.metadata.is_empty() {
            lines.push(format!("Metadata:  {}", format_metadata(&self.metadata)));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteOutput {
    pub success: bool,
    pub id: String,
}

impl CommandOutput for DeleteOutput {
    fn to_human(&self) -> String {
        format!("Deleted pattern {}", self.id)
    }
}

/// Handle the add command
pub async fn handle_add(
    runtime: &KnowledgeRuntime,
    text: &str,
    meta: Vec<(String, MetadataValue)>,
    json: bool,
) -> Result<()> {
    let id = runtime
        .knowledge_base()
        .add(text, to_metadata(meta))
        .await
        .context("Failed to store pattern")?;
    output(&AddOutput { success: true, id }, json);
    Ok(())
}

/// Handle the search command
pub async fn handle_search(
    runtime: &KnowledgeRuntime,
    query: String,
    limit: Option<usize>,
    min_score: Option<f32>,
    filter: Vec<(String, MetadataValue)>,
    json: bool,
) -> Result<()> {
    let mut request = SearchRequest::new(query.clone());
    if let Some(filter) = to_filter(filter) {
        request = request.with_filter(filter);
    }
    if let Some(limit) = limit {
        request = request.with_limit(limit);
    }
    if let Some(min_score) = min_score {
        request = request.with_min_score(min_score);
    }

    let response = runtime
        .knowledge_base()
        .search_with(request)
        .await
        .context("Search failed")?;
    output(&SearchOutput { query, response }, json);
    Ok(())
}

/// Handle the update command
pub async fn handle_update(
    runtime: &KnowledgeRuntime,
    id: &str,
    text: Option<String>,
    meta: Vec<(String, MetadataValue)>,
    json: bool,
) -> Result<()> {
    let metadata = if meta.is_empty() {
        None
    } else {
        Some(to_metadata(meta))
    };
    if text.is_none() && metadata.is_none() {
        anyhow::bail!("Nothing to update: pass --text and/or --meta");
    }

    let pattern = runtime
        .knowledge_base()
        .update(id, PatternUpdate { text, metadata })
        .await
        .with_context(|| format!("Failed to update pattern {id}"))?;
    output(&PatternOutput::from(pattern), json);
    Ok(())
}

/// Handle the delete command
pub async fn handle_delete(runtime: &KnowledgeRuntime, id: &str, json: bool) -> Result<()> {
    runtime
        .knowledge_base()
        .delete(id)
        .await
        .with_context(|| format!("Failed to delete pattern {id}"))?;
    output(
        &DeleteOutput {
            success: true,
            id: id.to_string(),
        },
        json,
    );
    Ok(())
}

/// Handle the get command
pub async fn handle_get(runtime: &KnowledgeRuntime, id: &str, json: bool) -> Result<()> {
    let pattern = runtime
        .knowledge_base()
        .get(id)
        .await
        .context("Failed to fetch pattern")?
        .ok_or_else(|| anyhow::anyhow!("Pattern not found: {id}"))?;
    output(&PatternOutput::from(pattern), json);
    Ok(())
}
