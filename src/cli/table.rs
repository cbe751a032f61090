//! Table output for CLI commands using comfy-table.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::cli::output::truncate;
use crate::domain::models::{ComponentState, ComponentStatus, Metadata, SearchResult};

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|n| Cell::new(n).add_attribute(Attribute::Bold))
        .collect()
}

/// Component status table for `health`.
pub fn format_health_table(states: &[ComponentState]) -> String {
    let use_colors = supports_color();
    let mut table = base_table();
    table.set_header(header(&["Component", "Status", "Critical", "Retries", "Error"]));

    for state in states {
        let status = if use_colors {
            Cell::new(state.status).fg(status_color(state.status))
        } else {
            Cell::new(state.status)
        };
        table.add_row(vec![
            Cell::new(&state.name),
            status,
            Cell::new(if state.critical { "yes" } else { "no" }),
            Cell::new(state.retry_count),
            Cell::new(state.error.as_deref().map(|e| truncate(e, 60)).unwrap_or_default()),
        ]);
    }

    table.to_string()
}

/// Ranked hits for `search`.
pub fn format_search_table(results: &[SearchResult]) -> String {
    let mut table = base_table();
    table.set_header(header(&["#", "Score", "ID", "Text", "Metadata"]));

    for (rank, result) in results.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(format!("{:.4}", result.score)),
            Cell::new(&result.pattern_id),
            Cell::new(truncate(result.text.as_deref().unwrap_or(""), 50)),
            Cell::new(format_metadata(&result.payload)),
        ]);
    }

    table.to_string()
}

/// `k=v, k=v` rendering of a metadata map.
pub fn format_metadata(metadata: &Metadata) -> String {
    metadata
        .iter()
        .map(|(k, v)| {
            let rendered = serde_json::to_string(v).unwrap_or_default();
            format!("{k}={}", rendered.trim_matches('"'))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn status_color(status: ComponentStatus) -> Color {
    match status {
        ComponentStatus::Initialized => Color::Green,
        ComponentStatus::Degraded | ComponentStatus::Initializing => Color::Yellow,
        ComponentStatus::Failed => Color::Red,
        ComponentStatus::Uninitialized | ComponentStatus::Stopped => Color::Grey,
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MetadataValue;

    #[test]
    fn test_format_metadata() {
        let metadata = Metadata::from([
            ("lang".to_string(), MetadataValue::from("python")),
            ("stars".to_string(), MetadataValue::Int(3)),
        ]);
        assert_eq!(format_metadata(&metadata), "lang=python, stars=3");
    }

    #[test]
    fn test_search_table_lists_every_hit() {
        let results = vec![
            SearchResult {
                pattern_id: "p1".to_string(),
                score: 0.91,
                payload: Metadata::new(),
                text: Some("async retry pattern".to_string()),
            },
            SearchResult {
                pattern_id: "p2".to_string(),
                score: 0.42,
                payload: Metadata::new(),
                text: None,
            },
        ];
        let rendered = format_search_table(&results);
        assert!(rendered.contains("p1"));
        assert!(rendered.contains("0.9100"));
        assert!(rendered.contains("p2"));
    }
}
