use anyhow::Result;
use serde::Serialize;

use crate::application::KnowledgeRuntime;
use crate::cli::output::{output, CommandOutput};
use crate::cli::table::format_health_table;
use crate::domain::models::ComponentState;

#[derive(Debug, Serialize)]
pub struct HealthOutput {
    pub ready: bool,
    pub components: Vec<ComponentState>,
}

impl CommandOutput for HealthOutput {
    fn to_human(&self) -> String {
        let headline = if self.ready {
            "Ready"
        } else {
            "Not ready"
        };
        format!("{headline}\n{}", format_health_table(&self.components))
    }
}

/// Handle the health command
pub fn handle_health(runtime: &KnowledgeRuntime, json: bool) -> Result<()> {
    let report = HealthOutput {
        ready: runtime.registry().is_ready(),
        components: runtime.health().as_ref().clone(),
    };
    output(&report, json);
    Ok(())
}
