use anyhow::{bail, Result};
use orgforge_conductor::revalidate;
use std::path::Path;

use crate::sink::read_dataset;

/// Execute `orgforge validate <dir>`
pub fn execute(dir: &Path) -> Result<()> {
    let data = read_dataset(dir)?;
    let issues = revalidate(&data.graph, &data.events, &data.artifacts);
    if issues.is_empty() {
        println!(
            "✓ {} artifacts consistent with {} events",
            data.artifacts.len(),
            data.events.len()
        );
        return Ok(());
    }
    for issue in &issues {
        println!("✗ {} ({})", issue.artifact_id, issue.event_id);
        for message in &issue.messages {
            println!("    {message}");
        }
    }
    bail!(
        "{} of {} artifacts failed validation",
        issues.len(),
        data.artifacts.len()
    )
}
