use anyhow::Result;
use orgforge_conductor::{prepare, Prepared};
use orgforge_core::{ScenarioKind, TicketKind};

use crate::cmd_config::{self, ConfigArgs};

/// Execute `orgforge plan -c <config>`: graph and plan only, no provider calls.
pub fn execute(config: &ConfigArgs, json: bool) -> Result<()> {
    let cfg = cmd_config::load(config)?;
    let prepared = prepare(&cfg)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prepared.plan.events)?);
        return Ok(());
    }
    print!("{}", render(&prepared));
    Ok(())
}

fn render(p: &Prepared) -> String {
    let g = &p.graph;
    let mut out = String::new();
    out.push_str(&format!("{} ({})\n", g.org.company_name, g.org.email_domain));
    out.push_str(&format!(
        "  People: {} in {} teams\n",
        g.org.people.len(),
        g.org.teams.len()
    ));

    let count = |kind: TicketKind| g.work.tickets.iter().filter(|t| t.kind == kind).count();
    out.push_str(&format!(
        "  Tickets: {} ({} epics, {} stories, {} tasks, {} subtasks, {} bugs)\n",
        g.work.tickets.len(),
        count(TicketKind::Epic),
        count(TicketKind::Story),
        count(TicketKind::Task),
        count(TicketKind::Subtask),
        count(TicketKind::Bug),
    ));
    out.push_str(&format!("  Fix versions: {}\n", g.work.fix_versions.len()));
    out.push_str(&format!("  Sprints: {}\n", g.work.sprints.len()));
    out.push_str(&format!("  Fingerprint: {}\n", p.fingerprint));

    out.push_str(&format!(
        "\n  Events: {} planned of {} requested\n",
        p.plan.events.len(),
        p.plan.requested
    ));
    for kind in ScenarioKind::ALL {
        let planned = p.plan.count(kind);
        let skipped = p.plan.deficits.get(&kind).copied().unwrap_or(0);
        if planned == 0 && skipped == 0 {
            continue;
        }
        let note = if skipped > 0 {
            format!(" ({skipped} skipped, nothing to bind)")
        } else {
            String::new()
        };
        out.push_str(&format!("    {kind}: {planned}{note}\n"));
    }
    out
}
