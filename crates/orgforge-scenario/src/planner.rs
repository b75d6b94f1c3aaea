use std::collections::BTreeMap;

use orgforge_core::config::RunConfig;
use orgforge_core::{
    CompanyGraph, GraphError, IdKind, RunContext, ScenarioEvent, ScenarioKind, StatusChange,
    TicketKind, TicketStatus,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::clock::WorkClock;
use crate::rules::{bind, Binding, Cursors};

/// Planned events in timestamp order plus what could not be bound.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScenarioPlan {
    pub events: Vec<ScenarioEvent>,
    pub requested: u32,
    /// Requested events per kind that had nothing to bind to.
    pub deficits: BTreeMap<ScenarioKind, u32>,
}

impl ScenarioPlan {
    pub fn skipped(&self) -> u32 {
        self.deficits.values().sum()
    }

    pub fn count(&self, kind: ScenarioKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

/// Plan every event in the mix, round-robin across kinds.
///
/// Status side effects are committed to `graph` before the next event is
/// bound, so later events see earlier ones' changes.
pub fn plan_scenarios(
    cfg: &RunConfig,
    graph: &mut CompanyGraph,
    ctx: &mut RunContext,
) -> Result<ScenarioPlan, GraphError> {
    let mut remaining: Vec<(ScenarioKind, u32)> =
        cfg.scenario_mix.iter().map(|m| (m.kind, m.count)).collect();
    let mut clock = WorkClock::new(cfg.start_date, cfg.event_spacing_minutes);
    let mut cursors = Cursors::default();
    let mut plan = ScenarioPlan {
        requested: cfg.requested_events(),
        ..ScenarioPlan::default()
    };

    while remaining.iter().any(|(_, n)| *n > 0) {
        for (kind, left) in remaining.iter_mut() {
            if *left == 0 {
                continue;
            }
            *left -= 1;
            let Some(binding) = bind(*kind, graph, &mut cursors) else {
                *plan.deficits.entry(*kind).or_insert(0) += 1;
                debug!(kind = %kind, "no qualifying entities, skipped");
                continue;
            };
            let id = ctx.reserve_id(IdKind::Event);
            let at = clock.next_slot();
            let event = commit(graph, *kind, id, at, binding)?;
            debug!(
                event = %event.id,
                kind = %event.kind,
                tickets = event.tickets.len(),
                people = event.people.len(),
                changes = event.status_changes.len(),
                "event planned"
            );
            plan.events.push(event);
        }
    }

    for (kind, n) in &plan.deficits {
        warn!(kind = %kind, skipped = n, "scenario deficit");
    }
    info!(
        planned = plan.events.len(),
        requested = plan.requested,
        skipped = plan.skipped(),
        "scenario plan ready"
    );
    Ok(plan)
}

/// Apply the binding's status moves and snapshot the bound statuses.
fn commit(
    graph: &mut CompanyGraph,
    kind: ScenarioKind,
    id: String,
    at: OffsetDateTime,
    binding: Binding,
) -> Result<ScenarioEvent, GraphError> {
    let mut changes: Vec<StatusChange> = Vec::new();
    for (ticket, to) in &binding.moves {
        changes.push(graph.transition_ticket(ticket, *to, at, &id)?);
        if let Some(epic) = epic_of(graph, ticket) {
            if graph.ticket(&epic).map(|t| t.status) == Some(TicketStatus::Open) {
                changes.push(graph.transition_ticket(&epic, TicketStatus::InProgress, at, &id)?);
            }
        }
    }

    let bound_status = binding
        .tickets
        .iter()
        .filter_map(|t| graph.ticket(t).map(|ticket| (t.clone(), ticket.status)))
        .collect();

    Ok(ScenarioEvent {
        id,
        kind,
        timestamp: at,
        tickets: binding.tickets,
        people: binding.people,
        team: binding.team,
        fix_version: binding.fix_version,
        sprint: binding.sprint,
        bound_status,
        status_changes: changes,
    })
}

fn epic_of(graph: &CompanyGraph, ticket: &str) -> Option<String> {
    let mut cur = graph.ticket(ticket)?;
    while let Some(parent) = cur.parent.as_deref() {
        cur = graph.ticket(parent)?;
    }
    (cur.kind == TicketKind::Epic && cur.id != ticket).then(|| cur.id.clone())
}
