use std::collections::BTreeMap;

use orgforge_core::{ConfigurationError, RunContext, TicketGraph, TicketKind, TicketStatus};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::BuildError;

const BLOCKING_REASONS: &[&str] = &[
    "Waiting for external API documentation",
    "Pending security review",
    "Infrastructure upgrade required",
    "Dependent service not yet available",
    "Awaiting client feedback",
    "Technical debt needs to be addressed first",
    "Resource constraints",
];

/// Cause recorded on every change made while building the graph.
pub const BUILD_CAUSE: &str = "build";

/// Walk every ticket to a sampled target status along valid transitions,
/// then derive epic status from their descendants.
///
/// History timestamps run up to `start`, so everything here predates the
/// first scenario event.
pub fn apply_progress(
    work: &mut TicketGraph,
    weights: &BTreeMap<TicketStatus, f64>,
    start: OffsetDateTime,
    ctx: &mut RunContext,
) -> Result<(), BuildError> {
    let statuses: Vec<TicketStatus> = weights.keys().copied().collect();
    let dist = WeightedIndex::new(weights.values().copied())
        .map_err(|e| ConfigurationError::invalid("status_weights", e.to_string()))?;

    let steps: usize = work.tickets.len() * 4;
    let mut clock = Clock {
        at: start - Duration::minutes(10 * steps as i64 + 10),
    };

    let ids: Vec<(String, TicketKind)> = work
        .tickets
        .iter()
        .map(|t| (t.id.clone(), t.kind))
        .collect();

    for (id, kind) in ids.iter().filter(|(_, k)| *k != TicketKind::Epic) {
        let target = statuses[dist.sample(ctx.rng())];
        let path = TicketStatus::INITIAL.path_to(target).unwrap_or_default();
        for step in path {
            work.transition(id, step, clock.tick(), BUILD_CAUSE)?;
        }
        if target == TicketStatus::Blocked {
            let reason = BLOCKING_REASONS.choose(ctx.rng()).copied().unwrap_or("Blocked upstream");
            if let Some(t) = work.tickets.iter_mut().find(|t| &t.id == id) {
                t.blocking_reason = Some(reason.to_string());
            }
        }
        debug!(ticket = %id, ?kind, %target, "ticket progressed");
    }

    for (id, _) in ids.iter().filter(|(_, k)| *k == TicketKind::Epic) {
        let below: Vec<TicketStatus> = work.descendants_of(id).iter().map(|t| t.status).collect();
        let target = if !below.is_empty() && below.iter().all(|s| s.is_terminal()) {
            TicketStatus::Done
        } else if below.iter().any(|s| *s != TicketStatus::Open) {
            TicketStatus::InProgress
        } else {
            continue;
        };
        let path = TicketStatus::INITIAL.path_to(target).unwrap_or_default();
        for step in path {
            work.transition(id, step, clock.tick(), BUILD_CAUSE)?;
        }
    }
    Ok(())
}

struct Clock {
    at: OffsetDateTime,
}

impl Clock {
    fn tick(&mut self) -> OffsetDateTime {
        self.at += Duration::minutes(10);
        self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgforge_core::{Component, Priority, Ticket};
    use time::macros::datetime;

    fn ticket(id: &str, kind: TicketKind, parent: Option<&str>) -> Ticket {
        Ticket {
            id: id.into(),
            kind,
            title: id.into(),
            status: TicketStatus::Open,
            assignee: None,
            team_id: "TEAM-1".into(),
            parent: parent.map(Into::into),
            fix_version: None,
            sprint: None,
            priority: Priority::Low,
            component: Component::Testing,
            story_points: None,
            related: vec![],
            depends_on: vec![],
            blocking_reason: None,
        }
    }

    fn work() -> TicketGraph {
        TicketGraph {
            project_key: "P".into(),
            fix_versions: vec![],
            sprints: vec![],
            tickets: vec![
                ticket("P-1", TicketKind::Epic, None),
                ticket("P-2", TicketKind::Story, Some("P-1")),
                ticket("P-3", TicketKind::Task, Some("P-2")),
                ticket("P-4", TicketKind::Epic, None),
            ],
            history: vec![],
        }
    }

    const START: OffsetDateTime = datetime!(2024-01-08 09:00 UTC);

    #[test]
    fn all_done_makes_epic_done() {
        let mut w = work();
        let weights = BTreeMap::from([(TicketStatus::Done, 1.0)]);
        apply_progress(&mut w, &weights, START, &mut RunContext::new(0, "P")).unwrap();
        assert_eq!(w.ticket("P-1").unwrap().status, TicketStatus::Done);
        // an epic with nothing under it stays open
        assert_eq!(w.ticket("P-4").unwrap().status, TicketStatus::Open);
        assert!(w.history.iter().all(|c| c.at < START && c.cause == BUILD_CAUSE));
        orgforge_core::status::validate_history(&w.history).unwrap();
    }

    #[test]
    fn mixed_progress_makes_epic_in_progress() {
        let mut w = work();
        let weights = BTreeMap::from([(TicketStatus::InReview, 1.0)]);
        apply_progress(&mut w, &weights, START, &mut RunContext::new(0, "P")).unwrap();
        assert_eq!(w.ticket("P-1").unwrap().status, TicketStatus::InProgress);
        assert_eq!(w.ticket("P-3").unwrap().status, TicketStatus::InReview);
    }

    #[test]
    fn all_open_leaves_epic_open() {
        let mut w = work();
        let weights = BTreeMap::from([(TicketStatus::Open, 1.0)]);
        apply_progress(&mut w, &weights, START, &mut RunContext::new(0, "P")).unwrap();
        assert!(w.tickets.iter().all(|t| t.status == TicketStatus::Open));
        assert!(w.history.is_empty());
    }

    #[test]
    fn blocked_tickets_get_reason() {
        let mut w = work();
        let weights = BTreeMap::from([(TicketStatus::Blocked, 1.0)]);
        apply_progress(&mut w, &weights, START, &mut RunContext::new(0, "P")).unwrap();
        let t = w.ticket("P-3").unwrap();
        assert_eq!(t.status, TicketStatus::Blocked);
        assert!(t.blocking_reason.is_some());
        // Open -> InProgress -> Blocked
        assert_eq!(w.history.iter().filter(|c| c.ticket_id == "P-3").count(), 2);
    }

    #[test]
    fn closed_walks_through_done() {
        let mut w = work();
        let weights = BTreeMap::from([(TicketStatus::Closed, 1.0)]);
        apply_progress(&mut w, &weights, START, &mut RunContext::new(0, "P")).unwrap();
        let path: Vec<_> = w
            .history
            .iter()
            .filter(|c| c.ticket_id == "P-2")
            .map(|c| c.to)
            .collect();
        assert_eq!(
            path,
            vec![TicketStatus::InProgress, TicketStatus::Done, TicketStatus::Closed]
        );
        assert_eq!(w.ticket("P-1").unwrap().status, TicketStatus::Done);
    }

    #[test]
    fn history_timestamps_increase() {
        let mut w = work();
        let weights = BTreeMap::from([(TicketStatus::Closed, 1.0)]);
        apply_progress(&mut w, &weights, START, &mut RunContext::new(0, "P")).unwrap();
        assert!(w.history.windows(2).all(|p| p[0].at < p[1].at));
    }
}
