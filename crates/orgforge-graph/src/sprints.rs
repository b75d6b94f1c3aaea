use std::collections::HashMap;

use orgforge_core::{
    IdKind, Organization, RunContext, Sprint, SprintStatus, TicketGraph, TicketKind,
    TicketStatus,
};
use rand::seq::SliceRandom;
use rand::Rng;
use time::{Duration, OffsetDateTime};
use tracing::debug;

/// Chance that unfinished work is still sitting in the sprint that just closed.
const CARRYOVER_RATE: f64 = 0.2;

/// Back-to-back sprints for every team, the last one running at `start`,
/// with each non-epic ticket planned into one of its team's sprints.
///
/// Finished work lands anywhere, open work in the running sprint, and
/// work in flight mostly in the running sprint with some carryover.
/// Subtasks ride along with their task.
pub fn plan_sprints(
    work: &mut TicketGraph,
    org: &Organization,
    count: u32,
    duration_days: u32,
    start: OffsetDateTime,
    ctx: &mut RunContext,
) {
    let days = i64::from(duration_days);
    let mut by_team: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut sprints = Vec::new();

    for team in &org.teams {
        for k in 0..count {
            let start_date = start - Duration::days(days * i64::from(count - 1 - k));
            let end_date = start_date + Duration::days(days);
            let status = if end_date <= start {
                SprintStatus::Completed
            } else if start_date <= start {
                SprintStatus::Active
            } else {
                SprintStatus::Planned
            };
            by_team.entry(team.id.as_str()).or_default().push(sprints.len());
            sprints.push(Sprint {
                id: ctx.reserve_id(IdKind::Sprint),
                name: format!("Sprint {}", k + 1),
                team_id: team.id.clone(),
                goal: String::new(),
                start_date,
                end_date,
                status,
                tickets: Vec::new(),
                committed_points: 0,
                completed_points: 0,
            });
        }
    }

    let mut placed: HashMap<String, usize> = HashMap::new();
    for ticket in work.tickets.iter_mut() {
        if ticket.kind == TicketKind::Epic {
            continue;
        }
        let Some(slots) = by_team.get(ticket.team_id.as_str()) else {
            continue;
        };
        let current = slots.iter().copied().find(|&i| sprints[i].status == SprintStatus::Active);
        let previous = slots
            .iter()
            .copied()
            .filter(|&i| sprints[i].status == SprintStatus::Completed)
            .last();
        let parent_slot = ticket
            .parent
            .as_deref()
            .filter(|_| ticket.kind == TicketKind::Subtask)
            .and_then(|p| placed.get(p).copied());

        let slot = if let Some(slot) = parent_slot {
            Some(slot)
        } else if ticket.status.is_terminal() {
            slots.choose(ctx.rng()).copied()
        } else if ticket.status == TicketStatus::Open {
            current
        } else if previous.is_some() && ctx.rng().gen_bool(CARRYOVER_RATE) {
            previous
        } else {
            current.or(previous)
        };
        let Some(slot) = slot else {
            continue;
        };

        let sprint = &mut sprints[slot];
        let points = u32::from(ticket.story_points.unwrap_or(0));
        sprint.tickets.push(ticket.id.clone());
        sprint.committed_points += points;
        if ticket.status.is_terminal() {
            sprint.completed_points += points;
        }
        if sprint.goal.is_empty() && ticket.kind == TicketKind::Story {
            sprint.goal = ticket.title.clone();
        }
        ticket.sprint = Some(sprint.id.clone());
        placed.insert(ticket.id.clone(), slot);
    }

    for sprint in sprints.iter_mut().filter(|s| s.goal.is_empty()) {
        sprint.goal = match sprint.tickets.first() {
            Some(_) => "Burn down bugs and follow-ups".to_string(),
            None => "Pay down tech debt".to_string(),
        };
    }

    debug!(
        sprints = sprints.len(),
        planned = placed.len(),
        "sprints planned"
    );
    work.sprints = sprints;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::org::build_organization;
    use crate::tickets::build_ticket_graph;
    use orgforge_core::config::{parse_config, RunConfig};
    use orgforge_core::CompanyGraph;

    fn config() -> RunConfig {
        parse_config(
            r#"
team_count: 2
team_size_range: "3-5"
role_weights: { engineer: 4, manager: 1 }
epic_count: 4
story_range: "2-3"
task_range: "1-3"
subtask_range: "0-2"
bug_rate: 0.3
fixversion_count: 2
scenario_mix: { PlanningMeeting: 1 }
"#,
        )
        .unwrap()
    }

    fn build(cfg: &RunConfig, seed: u64) -> CompanyGraph {
        let mut ctx = RunContext::new(seed, cfg.project_key.clone());
        let org = build_organization(cfg, &mut ctx).unwrap();
        let work = build_ticket_graph(cfg, &org, &mut ctx).unwrap();
        CompanyGraph::new(cfg.start_date, org, work)
    }

    #[test]
    fn every_team_gets_back_to_back_sprints() {
        let cfg = config();
        let g = build(&cfg, 3);
        assert_eq!(g.work.sprints.len(), 2 * 3);
        for team in &g.org.teams {
            let mine: Vec<_> = g.work.sprints.iter().filter(|s| s.team_id == team.id).collect();
            assert_eq!(mine.len(), 3);
            assert!(mine.windows(2).all(|w| w[0].end_date == w[1].start_date));
            assert_eq!(mine[2].status, SprintStatus::Active);
            assert!(mine[2].contains(cfg.start_date));
            assert!(mine[..2].iter().all(|s| s.status == SprintStatus::Completed));
            assert_eq!(g.work.current_sprint(&team.id).unwrap().id, mine[2].id);
            assert_eq!(g.work.previous_sprint(&team.id).unwrap().id, mine[1].id);
        }
        assert_eq!(g.work.sprints[0].id, "SPR-1");
        g.check_invariants().unwrap();
    }

    #[test]
    fn placement_follows_status() {
        let cfg = config();
        for seed in 0..10 {
            let g = build(&cfg, seed);
            for t in &g.work.tickets {
                if t.kind == TicketKind::Epic {
                    assert!(t.sprint.is_none());
                    continue;
                }
                let sprint = g.work.sprint(t.sprint.as_deref().unwrap()).unwrap();
                assert_eq!(sprint.team_id, t.team_id);
                if t.kind == TicketKind::Subtask {
                    let task = g.ticket(t.parent.as_deref().unwrap()).unwrap();
                    assert_eq!(task.sprint, t.sprint);
                } else if t.status == TicketStatus::Open {
                    assert_eq!(sprint.status, SprintStatus::Active, "seed {seed}: {}", t.id);
                }
            }
            g.check_invariants().unwrap();
        }
    }

    #[test]
    fn points_add_up() {
        let g = build(&config(), 9);
        for sprint in &g.work.sprints {
            let tickets: Vec<_> = sprint.tickets.iter().map(|id| g.ticket(id).unwrap()).collect();
            let committed: u32 = tickets.iter().filter_map(|t| t.story_points).map(u32::from).sum();
            let completed: u32 = tickets
                .iter()
                .filter(|t| t.status.is_terminal())
                .filter_map(|t| t.story_points)
                .map(u32::from)
                .sum();
            assert_eq!(sprint.committed_points, committed);
            assert_eq!(sprint.completed_points, completed);
            assert!(!sprint.goal.is_empty());
        }
    }

    #[test]
    fn single_sprint_takes_everything() {
        let mut cfg = config();
        cfg.sprint_count = 1;
        let g = build(&cfg, 4);
        assert_eq!(g.work.sprints.len(), 2);
        assert!(g.work.sprints.iter().all(|s| s.status == SprintStatus::Active));
        assert!(g.work.previous_sprint("TEAM-1").is_none());
        let planned: usize = g.work.sprints.iter().map(|s| s.tickets.len()).sum();
        let non_epic = g.work.tickets.iter().filter(|t| t.kind != TicketKind::Epic).count();
        assert_eq!(planned, non_epic);
    }

    #[test]
    fn sprint_length_follows_config() {
        let mut cfg = config();
        cfg.sprint_duration_days = 7;
        let g = build(&cfg, 1);
        for s in &g.work.sprints {
            assert_eq!(s.end_date - s.start_date, Duration::days(7));
        }
        assert_eq!(g.work.sprints[0].start_date, cfg.start_date - Duration::days(14));
    }
}
