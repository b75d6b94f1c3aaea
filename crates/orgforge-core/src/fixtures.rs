//! Small hand-built company used by tests across the workspace.
//!
//! Two teams, six tickets, one fix version, one sprint, and four events already bound
//! the way the scenario planner would bind them.

use std::collections::BTreeMap;

use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::graph::CompanyGraph;
use crate::status::TicketStatus;
use crate::types::{
    Component, FixVersion, Organization, Person, Priority, Role, ScenarioEvent, ScenarioKind,
    Sprint, SprintStatus, Team, Ticket, TicketGraph, TicketKind,
};

pub const START: OffsetDateTime = datetime!(2024-01-08 09:00 UTC);

fn person(id: &str, name: &str, role: Role, team: &str) -> Person {
    Person {
        id: id.into(),
        name: name.into(),
        email: crate::ids::email_for(name, "acme.test"),
        role,
        team_id: team.into(),
    }
}

fn ticket(
    id: &str,
    kind: TicketKind,
    title: &str,
    team: &str,
    parent: Option<&str>,
    assignee: Option<&str>,
) -> Ticket {
    Ticket {
        id: id.into(),
        kind,
        title: title.into(),
        status: TicketStatus::Open,
        assignee: assignee.map(Into::into),
        team_id: team.into(),
        parent: parent.map(Into::into),
        fix_version: None,
        sprint: None,
        priority: Priority::Medium,
        component: Component::Backend,
        story_points: kind.is_estimated().then_some(3),
        related: vec![],
        depends_on: vec![],
        blocking_reason: None,
    }
}

/// Platform (Mary Smith, John Lee) and Payments (Karen Hill, Paul King).
///
/// | ticket | kind  | status     | assignee   |
/// |--------|-------|------------|------------|
/// | PROJ-1 | Epic  | InProgress | -          |
/// | PROJ-2 | Story | InProgress | Mary Smith |
/// | PROJ-3 | Task  | InReview   | John Lee   |
/// | PROJ-4 | Bug   | Open       | Mary Smith |
/// | PROJ-5 | Epic  | Done       | -          |
/// | PROJ-6 | Story | Done       | Karen Hill |
pub fn company() -> CompanyGraph {
    let org = Organization {
        company_name: "Acme".into(),
        email_domain: "acme.test".into(),
        people: vec![
            person("EMP-1", "Mary Smith", Role::Engineer, "TEAM-1"),
            person("EMP-2", "John Lee", Role::Manager, "TEAM-1"),
            person("EMP-3", "Karen Hill", Role::TechLead, "TEAM-2"),
            person("EMP-4", "Paul King", Role::Qa, "TEAM-2"),
        ],
        teams: vec![
            Team {
                id: "TEAM-1".into(),
                name: "Platform".into(),
                members: vec!["EMP-1".into(), "EMP-2".into()],
                manager: "EMP-2".into(),
                parent: None,
            },
            Team {
                id: "TEAM-2".into(),
                name: "Payments".into(),
                members: vec!["EMP-3".into(), "EMP-4".into()],
                manager: "EMP-3".into(),
                parent: None,
            },
        ],
    };

    let mut bug = ticket(
        "PROJ-4",
        TicketKind::Bug,
        "Timeout on checkout submit",
        "TEAM-1",
        Some("PROJ-1"),
        Some("EMP-1"),
    );
    bug.related = vec!["PROJ-2".into()];
    bug.priority = Priority::High;
    let mut shipped = ticket(
        "PROJ-6",
        TicketKind::Story,
        "Refund receipts",
        "TEAM-2",
        Some("PROJ-5"),
        Some("EMP-3"),
    );
    shipped.fix_version = Some("VER-1".into());

    let mut work = TicketGraph {
        project_key: "PROJ".into(),
        fix_versions: vec![FixVersion {
            id: "VER-1".into(),
            name: "v1.0.0".into(),
            target_date: START + Duration::days(14),
            released: false,
        }],
        sprints: vec![],
        tickets: vec![
            ticket("PROJ-1", TicketKind::Epic, "Checkout revamp", "TEAM-1", None, None),
            ticket(
                "PROJ-2",
                TicketKind::Story,
                "Saved payment methods",
                "TEAM-1",
                Some("PROJ-1"),
                Some("EMP-1"),
            ),
            ticket(
                "PROJ-3",
                TicketKind::Task,
                "Card form validation",
                "TEAM-1",
                Some("PROJ-2"),
                Some("EMP-2"),
            ),
            bug,
            ticket("PROJ-5", TicketKind::Epic, "Refund flow", "TEAM-2", None, None),
            shipped,
        ],
        history: vec![],
    };

    let targets = [
        ("PROJ-1", TicketStatus::InProgress),
        ("PROJ-2", TicketStatus::InProgress),
        ("PROJ-3", TicketStatus::InReview),
        ("PROJ-6", TicketStatus::Done),
        ("PROJ-5", TicketStatus::Done),
    ];
    let mut at = START - Duration::hours(24);
    for (id, target) in targets {
        for step in TicketStatus::INITIAL.path_to(target).unwrap_or_default() {
            at += Duration::minutes(10);
            if let Err(e) = work.transition(id, step, at, "build") {
                panic!("fixture transition failed: {e}");
            }
        }
    }

    let planned = ["PROJ-2", "PROJ-3", "PROJ-4"];
    let mut committed: u32 = 0;
    for t in work.tickets.iter_mut().filter(|t| planned.contains(&t.id.as_str())) {
        t.sprint = Some("SPR-1".into());
        committed += u32::from(t.story_points.unwrap_or(0));
    }
    work.sprints.push(Sprint {
        id: "SPR-1".into(),
        name: "Sprint 1".into(),
        team_id: "TEAM-1".into(),
        goal: "Saved payment methods".into(),
        start_date: START - Duration::days(3),
        end_date: START + Duration::days(11),
        status: SprintStatus::Active,
        tickets: planned.iter().map(|t| t.to_string()).collect(),
        committed_points: committed,
        completed_points: 0,
    });

    CompanyGraph::new(START, org, work)
}

fn event(
    id: &str,
    kind: ScenarioKind,
    hours: i64,
    tickets: &[&str],
    people: &[&str],
    team: Option<&str>,
    graph: &CompanyGraph,
) -> ScenarioEvent {
    let bound_status: BTreeMap<_, _> = tickets
        .iter()
        .filter_map(|t| graph.ticket(t).map(|ticket| (t.to_string(), ticket.status)))
        .collect();
    ScenarioEvent {
        id: id.into(),
        kind,
        timestamp: START + Duration::hours(hours),
        tickets: tickets.iter().map(|t| t.to_string()).collect(),
        people: people.iter().map(|p| p.to_string()).collect(),
        team: team.map(Into::into),
        fix_version: None,
        sprint: None,
        bound_status,
        status_changes: vec![],
    }
}

/// Platform standup over its in-progress story, inside Sprint 1.
pub fn standup(graph: &CompanyGraph) -> ScenarioEvent {
    let mut e = event(
        "EVT-1",
        ScenarioKind::StandupMeeting,
        0,
        &["PROJ-2"],
        &["EMP-1", "EMP-2"],
        Some("TEAM-1"),
        graph,
    );
    e.sprint = Some("SPR-1".into());
    e
}

/// Incident thread for the checkout bug between its assignee and manager.
pub fn incident(graph: &CompanyGraph) -> ScenarioEvent {
    event(
        "EVT-2",
        ScenarioKind::IncidentEmail,
        2,
        &["PROJ-4"],
        &["EMP-1", "EMP-2"],
        Some("TEAM-1"),
        graph,
    )
}

/// Release announcement for VER-1 from the Payments lead.
pub fn release(graph: &CompanyGraph) -> ScenarioEvent {
    let mut e = event(
        "EVT-3",
        ScenarioKind::ReleaseEmail,
        4,
        &["PROJ-6"],
        &["EMP-3"],
        None,
        graph,
    );
    e.fix_version = Some("VER-1".into());
    e
}

/// Code review of PROJ-3: author John Lee, reviewer Mary Smith.
pub fn review(graph: &CompanyGraph) -> ScenarioEvent {
    event(
        "EVT-4",
        ScenarioKind::ReviewEmail,
        6,
        &["PROJ-3"],
        &["EMP-2", "EMP-1"],
        Some("TEAM-1"),
        graph,
    )
}
