//! One binding function per scenario kind.
//!
//! A binding picks the graph entities an event is about. Rotation cursors
//! spread consecutive events of the same kind over different teams, bugs,
//! and releases.

use std::collections::HashMap;

use orgforge_core::{
    CompanyGraph, FixVersionId, PersonId, ScenarioKind, Sprint, SprintId, TeamId, Ticket,
    TicketGraph, TicketId, TicketKind, TicketStatus,
};

pub const MAX_MEETING_TICKETS: usize = 6;
pub const PLANNING_COMMITS: usize = 2;
pub const MAX_RELEASE_TICKETS: usize = 8;

/// Entities bound to one event, plus the status moves it causes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
    pub tickets: Vec<TicketId>,
    pub people: Vec<PersonId>,
    pub team: Option<TeamId>,
    pub fix_version: Option<FixVersionId>,
    pub sprint: Option<SprintId>,
    pub moves: Vec<(TicketId, TicketStatus)>,
}

/// Per-kind rotation positions.
#[derive(Debug, Default)]
pub struct Cursors {
    next: HashMap<ScenarioKind, usize>,
}

impl Cursors {
    /// First index in rotation order (starting at this kind's cursor) that
    /// satisfies `pick`; advances the cursor past it.
    fn rotate<T>(
        &mut self,
        kind: ScenarioKind,
        len: usize,
        mut pick: impl FnMut(usize) -> Option<T>,
    ) -> Option<T> {
        let start = self.next.get(&kind).copied().unwrap_or(0);
        for i in 0..len {
            let idx = (start + i) % len;
            if let Some(found) = pick(idx) {
                self.next.insert(kind, idx + 1);
                return Some(found);
            }
        }
        None
    }
}

/// Bind an event of `kind`, or `None` when nothing in the graph qualifies.
pub fn bind(kind: ScenarioKind, graph: &CompanyGraph, cursors: &mut Cursors) -> Option<Binding> {
    match kind {
        ScenarioKind::StandupMeeting => bind_standup(graph, cursors),
        ScenarioKind::PlanningMeeting => bind_planning(graph, cursors),
        ScenarioKind::RetroMeeting => bind_retro(graph, cursors),
        ScenarioKind::ReviewMeeting => bind_review_meeting(graph, cursors),
        ScenarioKind::IncidentEmail => bind_incident(graph, cursors),
        ScenarioKind::ReviewEmail => bind_review_email(graph, cursors),
        ScenarioKind::ReleaseEmail => bind_release(graph, cursors),
    }
}

/// Team meeting shape: which tickets qualify and which sprint it talks about.
struct Meeting {
    kind: ScenarioKind,
    limit: Option<usize>,
    wanted: fn(&Ticket) -> bool,
    sprint: for<'a> fn(&'a TicketGraph, &str) -> Option<&'a Sprint>,
}

/// Rotate over teams with at least one matching ticket. Tickets of the
/// bound sprint come first, then the rest in creation order.
fn team_meeting(meeting: Meeting, graph: &CompanyGraph, cursors: &mut Cursors) -> Option<Binding> {
    let teams = &graph.org.teams;
    cursors.rotate(meeting.kind, teams.len(), |i| {
        let team = &teams[i];
        let sprint = (meeting.sprint)(&graph.work, &team.id).map(|s| s.id.as_str());
        let mut pool: Vec<&Ticket> = graph
            .work
            .tickets
            .iter()
            .filter(|t| t.team_id == team.id && (meeting.wanted)(t))
            .collect();
        if pool.is_empty() {
            return None;
        }
        if sprint.is_some() {
            pool.sort_by_key(|t| t.sprint.as_deref() != sprint);
        }
        Some(Binding {
            tickets: pool
                .iter()
                .take(meeting.limit.unwrap_or(usize::MAX))
                .map(|t| t.id.clone())
                .collect(),
            people: team.members.clone(),
            team: Some(team.id.clone()),
            sprint: sprint.map(str::to_string),
            ..Binding::default()
        })
    })
}

fn current<'a>(work: &'a TicketGraph, team_id: &str) -> Option<&'a Sprint> {
    work.current_sprint(team_id)
}

/// Retros look back at the sprint that just closed.
fn just_closed<'a>(work: &'a TicketGraph, team_id: &str) -> Option<&'a Sprint> {
    work.previous_sprint(team_id)
        .or_else(|| work.current_sprint(team_id))
}

/// Everything in flight, epics included.
fn bind_standup(graph: &CompanyGraph, cursors: &mut Cursors) -> Option<Binding> {
    team_meeting(
        Meeting {
            kind: ScenarioKind::StandupMeeting,
            limit: None,
            wanted: |t| t.status == TicketStatus::InProgress,
            sprint: current,
        },
        graph,
        cursors,
    )
}

fn bind_planning(graph: &CompanyGraph, cursors: &mut Cursors) -> Option<Binding> {
    let mut binding = team_meeting(
        Meeting {
            kind: ScenarioKind::PlanningMeeting,
            limit: Some(MAX_MEETING_TICKETS),
            wanted: |t| t.kind != TicketKind::Epic && t.status == TicketStatus::Open,
            sprint: current,
        },
        graph,
        cursors,
    )?;
    binding.moves = binding
        .tickets
        .iter()
        .take(PLANNING_COMMITS)
        .map(|id| (id.clone(), TicketStatus::InProgress))
        .collect();
    Some(binding)
}

fn bind_retro(graph: &CompanyGraph, cursors: &mut Cursors) -> Option<Binding> {
    team_meeting(
        Meeting {
            kind: ScenarioKind::RetroMeeting,
            limit: Some(MAX_MEETING_TICKETS),
            wanted: |t| t.kind != TicketKind::Epic && t.status.is_terminal(),
            sprint: just_closed,
        },
        graph,
        cursors,
    )
}

fn bind_review_meeting(graph: &CompanyGraph, cursors: &mut Cursors) -> Option<Binding> {
    team_meeting(
        Meeting {
            kind: ScenarioKind::ReviewMeeting,
            limit: Some(MAX_MEETING_TICKETS),
            wanted: |t| {
                t.kind != TicketKind::Epic
                    && matches!(t.status, TicketStatus::InReview | TicketStatus::Done)
            },
            sprint: current,
        },
        graph,
        cursors,
    )
}

fn bind_incident(graph: &CompanyGraph, cursors: &mut Cursors) -> Option<Binding> {
    let tickets = &graph.work.tickets;
    cursors.rotate(ScenarioKind::IncidentEmail, tickets.len(), |i| {
        let bug = &tickets[i];
        if bug.kind != TicketKind::Bug {
            return None;
        }
        let assignee = bug.assignee.as_ref()?;
        let manager = graph.org.manager_of(assignee)?;
        let mut people = vec![assignee.clone()];
        if manager.id != *assignee {
            people.push(manager.id.clone());
        }
        Some(Binding {
            tickets: vec![bug.id.clone()],
            people,
            team: Some(bug.team_id.clone()),
            ..Binding::default()
        })
    })
}

fn bind_review_email(graph: &CompanyGraph, cursors: &mut Cursors) -> Option<Binding> {
    let tickets = &graph.work.tickets;
    cursors.rotate(ScenarioKind::ReviewEmail, tickets.len(), |i| {
        let ticket = &tickets[i];
        if ticket.status != TicketStatus::InReview {
            return None;
        }
        let assignee = ticket.assignee.as_ref()?;
        let reviewer = pick_reviewer(graph, &ticket.team_id, assignee)?;
        Some(Binding {
            tickets: vec![ticket.id.clone()],
            people: vec![assignee.clone(), reviewer],
            team: Some(ticket.team_id.clone()),
            ..Binding::default()
        })
    })
}

/// Most senior other member of the team; earlier members win ties.
fn pick_reviewer(graph: &CompanyGraph, team_id: &str, author: &str) -> Option<PersonId> {
    let mut best: Option<(u8, &str)> = None;
    for person in graph.org.members_of(team_id) {
        if person.id == author {
            continue;
        }
        let rank = person.role.seniority();
        if best.map_or(true, |(r, _)| rank > r) {
            best = Some((rank, person.id.as_str()));
        }
    }
    best.map(|(_, id)| id.to_string())
}

fn bind_release(graph: &CompanyGraph, cursors: &mut Cursors) -> Option<Binding> {
    let versions = &graph.work.fix_versions;
    cursors.rotate(ScenarioKind::ReleaseEmail, versions.len(), |i| {
        let version = &versions[i];
        let shipped: Vec<&Ticket> = graph
            .work
            .tickets
            .iter()
            .filter(|t| {
                t.fix_version.as_deref() == Some(version.id.as_str())
                    && t.kind != TicketKind::Subtask
            })
            .take(MAX_RELEASE_TICKETS)
            .collect();
        if shipped.is_empty() {
            return None;
        }

        let mut people: Vec<PersonId> = Vec::new();
        let mut push = |id: &PersonId| {
            if !people.contains(id) {
                people.push(id.clone());
            }
        };
        for ticket in &shipped {
            if let Some(team) = graph.team(&ticket.team_id) {
                push(&team.manager);
            }
        }
        for ticket in &shipped {
            if let Some(assignee) = &ticket.assignee {
                push(assignee);
            }
        }

        Some(Binding {
            tickets: shipped.iter().map(|t| t.id.clone()).collect(),
            people,
            team: None,
            fix_version: Some(version.id.clone()),
            sprint: None,
            moves: Vec::new(),
        })
    })
}
