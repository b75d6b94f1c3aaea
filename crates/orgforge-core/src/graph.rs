use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::errors::GraphError;
use crate::status::{is_valid_transition, validate_history, StatusChange, TicketStatus};
use crate::types::{
    elect_manager, FixVersion, Organization, Person, Sprint, SprintStatus, Team, Ticket,
    TicketGraph, TicketKind,
};

impl TicketGraph {
    pub fn ticket(&self, id: &str) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    pub fn fix_version(&self, id: &str) -> Option<&FixVersion> {
        self.fix_versions.iter().find(|v| v.id == id)
    }

    pub fn sprint(&self, id: &str) -> Option<&Sprint> {
        self.sprints.iter().find(|s| s.id == id)
    }

    /// The team's running sprint, if any.
    pub fn current_sprint(&self, team_id: &str) -> Option<&Sprint> {
        self.sprints
            .iter()
            .find(|s| s.team_id == team_id && s.status == SprintStatus::Active)
    }

    /// The team's most recently finished sprint.
    pub fn previous_sprint(&self, team_id: &str) -> Option<&Sprint> {
        self.sprints
            .iter()
            .filter(|s| s.team_id == team_id && s.status == SprintStatus::Completed)
            .max_by_key(|s| s.end_date)
    }

    pub fn children_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Ticket> + 'a {
        self.tickets
            .iter()
            .filter(move |t| t.parent.as_deref() == Some(id))
    }

    /// All transitive descendants of a ticket, in creation order.
    pub fn descendants_of(&self, id: &str) -> Vec<&Ticket> {
        let mut wanted: HashSet<&str> = HashSet::from([id]);
        let mut out = Vec::new();
        // Parents precede children, so one forward pass is enough.
        for ticket in &self.tickets {
            if let Some(parent) = ticket.parent.as_deref() {
                if wanted.contains(parent) {
                    wanted.insert(ticket.id.as_str());
                    out.push(ticket);
                }
            }
        }
        out
    }

    /// Move a ticket to `to`, recording the change in the history.
    pub fn transition(
        &mut self,
        id: &str,
        to: TicketStatus,
        at: OffsetDateTime,
        cause: &str,
    ) -> Result<StatusChange, GraphError> {
        let ticket = self
            .tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| GraphError::UnknownTicket(id.to_string()))?;
        if !is_valid_transition(ticket.status, to) {
            return Err(GraphError::InvalidTransition {
                ticket_id: id.to_string(),
                from: ticket.status,
                to,
            });
        }
        let change = StatusChange {
            ticket_id: id.to_string(),
            from: ticket.status,
            to,
            at,
            cause: cause.to_string(),
        };
        ticket.status = to;
        if to != TicketStatus::Blocked {
            ticket.blocking_reason = None;
        }
        self.history.push(change.clone());
        Ok(change)
    }
}

/// The full company graph: organization plus work tracking.
///
/// Built mutably by the builders and the scenario planner, then frozen
/// behind an `Arc` for generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyGraph {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub org: Organization,
    pub work: TicketGraph,
}

impl CompanyGraph {
    pub fn new(start: OffsetDateTime, org: Organization, work: TicketGraph) -> Self {
        Self { start, org, work }
    }

    pub fn person(&self, id: &str) -> Option<&Person> {
        self.org.person(id)
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        self.org.team(id)
    }

    pub fn ticket(&self, id: &str) -> Option<&Ticket> {
        self.work.ticket(id)
    }

    pub fn transition_ticket(
        &mut self,
        id: &str,
        to: TicketStatus,
        at: OffsetDateTime,
        cause: &str,
    ) -> Result<StatusChange, GraphError> {
        self.work.transition(id, to, at, cause)
    }

    /// Move a person to another team. The old team must keep at least one member.
    pub fn reassign_person(&mut self, person_id: &str, new_team: &str) -> Result<(), GraphError> {
        let old_team = self
            .org
            .person(person_id)
            .map(|p| p.team_id.clone())
            .ok_or_else(|| GraphError::UnknownPerson(person_id.to_string()))?;
        if self.org.team(new_team).is_none() {
            return Err(GraphError::UnknownTeam(new_team.to_string()));
        }
        if old_team == new_team {
            return Ok(());
        }
        let old_len = self.org.team(&old_team).map_or(0, |t| t.members.len());
        if old_len <= 1 {
            return Err(GraphError::EmptyTeam(old_team));
        }

        for team in self.org.teams.iter_mut() {
            if team.id == old_team {
                team.members.retain(|m| m != person_id);
            } else if team.id == new_team {
                team.members.push(person_id.to_string());
            }
        }
        if let Some(person) = self.org.people.iter_mut().find(|p| p.id == person_id) {
            person.team_id = new_team.to_string();
        }
        self.refresh_manager(&old_team);
        self.refresh_manager(new_team);
        Ok(())
    }

    fn refresh_manager(&mut self, team_id: &str) {
        let manager = self
            .org
            .team(team_id)
            .and_then(|t| elect_manager(t.members.iter().filter_map(|id| self.org.person(id))));
        if let (Some(manager), Some(team)) = (
            manager,
            self.org.teams.iter_mut().find(|t| t.id == team_id),
        ) {
            team.manager = manager;
        }
    }

    /// Check every structural invariant of the graph.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        self.check_membership()?;
        self.check_hierarchy()?;
        self.check_history()?;
        self.check_sprints()?;
        Ok(())
    }

    fn check_membership(&self) -> Result<(), GraphError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for team in &self.org.teams {
            if team.members.is_empty() {
                return Err(GraphError::EmptyTeam(team.id.clone()));
            }
            if !team.members.contains(&team.manager) {
                return Err(GraphError::Invariant(format!(
                    "manager {} of {} is not a member",
                    team.manager, team.id
                )));
            }
            if let Some(parent) = &team.parent {
                if self.org.team(parent).is_none() {
                    return Err(GraphError::UnknownTeam(parent.clone()));
                }
            }
            for member in &team.members {
                if let Some(other) = seen.insert(member.as_str(), team.id.as_str()) {
                    return Err(GraphError::Invariant(format!(
                        "{member} is in both {other} and {}",
                        team.id
                    )));
                }
                let person = self
                    .org
                    .person(member)
                    .ok_or_else(|| GraphError::UnknownPerson(member.clone()))?;
                if person.team_id != team.id {
                    return Err(GraphError::Invariant(format!(
                        "{member} lists team {} but is a member of {}",
                        person.team_id, team.id
                    )));
                }
            }
        }
        for person in &self.org.people {
            if !seen.contains_key(person.id.as_str()) {
                return Err(GraphError::Invariant(format!(
                    "{} belongs to no team",
                    person.id
                )));
            }
        }
        let mut names = HashSet::new();
        for person in &self.org.people {
            if !names.insert(person.name.as_str()) {
                return Err(GraphError::Invariant(format!(
                    "duplicate name {}",
                    person.name
                )));
            }
        }
        Ok(())
    }

    fn check_hierarchy(&self) -> Result<(), GraphError> {
        let mut earlier: HashMap<&str, TicketKind> = HashMap::new();
        for ticket in &self.work.tickets {
            if let Some(parent) = &ticket.parent {
                // A parent defined later (or never) would allow a cycle.
                let parent_kind = earlier.get(parent.as_str()).ok_or_else(|| {
                    GraphError::Invariant(format!(
                        "{} has parent {parent} that does not precede it",
                        ticket.id
                    ))
                })?;
                if !parent_kind.can_contain(ticket.kind) {
                    return Err(GraphError::Invariant(format!(
                        "{:?} {parent} cannot contain {:?} {}",
                        parent_kind, ticket.kind, ticket.id
                    )));
                }
            } else if !ticket.kind.is_top_level() {
                return Err(GraphError::Invariant(format!(
                    "{:?} {} has no parent",
                    ticket.kind, ticket.id
                )));
            }
            for dep in ticket.depends_on.iter().chain(ticket.related.iter()) {
                if !earlier.contains_key(dep.as_str()) {
                    return Err(GraphError::Invariant(format!(
                        "{} references {dep} which does not precede it",
                        ticket.id
                    )));
                }
            }
            if self.org.team(&ticket.team_id).is_none() {
                return Err(GraphError::UnknownTeam(ticket.team_id.clone()));
            }
            if let Some(v) = &ticket.fix_version {
                if self.work.fix_version(v).is_none() {
                    return Err(GraphError::Invariant(format!(
                        "{} targets unknown fix version {v}",
                        ticket.id
                    )));
                }
            }
            if earlier.insert(ticket.id.as_str(), ticket.kind).is_some() {
                return Err(GraphError::Invariant(format!(
                    "duplicate ticket id {}",
                    ticket.id
                )));
            }
        }
        Ok(())
    }

    fn check_sprints(&self) -> Result<(), GraphError> {
        let mut owner: HashMap<&str, &str> = HashMap::new();
        for sprint in &self.work.sprints {
            if self.org.team(&sprint.team_id).is_none() {
                return Err(GraphError::UnknownTeam(sprint.team_id.clone()));
            }
            if sprint.end_date <= sprint.start_date {
                return Err(GraphError::Invariant(format!(
                    "{} ends before it starts",
                    sprint.id
                )));
            }
            let mut committed: u32 = 0;
            for id in &sprint.tickets {
                let ticket = self
                    .work
                    .ticket(id)
                    .ok_or_else(|| GraphError::UnknownTicket(id.clone()))?;
                if ticket.kind == TicketKind::Epic || ticket.team_id != sprint.team_id {
                    return Err(GraphError::Invariant(format!(
                        "{id} cannot be planned into {}",
                        sprint.id
                    )));
                }
                if ticket.sprint.as_deref() != Some(sprint.id.as_str()) {
                    return Err(GraphError::Invariant(format!(
                        "{} lists {id} but the ticket does not point back",
                        sprint.id
                    )));
                }
                if let Some(other) = owner.insert(id.as_str(), sprint.id.as_str()) {
                    return Err(GraphError::Invariant(format!(
                        "{id} is in both {other} and {}",
                        sprint.id
                    )));
                }
                committed += u32::from(ticket.story_points.unwrap_or(0));
            }
            if committed != sprint.committed_points {
                return Err(GraphError::Invariant(format!(
                    "{} commits {} points but its tickets carry {committed}",
                    sprint.id, sprint.committed_points
                )));
            }
        }
        for (i, a) in self.work.sprints.iter().enumerate() {
            for b in &self.work.sprints[i + 1..] {
                if a.team_id == b.team_id && a.start_date < b.end_date && b.start_date < a.end_date
                {
                    return Err(GraphError::Invariant(format!(
                        "{} overlaps {}",
                        a.id, b.id
                    )));
                }
            }
        }
        for ticket in &self.work.tickets {
            if let Some(sprint) = &ticket.sprint {
                if !owner.contains_key(ticket.id.as_str()) {
                    return Err(GraphError::Invariant(format!(
                        "{} points at {sprint} which does not list it",
                        ticket.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_history(&self) -> Result<(), GraphError> {
        validate_history(&self.work.history)?;
        let mut last: HashMap<&str, TicketStatus> = HashMap::new();
        for change in &self.work.history {
            last.insert(change.ticket_id.as_str(), change.to);
        }
        for ticket in &self.work.tickets {
            let replayed = last
                .get(ticket.id.as_str())
                .copied()
                .unwrap_or(TicketStatus::INITIAL);
            if replayed != ticket.status {
                return Err(GraphError::Invariant(format!(
                    "{} is {} but its history ends at {}",
                    ticket.id, ticket.status, replayed
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Component, Priority, Role};
    use time::macros::datetime;

    fn person(id: &str, name: &str, role: Role, team: &str) -> Person {
        Person {
            id: id.into(),
            name: name.into(),
            email: format!("{}@acme.test", name.to_lowercase().replace(' ', ".")),
            role,
            team_id: team.into(),
        }
    }

    fn ticket(id: &str, kind: TicketKind, parent: Option<&str>) -> Ticket {
        Ticket {
            id: id.into(),
            kind,
            title: format!("{kind:?} {id}"),
            status: TicketStatus::Open,
            assignee: Some("EMP-1".into()),
            team_id: "TEAM-1".into(),
            parent: parent.map(Into::into),
            fix_version: None,
            sprint: None,
            priority: Priority::Medium,
            component: Component::Backend,
            story_points: None,
            related: vec![],
            depends_on: vec![],
            blocking_reason: None,
        }
    }

    pub(crate) fn sample_graph() -> CompanyGraph {
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
        let work = TicketGraph {
            project_key: "PROJ".into(),
            fix_versions: vec![],
            sprints: vec![],
            tickets: vec![
                ticket("PROJ-1", TicketKind::Epic, None),
                ticket("PROJ-2", TicketKind::Story, Some("PROJ-1")),
                ticket("PROJ-3", TicketKind::Task, Some("PROJ-2")),
                ticket("PROJ-4", TicketKind::Bug, Some("PROJ-1")),
            ],
            history: vec![],
        };
        CompanyGraph::new(datetime!(2024-01-08 09:00 UTC), org, work)
    }

    #[test]
    fn sample_graph_is_valid() {
        sample_graph().check_invariants().unwrap();
    }

    #[test]
    fn transition_records_history() {
        let mut g = sample_graph();
        let at = g.start;
        g.transition_ticket("PROJ-3", TicketStatus::InProgress, at, "build")
            .unwrap();
        g.transition_ticket("PROJ-3", TicketStatus::Done, at, "build")
            .unwrap();
        assert_eq!(g.ticket("PROJ-3").unwrap().status, TicketStatus::Done);
        assert_eq!(g.work.history.len(), 2);
        g.check_invariants().unwrap();
    }

    #[test]
    fn transition_rejects_invalid_move() {
        let mut g = sample_graph();
        let at = g.start;
        let err = g
            .transition_ticket("PROJ-3", TicketStatus::Done, at, "build")
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidTransition { .. }));
        assert!(g.work.history.is_empty());
        assert!(matches!(
            g.transition_ticket("PROJ-99", TicketStatus::InProgress, at, "x"),
            Err(GraphError::UnknownTicket(_))
        ));
    }

    #[test]
    fn leaving_blocked_clears_reason() {
        let mut g = sample_graph();
        let at = g.start;
        g.transition_ticket("PROJ-3", TicketStatus::InProgress, at, "b")
            .unwrap();
        g.transition_ticket("PROJ-3", TicketStatus::Blocked, at, "b")
            .unwrap();
        g.work.tickets[2].blocking_reason = Some("waiting on review".into());
        g.transition_ticket("PROJ-3", TicketStatus::InProgress, at, "b")
            .unwrap();
        assert!(g.ticket("PROJ-3").unwrap().blocking_reason.is_none());
    }

    #[test]
    fn reassign_moves_membership_both_ways() {
        let mut g = sample_graph();
        g.reassign_person("EMP-2", "TEAM-2").unwrap();
        assert_eq!(g.person("EMP-2").unwrap().team_id, "TEAM-2");
        assert_eq!(g.team("TEAM-1").unwrap().members, vec!["EMP-1"]);
        assert_eq!(g.team("TEAM-1").unwrap().manager, "EMP-1");
        // Manager outranks the tech lead.
        assert_eq!(g.team("TEAM-2").unwrap().manager, "EMP-2");
        g.check_invariants().unwrap();
    }

    #[test]
    fn reassign_rejects_emptying_team() {
        let mut g = sample_graph();
        g.reassign_person("EMP-2", "TEAM-2").unwrap();
        assert_eq!(
            g.reassign_person("EMP-1", "TEAM-2"),
            Err(GraphError::EmptyTeam("TEAM-1".into()))
        );
        assert!(matches!(
            g.reassign_person("EMP-1", "TEAM-9"),
            Err(GraphError::UnknownTeam(_))
        ));
    }

    #[test]
    fn invariants_catch_bad_parent_kind() {
        let mut g = sample_graph();
        g.work.tickets[3].parent = Some("PROJ-2".into());
        assert!(g.check_invariants().is_err());
    }

    #[test]
    fn invariants_catch_forward_parent() {
        let mut g = sample_graph();
        g.work.tickets.swap(1, 2);
        assert!(g.check_invariants().is_err());
    }

    #[test]
    fn invariants_catch_status_without_history() {
        let mut g = sample_graph();
        g.work.tickets[2].status = TicketStatus::Done;
        assert!(g.check_invariants().is_err());
    }

    #[test]
    fn invariants_catch_one_sided_membership() {
        let mut g = sample_graph();
        g.org.people[0].team_id = "TEAM-2".into();
        assert!(g.check_invariants().is_err());
    }

    fn sprint(id: &str, team: &str, days: (i64, i64), tickets: &[&str]) -> Sprint {
        let start = datetime!(2024-01-08 09:00 UTC);
        Sprint {
            id: id.into(),
            name: format!("Sprint {id}"),
            team_id: team.into(),
            goal: "Stabilize checkout".into(),
            start_date: start + time::Duration::days(days.0),
            end_date: start + time::Duration::days(days.1),
            status: if days.1 <= 0 {
                SprintStatus::Completed
            } else {
                SprintStatus::Active
            },
            tickets: tickets.iter().map(|t| t.to_string()).collect(),
            committed_points: 0,
            completed_points: 0,
        }
    }

    fn with_sprints(g: &mut CompanyGraph, sprints: Vec<Sprint>) {
        for s in &sprints {
            for id in &s.tickets {
                if let Some(t) = g.work.tickets.iter_mut().find(|t| &t.id == id) {
                    t.sprint = Some(s.id.clone());
                }
            }
        }
        g.work.sprints = sprints;
    }

    #[test]
    fn sprint_lookups_pick_current_and_previous() {
        let mut g = sample_graph();
        with_sprints(
            &mut g,
            vec![
                sprint("SPR-1", "TEAM-1", (-28, -14), &[]),
                sprint("SPR-2", "TEAM-1", (-14, 0), &["PROJ-3"]),
                sprint("SPR-3", "TEAM-1", (0, 14), &["PROJ-2", "PROJ-4"]),
            ],
        );
        g.check_invariants().unwrap();
        assert_eq!(g.work.current_sprint("TEAM-1").unwrap().id, "SPR-3");
        assert_eq!(g.work.previous_sprint("TEAM-1").unwrap().id, "SPR-2");
        assert!(g.work.current_sprint("TEAM-2").is_none());
        assert!(g.work.sprint("SPR-1").unwrap().contains(g.start - time::Duration::days(20)));
    }

    #[test]
    fn invariants_catch_bad_sprints() {
        let mut epic = sample_graph();
        with_sprints(&mut epic, vec![sprint("SPR-1", "TEAM-1", (0, 14), &["PROJ-1"])]);
        assert!(epic.check_invariants().is_err());

        let mut one_sided = sample_graph();
        with_sprints(&mut one_sided, vec![sprint("SPR-1", "TEAM-1", (0, 14), &["PROJ-2"])]);
        one_sided.work.tickets[2].sprint = Some("SPR-1".into());
        assert!(one_sided.check_invariants().is_err());

        let mut overlap = sample_graph();
        with_sprints(
            &mut overlap,
            vec![
                sprint("SPR-1", "TEAM-1", (-10, 4), &[]),
                sprint("SPR-2", "TEAM-1", (0, 14), &[]),
            ],
        );
        assert!(overlap.check_invariants().is_err());

        let mut points = sample_graph();
        points.work.tickets[1].story_points = Some(5);
        with_sprints(&mut points, vec![sprint("SPR-1", "TEAM-1", (0, 14), &["PROJ-2"])]);
        assert!(points.check_invariants().is_err());
        points.work.sprints[0].committed_points = 5;
        points.check_invariants().unwrap();
    }

    #[test]
    fn descendants_cover_whole_subtree() {
        let g = sample_graph();
        let ids: Vec<_> = g
            .work
            .descendants_of("PROJ-1")
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["PROJ-2", "PROJ-3", "PROJ-4"]);
        assert_eq!(g.work.children_of("PROJ-2").count(), 1);
    }
}
