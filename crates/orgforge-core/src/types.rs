use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::status::{StatusChange, TicketStatus};

/// Person ID format: `EMP-<n>`
pub type PersonId = String;

/// Team ID format: `TEAM-<n>`
pub type TeamId = String;

/// Ticket ID format: `<PROJECTKEY>-<n>`
pub type TicketId = String;

/// Fix-version ID format: `VER-<n>`
pub type FixVersionId = String;

/// Scenario event ID format: `EVT-<n>`
pub type EventId = String;

/// Sprint ID format: `SPR-<n>`
pub type SprintId = String;

// ── Organization ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    #[serde(rename = "engineer")]
    Engineer,
    #[serde(rename = "senior_engineer")]
    SeniorEngineer,
    #[serde(rename = "tech_lead")]
    TechLead,
    #[serde(rename = "manager")]
    Manager,
    #[serde(rename = "designer")]
    Designer,
    #[serde(rename = "qa")]
    Qa,
    #[serde(rename = "pm", alias = "product_manager")]
    Pm,
    #[serde(rename = "devops", alias = "dev_ops")]
    DevOps,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Engineer,
        Role::SeniorEngineer,
        Role::TechLead,
        Role::Manager,
        Role::Designer,
        Role::Qa,
        Role::Pm,
        Role::DevOps,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Role::Engineer => "Engineer",
            Role::SeniorEngineer => "Senior Engineer",
            Role::TechLead => "Tech Lead",
            Role::Manager => "Engineering Manager",
            Role::Designer => "Designer",
            Role::Qa => "QA Engineer",
            Role::Pm => "Product Manager",
            Role::DevOps => "DevOps Engineer",
        }
    }

    /// Rank used when picking a team's manager. Lower wins.
    pub fn leadership_rank(self) -> Option<u8> {
        match self {
            Role::Manager => Some(0),
            Role::TechLead => Some(1),
            _ => None,
        }
    }

    /// Rank used when picking a reviewer. Higher wins.
    pub fn seniority(self) -> u8 {
        match self {
            Role::TechLead => 3,
            Role::SeniorEngineer => 2,
            Role::Engineer | Role::DevOps => 1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub team_id: TeamId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// Ordered; the first leadership role (or first member) is the manager.
    pub members: Vec<PersonId>,
    pub manager: PersonId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TeamId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub company_name: String,
    pub email_domain: String,
    pub people: Vec<Person>,
    pub teams: Vec<Team>,
}

impl Organization {
    pub fn person(&self, id: &str) -> Option<&Person> {
        self.people.iter().find(|p| p.id == id)
    }

    pub fn person_by_name(&self, name: &str) -> Option<&Person> {
        self.people.iter().find(|p| p.name == name)
    }

    pub fn person_by_email(&self, email: &str) -> Option<&Person> {
        self.people
            .iter()
            .find(|p| p.email.eq_ignore_ascii_case(email))
    }

    pub fn team(&self, id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    pub fn team_of(&self, person_id: &str) -> Option<&Team> {
        let person = self.person(person_id)?;
        self.team(&person.team_id)
    }

    /// Manager of the team the person currently belongs to.
    pub fn manager_of(&self, person_id: &str) -> Option<&Person> {
        let team = self.team_of(person_id)?;
        self.person(&team.manager)
    }

    pub fn members_of(&self, team_id: &str) -> Vec<&Person> {
        match self.team(team_id) {
            Some(team) => team
                .members
                .iter()
                .filter_map(|id| self.person(id))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Pick the manager of an ordered member list: first Manager, then first
/// TechLead, otherwise the first member.
pub fn elect_manager<'a>(members: impl IntoIterator<Item = &'a Person>) -> Option<PersonId> {
    let mut first = None;
    let mut best: Option<(u8, &Person)> = None;
    for person in members {
        first.get_or_insert(person);
        if let Some(rank) = person.role.leadership_rank() {
            if best.map_or(true, |(r, _)| rank < r) {
                best = Some((rank, person));
            }
        }
    }
    best.map(|(_, p)| p).or(first).map(|p| p.id.clone())
}

// ── Tickets ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixVersion {
    pub id: FixVersionId,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub target_date: OffsetDateTime,
    pub released: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TicketKind {
    Epic,
    Story,
    Task,
    Subtask,
    Bug,
}

impl TicketKind {
    /// Containment hierarchy: Epic⊃{Story,Bug}, Story⊃{Task,Subtask}, Task⊃{Subtask}.
    pub fn can_contain(self, child: TicketKind) -> bool {
        matches!(
            (self, child),
            (TicketKind::Epic, TicketKind::Story)
                | (TicketKind::Epic, TicketKind::Bug)
                | (TicketKind::Story, TicketKind::Task)
                | (TicketKind::Story, TicketKind::Subtask)
                | (TicketKind::Task, TicketKind::Subtask)
        )
    }

    pub fn is_top_level(self) -> bool {
        self == TicketKind::Epic
    }

    /// Whether tickets of this kind carry story points.
    pub fn is_estimated(self) -> bool {
        matches!(
            self,
            TicketKind::Story | TicketKind::Task | TicketKind::Subtask
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Highest,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Lowest,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    Frontend,
    Backend,
    Database,
    Infrastructure,
    Security,
    Testing,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::Frontend,
        Component::Backend,
        Component::Database,
        Component::Infrastructure,
        Component::Security,
        Component::Testing,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Component::Frontend => "Frontend",
            Component::Backend => "Backend",
            Component::Database => "Database",
            Component::Infrastructure => "Infrastructure",
            Component::Security => "Security",
            Component::Testing => "Testing",
        }
    }
}

/// Fibonacci story point scale.
pub const STORY_POINTS: [u8; 7] = [1, 2, 3, 5, 8, 13, 21];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: TicketId,
    pub kind: TicketKind,
    pub title: String,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<PersonId>,
    pub team_id: TeamId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TicketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_version: Option<FixVersionId>,
    /// Every non-epic ticket is scheduled into one sprint of its team.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint: Option<SprintId>,
    pub priority: Priority,
    pub component: Component,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<TicketId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<TicketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<String>,
}

/// The work-tracking half of the company graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TicketGraph {
    pub project_key: String,
    pub fix_versions: Vec<FixVersion>,
    /// Per team in start order; at most one sprint per team is active.
    #[serde(default)]
    pub sprints: Vec<Sprint>,
    /// Creation order; parents always precede their children.
    pub tickets: Vec<Ticket>,
    pub history: Vec<StatusChange>,
}

// ── Sprints ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SprintStatus {
    Planned,
    Active,
    Completed,
}

impl SprintStatus {
    pub fn label(self) -> &'static str {
        match self {
            SprintStatus::Planned => "Planned",
            SprintStatus::Active => "Active",
            SprintStatus::Completed => "Completed",
        }
    }
}

/// A fixed-length iteration of one team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sprint {
    pub id: SprintId,
    pub name: String,
    pub team_id: TeamId,
    pub goal: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub status: SprintStatus,
    pub tickets: Vec<TicketId>,
    /// Story points of every ticket in the sprint.
    pub committed_points: u32,
    /// Story points of the sprint's tickets that reached Done or Closed.
    pub completed_points: u32,
}

impl Sprint {
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start_date <= at && at < self.end_date
    }

    /// Completed points per sprint day, once the sprint is over.
    pub fn velocity(&self) -> Option<f64> {
        let days = (self.end_date - self.start_date).whole_days();
        (self.status == SprintStatus::Completed && days > 0)
            .then(|| f64::from(self.completed_points) / days as f64)
    }
}

// ── Scenarios ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScenarioKind {
    #[serde(alias = "standup_meeting", alias = "standup")]
    StandupMeeting,
    #[serde(alias = "planning_meeting", alias = "planning")]
    PlanningMeeting,
    #[serde(alias = "retro_meeting", alias = "retro")]
    RetroMeeting,
    #[serde(alias = "review_meeting", alias = "sprint_review")]
    ReviewMeeting,
    #[serde(alias = "incident_email", alias = "incident")]
    IncidentEmail,
    #[serde(alias = "review_email", alias = "code_review")]
    ReviewEmail,
    #[serde(alias = "release_email", alias = "release")]
    ReleaseEmail,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 7] = [
        ScenarioKind::StandupMeeting,
        ScenarioKind::PlanningMeeting,
        ScenarioKind::RetroMeeting,
        ScenarioKind::ReviewMeeting,
        ScenarioKind::IncidentEmail,
        ScenarioKind::ReviewEmail,
        ScenarioKind::ReleaseEmail,
    ];

    pub fn is_email(self) -> bool {
        matches!(
            self,
            ScenarioKind::IncidentEmail | ScenarioKind::ReviewEmail | ScenarioKind::ReleaseEmail
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::StandupMeeting => "StandupMeeting",
            ScenarioKind::PlanningMeeting => "PlanningMeeting",
            ScenarioKind::RetroMeeting => "RetroMeeting",
            ScenarioKind::ReviewMeeting => "ReviewMeeting",
            ScenarioKind::IncidentEmail => "IncidentEmail",
            ScenarioKind::ReviewEmail => "ReviewEmail",
            ScenarioKind::ReleaseEmail => "ReleaseEmail",
        }
    }

    /// Human title for the meeting or thread type.
    pub fn title(self) -> &'static str {
        match self {
            ScenarioKind::StandupMeeting => "Daily Standup",
            ScenarioKind::PlanningMeeting => "Sprint Planning",
            ScenarioKind::RetroMeeting => "Sprint Retrospective",
            ScenarioKind::ReviewMeeting => "Sprint Review",
            ScenarioKind::IncidentEmail => "Incident Report",
            ScenarioKind::ReviewEmail => "Code Review",
            ScenarioKind::ReleaseEmail => "Release Announcement",
        }
    }
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A planned unit of narrative content bound to specific graph entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioEvent {
    pub id: EventId,
    pub kind: ScenarioKind,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub tickets: Vec<TicketId>,
    pub people: Vec<PersonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_version: Option<FixVersionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint: Option<SprintId>,
    /// Status of each bound ticket at planning time, after this event's own changes.
    #[serde(default)]
    pub bound_status: BTreeMap<TicketId, TicketStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_changes: Vec<StatusChange>,
}

impl ScenarioEvent {
    pub fn binds_ticket(&self, id: &str) -> bool {
        self.tickets.iter().any(|t| t == id)
    }

    pub fn binds_person(&self, id: &str) -> bool {
        self.people.iter().any(|p| p == id)
    }
}

// ── Artifacts ──

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailMessage {
    /// Display name of the sender.
    pub sender: String,
    pub recipients: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailThread {
    pub subject: String,
    pub messages: Vec<EmailMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Utterance {
    pub speaker: String,
    /// Seconds since the meeting started.
    pub offset_sec: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub turns: Vec<Utterance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactBody {
    EmailThread(EmailThread),
    Transcript(Transcript),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub event_id: EventId,
    pub attempts: u32,
    pub body: ArtifactBody,
}

impl Artifact {
    /// Every free-text fragment in the artifact, in reading order.
    pub fn text_fragments(&self) -> Vec<&str> {
        match &self.body {
            ArtifactBody::EmailThread(thread) => std::iter::once(thread.subject.as_str())
                .chain(thread.messages.iter().map(|m| m.body.as_str()))
                .collect(),
            ArtifactBody::Transcript(t) => std::iter::once(t.title.as_str())
                .chain(t.turns.iter().map(|u| u.text.as_str()))
                .collect(),
        }
    }

    /// Names that appear in structured speaker / sender / recipient slots.
    pub fn participant_names(&self) -> Vec<&str> {
        match &self.body {
            ArtifactBody::EmailThread(thread) => thread
                .messages
                .iter()
                .flat_map(|m| {
                    std::iter::once(m.sender.as_str()).chain(m.recipients.iter().map(String::as_str))
                })
                .collect(),
            ArtifactBody::Transcript(t) => t.turns.iter().map(|u| u.speaker.as_str()).collect(),
        }
    }
}
