use orgforge_core::config::Range;
use orgforge_core::{
    CompanyGraph, EmailMessage, FixVersion, GenerationError, Person, Role, ScenarioEvent,
    ScenarioKind, Sprint, Team, Ticket, TicketStatus,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const SYSTEM: &str = "You write realistic internal communication for a software company. \
Mention only the people and tickets you are given, keep every ticket status exactly as \
stated, and follow the output format to the letter. Output nothing but the requested text.";

/// Read-only window onto the entities bound to one event.
///
/// Anything not bound to the event is invisible here, so prompts built from a
/// view cannot leak other people or tickets.
#[derive(Clone, Copy)]
pub struct GraphView<'a> {
    graph: &'a CompanyGraph,
    event: &'a ScenarioEvent,
}

/// A bound ticket with the status it has at event time.
#[derive(Debug, Clone, Copy)]
pub struct BoundTicket<'a> {
    pub ticket: &'a Ticket,
    pub status: TicketStatus,
    /// Only set when the assignee is bound too.
    pub assignee: Option<&'a Person>,
}

impl<'a> GraphView<'a> {
    pub fn new(graph: &'a CompanyGraph, event: &'a ScenarioEvent) -> Self {
        Self { graph, event }
    }

    pub fn event(&self) -> &'a ScenarioEvent {
        self.event
    }

    pub fn company_name(&self) -> &'a str {
        &self.graph.org.company_name
    }

    pub fn people(&self) -> Vec<&'a Person> {
        self.event
            .people
            .iter()
            .filter_map(|id| self.graph.person(id))
            .collect()
    }

    pub fn person(&self, id: &str) -> Option<&'a Person> {
        if self.event.binds_person(id) {
            self.graph.person(id)
        } else {
            None
        }
    }

    pub fn tickets(&self) -> Vec<BoundTicket<'a>> {
        self.event
            .tickets
            .iter()
            .filter_map(|id| self.graph.ticket(id))
            .map(|ticket| BoundTicket {
                ticket,
                status: self
                    .event
                    .bound_status
                    .get(&ticket.id)
                    .copied()
                    .unwrap_or(ticket.status),
                assignee: ticket.assignee.as_deref().and_then(|a| self.person(a)),
            })
            .collect()
    }

    pub fn team(&self) -> Option<&'a Team> {
        self.event.team.as_deref().and_then(|id| self.graph.team(id))
    }

    pub fn fix_version(&self) -> Option<&'a FixVersion> {
        self.event
            .fix_version
            .as_deref()
            .and_then(|id| self.graph.work.fix_version(id))
    }

    pub fn sprint(&self) -> Option<&'a Sprint> {
        self.event
            .sprint
            .as_deref()
            .and_then(|id| self.graph.work.sprint(id))
    }
}

/// Meeting agenda for each meeting kind. Emails have none.
pub fn meeting_phases(kind: ScenarioKind) -> &'static [&'static str] {
    match kind {
        ScenarioKind::StandupMeeting => &[
            "Updates from each team member",
            "Blockers discussion",
            "Quick follow-ups",
        ],
        ScenarioKind::PlanningMeeting => &[
            "Sprint Goal Discussion",
            "Capacity Planning",
            "Backlog Review",
            "Story Point Estimation",
            "Sprint Commitment",
        ],
        ScenarioKind::ReviewMeeting => &[
            "Sprint Goal Recap",
            "Demo Preparations",
            "Feature Demonstrations",
            "Feedback Collection",
            "Next Sprint Preview",
        ],
        ScenarioKind::RetroMeeting => &[
            "Previous Action Items Review",
            "What Went Well",
            "What Needs Improvement",
            "Action Items Creation",
        ],
        ScenarioKind::IncidentEmail | ScenarioKind::ReviewEmail | ScenarioKind::ReleaseEmail => {
            &[]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketLine {
    pub id: String,
    pub title: String,
    pub status: TicketStatus,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SprintLine {
    pub name: String,
    pub goal: String,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub committed_points: u32,
    pub completed_points: u32,
}

/// What the generator is asked to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Transcript {
        turns: Range,
        phases: &'static [&'static str],
    },
    Email {
        /// Zero-based position in the thread.
        index: usize,
        length: usize,
        sender: String,
        recipients: Vec<String>,
        subject: String,
    },
}

/// Structured copy of everything the prompt text states.
///
/// Remote providers only see the rendered text; offline generators work
/// from the frame directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event_id: String,
    pub kind: ScenarioKind,
    pub company: String,
    pub team: Option<String>,
    pub timestamp: OffsetDateTime,
    pub participants: Vec<Participant>,
    pub tickets: Vec<TicketLine>,
    pub fix_version: Option<String>,
    pub sprint: Option<SprintLine>,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub text: String,
    pub frame: Frame,
}

impl Prompt {
    /// Same prompt with a note about why the last output could not be parsed.
    pub fn with_parse_error(&self, err: &GenerationError) -> Prompt {
        let mut next = self.clone();
        next.text.push_str(&format!(
            "\n\nYour previous output could not be parsed ({err}). \
             Follow the output format exactly.\n"
        ));
        next
    }
}

/// One generation call for an event.
#[derive(Debug, Clone, Copy)]
pub enum Request<'p> {
    Transcript {
        turns: Range,
    },
    Email {
        index: usize,
        length: usize,
        /// Messages already accepted for this thread, oldest first.
        prior: &'p [EmailMessage],
        /// Thread subject once the first message exists.
        subject: Option<&'p str>,
        at: OffsetDateTime,
    },
}

pub(crate) fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

/// Render the prompt for one call, embedding only the view's bound entities.
///
/// `feedback` holds validator violations from the previous attempt; prior
/// thread messages are cut from the oldest (never the first) until they fit
/// in `char_budget`.
pub fn build_prompt(
    view: &GraphView<'_>,
    request: Request<'_>,
    feedback: &[String],
    char_budget: usize,
) -> Prompt {
    let event = view.event();
    let frame = frame_for(view, request);
    let mut out: Vec<String> = Vec::new();

    let heading = match &frame.shape {
        Shape::Transcript { .. } => format!(
            "Write the transcript of a {} meeting at {}.",
            event.kind.title(),
            frame.company
        ),
        Shape::Email { index, length, .. } => format!(
            "Write message {} of {} in a {} email thread at {}.",
            index + 1,
            length,
            event.kind.title(),
            frame.company
        ),
    };
    out.push(heading);
    out.push(format!("Date: {}", rfc3339(frame.timestamp)));
    if let Some(team) = &frame.team {
        out.push(format!("Team: {team}"));
    }
    if let Some(version) = view.fix_version() {
        out.push(format!(
            "Fix version: {} (target {})",
            version.name,
            version.target_date.date()
        ));
    }
    if let Some(sprint) = &frame.sprint {
        out.push(format!(
            "Sprint: {} ({} to {}), goal: {}",
            sprint.name,
            sprint.start.date(),
            sprint.end.date(),
            sprint.goal
        ));
        out.push(format!(
            "Sprint points: {} committed, {} completed",
            sprint.committed_points, sprint.completed_points
        ));
    }

    out.push(String::new());
    out.push("Participants (nobody else may speak, write, or be named):".into());
    for p in &frame.participants {
        out.push(format!("- {} <{}>, {}", p.name, p.email, p.role.label()));
    }

    if !frame.tickets.is_empty() {
        out.push(String::new());
        out.push("Tickets (mention no other ticket ids; statuses are current):".into());
        for t in &frame.tickets {
            let mut line = format!("- {} \"{}\" status: {}", t.id, t.title, t.status.label());
            if let Some(who) = &t.assignee {
                line.push_str(&format!(", assignee: {who}"));
            }
            out.push(line);
        }
    }

    match (&frame.shape, request) {
        (Shape::Transcript { turns, phases }, _) => {
            if !phases.is_empty() {
                out.push(String::new());
                out.push("Meeting structure:".into());
                for (i, phase) in phases.iter().enumerate() {
                    out.push(format!("{}. {phase}", i + 1));
                }
            }
            out.push(String::new());
            out.push("Output format, one turn per line:".into());
            out.push("[MM:SS] Speaker Name: utterance".into());
            out.push(format!(
                "Write between {} and {} turns. Timestamps start at [00:00] and increase. \
                 Speakers are participants, by full name.",
                turns.min, turns.max
            ));
        }
        (
            Shape::Email {
                sender,
                recipients,
                subject,
                ..
            },
            Request::Email { prior, .. },
        ) => {
            if !prior.is_empty() {
                out.push(String::new());
                out.push("Thread so far:".into());
                out.push(render_prior(prior, char_budget));
            }
            out.push(String::new());
            out.push("Output format:".into());
            out.push(format!("From: {sender}"));
            out.push(format!("To: {}", recipients.join(", ")));
            out.push(format!("Date: {}", rfc3339(frame.timestamp)));
            out.push(format!("Subject: {subject}"));
            out.push(String::new());
            out.push("<message body>".into());
            out.push(
                "The Date header is optional; if present it must be later than every earlier \
                 message."
                    .into(),
            );
        }
        (Shape::Email { .. }, Request::Transcript { .. }) => {}
    }

    if !feedback.is_empty() {
        out.push(String::new());
        out.push("Previous attempt rejected:".into());
        for v in feedback {
            out.push(format!("- {v}"));
        }
        out.push("Fix every problem above in the new version.".into());
    }

    Prompt {
        system: SYSTEM.to_string(),
        text: out.join("\n"),
        frame,
    }
}

fn frame_for(view: &GraphView<'_>, request: Request<'_>) -> Frame {
    let event = view.event();
    let people = view.people();
    let participants: Vec<Participant> = people
        .iter()
        .map(|p| Participant {
            name: p.name.clone(),
            email: p.email.clone(),
            role: p.role,
        })
        .collect();
    let tickets: Vec<TicketLine> = view
        .tickets()
        .into_iter()
        .map(|b| TicketLine {
            id: b.ticket.id.clone(),
            title: b.ticket.title.clone(),
            status: b.status,
            assignee: b.assignee.map(|p| p.name.clone()),
        })
        .collect();

    let (timestamp, shape) = match request {
        Request::Transcript { turns } => (
            event.timestamp,
            Shape::Transcript {
                turns,
                phases: meeting_phases(event.kind),
            },
        ),
        Request::Email {
            index,
            length,
            subject,
            at,
            ..
        } => {
            let n = participants.len().max(1);
            let sender = participants
                .get(index % n)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            let mut recipients: Vec<String> = participants
                .iter()
                .map(|p| p.name.clone())
                .filter(|name| *name != sender)
                .collect();
            if recipients.is_empty() {
                recipients.push(sender.clone());
            }
            let subject = match subject {
                Some(s) if index > 0 => format!("Re: {}", s.trim_start_matches("Re: ")),
                Some(s) => s.to_string(),
                None => default_subject(view),
            };
            (
                at,
                Shape::Email {
                    index,
                    length,
                    sender,
                    recipients,
                    subject,
                },
            )
        }
    };

    Frame {
        event_id: event.id.clone(),
        kind: event.kind,
        company: view.company_name().to_string(),
        team: view.team().map(|t| t.name.clone()),
        timestamp,
        participants,
        tickets,
        fix_version: view.fix_version().map(|v| v.name.clone()),
        sprint: view.sprint().map(|s| SprintLine {
            name: s.name.clone(),
            goal: s.goal.clone(),
            start: s.start_date,
            end: s.end_date,
            committed_points: s.committed_points,
            completed_points: s.completed_points,
        }),
        shape,
    }
}

fn default_subject(view: &GraphView<'_>) -> String {
    let first = view.tickets().into_iter().next();
    match view.event().kind {
        ScenarioKind::IncidentEmail => match first {
            Some(b) => format!("[Incident] {} {}", b.ticket.id, b.ticket.title),
            None => "[Incident] Production issue".into(),
        },
        ScenarioKind::ReviewEmail => match first {
            Some(b) => format!("Review request: {} {}", b.ticket.id, b.ticket.title),
            None => "Review request".into(),
        },
        ScenarioKind::ReleaseEmail => match view.fix_version() {
            Some(v) => format!("Release {}", v.name),
            None => "Release notes".into(),
        },
        kind => kind.title().to_string(),
    }
}

fn render_message(m: &EmailMessage) -> String {
    format!(
        "From: {}\nTo: {}\nDate: {}\n\n{}",
        m.sender,
        m.recipients.join(", "),
        rfc3339(m.timestamp),
        m.body.trim_end()
    )
}

/// Prior messages, dropping the oldest replies first. The opening message
/// always stays.
fn render_prior(prior: &[EmailMessage], char_budget: usize) -> String {
    let blocks: Vec<String> = prior.iter().map(render_message).collect();
    let mut keep: Vec<usize> = (0..blocks.len()).collect();
    let size = |keep: &[usize]| keep.iter().map(|&i| blocks[i].len() + 5).sum::<usize>();
    while keep.len() > 1 && size(&keep) > char_budget {
        keep.remove(1);
    }
    let omitted = blocks.len() - keep.len();

    let mut parts: Vec<String> = Vec::new();
    for (pos, &i) in keep.iter().enumerate() {
        if pos == 1 && omitted > 0 {
            parts.push(format!("[{omitted} earlier messages omitted]"));
        }
        parts.push(blocks[i].clone());
    }
    if keep.len() == 1 && omitted > 0 {
        parts.push(format!("[{omitted} earlier messages omitted]"));
    }
    parts.join("\n---\n")
}
