pub mod ordering;
pub mod person_refs;
pub mod status_claims;
pub mod ticket_refs;

use orgforge_core::{Artifact, CompanyGraph, ScenarioEvent};
use regex::Regex;
use serde::{Deserialize, Serialize};

use person_refs::PeopleMatcher;

/// What every check gets to look at.
#[derive(Clone, Copy)]
pub struct CheckInput<'a> {
    pub artifact: &'a Artifact,
    pub event: &'a ScenarioEvent,
    pub graph: &'a CompanyGraph,
    pub matchers: &'a Matchers,
}

/// Text matchers for one graph, built once and shared by every artifact
/// checked against it. A matcher that failed to build keeps its error so
/// the check depending on it reports a violation instead of passing.
pub struct Matchers {
    tickets: Result<Regex, String>,
    people: Result<PeopleMatcher, String>,
}

impl Matchers {
    pub fn new(graph: &CompanyGraph) -> Self {
        Self {
            tickets: ticket_pattern(&graph.work.project_key).map_err(|e| e.to_string()),
            people: PeopleMatcher::new(&graph.org.people).map_err(|e| e.to_string()),
        }
    }

    pub fn tickets(&self) -> Result<&Regex, &str> {
        self.tickets.as_ref().map_err(String::as_str)
    }

    pub fn people(&self) -> Result<&PeopleMatcher, &str> {
        self.people.as_ref().map_err(String::as_str)
    }
}

/// The consistency checks, in the order they run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    TicketRefs,
    PersonRefs,
    StatusClaims,
    Ordering,
}

impl Check {
    pub const ALL: [Check; 4] = [
        Check::TicketRefs,
        Check::PersonRefs,
        Check::StatusClaims,
        Check::Ordering,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Check::TicketRefs => "ticket_refs",
            Check::PersonRefs => "person_refs",
            Check::StatusClaims => "status_claims",
            Check::Ordering => "ordering",
        }
    }

    pub fn run(self, input: &CheckInput<'_>) -> Vec<String> {
        match self {
            Check::TicketRefs => ticket_refs::check(input),
            Check::PersonRefs => person_refs::check(input),
            Check::StatusClaims => status_claims::check(input),
            Check::Ordering => ordering::check(input),
        }
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A ticket id found in free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub id: String,
    pub start: usize,
    pub end: usize,
}

/// `<KEY>-<n>` pattern for the graph's project key.
pub fn ticket_pattern(project_key: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\b{}-\d+\b", regex::escape(project_key)))
}

pub fn ticket_mentions(re: &Regex, text: &str) -> Vec<Mention> {
    re.find_iter(text)
        .map(|m| Mention {
            id: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}
