use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::errors::GraphError;
use crate::types::TicketId;

// ── Status enum ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TicketStatus {
    #[serde(alias = "open", alias = "to_do")]
    Open,
    #[serde(alias = "in_progress")]
    InProgress,
    #[serde(alias = "in_review")]
    InReview,
    #[serde(alias = "blocked")]
    Blocked,
    #[serde(alias = "done")]
    Done,
    #[serde(alias = "closed")]
    Closed,
}

impl TicketStatus {
    pub const INITIAL: TicketStatus = TicketStatus::Open;

    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::InReview,
        TicketStatus::Blocked,
        TicketStatus::Done,
        TicketStatus::Closed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Done | TicketStatus::Closed)
    }

    /// Label as it would appear on a board column.
    pub fn label(self) -> &'static str {
        match self {
            TicketStatus::Open => "Open",
            TicketStatus::InProgress => "In Progress",
            TicketStatus::InReview => "In Review",
            TicketStatus::Blocked => "Blocked",
            TicketStatus::Done => "Done",
            TicketStatus::Closed => "Closed",
        }
    }

    /// Parse a free-text status word ("in progress", "In-Review", "to do").
    pub fn parse_label(text: &str) -> Option<TicketStatus> {
        let norm: String = text
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "open" | "todo" => Some(TicketStatus::Open),
            "inprogress" => Some(TicketStatus::InProgress),
            "inreview" => Some(TicketStatus::InReview),
            "blocked" => Some(TicketStatus::Blocked),
            "done" => Some(TicketStatus::Done),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// Shortest valid path from `self` to `target`, excluding `self`.
    /// Returns `Some(vec![])` when already there, `None` when unreachable.
    pub fn path_to(self, target: TicketStatus) -> Option<Vec<TicketStatus>> {
        if self == target {
            return Some(Vec::new());
        }
        let mut prev: HashMap<TicketStatus, TicketStatus> = HashMap::new();
        let mut queue = VecDeque::from([self]);
        while let Some(cur) = queue.pop_front() {
            for &next in successors(cur) {
                if next == self || prev.contains_key(&next) {
                    continue;
                }
                prev.insert(next, cur);
                if next == target {
                    let mut path = vec![target];
                    let mut at = target;
                    while let Some(&p) = prev.get(&at) {
                        if p == self {
                            break;
                        }
                        path.push(p);
                        at = p;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(TicketStatus, &[TicketStatus])] = &[
    (TicketStatus::Open, &[TicketStatus::InProgress]),
    (
        TicketStatus::InProgress,
        &[
            TicketStatus::InReview,
            TicketStatus::Blocked,
            TicketStatus::Done,
        ],
    ),
    (TicketStatus::Blocked, &[TicketStatus::InProgress]),
    (
        TicketStatus::InReview,
        &[TicketStatus::InProgress, TicketStatus::Done],
    ),
    (TicketStatus::Done, &[TicketStatus::Closed]),
    // Closed is final
];

fn successors(from: TicketStatus) -> &'static [TicketStatus] {
    VALID_TRANSITIONS
        .iter()
        .find(|(f, _)| *f == from)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

pub fn is_valid_transition(from: TicketStatus, to: TicketStatus) -> bool {
    successors(from).contains(&to)
}

// ── History ──

/// One recorded status change. The graph's history is the sequence of these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChange {
    pub ticket_id: TicketId,
    pub from: TicketStatus,
    pub to: TicketStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// What caused the change, e.g. `build` or `EVT-4`.
    pub cause: String,
}

/// Replay a history and check that each ticket walks a valid path from Open.
pub fn validate_history(history: &[StatusChange]) -> Result<(), GraphError> {
    let mut current: HashMap<&str, TicketStatus> = HashMap::new();
    for change in history {
        let cur = current
            .get(change.ticket_id.as_str())
            .copied()
            .unwrap_or(TicketStatus::INITIAL);
        if cur != change.from || !is_valid_transition(change.from, change.to) {
            return Err(GraphError::InvalidTransition {
                ticket_id: change.ticket_id.clone(),
                from: cur,
                to: change.to,
            });
        }
        current.insert(change.ticket_id.as_str(), change.to);
    }
    Ok(())
}
