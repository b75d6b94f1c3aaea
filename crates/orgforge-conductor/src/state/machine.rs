use anyhow::{bail, Result};
use orgforge_core::{Artifact, ScenarioEvent, ScenarioKind};
use serde::{Deserialize, Serialize};

// ── Status enums ──

/// Where one event is in the generate/validate loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Generated,
    Validated,
    Rejected,
    Failed,
}

impl EventStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Validated | EventStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Provider kept failing or failed permanently.
    Provider,
    /// Output never followed the requested grammar.
    Malformed,
    /// The validator rejected every attempt in the retry budget.
    Inconsistent,
    Cancelled,
}

// ── State types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub events: Vec<EventState>,
    #[serde(default)]
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventState {
    pub id: String,
    pub kind: ScenarioKind,
    pub status: EventStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Violations from the last rejected attempt, fed into the next prompt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureInfo {
    pub reason: FailureReason,
    pub message: String,
    pub timestamp: String,
}

// ── Valid transitions ──

const VALID_TRANSITIONS: &[(EventStatus, &[EventStatus])] = &[
    (
        EventStatus::Pending,
        &[EventStatus::Generated, EventStatus::Failed],
    ),
    (
        EventStatus::Generated,
        &[EventStatus::Validated, EventStatus::Rejected],
    ),
    (
        EventStatus::Rejected,
        &[EventStatus::Pending, EventStatus::Failed],
    ),
    // Validated and Failed are terminal
];

fn is_valid_transition(from: EventStatus, to: EventStatus) -> bool {
    VALID_TRANSITIONS
        .iter()
        .any(|(f, targets)| *f == from && targets.contains(&to))
}

// ── Side effects ──

/// Optional side-effect data applied during a transition.
#[derive(Debug, Clone, Default)]
pub struct EventUpdate {
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub attempts: Option<u32>,
    pub violations: Option<Vec<String>>,
    pub error: Option<FailureInfo>,
    pub artifact: Option<Artifact>,
}

impl EventUpdate {
    pub fn apply(self, event: &mut EventState) {
        if let Some(v) = self.started_at {
            event.started_at.get_or_insert(v);
        }
        if let Some(v) = self.completed_at {
            event.completed_at = Some(v);
        }
        if let Some(v) = self.attempts {
            event.attempts = v;
        }
        if let Some(v) = self.violations {
            event.violations = v;
        }
        if self.error.is_some() {
            event.error = self.error;
        }
        if self.artifact.is_some() {
            event.artifact = self.artifact;
        }
    }
}

// ── CAS-guarded transition ──

/// Move an event from `from` to `to`, applying side effects.
/// Returns Ok(true) on success, Ok(false) on CAS miss (current != from).
pub fn transition(
    state: &mut RunState,
    event_id: &str,
    from: EventStatus,
    to: EventStatus,
    side_effect: Option<EventUpdate>,
) -> Result<bool> {
    let event = state.get_event_mut(event_id)?;
    if event.status != from {
        return Ok(false);
    }
    if !is_valid_transition(from, to) {
        bail!("invalid transition: {event_id} {from:?} → {to:?}");
    }
    event.status = to;
    if let Some(update) = side_effect {
        update.apply(event);
    }
    state.version += 1;
    Ok(true)
}

// ── RunState methods ──

impl RunState {
    /// Every planned event starts pending.
    pub fn from_events(run_id: &str, events: &[ScenarioEvent]) -> Self {
        let events = events
            .iter()
            .map(|e| EventState {
                id: e.id.clone(),
                kind: e.kind,
                status: EventStatus::Pending,
                attempts: 0,
                started_at: None,
                completed_at: None,
                violations: Vec::new(),
                error: None,
                artifact: None,
            })
            .collect();

        RunState {
            run_id: run_id.to_string(),
            events,
            version: 0,
        }
    }

    pub fn get_event(&self, id: &str) -> Result<&EventState> {
        self.events
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| anyhow::anyhow!("event not found: \"{id}\""))
    }

    pub fn get_event_mut(&mut self, id: &str) -> Result<&mut EventState> {
        self.events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| anyhow::anyhow!("event not found: \"{id}\""))
    }

    pub fn count(&self, status: EventStatus) -> usize {
        self.events.iter().filter(|e| e.status == status).count()
    }

    pub fn is_finished(&self) -> bool {
        self.events.iter().all(|e| e.status.is_terminal())
    }

    /// Accepted artifacts in event order.
    pub fn artifacts(&self) -> Vec<&Artifact> {
        self.events
            .iter()
            .filter(|e| e.status == EventStatus::Validated)
            .filter_map(|e| e.artifact.as_ref())
            .collect()
    }

    pub fn into_artifacts(self) -> Vec<Artifact> {
        self.events
            .into_iter()
            .filter(|e| e.status == EventStatus::Validated)
            .filter_map(|e| e.artifact)
            .collect()
    }
}
