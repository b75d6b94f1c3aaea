use std::collections::BTreeMap;

use orgforge_core::ScenarioKind;
use orgforge_scenario::ScenarioPlan;
use serde::{Deserialize, Serialize};

use crate::state::machine::{EventStatus, FailureReason, RunState};

/// What a run produced, written next to the dataset as `report.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub seed: u64,
    pub generator: String,
    pub fingerprint: String,
    /// Events the scenario mix asked for.
    pub requested: u32,
    pub planned: usize,
    pub succeeded: usize,
    pub skipped: u32,
    /// Requested events per kind that had nothing to bind to.
    #[serde(default)]
    pub deficits: BTreeMap<ScenarioKind, u32>,
    #[serde(default)]
    pub failed: Vec<FailedEvent>,
    /// Attempts it took to get an accepted artifact → number of events.
    #[serde(default)]
    pub attempts: BTreeMap<u32, u32>,
    pub started_at: String,
    pub completed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedEvent {
    pub event_id: String,
    pub kind: ScenarioKind,
    pub reason: FailureReason,
    pub message: String,
    pub attempts: u32,
}

impl RunReport {
    pub fn new(
        plan: &ScenarioPlan,
        state: &RunState,
        seed: u64,
        generator: &str,
        fingerprint: &str,
        started_at: String,
        completed_at: String,
    ) -> Self {
        let mut attempts = BTreeMap::new();
        let mut failed = Vec::new();
        for e in &state.events {
            match e.status {
                EventStatus::Validated => *attempts.entry(e.attempts).or_insert(0) += 1,
                EventStatus::Failed => failed.push(FailedEvent {
                    event_id: e.id.clone(),
                    kind: e.kind,
                    reason: e
                        .error
                        .as_ref()
                        .map_or(FailureReason::Provider, |err| err.reason),
                    message: e
                        .error
                        .as_ref()
                        .map(|err| err.message.clone())
                        .unwrap_or_default(),
                    attempts: e.attempts,
                }),
                _ => {}
            }
        }

        Self {
            run_id: state.run_id.clone(),
            seed,
            generator: generator.to_string(),
            fingerprint: fingerprint.to_string(),
            requested: plan.requested,
            planned: plan.events.len(),
            succeeded: state.count(EventStatus::Validated),
            skipped: plan.skipped(),
            deficits: plan.deficits.clone(),
            failed,
            attempts,
            started_at,
            completed_at,
        }
    }

    /// Every planned event produced an artifact.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.succeeded == self.planned
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} requested, {} succeeded, {} skipped, {} failed",
            self.requested,
            self.succeeded,
            self.skipped,
            self.failed.len()
        );
        if !self.deficits.is_empty() {
            let kinds: Vec<String> = self
                .deficits
                .iter()
                .map(|(k, n)| format!("{k} ×{n}"))
                .collect();
            line.push_str(&format!(" (no bindings for {})", kinds.join(", ")));
        }
        line
    }
}
