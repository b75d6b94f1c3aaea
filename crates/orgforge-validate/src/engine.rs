use orgforge_core::{Artifact, CompanyGraph, ScenarioEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::checks::{Check, CheckInput, Matchers};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub check: Check,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.check, self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations formatted for prompt feedback and reports.
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Checks artifacts against one graph. The text matchers are built once
/// here and reused for every artifact and every retry of a run.
pub struct Validator<'g> {
    graph: &'g CompanyGraph,
    matchers: Arc<Matchers>,
}

impl<'g> Validator<'g> {
    pub fn new(graph: &'g CompanyGraph) -> Self {
        Self::with_matchers(graph, Arc::new(Matchers::new(graph)))
    }

    /// Reuse matchers already built for `graph`, e.g. across tasks.
    pub fn with_matchers(graph: &'g CompanyGraph, matchers: Arc<Matchers>) -> Self {
        Self { graph, matchers }
    }

    pub fn matchers(&self) -> &Arc<Matchers> {
        &self.matchers
    }

    /// Run every check against one artifact. No check short-circuits another.
    ///
    /// Pure: the same artifact, event, and graph always give the same result.
    pub fn validate(&self, artifact: &Artifact, event: &ScenarioEvent) -> ValidationResult {
        let input = CheckInput {
            artifact,
            event,
            graph: self.graph,
            matchers: &self.matchers,
        };
        let violations: Vec<Violation> = Check::ALL
            .iter()
            .flat_map(|&check| {
                check
                    .run(&input)
                    .into_iter()
                    .map(move |message| Violation { check, message })
            })
            .collect();
        debug!(
            event = %event.id,
            artifact = %artifact.id,
            violations = violations.len(),
            "artifact validated"
        );
        ValidationResult { violations }
    }
}

/// One-off check of a single artifact.
pub fn validate(artifact: &Artifact, event: &ScenarioEvent, graph: &CompanyGraph) -> ValidationResult {
    Validator::new(graph).validate(artifact, event)
}
