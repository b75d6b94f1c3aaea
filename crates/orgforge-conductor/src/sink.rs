use orgforge_core::config::RunConfig;
use orgforge_core::{Artifact, CompanyGraph, ScenarioEvent};
use serde::{Deserialize, Serialize};

use crate::report::RunReport;

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub config: RunConfig,
    /// The graph after planning, with every event's status changes applied.
    pub graph: CompanyGraph,
    pub events: Vec<ScenarioEvent>,
    /// Accepted artifacts in event order.
    pub artifacts: Vec<Artifact>,
    pub report: RunReport,
}

impl Dataset {
    pub fn event(&self, id: &str) -> Option<&ScenarioEvent> {
        self.events.iter().find(|e| e.id == id)
    }
}

/// Where a finished dataset goes. Written once per run.
pub trait DatasetSink {
    fn write(&self, dataset: &Dataset) -> anyhow::Result<()>;
}
