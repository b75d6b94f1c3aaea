//! Run orchestration: graph and plan, concurrent generation with a
//! per-event retry state machine, run log, and report.

pub mod agent {
    pub mod budget;
}
pub mod pipeline;
pub mod report;
pub mod runner {
    pub mod event_log;
    pub mod generate;
}
pub mod sink;
pub mod state {
    pub mod machine;
}

pub use pipeline::{prepare, revalidate, run, Prepared, Revalidation};
pub use report::{FailedEvent, RunReport};
pub use sink::{Dataset, DatasetSink};
pub use state::machine::{EventStatus, FailureReason, RunState};
