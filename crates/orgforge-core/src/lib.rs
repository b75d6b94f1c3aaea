pub mod canon;
pub mod config;
pub mod errors;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod graph;
pub mod hash;
pub mod ids;
pub mod status;
pub mod types;

pub use errors::*;
pub use graph::CompanyGraph;
pub use ids::{IdKind, RunContext};
pub use status::{is_valid_transition, StatusChange, TicketStatus};
pub use types::*;
