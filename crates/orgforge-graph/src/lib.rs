pub mod fixversion;
pub mod org;
pub mod progress;
pub mod sprints;
pub mod tickets;

use orgforge_core::config::RunConfig;
use orgforge_core::{CompanyGraph, ConfigurationError, GraphError, RunContext};
use thiserror::Error;

pub use org::build_organization;
pub use tickets::build_ticket_graph;

/// Anything that stops the graph from being built. Aborts the run.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Organization, tickets, and a final invariant check.
pub fn build_company_graph(
    cfg: &RunConfig,
    ctx: &mut RunContext,
) -> Result<CompanyGraph, BuildError> {
    let org = build_organization(cfg, ctx)?;
    let work = build_ticket_graph(cfg, &org, ctx)?;
    let graph = CompanyGraph::new(cfg.start_date, org, work);
    graph.check_invariants()?;
    Ok(graph)
}
