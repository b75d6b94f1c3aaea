pub mod clock;
pub mod planner;
pub mod rules;

pub use planner::{plan_scenarios, ScenarioPlan};
