//! Referential consistency between generated artifacts and the company graph.

pub mod checks;
pub mod engine;

pub use checks::{Check, Matchers};
pub use engine::{validate, ValidationResult, Validator, Violation};
