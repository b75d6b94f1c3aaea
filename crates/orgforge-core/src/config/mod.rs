pub mod parser;
pub mod schema;
pub mod source;

pub use parser::{load_config, parse_config, to_yaml};
pub use schema::{EpicAssignment, GenerationOptions, OutputFormat, Range, RunConfig, ScenarioMix};
pub use source::{ConfigSource, KeyValueSource, YamlSource};
