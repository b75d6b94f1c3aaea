//! Natural-language artifacts for planned scenario events.
//!
//! Prompts are built from a [`GraphView`] holding only the event's bound
//! entities, sent to a [`TextGenerator`], and parsed back into transcripts
//! or email threads.

pub mod engine;
pub mod parse;
pub mod prompt;
pub mod provider;

pub use engine::{artifact_id, Feedback, NarrativeEngine};
pub use prompt::{build_prompt, GraphView, Prompt};
pub use provider::{
    AnthropicProvider, CompletionOptions, OpenAiProvider, ScriptedGenerator, TemplateGenerator,
    TextGenerator,
};
