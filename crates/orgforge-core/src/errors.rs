use thiserror::Error;

use crate::status::TicketStatus;

/// Invalid or missing input. Fatal before generation starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("missing required option `{0}`")]
    Missing(String),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: String, reason: String },

    #[error("config syntax error: {0}")]
    Syntax(String),
}

impl ConfigurationError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigurationError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Failure talking to the text-generation provider.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("provider call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout { .. } => true,
            ProviderError::Http { status, .. } => *status >= 500 || *status == 408,
            ProviderError::Auth(_) | ProviderError::Cancelled | ProviderError::InvalidResponse(_) => {
                false
            }
        }
    }
}

/// Model output that does not follow the requested grammar.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("empty output")]
    Empty,

    #[error("missing `{0}:` header")]
    MissingHeader(&'static str),

    #[error("line {line}: {reason}")]
    BadLine { line: usize, reason: String },

    #[error("unknown participant `{0}`")]
    UnknownParticipant(String),

    #[error("timestamps must strictly increase (line {line})")]
    NonIncreasing { line: usize },

    #[error("expected {min}..={max} turns, got {got}")]
    TurnCount { got: usize, min: u32, max: u32 },
}

/// The validator kept rejecting an event until the retry budget ran out.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("event {event_id} still inconsistent after {attempts} attempts: {}", violations.join("; "))]
pub struct ConsistencyError {
    pub event_id: String,
    pub attempts: u32,
    pub violations: Vec<String>,
}

/// Invariant or transition violation inside the company graph.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("invalid transition for {ticket_id}: {from} -> {to}")]
    InvalidTransition {
        ticket_id: String,
        from: TicketStatus,
        to: TicketStatus,
    },

    #[error("unknown ticket {0}")]
    UnknownTicket(String),

    #[error("unknown person {0}")]
    UnknownPerson(String),

    #[error("unknown team {0}")]
    UnknownTeam(String),

    #[error("team {0} would be left without members")]
    EmptyTeam(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Engine-level failure for one event.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NarrativeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("malformed output after {attempts} attempts: {source}")]
    Generation {
        attempts: u32,
        #[source]
        source: GenerationError,
    },

    #[error("cancelled")]
    Cancelled,
}

impl NarrativeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            NarrativeError::Cancelled | NarrativeError::Provider(ProviderError::Cancelled)
        )
    }
}
