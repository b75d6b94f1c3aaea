use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::macros::datetime;
use time::OffsetDateTime;

use crate::errors::ConfigurationError;
use crate::status::TicketStatus;
use crate::types::{Role, ScenarioKind};

/// Options that must be present in every config.
pub const REQUIRED_KEYS: &[&str] = &[
    "team_count",
    "team_size_range",
    "role_weights",
    "epic_count",
    "story_range",
    "task_range",
    "bug_rate",
    "fixversion_count",
    "scenario_mix",
];

/// Inclusive integer range.
///
/// In YAML, ranges can be written as `"4-6"`, `[4, 6]`, `{ min: 4, max: 6 }`
/// or a single number. They are normalized to the mapping form during parsing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Range {
    pub min: u32,
    pub max: u32,
}

impl Range {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min..=self.max)
    }

    pub fn contains(&self, n: u32) -> bool {
        (self.min..=self.max).contains(&n)
    }

    fn check(&self, key: &str, floor: u32) -> Result<(), ConfigurationError> {
        if self.min > self.max {
            return Err(ConfigurationError::invalid(
                key,
                format!("range {}-{} is inverted", self.min, self.max),
            ));
        }
        if self.min < floor || self.max == 0 {
            return Err(ConfigurationError::invalid(
                key,
                format!("range must start at {floor} or more"),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EpicAssignment {
    #[default]
    RoundRobin,
    /// Proportional to team size.
    Weighted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One artifact per line in `artifacts.jsonl`.
    #[default]
    Jsonl,
    /// A single pretty-printed `artifacts.json` array.
    Json,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScenarioMix {
    pub kind: ScenarioKind,
    pub count: u32,
}

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_company_name")]
    pub company_name: String,
    #[serde(default = "default_project_key")]
    pub project_key: String,
    /// Derived from the company name when absent.
    #[serde(default)]
    pub email_domain: Option<String>,
    #[serde(default)]
    pub seed: u64,

    // organization
    pub team_count: u32,
    pub team_size_range: Range,
    pub role_weights: BTreeMap<Role, f64>,
    #[serde(default)]
    pub headcount: Option<u32>,
    #[serde(default)]
    pub business_units: u32,

    // tickets
    pub epic_count: u32,
    pub story_range: Range,
    pub task_range: Range,
    #[serde(default = "default_subtask_range")]
    pub subtask_range: Range,
    pub bug_rate: f64,
    #[serde(default = "default_dependency_rate")]
    pub dependency_rate: f64,
    #[serde(default)]
    pub epic_assignment: EpicAssignment,
    pub fixversion_count: u32,
    #[serde(default = "default_cadence_days")]
    pub fixversion_cadence_days: u32,
    #[serde(default = "default_status_weights")]
    pub status_weights: BTreeMap<TicketStatus, f64>,
    /// Sprints per team; the last one is running at `start_date`.
    #[serde(default = "default_sprint_count")]
    pub sprint_count: u32,
    #[serde(default = "default_sprint_duration")]
    pub sprint_duration_days: u32,

    // scenarios
    /// Kept in declaration order; events are emitted round-robin across it.
    pub scenario_mix: Vec<ScenarioMix>,
    #[serde(default = "default_start_date", with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(default = "default_event_spacing")]
    pub event_spacing_minutes: u32,

    // generation
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub generation: GenerationOptions,
}

/// Provider and engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
    pub generation_retries: u32,
    pub provider_retries: u32,
    pub backoff_ms: u64,
    pub call_timeout_sec: u64,
    pub concurrency: usize,
    pub thread_length_range: Range,
    pub transcript_turns_range: Range,
    pub prompt_char_budget: usize,
    pub reply_gap_minutes: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.8,
            stop_sequences: Vec::new(),
            generation_retries: 3,
            provider_retries: 3,
            backoff_ms: 500,
            call_timeout_sec: 60,
            concurrency: 4,
            thread_length_range: Range::new(2, 4),
            transcript_turns_range: Range::new(6, 14),
            prompt_char_budget: 6000,
            reply_gap_minutes: 45,
        }
    }
}

impl RunConfig {
    pub fn email_domain(&self) -> String {
        self.email_domain
            .clone()
            .unwrap_or_else(|| crate::ids::domain_for(&self.company_name))
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.project_key.is_empty()
            || !self
                .project_key
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            || !self.project_key.starts_with(|c: char| c.is_ascii_uppercase())
        {
            return Err(ConfigurationError::invalid(
                "project_key",
                "must be uppercase letters and digits, starting with a letter",
            ));
        }
        self.check_org()?;
        self.check_tickets()?;
        self.check_scenarios()?;
        self.check_generation()?;
        Ok(())
    }

    /// Organization options on their own.
    pub fn check_org(&self) -> Result<(), ConfigurationError> {
        if self.team_count == 0 {
            return Err(ConfigurationError::invalid(
                "team_count",
                "must be at least 1",
            ));
        }
        self.team_size_range.check("team_size_range", 1)?;
        if self.role_weights.is_empty() {
            return Err(ConfigurationError::invalid(
                "role_weights",
                "must name at least one role",
            ));
        }
        if let Some((role, w)) = self
            .role_weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(ConfigurationError::invalid(
                "role_weights",
                format!("weight for {role:?} must be a non-negative number, got {w}"),
            ));
        }
        if self.role_weights.values().sum::<f64>() <= 0.0 {
            return Err(ConfigurationError::invalid(
                "role_weights",
                "weights sum to zero",
            ));
        }
        let overflow = || {
            ConfigurationError::invalid(
                "team_size_range",
                format!(
                    "{} teams of up to {} people is more than can be counted",
                    self.team_count, self.team_size_range.max
                ),
            )
        };
        let min = self
            .team_count
            .checked_mul(self.team_size_range.min)
            .ok_or_else(overflow)?;
        let max = self
            .team_count
            .checked_mul(self.team_size_range.max)
            .ok_or_else(overflow)?;
        if let Some(headcount) = self.headcount {
            if min > headcount {
                return Err(ConfigurationError::invalid(
                    "headcount",
                    format!(
                        "{} teams of at least {} need {min} people, headcount is {headcount}",
                        self.team_count, self.team_size_range.min
                    ),
                ));
            }
            if max < headcount {
                return Err(ConfigurationError::invalid(
                    "headcount",
                    format!(
                        "{} teams of at most {} fit {max} people, headcount is {headcount}",
                        self.team_count, self.team_size_range.max
                    ),
                ));
            }
        }
        if self.business_units >= self.team_count && self.business_units > 0 {
            return Err(ConfigurationError::invalid(
                "business_units",
                "must be fewer than team_count",
            ));
        }
        Ok(())
    }

    /// Ticket graph options on their own.
    pub fn check_tickets(&self) -> Result<(), ConfigurationError> {
        if self.epic_count == 0 {
            return Err(ConfigurationError::invalid("epic_count", "must be at least 1"));
        }
        if self.fixversion_count == 0 {
            return Err(ConfigurationError::invalid(
                "fixversion_count",
                "must be at least 1",
            ));
        }
        if self.fixversion_cadence_days == 0 {
            return Err(ConfigurationError::invalid(
                "fixversion_cadence_days",
                "must be at least 1",
            ));
        }
        if self.sprint_count == 0 {
            return Err(ConfigurationError::invalid("sprint_count", "must be at least 1"));
        }
        if self.sprint_duration_days == 0 {
            return Err(ConfigurationError::invalid(
                "sprint_duration_days",
                "must be at least 1",
            ));
        }
        let span = u64::from(self.sprint_count) * u64::from(self.sprint_duration_days);
        if span > MAX_SPRINT_SPAN_DAYS {
            return Err(ConfigurationError::invalid(
                "sprint_count",
                format!("sprints span {span} days, more than {MAX_SPRINT_SPAN_DAYS}"),
            ));
        }
        self.story_range.check("story_range", 1)?;
        self.task_range.check("task_range", 1)?;
        self.subtask_range.check("subtask_range", 0)?;
        check_probability("bug_rate", self.bug_rate)?;
        check_probability("dependency_rate", self.dependency_rate)?;
        if self
            .status_weights
            .values()
            .any(|w| !w.is_finite() || *w < 0.0)
            || self.status_weights.values().sum::<f64>() <= 0.0
        {
            return Err(ConfigurationError::invalid(
                "status_weights",
                "must be non-negative with a positive sum",
            ));
        }
        Ok(())
    }

    /// Scenario options on their own.
    pub fn check_scenarios(&self) -> Result<(), ConfigurationError> {
        let mut seen = Vec::new();
        for entry in &self.scenario_mix {
            if seen.contains(&entry.kind) {
                return Err(ConfigurationError::invalid(
                    "scenario_mix",
                    format!("{} listed twice", entry.kind),
                ));
            }
            seen.push(entry.kind);
        }
        if self.event_spacing_minutes == 0 {
            return Err(ConfigurationError::invalid(
                "event_spacing_minutes",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn check_generation(&self) -> Result<(), ConfigurationError> {
        let g = &self.generation;
        if self.retry_budget == 0 {
            return Err(ConfigurationError::invalid("retry_budget", "must be at least 1"));
        }
        if g.concurrency == 0 {
            return Err(ConfigurationError::invalid(
                "generation.concurrency",
                "must be at least 1",
            ));
        }
        if g.generation_retries == 0 {
            return Err(ConfigurationError::invalid(
                "generation.generation_retries",
                "must be at least 1",
            ));
        }
        if g.call_timeout_sec == 0 {
            return Err(ConfigurationError::invalid(
                "generation.call_timeout_sec",
                "must be at least 1",
            ));
        }
        if !(0.0..=2.0).contains(&g.temperature) {
            return Err(ConfigurationError::invalid(
                "generation.temperature",
                "must be within 0.0..=2.0",
            ));
        }
        g.thread_length_range
            .check("generation.thread_length_range", 1)?;
        g.transcript_turns_range
            .check("generation.transcript_turns_range", 2)?;
        if g.prompt_char_budget < 500 {
            return Err(ConfigurationError::invalid(
                "generation.prompt_char_budget",
                "must be at least 500",
            ));
        }
        Ok(())
    }

    /// Total events the mix asks for.
    pub fn requested_events(&self) -> u32 {
        self.scenario_mix.iter().map(|m| m.count).sum()
    }
}

fn check_probability(key: &str, p: f64) -> Result<(), ConfigurationError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(ConfigurationError::invalid(
            key,
            format!("must be within [0, 1], got {p}"),
        ));
    }
    Ok(())
}

fn default_company_name() -> String {
    "Acme Software".into()
}
fn default_project_key() -> String {
    "PROJ".into()
}
fn default_subtask_range() -> Range {
    Range::new(0, 2)
}
fn default_dependency_rate() -> f64 {
    0.3
}
fn default_cadence_days() -> u32 {
    30
}
/// Ten years of sprints back from the start date.
const MAX_SPRINT_SPAN_DAYS: u64 = 3653;

fn default_sprint_count() -> u32 {
    3
}
fn default_sprint_duration() -> u32 {
    14
}
fn default_status_weights() -> BTreeMap<TicketStatus, f64> {
    BTreeMap::from([
        (TicketStatus::Open, 0.25),
        (TicketStatus::InProgress, 0.25),
        (TicketStatus::InReview, 0.15),
        (TicketStatus::Blocked, 0.1),
        (TicketStatus::Done, 0.2),
        (TicketStatus::Closed, 0.05),
    ])
}
fn default_start_date() -> OffsetDateTime {
    datetime!(2024-01-08 09:00 UTC)
}
fn default_event_spacing() -> u32 {
    90
}
fn default_retry_budget() -> u32 {
    3
}
