use std::sync::Arc;
use std::time::Duration;

use orgforge_core::config::GenerationOptions;
use orgforge_core::{
    Artifact, ArtifactBody, EmailMessage, EmailThread, GenerationError, NarrativeError,
    ProviderError, ScenarioEvent, Transcript,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::parse::{parse_email, parse_transcript};
use crate::prompt::{build_prompt, GraphView, Prompt, Request};
use crate::provider::{CompletionOptions, TextGenerator};

/// Fixed namespace for artifact ids.
const ARTIFACT_NS: Uuid = Uuid::from_bytes([
    0x0f, 0x9e, 0x6a, 0x11, 0x2c, 0x4b, 0x45, 0x7d, 0x8e, 0x31, 0x5a, 0x70, 0x0c, 0xd2, 0x19, 0x01,
]);

/// Deterministic artifact id per run seed, event, and attempt.
pub fn artifact_id(seed: u64, event_id: &str, attempt: u32) -> String {
    Uuid::new_v5(&ARTIFACT_NS, format!("{seed}-{event_id}-{attempt}").as_bytes()).to_string()
}

/// Which consistency attempt this is, and what the validator said last time.
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    /// 1-based.
    pub attempt: u32,
    pub violations: Vec<String>,
}

impl Feedback {
    pub fn first() -> Self {
        Self {
            attempt: 1,
            violations: Vec::new(),
        }
    }

    pub fn retry(attempt: u32, violations: Vec<String>) -> Self {
        Self {
            attempt,
            violations,
        }
    }
}

/// Turns one planned event into an artifact.
///
/// Malformed output is re-requested up to `generation_retries` times and
/// transient provider errors are retried with exponential backoff. The
/// engine never sees anything outside the event's `GraphView`.
pub struct NarrativeEngine {
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
    completion: CompletionOptions,
    seed: u64,
}

impl NarrativeEngine {
    pub fn new(generator: Arc<dyn TextGenerator>, options: GenerationOptions, seed: u64) -> Self {
        let completion = CompletionOptions::from(&options);
        Self {
            generator,
            options,
            completion,
            seed,
        }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub async fn generate(
        &self,
        event: &ScenarioEvent,
        view: &GraphView<'_>,
        feedback: &Feedback,
        cancel: &CancellationToken,
    ) -> Result<Artifact, NarrativeError> {
        if cancel.is_cancelled() {
            return Err(NarrativeError::Cancelled);
        }
        let body = if event.kind.is_email() {
            ArtifactBody::EmailThread(self.email_thread(event, view, feedback, cancel).await?)
        } else {
            ArtifactBody::Transcript(self.transcript(event, view, feedback, cancel).await?)
        };
        Ok(Artifact {
            id: artifact_id(self.seed, &event.id, feedback.attempt),
            event_id: event.id.clone(),
            attempts: feedback.attempt,
            body,
        })
    }

    async fn transcript(
        &self,
        event: &ScenarioEvent,
        view: &GraphView<'_>,
        feedback: &Feedback,
        cancel: &CancellationToken,
    ) -> Result<Transcript, NarrativeError> {
        let turns = self.options.transcript_turns_range;
        let prompt = build_prompt(
            view,
            Request::Transcript { turns },
            &feedback.violations,
            self.options.prompt_char_budget,
        );
        let participants = prompt.frame.participants.clone();
        let utterances = self
            .produce(&prompt, cancel, |text| {
                parse_transcript(text, &participants, turns)
            })
            .await?;

        let title = match view.team() {
            Some(team) => format!("{} {}", team.name, event.kind.title()),
            None => event.kind.title().to_string(),
        };
        Ok(Transcript {
            title,
            start: event.timestamp,
            turns: utterances,
        })
    }

    /// One call per message, each re-fed the thread so far.
    async fn email_thread(
        &self,
        event: &ScenarioEvent,
        view: &GraphView<'_>,
        feedback: &Feedback,
        cancel: &CancellationToken,
    ) -> Result<EmailThread, NarrativeError> {
        let mut rng = StdRng::seed_from_u64(thread_seed(self.seed, &event.id));
        let length = self.options.thread_length_range.sample(&mut rng).max(1) as usize;
        let gap = time::Duration::minutes(i64::from(self.options.reply_gap_minutes));

        let mut messages: Vec<EmailMessage> = Vec::with_capacity(length);
        let mut subject: Option<String> = None;

        for index in 0..length {
            let at = event.timestamp + gap * index as i32;
            let prompt = build_prompt(
                view,
                Request::Email {
                    index,
                    length,
                    prior: &messages,
                    subject: subject.as_deref(),
                    at,
                },
                &feedback.violations,
                self.options.prompt_char_budget,
            );
            let participants = prompt.frame.participants.clone();
            let previous = messages.last().map(|m| m.timestamp);

            let mail = self
                .produce(&prompt, cancel, |text| {
                    let mail = parse_email(text, &participants)?;
                    if let (Some(date), Some(prev)) = (mail.date, previous) {
                        if date <= prev {
                            return Err(GenerationError::NonIncreasing {
                                line: mail.date_line.unwrap_or(1),
                            });
                        }
                    }
                    Ok(mail)
                })
                .await?;

            let timestamp = mail
                .date
                .unwrap_or_else(|| previous.map_or(at, |p| at.max(p + gap)));
            if index == 0 {
                subject = Some(mail.subject.clone());
            }
            debug!(event = %event.id, index, length, sender = %mail.sender, "email message accepted");
            messages.push(EmailMessage {
                sender: mail.sender,
                recipients: mail.recipients,
                timestamp,
                body: mail.body,
            });
        }

        Ok(EmailThread {
            subject: subject.unwrap_or_else(|| event.kind.title().to_string()),
            messages,
        })
    }

    /// Call the generator until `parse` accepts the output.
    async fn produce<T, F>(
        &self,
        prompt: &Prompt,
        cancel: &CancellationToken,
        parse: F,
    ) -> Result<T, NarrativeError>
    where
        F: Fn(&str) -> Result<T, GenerationError>,
    {
        let tries = self.options.generation_retries + 1;
        let mut current = prompt.clone();
        let mut last = GenerationError::Empty;
        for attempt in 1..=tries {
            let text = self.call(&current, cancel).await?;
            match parse(&text) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(event = %prompt.frame.event_id, attempt, error = %e, "malformed output");
                    current = prompt.with_parse_error(&e);
                    last = e;
                }
            }
        }
        warn!(event = %prompt.frame.event_id, tries, error = %last, "giving up on malformed output");
        Err(NarrativeError::Generation {
            attempts: tries,
            source: last,
        })
    }

    /// One completion with timeout, cancellation, and backoff on transient errors.
    async fn call(&self, prompt: &Prompt, cancel: &CancellationToken) -> Result<String, NarrativeError> {
        let limit = Duration::from_secs(self.options.call_timeout_sec);
        let mut retries = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(NarrativeError::Cancelled);
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(NarrativeError::Cancelled),
                r = tokio::time::timeout(limit, self.generator.complete(prompt, &self.completion)) => {
                    r.unwrap_or(Err(ProviderError::Timeout {
                        after_ms: limit.as_millis() as u64,
                    }))
                }
            };
            match outcome {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && retries < self.options.provider_retries => {
                    let delay = backoff(self.options.backoff_ms, retries, &e);
                    warn!(
                        provider = self.generator.name(),
                        error = %e,
                        retry = retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        "provider call failed, backing off"
                    );
                    retries += 1;
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(NarrativeError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// `base * 2^retry`, or the server's retry-after when that is longer.
fn backoff(base_ms: u64, retry: u32, err: &ProviderError) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << retry.min(16));
    match err {
        ProviderError::RateLimited {
            retry_after_ms: Some(ms),
        } => Duration::from_millis((*ms).max(exp)),
        _ => Duration::from_millis(exp),
    }
}

fn thread_seed(seed: u64, event_id: &str) -> u64 {
    Uuid::new_v5(&ARTIFACT_NS, format!("thread-{seed}-{event_id}").as_bytes()).as_u128() as u64
}
