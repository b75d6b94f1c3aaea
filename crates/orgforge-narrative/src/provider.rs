use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orgforge_core::config::GenerationOptions;
use orgforge_core::{ProviderError, ScenarioKind, TicketStatus};
use serde::{Deserialize, Serialize};

use crate::prompt::{rfc3339, Frame, Prompt, Shape, TicketLine};

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
}

impl From<&GenerationOptions> for CompletionOptions {
    fn from(g: &GenerationOptions) -> Self {
        Self {
            max_tokens: g.max_tokens,
            temperature: g.temperature,
            stop_sequences: g.stop_sequences.clone(),
        }
    }
}

/// Source of free text. Implemented by the HTTP providers, the offline
/// template writer, and `ScriptedGenerator` (tests and dry runs).
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError>;
}

/// Map a non-success HTTP status to a provider error.
pub fn classify_status(status: u16, retry_after: Option<&str>, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body),
        429 => ProviderError::RateLimited {
            retry_after_ms: retry_after
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|secs| (secs * 1000.0) as u64),
        },
        _ => ProviderError::Http { status, body },
    }
}

fn network(e: reqwest::Error) -> ProviderError {
    ProviderError::Network(e.to_string())
}

async fn read_error(resp: reqwest::Response) -> ProviderError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await.unwrap_or_default();
    classify_status(status, retry_after.as_deref(), body)
}

fn api_key(var: &str) -> Result<String, ProviderError> {
    match std::env::var(var) {
        Ok(k) if !k.trim().is_empty() => Ok(k),
        _ => Err(ProviderError::Auth(format!("{var} is not set"))),
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(network)
}

// ── Anthropic ──

/// Anthropic Messages API.
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "no_stops")]
    stop_sequences: &'a [String],
}

fn no_stops(stops: &&[String]) -> bool {
    stops.is_empty()
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicProvider {
    pub const DEFAULT_MODEL: &'static str = "claude-sonnet-4-20250514";

    /// Key from `ANTHROPIC_API_KEY`.
    pub fn from_env(timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            api_key: api_key("ANTHROPIC_API_KEY")?,
            model: Self::DEFAULT_MODEL.to_string(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            http: http_client(timeout)?,
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait::async_trait]
impl TextGenerator for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system: &prompt.system,
            messages: [ChatMessage {
                role: "user",
                content: &prompt.text,
            }],
            stop_sequences: &options.stop_sequences,
        };
        let resp = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(network)?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }
        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let text: String = parsed
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect();
        Ok(text)
    }
}

// ── OpenAI-compatible ──

/// OpenAI chat completions, or any endpoint speaking the same protocol.
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    /// Key from `OPENAI_API_KEY`; `OPENAI_BASE_URL` overrides the endpoint.
    pub fn from_env(timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Ok(Self {
            api_key: api_key("OPENAI_API_KEY")?,
            model: Self::DEFAULT_MODEL.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: http_client(timeout)?,
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait::async_trait]
impl TextGenerator for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.text,
                },
            ],
            stop: &options.stop_sequences,
        };
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(network)?;
        if !resp.status().is_success() {
            return Err(read_error(resp).await);
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".into()))
    }
}

// ── Offline ──

/// Writes grammar-conforming text straight from the prompt frame.
///
/// Every ticket it mentions is stated with its bound status and every
/// speaker is a bound participant, so its output always validates.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateGenerator;

#[async_trait::async_trait]
impl TextGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        _options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        Ok(match &prompt.frame.shape {
            Shape::Transcript { .. } => template_transcript(&prompt.frame),
            Shape::Email { .. } => template_email(&prompt.frame),
        })
    }
}

fn status_line(t: &TicketLine) -> String {
    match t.status {
        TicketStatus::Blocked => format!("{} is {} for now. That's {}.", t.id, t.status.label(), t.title),
        s if s.is_terminal() => format!("{} is {}. {} shipped cleanly.", t.id, s.label(), t.title),
        s => format!("{} is {}. Still on {}.", t.id, s.label(), t.title),
    }
}

fn template_transcript(frame: &Frame) -> String {
    let Shape::Transcript { turns, phases } = &frame.shape else {
        return String::new();
    };
    let speakers: Vec<&str> = frame.participants.iter().map(|p| p.name.as_str()).collect();
    if speakers.is_empty() {
        return String::new();
    }

    let mut lines: Vec<(usize, String)> = Vec::new();
    let host = 0;
    lines.push((
        host,
        format!("Let's get started with the {}.", frame.kind.title()),
    ));
    if let Some(sprint) = &frame.sprint {
        lines.push((
            host,
            format!("{} runs through {}. Goal: {}.", sprint.name, sprint.end.date(), sprint.goal),
        ));
    }
    for phase in phases.iter() {
        lines.push((host, format!("Next up: {phase}.")));
        if lines.len() as u32 >= turns.max {
            break;
        }
    }
    for (i, t) in frame.tickets.iter().enumerate() {
        let who = t
            .assignee
            .as_deref()
            .and_then(|a| speakers.iter().position(|s| *s == a))
            .unwrap_or((i + 1) % speakers.len());
        lines.push((who, status_line(t)));
    }
    let fillers = [
        "Sounds good.",
        "Thanks, that helps.",
        "Nothing else from me.",
        "Let's sync offline on the details.",
    ];
    let mut k = 0;
    while (lines.len() as u32) < turns.min {
        lines.push(((k + 1) % speakers.len(), fillers[k % fillers.len()].to_string()));
        k += 1;
    }
    lines.truncate(turns.max as usize);

    lines
        .iter()
        .enumerate()
        .map(|(i, (who, text))| {
            let secs = i as u32 * 40;
            format!("[{:02}:{:02}] {}: {}", secs / 60, secs % 60, speakers[*who], text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn template_email(frame: &Frame) -> String {
    let Shape::Email {
        index,
        sender,
        recipients,
        subject,
        ..
    } = &frame.shape
    else {
        return String::new();
    };

    let mut body: Vec<String> = vec!["Hi all,".into(), String::new()];
    if *index == 0 {
        match frame.kind {
            ScenarioKind::IncidentEmail => {
                body.push("We are seeing a production issue and I'm on it.".into());
            }
            ScenarioKind::ReviewEmail => {
                body.push("I'd appreciate a review when you have a moment.".into());
            }
            ScenarioKind::ReleaseEmail => {
                let version = frame.fix_version.as_deref().unwrap_or("the next release");
                body.push(format!("Release {version} is ready. Included:"));
            }
            _ => body.push(format!("Notes from the {}.", frame.kind.title())),
        }
        for t in &frame.tickets {
            body.push(format!("- {}", status_line(t)));
        }
    } else {
        body.push("Thanks for the update, following along.".into());
        if let Some(t) = frame.tickets.first() {
            body.push(status_line(t));
        }
    }
    body.push(String::new());
    body.push(format!("Best,\n{sender}"));

    format!(
        "From: {sender}\nTo: {}\nDate: {}\nSubject: {subject}\n\n{}",
        recipients.join(", "),
        rfc3339(frame.timestamp),
        body.join("\n")
    )
}

// ── Scripted ──

type Script = VecDeque<Result<String, ProviderError>>;

/// Replays canned responses, per event first and then from a shared queue.
///
/// When both are exhausted it defers to the fallback generator, or fails
/// with an invalid-response error.
#[derive(Default)]
pub struct ScriptedGenerator {
    per_event: Mutex<HashMap<String, Script>>,
    shared: Mutex<Script>,
    calls: Mutex<Vec<String>>,
    fallback: Option<Arc<dyn TextGenerator>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn TextGenerator>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn push(&self, response: impl Into<String>) {
        self.shared.lock().unwrap().push_back(Ok(response.into()));
    }

    pub fn push_error(&self, err: ProviderError) {
        self.shared.lock().unwrap().push_back(Err(err));
    }

    pub fn push_for(&self, event_id: &str, response: impl Into<String>) {
        self.per_event
            .lock()
            .unwrap()
            .entry(event_id.to_string())
            .or_default()
            .push_back(Ok(response.into()));
    }

    pub fn push_error_for(&self, event_id: &str, err: ProviderError) {
        self.per_event
            .lock()
            .unwrap()
            .entry(event_id.to_string())
            .or_default()
            .push_back(Err(err));
    }

    /// Event ids of every call so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, event_id: &str) -> Option<Result<String, ProviderError>> {
        if let Some(step) = self
            .per_event
            .lock()
            .unwrap()
            .get_mut(event_id)
            .and_then(VecDeque::pop_front)
        {
            return Some(step);
        }
        self.shared.lock().unwrap().pop_front()
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let event_id = prompt.frame.event_id.as_str();
        self.calls.lock().unwrap().push(event_id.to_string());
        match self.next(event_id) {
            Some(step) => step,
            None => match &self.fallback {
                Some(inner) => inner.complete(prompt, options).await,
                None => Err(ProviderError::InvalidResponse(format!(
                    "script exhausted for {event_id}"
                ))),
            },
        }
    }
}
