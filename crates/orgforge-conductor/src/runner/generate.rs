use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use orgforge_core::{CompanyGraph, ConsistencyError, NarrativeError, ScenarioEvent};
use orgforge_narrative::{Feedback, GraphView, NarrativeEngine};
use orgforge_validate::{Matchers, Validator};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::budget::RetryBudget;
use crate::runner::event_log::{now_rfc3339, Event, EventLogger};
use crate::state::machine::{
    transition, EventStatus, EventUpdate, FailureInfo, FailureReason, RunState,
};

/// Run state and log, shared by every event task.
struct Shared {
    state: RunState,
    log: EventLogger,
}

/// Generate every planned event concurrently.
///
/// Each event loops generate → validate, feeding violations back into the
/// next prompt, until it validates or `retry_budget` retries are spent.
/// One event failing never stops the others. The graph is only read.
#[allow(clippy::too_many_arguments)]
pub async fn generate_all(
    graph: Arc<CompanyGraph>,
    events: Vec<ScenarioEvent>,
    engine: Arc<NarrativeEngine>,
    state: RunState,
    log: EventLogger,
    retry_budget: u32,
    concurrency: usize,
    cancel: CancellationToken,
) -> Result<(RunState, EventLogger)> {
    let shared = Arc::new(Mutex::new(Shared { state, log }));
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let matchers = Arc::new(Matchers::new(&graph));

    let mut handles = Vec::with_capacity(events.len());
    for event in events {
        let task = EventTask {
            graph: Arc::clone(&graph),
            matchers: Arc::clone(&matchers),
            engine: Arc::clone(&engine),
            shared: Arc::clone(&shared),
            retry_budget,
            cancel: cancel.clone(),
        };
        let permits = Arc::clone(&permits);
        handles.push(tokio::spawn(async move {
            let id = event.id.clone();
            let permit = tokio::select! {
                biased;
                _ = task.cancel.cancelled() => None,
                p = permits.acquire_owned() => p.ok(),
            };
            let outcome = match permit {
                Some(_permit) => task.run(&event).await,
                None => {
                    task.fail(&id, 0, Instant::now(), FailureReason::Cancelled, "cancelled".into())
                        .await
                }
            };
            if let Err(e) = &outcome {
                warn!(event = %id, error = %e, "event task error");
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "event task aborted");
        }
    }

    let Shared { mut state, log } = Arc::try_unwrap(shared)
        .map_err(|_| anyhow::anyhow!("event tasks still hold the run state"))?
        .into_inner();

    // Anything a panicked task left behind.
    let stranded: Vec<String> = state
        .events
        .iter()
        .filter(|e| !e.status.is_terminal())
        .map(|e| e.id.clone())
        .collect();
    for id in stranded {
        let event = state.get_event_mut(&id)?;
        event.status = EventStatus::Failed;
        event.error = Some(FailureInfo {
            reason: FailureReason::Provider,
            message: "event task aborted".into(),
            timestamp: now_rfc3339(),
        });
        state.version += 1;
    }

    Ok((state, log))
}

struct EventTask {
    graph: Arc<CompanyGraph>,
    matchers: Arc<Matchers>,
    engine: Arc<NarrativeEngine>,
    shared: Arc<Mutex<Shared>>,
    retry_budget: u32,
    cancel: CancellationToken,
}

impl EventTask {
    async fn run(&self, event: &ScenarioEvent) -> Result<()> {
        let started = Instant::now();
        let view = GraphView::new(&self.graph, event);
        let validator = Validator::with_matchers(&self.graph, Arc::clone(&self.matchers));
        let mut budget = RetryBudget::new(self.retry_budget);
        let mut feedback = Feedback::first();

        loop {
            let attempt = budget.attempt();
            if self.cancel.is_cancelled() {
                return self
                    .fail(&event.id, attempt - 1, started, FailureReason::Cancelled, "cancelled".into())
                    .await;
            }
            self.record(Event::AttemptStart {
                event_id: event.id.clone(),
                attempt,
            })
            .await;
            debug!(event = %event.id, kind = %event.kind, attempt, "generating");

            let artifact = match self
                .engine
                .generate(event, &view, &feedback, &self.cancel)
                .await
            {
                Ok(a) => a,
                Err(e) => {
                    return self
                        .fail(&event.id, attempt, started, reason_for(&e), e.to_string())
                        .await;
                }
            };

            let result = validator.validate(&artifact, event);
            let messages = result.messages();
            let mut guard = self.shared.lock().await;
            let shared = &mut *guard;
            transition(
                &mut shared.state,
                &event.id,
                EventStatus::Pending,
                EventStatus::Generated,
                Some(EventUpdate {
                    started_at: Some(now_rfc3339()),
                    attempts: Some(attempt),
                    artifact: Some(artifact),
                    ..Default::default()
                }),
            )?;

            if result.is_ok() {
                transition(
                    &mut shared.state,
                    &event.id,
                    EventStatus::Generated,
                    EventStatus::Validated,
                    Some(EventUpdate {
                        completed_at: Some(now_rfc3339()),
                        violations: Some(Vec::new()),
                        ..Default::default()
                    }),
                )?;
                shared.log.record(Event::EventValidated {
                    event_id: event.id.clone(),
                    attempt,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                info!(event = %event.id, kind = %event.kind, attempt, "artifact accepted");
                return Ok(());
            }

            transition(
                &mut shared.state,
                &event.id,
                EventStatus::Generated,
                EventStatus::Rejected,
                Some(EventUpdate {
                    violations: Some(messages.clone()),
                    ..Default::default()
                }),
            )?;
            shared.log.record(Event::ArtifactRejected {
                event_id: event.id.clone(),
                attempt,
                violations: messages.clone(),
            });

            if budget.is_exhausted() {
                let err = ConsistencyError {
                    event_id: event.id.clone(),
                    attempts: attempt,
                    violations: messages,
                };
                warn!(event = %event.id, attempts = attempt, "retry budget exhausted");
                finish_failed(
                    shared,
                    &event.id,
                    EventStatus::Rejected,
                    attempt,
                    started,
                    FailureReason::Inconsistent,
                    err.to_string(),
                )?;
                return Ok(());
            }

            debug!(
                event = %event.id,
                attempt,
                violations = messages.len(),
                remaining = budget.remaining(),
                "artifact rejected, retrying"
            );
            transition(
                &mut shared.state,
                &event.id,
                EventStatus::Rejected,
                EventStatus::Pending,
                None,
            )?;
            drop(guard);
            budget.record();
            feedback = Feedback::retry(budget.attempt(), messages);
        }
    }

    async fn record(&self, event: Event) {
        self.shared.lock().await.log.record(event);
    }

    /// Pending → Failed.
    async fn fail(
        &self,
        event_id: &str,
        attempts: u32,
        started: Instant,
        reason: FailureReason,
        message: String,
    ) -> Result<()> {
        let mut guard = self.shared.lock().await;
        warn!(event = %event_id, reason = ?reason, error = %message, "event failed");
        finish_failed(
            &mut guard,
            event_id,
            EventStatus::Pending,
            attempts,
            started,
            reason,
            message,
        )
    }
}

fn finish_failed(
    shared: &mut Shared,
    event_id: &str,
    from: EventStatus,
    attempts: u32,
    started: Instant,
    reason: FailureReason,
    message: String,
) -> Result<()> {
    let moved = transition(
        &mut shared.state,
        event_id,
        from,
        EventStatus::Failed,
        Some(EventUpdate {
            completed_at: Some(now_rfc3339()),
            attempts: Some(attempts),
            error: Some(FailureInfo {
                reason,
                message: message.clone(),
                timestamp: now_rfc3339(),
            }),
            ..Default::default()
        }),
    )?;
    if moved {
        shared.log.record(Event::EventFailed {
            event_id: event_id.to_string(),
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
            error: message,
        });
    }
    Ok(())
}

fn reason_for(err: &NarrativeError) -> FailureReason {
    if err.is_cancelled() {
        return FailureReason::Cancelled;
    }
    match err {
        NarrativeError::Generation { .. } => FailureReason::Malformed,
        _ => FailureReason::Provider,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgforge_core::config::{GenerationOptions, Range};
    use orgforge_core::{fixtures, ProviderError};
    use orgforge_narrative::{ScriptedGenerator, TemplateGenerator, TextGenerator};

    fn options() -> GenerationOptions {
        GenerationOptions {
            generation_retries: 3,
            provider_retries: 0,
            backoff_ms: 1,
            call_timeout_sec: 5,
            thread_length_range: Range::new(2, 2),
            transcript_turns_range: Range::new(2, 10),
            ..GenerationOptions::default()
        }
    }

    fn events(g: &CompanyGraph) -> Vec<ScenarioEvent> {
        vec![
            fixtures::standup(g),
            fixtures::incident(g),
            fixtures::release(g),
            fixtures::review(g),
        ]
    }

    async fn run_with(
        generator: Arc<dyn TextGenerator>,
        retry_budget: u32,
        cancel: CancellationToken,
    ) -> RunState {
        let g = Arc::new(fixtures::company());
        let evs = events(&g);
        let state = RunState::from_events("run-test", &evs);
        let engine = Arc::new(NarrativeEngine::new(generator, options(), 1));
        let (state, _) = generate_all(
            g,
            evs,
            engine,
            state,
            EventLogger::disabled(),
            retry_budget,
            2,
            cancel,
        )
        .await
        .unwrap();
        state
    }

    /// A standup transcript that names a ticket the event does not bind.
    const DRIFTED: &str = "[00:00] Mary Smith: PROJ-2 is In Progress.\n[00:30] John Lee: And PROJ-6 is Done.";

    #[tokio::test]
    async fn template_output_validates_everywhere() {
        let state = run_with(Arc::new(TemplateGenerator), 3, CancellationToken::new()).await;
        assert!(state.is_finished());
        assert_eq!(state.count(EventStatus::Validated), 4);
        assert!(state.events.iter().all(|e| e.attempts == 1));
        let ids: Vec<_> = state.artifacts().iter().map(|a| a.event_id.clone()).collect();
        assert_eq!(ids, vec!["EVT-1", "EVT-2", "EVT-3", "EVT-4"]);
    }

    #[tokio::test]
    async fn rejected_output_is_regenerated_with_feedback() {
        let script = ScriptedGenerator::new().with_fallback(Arc::new(TemplateGenerator));
        script.push_for("EVT-1", DRIFTED);
        let script = Arc::new(script);
        let state = run_with(script.clone(), 3, CancellationToken::new()).await;

        let e = state.get_event("EVT-1").unwrap();
        assert_eq!(e.status, EventStatus::Validated);
        assert_eq!(e.attempts, 2);
        assert!(e.violations.is_empty());
        assert_eq!(e.artifact.as_ref().unwrap().attempts, 2);
        assert_eq!(state.count(EventStatus::Validated), 4);
        assert_eq!(script.calls().iter().filter(|c| *c == "EVT-1").count(), 2);
    }

    #[tokio::test]
    async fn inconsistent_four_times_with_budget_three_fails_one_event() {
        let script = ScriptedGenerator::new().with_fallback(Arc::new(TemplateGenerator));
        for _ in 0..4 {
            script.push_for("EVT-1", DRIFTED);
        }
        let state = run_with(Arc::new(script), 3, CancellationToken::new()).await;

        let e = state.get_event("EVT-1").unwrap();
        assert_eq!(e.status, EventStatus::Failed);
        assert_eq!(e.attempts, 4);
        let err = e.error.as_ref().unwrap();
        assert_eq!(err.reason, FailureReason::Inconsistent);
        assert!(err.message.contains("PROJ-6"), "{}", err.message);
        assert_eq!(state.count(EventStatus::Validated), 3);
        assert_eq!(state.count(EventStatus::Failed), 1);
        assert!(state.artifacts().iter().all(|a| a.event_id != "EVT-1"));
    }

    #[tokio::test]
    async fn malformed_four_times_fails_only_that_event() {
        let script = ScriptedGenerator::new().with_fallback(Arc::new(TemplateGenerator));
        for _ in 0..4 {
            script.push_for("EVT-4", "this is not an email");
        }
        let state = run_with(Arc::new(script), 3, CancellationToken::new()).await;

        let e = state.get_event("EVT-4").unwrap();
        assert_eq!(e.status, EventStatus::Failed);
        assert_eq!(e.error.as_ref().unwrap().reason, FailureReason::Malformed);
        assert_eq!(state.count(EventStatus::Validated), 3);
    }

    #[tokio::test]
    async fn permanent_provider_error_fails_event() {
        let script = ScriptedGenerator::new().with_fallback(Arc::new(TemplateGenerator));
        script.push_error_for("EVT-3", ProviderError::Auth("bad key".into()));
        let state = run_with(Arc::new(script), 3, CancellationToken::new()).await;

        let e = state.get_event("EVT-3").unwrap();
        assert_eq!(e.status, EventStatus::Failed);
        assert_eq!(e.attempts, 1);
        assert_eq!(e.error.as_ref().unwrap().reason, FailureReason::Provider);
        assert_eq!(state.count(EventStatus::Validated), 3);
    }

    #[tokio::test]
    async fn cancelled_run_fails_unfinished_events() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let state = run_with(Arc::new(TemplateGenerator), 3, cancel).await;

        assert!(state.is_finished());
        assert_eq!(state.count(EventStatus::Failed), 4);
        for e in &state.events {
            let err = e.error.as_ref().unwrap();
            assert_eq!(err.reason, FailureReason::Cancelled);
            assert_eq!(err.message, "cancelled");
        }
    }

    #[tokio::test]
    async fn run_log_records_each_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let g = Arc::new(fixtures::company());
        let evs = vec![fixtures::standup(&g)];
        let script = ScriptedGenerator::new().with_fallback(Arc::new(TemplateGenerator));
        script.push_for("EVT-1", DRIFTED);
        let engine = Arc::new(NarrativeEngine::new(Arc::new(script), options(), 1));
        let state = RunState::from_events("run-test", &evs);
        generate_all(
            g,
            evs,
            engine,
            state,
            EventLogger::new(dir.path()),
            3,
            1,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let content = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        let types: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["type"].to_string())
            .collect();
        assert_eq!(
            types,
            vec![
                "\"attempt_start\"",
                "\"artifact_rejected\"",
                "\"attempt_start\"",
                "\"event_validated\""
            ]
        );
    }
}
