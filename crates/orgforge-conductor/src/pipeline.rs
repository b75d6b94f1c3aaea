use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use orgforge_core::config::RunConfig;
use orgforge_core::hash::graph_fingerprint;
use orgforge_core::{Artifact, CompanyGraph, RunContext, ScenarioEvent};
use orgforge_graph::build_company_graph;
use orgforge_narrative::{NarrativeEngine, TextGenerator};
use orgforge_scenario::{plan_scenarios, ScenarioPlan};
use orgforge_validate::{ValidationResult, Validator};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::report::RunReport;
use crate::runner::event_log::{now_rfc3339, Event, EventLogger};
use crate::runner::generate::generate_all;
use crate::sink::Dataset;
use crate::state::machine::{EventStatus, RunState};

/// The graph and plan for a config, before any text is generated.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub graph: CompanyGraph,
    pub plan: ScenarioPlan,
    pub fingerprint: String,
}

/// Build the graph and plan every event. Deterministic for a config.
pub fn prepare(cfg: &RunConfig) -> Result<Prepared> {
    let mut ctx = RunContext::new(cfg.seed, cfg.project_key.clone());
    let mut graph = build_company_graph(cfg, &mut ctx).context("building company graph")?;
    let plan = plan_scenarios(cfg, &mut graph, &mut ctx).context("planning scenarios")?;
    let fingerprint = graph_fingerprint(&graph).context("fingerprinting company graph")?;
    info!(
        people = graph.org.people.len(),
        teams = graph.org.teams.len(),
        tickets = graph.work.tickets.len(),
        events = plan.events.len(),
        skipped = plan.skipped(),
        "graph built and scenarios planned"
    );
    Ok(Prepared {
        graph,
        plan,
        fingerprint,
    })
}

/// Full run: graph, plan, then concurrent generation with validation.
///
/// Events that fail are reported, never fatal. With `log_dir` set, the run
/// log goes to `{log_dir}/events.jsonl`.
pub async fn run(
    cfg: &RunConfig,
    generator: Arc<dyn TextGenerator>,
    log_dir: Option<&Path>,
    cancel: CancellationToken,
) -> Result<Dataset> {
    let started_at = now_rfc3339();
    let clock = Instant::now();
    let run_id = ulid::Ulid::new().to_string();
    let Prepared {
        graph,
        plan,
        fingerprint,
    } = prepare(cfg)?;

    let mut log = match log_dir {
        Some(dir) => EventLogger::new(dir),
        None => EventLogger::disabled(),
    };
    log.record(Event::RunStart {
        run_id: run_id.clone(),
        seed: cfg.seed,
        generator: generator.name().to_string(),
        requested: plan.requested,
        planned: plan.events.len(),
        fingerprint: fingerprint.clone(),
    });
    if !plan.deficits.is_empty() {
        log.record(Event::ScenarioDeficit {
            deficits: plan.deficits.clone(),
        });
    }

    let engine = Arc::new(NarrativeEngine::new(
        generator,
        cfg.generation.clone(),
        cfg.seed,
    ));
    let generator_name = engine.generator_name().to_string();
    info!(run = %run_id, generator = %generator_name, events = plan.events.len(), "generating");

    let graph = Arc::new(graph);
    let state = RunState::from_events(&run_id, &plan.events);
    let (state, mut log) = generate_all(
        Arc::clone(&graph),
        plan.events.clone(),
        engine,
        state,
        log,
        cfg.retry_budget,
        cfg.generation.concurrency,
        cancel,
    )
    .await?;

    let report = RunReport::new(
        &plan,
        &state,
        cfg.seed,
        &generator_name,
        &fingerprint,
        started_at,
        now_rfc3339(),
    );
    log.record(Event::RunCompleted {
        succeeded: report.succeeded,
        failed: report.failed.len(),
        skipped: report.skipped,
        duration_ms: clock.elapsed().as_millis() as u64,
    });
    if report.is_complete() {
        info!(run = %run_id, "{}", report.summary());
    } else {
        warn!(run = %run_id, "{}", report.summary());
    }
    debug_assert_eq!(
        state.count(EventStatus::Validated) + report.failed.len(),
        plan.events.len()
    );

    let graph = Arc::try_unwrap(graph).unwrap_or_else(|shared| (*shared).clone());
    Ok(Dataset {
        config: cfg.clone(),
        graph,
        events: plan.events,
        artifacts: state.into_artifacts(),
        report,
    })
}

/// An artifact that no longer validates, or that has no event.
#[derive(Debug, Clone, PartialEq)]
pub struct Revalidation {
    pub artifact_id: String,
    pub event_id: String,
    pub messages: Vec<String>,
}

/// Validate every artifact again against its event. Empty means clean.
pub fn revalidate(
    graph: &CompanyGraph,
    events: &[ScenarioEvent],
    artifacts: &[Artifact],
) -> Vec<Revalidation> {
    let validator = Validator::new(graph);
    artifacts
        .iter()
        .filter_map(|artifact| {
            let messages = match events.iter().find(|e| e.id == artifact.event_id) {
                Some(event) => {
                    let result: ValidationResult = validator.validate(artifact, event);
                    if result.is_ok() {
                        return None;
                    }
                    result.messages()
                }
                None => vec![format!("no event {} in the dataset", artifact.event_id)],
            };
            Some(Revalidation {
                artifact_id: artifact.id.clone(),
                event_id: artifact.event_id.clone(),
                messages,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgforge_core::config::parse_config;
    use orgforge_core::ScenarioKind;
    use orgforge_narrative::{ScriptedGenerator, TemplateGenerator};

    fn config(mix: &str, extra: &str) -> RunConfig {
        parse_config(&format!(
            r#"
seed: 3
team_count: 3
team_size_range: "4-6"
role_weights: {{ engineer: 5, senior_engineer: 2, tech_lead: 1, manager: 1, qa: 1 }}
epic_count: 2
story_range: "2-4"
task_range: "1-3"
fixversion_count: 2
scenario_mix: {mix}
{extra}
"#
        ))
        .unwrap()
    }

    #[test]
    fn prepare_is_deterministic() {
        let cfg = config("{ StandupMeeting: 2 }", "bug_rate: 0.2");
        let a = prepare(&cfg).unwrap();
        let b = prepare(&cfg).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.plan, b.plan);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[tokio::test]
    async fn two_standups_from_template() {
        let cfg = config(
            "{ StandupMeeting: 2 }",
            "bug_rate: 0.2\nstatus_weights: { InProgress: 1.0 }",
        );
        let ds = run(&cfg, Arc::new(TemplateGenerator), None, CancellationToken::new())
            .await
            .unwrap();

        assert!((12..=18).contains(&ds.graph.org.people.len()));
        assert_eq!(ds.report.requested, 2);
        assert_eq!(ds.report.succeeded, 2);
        assert!(ds.report.is_complete());
        assert_eq!(ds.artifacts.len(), 2);
        for artifact in &ds.artifacts {
            let event = ds.event(&artifact.event_id).unwrap();
            assert_eq!(event.kind, ScenarioKind::StandupMeeting);
            let team = ds.graph.team(event.team.as_deref().unwrap()).unwrap();
            for speaker in artifact.participant_names() {
                let person = ds.graph.org.person_by_name(speaker).unwrap();
                assert_eq!(person.team_id, team.id);
            }
        }
        assert!(revalidate(&ds.graph, &ds.events, &ds.artifacts).is_empty());
    }

    #[tokio::test]
    async fn incident_without_bugs_is_skipped_and_run_completes() {
        let cfg = config(
            "{ IncidentEmail: 1, StandupMeeting: 1 }",
            "bug_rate: 0.0\nstatus_weights: { InProgress: 1.0 }",
        );
        let dir = tempfile::tempdir().unwrap();
        let ds = run(
            &cfg,
            Arc::new(TemplateGenerator),
            Some(dir.path()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(ds.report.requested, 2);
        assert_eq!(ds.report.skipped, 1);
        assert_eq!(ds.report.deficits.get(&ScenarioKind::IncidentEmail), Some(&1));
        assert_eq!(ds.report.succeeded, 1);
        assert!(ds.report.failed.is_empty());

        let log = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        let first: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
        assert_eq!(first["type"], "run_start");
        assert!(log.contains(r#""type":"scenario_deficit""#));
        assert!(log.lines().last().unwrap().contains(r#""type":"run_completed""#));
    }

    #[tokio::test]
    async fn malformed_event_fails_alone() {
        let cfg = config(
            "{ StandupMeeting: 2 }",
            "bug_rate: 0.2\nstatus_weights: { InProgress: 1.0 }\nretry_budget: 3\ngeneration: { generation_retries: 3 }",
        );
        let script = ScriptedGenerator::new().with_fallback(Arc::new(TemplateGenerator));
        for _ in 0..4 {
            script.push_for("EVT-1", "no turns here");
        }
        let ds = run(&cfg, Arc::new(script), None, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ds.report.succeeded, 1);
        assert_eq!(ds.report.failed.len(), 1);
        assert_eq!(ds.report.failed[0].event_id, "EVT-1");
        assert_eq!(ds.artifacts.len(), 1);
        assert_eq!(ds.artifacts[0].event_id, "EVT-2");
    }

    #[test]
    fn revalidate_flags_tampered_and_orphaned_artifacts() {
        use orgforge_core::{fixtures, ArtifactBody, Transcript, Utterance};
        let g = fixtures::company();
        let event = fixtures::standup(&g);
        let turn = |speaker: &str, offset_sec, text: &str| Utterance {
            speaker: speaker.into(),
            offset_sec,
            text: text.into(),
        };
        let good = Artifact {
            id: "a-1".into(),
            event_id: event.id.clone(),
            attempts: 1,
            body: ArtifactBody::Transcript(Transcript {
                title: "Platform Daily Standup".into(),
                start: event.timestamp,
                turns: vec![
                    turn("Mary Smith", 0, "PROJ-2 is In Progress."),
                    turn("John Lee", 30, "Thanks."),
                ],
            }),
        };
        let mut tampered = good.clone();
        tampered.id = "a-2".into();
        if let ArtifactBody::Transcript(t) = &mut tampered.body {
            t.turns[1].text = "PROJ-2 is Done already.".into();
        }
        let mut orphan = good.clone();
        orphan.id = "a-3".into();
        orphan.event_id = "EVT-99".into();

        let issues = revalidate(&g, &[event], &[good, tampered, orphan]);
        let ids: Vec<_> = issues.iter().map(|i| i.artifact_id.as_str()).collect();
        assert_eq!(ids, vec!["a-2", "a-3"]);
        assert!(issues[0].messages[0].starts_with("status_claims:"));
        assert_eq!(issues[1].messages, vec!["no event EVT-99 in the dataset"]);
    }
}
