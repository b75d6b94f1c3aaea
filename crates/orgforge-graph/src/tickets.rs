use orgforge_core::config::{EpicAssignment, RunConfig};
use orgforge_core::{
    Component, ConfigurationError, IdKind, Organization, Priority, RunContext, Ticket, TicketGraph,
    TicketId, TicketKind, TicketStatus, STORY_POINTS,
};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::fixversion::plan_fix_versions;
use crate::progress::apply_progress;
use crate::sprints::plan_sprints;
use crate::BuildError;

const EPIC_THEMES: &[&str] = &[
    "Self-serve onboarding",
    "Payment retries",
    "Audit logging",
    "Search relevance",
    "Mobile offline mode",
    "Usage-based billing",
    "Single sign-on",
    "Report exports",
    "Notification preferences",
    "Data retention controls",
    "Latency reduction",
    "Admin console refresh",
];

const STORY_FEATURES: &[&str] = &[
    "account settings page",
    "invoice history view",
    "password reset flow",
    "bulk import wizard",
    "activity feed",
    "saved filters",
    "webhook delivery",
    "role permissions editor",
    "usage dashboard",
    "email digest",
    "session timeout handling",
    "API rate limiting",
];

const TASK_VERBS: &[&str] = &[
    "Implement",
    "Add integration tests for",
    "Write migration for",
    "Wire up metrics for",
    "Refactor",
    "Document",
    "Add feature flag for",
];

const SUBTASK_STEPS: &[&str] = &[
    "Update schema",
    "Add error handling",
    "Review copy",
    "Clean up logging",
    "Add unit coverage",
    "Tune query",
];

const BUG_SYMPTOMS: &[&str] = &[
    "Timeout when loading",
    "Wrong totals shown in",
    "Crash on empty input in",
    "Stale cache served by",
    "Duplicate entries in",
    "Slow response from",
];

/// Build fix versions, the epic/story/task/subtask/bug hierarchy, the
/// status history of every ticket, and each team's sprints.
pub fn build_ticket_graph(
    cfg: &RunConfig,
    org: &Organization,
    ctx: &mut RunContext,
) -> Result<TicketGraph, BuildError> {
    cfg.check_tickets()?;
    if org.teams.is_empty() {
        return Err(ConfigurationError::invalid("team_count", "organization has no teams").into());
    }

    let fix_versions = plan_fix_versions(
        cfg.fixversion_count,
        cfg.fixversion_cadence_days,
        cfg.start_date,
        ctx,
    );

    let mut builder = Builder {
        org,
        ctx: &mut *ctx,
        tickets: Vec::new(),
    };
    let team_weights = match cfg.epic_assignment {
        EpicAssignment::RoundRobin => None,
        EpicAssignment::Weighted => Some(
            WeightedIndex::new(org.teams.iter().map(|t| t.members.len()))
                .map_err(|e| ConfigurationError::invalid("epic_assignment", e.to_string()))?,
        ),
    };

    for e in 0..cfg.epic_count as usize {
        let team = match &team_weights {
            None => e % org.teams.len(),
            Some(dist) => dist.sample(builder.ctx.rng()),
        };
        builder.epic(cfg, team);
    }

    let mut work = TicketGraph {
        project_key: builder.ctx.project_key().to_string(),
        fix_versions,
        sprints: Vec::new(),
        tickets: builder.tickets,
        history: Vec::new(),
    };
    assign_fix_versions(&mut work, ctx);
    apply_progress(&mut work, &cfg.status_weights, cfg.start_date, ctx)?;
    plan_sprints(
        &mut work,
        org,
        cfg.sprint_count,
        cfg.sprint_duration_days,
        cfg.start_date,
        ctx,
    );

    info!(
        tickets = work.tickets.len(),
        fix_versions = work.fix_versions.len(),
        sprints = work.sprints.len(),
        transitions = work.history.len(),
        "ticket graph built"
    );
    Ok(work)
}

struct Builder<'a> {
    org: &'a Organization,
    ctx: &'a mut RunContext,
    tickets: Vec<Ticket>,
}

impl Builder<'_> {
    fn epic(&mut self, cfg: &RunConfig, team: usize) {
        let component = *Component::ALL.choose(self.ctx.rng()).unwrap_or(&Component::Backend);
        let theme = EPIC_THEMES.choose(self.ctx.rng()).copied().unwrap_or("Platform work");
        let epic = self.push(
            TicketKind::Epic,
            format!("{theme} ({})", component.label()),
            team,
            None,
            component,
        );

        for _ in 0..cfg.story_range.sample(self.ctx.rng()) {
            let feature = STORY_FEATURES
                .choose(self.ctx.rng())
                .copied()
                .unwrap_or("feature");
            let story = self.push(
                TicketKind::Story,
                format!("Ship the {feature}"),
                team,
                Some(&epic),
                component,
            );

            let mut siblings: Vec<TicketId> = Vec::new();
            for _ in 0..cfg.task_range.sample(self.ctx.rng()) {
                let verb = TASK_VERBS.choose(self.ctx.rng()).copied().unwrap_or("Implement");
                let task = self.push(
                    TicketKind::Task,
                    format!("{verb} {feature}"),
                    team,
                    Some(&story),
                    component,
                );
                if !siblings.is_empty() && self.ctx.rng().gen_bool(cfg.dependency_rate) {
                    if let Some(dep) = siblings.choose(self.ctx.rng()).cloned() {
                        self.last_mut().depends_on.push(dep);
                    }
                }
                for _ in 0..cfg.subtask_range.sample(self.ctx.rng()) {
                    let step = SUBTASK_STEPS.choose(self.ctx.rng()).copied().unwrap_or("Follow up");
                    self.push(
                        TicketKind::Subtask,
                        format!("{step} for {feature}"),
                        team,
                        Some(&task),
                        component,
                    );
                }
                siblings.push(task);
            }

            if self.ctx.rng().gen_bool(cfg.bug_rate) {
                self.bug(&epic, Some((&story, feature)), team, component);
            }
        }

        if self.ctx.rng().gen_bool(cfg.bug_rate) {
            self.bug(&epic, None, team, component);
        }
    }

    /// Bugs always hang off the epic; a story they were filed against goes in `related`.
    fn bug(
        &mut self,
        epic: &str,
        against: Option<(&TicketId, &str)>,
        team: usize,
        component: Component,
    ) {
        let symptom = BUG_SYMPTOMS.choose(self.ctx.rng()).copied().unwrap_or("Failure in");
        let subject = against.map_or(component.label().to_lowercase(), |(_, f)| f.to_string());
        let epic = epic.to_string();
        self.push(
            TicketKind::Bug,
            format!("{symptom} {subject}"),
            team,
            Some(&epic),
            component,
        );
        if let Some((story, _)) = against {
            self.last_mut().related.push(story.clone());
        }
    }

    fn push(
        &mut self,
        kind: TicketKind,
        title: String,
        team: usize,
        parent: Option<&TicketId>,
        component: Component,
    ) -> TicketId {
        let team = &self.org.teams[team];
        let id = self.ctx.reserve_id(IdKind::Ticket);
        let assignee = team.members.choose(self.ctx.rng()).cloned();
        let priority = if kind == TicketKind::Bug {
            *Priority::ALL[..3].choose(self.ctx.rng()).unwrap_or(&Priority::High)
        } else {
            *Priority::ALL.choose(self.ctx.rng()).unwrap_or(&Priority::Medium)
        };
        let story_points = if kind.is_estimated() {
            STORY_POINTS.choose(self.ctx.rng()).copied()
        } else {
            None
        };
        self.tickets.push(Ticket {
            id: id.clone(),
            kind,
            title,
            status: TicketStatus::INITIAL,
            assignee,
            team_id: team.id.clone(),
            parent: parent.cloned(),
            fix_version: None,
            sprint: None,
            priority,
            component,
            story_points,
            related: Vec::new(),
            depends_on: Vec::new(),
            blocking_reason: None,
        });
        id
    }

    fn last_mut(&mut self) -> &mut Ticket {
        let last = self.tickets.len() - 1;
        &mut self.tickets[last]
    }
}

/// Bigger tickets lean toward later releases; subtasks follow their parent.
fn assign_fix_versions(work: &mut TicketGraph, ctx: &mut RunContext) {
    let versions: Vec<String> = work.fix_versions.iter().map(|v| v.id.clone()).collect();
    if versions.is_empty() {
        return;
    }
    for i in 0..work.tickets.len() {
        let ticket = &work.tickets[i];
        let version = if ticket.kind == TicketKind::Subtask {
            ticket
                .parent
                .as_deref()
                .and_then(|p| work.ticket(p))
                .and_then(|p| p.fix_version.clone())
        } else {
            let descendants = work.descendants_of(&ticket.id).len() as f64;
            let weights = (0..versions.len()).map(|v| 1.0 + descendants * v as f64);
            WeightedIndex::new(weights)
                .ok()
                .map(|dist| versions[dist.sample(ctx.rng())].clone())
        };
        work.tickets[i].fix_version = version;
    }
    debug!(versions = versions.len(), "fix versions assigned");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::org::build_organization;
    use orgforge_core::config::{parse_config, Range};
    use orgforge_core::CompanyGraph;

    fn config() -> RunConfig {
        parse_config(
            r#"
team_count: 3
team_size_range: "4-6"
role_weights: { engineer: 5, senior_engineer: 2, manager: 1, qa: 1 }
epic_count: 2
story_range: "2-4"
task_range: "1-3"
bug_rate: 0.2
fixversion_count: 3
scenario_mix: { StandupMeeting: 2 }
"#,
        )
        .unwrap()
    }

    fn with(edit: impl FnOnce(&mut RunConfig)) -> RunConfig {
        let mut cfg = config();
        edit(&mut cfg);
        cfg
    }

    fn build(cfg: &RunConfig, seed: u64) -> CompanyGraph {
        let mut ctx = RunContext::new(seed, cfg.project_key.clone());
        let org = build_organization(cfg, &mut ctx).unwrap();
        let work = build_ticket_graph(cfg, &org, &mut ctx).unwrap();
        CompanyGraph::new(cfg.start_date, org, work)
    }

    #[test]
    fn two_epics_with_two_to_four_stories() {
        let cfg = config();
        for seed in 0..10 {
            let graph = build(&cfg, seed);
            let epics: Vec<_> = graph
                .work
                .tickets
                .iter()
                .filter(|t| t.kind == TicketKind::Epic)
                .collect();
            assert_eq!(epics.len(), 2);
            for epic in epics {
                let stories = graph
                    .work
                    .children_of(&epic.id)
                    .filter(|t| t.kind == TicketKind::Story)
                    .count();
                assert!((2..=4).contains(&stories), "seed {seed}: {stories} stories");
            }
            graph.check_invariants().unwrap();
        }
    }

    #[test]
    fn ids_use_project_key_in_order() {
        let graph = build(&with(|c| c.project_key = "ACME".into()), 3);
        for (i, t) in graph.work.tickets.iter().enumerate() {
            assert_eq!(t.id, format!("ACME-{}", i + 1));
        }
    }

    #[test]
    fn bugs_hang_off_epics() {
        let graph = build(&with(|c| c.bug_rate = 1.0), 4);
        let bugs: Vec<_> = graph
            .work
            .tickets
            .iter()
            .filter(|t| t.kind == TicketKind::Bug)
            .collect();
        let stories = graph
            .work
            .tickets
            .iter()
            .filter(|t| t.kind == TicketKind::Story)
            .count();
        // one per story plus one per epic
        assert_eq!(bugs.len(), stories + 2);
        for bug in &bugs {
            let parent = graph.ticket(bug.parent.as_deref().unwrap()).unwrap();
            assert_eq!(parent.kind, TicketKind::Epic);
            for related in &bug.related {
                assert_eq!(graph.ticket(related).unwrap().kind, TicketKind::Story);
            }
        }
        assert_eq!(bugs.iter().filter(|b| !b.related.is_empty()).count(), stories);
    }

    #[test]
    fn no_bugs_at_zero_rate() {
        let graph = build(&with(|c| c.bug_rate = 0.0), 4);
        assert!(graph.work.tickets.iter().all(|t| t.kind != TicketKind::Bug));
    }

    #[test]
    fn dependencies_point_backward_to_sibling_tasks() {
        let graph = build(
            &with(|c| {
                c.dependency_rate = 1.0;
                c.task_range = Range::new(3, 3);
            }),
            8,
        );
        let mut seen = 0;
        for t in &graph.work.tickets {
            for dep in &t.depends_on {
                let d = graph.ticket(dep).unwrap();
                assert_eq!(t.kind, TicketKind::Task);
                assert_eq!(d.kind, TicketKind::Task);
                assert_eq!(d.parent, t.parent);
                seen += 1;
            }
        }
        assert!(seen > 0);
        graph.check_invariants().unwrap();
    }

    #[test]
    fn subtasks_share_task_fix_version() {
        let graph = build(&with(|c| c.subtask_range = Range::new(1, 2)), 6);
        for t in graph.work.tickets.iter().filter(|t| t.kind == TicketKind::Subtask) {
            let parent = graph.ticket(t.parent.as_deref().unwrap()).unwrap();
            assert_eq!(parent.kind, TicketKind::Task);
            assert_eq!(t.fix_version, parent.fix_version);
            assert!(t.fix_version.is_some());
        }
    }

    fn version_index(graph: &CompanyGraph, ticket: &Ticket) -> usize {
        let id = ticket.fix_version.as_deref().unwrap();
        graph.work.fix_versions.iter().position(|v| v.id == id).unwrap()
    }

    #[test]
    fn bigger_tickets_lean_to_later_versions() {
        let cfg = with(|c| {
            c.story_range = Range::new(3, 4);
            c.task_range = Range::new(2, 3);
            c.subtask_range = Range::new(0, 1);
        });
        let (mut epics, mut leaves) = (Vec::new(), Vec::new());
        for seed in 0..40 {
            let graph = build(&cfg, seed);
            for t in &graph.work.tickets {
                if t.kind == TicketKind::Epic {
                    epics.push(version_index(&graph, t) as f64);
                } else if t.kind != TicketKind::Subtask && graph.work.descendants_of(&t.id).is_empty()
                {
                    leaves.push(version_index(&graph, t) as f64);
                }
            }
        }
        let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
        // leaves pick uniformly over three versions, so they average near 1.0
        assert!((mean(&leaves) - 1.0).abs() < 0.15, "leaves {}", mean(&leaves));
        assert!(
            mean(&epics) > mean(&leaves) + 0.3,
            "epics {} vs leaves {}",
            mean(&epics),
            mean(&leaves)
        );
    }

    #[test]
    fn single_version_goes_on_every_ticket() {
        let graph = build(
            &with(|c| {
                c.fixversion_count = 1;
                c.subtask_range = Range::new(1, 2);
            }),
            5,
        );
        assert_eq!(graph.work.fix_versions.len(), 1);
        for t in &graph.work.tickets {
            assert_eq!(t.fix_version.as_deref(), Some("VER-1"), "{}", t.id);
        }
    }

    #[test]
    fn assignee_from_owning_team() {
        let graph = build(&config(), 2);
        for t in &graph.work.tickets {
            let team = graph.team(&t.team_id).unwrap();
            assert!(team.members.contains(t.assignee.as_ref().unwrap()));
            assert_eq!(t.story_points.is_some(), t.kind.is_estimated());
        }
    }

    #[test]
    fn round_robin_epic_owners() {
        let graph = build(&with(|c| c.epic_count = 3), 1);
        let owners: Vec<_> = graph
            .work
            .tickets
            .iter()
            .filter(|t| t.kind == TicketKind::Epic)
            .map(|t| t.team_id.as_str())
            .collect();
        assert_eq!(owners, vec!["TEAM-1", "TEAM-2", "TEAM-3"]);
    }

    #[test]
    fn weighted_assignment_is_valid() {
        let graph = build(
            &with(|c| {
                c.epic_assignment = EpicAssignment::Weighted;
                c.epic_count = 6;
            }),
            1,
        );
        graph.check_invariants().unwrap();
    }

    #[test]
    fn deterministic_for_seed() {
        let cfg = config();
        assert_eq!(build(&cfg, 77), build(&cfg, 77));
        assert_ne!(build(&cfg, 77), build(&cfg, 78));
    }

    #[test]
    fn zero_epics_rejected() {
        let mut cfg = config();
        cfg.epic_count = 0;
        let mut ctx = RunContext::new(0, "PROJ");
        let org = build_organization(&cfg, &mut ctx).unwrap();
        assert!(matches!(
            build_ticket_graph(&cfg, &org, &mut ctx),
            Err(BuildError::Config(_))
        ));
    }
}
