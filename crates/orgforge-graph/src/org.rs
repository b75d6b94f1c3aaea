use std::collections::BTreeMap;

use orgforge_core::config::RunConfig;
use orgforge_core::ids::email_for;
use orgforge_core::{elect_manager, ConfigurationError, IdKind, Organization, Person, Role, RunContext, Team};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Build the people and teams of the company.
pub fn build_organization(
    cfg: &RunConfig,
    ctx: &mut RunContext,
) -> Result<Organization, ConfigurationError> {
    cfg.check_org()?;

    let sizes = team_sizes(cfg, ctx);
    let headcount: u32 = sizes.iter().sum();
    let mut roles = apportion_roles(&cfg.role_weights, headcount);
    roles.shuffle(ctx.rng());

    let domain = cfg.email_domain();
    let mut people = Vec::with_capacity(headcount as usize);
    let mut teams = Vec::with_capacity(sizes.len());
    let mut dealt = roles.into_iter();

    for size in sizes {
        let team_id = ctx.reserve_id(IdKind::Team);
        let team_name = ctx.sample_team_name();
        let start = people.len();
        for _ in 0..size {
            let name = ctx.sample_name();
            people.push(Person {
                id: ctx.reserve_id(IdKind::Person),
                email: email_for(&name, &domain),
                name,
                role: dealt.next().unwrap_or(Role::Engineer),
                team_id: team_id.clone(),
            });
        }
        let members = &people[start..];
        let manager = elect_manager(members).unwrap_or_default();
        teams.push(Team {
            id: team_id,
            name: team_name,
            members: members.iter().map(|p| p.id.clone()).collect(),
            manager,
            parent: None,
        });
    }

    let units = cfg.business_units as usize;
    if units > 0 {
        let parents: Vec<String> = teams[..units].iter().map(|t| t.id.clone()).collect();
        for (i, team) in teams.iter_mut().skip(units).enumerate() {
            team.parent = Some(parents[i % units].clone());
        }
    }

    debug!(
        teams = teams.len(),
        people = people.len(),
        business_units = units,
        "organization built"
    );

    Ok(Organization {
        company_name: cfg.company_name.clone(),
        email_domain: domain,
        people,
        teams,
    })
}

/// Team sizes: sampled in range, or spread to hit `headcount` exactly.
fn team_sizes(cfg: &RunConfig, ctx: &mut RunContext) -> Vec<u32> {
    let range = cfg.team_size_range;
    let count = cfg.team_count as usize;
    match cfg.headcount {
        None => (0..count).map(|_| range.sample(ctx.rng())).collect(),
        Some(headcount) => {
            let mut sizes = vec![range.min; count];
            let mut remaining = headcount - range.min * cfg.team_count;
            while remaining > 0 {
                let open: Vec<usize> = (0..count).filter(|&i| sizes[i] < range.max).collect();
                // check_org guarantees room for everyone
                let Some(&slot) = open.get(ctx.rng().gen_range(0..open.len().max(1))) else {
                    break;
                };
                sizes[slot] += 1;
                remaining -= 1;
            }
            sizes
        }
    }
}

/// Largest-remainder apportionment of `total` seats across weighted roles.
///
/// Each role gets `floor(quota)` and the leftover seats go to the largest
/// fractional parts, so every count is within one of its exact quota.
pub fn apportion_roles(weights: &BTreeMap<Role, f64>, total: u32) -> Vec<Role> {
    let sum: f64 = weights.values().sum();
    if sum <= 0.0 || total == 0 {
        return Vec::new();
    }
    let mut seats: Vec<(Role, u32, f64)> = weights
        .iter()
        .map(|(&role, &w)| {
            let quota = w / sum * f64::from(total);
            (role, quota.floor() as u32, quota.fract())
        })
        .collect();
    let assigned: u32 = seats.iter().map(|s| s.1).sum();
    let mut order: Vec<usize> = (0..seats.len()).collect();
    order.sort_by(|&a, &b| seats[b].2.total_cmp(&seats[a].2).then(a.cmp(&b)));
    for &i in order.iter().take(total.saturating_sub(assigned) as usize) {
        seats[i].1 += 1;
    }
    seats
        .into_iter()
        .flat_map(|(role, n, _)| std::iter::repeat(role).take(n as usize))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgforge_core::config::{Range, ScenarioMix};
    use orgforge_core::ScenarioKind;
    use std::collections::HashSet;

    fn config() -> RunConfig {
        orgforge_core::config::parse_config(
            r#"
team_count: 3
team_size_range: "4-6"
role_weights: { engineer: 5, senior_engineer: 2, tech_lead: 1, manager: 1, qa: 1 }
epic_count: 2
story_range: "2-4"
task_range: "1-2"
bug_rate: 0.2
fixversion_count: 2
scenario_mix: { StandupMeeting: 2 }
"#,
        )
        .unwrap()
    }

    #[test]
    fn three_teams_of_four_to_six() {
        let cfg = config();
        let mut ctx = RunContext::new(11, "PROJ");
        let org = build_organization(&cfg, &mut ctx).unwrap();
        assert_eq!(org.teams.len(), 3);
        assert!((12..=18).contains(&org.people.len()));
        for team in &org.teams {
            assert!(Range::new(4, 6).contains(team.members.len() as u32));
            assert!(team.members.contains(&team.manager));
            for member in &team.members {
                assert_eq!(org.person(member).unwrap().team_id, team.id);
            }
        }
        let names: HashSet<_> = org.people.iter().map(|p| &p.name).collect();
        assert_eq!(names.len(), org.people.len());
        assert!(org.people.iter().all(|p| p.email.ends_with("@acmesoftware.com")));
    }

    #[test]
    fn manager_is_leadership_role_when_present() {
        let cfg = config();
        let mut ctx = RunContext::new(5, "PROJ");
        let org = build_organization(&cfg, &mut ctx).unwrap();
        for team in &org.teams {
            let has_lead = org
                .members_of(&team.id)
                .iter()
                .any(|p| p.role.leadership_rank().is_some());
            let manager = org.person(&team.manager).unwrap();
            assert_eq!(manager.role.leadership_rank().is_some(), has_lead);
        }
    }

    #[test]
    fn same_seed_same_org() {
        let cfg = config();
        let a = build_organization(&cfg, &mut RunContext::new(9, "PROJ")).unwrap();
        let b = build_organization(&cfg, &mut RunContext::new(9, "PROJ")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn headcount_hit_exactly() {
        let mut cfg = config();
        cfg.headcount = Some(17);
        let org = build_organization(&cfg, &mut RunContext::new(1, "PROJ")).unwrap();
        assert_eq!(org.people.len(), 17);
        assert!(org
            .teams
            .iter()
            .all(|t| (4..=6).contains(&t.members.len())));
    }

    #[test]
    fn impossible_headcount_rejected() {
        let mut cfg = config();
        cfg.headcount = Some(10);
        assert!(build_organization(&cfg, &mut RunContext::new(1, "PROJ")).is_err());
        cfg.headcount = Some(40);
        assert!(build_organization(&cfg, &mut RunContext::new(1, "PROJ")).is_err());
    }

    #[test]
    fn zero_teams_rejected() {
        let mut cfg = config();
        cfg.team_count = 0;
        assert!(matches!(
            build_organization(&cfg, &mut RunContext::new(1, "PROJ")),
            Err(ConfigurationError::Invalid { .. })
        ));
    }

    #[test]
    fn business_units_parent_round_robin() {
        let mut cfg = config();
        cfg.team_count = 5;
        cfg.business_units = 2;
        cfg.scenario_mix = vec![ScenarioMix {
            kind: ScenarioKind::StandupMeeting,
            count: 1,
        }];
        let org = build_organization(&cfg, &mut RunContext::new(2, "PROJ")).unwrap();
        let parents: Vec<_> = org.teams.iter().map(|t| t.parent.as_deref()).collect();
        assert_eq!(
            parents,
            vec![None, None, Some("TEAM-1"), Some("TEAM-2"), Some("TEAM-1")]
        );
    }

    #[test]
    fn apportionment_within_one_of_quota() {
        let weights = BTreeMap::from([
            (Role::Engineer, 5.0),
            (Role::SeniorEngineer, 2.0),
            (Role::Manager, 1.0),
            (Role::Qa, 1.5),
            (Role::Designer, 0.5),
        ]);
        for total in [1u32, 7, 13, 18, 101] {
            let roles = apportion_roles(&weights, total);
            assert_eq!(roles.len(), total as usize);
            for (role, w) in &weights {
                let quota = w / 10.0 * f64::from(total);
                let got = roles.iter().filter(|r| *r == role).count() as f64;
                assert!((got - quota).abs() < 1.0 + 1e-9, "{role:?}: {got} vs {quota}");
            }
        }
    }

    #[test]
    fn zero_weight_role_never_dealt() {
        let weights = BTreeMap::from([(Role::Engineer, 1.0), (Role::Pm, 0.0)]);
        let roles = apportion_roles(&weights, 9);
        assert!(roles.iter().all(|r| *r == Role::Engineer));
    }
}
