use orgforge_core::{FixVersion, IdKind, RunContext};
use time::{Duration, OffsetDateTime};

/// `count` releases spaced `cadence_days` apart and centred on `start`.
/// Versions whose target date falls before `start` are already released.
pub fn plan_fix_versions(
    count: u32,
    cadence_days: u32,
    start: OffsetDateTime,
    ctx: &mut RunContext,
) -> Vec<FixVersion> {
    let span = i64::from(count.saturating_sub(1));
    (0..count)
        .map(|i| {
            // offsets in half-cadences keep odd and even counts symmetric
            let half_steps = 2 * i64::from(i) - span;
            let target_date = start + Duration::hours(half_steps * i64::from(cadence_days) * 12);
            FixVersion {
                id: ctx.reserve_id(IdKind::FixVersion),
                name: format!("v1.{i}.0"),
                target_date,
                released: target_date < start,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn centred_on_start() {
        let start = datetime!(2024-01-08 09:00 UTC);
        let mut ctx = RunContext::new(0, "PROJ");
        let versions = plan_fix_versions(3, 30, start, &mut ctx);
        let names: Vec<_> = versions.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["v1.0.0", "v1.1.0", "v1.2.0"]);
        assert_eq!(versions[0].target_date, start - Duration::days(30));
        assert_eq!(versions[1].target_date, start);
        assert_eq!(versions[2].target_date, start + Duration::days(30));
        assert!(versions[0].released);
        assert!(!versions[1].released);
        assert!(!versions[2].released);
        assert_eq!(versions[2].id, "VER-3");
    }

    #[test]
    fn even_count_straddles_start() {
        let start = datetime!(2024-01-08 09:00 UTC);
        let mut ctx = RunContext::new(0, "PROJ");
        let versions = plan_fix_versions(2, 30, start, &mut ctx);
        assert_eq!(versions[0].target_date, start - Duration::days(15));
        assert_eq!(versions[1].target_date, start + Duration::days(15));
        assert!(versions[0].released && !versions[1].released);
    }

    #[test]
    fn single_version_is_unreleased() {
        let start = datetime!(2024-01-08 09:00 UTC);
        let versions = plan_fix_versions(1, 30, start, &mut RunContext::new(0, "P"));
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].target_date, start);
        assert!(!versions[0].released);
    }
}
