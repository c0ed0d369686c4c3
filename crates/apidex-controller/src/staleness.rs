//! Staleness oracle — decides whether a generated artifact must be rebuilt.
//!
//! The slack window absorbs clock drift between the registry and its
//! clients, and write-after-read races where a dependency lands in the same
//! second as the target. It is applied on the dependency side, so a
//! dependency written at the same instant as the target still counts as
//! newer. Recomputation is idempotent, so the bias toward action is safe.

use chrono::{DateTime, Duration, Utc};

/// Default slack between dependency and target update times.
pub fn default_slack() -> Duration {
    Duration::seconds(1)
}

/// True when the target is missing, or any dependency plus slack is newer
/// than the target.
pub fn needs_action<I>(target: Option<DateTime<Utc>>, dependencies: I, slack: Duration) -> bool
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    match target {
        None => true,
        Some(target) => dependencies.into_iter().any(|dep| dep + slack > target),
    }
}

/// True when a refresh interval is configured and the target is older than
/// it. A missing target is always handled by [`needs_action`].
pub fn needs_refresh(
    target: Option<DateTime<Utc>>,
    refresh: Option<Duration>,
    now: DateTime<Utc>,
) -> bool {
    match (target, refresh) {
        (Some(target), Some(interval)) => now - target > interval,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn missing_target_always_acts() {
        assert!(needs_action(None, [], default_slack()));
        assert!(needs_action(
            None,
            [ts("2026-01-01T00:00:00Z")],
            default_slack()
        ));
    }

    #[test]
    fn newer_dependency_acts() {
        let target = Some(ts("2026-01-01T00:00:00Z"));
        assert!(needs_action(
            target,
            [ts("2026-01-01T00:00:05Z")],
            default_slack()
        ));
    }

    #[test]
    fn same_second_dependency_is_treated_as_newer() {
        let target = Some(ts("2026-01-01T00:00:00Z"));
        assert!(needs_action(
            target,
            [ts("2026-01-01T00:00:00Z")],
            default_slack()
        ));
    }

    #[test]
    fn strictly_older_dependencies_do_not_act() {
        // Monotonicity: target newer than every dependency by more than the
        // slack means no action.
        let target = Some(ts("2026-01-01T00:01:00Z"));
        let deps = [ts("2026-01-01T00:00:00Z"), ts("2026-01-01T00:00:58Z")];
        assert!(!needs_action(target, deps, default_slack()));
    }

    #[test]
    fn slack_boundary_is_exclusive() {
        // dep + slack must exceed target, not merely reach it.
        let target = Some(ts("2026-01-01T00:00:01Z"));
        assert!(!needs_action(
            target,
            [ts("2026-01-01T00:00:00Z")],
            default_slack()
        ));
        assert!(needs_action(
            target,
            [ts("2026-01-01T00:00:00.5Z")],
            default_slack()
        ));
    }

    #[test]
    fn refresh_interval_expires_fresh_targets() {
        let now = ts("2026-01-01T02:00:00Z");
        let target = Some(ts("2026-01-01T00:00:00Z"));
        assert!(needs_refresh(target, Some(Duration::hours(1)), now));
        assert!(!needs_refresh(target, Some(Duration::hours(3)), now));
        assert!(!needs_refresh(target, None, now));
        assert!(!needs_refresh(None, Some(Duration::hours(1)), now));
    }
}
