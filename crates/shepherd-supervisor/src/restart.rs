//! Restart-backoff policy.
//!
//! A policy is an ordered ladder of delays plus a stability duration. The
//! cursor climbs one rung per rapid failure, saturating at the last rung,
//! and drops back to the first rung only after a run that lasted at least
//! the stability duration.

use std::time::Duration;

/// When a worker may be relaunched after an unexpected termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    delays: Vec<Duration>,
    stable_after: Duration,
}

impl RestartPolicy {
    pub fn new(delays: Vec<Duration>, stable_after: Duration) -> Self {
        Self {
            delays,
            stable_after,
        }
    }

    /// An empty ladder, or the single value zero, turns restarting off.
    pub fn is_enabled(&self) -> bool {
        !(self.delays.is_empty() || self.delays == [Duration::ZERO])
    }

    /// Minimum continuous runtime after which backoff re-enters the
    /// ladder from the bottom.
    pub fn stable_after(&self) -> Duration {
        self.stable_after
    }
}

/// Index into the delay ladder tracking the current escalation level.
#[derive(Debug, Clone, Default)]
pub struct BackoffCursor {
    position: Option<usize>,
}

impl BackoffCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ladder index of the most recently selected delay, if any.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Select the delay before the next relaunch.
    ///
    /// A run that lasted at least the stability duration drops back to
    /// the first rung; anything shorter climbs one rung, saturating at
    /// the last. Returns `None` when the policy disables restarting.
    pub fn next_delay(&mut self, policy: &RestartPolicy, last_run: Duration) -> Option<Duration> {
        if !policy.is_enabled() {
            return None;
        }
        let position = if last_run >= policy.stable_after {
            0
        } else {
            match self.position {
                None => 0,
                Some(current) => (current + 1).min(policy.delays.len() - 1),
            }
        };
        self.position = Some(position);
        Some(policy.delays[position])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> RestartPolicy {
        RestartPolicy::new(
            vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_millis(1000),
            ],
            Duration::from_secs(60),
        )
    }

    /// A run far below the stability threshold.
    const CRASH: Duration = Duration::from_millis(5);

    #[test]
    fn test_rapid_failures_climb_and_saturate() {
        let policy = ladder();
        let mut cursor = BackoffCursor::new();

        assert_eq!(
            cursor.next_delay(&policy, CRASH),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            cursor.next_delay(&policy, CRASH),
            Some(Duration::from_millis(500))
        );
        assert_eq!(
            cursor.next_delay(&policy, CRASH),
            Some(Duration::from_millis(1000))
        );

        // Saturates at the longest delay instead of growing or failing.
        for _ in 0..4 {
            assert_eq!(
                cursor.next_delay(&policy, CRASH),
                Some(Duration::from_millis(1000))
            );
        }
    }

    #[test]
    fn test_stable_run_resets_to_first_delay() {
        let policy = ladder();
        let mut cursor = BackoffCursor::new();
        for _ in 0..3 {
            cursor.next_delay(&policy, CRASH);
        }
        assert_eq!(cursor.position(), Some(2));

        assert_eq!(
            cursor.next_delay(&policy, Duration::from_secs(61)),
            Some(Duration::from_millis(100))
        );
        // The reset re-enters the ladder from the bottom.
        assert_eq!(
            cursor.next_delay(&policy, CRASH),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_run_exactly_at_threshold_counts_as_stable() {
        let policy = ladder();
        let mut cursor = BackoffCursor::new();
        for _ in 0..3 {
            cursor.next_delay(&policy, CRASH);
        }

        assert_eq!(
            cursor.next_delay(&policy, Duration::from_secs(60)),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_empty_ladder_disables_restart() {
        let policy = RestartPolicy::new(vec![], Duration::from_secs(60));
        assert!(!policy.is_enabled());

        let mut cursor = BackoffCursor::new();
        assert_eq!(cursor.next_delay(&policy, CRASH), None);
        assert_eq!(cursor.position(), None);
    }

    #[test]
    fn test_single_zero_delay_disables_restart() {
        let policy = RestartPolicy::new(vec![Duration::ZERO], Duration::from_secs(60));
        assert!(!policy.is_enabled());

        let mut cursor = BackoffCursor::new();
        assert_eq!(cursor.next_delay(&policy, CRASH), None);
    }

    #[test]
    fn test_zero_first_rung_alone_does_not_disable() {
        let policy = RestartPolicy::new(
            vec![Duration::ZERO, Duration::from_millis(100)],
            Duration::from_secs(60),
        );
        assert!(policy.is_enabled());

        let mut cursor = BackoffCursor::new();
        assert_eq!(cursor.next_delay(&policy, CRASH), Some(Duration::ZERO));
        assert_eq!(
            cursor.next_delay(&policy, CRASH),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn test_cursor_never_moves_backward_without_stability() {
        let policy = ladder();
        let mut cursor = BackoffCursor::new();
        let mut previous = 0;
        for _ in 0..6 {
            cursor.next_delay(&policy, CRASH);
            let position = cursor.position().unwrap();
            assert!(position >= previous);
            previous = position;
        }
    }
}
