//! Failure streak tracking for log suppression.
//!
//! Repeated identical failures are logged once at the start of a streak and
//! once when it ends, never on every tick.

/// Consecutive and lifetime failure counts for one source of errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureStreak {
    consecutive: u64,
    total: u64,
}

impl FailureStreak {
    /// Creates an empty streak.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure. Returns true if it starts a new streak.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.total += 1;
        self.consecutive == 1
    }

    /// Records a success. Returns the length of the streak it ended, if any.
    pub fn record_success(&mut self) -> Option<u64> {
        let ended = self.consecutive;
        self.consecutive = 0;
        (ended > 0).then_some(ended)
    }

    /// Failures since the last success.
    #[must_use]
    pub fn consecutive(&self) -> u64 {
        self.consecutive
    }

    /// Failures over the whole lifetime.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_first_failure_starts_streak() {
        let mut streak = FailureStreak::new();

        assert!(streak.record_failure());
        assert!(!streak.record_failure());
        assert!(!streak.record_failure());
        assert_eq!(streak.consecutive(), 3);
    }

    #[test]
    fn test_success_ends_streak() {
        let mut streak = FailureStreak::new();
        assert_eq!(streak.record_success(), None);

        streak.record_failure();
        streak.record_failure();
        assert_eq!(streak.record_success(), Some(2));
        assert_eq!(streak.record_success(), None);

        assert!(streak.record_failure(), "a failure after recovery starts a new streak");
        assert_eq!(streak.total(), 3);
    }
}
