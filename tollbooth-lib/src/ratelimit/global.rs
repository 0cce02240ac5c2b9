use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// A single deadline shared by every bucket of a dispatcher.
///
/// While the deadline lies in the future no bucket sends a request.
/// The deadline is only ever pushed back, never brought forward.
#[derive(Debug, Default)]
pub struct GlobalLimiter {
    deadline: Mutex<Option<Instant>>,
}

impl GlobalLimiter {
    /// Create a limiter without an active deadline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block every bucket for `duration` from now.
    ///
    /// If a later deadline is already installed it is kept.
    pub fn limit(&self, duration: Duration) -> Instant {
        let until = Instant::now() + duration;
        let mut deadline = self.deadline();
        let until = match *deadline {
            Some(current) if current > until => current,
            _ => until,
        };
        *deadline = Some(until);
        until
    }

    /// Whether a deadline is installed and still in the future
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.remaining().is_some()
    }

    /// Time left until the current deadline passes
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let mut deadline = self.deadline();
        let now = Instant::now();
        match *deadline {
            Some(until) if until > now => Some(until - now),
            Some(_) => {
                *deadline = None;
                None
            }
            None => None,
        }
    }

    /// Wait until no deadline is active.
    ///
    /// Returns immediately when the limiter is idle. A deadline installed
    /// while waiting is honored as well.
    pub async fn wait(&self) {
        loop {
            let until = {
                let deadline = self.deadline();
                match *deadline {
                    Some(until) if until > Instant::now() => until,
                    _ => break,
                }
            };
            log::debug!(
                "Global rate limit active, waiting {}ms",
                until.saturating_duration_since(Instant::now()).as_millis()
            );
            tokio::time::sleep_until(until).await;
        }
        // Clear an expired deadline
        let _ = self.remaining();
    }

    fn deadline(&self) -> MutexGuard<'_, Option<Instant>> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The paused clock rounds timers to whole milliseconds.
    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(elapsed >= expected, "{elapsed:?} < {expected:?}");
        assert!(
            elapsed < expected + Duration::from_millis(10),
            "{elapsed:?} > {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_limiter_does_not_wait() {
        let limiter = GlobalLimiter::new();
        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!limiter.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_deadline() {
        let limiter = GlobalLimiter::new();
        limiter.limit(Duration::from_millis(300));
        assert!(limiter.is_active());

        let start = Instant::now();
        limiter.wait().await;
        assert_elapsed(start, Duration::from_millis(300));
        assert!(!limiter.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_deadline_wins() {
        let limiter = GlobalLimiter::new();
        let long = limiter.limit(Duration::from_secs(2));
        let kept = limiter.limit(Duration::from_millis(100));
        assert_eq!(long, kept);
        assert_eq!(limiter.remaining(), Some(Duration::from_secs(2)));

        let extended = limiter.limit(Duration::from_secs(5));
        assert!(extended > long);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_installed_while_waiting() {
        let limiter = std::sync::Arc::new(GlobalLimiter::new());
        limiter.limit(Duration::from_millis(100));

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let start = Instant::now();
                limiter.wait().await;
                start.elapsed()
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        limiter.limit(Duration::from_millis(200));

        let waited = waiter.await.unwrap();
        assert!(waited >= Duration::from_millis(250), "{waited:?}");
        assert!(waited < Duration::from_millis(260), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_is_cleared() {
        let limiter = GlobalLimiter::new();
        limiter.limit(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(limiter.remaining(), None);
        assert!(limiter.deadline().is_none());
    }
}
