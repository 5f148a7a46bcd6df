use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    /// Multiply the interval by `factor` after every attempt, capped at
    /// `max_interval`.
    Exponential { factor: f64, max_interval: Duration },
}

/// How often and how long a job is polled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Ten-second ticks for up to ten minutes.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 60,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            backoff: Backoff::Fixed,
        }
    }

    /// Wait before the tick that follows `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                factor,
                max_interval,
            } => {
                let exponent = attempt.saturating_sub(1).min(64) as i32;
                let secs = self.interval.as_secs_f64() * factor.max(1.0).powi(exponent);
                let capped = secs.min(max_interval.as_secs_f64()).max(0.0);
                Duration::try_from_secs_f64(capped).unwrap_or(max_interval)
            }
        }
    }

    /// Worst-case wall time before the budget runs out.
    pub fn budget(&self) -> Duration {
        (1..self.max_attempts)
            .map(|a| self.delay_after(a))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
