//! Splitting of a requested time range into fixed-width windows.

use chrono::{DateTime, Duration, Utc};

use crate::bail;
use crate::error::{ErrorKind, IngestResult};
use crate::types::TimeWindow;

/// Width of the windows planned by [`WindowPlanner::last_hour`].
pub const LAST_HOUR_WINDOW_MINUTES: i64 = 5;

/// How the last window of a plan ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalWindowPolicy {
    /// The last window keeps the full width and may end after the requested end.
    #[default]
    Overshoot,
    /// The last window ends exactly at the requested end.
    Clamp,
}

/// Plans contiguous, non-overlapping windows of one width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlanner {
    width: Duration,
    policy: FinalWindowPolicy,
}

impl WindowPlanner {
    /// Creates a planner; the width must be positive.
    pub fn new(width: Duration) -> IngestResult<Self> {
        if width <= Duration::zero() {
            bail!(
                ErrorKind::ConfigError,
                "Window width must be positive",
                format!("received a width of {} seconds", width.num_seconds())
            );
        }

        Ok(Self {
            width,
            policy: FinalWindowPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: FinalWindowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Plans `[from, from + width), [from + width, from + 2 * width), …` until a window start
    /// reaches `to`. An empty or inverted range plans nothing.
    pub fn plan(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<TimeWindow> {
        let mut windows = Vec::new();
        let mut start = from;

        while start < to {
            let Some(next) = start.checked_add_signed(self.width) else {
                windows.push(TimeWindow::new(start, to));
                break;
            };

            let end = match self.policy {
                FinalWindowPolicy::Clamp if next > to => to,
                _ => next,
            };
            windows.push(TimeWindow::new(start, end));
            start = next;
        }

        windows
    }

    /// Plans the hour before `now` in five minute windows.
    pub fn last_hour(now: DateTime<Utc>) -> Vec<TimeWindow> {
        let planner = Self {
            width: Duration::minutes(LAST_HOUR_WINDOW_MINUTES),
            policy: FinalWindowPolicy::Overshoot,
        };

        planner.plan(now - Duration::hours(1), now)
    }
}
