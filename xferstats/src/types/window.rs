use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open time interval `[start, end)` bounding one scan-and-write unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Returns `true` if `instant` falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn window_is_half_open() {
        let start = Utc.with_ymd_and_hms(2020, 1, 2, 10, 0, 0).unwrap();
        let window = TimeWindow::new(start, start + Duration::minutes(5));

        assert!(window.contains(start));
        assert!(window.contains(start + Duration::seconds(299)));
        assert!(!window.contains(start + Duration::minutes(5)));
        assert!(!window.contains(start - Duration::seconds(1)));
    }
}
