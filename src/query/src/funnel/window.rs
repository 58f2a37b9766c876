use chrono::DateTime;
use chrono::Duration;
use chronoutil::RelativeDuration;
use common::funnel::TimeIntervalUnit;
use common::funnel::TimeWindow;

use crate::error::QueryError;
use crate::error::Result;

/// Maximum time allowed between an attempt's first step and any later step.
/// Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionWindow {
    // milliseconds
    Fixed(i64),
    // calendar months
    Months(i32),
}

impl ConversionWindow {
    pub fn try_new(n: i64, unit: TimeIntervalUnit) -> Result<Self> {
        if n <= 0 {
            return Err(QueryError::InvalidWindow(format!(
                "window should be positive, got {n} {}",
                unit.as_str()
            )));
        }

        match unit {
            TimeIntervalUnit::Month => {
                let months = i32::try_from(n).map_err(|_| {
                    QueryError::InvalidWindow(format!("{n} months is out of range"))
                })?;
                Ok(ConversionWindow::Months(months))
            }
            _ => match unit.duration(n) {
                Some(d) => Self::from_duration(d),
                None => Err(QueryError::InvalidWindow(format!(
                    "{n} {} is out of range",
                    unit.as_str()
                ))),
            },
        }
    }

    pub fn from_duration(d: Duration) -> Result<Self> {
        if d <= Duration::zero() {
            return Err(QueryError::InvalidWindow(format!(
                "window should be positive, got {d}"
            )));
        }

        Ok(ConversionWindow::Fixed(d.num_milliseconds()))
    }

    /// Last timestamp (ms, inclusive) that still belongs to an attempt started at `start`.
    pub fn end(&self, start: i64) -> i64 {
        match self {
            ConversionWindow::Fixed(ms) => start.saturating_add(*ms),
            ConversionWindow::Months(n) => DateTime::from_timestamp_millis(start)
                .map(|ts| (ts + RelativeDuration::months(*n)).timestamp_millis())
                .unwrap_or(i64::MAX),
        }
    }

    #[inline]
    pub fn contains(&self, start: i64, ts: i64) -> bool {
        ts <= self.end(start)
    }
}

impl TryFrom<&TimeWindow> for ConversionWindow {
    type Error = QueryError;

    fn try_from(w: &TimeWindow) -> Result<Self> {
        ConversionWindow::try_new(w.n, w.unit)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_fixed_boundary_is_closed() {
        let w = ConversionWindow::try_new(5, TimeIntervalUnit::Minute).unwrap();
        assert_eq!(w, ConversionWindow::Fixed(300_000));
        assert!(w.contains(0, 300_000));
        assert!(!w.contains(0, 300_001));
    }

    #[test]
    fn test_months_follow_calendar() {
        let w = ConversionWindow::try_new(1, TimeIntervalUnit::Month).unwrap();
        let start = Utc.with_ymd_and_hms(2021, 1, 31, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 2, 28, 10, 0, 0).unwrap();
        assert_eq!(w.end(start.timestamp_millis()), end.timestamp_millis());

        let start = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(w.end(start.timestamp_millis()), end.timestamp_millis());
    }

    #[test]
    fn test_non_positive_window_fails() {
        assert!(matches!(
            ConversionWindow::try_new(0, TimeIntervalUnit::Day),
            Err(QueryError::InvalidWindow(_))
        ));
        assert!(matches!(
            ConversionWindow::try_new(-1, TimeIntervalUnit::Month),
            Err(QueryError::InvalidWindow(_))
        ));
        assert!(matches!(
            ConversionWindow::from_duration(Duration::zero()),
            Err(QueryError::InvalidWindow(_))
        ));
    }
}
