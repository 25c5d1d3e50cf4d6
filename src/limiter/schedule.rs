//! Wall-clock restore schedule parsing.
//!
//! Job files may give the time of day in 24-hour (`H:mm`) or 12-hour
//! (`h:mm a`) form. An unparseable schedule is an error for the caller to log
//! and skip; it never interrupts other jobs' processing.

use crate::core::{JobsError, Result};
use chrono::NaiveTime;

/// Parsed time-of-day trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSchedule {
    time: NaiveTime,
}

impl RestoreSchedule {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        // 24-hour first, then 12-hour with meridiem.
        let time = NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw.to_ascii_uppercase(), "%I:%M %p"))
            .map_err(|_| {
                JobsError::ScheduleError(format!(
                    "'{}' is not a valid time of day (expected H:mm or h:mm a)",
                    raw
                ))
            })?;
        Ok(Self { time })
    }

    /// Whether the schedule fires in the minute containing `now`.
    pub fn matches_minute(&self, now: NaiveTime) -> bool {
        use chrono::Timelike;
        self.time.hour() == now.hour() && self.time.minute() == now.minute()
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_clock_forms() {
        let a = RestoreSchedule::parse("4:30").unwrap();
        let b = RestoreSchedule::parse("04:30").unwrap();
        assert_eq!(a, b);

        let c = RestoreSchedule::parse("4:30 am").unwrap();
        assert_eq!(a, c);

        let d = RestoreSchedule::parse("11:05 PM").unwrap();
        assert_eq!(d.time(), NaiveTime::from_hms_opt(23, 5, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(RestoreSchedule::parse("25:61").is_err());
        assert!(RestoreSchedule::parse("noonish").is_err());
        assert!(RestoreSchedule::parse("").is_err());
    }

    #[test]
    fn minute_matching() {
        let s = RestoreSchedule::parse("6:15").unwrap();
        assert!(s.matches_minute(NaiveTime::from_hms_opt(6, 15, 42).unwrap()));
        assert!(!s.matches_minute(NaiveTime::from_hms_opt(6, 16, 0).unwrap()));
    }
}
