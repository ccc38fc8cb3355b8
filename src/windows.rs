//! Target-week / history-window splitting.
//!
//! The target week is the last 7 calendar days present in the impressions
//! table, inclusive of the max day; the history window is the 21 days
//! immediately before it. Both intervals are half-open and contiguous:
//! history = `[target_start - 21d, target_start)`,
//! target = `[target_start, target_start + 7d)`.

use chrono::{Days, NaiveDate};
use thiserror::Error;

use crate::events::ImpressionEvent;

pub const TARGET_WEEK_DAYS: u64 = 7;
pub const HISTORY_WINDOW_DAYS: u64 = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetWindows {
    pub history_start: NaiveDate,
    pub target_start: NaiveDate,
    pub target_end_exclusive: NaiveDate,
}

impl DatasetWindows {
    pub fn in_target(&self, day: NaiveDate) -> bool {
        day >= self.target_start && day < self.target_end_exclusive
    }

    pub fn in_history(&self, day: NaiveDate) -> bool {
        day >= self.history_start && day < self.target_start
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("impressions table is empty; no target week can be defined")]
    EmptyInput,
}

/// Computes the two windows from the max impression day.
///
/// Spanning fewer than 28 days of data is not an error; the history window
/// may simply reach before the earliest available impression.
pub fn split_windows(impressions: &[ImpressionEvent]) -> Result<DatasetWindows, WindowError> {
    let max_day = impressions
        .iter()
        .map(|event| event.day)
        .max()
        .ok_or(WindowError::EmptyInput)?;

    let target_start = max_day
        .checked_sub_days(Days::new(TARGET_WEEK_DAYS - 1))
        .expect("target week start should exist");
    let target_end_exclusive = max_day
        .checked_add_days(Days::new(1))
        .expect("day after max day should exist");
    let history_start = target_start
        .checked_sub_days(Days::new(HISTORY_WINDOW_DAYS))
        .expect("history window start should exist");

    Ok(DatasetWindows {
        history_start,
        target_start,
        target_end_exclusive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::UserId;

    fn impression(day: NaiveDate) -> ImpressionEvent {
        ImpressionEvent {
            user_id: UserId::new("1"),
            value_prop: "loans".to_string(),
            day,
            position: 0,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn windows_anchor_on_max_impression_day() {
        let impressions = vec![
            impression(date(2020, 11, 3)),
            impression(date(2020, 11, 30)),
            impression(date(2020, 11, 17)),
        ];

        let windows = split_windows(&impressions).unwrap();
        assert_eq!(windows.target_start, date(2020, 11, 24));
        assert_eq!(windows.target_end_exclusive, date(2020, 12, 1));
        assert_eq!(windows.history_start, date(2020, 11, 3));
    }

    #[test]
    fn windows_are_half_open_and_disjoint() {
        let windows = split_windows(&[impression(date(2020, 11, 30))]).unwrap();

        assert!(windows.in_target(date(2020, 11, 24)));
        assert!(windows.in_target(date(2020, 11, 30)));
        assert!(!windows.in_target(date(2020, 11, 23)));
        assert!(!windows.in_target(date(2020, 12, 1)));

        assert!(windows.in_history(date(2020, 11, 23)));
        assert!(windows.in_history(date(2020, 11, 3)));
        assert!(!windows.in_history(date(2020, 11, 2)));
        assert!(!windows.in_history(date(2020, 11, 24)));
    }

    #[test]
    fn short_span_is_not_an_error() {
        // Only two days of data; history reaches before the earliest day.
        let impressions = vec![
            impression(date(2020, 11, 29)),
            impression(date(2020, 11, 30)),
        ];
        let windows = split_windows(&impressions).unwrap();
        assert_eq!(windows.target_start, date(2020, 11, 24));
        assert_eq!(windows.history_start, date(2020, 11, 3));
    }

    #[test]
    fn empty_impressions_fail() {
        assert_eq!(split_windows(&[]).unwrap_err(), WindowError::EmptyInput);
    }
}
