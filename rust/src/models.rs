//! Core data types for the scheduling engine.

use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

/// Time instant or span, in whole project days from the project start.
pub type Time = i64;

/// One raw operation row as read from the operations table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationRecord {
    pub code: String,
    pub duration: Time,
    pub predecessors: Vec<String>,
    /// Resource code and quantity held for the whole duration.
    pub demands: Vec<(String, i64)>,
}

impl OperationRecord {
    pub fn new(code: impl Into<String>, duration: Time) -> Self {
        Self {
            code: code.into(),
            duration,
            predecessors: Vec::new(),
            demands: Vec::new(),
        }
    }

    /// Add predecessors that must finish before this operation starts.
    pub fn after<I, S>(mut self, predecessors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predecessors
            .extend(predecessors.into_iter().map(Into::into));
        self
    }

    /// Add a resource demand.
    pub fn demands(mut self, resource: impl Into<String>, quantity: i64) -> Self {
        self.demands.push((resource.into(), quantity));
        self
    }
}

/// One raw resource row as read from the resources table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub code: String,
    /// Maximum total quantity in use at any single instant.
    pub capacity: i64,
}

impl ResourceRecord {
    pub fn new(code: impl Into<String>, capacity: i64) -> Self {
        Self {
            code: code.into(),
            capacity,
        }
    }
}

/// Per-operation timing from the CPM forward and backward passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationTiming {
    pub earliest_start: Time,
    pub earliest_finish: Time,
    pub latest_start: Time,
    pub latest_finish: Time,
    /// latest_start - earliest_start
    pub slack: Time,
}

impl OperationTiming {
    pub fn is_critical(&self) -> bool {
        self.slack == 0
    }
}

/// A concrete interval assigned to one operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledOperation {
    pub start: Time,
    pub finish: Time,
    /// Delay the operation tolerates without moving the project finish.
    pub slack: Time,
}

impl ScheduledOperation {
    pub fn is_critical(&self) -> bool {
        self.slack == 0
    }
}

/// Output of every engine call: per-operation intervals, the critical path
/// and the overall project duration.
///
/// Entries are keyed by operation code and owned, so a schedule stays valid
/// after the graph it was computed from is dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schedule {
    pub entries: BTreeMap<String, ScheduledOperation>,
    pub critical_path: Vec<String>,
    pub duration: Time,
}

impl Schedule {
    pub fn get(&self, code: &str) -> Option<&ScheduledOperation> {
        self.entries.get(code)
    }

    pub fn start_of(&self, code: &str) -> Option<Time> {
        self.entries.get(code).map(|e| e.start)
    }

    pub fn finish_of(&self, code: &str) -> Option<Time> {
        self.entries.get(code).map(|e| e.finish)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Project each interval onto calendar days counted from `project_start`.
    ///
    /// Rows come out in operation code order. Returns `None` if any offset
    /// lands outside the representable date range.
    pub fn to_calendar(&self, project_start: NaiveDate) -> Option<Vec<CalendarEntry>> {
        let shift = |offset: Time| {
            let days = Days::new(offset.unsigned_abs());
            if offset >= 0 {
                project_start.checked_add_days(days)
            } else {
                project_start.checked_sub_days(days)
            }
        };
        self.entries
            .iter()
            .map(|(code, entry)| {
                Some(CalendarEntry {
                    code: code.clone(),
                    start_date: shift(entry.start)?,
                    finish_date: shift(entry.finish)?,
                })
            })
            .collect()
    }
}

/// One result-table row: an operation pinned to calendar dates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarEntry {
    pub code: String,
    pub start_date: NaiveDate,
    pub finish_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_record_builder() {
        let record = OperationRecord::new("C", 4)
            .after(["A", "B"])
            .demands("crane", 1);
        assert_eq!(record.code, "C");
        assert_eq!(record.predecessors, vec!["A", "B"]);
        assert_eq!(record.demands, vec![("crane".to_string(), 1)]);
    }

    #[test]
    fn test_timing_critical() {
        let timing = OperationTiming {
            earliest_start: 3,
            earliest_finish: 5,
            latest_start: 5,
            latest_finish: 7,
            slack: 2,
        };
        assert!(!timing.is_critical());
        assert!(OperationTiming::default().is_critical());
    }

    #[test]
    fn test_to_calendar() {
        let mut schedule = Schedule::default();
        schedule.entries.insert(
            "B".to_string(),
            ScheduledOperation {
                start: 3,
                finish: 5,
                slack: 2,
            },
        );
        schedule.entries.insert(
            "A".to_string(),
            ScheduledOperation {
                start: 0,
                finish: 3,
                slack: 0,
            },
        );

        let rows = schedule.to_calendar(d(2025, 1, 30)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "A");
        assert_eq!(rows[0].start_date, d(2025, 1, 30));
        assert_eq!(rows[0].finish_date, d(2025, 2, 2));
        assert_eq!(rows[1].start_date, d(2025, 2, 2));
        assert_eq!(rows[1].finish_date, d(2025, 2, 4));
    }

    #[test]
    fn test_to_calendar_out_of_range() {
        let mut schedule = Schedule::default();
        schedule.entries.insert(
            "A".to_string(),
            ScheduledOperation {
                start: 0,
                finish: 1,
                slack: 0,
            },
        );
        assert!(schedule.to_calendar(NaiveDate::MAX).is_none());
        assert!(schedule.to_calendar(d(2025, 1, 30)).is_some());

        let mut before_start = Schedule::default();
        before_start.entries.insert(
            "A".to_string(),
            ScheduledOperation {
                start: -1,
                finish: 0,
                slack: 0,
            },
        );
        let rows = before_start.to_calendar(d(2025, 1, 30)).unwrap();
        assert_eq!(rows[0].start_date, d(2025, 1, 29));
        assert!(before_start.to_calendar(NaiveDate::MIN).is_none());
    }
}
