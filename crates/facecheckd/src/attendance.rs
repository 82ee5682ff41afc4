//! Attendance rules: local calendar days and working-hours classification.

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

/// A full working day, in hours.
pub const STANDARD_HOURS: f64 = 8.0;
/// Hours beyond which a day counts as overtime.
pub const OVERTIME_AFTER_HOURS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkdayStatus {
    Undertime,
    Normal,
    Overtime,
}

impl WorkdayStatus {
    pub fn classify(hours: f64) -> Self {
        if hours < STANDARD_HOURS {
            WorkdayStatus::Undertime
        } else if hours <= OVERTIME_AFTER_HOURS {
            WorkdayStatus::Normal
        } else {
            WorkdayStatus::Overtime
        }
    }
}

/// Outcome of closing an attendance record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSummary {
    pub hours: f64,
    pub status: WorkdayStatus,
    pub note: String,
}

impl CheckoutSummary {
    /// Summarize a shift. `None` unless `check_out` is strictly after `check_in`.
    pub fn new(check_in: DateTime<Utc>, check_out: DateTime<Utc>) -> Option<Self> {
        if check_out <= check_in {
            return None;
        }
        let hours = (check_out - check_in).num_milliseconds() as f64 / 3_600_000.0;
        let status = WorkdayStatus::classify(hours);
        let note = match status {
            WorkdayStatus::Undertime => format!("short by {:.1}h", STANDARD_HOURS - hours),
            WorkdayStatus::Normal => "full working day".to_string(),
            WorkdayStatus::Overtime => format!("overtime {:.1}h", hours - STANDARD_HOURS),
        };
        Some(Self {
            hours,
            status,
            note,
        })
    }

    /// Append the check-out note to whatever the record already carries.
    pub fn annotate(&self, existing: Option<&str>) -> String {
        match existing {
            Some(notes) if !notes.is_empty() => format!("{notes} | Check-out: {}", self.note),
            _ => format!("Check-out: {}", self.note),
        }
    }
}

/// `[start, end)` of the server-local calendar day containing `at`.
pub fn local_day_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    day_bounds(at.with_timezone(&Local).date_naive())
}

/// `[start, end)` of `day` in server-local time.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = day.succ_opt().unwrap_or(day);
    (local_midnight(day), local_midnight(next))
}

/// Local midnights opening the day, week (Sunday first) and month of `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodStarts {
    pub day: DateTime<Utc>,
    pub week: DateTime<Utc>,
    pub month: DateTime<Utc>,
}

impl PeriodStarts {
    pub fn at(now: DateTime<Utc>) -> Self {
        let today = now.with_timezone(&Local).date_naive();
        let back = u64::from(today.weekday().num_days_from_sunday());
        let week = today.checked_sub_days(Days::new(back)).unwrap_or(today);
        let month = today.with_day(1).unwrap_or(today);
        Self {
            day: local_midnight(today),
            week: local_midnight(week),
            month: local_midnight(month),
        }
    }
}

fn local_midnight(day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(WorkdayStatus::classify(7.99), WorkdayStatus::Undertime);
        assert_eq!(WorkdayStatus::classify(8.0), WorkdayStatus::Normal);
        assert_eq!(WorkdayStatus::classify(10.0), WorkdayStatus::Normal);
        assert_eq!(WorkdayStatus::classify(10.01), WorkdayStatus::Overtime);
    }

    #[test]
    fn test_summary_notes() {
        let start = local(2025, 8, 18, 8, 0);

        let short = CheckoutSummary::new(start, start + Duration::minutes(390)).unwrap();
        assert_eq!(short.status, WorkdayStatus::Undertime);
        assert_eq!(short.note, "short by 1.5h");

        let normal = CheckoutSummary::new(start, start + Duration::hours(9)).unwrap();
        assert_eq!(normal.status, WorkdayStatus::Normal);
        assert_eq!(normal.note, "full working day");

        let long = CheckoutSummary::new(start, start + Duration::hours(11)).unwrap();
        assert_eq!(long.status, WorkdayStatus::Overtime);
        assert_eq!(long.note, "overtime 3.0h");
    }

    #[test]
    fn test_summary_requires_checkout_after_checkin() {
        let start = local(2025, 8, 18, 8, 0);
        assert!(CheckoutSummary::new(start, start).is_none());
        assert!(CheckoutSummary::new(start, start - Duration::minutes(1)).is_none());
    }

    #[test]
    fn test_annotate() {
        let start = local(2025, 8, 18, 8, 0);
        let s = CheckoutSummary::new(start, start + Duration::hours(9)).unwrap();
        assert_eq!(s.annotate(None), "Check-out: full working day");
        assert_eq!(s.annotate(Some("")), "Check-out: full working day");
        assert_eq!(
            s.annotate(Some("late bus")),
            "late bus | Check-out: full working day"
        );
    }

    #[test]
    fn test_local_day_bounds_contain_instant() {
        let at = local(2025, 8, 18, 13, 45);
        let (start, end) = local_day_bounds(at);
        assert!(start <= at && at < end);
        assert_eq!(start, local(2025, 8, 18, 0, 0));
        assert_eq!(end, local(2025, 8, 19, 0, 0));
    }

    #[test]
    fn test_day_bounds_of_date() {
        let day = NaiveDate::from_ymd_opt(2025, 8, 18).unwrap();
        assert_eq!(
            day_bounds(day),
            (local(2025, 8, 18, 0, 0), local(2025, 8, 19, 0, 0))
        );
    }

    #[test]
    fn test_period_starts() {
        // 2025-08-20 is a Wednesday
        let starts = PeriodStarts::at(local(2025, 8, 20, 15, 10));
        assert_eq!(starts.day, local(2025, 8, 20, 0, 0));
        assert_eq!(starts.week, local(2025, 8, 17, 0, 0));
        assert_eq!(starts.month, local(2025, 8, 1, 0, 0));

        let sunday = PeriodStarts::at(local(2025, 8, 17, 9, 0));
        assert_eq!(sunday.week, sunday.day);
    }
}
