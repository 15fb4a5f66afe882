//! Daily efficiency scoring.
//!
//! The score is a pure function of one attendance record and the number of
//! captures planned for that day, so it is recomputed on demand and never
//! stored.

use super::attendance::AttendanceRecord;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub const ATTENDANCE_POINTS: u8 = 30;
pub const PRESENCE_POINTS: u8 = 50;
pub const REPORTING_POINTS: u8 = 20;

/// Scores a day from 0 to 100.
///
/// - attendance: 30 with both clock-in and clock-out, 15 with one of them
/// - presence: `round(50 * present / planned)`, 0 when nothing was planned
/// - reporting: 20 once at least one progress report was submitted
pub fn efficiency_score(attendance: &AttendanceRecord, planned_captures: usize) -> u8 {
    attendance_points(attendance)
        + presence_points(attendance, planned_captures)
        + reporting_points(attendance)
}

fn attendance_points(attendance: &AttendanceRecord) -> u8 {
    match (attendance.clock_in.is_some(), attendance.clock_out.is_some()) {
        (true, true) => ATTENDANCE_POINTS,
        (true, false) | (false, true) => ATTENDANCE_POINTS / 2,
        (false, false) => 0,
    }
}

fn presence_points(attendance: &AttendanceRecord, planned_captures: usize) -> u8 {
    if planned_captures == 0 {
        return 0;
    }
    let present = (attendance.tally().present as usize).min(planned_captures);
    let ratio = Decimal::from(PRESENCE_POINTS) * Decimal::from(present as u64)
        / Decimal::from(planned_captures as u64);
    let points = ratio.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    // Bounded by PRESENCE_POINTS since present <= planned.
    points.to_u8().unwrap_or(PRESENCE_POINTS)
}

fn reporting_points(attendance: &AttendanceRecord) -> u8 {
    if attendance.progress_reports > 0 {
        REPORTING_POINTS
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::monitoring::{CaptureOutcome, MonitoringEvent};
    use crate::domain::worker::WorkerId;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record_with(present: u32, absent: u32) -> AttendanceRecord {
        let mut record =
            AttendanceRecord::new(WorkerId(1), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        for _ in 0..present {
            record.append_event(MonitoringEvent::new(at, CaptureOutcome::Present, None));
        }
        for _ in 0..absent {
            record.append_event(MonitoringEvent::new(at, CaptureOutcome::Absent, None));
        }
        record
    }

    fn clocked(mut record: AttendanceRecord, clock_in: bool, clock_out: bool) -> AttendanceRecord {
        if clock_in {
            record.clock_in = Some(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap());
        }
        if clock_out {
            record.clock_out = Some(Utc.with_ymd_and_hms(2026, 10, 19, 17, 0, 0).unwrap());
        }
        record
    }

    #[test]
    fn test_score_full_day_scenario() {
        let mut record = clocked(record_with(8, 2), true, true);
        record.submit_progress_report();
        assert_eq!(efficiency_score(&record, 10), 90);
    }

    #[test]
    fn test_score_perfect_day() {
        let mut record = clocked(record_with(10, 0), true, true);
        record.submit_progress_report();
        assert_eq!(efficiency_score(&record, 10), 100);
    }

    #[test]
    fn test_score_single_clock_event() {
        assert_eq!(efficiency_score(&clocked(record_with(0, 0), true, false), 10), 15);
        assert_eq!(efficiency_score(&clocked(record_with(0, 0), false, true), 10), 15);
        assert_eq!(efficiency_score(&record_with(0, 0), 10), 0);
    }

    #[test]
    fn test_score_without_planned_captures() {
        let record = clocked(record_with(3, 0), true, true);
        assert_eq!(efficiency_score(&record, 0), 30);
    }

    #[test]
    fn test_score_presence_rounding() {
        // 50 * 1/3 = 16.67 -> 17, 50 * 1/8 = 6.25 -> 6, 50 * 1/4 = 12.5 -> 13
        assert_eq!(efficiency_score(&record_with(1, 2), 3), 17);
        assert_eq!(efficiency_score(&record_with(1, 7), 8), 6);
        assert_eq!(efficiency_score(&record_with(1, 3), 4), 13);
    }

    #[test]
    fn test_score_is_deterministic_and_bounded() {
        for present in 0..=12u32 {
            for planned in 0..=10usize {
                let mut record = clocked(record_with(present, 0), true, true);
                record.submit_progress_report();
                let first = efficiency_score(&record, planned);
                let second = efficiency_score(&record.clone(), planned);
                assert_eq!(first, second);
                assert!(first <= 100);
            }
        }
    }
}
