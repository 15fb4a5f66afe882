use super::worker::WorkerId;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a single presence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureOutcome {
    Present,
    Absent,
    /// The capture collaborator itself failed; distinct from a capture that saw nobody.
    CaptureFailed,
}

impl fmt::Display for CaptureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::CaptureFailed => "capture_failed",
        };
        f.write_str(s)
    }
}

/// An attendance monitoring event. Immutable once appended to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub at: DateTime<Utc>,
    pub outcome: CaptureOutcome,
    pub evidence: Option<String>,
}

impl MonitoringEvent {
    pub fn new(at: DateTime<Utc>, outcome: CaptureOutcome, evidence: Option<String>) -> Self {
        Self {
            at,
            outcome,
            evidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedCapture {
    pub at: NaiveTime,
    pub fired: bool,
}

/// The capture instants drawn for one worker on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringPlan {
    pub worker: WorkerId,
    pub date: NaiveDate,
    pub captures: Vec<PlannedCapture>,
    pub cancelled: bool,
}

impl MonitoringPlan {
    pub fn new(worker: WorkerId, date: NaiveDate, instants: Vec<NaiveTime>) -> Self {
        Self {
            worker,
            date,
            captures: instants
                .into_iter()
                .map(|at| PlannedCapture { at, fired: false })
                .collect(),
            cancelled: false,
        }
    }

    /// Number of planned captures, the denominator of the presence rate.
    pub fn planned_count(&self) -> usize {
        self.captures.len()
    }

    /// Marks an instant as fired. Returns `false` when it already was, is
    /// unknown, or the plan has been cancelled.
    pub fn mark_fired(&mut self, index: usize) -> bool {
        if self.cancelled {
            return false;
        }
        match self.captures.get_mut(index) {
            Some(capture) if !capture.fired => {
                capture.fired = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, index: usize) -> bool {
        !self.cancelled && self.captures.get(index).is_some_and(|c| !c.fired)
    }

    /// Indices of captures that have not fired yet.
    pub fn unfired(&self) -> impl Iterator<Item = (usize, NaiveTime)> + '_ {
        self.captures
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.fired)
            .map(|(i, c)| (i, c.at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> MonitoringPlan {
        MonitoringPlan::new(
            WorkerId(1),
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            vec![
                NaiveTime::from_hms_opt(9, 5, 0).unwrap(),
                NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
            ],
        )
    }

    #[test]
    fn test_mark_fired_once() {
        let mut plan = plan();
        assert!(plan.is_pending(0));
        assert!(plan.mark_fired(0));
        assert!(!plan.mark_fired(0));
        assert!(!plan.is_pending(0));
        assert_eq!(plan.unfired().count(), 1);
    }

    #[test]
    fn test_cancelled_plan_absorbs_firing() {
        let mut plan = plan();
        plan.cancelled = true;
        assert!(!plan.is_pending(1));
        assert!(!plan.mark_fired(1));
        assert!(!plan.captures[1].fired);
    }

    #[test]
    fn test_unknown_index_is_ignored() {
        let mut plan = plan();
        assert!(!plan.mark_fired(5));
        assert_eq!(plan.planned_count(), 2);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&CaptureOutcome::CaptureFailed).unwrap();
        assert_eq!(json, "\"capture_failed\"");
    }
}
