use super::monitoring::{CaptureOutcome, MonitoringEvent};
use super::worker::WorkerId;
use crate::error::{Result, ShiftpayError};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Running per-outcome counts. Survives pruning of the event detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventTally {
    pub present: u32,
    pub absent: u32,
    pub failed: u32,
}

impl EventTally {
    fn record(&mut self, outcome: CaptureOutcome) {
        match outcome {
            CaptureOutcome::Present => self.present += 1,
            CaptureOutcome::Absent => self.absent += 1,
            CaptureOutcome::CaptureFailed => self.failed += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.present + self.absent + self.failed
    }
}

/// One worker's attendance for one calendar day.
///
/// Created lazily on clock-in or on the first monitoring event. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub worker: WorkerId,
    pub date: NaiveDate,
    pub clock_in: Option<DateTime<Utc>>,
    pub clock_out: Option<DateTime<Utc>>,
    events: Vec<MonitoringEvent>,
    tally: EventTally,
    pub progress_reports: u32,
    pub pruned: bool,
}

impl AttendanceRecord {
    pub fn new(worker: WorkerId, date: NaiveDate) -> Self {
        Self {
            worker,
            date,
            clock_in: None,
            clock_out: None,
            events: Vec::new(),
            tally: EventTally::default(),
            progress_reports: 0,
            pruned: false,
        }
    }

    pub fn clock_in(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.clock_in.is_some() {
            return Err(ShiftpayError::Validation(format!(
                "worker {} already clocked in on {}",
                self.worker, self.date
            )));
        }
        self.clock_in = Some(at);
        Ok(())
    }

    pub fn clock_out(&mut self, at: DateTime<Utc>) -> Result<()> {
        let clock_in = self.clock_in.ok_or_else(|| {
            ShiftpayError::Validation(format!(
                "worker {} cannot clock out on {} without clocking in",
                self.worker, self.date
            ))
        })?;
        if self.clock_out.is_some() {
            return Err(ShiftpayError::Validation(format!(
                "worker {} already clocked out on {}",
                self.worker, self.date
            )));
        }
        if at < clock_in {
            return Err(ShiftpayError::Validation(format!(
                "clock-out {at} precedes clock-in {clock_in}"
            )));
        }
        self.clock_out = Some(at);
        Ok(())
    }

    pub fn append_event(&mut self, event: MonitoringEvent) {
        self.tally.record(event.outcome);
        if !self.pruned {
            self.events.push(event);
        }
    }

    pub fn submit_progress_report(&mut self) {
        self.progress_reports += 1;
    }

    pub fn events(&self) -> &[MonitoringEvent] {
        &self.events
    }

    pub fn tally(&self) -> EventTally {
        self.tally
    }

    pub fn is_complete(&self) -> bool {
        self.clock_in.is_some() && self.clock_out.is_some()
    }

    /// Hours between clock-in and clock-out, to two decimals.
    pub fn working_hours(&self) -> Option<Decimal> {
        let (start, end) = (self.clock_in?, self.clock_out?);
        let minutes = Decimal::from((end - start).num_minutes());
        Some((minutes / Decimal::from(60)).round_dp(2))
    }

    /// Drops the event detail, keeping clock times and the tally.
    pub fn prune(&mut self) {
        self.events.clear();
        self.events.shrink_to_fit();
        self.pruned = true;
    }
}
