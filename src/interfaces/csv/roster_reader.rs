use crate::domain::account::{Amount, PayerId};
use crate::domain::schedule::{BreakInterval, WorkSchedule, parse_time, parse_weekday};
use crate::domain::worker::{Worker, WorkerId};
use crate::error::{Result, ShiftpayError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One line of the roster file.
///
/// `breaks` is a `;`-separated list of `HH:MM-HH:MM` intervals (may be
/// empty), `weekdays` a `|`-separated list such as `mon|tue|wed`.
#[derive(Debug, Deserialize)]
struct RosterRow {
    worker: u32,
    payer: u32,
    daily_rate: Decimal,
    start: String,
    end: String,
    #[serde(default)]
    breaks: String,
    weekdays: String,
}

impl RosterRow {
    fn into_worker(self) -> Result<Worker> {
        let breaks = self
            .breaks
            .split(';')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::parse::<BreakInterval>)
            .collect::<Result<Vec<_>>>()?;
        let weekdays = self
            .weekdays
            .split('|')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(parse_weekday)
            .collect::<Result<Vec<_>>>()?;
        if weekdays.is_empty() {
            return Err(ShiftpayError::Validation(format!(
                "worker {} has no working weekdays",
                self.worker
            )));
        }

        let schedule = WorkSchedule::new(
            weekdays,
            parse_time(&self.start)?,
            parse_time(&self.end)?,
            breaks,
        )?;
        Ok(Worker::new(
            WorkerId(self.worker),
            PayerId(self.payer),
            Amount::new(self.daily_rate)?,
            schedule,
        ))
    }
}

/// Reads workers and their schedules from a CSV roster.
///
/// Every row is validated on its own: a bad row yields an error item and
/// the following rows are still read.
pub struct RosterReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RosterReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn workers(self) -> impl Iterator<Item = Result<Worker>> {
        self.reader
            .into_deserialize::<RosterRow>()
            .map(|row| row.map_err(ShiftpayError::from).and_then(RosterRow::into_worker))
    }
}
