use super::account::{Amount, PayerId};
use super::schedule::WorkSchedule;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A worker paid per completed day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub payer: PayerId,
    /// Pay for one completed working day.
    pub daily_rate: Amount,
    pub schedule: WorkSchedule,
    pub active: bool,
}

impl Worker {
    pub fn new(id: WorkerId, payer: PayerId, daily_rate: Amount, schedule: WorkSchedule) -> Self {
        Self {
            id,
            payer,
            daily_rate,
            schedule,
            active: true,
        }
    }
}
