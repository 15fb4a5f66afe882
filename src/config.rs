//! Runtime configuration, read from an optional JSON file.

use crate::domain::schedule::parse_time;
use crate::error::{Result, ShiftpayError};
use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// How the payment amount is derived from the worker's daily rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayPolicy {
    /// The full daily rate for every completed day.
    #[default]
    FullDay,
    /// `daily_rate * score / 100`, rounded to cents.
    ScoreWeighted,
}

/// What happens to the payer's debit when a transfer fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationPolicy {
    /// The debit stays until an admin reconciles the payment explicitly.
    #[default]
    Manual,
    /// The amount is credited back as soon as the failure is recorded.
    CreditBack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture instants drawn per worker per day.
    pub capture_target_count: usize,
    pub approval_window_minutes: i64,
    /// Payments scoring at least this are approved by the system at creation.
    pub auto_approve_threshold: Option<u8>,
    /// Overdue payments scoring at least this are approved by the sweeper.
    pub auto_settle_threshold: u8,
    pub sweep_interval_secs: u64,
    #[serde(serialize_with = "serialize_time", deserialize_with = "deserialize_time")]
    pub day_start: NaiveTime,
    #[serde(serialize_with = "serialize_time", deserialize_with = "deserialize_time")]
    pub end_of_day: NaiveTime,
    pub currency: String,
    pub pay_policy: PayPolicy,
    pub reconciliation: ReconciliationPolicy,
    /// Upper bound on waiting for a busy payment before reporting a conflict.
    pub lock_timeout_ms: u64,
    /// Monitoring event detail older than this many days is pruned.
    pub retention_days: Option<u32>,
    pub outbox_drain_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_target_count: 10,
            approval_window_minutes: 60,
            auto_approve_threshold: None,
            auto_settle_threshold: 70,
            sweep_interval_secs: 300,
            day_start: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default(),
            end_of_day: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
            currency: "USD".to_string(),
            pay_policy: PayPolicy::default(),
            reconciliation: ReconciliationPolicy::default(),
            lock_timeout_ms: 500,
            retention_days: None,
            outbox_drain_interval_secs: 5,
        }
    }
}

fn serialize_time<S: Serializer>(time: &NaiveTime, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format("%H:%M").to_string())
}

fn deserialize_time<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_time(&raw).map_err(serde::de::Error::custom)
}

impl Config {
    /// Loads and validates a JSON config file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.approval_window_minutes <= 0 {
            return Err(ShiftpayError::Validation(
                "approval_window_minutes must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0
            || self.sweep_interval_secs as i64 > self.approval_window_minutes * 60
        {
            return Err(ShiftpayError::Validation(
                "sweep_interval_secs must be positive and no longer than the approval window"
                    .to_string(),
            ));
        }
        if self.auto_settle_threshold > 100 || self.auto_approve_threshold.is_some_and(|t| t > 100) {
            return Err(ShiftpayError::Validation(
                "score thresholds must lie in 0..=100".to_string(),
            ));
        }
        if self.end_of_day <= self.day_start {
            return Err(ShiftpayError::Validation(
                "end_of_day must be after day_start".to_string(),
            ));
        }
        if self.currency.trim().is_empty() {
            return Err(ShiftpayError::Validation("currency must be set".to_string()));
        }
        if self.lock_timeout_ms == 0 || self.outbox_drain_interval_secs == 0 {
            return Err(ShiftpayError::Validation(
                "lock_timeout_ms and outbox_drain_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn approval_window(&self) -> Duration {
        Duration::minutes(self.approval_window_minutes)
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }
}
