//! Escalation sweeper: nothing stays pending past its deadline.

use super::Stores;
use super::payments::PaymentService;
use crate::domain::payment::Actor;
use crate::error::{Result, ShiftpayError};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const NO_ACTION_REASON: &str = "no employer action within deadline";
pub const INSUFFICIENT_FUNDS_REASON: &str = "insufficient funds for automatic settlement";
pub const SETTLEMENT_FAILED_REASON: &str = "automatic settlement failed";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub auto_settled: usize,
    pub escalated: usize,
    /// Payments another transition got to first. Picked up by the next sweep
    /// if they are still pending.
    pub conflicts: usize,
    pub failed: usize,
}

pub struct EscalationSweeper {
    stores: Stores,
    payments: Arc<PaymentService>,
    auto_settle_threshold: u8,
}

impl EscalationSweeper {
    pub fn new(stores: Stores, payments: Arc<PaymentService>, auto_settle_threshold: u8) -> Self {
        Self {
            stores,
            payments,
            auto_settle_threshold,
        }
    }

    /// Resolves every pending payment whose deadline is at or before `now`.
    ///
    /// Overdue payments come from the persisted deadlines, so a restart loses
    /// nothing. High-scoring days are approved by the system, the rest go to
    /// admin review.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for payment in self.stores.payments.overdue(now).await? {
            let outcome = if payment.score >= self.auto_settle_threshold {
                match self.payments.approve(payment.id, &Actor::System).await {
                    Ok(_) => {
                        report.auto_settled += 1;
                        Ok(())
                    }
                    Err(ShiftpayError::InsufficientFunds { .. }) => self
                        .payments
                        .escalate(payment.id, INSUFFICIENT_FUNDS_REASON)
                        .await
                        .map(|_| report.escalated += 1),
                    Err(e @ (ShiftpayError::IllegalTransition { .. }
                    | ShiftpayError::ConcurrencyConflict(_))) => Err(e),
                    Err(e) => {
                        tracing::warn!(payment = %payment.id, error = %e, "automatic settlement failed, escalating");
                        self.payments
                            .escalate(payment.id, &format!("{SETTLEMENT_FAILED_REASON}: {e}"))
                            .await
                            .map(|_| report.escalated += 1)
                    }
                }
            } else {
                self.payments
                    .escalate(payment.id, NO_ACTION_REASON)
                    .await
                    .map(|_| report.escalated += 1)
            };

            match outcome {
                Ok(()) => {}
                Err(ShiftpayError::IllegalTransition { .. } | ShiftpayError::ConcurrencyConflict(_)) => {
                    report.conflicts += 1;
                    tracing::debug!(payment = %payment.id, "payment moved on during sweep");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(payment = %payment.id, error = %e, "sweep could not resolve payment");
                }
            }
        }

        if report != SweepReport::default() {
            tracing::info!(
                %now,
                auto_settled = report.auto_settled,
                escalated = report.escalated,
                conflicts = report.conflicts,
                failed = report.failed,
                "sweep finished"
            );
        }
        Ok(report)
    }
}
