//! Payment lifecycle service.
//!
//! Every transition of one payment runs under that payment's lock; balance
//! mutation additionally takes the payer's lock, nested inside. Neither lock
//! is held while the transfer network is called.

use super::Stores;
use super::locks::KeyedLocks;
use super::outbox::Outbox;
use crate::config::{Config, PayPolicy, ReconciliationPolicy};
use crate::domain::account::PayerId;
use crate::domain::payment::{Actor, Payment, PaymentId, PaymentStatus, TransferOutcome};
use crate::domain::ports::{Clock, NotificationKind, Recipient, TransferGateway};
use crate::domain::score::efficiency_score;
use crate::domain::worker::WorkerId;
use crate::error::{Result, ShiftpayError};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// A business action on a payment, as requested by an actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCommand {
    Approve,
    Decline { reason: String },
    AdminReview { approve: bool, note: String },
}

pub struct PaymentService {
    stores: Stores,
    gateway: Arc<dyn TransferGateway>,
    clock: Arc<dyn Clock>,
    outbox: Arc<Outbox>,
    config: Config,
    payment_locks: KeyedLocks<PaymentId>,
    payer_locks: KeyedLocks<PayerId>,
}

impl PaymentService {
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn TransferGateway>,
        clock: Arc<dyn Clock>,
        outbox: Arc<Outbox>,
        config: Config,
    ) -> Self {
        Self {
            stores,
            gateway,
            clock,
            outbox,
            config,
            payment_locks: KeyedLocks::new(),
            payer_locks: KeyedLocks::new(),
        }
    }

    pub async fn get(&self, id: PaymentId) -> Result<Payment> {
        self.stores
            .payments
            .get(id)
            .await?
            .ok_or_else(|| ShiftpayError::NotFound(format!("payment {id}")))
    }

    /// Creates the payment of one completed worker-day.
    ///
    /// A second call for the same (worker, date) returns the existing payment.
    /// With an auto-approve threshold configured, a payment scoring at or
    /// above it is approved by the system straight away.
    pub async fn create(&self, worker: WorkerId, date: NaiveDate) -> Result<Payment> {
        let worker = self
            .stores
            .workers
            .get(worker)
            .await?
            .ok_or_else(|| ShiftpayError::NotFound(format!("worker {worker}")))?;

        if let Some(existing) = self.stores.payments.get_for_day(worker.id, date).await? {
            return Ok(existing);
        }

        let record = self
            .stores
            .attendance
            .get(worker.id, date)
            .await?
            .filter(|record| record.is_complete())
            .ok_or_else(|| {
                ShiftpayError::Validation(format!(
                    "worker {} has no complete attendance on {date}",
                    worker.id
                ))
            })?;
        let planned = self
            .stores
            .plans
            .get(worker.id, date)
            .await?
            .map_or(0, |plan| plan.planned_count());
        let score = efficiency_score(&record, planned);

        let amount = match self.config.pay_policy {
            PayPolicy::FullDay => worker.daily_rate,
            PayPolicy::ScoreWeighted => worker.daily_rate.scaled_by_percent(score)?,
        };

        let candidate = Payment::new(
            worker.id,
            worker.payer,
            date,
            amount,
            &self.config.currency,
            score,
            self.clock.now(),
            self.config.approval_window(),
        );
        let (payment, created) = self.stores.payments.create_if_absent(candidate).await?;
        if !created {
            return Ok(payment);
        }

        tracing::info!(payment = %payment.id, worker = %payment.worker, %date, %amount, score, "payment created");
        self.notify(
            &payment,
            NotificationKind::PaymentCreated,
            [Recipient::Payer(payment.payer), Recipient::Worker(payment.worker)],
        );

        match self.config.auto_approve_threshold {
            Some(threshold) if score >= threshold => {
                match self.approve(payment.id, &Actor::System).await {
                    Ok(approved) => Ok(approved),
                    Err(ShiftpayError::InsufficientFunds { .. }) => {
                        tracing::warn!(payment = %payment.id, "auto-approval deferred, payer cannot cover it");
                        Ok(payment)
                    }
                    Err(e) => Err(e),
                }
            }
            _ => Ok(payment),
        }
    }

    /// `pending -> approved -> settling` by the payer of record (or the
    /// system), debiting the payer once before the transfer starts.
    pub async fn approve(&self, id: PaymentId, actor: &Actor) -> Result<Payment> {
        let payment = self
            .debit_and_transition(id, |payment, at| {
                ensure_payer_or_system(payment, actor)?;
                payment.approve(actor, at)
            })
            .await?;
        tracing::info!(payment = %id, %actor, "payment approved");
        self.notify(
            &payment,
            NotificationKind::PaymentApproved,
            [Recipient::Worker(payment.worker)],
        );
        self.dispatch_transfer(payment).await
    }

    /// `pending -> declined -> admin_review`. A decline always ends up in
    /// front of an admin.
    pub async fn decline(&self, id: PaymentId, actor: &Actor, reason: &str) -> Result<Payment> {
        let payment = self
            .update(id, |payment, at| {
                if !matches!(actor, Actor::Payer(_)) {
                    return Err(ShiftpayError::Unauthorized(format!(
                        "{actor} cannot decline payment {id}"
                    )));
                }
                ensure_payer_or_system(payment, actor)?;
                payment.decline(actor, reason, at)
            })
            .await?;
        tracing::info!(payment = %id, %actor, reason, "payment declined");
        self.notify(
            &payment,
            NotificationKind::PaymentDeclined,
            [Recipient::Admins, Recipient::Worker(payment.worker)],
        );
        Ok(payment)
    }

    /// Moves an overdue pending payment to admin review without a payer
    /// decision.
    pub async fn escalate(&self, id: PaymentId, reason: &str) -> Result<Payment> {
        let payment = self
            .update(id, |payment, at| payment.escalate(reason, at))
            .await?;
        tracing::info!(payment = %id, reason, "payment escalated");
        self.notify(
            &payment,
            NotificationKind::PaymentEscalated,
            [Recipient::Admins, Recipient::Payer(payment.payer)],
        );
        Ok(payment)
    }

    /// Resolves a payment under admin review. Approval runs the same balance
    /// check and debit as [`PaymentService::approve`].
    pub async fn admin_review(
        &self,
        id: PaymentId,
        admin: &Actor,
        approve: bool,
        note: &str,
    ) -> Result<Payment> {
        if !matches!(admin, Actor::Admin(_)) {
            return Err(ShiftpayError::Unauthorized(format!(
                "{admin} cannot review payment {id}"
            )));
        }

        if approve {
            let payment = self
                .debit_and_transition(id, |payment, at| payment.admin_approve(admin, note, at))
                .await?;
            tracing::info!(payment = %id, %admin, "payment approved on review");
            self.notify(
                &payment,
                NotificationKind::PaymentApproved,
                [Recipient::Worker(payment.worker), Recipient::Payer(payment.payer)],
            );
            self.dispatch_transfer(payment).await
        } else {
            let payment = self
                .update(id, |payment, at| payment.admin_reject(admin, note, at))
                .await?;
            tracing::info!(payment = %id, %admin, "payment rejected on review");
            self.notify(
                &payment,
                NotificationKind::PaymentRejected,
                [Recipient::Worker(payment.worker), Recipient::Payer(payment.payer)],
            );
            Ok(payment)
        }
    }

    /// Records the transfer network's final answer.
    ///
    /// A failure leaves the payer's debit in place unless the reconciliation
    /// policy credits it back.
    pub async fn settle(&self, id: PaymentId, outcome: TransferOutcome) -> Result<Payment> {
        let payment = self
            .update(id, |payment, at| payment.settle(&outcome, at))
            .await?;

        match &outcome {
            TransferOutcome::Succeeded { transfer_ref } => {
                tracing::info!(payment = %id, %transfer_ref, "payment completed");
                self.notify(
                    &payment,
                    NotificationKind::PaymentCompleted,
                    [Recipient::Worker(payment.worker), Recipient::Payer(payment.payer)],
                );
                Ok(payment)
            }
            TransferOutcome::Failed { reason } => {
                tracing::warn!(payment = %id, %reason, "payment failed");
                self.notify(
                    &payment,
                    NotificationKind::PaymentFailed,
                    [
                        Recipient::Worker(payment.worker),
                        Recipient::Payer(payment.payer),
                        Recipient::Admins,
                    ],
                );
                match self.config.reconciliation {
                    ReconciliationPolicy::CreditBack => {
                        match self.reconcile_failed(id, &Actor::System).await {
                            Ok(reversed) => Ok(reversed),
                            Err(e) => {
                                tracing::error!(payment = %id, error = %e, "credit-back failed, left for manual reconciliation");
                                Ok(payment)
                            }
                        }
                    }
                    ReconciliationPolicy::Manual => Ok(payment),
                }
            }
        }
    }

    /// Callback for results pushed by the transfer network. The reference is
    /// the payment id handed to `initiate`.
    pub async fn on_transfer_result(
        &self,
        reference: PaymentId,
        outcome: TransferOutcome,
    ) -> Result<Payment> {
        self.settle(reference, outcome).await
    }

    /// Credits the payer back for a failed settlement. At most once per
    /// payment.
    pub async fn reconcile_failed(&self, id: PaymentId, actor: &Actor) -> Result<Payment> {
        if matches!(actor, Actor::Payer(_)) {
            return Err(ShiftpayError::Unauthorized(format!(
                "{actor} cannot reconcile payment {id}"
            )));
        }

        let _guard = self
            .payment_locks
            .acquire_within(&id, self.config.lock_timeout())
            .await?;
        let mut payment = self.get(id).await?;
        let at = self.clock.now();
        payment.mark_reversed(at)?;

        {
            let _payer = self.payer_locks.acquire(&payment.payer).await;
            let mut account = self
                .stores
                .payers
                .get(payment.payer)
                .await?
                .ok_or_else(|| ShiftpayError::NotFound(format!("payer {}", payment.payer)))?;
            account.credit(payment.amount);
            self.stores.payers.store(account).await?;
        }
        self.stores.payments.store(payment.clone()).await?;

        tracing::info!(payment = %id, %actor, amount = %payment.amount, "failed payment credited back");
        self.notify(
            &payment,
            NotificationKind::PaymentReversed,
            [Recipient::Payer(payment.payer)],
        );
        Ok(payment)
    }

    /// Single entry point for actor-driven transitions.
    pub async fn transition(
        &self,
        id: PaymentId,
        command: PaymentCommand,
        actor: &Actor,
    ) -> Result<Payment> {
        match command {
            PaymentCommand::Approve => self.approve(id, actor).await,
            PaymentCommand::Decline { reason } => self.decline(id, actor, &reason).await,
            PaymentCommand::AdminReview { approve, note } => {
                self.admin_review(id, actor, approve, &note).await
            }
        }
    }

    /// Asks the transfer network about every settling payment and applies
    /// the outcomes that are final. Returns how many were settled.
    pub async fn poll_settlements(&self) -> Result<usize> {
        let mut settled = 0;
        for payment in self.stores.payments.in_status(PaymentStatus::Settling).await? {
            let outcome = match self.gateway.poll_result(payment.id).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(payment = %payment.id, error = %e, "transfer status unavailable");
                    continue;
                }
            };
            match self.settle(payment.id, outcome).await {
                Ok(_) => settled += 1,
                Err(ShiftpayError::IllegalTransition { .. }) => {
                    tracing::debug!(payment = %payment.id, "settled concurrently");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(settled)
    }

    /// Applies `apply` to the stored payment under its lock. Nothing is
    /// written when `apply` fails.
    async fn update(
        &self,
        id: PaymentId,
        apply: impl FnOnce(&mut Payment, DateTime<Utc>) -> Result<()>,
    ) -> Result<Payment> {
        let _guard = self
            .payment_locks
            .acquire_within(&id, self.config.lock_timeout())
            .await?;
        let mut payment = self.get(id).await?;
        apply(&mut payment, self.clock.now())?;
        self.stores.payments.store(payment.clone()).await?;
        Ok(payment)
    }

    /// Like [`PaymentService::update`], and additionally debits the payer for
    /// the payment amount. Insufficient funds leave both records untouched.
    async fn debit_and_transition(
        &self,
        id: PaymentId,
        apply: impl FnOnce(&mut Payment, DateTime<Utc>) -> Result<()>,
    ) -> Result<Payment> {
        let _guard = self
            .payment_locks
            .acquire_within(&id, self.config.lock_timeout())
            .await?;
        let mut payment = self.get(id).await?;
        if payment.debited {
            return Err(payment.illegal("debit"));
        }
        apply(&mut payment, self.clock.now())?;

        let _payer = self.payer_locks.acquire(&payment.payer).await;
        let mut account = self
            .stores
            .payers
            .get(payment.payer)
            .await?
            .ok_or_else(|| ShiftpayError::NotFound(format!("payer {}", payment.payer)))?;
        let before = account.clone();
        account.debit(payment.amount)?;
        self.stores.payers.store(account).await?;

        payment.debited = true;
        if let Err(e) = self.stores.payments.store(payment.clone()).await {
            self.stores.payers.store(before).await?;
            return Err(e);
        }
        tracing::debug!(payment = %id, payer = %payment.payer, amount = %payment.amount, "payer debited");
        Ok(payment)
    }

    /// Hands a settling payment to the transfer network, outside any lock.
    ///
    /// A call error or a refused transfer is final for this attempt and
    /// settles the payment as failed. An accepted transfer stays settling
    /// until its outcome is pushed or polled.
    async fn dispatch_transfer(&self, payment: Payment) -> Result<Payment> {
        let receipt = self
            .gateway
            .initiate(payment.worker, payment.amount, payment.id)
            .await;

        let failure = match receipt {
            Err(e) => Some(e.to_string()),
            Ok(receipt) if !receipt.accepted => Some(
                receipt
                    .error
                    .unwrap_or_else(|| "transfer refused".to_string()),
            ),
            Ok(receipt) => {
                tracing::debug!(payment = %payment.id, transfer_ref = ?receipt.transfer_ref, "transfer accepted");
                None
            }
        };
        if let Some(reason) = failure {
            tracing::warn!(payment = %payment.id, %reason, "transfer could not be started");
            return self
                .settle(payment.id, TransferOutcome::Failed { reason })
                .await;
        }

        match self.gateway.poll_result(payment.id).await {
            Ok(Some(outcome)) => self.settle(payment.id, outcome).await,
            Ok(None) => Ok(payment),
            Err(e) => {
                tracing::warn!(payment = %payment.id, error = %e, "transfer status unavailable");
                Ok(payment)
            }
        }
    }

    fn notify<const N: usize>(
        &self,
        payment: &Payment,
        kind: NotificationKind,
        recipients: [Recipient; N],
    ) {
        let payload = serde_json::json!({
            "payment": payment.id.to_string(),
            "worker": payment.worker.0,
            "payer": payment.payer.0,
            "date": payment.date.to_string(),
            "amount": payment.amount.to_string(),
            "currency": payment.currency,
            "status": payment.status.as_str(),
        });
        for recipient in recipients {
            self.outbox.push(recipient, kind, payload.clone());
        }
    }
}

fn ensure_payer_or_system(payment: &Payment, actor: &Actor) -> Result<()> {
    match actor {
        Actor::System => Ok(()),
        Actor::Payer(payer) if *payer == payment.payer => Ok(()),
        _ => Err(ShiftpayError::Unauthorized(format!(
            "{actor} is not the payer of record for payment {}",
            payment.id
        ))),
    }
}
