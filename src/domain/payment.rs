use super::account::{Amount, PayerId};
use super::worker::WorkerId;
use crate::error::{Result, ShiftpayError};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PaymentId {
    type Err = ShiftpayError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ShiftpayError::Validation(format!("invalid payment id '{s}': {e}")))
    }
}

/// Lifecycle states of a payment.
///
/// ```text
/// pending ──► approved ─────────────┐
///    │                              ▼
///    └──► declined ──► admin_review ──► admin_approved ──► settling ──► completed
///                           │                                  │
///                           └──► admin_rejected                └──► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Declined,
    AdminReview,
    AdminApproved,
    AdminRejected,
    Settling,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// The transition table. Anything not listed here is illegal.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Declined)
                | (Declined, AdminReview)
                | (AdminReview, AdminApproved)
                | (AdminReview, AdminRejected)
                | (Approved, Settling)
                | (AdminApproved, Settling)
                | (Settling, Completed)
                | (Settling, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::AdminRejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
            Self::AdminReview => "admin_review",
            Self::AdminApproved => "admin_approved",
            Self::AdminRejected => "admin_rejected",
            Self::Settling => "settling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Actor {
    Payer(PayerId),
    Admin(String),
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payer(id) => write!(f, "payer:{id}"),
            Self::Admin(name) => write!(f, "admin:{name}"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Result reported by the transfer network for a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    Succeeded { transfer_ref: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub at: DateTime<Utc>,
    pub actor: Actor,
}

/// A wage payment for one worker-day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub worker: WorkerId,
    pub payer: PayerId,
    pub date: NaiveDate,
    /// Fixed at creation, never recomputed.
    pub amount: Amount,
    pub currency: String,
    /// Efficiency score of the day when the payment was created.
    pub score: u8,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: PaymentStatus,
    pub approved_by: Option<Actor>,
    pub approved_at: Option<DateTime<Utc>>,
    pub declined_by: Option<Actor>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub admin_reviewed_by: Option<Actor>,
    pub admin_reviewed_at: Option<DateTime<Utc>>,
    pub admin_note: Option<String>,
    pub escalation_reason: Option<String>,
    pub transfer_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    /// Set once the payer's balance has been debited for this payment.
    pub debited: bool,
    pub reversed_at: Option<DateTime<Utc>>,
    pub history: Vec<StatusChange>,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker: WorkerId,
        payer: PayerId,
        date: NaiveDate,
        amount: Amount,
        currency: &str,
        score: u8,
        now: DateTime<Utc>,
        approval_window: Duration,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            worker,
            payer,
            date,
            amount,
            currency: currency.to_string(),
            score,
            created_at: now,
            deadline: now + approval_window,
            status: PaymentStatus::Pending,
            approved_by: None,
            approved_at: None,
            declined_by: None,
            declined_at: None,
            decline_reason: None,
            admin_reviewed_by: None,
            admin_reviewed_at: None,
            admin_note: None,
            escalation_reason: None,
            transfer_ref: None,
            failure_reason: None,
            settled_at: None,
            debited: false,
            reversed_at: None,
            history: Vec::new(),
        }
    }

    /// Moves to `next` if the transition table allows it.
    pub fn transition(
        &mut self,
        next: PaymentStatus,
        actor: &Actor,
        at: DateTime<Utc>,
        action: &'static str,
    ) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(self.illegal(action));
        }
        self.history.push(StatusChange {
            from: self.status,
            to: next,
            at,
            actor: actor.clone(),
        });
        self.status = next;
        Ok(())
    }

    /// Fails with `IllegalTransition` unless the payment is in `expected`.
    pub fn ensure_status(&self, expected: PaymentStatus, action: &'static str) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(self.illegal(action))
        }
    }

    pub fn illegal(&self, action: &'static str) -> ShiftpayError {
        ShiftpayError::IllegalTransition {
            payment: self.id.to_string(),
            status: self.status,
            action,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && self.deadline <= now
    }

    /// `pending -> approved -> settling`, recording the approver.
    pub fn approve(&mut self, actor: &Actor, at: DateTime<Utc>) -> Result<()> {
        self.ensure_status(PaymentStatus::Pending, "approve")?;
        self.transition(PaymentStatus::Approved, actor, at, "approve")?;
        self.approved_by = Some(actor.clone());
        self.approved_at = Some(at);
        self.transition(PaymentStatus::Settling, actor, at, "approve")
    }

    /// `pending -> declined -> admin_review`.
    pub fn decline(&mut self, actor: &Actor, reason: &str, at: DateTime<Utc>) -> Result<()> {
        self.ensure_status(PaymentStatus::Pending, "decline")?;
        if reason.trim().is_empty() {
            return Err(ShiftpayError::Validation(
                "a decline reason is mandatory".to_string(),
            ));
        }
        self.transition(PaymentStatus::Declined, actor, at, "decline")?;
        self.declined_by = Some(actor.clone());
        self.declined_at = Some(at);
        self.decline_reason = Some(reason.trim().to_string());
        self.transition(PaymentStatus::AdminReview, actor, at, "decline")
    }

    /// `pending -> declined -> admin_review` without a payer decision.
    pub fn escalate(&mut self, reason: &str, at: DateTime<Utc>) -> Result<()> {
        self.ensure_status(PaymentStatus::Pending, "escalate")?;
        self.transition(PaymentStatus::Declined, &Actor::System, at, "escalate")?;
        self.escalation_reason = Some(reason.to_string());
        self.transition(PaymentStatus::AdminReview, &Actor::System, at, "escalate")
    }

    /// `admin_review -> admin_approved -> settling`.
    pub fn admin_approve(&mut self, admin: &Actor, note: &str, at: DateTime<Utc>) -> Result<()> {
        self.ensure_status(PaymentStatus::AdminReview, "admin approve")?;
        self.transition(PaymentStatus::AdminApproved, admin, at, "admin approve")?;
        self.record_review(admin, note, at);
        self.transition(PaymentStatus::Settling, admin, at, "admin approve")
    }

    /// `admin_review -> admin_rejected`.
    pub fn admin_reject(&mut self, admin: &Actor, note: &str, at: DateTime<Utc>) -> Result<()> {
        self.ensure_status(PaymentStatus::AdminReview, "admin reject")?;
        self.transition(PaymentStatus::AdminRejected, admin, at, "admin reject")?;
        self.record_review(admin, note, at);
        Ok(())
    }

    fn record_review(&mut self, admin: &Actor, note: &str, at: DateTime<Utc>) {
        self.admin_reviewed_by = Some(admin.clone());
        self.admin_reviewed_at = Some(at);
        self.admin_note = Some(note.to_string()).filter(|n| !n.trim().is_empty());
    }

    /// `settling -> completed | failed`. The debit is left untouched.
    pub fn settle(&mut self, outcome: &TransferOutcome, at: DateTime<Utc>) -> Result<()> {
        self.ensure_status(PaymentStatus::Settling, "settle")?;
        match outcome {
            TransferOutcome::Succeeded { transfer_ref } => {
                self.transition(PaymentStatus::Completed, &Actor::System, at, "settle")?;
                self.transfer_ref = Some(transfer_ref.clone());
            }
            TransferOutcome::Failed { reason } => {
                self.transition(PaymentStatus::Failed, &Actor::System, at, "settle")?;
                self.failure_reason = Some(reason.clone());
            }
        }
        self.settled_at = Some(at);
        Ok(())
    }

    /// Marks the debit of a failed settlement as credited back.
    pub fn mark_reversed(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.ensure_status(PaymentStatus::Failed, "reverse")?;
        if !self.debited || self.reversed_at.is_some() {
            return Err(self.illegal("reverse"));
        }
        self.reversed_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 18, 0, 0).unwrap()
    }

    fn payment() -> Payment {
        Payment::new(
            WorkerId(1),
            PayerId(10),
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            Amount::new(dec!(120.00)).unwrap(),
            "USD",
            90,
            now(),
            Duration::hours(1),
        )
    }

    #[test]
    fn test_new_payment_is_pending_with_deadline() {
        let payment = payment();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.deadline, now() + Duration::hours(1));
        assert!(!payment.is_overdue(now()));
        assert!(payment.is_overdue(now() + Duration::hours(1)));
    }

    #[test]
    fn test_transition_table() {
        use PaymentStatus::*;
        let all = [
            Pending,
            Approved,
            Declined,
            AdminReview,
            AdminApproved,
            AdminRejected,
            Settling,
            Completed,
            Failed,
        ];
        let legal: Vec<(PaymentStatus, PaymentStatus)> = all
            .iter()
            .flat_map(|a| all.iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| a.can_transition_to(*b))
            .collect();
        assert_eq!(legal.len(), 9);

        for terminal in [Completed, Failed, AdminRejected] {
            assert!(terminal.is_terminal());
            assert!(all.iter().all(|next| !terminal.can_transition_to(*next)));
        }
        assert!(!Declined.can_transition_to(AdminRejected));
        assert!(!Pending.can_transition_to(Settling));
    }

    #[test]
    fn test_approve_moves_to_settling() {
        let mut payment = payment();
        payment.approve(&Actor::Payer(PayerId(10)), now()).unwrap();
        assert_eq!(payment.status, PaymentStatus::Settling);
        assert_eq!(payment.approved_by, Some(Actor::Payer(PayerId(10))));
        assert_eq!(payment.history.len(), 2);

        let err = payment.approve(&Actor::Payer(PayerId(10)), now()).unwrap_err();
        assert!(matches!(
            err,
            ShiftpayError::IllegalTransition {
                status: PaymentStatus::Settling,
                ..
            }
        ));
    }

    #[test]
    fn test_decline_requires_reason() {
        let mut payment = payment();
        let err = payment
            .decline(&Actor::Payer(PayerId(10)), "  ", now())
            .unwrap_err();
        assert!(matches!(err, ShiftpayError::Validation(_)));
        assert_eq!(payment.status, PaymentStatus::Pending);

        payment
            .decline(&Actor::Payer(PayerId(10)), "disputed hours", now())
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::AdminReview);
        assert_eq!(payment.decline_reason.as_deref(), Some("disputed hours"));
    }

    #[test]
    fn test_admin_reject_is_terminal() {
        let mut payment = payment();
        let admin = Actor::Admin("ops".into());
        payment
            .decline(&Actor::Payer(PayerId(10)), "disputed hours", now())
            .unwrap();
        payment.admin_reject(&admin, "confirmed", now()).unwrap();
        assert_eq!(payment.status, PaymentStatus::AdminRejected);
        assert!(payment.admin_approve(&admin, "", now()).is_err());
        assert_eq!(payment.admin_note.as_deref(), Some("confirmed"));
    }

    #[test]
    fn test_settle_records_outcome() {
        let mut ok = payment();
        ok.approve(&Actor::System, now()).unwrap();
        ok.settle(
            &TransferOutcome::Succeeded {
                transfer_ref: "tr-1".into(),
            },
            now(),
        )
        .unwrap();
        assert_eq!(ok.status, PaymentStatus::Completed);
        assert_eq!(ok.transfer_ref.as_deref(), Some("tr-1"));

        let mut failed = payment();
        failed.approve(&Actor::System, now()).unwrap();
        failed
            .settle(
                &TransferOutcome::Failed {
                    reason: "account closed".into(),
                },
                now(),
            )
            .unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("account closed"));
        assert!(failed.settle(&TransferOutcome::Failed { reason: "x".into() }, now()).is_err());
    }

    #[test]
    fn test_history_never_revisits_a_status() {
        let mut payment = payment();
        let admin = Actor::Admin("ops".into());
        payment.escalate("no employer action within deadline", now()).unwrap();
        payment.admin_approve(&admin, "ok", now()).unwrap();
        payment
            .settle(
                &TransferOutcome::Succeeded {
                    transfer_ref: "tr".into(),
                },
                now(),
            )
            .unwrap();

        let mut visited = vec![PaymentStatus::Pending];
        visited.extend(payment.history.iter().map(|c| c.to));
        let unique: std::collections::HashSet<_> = visited.iter().collect();
        assert_eq!(unique.len(), visited.len());
        assert_eq!(visited.len(), 6);
    }

    #[test]
    fn test_mark_reversed_once() {
        let mut payment = payment();
        payment.approve(&Actor::System, now()).unwrap();
        payment.debited = true;
        payment
            .settle(&TransferOutcome::Failed { reason: "x".into() }, now())
            .unwrap();
        payment.mark_reversed(now()).unwrap();
        assert!(payment.mark_reversed(now()).is_err());
    }

    #[test]
    fn test_payment_id_parsing() {
        let id = PaymentId::new();
        assert_eq!(id.to_string().parse::<PaymentId>().unwrap(), id);
        assert!("nope".parse::<PaymentId>().is_err());
    }
}
