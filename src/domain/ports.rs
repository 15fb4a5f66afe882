//! Boundaries to storage and to the collaborators this crate does not implement.

use super::account::{Amount, PayerAccount, PayerId};
use super::attendance::AttendanceRecord;
use super::monitoring::MonitoringPlan;
use super::payment::{Payment, PaymentId, PaymentStatus, TransferOutcome};
use super::worker::{Worker, WorkerId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait WorkerStore: Send + Sync {
    async fn store(&self, worker: Worker) -> Result<()>;
    async fn get(&self, id: WorkerId) -> Result<Option<Worker>>;
    async fn all_workers(&self) -> Result<Vec<Worker>>;
}

#[async_trait]
pub trait PayerStore: Send + Sync {
    async fn store(&self, account: PayerAccount) -> Result<()>;
    async fn get(&self, payer: PayerId) -> Result<Option<PayerAccount>>;
    async fn all_accounts(&self) -> Result<Vec<PayerAccount>>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn store(&self, plan: MonitoringPlan) -> Result<()>;
    async fn get(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<MonitoringPlan>>;
    /// Plans of `worker` that have not been cancelled.
    async fn live_plans(&self, worker: WorkerId) -> Result<Vec<MonitoringPlan>>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn store(&self, record: AttendanceRecord) -> Result<()>;
    async fn get(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<AttendanceRecord>>;
    /// Unpruned records dated strictly before `cutoff`.
    async fn unpruned_before(&self, cutoff: NaiveDate) -> Result<Vec<AttendanceRecord>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Atomically inserts `payment` unless one exists for its (worker, date).
    /// Returns the stored payment and whether it was created by this call.
    async fn create_if_absent(&self, payment: Payment) -> Result<(Payment, bool)>;
    async fn store(&self, payment: Payment) -> Result<()>;
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn get_for_day(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<Payment>>;
    /// Pending payments whose deadline is at or before `now`.
    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Payment>>;
    async fn in_status(&self, status: PaymentStatus) -> Result<Vec<Payment>>;
    async fn all_payments(&self) -> Result<Vec<Payment>>;
}

pub type WorkerStoreBox = Box<dyn WorkerStore>;
pub type PayerStoreBox = Box<dyn PayerStore>;
pub type PlanStoreBox = Box<dyn PlanStore>;
pub type AttendanceStoreBox = Box<dyn AttendanceStore>;
pub type PaymentStoreBox = Box<dyn PaymentStore>;

/// What a successful presence capture reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub present: bool,
    pub evidence: Option<String>,
}

/// Checks whether a worker is currently detectably present.
///
/// `Err` means the capture itself failed (network, hardware), which is not
/// the same as a capture reporting `present = false`.
#[async_trait]
pub trait PresenceCapture: Send + Sync {
    async fn capture(&self, worker: WorkerId) -> Result<CaptureReport>;
}

/// Immediate answer of the transfer network to a transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub accepted: bool,
    pub transfer_ref: Option<String>,
    pub error: Option<String>,
}

/// Funds-transfer network. `initiate` must be idempotent per `reference`.
///
/// The final result arrives later, either pushed through
/// `PaymentService::on_transfer_result` or pulled with `poll_result`.
#[async_trait]
pub trait TransferGateway: Send + Sync {
    async fn initiate(
        &self,
        recipient: WorkerId,
        amount: Amount,
        reference: PaymentId,
    ) -> Result<TransferReceipt>;

    /// The final outcome of a transfer, or `None` while it is in flight.
    async fn poll_result(&self, reference: PaymentId) -> Result<Option<TransferOutcome>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Recipient {
    Worker(WorkerId),
    Payer(PayerId),
    Admins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentCreated,
    PaymentApproved,
    PaymentDeclined,
    PaymentEscalated,
    PaymentRejected,
    PaymentCompleted,
    PaymentFailed,
    PaymentReversed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

/// Fire-and-forget delivery. Failures are logged by the caller, never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, intent: &NotificationIntent) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type TimerTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type CancelHook = Box<dyn FnOnce() + Send>;

const LIVE: u8 = 0;
const CANCELLED: u8 = 1;
const FIRED: u8 = 2;

/// Handle to a scheduled callback. Cancelling is idempotent and may race
/// with firing; a task that has already started is not interrupted.
#[derive(Clone, Default)]
pub struct TimerHandle {
    state: Arc<AtomicU8>,
    on_cancel: Arc<Mutex<Option<CancelHook>>>,
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .field("fired", &self.has_fired())
            .finish()
    }
}

impl TimerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `hook` once if the timer is cancelled before it fires. Runs it
    /// right away if that already happened.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        *self.lock_hook() = Some(Box::new(hook));
        if self.is_cancelled() {
            self.run_hook();
        }
    }

    pub fn cancel(&self) {
        if self
            .state
            .compare_exchange(LIVE, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.run_hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCELLED
    }

    /// Claims the right to run. Returns `false` if cancelled or already fired.
    pub fn begin_fire(&self) -> bool {
        self.state
            .compare_exchange(LIVE, FIRED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }

    /// Neither fired nor cancelled.
    pub fn is_live(&self) -> bool {
        self.state.load(Ordering::SeqCst) == LIVE
    }

    fn run_hook(&self) {
        let hook = self.lock_hook().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn lock_hook(&self) -> std::sync::MutexGuard<'_, Option<CancelHook>> {
        self.on_cancel.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Schedules a task at an absolute point in time.
pub trait TimerService: Send + Sync {
    fn schedule_at(&self, at: DateTime<Utc>, task: TimerTask) -> TimerHandle;
}
