//! Stand-ins for the external collaborators: presence capture, transfer
//! network and notifier. Used by the `simulate` command and by tests.

use crate::domain::account::Amount;
use crate::domain::payment::{PaymentId, TransferOutcome};
use crate::domain::ports::{
    CaptureReport, NotificationIntent, Notifier, PresenceCapture, TransferGateway, TransferReceipt,
};
use crate::domain::worker::WorkerId;
use crate::error::{Result, ShiftpayError};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Reports a worker present with a fixed probability. Workers marked offline
/// make every capture fail.
pub struct SimulatedPresenceCapture {
    presence_rate: f64,
    rng: Mutex<StdRng>,
    offline: HashSet<WorkerId>,
    captures: AtomicU64,
}

impl SimulatedPresenceCapture {
    pub fn new(presence_rate: f64, seed: u64) -> Self {
        Self {
            presence_rate: presence_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            offline: HashSet::new(),
            captures: AtomicU64::new(0),
        }
    }

    pub fn with_offline(mut self, workers: impl IntoIterator<Item = WorkerId>) -> Self {
        self.offline.extend(workers);
        self
    }
}

#[async_trait]
impl PresenceCapture for SimulatedPresenceCapture {
    async fn capture(&self, worker: WorkerId) -> Result<CaptureReport> {
        if self.offline.contains(&worker) {
            return Err(ShiftpayError::Collaborator(format!(
                "capture device of worker {worker} is offline"
            )));
        }
        let present = self
            .rng
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .gen_bool(self.presence_rate);
        let n = self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(CaptureReport {
            present,
            evidence: present.then(|| format!("capture-{worker}-{n}")),
        })
    }
}

#[derive(Debug, Clone)]
struct Transfer {
    transfer_ref: String,
    outcome: Option<TransferOutcome>,
}

/// In-process transfer network.
///
/// `initiate` is idempotent per reference. Transfers to failing workers are
/// accepted and later reported failed. In deferred mode outcomes stay
/// unknown until [`SimulatedTransferGateway::release_all`] is called.
#[derive(Default)]
pub struct SimulatedTransferGateway {
    transfers: Mutex<HashMap<PaymentId, Transfer>>,
    failing: HashSet<WorkerId>,
    deferred: bool,
    seq: AtomicU64,
}

impl SimulatedTransferGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn with_failing(mut self, workers: impl IntoIterator<Item = WorkerId>) -> Self {
        self.failing.extend(workers);
        self
    }

    /// Distinct transfers initiated so far.
    pub fn initiated(&self) -> usize {
        self.lock().len()
    }

    /// Resolves every transfer still in flight as succeeded.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        for transfer in self.lock().values_mut() {
            if transfer.outcome.is_none() {
                transfer.outcome = Some(TransferOutcome::Succeeded {
                    transfer_ref: transfer.transfer_ref.clone(),
                });
                released += 1;
            }
        }
        released
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PaymentId, Transfer>> {
        self.transfers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TransferGateway for SimulatedTransferGateway {
    async fn initiate(
        &self,
        recipient: WorkerId,
        amount: Amount,
        reference: PaymentId,
    ) -> Result<TransferReceipt> {
        let mut transfers = self.lock();
        let transfer = transfers.entry(reference).or_insert_with(|| {
            let transfer_ref = format!("SIM-{:06}", self.seq.fetch_add(1, Ordering::SeqCst) + 1);
            tracing::debug!(%recipient, %amount, %reference, %transfer_ref, "transfer initiated");
            let outcome = if self.failing.contains(&recipient) {
                Some(TransferOutcome::Failed {
                    reason: format!("recipient account of worker {recipient} rejected the transfer"),
                })
            } else if self.deferred {
                None
            } else {
                Some(TransferOutcome::Succeeded {
                    transfer_ref: transfer_ref.clone(),
                })
            };
            Transfer {
                transfer_ref,
                outcome,
            }
        });
        Ok(TransferReceipt {
            accepted: true,
            transfer_ref: Some(transfer.transfer_ref.clone()),
            error: None,
        })
    }

    async fn poll_result(&self, reference: PaymentId) -> Result<Option<TransferOutcome>> {
        match self.lock().get(&reference) {
            Some(transfer) => Ok(transfer.outcome.clone()),
            None => Err(ShiftpayError::NotFound(format!("transfer for payment {reference}"))),
        }
    }
}

/// Writes every notification to the log.
#[derive(Debug, Default)]
pub struct LoggingNotifier {
    delivered: AtomicUsize,
}

impl LoggingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, intent: &NotificationIntent) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        tracing::info!(recipient = ?intent.recipient, kind = ?intent.kind, payload = %intent.payload, "notification");
        Ok(())
    }
}
