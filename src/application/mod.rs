//! Application layer: services that drive the domain through the ports.
//!
//! Every service takes the same [`Stores`] bundle. Mutual exclusion is per
//! record key (see [`locks::KeyedLocks`]); there is no process-wide lock.

pub mod attendance;
pub mod locks;
pub mod orchestrator;
pub mod outbox;
pub mod payments;
pub mod scheduler;
pub mod sweeper;

use crate::domain::ports::{
    AttendanceStore, AttendanceStoreBox, PayerStore, PayerStoreBox, PaymentStore,
    PaymentStoreBox, PlanStore, PlanStoreBox, WorkerStore, WorkerStoreBox,
};
use std::sync::Arc;

/// Shared handles to every record store.
#[derive(Clone)]
pub struct Stores {
    pub workers: Arc<dyn WorkerStore>,
    pub payers: Arc<dyn PayerStore>,
    pub plans: Arc<dyn PlanStore>,
    pub attendance: Arc<dyn AttendanceStore>,
    pub payments: Arc<dyn PaymentStore>,
}

impl Stores {
    pub fn new(
        workers: WorkerStoreBox,
        payers: PayerStoreBox,
        plans: PlanStoreBox,
        attendance: AttendanceStoreBox,
        payments: PaymentStoreBox,
    ) -> Self {
        Self {
            workers: Arc::from(workers),
            payers: Arc::from(payers),
            plans: Arc::from(plans),
            attendance: Arc::from(attendance),
            payments: Arc::from(payments),
        }
    }
}
