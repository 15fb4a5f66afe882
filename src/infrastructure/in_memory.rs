use crate::application::Stores;
use crate::domain::account::{PayerAccount, PayerId};
use crate::domain::attendance::AttendanceRecord;
use crate::domain::monitoring::MonitoringPlan;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{AttendanceStore, PayerStore, PaymentStore, PlanStore, WorkerStore};
use crate::domain::worker::{Worker, WorkerId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type DayKey = (WorkerId, NaiveDate);

/// A thread-safe in-memory store for workers and their schedules.
#[derive(Default, Clone)]
pub struct InMemoryWorkerStore {
    workers: Arc<RwLock<HashMap<WorkerId, Worker>>>,
}

impl InMemoryWorkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerStore for InMemoryWorkerStore {
    async fn store(&self, worker: Worker) -> Result<()> {
        let mut workers = self.workers.write().await;
        workers.insert(worker.id, worker);
        Ok(())
    }

    async fn get(&self, id: WorkerId) -> Result<Option<Worker>> {
        let workers = self.workers.read().await;
        Ok(workers.get(&id).cloned())
    }

    async fn all_workers(&self) -> Result<Vec<Worker>> {
        let workers = self.workers.read().await;
        let mut all: Vec<Worker> = workers.values().cloned().collect();
        all.sort_by_key(|w| w.id);
        Ok(all)
    }
}

/// A thread-safe in-memory ledger of payer balances.
#[derive(Default, Clone)]
pub struct InMemoryPayerStore {
    accounts: Arc<RwLock<HashMap<PayerId, PayerAccount>>>,
}

impl InMemoryPayerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayerStore for InMemoryPayerStore {
    async fn store(&self, account: PayerAccount) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.payer, account);
        Ok(())
    }

    async fn get(&self, payer: PayerId) -> Result<Option<PayerAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&payer).cloned())
    }

    async fn all_accounts(&self) -> Result<Vec<PayerAccount>> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<PayerAccount> = accounts.values().cloned().collect();
        all.sort_by_key(|a| a.payer);
        Ok(all)
    }
}

/// Monitoring plans keyed by (worker, date).
#[derive(Default, Clone)]
pub struct InMemoryPlanStore {
    plans: Arc<RwLock<HashMap<DayKey, MonitoringPlan>>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn store(&self, plan: MonitoringPlan) -> Result<()> {
        let mut plans = self.plans.write().await;
        plans.insert((plan.worker, plan.date), plan);
        Ok(())
    }

    async fn get(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<MonitoringPlan>> {
        let plans = self.plans.read().await;
        Ok(plans.get(&(worker, date)).cloned())
    }

    async fn live_plans(&self, worker: WorkerId) -> Result<Vec<MonitoringPlan>> {
        let plans = self.plans.read().await;
        let mut live: Vec<MonitoringPlan> = plans
            .values()
            .filter(|p| p.worker == worker && !p.cancelled)
            .cloned()
            .collect();
        live.sort_by_key(|p| p.date);
        Ok(live)
    }
}

/// Attendance records keyed by (worker, date).
#[derive(Default, Clone)]
pub struct InMemoryAttendanceStore {
    records: Arc<RwLock<HashMap<DayKey, AttendanceRecord>>>,
}

impl InMemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttendanceStore for InMemoryAttendanceStore {
    async fn store(&self, record: AttendanceRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert((record.worker, record.date), record);
        Ok(())
    }

    async fn get(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(worker, date)).cloned())
    }

    async fn unpruned_before(&self, cutoff: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.date < cutoff && !r.pruned)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct PaymentTables {
    by_id: HashMap<PaymentId, Payment>,
    by_day: HashMap<DayKey, PaymentId>,
}

/// Payments indexed by id and by (worker, date).
///
/// Both indexes live behind one lock so `create_if_absent` is atomic.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<PaymentTables>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_if_absent(&self, payment: Payment) -> Result<(Payment, bool)> {
        let mut tables = self.tables.write().await;
        let key = (payment.worker, payment.date);
        if let Some(existing) = tables.by_day.get(&key).and_then(|id| tables.by_id.get(id)) {
            return Ok((existing.clone(), false));
        }
        tables.by_day.insert(key, payment.id);
        tables.by_id.insert(payment.id, payment.clone());
        Ok((payment, true))
    }

    async fn store(&self, payment: Payment) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .by_day
            .insert((payment.worker, payment.date), payment.id);
        tables.by_id.insert(payment.id, payment);
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.by_id.get(&id).cloned())
    }

    async fn get_for_day(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_day
            .get(&(worker, date))
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut overdue: Vec<Payment> = tables
            .by_id
            .values()
            .filter(|p| p.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|p| p.deadline);
        Ok(overdue)
    }

    async fn in_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Payment> = tables
            .by_id
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|p| p.created_at);
        Ok(matching)
    }

    async fn all_payments(&self) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut all: Vec<Payment> = tables.by_id.values().cloned().collect();
        all.sort_by_key(|p| (p.date, p.worker));
        Ok(all)
    }
}

/// A full set of empty in-memory stores.
pub fn in_memory_stores() -> Stores {
    Stores::new(
        Box::new(InMemoryWorkerStore::new()),
        Box::new(InMemoryPayerStore::new()),
        Box::new(InMemoryPlanStore::new()),
        Box::new(InMemoryAttendanceStore::new()),
        Box::new(InMemoryPaymentStore::new()),
    )
}
