use crate::domain::account::{PayerAccount, PayerId};
use crate::domain::attendance::AttendanceRecord;
use crate::domain::monitoring::MonitoringPlan;
use crate::domain::payment::{Payment, PaymentId, PaymentStatus};
use crate::domain::ports::{AttendanceStore, PayerStore, PaymentStore, PlanStore, WorkerStore};
use crate::domain::worker::{Worker, WorkerId};
use crate::error::{Result, ShiftpayError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Column Family for workers and their schedules.
pub const CF_WORKERS: &str = "workers";
/// Column Family for payer balances.
pub const CF_PAYERS: &str = "payers";
/// Column Family for monitoring plans, keyed by (worker, date).
pub const CF_PLANS: &str = "plans";
/// Column Family for attendance records, keyed by (worker, date).
pub const CF_ATTENDANCE: &str = "attendance";
/// Column Family for payments, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping (worker, date) to the payment id of that day.
pub const CF_PAYMENT_DAYS: &str = "payment_days";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_WORKERS,
    CF_PAYERS,
    CF_PLANS,
    CF_ATTENDANCE,
    CF_PAYMENTS,
    CF_PAYMENT_DAYS,
];

/// A persistent store implementation using RocksDB.
///
/// One column family per record kind, values encoded as JSON. Day-keyed
/// records use the big-endian worker id followed by the ISO date, so all days
/// of one worker are adjacent and ordered.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    /// Serializes payment inserts so create-if-absent is atomic.
    payment_writes: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            payment_writes: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ShiftpayError::Internal(Box::new(std::io::Error::other(format!(
                "column family {name} not found"
            ))))
        })
    }

    fn put<T: Serialize>(&self, cf: &str, key: impl AsRef<[u8]>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    fn fetch<T: DeserializeOwned>(&self, cf: &str, key: impl AsRef<[u8]>) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str, mode: IteratorMode<'_>) -> Result<Vec<T>> {
        self.scan_while(cf, mode, |_| true)
    }

    /// Decodes values in key order while `keep` accepts the key.
    fn scan_while<T: DeserializeOwned>(
        &self,
        cf: &str,
        mode: IteratorMode<'_>,
        keep: impl Fn(&[u8]) -> bool,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, mode) {
            let (key, value) = item?;
            if !keep(&key) {
                break;
            }
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }
}

fn day_key(worker: WorkerId, date: NaiveDate) -> Vec<u8> {
    let mut key = worker.0.to_be_bytes().to_vec();
    key.extend_from_slice(date.format("%Y-%m-%d").to_string().as_bytes());
    key
}

#[async_trait]
impl WorkerStore for RocksDBStore {
    async fn store(&self, worker: Worker) -> Result<()> {
        self.put(CF_WORKERS, worker.id.0.to_be_bytes(), &worker)
    }

    async fn get(&self, id: WorkerId) -> Result<Option<Worker>> {
        self.fetch(CF_WORKERS, id.0.to_be_bytes())
    }

    async fn all_workers(&self) -> Result<Vec<Worker>> {
        self.scan(CF_WORKERS, IteratorMode::Start)
    }
}

#[async_trait]
impl PayerStore for RocksDBStore {
    async fn store(&self, account: PayerAccount) -> Result<()> {
        self.put(CF_PAYERS, account.payer.0.to_be_bytes(), &account)
    }

    async fn get(&self, payer: PayerId) -> Result<Option<PayerAccount>> {
        self.fetch(CF_PAYERS, payer.0.to_be_bytes())
    }

    async fn all_accounts(&self) -> Result<Vec<PayerAccount>> {
        self.scan(CF_PAYERS, IteratorMode::Start)
    }
}

#[async_trait]
impl PlanStore for RocksDBStore {
    async fn store(&self, plan: MonitoringPlan) -> Result<()> {
        self.put(CF_PLANS, day_key(plan.worker, plan.date), &plan)
    }

    async fn get(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<MonitoringPlan>> {
        self.fetch(CF_PLANS, day_key(worker, date))
    }

    async fn live_plans(&self, worker: WorkerId) -> Result<Vec<MonitoringPlan>> {
        let prefix = worker.0.to_be_bytes();
        let plans: Vec<MonitoringPlan> = self.scan_while(
            CF_PLANS,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
            |key| key.starts_with(&prefix),
        )?;
        Ok(plans.into_iter().filter(|plan| !plan.cancelled).collect())
    }
}

#[async_trait]
impl AttendanceStore for RocksDBStore {
    async fn store(&self, record: AttendanceRecord) -> Result<()> {
        self.put(CF_ATTENDANCE, day_key(record.worker, record.date), &record)
    }

    async fn get(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        self.fetch(CF_ATTENDANCE, day_key(worker, date))
    }

    async fn unpruned_before(&self, cutoff: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let records: Vec<AttendanceRecord> = self.scan(CF_ATTENDANCE, IteratorMode::Start)?;
        Ok(records
            .into_iter()
            .filter(|record| record.date < cutoff && !record.pruned)
            .collect())
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn create_if_absent(&self, payment: Payment) -> Result<(Payment, bool)> {
        let _writes = self.payment_writes.lock().unwrap_or_else(|e| e.into_inner());
        let day = day_key(payment.worker, payment.date);
        if let Some(id) = self.fetch::<PaymentId>(CF_PAYMENT_DAYS, &day)? {
            if let Some(existing) = self.fetch(CF_PAYMENTS, id.0.as_bytes())? {
                return Ok((existing, false));
            }
        }
        self.put(CF_PAYMENTS, payment.id.0.as_bytes(), &payment)?;
        self.put(CF_PAYMENT_DAYS, &day, &payment.id)?;
        Ok((payment, true))
    }

    async fn store(&self, payment: Payment) -> Result<()> {
        let _writes = self.payment_writes.lock().unwrap_or_else(|e| e.into_inner());
        self.put(CF_PAYMENTS, payment.id.0.as_bytes(), &payment)?;
        self.put(CF_PAYMENT_DAYS, day_key(payment.worker, payment.date), &payment.id)
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.fetch(CF_PAYMENTS, id.0.as_bytes())
    }

    async fn get_for_day(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<Payment>> {
        match self.fetch::<PaymentId>(CF_PAYMENT_DAYS, day_key(worker, date))? {
            Some(id) => self.fetch(CF_PAYMENTS, id.0.as_bytes()),
            None => Ok(None),
        }
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let mut overdue: Vec<Payment> = self
            .all_payments()
            .await?
            .into_iter()
            .filter(|payment| payment.is_overdue(now))
            .collect();
        overdue.sort_by_key(|payment| payment.deadline);
        Ok(overdue)
    }

    async fn in_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        let mut matching: Vec<Payment> = self
            .all_payments()
            .await?
            .into_iter()
            .filter(|payment| payment.status == status)
            .collect();
        matching.sort_by_key(|payment| payment.created_at);
        Ok(matching)
    }

    async fn all_payments(&self) -> Result<Vec<Payment>> {
        self.scan(CF_PAYMENTS, IteratorMode::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Amount;
    use crate::domain::schedule::WorkSchedule;
    use chrono::{Duration, NaiveTime, TimeZone, Weekday};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    fn payment(worker: u32, day: u32) -> Payment {
        Payment::new(
            WorkerId(worker),
            PayerId(1),
            date(day),
            Amount::new(dec!(80)).unwrap(),
            "USD",
            75,
            Utc.with_ymd_and_hms(2026, 10, day, 18, 0, 0).unwrap(),
            Duration::hours(1),
        )
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_worker_and_payer_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let schedule = WorkSchedule::new(
            [Weekday::Mon, Weekday::Fri],
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            vec![],
        )
        .unwrap();
        let worker = Worker::new(WorkerId(3), PayerId(1), Amount::new(dec!(95.5)).unwrap(), schedule);
        WorkerStore::store(&store, worker.clone()).await.unwrap();
        assert_eq!(WorkerStore::get(&store, WorkerId(3)).await.unwrap(), Some(worker));
        assert!(WorkerStore::get(&store, WorkerId(4)).await.unwrap().is_none());

        let account = PayerAccount::with_balance(PayerId(1), dec!(250.00));
        PayerStore::store(&store, account.clone()).await.unwrap();
        assert_eq!(PayerStore::all_accounts(&store).await.unwrap(), vec![account]);
    }

    #[tokio::test]
    async fn test_rocksdb_live_plans_stay_within_worker() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut cancelled = MonitoringPlan::new(WorkerId(1), date(18), vec![]);
        cancelled.cancelled = true;
        PlanStore::store(&store, cancelled).await.unwrap();
        PlanStore::store(&store, MonitoringPlan::new(WorkerId(1), date(19), vec![]))
            .await
            .unwrap();
        PlanStore::store(&store, MonitoringPlan::new(WorkerId(2), date(19), vec![]))
            .await
            .unwrap();

        let live = PlanStore::live_plans(&store, WorkerId(1)).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].date, date(19));
    }

    #[tokio::test]
    async fn test_rocksdb_payment_create_if_absent() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let first = payment(1, 19);
        let (stored, created) = store.create_if_absent(first.clone()).await.unwrap();
        assert!(created);
        assert_eq!(stored, first);

        let (existing, created) = store.create_if_absent(payment(1, 19)).await.unwrap();
        assert!(!created);
        assert_eq!(existing.id, first.id);

        assert_eq!(
            store.get_for_day(WorkerId(1), date(19)).await.unwrap().map(|p| p.id),
            Some(first.id)
        );
        assert_eq!(store.all_payments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_overdue_survives_reopen() {
        let dir = tempdir().unwrap();
        let id = {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let payment = payment(2, 19);
            store.create_if_absent(payment.clone()).await.unwrap();
            payment.id
        };

        let store = RocksDBStore::open(dir.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 19, 0, 0).unwrap();
        let overdue = store.overdue(now).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, id);
        assert!(store.overdue(now - Duration::minutes(1)).await.unwrap().is_empty());
    }
}
