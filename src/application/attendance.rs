use super::Stores;
use super::locks::KeyedLocks;
use crate::domain::attendance::AttendanceRecord;
use crate::domain::monitoring::MonitoringEvent;
use crate::domain::worker::WorkerId;
use crate::error::{Result, ShiftpayError};
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::OwnedMutexGuard;

/// Owns every mutation of attendance records.
///
/// All changes to one (worker, date) record go through a per-key lock, so
/// clock events and monitoring events are never lost to interleaving.
pub struct AttendanceService {
    stores: Stores,
    locks: KeyedLocks<(WorkerId, NaiveDate)>,
}

impl AttendanceService {
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            locks: KeyedLocks::new(),
        }
    }

    /// Holds the (worker, date) key. Callers must not call other mutating
    /// methods of this service for the same key while holding it.
    pub async fn lock_day(&self, worker: WorkerId, date: NaiveDate) -> OwnedMutexGuard<()> {
        self.locks.acquire(&(worker, date)).await
    }

    pub async fn get(&self, worker: WorkerId, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
        self.stores.attendance.get(worker, date).await
    }

    async fn update<T>(
        &self,
        worker: WorkerId,
        date: NaiveDate,
        apply: impl FnOnce(&mut AttendanceRecord) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock_day(worker, date).await;
        let mut record = self
            .stores
            .attendance
            .get(worker, date)
            .await?
            .unwrap_or_else(|| AttendanceRecord::new(worker, date));
        let value = apply(&mut record)?;
        self.stores.attendance.store(record).await?;
        Ok(value)
    }

    async fn ensure_worker(&self, worker: WorkerId) -> Result<()> {
        match self.stores.workers.get(worker).await? {
            Some(_) => Ok(()),
            None => Err(ShiftpayError::NotFound(format!("worker {worker}"))),
        }
    }

    pub async fn clock_in(&self, worker: WorkerId, date: NaiveDate, at: DateTime<Utc>) -> Result<()> {
        self.ensure_worker(worker).await?;
        self.update(worker, date, |record| record.clock_in(at)).await?;
        tracing::info!(%worker, %date, %at, "clocked in");
        Ok(())
    }

    pub async fn clock_out(&self, worker: WorkerId, date: NaiveDate, at: DateTime<Utc>) -> Result<()> {
        self.ensure_worker(worker).await?;
        self.update(worker, date, |record| record.clock_out(at)).await?;
        tracing::info!(%worker, %date, %at, "clocked out");
        Ok(())
    }

    pub async fn submit_progress_report(&self, worker: WorkerId, date: NaiveDate) -> Result<u32> {
        self.ensure_worker(worker).await?;
        self.update(worker, date, |record| {
            record.submit_progress_report();
            Ok(record.progress_reports)
        })
        .await
    }

    pub async fn record_event(
        &self,
        worker: WorkerId,
        date: NaiveDate,
        event: MonitoringEvent,
    ) -> Result<()> {
        let outcome = event.outcome;
        self.update(worker, date, |record| {
            record.append_event(event);
            Ok(())
        })
        .await?;
        tracing::debug!(%worker, %date, %outcome, "monitoring event recorded");
        Ok(())
    }

    /// Appends a capture result unless the day's plan has been cancelled
    /// since the instant was claimed. Returns whether it was recorded.
    pub async fn record_capture(
        &self,
        worker: WorkerId,
        date: NaiveDate,
        event: MonitoringEvent,
    ) -> Result<bool> {
        let _guard = self.lock_day(worker, date).await;
        let live = self
            .stores
            .plans
            .get(worker, date)
            .await?
            .is_some_and(|plan| !plan.cancelled);
        if !live {
            tracing::debug!(%worker, %date, "plan cancelled before capture was recorded");
            return Ok(false);
        }
        let mut record = self
            .stores
            .attendance
            .get(worker, date)
            .await?
            .unwrap_or_else(|| AttendanceRecord::new(worker, date));
        let outcome = event.outcome;
        record.append_event(event);
        self.stores.attendance.store(record).await?;
        tracing::debug!(%worker, %date, %outcome, "capture recorded");
        Ok(true)
    }

    /// Drops event detail from records dated before `cutoff`. Clock times,
    /// the outcome tally and progress report counts are kept.
    pub async fn prune_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let stale = self.stores.attendance.unpruned_before(cutoff).await?;
        let mut pruned = 0;
        for record in stale {
            self.update(record.worker, record.date, |record| {
                record.prune();
                Ok(())
            })
            .await?;
            pruned += 1;
        }
        if pruned > 0 {
            tracing::info!(%cutoff, pruned, "pruned attendance event detail");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Amount, PayerId};
    use crate::domain::monitoring::CaptureOutcome;
    use crate::domain::schedule::WorkSchedule;
    use crate::domain::worker::Worker;
    use crate::infrastructure::in_memory::in_memory_stores;
    use chrono::{Duration, NaiveTime, TimeZone, Weekday};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    async fn service() -> AttendanceService {
        let stores = in_memory_stores();
        let schedule = WorkSchedule::new(
            [Weekday::Mon],
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            vec![],
        )
        .unwrap();
        stores
            .workers
            .store(Worker::new(
                WorkerId(1),
                PayerId(10),
                Amount::new(dec!(100)).unwrap(),
                schedule,
            ))
            .await
            .unwrap();
        AttendanceService::new(stores)
    }

    #[tokio::test]
    async fn test_record_created_lazily_on_clock_in() {
        let service = service().await;
        assert!(service.get(WorkerId(1), date()).await.unwrap().is_none());

        let at = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        service.clock_in(WorkerId(1), date(), at).await.unwrap();
        let record = service.get(WorkerId(1), date()).await.unwrap().unwrap();
        assert_eq!(record.clock_in, Some(at));
    }

    #[tokio::test]
    async fn test_unknown_worker_is_not_found() {
        let service = service().await;
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        assert!(matches!(
            service.clock_in(WorkerId(99), date(), at).await,
            Err(ShiftpayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_events_are_not_lost() {
        let service = Arc::new(service().await);
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .record_event(
                        WorkerId(1),
                        date(),
                        MonitoringEvent::new(at, CaptureOutcome::Present, None),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let record = service.get(WorkerId(1), date()).await.unwrap().unwrap();
        assert_eq!(record.events().len(), 50);
        assert_eq!(record.tally().present, 50);
    }

    #[tokio::test]
    async fn test_prune_before_cutoff() {
        let service = service().await;
        let old = date() - Duration::days(45);
        let at = Utc.with_ymd_and_hms(2026, 9, 4, 10, 0, 0).unwrap();
        service
            .record_event(
                WorkerId(1),
                old,
                MonitoringEvent::new(at, CaptureOutcome::Present, None),
            )
            .await
            .unwrap();
        service.submit_progress_report(WorkerId(1), date()).await.unwrap();

        let pruned = service.prune_before(date() - Duration::days(30)).await.unwrap();
        assert_eq!(pruned, 1);

        let record = service.get(WorkerId(1), old).await.unwrap().unwrap();
        assert!(record.pruned);
        assert!(record.events().is_empty());
        assert_eq!(record.tally().present, 1);

        assert_eq!(service.prune_before(date() - Duration::days(30)).await.unwrap(), 0);
    }
}
