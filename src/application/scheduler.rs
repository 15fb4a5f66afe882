//! Daily monitoring scheduler.
//!
//! At day start every eligible worker gets a [`MonitoringPlan`] and one timer
//! per planned instant. Timers live in a [`TimerRegistry`] keyed by
//! (worker, date), so cancelling a worker is a lookup rather than a scan of
//! shared state. Timer tasks only hold a weak reference to the scheduler.

use super::Stores;
use super::attendance::AttendanceService;
use crate::domain::monitoring::{CaptureOutcome, MonitoringEvent, MonitoringPlan};
use crate::domain::planner;
use crate::domain::ports::{Clock, PresenceCapture, TimerHandle, TimerService, TimerTask};
use crate::domain::worker::{Worker, WorkerId};
use crate::error::Result;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

type DayKey = (WorkerId, NaiveDate);

/// Outstanding timers per (worker, date), indexed by capture position.
#[derive(Default)]
pub struct TimerRegistry {
    entries: Mutex<HashMap<DayKey, Vec<(usize, TimerHandle)>>>,
}

impl TimerRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DayKey, Vec<(usize, TimerHandle)>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_live(&self, key: DayKey, index: usize) -> bool {
        self.lock()
            .get(&key)
            .is_some_and(|timers| timers.iter().any(|(i, h)| *i == index && h.is_live()))
    }

    pub fn insert(&self, key: DayKey, index: usize, handle: TimerHandle) {
        let mut entries = self.lock();
        let timers = entries.entry(key).or_default();
        timers.retain(|(_, h)| h.is_live());
        timers.push((index, handle));
    }

    /// Cancels and forgets the timers of one day. Returns how many were live.
    pub fn cancel(&self, key: DayKey) -> usize {
        let timers = self.lock().remove(&key).unwrap_or_default();
        cancel_all(timers)
    }

    /// Cancels and forgets every timer of `worker`, whatever the date.
    pub fn cancel_worker(&self, worker: WorkerId) -> usize {
        let removed: Vec<(usize, TimerHandle)> = {
            let mut entries = self.lock();
            let keys: Vec<DayKey> = entries.keys().filter(|(w, _)| *w == worker).copied().collect();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key))
                .flatten()
                .collect()
        };
        cancel_all(removed)
    }

    pub fn live(&self) -> usize {
        self.lock()
            .values()
            .flatten()
            .filter(|(_, h)| h.is_live())
            .count()
    }
}

fn cancel_all(timers: Vec<(usize, TimerHandle)>) -> usize {
    timers
        .into_iter()
        .filter(|(_, handle)| {
            let live = handle.is_live();
            handle.cancel();
            live
        })
        .count()
}

/// Why a timer firing produced no monitoring event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPlan,
    /// Plan cancelled, or the instant already fired.
    AlreadyHandled,
    Inactive,
    OnBreak,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoPlan => "no plan",
            Self::AlreadyHandled => "already handled",
            Self::Inactive => "worker inactive",
            Self::OnBreak => "worker on break",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Recorded(CaptureOutcome),
    Skipped(SkipReason),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DayStartReport {
    /// Workers that received a new plan.
    pub planned: usize,
    /// Workers whose stored plan for the date was kept.
    pub reused: usize,
    /// Active workers not scheduled that weekday, or with a cancelled plan.
    pub skipped: usize,
    pub failed: usize,
    /// Timers registered by this call.
    pub armed: usize,
}

enum WorkerDay {
    Planned(usize),
    Reused(usize),
    Skipped,
}

pub struct MonitoringScheduler {
    stores: Stores,
    attendance: Arc<AttendanceService>,
    capture: Arc<dyn PresenceCapture>,
    clock: Arc<dyn Clock>,
    timers: Arc<dyn TimerService>,
    registry: TimerRegistry,
    rng: Mutex<StdRng>,
    capture_target: usize,
}

impl MonitoringScheduler {
    pub fn new(
        stores: Stores,
        attendance: Arc<AttendanceService>,
        capture: Arc<dyn PresenceCapture>,
        clock: Arc<dyn Clock>,
        timers: Arc<dyn TimerService>,
        capture_target: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            stores,
            attendance,
            capture,
            clock,
            timers,
            registry: TimerRegistry::default(),
            rng: Mutex::new(rng),
            capture_target,
        }
    }

    /// Plans and arms the captures of `date` for every active worker
    /// scheduled that weekday.
    ///
    /// Safe to call again for the same date: stored plans are reused and only
    /// instants that have neither fired nor a live timer are re-armed. A
    /// failure for one worker is logged and does not affect the others.
    pub async fn start_day(self: &Arc<Self>, date: NaiveDate) -> Result<DayStartReport> {
        let mut report = DayStartReport::default();
        for worker in self.stores.workers.all_workers().await? {
            if !worker.active || !worker.schedule.works_on(date.weekday()) {
                report.skipped += 1;
                continue;
            }
            match self.start_worker_day(&worker, date).await {
                Ok(WorkerDay::Planned(armed)) => {
                    report.planned += 1;
                    report.armed += armed;
                }
                Ok(WorkerDay::Reused(armed)) => {
                    report.reused += 1;
                    report.armed += armed;
                }
                Ok(WorkerDay::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(worker = %worker.id, %date, error = %e, "could not start monitoring day");
                }
            }
        }
        tracing::info!(
            %date,
            planned = report.planned,
            reused = report.reused,
            skipped = report.skipped,
            failed = report.failed,
            armed = report.armed,
            "monitoring day started"
        );
        Ok(report)
    }

    async fn start_worker_day(self: &Arc<Self>, worker: &Worker, date: NaiveDate) -> Result<WorkerDay> {
        for earlier in self.stores.plans.live_plans(worker.id).await? {
            if earlier.date != date {
                self.cancel_plan(worker.id, earlier.date).await?;
            }
        }

        let _guard = self.attendance.lock_day(worker.id, date).await;
        let (mut plan, reused) = match self.stores.plans.get(worker.id, date).await? {
            Some(plan) if plan.cancelled => {
                tracing::debug!(worker = %worker.id, %date, "plan was cancelled, not re-planning");
                return Ok(WorkerDay::Skipped);
            }
            Some(plan) => (plan, true),
            None => {
                let instants = {
                    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                    planner::plan(
                        worker.schedule.start,
                        worker.schedule.end,
                        &worker.schedule.breaks,
                        self.capture_target,
                        &mut *rng,
                    )?
                };
                (MonitoringPlan::new(worker.id, date, instants), false)
            }
        };

        let now = self.clock.now();
        let pending: Vec<(usize, NaiveTime)> = plan.unfired().collect();
        let mut armed = 0;
        let mut missed = 0;
        for (index, time) in pending {
            if self.registry.has_live((worker.id, date), index) {
                continue;
            }
            let at = instant(date, time);
            if at <= now {
                plan.mark_fired(index);
                missed += 1;
                continue;
            }
            let handle = self.timers.schedule_at(at, self.fire_task(worker.id, date, index));
            self.registry.insert((worker.id, date), index, handle);
            armed += 1;
        }
        if missed > 0 {
            tracing::warn!(worker = %worker.id, %date, missed, "capture instants already past, skipped");
        }
        tracing::debug!(worker = %worker.id, %date, planned = plan.planned_count(), armed, reused, "captures armed");
        self.stores.plans.store(plan).await?;

        Ok(if reused {
            WorkerDay::Reused(armed)
        } else {
            WorkerDay::Planned(armed)
        })
    }

    fn fire_task(self: &Arc<Self>, worker: WorkerId, date: NaiveDate, index: usize) -> TimerTask {
        let scheduler = Arc::downgrade(self);
        Box::pin(async move {
            let Some(scheduler) = scheduler.upgrade() else {
                return;
            };
            if let Err(e) = scheduler.fire(worker, date, index).await {
                tracing::error!(%worker, %date, index, error = %e, "capture instant failed");
            }
        })
    }

    /// Handles one planned capture instant.
    ///
    /// The instant is claimed under the (worker, date) lock before anything
    /// else, so a cancelled plan or a second firing records nothing. The
    /// capture call itself runs without the lock, and its result is dropped
    /// if the plan was cancelled in the meantime.
    pub async fn fire(&self, worker: WorkerId, date: NaiveDate, index: usize) -> Result<FireOutcome> {
        let now = self.clock.now();
        let guard = self.attendance.lock_day(worker, date).await;

        let Some(mut plan) = self.stores.plans.get(worker, date).await? else {
            return Ok(FireOutcome::Skipped(SkipReason::NoPlan));
        };
        if !plan.mark_fired(index) {
            return Ok(FireOutcome::Skipped(SkipReason::AlreadyHandled));
        }
        self.stores.plans.store(plan).await?;

        let skip = match self.stores.workers.get(worker).await? {
            Some(w) if !w.active => Some(SkipReason::Inactive),
            None => Some(SkipReason::Inactive),
            Some(w) if w.schedule.in_break(now.time()) => Some(SkipReason::OnBreak),
            Some(_) => None,
        };
        if let Some(reason) = skip {
            tracing::debug!(%worker, %date, index, %reason, "capture skipped");
            return Ok(FireOutcome::Skipped(reason));
        }

        let clocked_in = self
            .stores
            .attendance
            .get(worker, date)
            .await?
            .is_some_and(|record| record.clock_in.is_some());
        drop(guard);

        let event = if !clocked_in {
            MonitoringEvent::new(now, CaptureOutcome::Absent, None)
        } else {
            match self.capture.capture(worker).await {
                Ok(report) if report.present => {
                    MonitoringEvent::new(now, CaptureOutcome::Present, report.evidence)
                }
                Ok(report) => MonitoringEvent::new(now, CaptureOutcome::Absent, report.evidence),
                Err(e) => {
                    tracing::warn!(%worker, %date, index, error = %e, "presence capture failed");
                    MonitoringEvent::new(now, CaptureOutcome::CaptureFailed, None)
                }
            }
        };
        let outcome = event.outcome;
        if !self.attendance.record_capture(worker, date, event).await? {
            return Ok(FireOutcome::Skipped(SkipReason::AlreadyHandled));
        }
        Ok(FireOutcome::Recorded(outcome))
    }

    /// Cancels every outstanding capture of `worker` and marks their plans
    /// cancelled. Calling it again is a no-op. Returns the number of timers
    /// that were still live.
    pub async fn cancel_worker(&self, worker: WorkerId) -> Result<usize> {
        let cancelled = self.registry.cancel_worker(worker);
        for plan in self.stores.plans.live_plans(worker).await? {
            self.mark_cancelled(worker, plan.date).await?;
        }
        if cancelled > 0 {
            tracing::info!(%worker, cancelled, "outstanding captures cancelled");
        }
        Ok(cancelled)
    }

    async fn cancel_plan(&self, worker: WorkerId, date: NaiveDate) -> Result<()> {
        let cancelled = self.registry.cancel((worker, date));
        self.mark_cancelled(worker, date).await?;
        tracing::debug!(%worker, %date, cancelled, "superseded plan cancelled");
        Ok(())
    }

    async fn mark_cancelled(&self, worker: WorkerId, date: NaiveDate) -> Result<()> {
        let _guard = self.attendance.lock_day(worker, date).await;
        if let Some(mut plan) = self.stores.plans.get(worker, date).await? {
            if !plan.cancelled {
                plan.cancelled = true;
                self.stores.plans.store(plan).await?;
            }
        }
        Ok(())
    }

    /// Planned captures of the day, zero when no plan exists.
    pub async fn planned_count(&self, worker: WorkerId, date: NaiveDate) -> Result<usize> {
        Ok(self
            .stores
            .plans
            .get(worker, date)
            .await?
            .map_or(0, |plan| plan.planned_count()))
    }

    pub fn live_timers(&self) -> usize {
        self.registry.live()
    }
}

/// Work times are wall-clock times in UTC.
pub fn instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}
