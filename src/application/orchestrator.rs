//! Daily orchestrator: the outward-facing triggers and the daemon loop that
//! fires them at the configured wall-clock times.

use super::Stores;
use super::attendance::AttendanceService;
use super::outbox::{DrainReport, Outbox};
use super::payments::{PaymentCommand, PaymentService};
use super::scheduler::{DayStartReport, MonitoringScheduler, instant};
use super::sweeper::{EscalationSweeper, SweepReport};
use crate::config::Config;
use crate::domain::account::PayerId;
use crate::domain::attendance::AttendanceRecord;
use crate::domain::payment::{Actor, Payment, PaymentId};
use crate::domain::ports::{Clock, Notifier, PresenceCapture, TimerService, TransferGateway};
use crate::domain::schedule::WorkSchedule;
use crate::domain::score::efficiency_score;
use crate::domain::worker::{Worker, WorkerId};
use crate::error::{Result, ShiftpayError};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// The external collaborators the orchestrator is wired to.
pub struct Collaborators {
    pub capture: Arc<dyn PresenceCapture>,
    pub gateway: Arc<dyn TransferGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub timers: Arc<dyn TimerService>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EndOfDayReport {
    /// Payments created or already present for the date.
    pub payments: usize,
    /// Scheduled workers without complete attendance.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    DayStart(NaiveDate),
    EndOfDay(NaiveDate),
}

pub struct DailyOrchestrator {
    config: Config,
    stores: Stores,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    outbox: Arc<Outbox>,
    attendance: Arc<AttendanceService>,
    scheduler: Arc<MonitoringScheduler>,
    payments: Arc<PaymentService>,
    sweeper: EscalationSweeper,
}

impl DailyOrchestrator {
    pub fn new(config: Config, stores: Stores, collaborators: Collaborators, rng: StdRng) -> Self {
        let Collaborators {
            capture,
            gateway,
            notifier,
            clock,
            timers,
        } = collaborators;

        let outbox = Arc::new(Outbox::new());
        let attendance = Arc::new(AttendanceService::new(stores.clone()));
        let scheduler = Arc::new(MonitoringScheduler::new(
            stores.clone(),
            Arc::clone(&attendance),
            capture,
            Arc::clone(&clock),
            timers,
            config.capture_target_count,
            rng,
        ));
        let payments = Arc::new(PaymentService::new(
            stores.clone(),
            gateway,
            Arc::clone(&clock),
            Arc::clone(&outbox),
            config.clone(),
        ));
        let sweeper = EscalationSweeper::new(
            stores.clone(),
            Arc::clone(&payments),
            config.auto_settle_threshold,
        );

        Self {
            config,
            stores,
            clock,
            notifier,
            outbox,
            attendance,
            scheduler,
            payments,
            sweeper,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn attendance(&self) -> &Arc<AttendanceService> {
        &self.attendance
    }

    pub fn scheduler(&self) -> &Arc<MonitoringScheduler> {
        &self.scheduler
    }

    pub fn payments(&self) -> &Arc<PaymentService> {
        &self.payments
    }

    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    /// Prunes old event detail when a retention period is configured, then
    /// plans and arms the day's captures. Safe to re-invoke.
    pub async fn trigger_day_start(&self, date: NaiveDate) -> Result<DayStartReport> {
        if let Some(days) = self.config.retention_days {
            let cutoff = date - Duration::days(i64::from(days));
            self.attendance.prune_before(cutoff).await?;
        }
        self.scheduler.start_day(date).await
    }

    /// Creates the payment of every active worker scheduled on `date` whose
    /// attendance is complete. Safe to re-invoke.
    pub async fn trigger_end_of_day(&self, date: NaiveDate) -> Result<EndOfDayReport> {
        let mut report = EndOfDayReport::default();
        for worker in self.stores.workers.all_workers().await? {
            if !worker.active || !worker.schedule.works_on(date.weekday()) {
                continue;
            }
            match self.payments.create(worker.id, date).await {
                Ok(_) => report.payments += 1,
                Err(ShiftpayError::Validation(reason)) => {
                    report.skipped += 1;
                    tracing::info!(worker = %worker.id, %date, %reason, "no payment for the day");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(worker = %worker.id, %date, error = %e, "payment creation failed");
                }
            }
        }
        tracing::info!(
            %date,
            payments = report.payments,
            skipped = report.skipped,
            failed = report.failed,
            "end of day processed"
        );
        Ok(report)
    }

    /// Resolves overdue payments, then collects the outcomes of transfers
    /// still in flight.
    pub async fn trigger_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let report = self.sweeper.sweep(now).await?;
        let settled = self.payments.poll_settlements().await?;
        if settled > 0 {
            tracing::info!(settled, "in-flight transfers settled");
        }
        Ok(report)
    }

    pub async fn drain_outbox(&self) -> DrainReport {
        self.outbox.drain(self.notifier.as_ref()).await
    }

    /// The day's efficiency score as it stands now. Reads only.
    pub async fn get_efficiency_score(&self, worker: WorkerId, date: NaiveDate) -> Result<u8> {
        self.worker(worker).await?;
        let record = self
            .attendance
            .get(worker, date)
            .await?
            .unwrap_or_else(|| AttendanceRecord::new(worker, date));
        let planned = self.scheduler.planned_count(worker, date).await?;
        Ok(efficiency_score(&record, planned))
    }

    pub async fn transition_payment(
        &self,
        id: PaymentId,
        command: PaymentCommand,
        actor: &Actor,
    ) -> Result<Payment> {
        self.payments.transition(id, command, actor).await
    }

    /// Marks the worker inactive and cancels their outstanding captures.
    pub async fn deactivate_worker(&self, worker: WorkerId) -> Result<usize> {
        let mut record = self.worker(worker).await?;
        if record.active {
            record.active = false;
            self.stores.workers.store(record).await?;
            tracing::info!(%worker, "worker deactivated");
        }
        self.scheduler.cancel_worker(worker).await
    }

    /// Moves a worker to another payer and/or schedule. Outstanding captures
    /// are cancelled; the new schedule applies from the next day start.
    pub async fn reassign_worker(
        &self,
        worker: WorkerId,
        payer: Option<PayerId>,
        schedule: Option<WorkSchedule>,
    ) -> Result<Worker> {
        let mut record = self.worker(worker).await?;
        if let Some(schedule) = &schedule {
            schedule.validate()?;
        }
        if let Some(payer) = payer {
            if self.stores.payers.get(payer).await?.is_none() {
                return Err(ShiftpayError::NotFound(format!("payer {payer}")));
            }
            record.payer = payer;
        }
        if let Some(schedule) = schedule {
            record.schedule = schedule;
        }

        let cancelled = self.scheduler.cancel_worker(worker).await?;
        self.stores.workers.store(record.clone()).await?;
        tracing::info!(%worker, payer = %record.payer, cancelled, "worker reassigned");
        Ok(record)
    }

    async fn worker(&self, worker: WorkerId) -> Result<Worker> {
        self.stores
            .workers
            .get(worker)
            .await?
            .ok_or_else(|| ShiftpayError::NotFound(format!("worker {worker}")))
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Day start and end of day fire at the configured times; a process
    /// started mid-day runs the day start straight away. Sweeps and outbox
    /// drains run on their own intervals.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let now = self.clock.now();
        let today = now.date_naive();
        if now >= instant(today, self.config.day_start) && now < instant(today, self.config.end_of_day) {
            self.fire(Trigger::DayStart(today)).await;
        }

        let mut sweep = tokio::time::interval(std::time::Duration::from_secs(
            self.config.sweep_interval_secs,
        ));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut drain = tokio::time::interval(std::time::Duration::from_secs(
            self.config.outbox_drain_interval_secs,
        ));
        drain.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (mut due, mut trigger) = self.next_trigger(now);
        tracing::info!(next = %due, ?trigger, "orchestrator running");

        loop {
            let wait = (due - self.clock.now()).to_std().unwrap_or_default();
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    self.fire(trigger).await;
                    (due, trigger) = self.next_trigger(due);
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.trigger_sweep(self.clock.now()).await {
                        tracing::error!(error = %e, "sweep failed");
                    }
                }
                _ = drain.tick() => {
                    self.drain_outbox().await;
                }
            }
        }

        let report = self.drain_outbox().await;
        tracing::info!(delivered = report.delivered, failed = report.failed, "orchestrator stopped");
        Ok(())
    }

    async fn fire(&self, trigger: Trigger) {
        let result = match trigger {
            Trigger::DayStart(date) => self.trigger_day_start(date).await.map(|_| ()),
            Trigger::EndOfDay(date) => self.trigger_end_of_day(date).await.map(|_| ()),
        };
        if let Err(e) = result {
            tracing::error!(?trigger, error = %e, "trigger failed");
        }
    }

    /// The first trigger strictly after `after`.
    fn next_trigger(&self, after: DateTime<Utc>) -> (DateTime<Utc>, Trigger) {
        let date = after.date_naive();
        let start = instant(date, self.config.day_start);
        let end = instant(date, self.config.end_of_day);
        if after < start {
            (start, Trigger::DayStart(date))
        } else if after < end {
            (end, Trigger::EndOfDay(date))
        } else {
            let next = date.succ_opt().unwrap_or(date);
            (instant(next, self.config.day_start), Trigger::DayStart(next))
        }
    }
}
