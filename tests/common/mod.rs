#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use shiftpay::application::orchestrator::{Collaborators, DailyOrchestrator};
use shiftpay::application::scheduler::instant;
use shiftpay::config::Config;
use shiftpay::domain::account::{Amount, PayerAccount, PayerId};
use shiftpay::domain::payment::Payment;
use shiftpay::domain::ports::Clock;
use shiftpay::domain::schedule::{BreakInterval, WorkSchedule};
use shiftpay::domain::worker::{Worker, WorkerId};
use shiftpay::infrastructure::clock::ManualClock;
use shiftpay::infrastructure::in_memory::in_memory_stores;
use shiftpay::infrastructure::simulated::{
    LoggingNotifier, SimulatedPresenceCapture, SimulatedTransferGateway,
};
use shiftpay::infrastructure::timer::VirtualTimer;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

/// 2024-01-01 was a Monday.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    instant(monday(), time(h, m))
}

/// Weekdays 09:00-17:00 with a lunch break.
pub fn office_hours() -> WorkSchedule {
    WorkSchedule::new(
        [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
        time(9, 0),
        time(17, 0),
        vec![BreakInterval::new(time(12, 0), time(13, 0)).unwrap()],
    )
    .unwrap()
}

pub struct Harness {
    pub orchestrator: Arc<DailyOrchestrator>,
    pub timer: Arc<VirtualTimer>,
    pub clock: ManualClock,
    pub gateway: Arc<SimulatedTransferGateway>,
    pub notifier: Arc<LoggingNotifier>,
}

pub struct Setup {
    pub config: Config,
    /// (worker, payer, daily rate)
    pub workers: Vec<(u32, u32, Decimal)>,
    /// (payer, opening balance)
    pub payers: Vec<(u32, Decimal)>,
    pub presence_rate: f64,
    pub gateway: SimulatedTransferGateway,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            config: Config::default(),
            workers: vec![(1, 10, Decimal::from(100))],
            payers: vec![(10, Decimal::from(1000))],
            presence_rate: 1.0,
            gateway: SimulatedTransferGateway::new(),
        }
    }
}

impl Harness {
    pub async fn new(setup: Setup) -> Self {
        let stores = in_memory_stores();
        for (worker, payer, rate) in &setup.workers {
            stores
                .workers
                .store(Worker::new(
                    WorkerId(*worker),
                    PayerId(*payer),
                    Amount::new(*rate).unwrap(),
                    office_hours(),
                ))
                .await
                .unwrap();
        }
        for (payer, balance) in &setup.payers {
            stores
                .payers
                .store(PayerAccount::with_balance(PayerId(*payer), *balance))
                .await
                .unwrap();
        }

        let clock = ManualClock::new(at(6, 0));
        let timer = Arc::new(VirtualTimer::new(clock.clone()));
        let gateway = Arc::new(setup.gateway);
        let notifier = Arc::new(LoggingNotifier::new());
        let orchestrator = DailyOrchestrator::new(
            setup.config,
            stores,
            Collaborators {
                capture: Arc::new(SimulatedPresenceCapture::new(setup.presence_rate, 7)),
                gateway: gateway.clone(),
                notifier: notifier.clone(),
                clock: Arc::new(clock.clone()),
                timers: timer.clone(),
            },
            StdRng::seed_from_u64(7),
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            timer,
            clock,
            gateway,
            notifier,
        }
    }

    /// Runs Monday for the given workers: clock-in at 09:00, captures, one
    /// progress report and clock-out at 17:00, then the end-of-day trigger.
    pub async fn work_monday(&self, workers: &[u32]) -> Vec<Payment> {
        let o = &self.orchestrator;
        for worker in workers {
            o.attendance().clock_in(WorkerId(*worker), monday(), at(9, 0)).await.unwrap();
        }
        o.trigger_day_start(monday()).await.unwrap();
        self.timer.advance_to(at(17, 0)).await;
        for worker in workers {
            o.attendance().submit_progress_report(WorkerId(*worker), monday()).await.unwrap();
            o.attendance().clock_out(WorkerId(*worker), monday(), at(17, 0)).await.unwrap();
        }
        self.timer.advance_to(at(18, 0)).await;
        o.trigger_end_of_day(monday()).await.unwrap();

        let mut payments = Vec::new();
        for worker in workers {
            let payment = o
                .stores()
                .payments
                .get_for_day(WorkerId(*worker), monday())
                .await
                .unwrap()
                .unwrap();
            payments.push(payment);
        }
        payments
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn balance(&self, payer: u32) -> Decimal {
        self.orchestrator
            .stores()
            .payers
            .get(PayerId(payer))
            .await
            .unwrap()
            .unwrap()
            .available
            .0
    }
}

/// Writes a roster of `rows` office-hours workers spread over ten payers,
/// plus the matching ledger.
pub fn generate_roster(roster: &Path, ledger: &Path, rows: u32) -> Result<(), Error> {
    let mut wtr = csv::WriterBuilder::new().from_writer(File::create(roster)?);
    wtr.write_record(["worker", "payer", "daily_rate", "start", "end", "breaks", "weekdays"])?;
    for i in 1..=rows {
        let (worker, payer) = (i.to_string(), (i % 10).to_string());
        wtr.write_record([
            worker.as_str(),
            payer.as_str(),
            "100.00",
            "09:00",
            "17:00",
            "12:00-13:00",
            "mon|tue|wed|thu|fri",
        ])?;
    }
    wtr.flush()?;

    let mut wtr = csv::WriterBuilder::new().from_writer(File::create(ledger)?);
    wtr.write_record(["payer", "available"])?;
    for payer in 0..10 {
        wtr.write_record([payer.to_string(), "1000000.00".to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}
