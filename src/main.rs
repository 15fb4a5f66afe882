use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use shiftpay::application::Stores;
use shiftpay::application::orchestrator::{Collaborators, DailyOrchestrator};
use shiftpay::application::scheduler::instant;
use shiftpay::config::Config;
use shiftpay::domain::ports::{Clock, TimerService};
use shiftpay::domain::worker::WorkerId;
use shiftpay::infrastructure::clock::{ManualClock, SystemClock};
use shiftpay::infrastructure::in_memory::in_memory_stores;
use shiftpay::infrastructure::simulated::{
    LoggingNotifier, SimulatedPresenceCapture, SimulatedTransferGateway,
};
use shiftpay::infrastructure::timer::{TokioTimerService, VirtualTimer};
use shiftpay::interfaces::csv::ledger_reader::LedgerReader;
use shiftpay::interfaces::csv::payment_writer::PaymentWriter;
use shiftpay::interfaces::csv::roster_reader::RosterReader;
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file. Missing fields take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level. RUST_LOG takes precedence.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs one working day in virtual time and prints the payment report.
    Simulate {
        /// Roster CSV: worker,payer,daily_rate,start,end,breaks,weekdays
        roster: PathBuf,
        /// Ledger CSV: payer,available
        ledger: PathBuf,
        /// The day to simulate (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Probability that a capture finds the worker present
        #[arg(long, default_value_t = 0.9)]
        presence_rate: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Workers that submit no progress report
        #[arg(long, value_delimiter = ',')]
        skip_report: Vec<u32>,
    },
    /// Runs the daily triggers in real time until interrupted.
    Run {
        roster: PathBuf,
        ledger: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        presence_rate: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    shiftpay::logging::init(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load(path).into_diagnostic()?,
        None => Config::default(),
    };
    let stores = open_stores(cli.db_path.as_deref())?;

    match cli.command {
        Command::Simulate {
            roster,
            ledger,
            date,
            presence_rate,
            seed,
            skip_report,
        } => {
            load_records(&stores, &roster, &ledger).await?;
            simulate(config, stores, date, presence_rate, seed, skip_report).await
        }
        Command::Run {
            roster,
            ledger,
            presence_rate,
        } => {
            load_records(&stores, &roster, &ledger).await?;
            run(config, stores, presence_rate).await
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    let Some(db_path) = db_path else {
        return Ok(in_memory_stores());
    };
    let store = shiftpay::infrastructure::rocksdb::RocksDBStore::open(db_path).into_diagnostic()?;
    Ok(Stores::new(
        Box::new(store.clone()),
        Box::new(store.clone()),
        Box::new(store.clone()),
        Box::new(store.clone()),
        Box::new(store),
    ))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

/// Loads the roster and the ledger. Bad rows are reported and skipped.
///
/// Opening balances only seed payers the store does not know yet, so a
/// persistent store keeps the balances left by earlier runs.
async fn load_records(stores: &Stores, roster: &Path, ledger: &Path) -> Result<()> {
    let file = File::open(ledger).into_diagnostic()?;
    for account in LedgerReader::new(file).accounts() {
        match account {
            Ok(account) => {
                if stores.payers.get(account.payer).await.into_diagnostic()?.is_some() {
                    tracing::debug!(payer = %account.payer, "keeping stored balance");
                    continue;
                }
                stores.payers.store(account).await.into_diagnostic()?;
            }
            Err(e) => eprintln!("Error reading ledger row: {}", e),
        }
    }

    let file = File::open(roster).into_diagnostic()?;
    for worker in RosterReader::new(file).workers() {
        match worker {
            Ok(worker) => {
                if stores.payers.get(worker.payer).await.into_diagnostic()?.is_none() {
                    tracing::warn!(worker = %worker.id, payer = %worker.payer, "payer missing from the ledger");
                }
                stores.workers.store(worker).await.into_diagnostic()?;
            }
            Err(e) => eprintln!("Error reading roster row: {}", e),
        }
    }
    Ok(())
}

async fn simulate(
    config: Config,
    stores: Stores,
    date: NaiveDate,
    presence_rate: f64,
    seed: u64,
    skip_report: Vec<u32>,
) -> Result<()> {
    let clock = ManualClock::new(instant(date, config.day_start));
    let timer = Arc::new(VirtualTimer::new(clock.clone()));
    let orchestrator = DailyOrchestrator::new(
        config.clone(),
        stores.clone(),
        Collaborators {
            capture: Arc::new(SimulatedPresenceCapture::new(presence_rate, seed)),
            gateway: Arc::new(SimulatedTransferGateway::new()),
            notifier: Arc::new(LoggingNotifier::new()),
            clock: Arc::new(clock.clone()),
            timers: timer.clone(),
        },
        StdRng::seed_from_u64(seed),
    );

    // Clock events are queued before the captures so that a capture due at
    // shift start already sees the clock-in.
    let silent: HashSet<WorkerId> = skip_report.into_iter().map(WorkerId).collect();
    let mut day_end = instant(date, config.end_of_day);
    for worker in stores.workers.all_workers().await.into_diagnostic()? {
        if !worker.active || !worker.schedule.works_on(chrono::Datelike::weekday(&date)) {
            continue;
        }
        let (id, start, end) = (
            worker.id,
            instant(date, worker.schedule.start),
            instant(date, worker.schedule.end),
        );
        day_end = day_end.max(end);

        let attendance = Arc::clone(orchestrator.attendance());
        timer.schedule_at(
            start,
            Box::pin(async move {
                if let Err(e) = attendance.clock_in(id, date, start).await {
                    tracing::error!(worker = %id, error = %e, "clock-in failed");
                }
            }),
        );

        let attendance = Arc::clone(orchestrator.attendance());
        let reports = !silent.contains(&id);
        timer.schedule_at(
            end,
            Box::pin(async move {
                if reports {
                    if let Err(e) = attendance.submit_progress_report(id, date).await {
                        tracing::error!(worker = %id, error = %e, "progress report failed");
                    }
                }
                if let Err(e) = attendance.clock_out(id, date, end).await {
                    tracing::error!(worker = %id, error = %e, "clock-out failed");
                }
            }),
        );
    }

    orchestrator.trigger_day_start(date).await.into_diagnostic()?;
    timer.advance_to(day_end).await;
    orchestrator.trigger_end_of_day(date).await.into_diagnostic()?;

    let past_deadline = clock.now() + config.approval_window();
    timer.advance_to(past_deadline).await;
    orchestrator.trigger_sweep(clock.now()).await.into_diagnostic()?;
    orchestrator.drain_outbox().await;

    let payments = stores
        .payments
        .all_payments()
        .await
        .into_diagnostic()?
        .into_iter()
        .filter(|p| p.date == date)
        .collect();
    let stdout = io::stdout();
    let mut writer = PaymentWriter::new(stdout.lock());
    writer.write_payments(payments).into_diagnostic()?;

    Ok(())
}

async fn run(config: Config, stores: Stores, presence_rate: f64) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let timers: Arc<dyn TimerService> = Arc::new(TokioTimerService::new(Arc::clone(&clock)));
    let orchestrator = DailyOrchestrator::new(
        config,
        stores,
        Collaborators {
            capture: Arc::new(SimulatedPresenceCapture::new(presence_rate, rand::random())),
            gateway: Arc::new(SimulatedTransferGateway::new()),
            notifier: Arc::new(LoggingNotifier::new()),
            clock,
            timers,
        },
        StdRng::from_entropy(),
    );

    let (shutdown, signal) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            let _ = shutdown.send(true);
        }
    });

    orchestrator.run(signal).await.into_diagnostic()
}
