//! Timer services: real tokio sleeps, and a virtual timer that runs tasks
//! when time is advanced by hand.

use super::clock::ManualClock;
use crate::domain::ports::{Clock, TimerHandle, TimerService, TimerTask};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Spawns one tokio task per timer that sleeps until the due time.
/// Cancelling a timer before it fires aborts its task.
///
/// Must be used from within a tokio runtime.
pub struct TokioTimerService {
    clock: Arc<dyn Clock>,
}

impl TokioTimerService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl TimerService for TokioTimerService {
    fn schedule_at(&self, at: DateTime<Utc>, task: TimerTask) -> TimerHandle {
        let handle = TimerHandle::new();
        let delay = (at - self.clock.now()).to_std().unwrap_or_default();
        let fire = handle.clone();
        let sleeper = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fire.begin_fire() {
                task.await;
            }
        });
        let abort = sleeper.abort_handle();
        handle.on_cancel(move || abort.abort());
        handle
    }
}

type Queue = BTreeMap<(DateTime<Utc>, u64), (TimerHandle, TimerTask)>;

/// Runs scheduled tasks in due-time order when [`VirtualTimer::advance_to`]
/// is called, moving the shared [`ManualClock`] along.
pub struct VirtualTimer {
    clock: ManualClock,
    queue: Mutex<Queue>,
    seq: AtomicU64,
}

impl VirtualTimer {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            queue: Mutex::new(BTreeMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Timers that are neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.lock_queue().values().filter(|(h, _)| h.is_live()).count()
    }

    /// Runs every task due at or before `until`, including tasks scheduled
    /// by tasks run during this call, then leaves the clock at `until`.
    pub async fn advance_to(&self, until: DateTime<Utc>) -> usize {
        let mut fired = 0;
        loop {
            let next = {
                let mut queue = self.lock_queue();
                match queue.first_key_value() {
                    Some((&(at, _), _)) if at <= until => queue.pop_first(),
                    _ => None,
                }
            };
            let Some(((at, _), (handle, task))) = next else {
                break;
            };
            if at > self.clock.now() {
                self.clock.set(at);
            }
            if handle.begin_fire() {
                task.await;
                fired += 1;
            }
        }
        if until > self.clock.now() {
            self.clock.set(until);
        }
        fired
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TimerService for VirtualTimer {
    fn schedule_at(&self, at: DateTime<Utc>, task: TimerTask) -> TimerHandle {
        let handle = TimerHandle::new();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.lock_queue().insert((at, seq), (handle.clone(), task));
        handle
    }
}
