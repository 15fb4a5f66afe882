//! Notification outbox.
//!
//! State transitions only append intents here; delivery happens separately
//! in [`Outbox::drain`], so a slow or failing notifier never affects a
//! payment's state.

use crate::domain::ports::{NotificationIntent, NotificationKind, Notifier, Recipient};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
pub struct Outbox {
    queue: Mutex<VecDeque<NotificationIntent>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, recipient: Recipient, kind: NotificationKind, payload: serde_json::Value) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.push_back(NotificationIntent {
            recipient,
            kind,
            payload,
        });
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers everything queued so far. Each intent is attempted once.
    pub async fn drain(&self, notifier: &dyn Notifier) -> DrainReport {
        let batch: Vec<NotificationIntent> = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.drain(..).collect()
        };

        let mut report = DrainReport::default();
        for intent in &batch {
            match notifier.notify(intent).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(kind = ?intent.kind, recipient = ?intent.recipient, error = %e, "notification dropped");
                }
            }
        }
        report
    }
}
