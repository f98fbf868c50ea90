//! Bounded alert queue with drop-oldest overflow.

use crate::NotifierAlert;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

pub struct AlertQueue {
    capacity: usize,
    inner: Mutex<VecDeque<NotifierAlert>>,
    notify: Notify,
}

impl AlertQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueues alerts, dropping the oldest undelivered entries when full.
    /// Never blocks.
    pub fn push(&self, alerts: Vec<NotifierAlert>) {
        if alerts.is_empty() {
            return;
        }
        let dropped = {
            let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let mut dropped = 0usize;
            for alert in alerts {
                if queue.len() == self.capacity {
                    queue.pop_front();
                    dropped += 1;
                }
                queue.push_back(alert);
            }
            dropped
        };
        if dropped > 0 {
            tracing::warn!(dropped, "Notification queue full, dropped oldest alerts");
        }
        self.notify.notify_one();
    }

    /// Removes and returns up to `max` alerts, waiting until at least one
    /// is available.
    pub async fn pop_batch(&self, max: usize) -> Vec<NotifierAlert> {
        loop {
            let batch = self.drain(max);
            if !batch.is_empty() {
                return batch;
            }
            self.notify.notified().await;
        }
    }

    /// Removes and returns up to `max` alerts without waiting.
    pub fn drain(&self, max: usize) -> Vec<NotifierAlert> {
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let take = queue.len().min(max);
        queue.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
