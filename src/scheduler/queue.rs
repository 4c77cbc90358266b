//! Per-endpoint admission queue.
//!
//! The limiter never blocks; the queue decides *who* gets to ask it
//! next. Waiters are ordered by (priority desc, arrival asc) — equal
//! priorities are strictly FIFO — and only the head of the queue may
//! attempt an acquisition, which is what makes grants (and therefore
//! producer invocations) FIFO within an endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

use crate::types::{Endpoint, Priority};

pub(crate) struct Waiter {
    priority: Priority,
    seq: u64,
    pub(crate) notify: Notify,
}

#[derive(Default)]
struct EndpointQueue {
    // Sorted: head at index 0. Small in practice, so a Vec with sorted
    // insert beats a heap that cannot remove arbitrary members.
    waiters: Vec<Arc<Waiter>>,
}

impl EndpointQueue {
    fn insert(&mut self, waiter: Arc<Waiter>) {
        let at = self
            .waiters
            .partition_point(|w| (w.priority, std::cmp::Reverse(w.seq)) >= (waiter.priority, std::cmp::Reverse(waiter.seq)));
        self.waiters.insert(at, waiter);
    }
}

/// FIFO-within-priority wait queue, one lane per endpoint.
pub(crate) struct AdmissionQueue {
    lanes: Mutex<HashMap<Endpoint, EndpointQueue>>,
    next_seq: AtomicU64,
}

impl AdmissionQueue {
    pub(crate) fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Join the lane for `endpoint`. The returned waiter must be
    /// released with [`leave`](Self::leave) (guard it against
    /// cancellation).
    pub(crate) fn join(&self, endpoint: Endpoint, priority: Priority) -> Arc<Waiter> {
        let waiter = Arc::new(Waiter {
            priority,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            notify: Notify::new(),
        });
        let mut lanes = self.lanes.lock().unwrap();
        lanes.entry(endpoint).or_default().insert(Arc::clone(&waiter));
        waiter
    }

    /// Whether `waiter` is currently at the head of its lane.
    pub(crate) fn is_head(&self, endpoint: Endpoint, waiter: &Arc<Waiter>) -> bool {
        let lanes = self.lanes.lock().unwrap();
        lanes
            .get(&endpoint)
            .and_then(|lane| lane.waiters.first())
            .is_some_and(|head| Arc::ptr_eq(head, waiter))
    }

    /// Remove `waiter` from its lane and wake the (possibly new) head.
    pub(crate) fn leave(&self, endpoint: Endpoint, waiter: &Arc<Waiter>) {
        let head = {
            let mut lanes = self.lanes.lock().unwrap();
            let Some(lane) = lanes.get_mut(&endpoint) else {
                return;
            };
            lane.waiters.retain(|w| !Arc::ptr_eq(w, waiter));
            if lane.waiters.is_empty() {
                lanes.remove(&endpoint);
                None
            } else {
                lane.waiters.first().cloned()
            }
        };
        if let Some(head) = head {
            head.notify.notify_one();
        }
    }

    /// Waiters currently queued for `endpoint`.
    #[cfg(test)]
    pub(crate) fn lane_len(&self, endpoint: Endpoint) -> usize {
        self.lanes
            .lock()
            .unwrap()
            .get(&endpoint)
            .map_or(0, |lane| lane.waiters.len())
    }
}
