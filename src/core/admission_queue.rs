//! Priority admission queue.
//!
//! Multi-producer, single-consumer. Producers append with [`AdmissionQueue::enqueue`]
//! and the scheduler sorts with [`AdmissionQueue::reorder`]; the coordinator is
//! the only caller of [`AdmissionQueue::dequeue`], which suspends until work
//! arrives or the queue is closed.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::core::error::AdmissionError;
use crate::core::model::Order;
use crate::util::clock::now_ms;
use crate::util::serde::PriorityLevel;

/// Adjusts an order's effective priority while it waits.
pub trait PriorityAging: Send + Sync {
    /// Priority boost for `order` at time `now_ms`.
    fn boost(&self, order: &Order, now_ms: u128) -> PriorityLevel;
}

/// Waiting time never changes priority.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAging;

impl PriorityAging for NoAging {
    fn boost(&self, _order: &Order, _now_ms: u128) -> PriorityLevel {
        0
    }
}

/// An order plus its arrival sequence number.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// The queued order.
    pub order: Order,
    /// Arrival sequence, unique per queue.
    pub seq: u64,
    effective: PriorityLevel,
}

impl QueueEntry {
    /// Priority after aging, as of the last reorder.
    #[must_use]
    pub const fn effective_priority(&self) -> PriorityLevel {
        self.effective
    }

    // Higher priority first, then older, then earlier arrival.
    fn admission_order(&self, other: &Self) -> Ordering {
        other
            .effective
            .cmp(&self.effective)
            .then_with(|| self.order.created_at_ms.cmp(&other.order.created_at_ms))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    next_seq: u64,
    closed: bool,
}

/// Blocking priority queue feeding the coordinator.
pub struct AdmissionQueue {
    state: Mutex<QueueState>,
    available: Notify,
    aging: Box<dyn PriorityAging>,
}

impl fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AdmissionQueue")
            .field("len", &state.entries.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl Default for AdmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionQueue {
    /// Empty queue without aging.
    #[must_use]
    pub fn new() -> Self {
        Self::with_aging(Box::new(NoAging))
    }

    /// Empty queue with a custom aging hook.
    #[must_use]
    pub fn with_aging(aging: Box<dyn PriorityAging>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            aging,
        }
    }

    /// Append an order.
    ///
    /// # Errors
    ///
    /// `Malformed` for an order with no dish or no workspace requirement (the
    /// order is dropped), `QueueClosed` after [`AdmissionQueue::close`].
    pub fn enqueue(&self, order: Order) -> Result<(), AdmissionError> {
        if let Err(err) = order.validate() {
            warn!(order_id = order.id, error = %err, "rejected malformed order");
            return Err(err);
        }
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(AdmissionError::QueueClosed);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            debug!(order_id = order.id, priority = order.priority, seq, "order enqueued");
            state.entries.push_back(QueueEntry {
                effective: order.priority,
                order,
                seq,
            });
        }
        self.available.notify_one();
        Ok(())
    }

    /// Sort pending entries by effective priority, creation time and arrival.
    /// The sort is stable.
    pub fn reorder(&self) {
        let now = now_ms();
        let mut state = self.state.lock();
        let mut drained: Vec<QueueEntry> = state.entries.drain(..).collect();
        for entry in &mut drained {
            entry.effective = entry
                .order
                .priority
                .saturating_add(self.aging.boost(&entry.order, now));
        }
        drained.sort_by(QueueEntry::admission_order);
        state.entries.extend(drained);
    }

    /// Put an order back after a failed admission attempt.
    ///
    /// # Errors
    ///
    /// Same as [`AdmissionQueue::enqueue`].
    pub fn requeue(&self, order: Order) -> Result<(), AdmissionError> {
        self.enqueue(order)?;
        self.reorder();
        Ok(())
    }

    /// Remove the head without waiting.
    pub fn try_dequeue(&self) -> Option<Order> {
        self.state.lock().entries.pop_front().map(|e| e.order)
    }

    /// Remove the head, waiting until one exists. Returns `None` once the
    /// queue is closed and drained.
    pub async fn dequeue(&self) -> Option<Order> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(entry) = state.entries.pop_front() {
                    return Some(entry.order);
                }
                if state.closed {
                    return None;
                }
            }
            self.available.notified().await;
        }
    }

    /// Stop accepting orders and wake the consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_one();
    }

    /// Whether [`AdmissionQueue::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of pending orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no orders are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Copies of pending orders in current queue order.
    #[must_use]
    pub fn pending(&self) -> Vec<Order> {
        self.state.lock().entries.iter().map(|e| e.order.clone()).collect()
    }
}
