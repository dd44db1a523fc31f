//! Delivery queue between a topic's publisher and one subscription worker.
//!
//! A growable FIFO with a steady-state capacity hint. In normal operation
//! there is one producer (the topic's single writer) and one consumer (the
//! subscription's worker thread); the overload valve in
//! [`Subscription::enqueue`](crate::subscription::Subscription::enqueue)
//! additionally pops from the publisher side, so the queue stays safe for
//! multiple poppers. The timed pop uses short park slices against a
//! deadline rather than a notification channel; at a 100 ms poll interval
//! the bookkeeping is negligible.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::event::ErasedEvent;

/// Park slice while waiting on an empty queue. Balances wake-up latency
/// against syscall overhead.
const PARK_SLICE: Duration = Duration::from_micros(100);

/// Growable FIFO of shared event references.
pub(crate) struct DeliveryQueue {
    items: Mutex<VecDeque<ErasedEvent>>,
}

impl DeliveryQueue {
    /// Creates a queue pre-sized to the steady-state hint.
    pub fn with_hint(hint: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(hint)),
        }
    }

    /// Appends an event at the tail.
    pub fn push(&self, event: ErasedEvent) {
        self.items.lock().push_back(event);
    }

    /// Pops the head without blocking.
    pub fn try_pop(&self) -> Option<ErasedEvent> {
        self.items.lock().pop_front()
    }

    /// Pops the head, waiting up to `timeout` for an event to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<ErasedEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.try_pop() {
                return Some(event);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::park_timeout((deadline - now).min(PARK_SLICE));
        }
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Drops every queued event and returns how many were released.
    pub fn drain(&self) -> u64 {
        let mut items = self.items.lock();
        let drained = items.len() as u64;
        items.clear();
        drained
    }
}
