//! One subscription: a delivery queue plus a dedicated worker thread.
//!
//! Every `schedule` call creates one `Subscription`. The worker dequeues
//! events with a timed pop and invokes the user callback with a
//! per-subscription iteration number, so a slow callback only ever delays
//! its own queue. The worker walks a small state machine
//! (`Initial -> Running -> Stopping -> Stopped`); `schedule` does not
//! return until the worker reports `Running`, and stopping joins the
//! thread before the queue it consumes from is torn down.
//!
//! Shutdown drains the queue without invoking the callback and checks the
//! released count against the enqueue/dequeue accounting; a mismatch means
//! the queue lost or duplicated a reference and is treated as fatal under
//! debug checks.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::PressurePolicy;
use crate::error::{fatal, Error, Result};
use crate::event::ErasedEvent;
use crate::queue::DeliveryQueue;

/// Erased callback invoked by the worker with (event, iteration number).
pub(crate) type ErasedCallback = Box<dyn Fn(&ErasedEvent, u64) + Send + Sync>;

/// How long the publisher-side overload valve waits to shed one event.
const SHED_TIMEOUT: Duration = Duration::from_millis(100);

/// Worker thread names are capped so they survive the kernel's 15-byte
/// thread name limit in a recognizable form.
const THREAD_NAME_TOPIC_CHARS: usize = 12;

const STATE_INITIAL: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPING: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// State shared between the subscription handle and its worker thread.
struct WorkerShared {
    state: AtomicU8,
    /// Events handed to the callback so far. Written by the worker only.
    dequeued: AtomicU64,
    /// Events pushed into the queue so far. Written by the publisher only.
    enqueued: AtomicU64,
    /// Events removed by the overload valve instead of the worker.
    shed: AtomicU64,
}

/// A (topic, subscriber) pair with its own queue and delivery thread.
pub(crate) struct Subscription {
    topic_name: String,
    subscriber_name: String,
    queue: Arc<DeliveryQueue>,
    shared: Arc<WorkerShared>,
    pressure: Option<PressurePolicy>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Creates the subscription and starts its worker. Returns once the
    /// worker is running.
    pub fn spawn(
        topic_name: String,
        subscriber_name: String,
        callback: ErasedCallback,
        pressure: Option<PressurePolicy>,
        queue_hint: usize,
        poll_interval: Duration,
        debug_checks: bool,
    ) -> Result<Self> {
        let queue = Arc::new(DeliveryQueue::with_hint(queue_hint));
        let shared = Arc::new(WorkerShared {
            state: AtomicU8::new(STATE_INITIAL),
            dequeued: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
            shed: AtomicU64::new(0),
        });

        let thread_name: String = std::iter::once('s')
            .chain(subscriber_name.chars())
            .chain(topic_name.chars().take(THREAD_NAME_TOPIC_CHARS))
            .collect();

        let worker = thread::Builder::new()
            .name(thread_name)
            .spawn({
                let queue = Arc::clone(&queue);
                let shared = Arc::clone(&shared);
                let topic = topic_name.clone();
                let subscriber = subscriber_name.clone();
                move || worker_main(&queue, &shared, &callback, &topic, &subscriber, poll_interval, debug_checks)
            })
            .map_err(|source| Error::WorkerSpawn {
                subscriber: subscriber_name.clone(),
                topic: topic_name.clone(),
                source,
            })?;

        // Workers own the callback; do not hand out events until the loop
        // is actually polling.
        while shared.state.load(Ordering::Acquire) == STATE_INITIAL {
            thread::yield_now();
        }

        Ok(Self {
            topic_name,
            subscriber_name,
            queue,
            shared,
            pressure,
            worker: Some(worker),
        })
    }

    /// Enqueues one shared reference for delivery.
    ///
    /// Called by the topic's publisher under the shared subscriptions
    /// lock. If this subscriber is over its high-water mark and opted into
    /// oldest-drop, one event is shed from the queue head first.
    pub fn enqueue(&self, event: ErasedEvent) {
        if let Some(policy) = self.pressure {
            if policy.drop_oldest && self.queue.len() > policy.high_water {
                if self.queue.pop_timeout(SHED_TIMEOUT).is_some() {
                    let shed = self.shared.shed.fetch_add(1, Ordering::Release) + 1;
                    tracing::warn!(
                        subscriber = %self.subscriber_name,
                        topic = %self.topic_name,
                        shed,
                        "queue over high water, shed oldest event"
                    );
                }
            }
        }
        self.queue.push(event);
        self.shared.enqueued.fetch_add(1, Ordering::Release);
    }

    /// Signals the worker to stop and joins it, draining the queue.
    pub fn stop(&mut self) {
        self.shared.state.store(STATE_STOPPING, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(
                    subscriber = %self.subscriber_name,
                    topic = %self.topic_name,
                    "delivery worker terminated abnormally"
                );
            }
        }
    }

    /// Subscriber name, for diagnostics.
    pub fn subscriber_name(&self) -> &str {
        &self.subscriber_name
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The worker must be gone before the queue it consumes from.
        self.stop();
    }
}

fn worker_main(
    queue: &DeliveryQueue,
    shared: &WorkerShared,
    callback: &ErasedCallback,
    topic: &str,
    subscriber: &str,
    poll_interval: Duration,
    debug_checks: bool,
) {
    shared.state.store(STATE_RUNNING, Ordering::Release);

    let mut processed: u64 = 0;
    let mut idle_cycles: u64 = 0;

    while shared.state.load(Ordering::Acquire) == STATE_RUNNING {
        match queue.pop_timeout(poll_interval) {
            Some(event) => {
                processed += 1;
                shared.dequeued.store(processed, Ordering::Release);
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| callback(&event, processed)));
                if let Err(payload) = outcome {
                    fatal(format_args!(
                        "subscriber '{subscriber}' on topic '{topic}' panicked at iteration \
                         {processed}: {}",
                        panic_message(payload.as_ref())
                    ));
                }
            }
            None => idle_cycles += 1,
        }
    }

    // Shutdown drain: release the backlog without invoking the callback.
    // Events removed by the overload valve never reached the worker and
    // are excluded from the outstanding count.
    let outstanding = shared.enqueued.load(Ordering::Acquire)
        - shared.shed.load(Ordering::Acquire)
        - processed;
    let drained = queue.drain();
    if drained != outstanding {
        if debug_checks {
            fatal(format_args!(
                "subscriber '{subscriber}' on topic '{topic}' drained {drained} events but \
                 {outstanding} were outstanding"
            ));
        }
        tracing::error!(
            subscriber = %subscriber,
            topic = %topic,
            drained,
            outstanding,
            "drain accounting mismatch"
        );
    }

    tracing::debug!(
        subscriber = %subscriber,
        topic = %topic,
        processed,
        drained,
        idle_cycles,
        "subscription stopped"
    );
    shared.state.store(STATE_STOPPED, Ordering::Release);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    fn event(v: u64) -> ErasedEvent {
        Arc::new(v)
    }

    fn collecting_callback(log: &Arc<Mutex<Vec<(u64, u64)>>>) -> ErasedCallback {
        let log = Arc::clone(log);
        Box::new(move |event, iteration| {
            let value = *event.downcast_ref::<u64>().unwrap();
            log.lock().unwrap().push((value, iteration));
        })
    }

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    fn spawn_collecting(
        log: &Arc<Mutex<Vec<(u64, u64)>>>,
        pressure: Option<PressurePolicy>,
    ) -> Subscription {
        Subscription::spawn(
            "topic".into(),
            "subscriber".into(),
            collecting_callback(log),
            pressure,
            8,
            Duration::from_millis(10),
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_delivers_in_order_with_iteration_numbers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sub = spawn_collecting(&log, None);

        for v in [10, 20, 30] {
            sub.enqueue(event(v));
        }

        assert!(wait_until(Duration::from_secs(1), || log.lock().unwrap().len() == 3));
        sub.stop();
        assert_eq!(*log.lock().unwrap(), vec![(10, 1), (20, 2), (30, 3)]);
    }

    #[test]
    fn test_stop_drains_backlog_without_callbacks() {
        let log = Arc::new(Mutex::new(Vec::new()));

        // Slow callback: the backlog builds while it sleeps.
        let blocked = Arc::new(Mutex::new(()));
        let guard = blocked.lock().unwrap();
        let mut sub = {
            let log = Arc::clone(&log);
            let blocked = Arc::clone(&blocked);
            Subscription::spawn(
                "topic".into(),
                "subscriber".into(),
                Box::new(move |event, iteration| {
                    let value = *event.downcast_ref::<u64>().unwrap();
                    log.lock().unwrap().push((value, iteration));
                    drop(blocked.lock().unwrap());
                }),
                None,
                8,
                Duration::from_millis(10),
                true,
            )
            .unwrap()
        };

        for v in 0..10 {
            sub.enqueue(event(v));
        }
        // First event reaches the callback and blocks there.
        assert!(wait_until(Duration::from_secs(1), || !log.lock().unwrap().is_empty()));
        drop(guard);
        sub.stop();

        // Everything enqueued was either delivered or drained; references
        // are not leaked past stop().
        let delivered = log.lock().unwrap().len();
        assert!(delivered <= 10);
        assert_eq!(sub.queue.len(), 0);
    }

    #[test]
    fn test_pressure_valve_sheds_oldest() {
        let log = Arc::new(Mutex::new(Vec::new()));

        // Worker blocked on the first event while we flood the queue.
        let blocked = Arc::new(Mutex::new(()));
        let guard = blocked.lock().unwrap();
        let mut sub = {
            let log = Arc::clone(&log);
            let blocked = Arc::clone(&blocked);
            Subscription::spawn(
                "topic".into(),
                "integrator".into(),
                Box::new(move |event, iteration| {
                    let value = *event.downcast_ref::<u64>().unwrap();
                    log.lock().unwrap().push((value, iteration));
                    drop(blocked.lock().unwrap());
                }),
                Some(PressurePolicy { high_water: 4, drop_oldest: true }),
                8,
                Duration::from_millis(10),
                true,
            )
            .unwrap()
        };

        assert!(wait_until(Duration::from_secs(1), || {
            sub.enqueue(event(0));
            !log.lock().unwrap().is_empty()
        }));

        for v in 1..=20 {
            sub.enqueue(event(v));
        }
        // The valve caps the backlog around the high-water mark.
        assert!(sub.queue.len() <= 6, "backlog {} exceeds valve", sub.queue.len());
        assert!(sub.shared.shed.load(Ordering::Relaxed) > 0);

        drop(guard);
        sub.stop();
    }

    #[test]
    fn test_worker_running_before_spawn_returns() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sub = spawn_collecting(&log, None);
        assert_eq!(sub.shared.state.load(Ordering::Acquire), STATE_RUNNING);
        drop(sub);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sub = spawn_collecting(&log, None);
        sub.stop();
        sub.stop();
        assert_eq!(sub.shared.state.load(Ordering::Acquire), STATE_STOPPED);
    }
}
