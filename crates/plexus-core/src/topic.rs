//! Per-name channel state: type tag, latest-value ring, subscriptions.
//!
//! A topic is created once per name and never removed; stopping destroys
//! its subscriptions but keeps the ring alive, so handles held by other
//! components stay valid through teardown. Publishing installs the event
//! into the ring first (asynchronous readers observe it immediately) and
//! then fans one reference out to each subscription queue under the shared
//! lock.
//!
//! Publishing on a given topic is a single-writer operation. The fabric
//! does not serialize publishers; it detects a violated contract under
//! debug checks and fails fast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::SwitchboardConfig;
use crate::error::{fatal, Result};
use crate::event::{ErasedEvent, TypeTag};
use crate::ring::LatestRing;
use crate::subscription::{ErasedCallback, Subscription};

/// A named, strongly typed event channel.
pub(crate) struct Topic {
    name: String,
    tag: TypeTag,
    ring: LatestRing,
    subscriptions: RwLock<Vec<Subscription>>,
    /// Set under the subscriptions write lock by `stop`. Checked by
    /// `schedule` under the same lock, so a schedule racing a stop cannot
    /// append a worker the sweep has already missed.
    stopped: AtomicBool,
    in_publish: AtomicBool,
    config: Arc<SwitchboardConfig>,
}

impl Topic {
    pub fn new(name: String, tag: TypeTag, config: Arc<SwitchboardConfig>) -> Self {
        Self {
            name,
            tag,
            ring: LatestRing::new(config.effective_ring_size()),
            subscriptions: RwLock::new(Vec::new()),
            stopped: AtomicBool::new(false),
            in_publish: AtomicBool::new(false),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Installs the event as the topic's latest value and fans it out to
    /// every subscription queue.
    pub fn publish(&self, event: ErasedEvent) {
        if self.config.debug_checks {
            if !self.tag.matches(&event) {
                fatal(format_args!(
                    "published event on topic '{}' is not a '{}'",
                    self.name,
                    self.tag.name()
                ));
            }
            if self.in_publish.swap(true, Ordering::Acquire) {
                fatal(format_args!(
                    "concurrent writers detected on topic '{}'",
                    self.name
                ));
            }
        }

        self.ring.install(Arc::clone(&event));

        let subscriptions = self.subscriptions.read();
        for subscription in subscriptions.iter() {
            subscription.enqueue(Arc::clone(&event));
        }
        drop(subscriptions);

        if self.config.debug_checks {
            self.in_publish.store(false, Ordering::Release);
        }
    }

    /// Returns the most recent event, or `None` before the first publish.
    pub fn latest(&self) -> Option<ErasedEvent> {
        self.ring.latest()
    }

    /// Appends a subscription; its worker is running when this returns.
    ///
    /// The new subscriber only receives events published after this call.
    /// Once the topic has been stopped the subscription is torn down again
    /// instead of appended, so no worker can outlive a stop sweep.
    pub fn schedule(&self, subscriber_name: String, callback: ErasedCallback) -> Result<()> {
        let pressure = self.config.pressure.policy(&subscriber_name);
        let mut subscription = Subscription::spawn(
            self.name.clone(),
            subscriber_name,
            callback,
            pressure,
            self.config.queue_hint,
            self.config.poll_interval,
            self.config.debug_checks,
        )?;

        let mut subscriptions = self.subscriptions.write();
        if self.stopped.load(Ordering::Acquire) {
            drop(subscriptions);
            subscription.stop();
            tracing::warn!(
                topic = %self.name,
                subscriber = %subscription.subscriber_name(),
                "schedule after stop ignored"
            );
            return Ok(());
        }
        tracing::debug!(
            topic = %self.name,
            subscriber = %subscription.subscriber_name(),
            subscriptions = subscriptions.len() + 1,
            "subscriber scheduled"
        );
        subscriptions.push(subscription);
        Ok(())
    }

    /// Destroys every subscription, joining their workers. The ring stays
    /// intact: `latest()` keeps answering and `publish()` simply has
    /// nobody left to fan out to.
    pub fn stop(&self) {
        let mut subscriptions = self.subscriptions.write();
        self.stopped.store(true, Ordering::Release);
        for subscription in subscriptions.iter_mut() {
            subscription.stop();
        }
        subscriptions.clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}
