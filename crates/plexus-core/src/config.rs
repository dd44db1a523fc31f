//! Switchboard configuration types.
//!
//! All options are process-wide and fixed at construction. The defaults
//! match the rates the runtime targets: a 256-slot latest-value ring, a
//! steady-state delivery queue of 8 events, and a 100 ms worker poll.

use std::time::Duration;

use fxhash::FxHashMap;

use crate::error::{Error, Result};

/// Default depth of the per-topic latest-value ring.
pub const DEFAULT_LATEST_RING_SIZE: usize = 256;

/// Default steady-state target depth for subscription delivery queues.
pub const DEFAULT_QUEUE_HINT: usize = 8;

/// Default dequeue timeout in the delivery worker loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default high-water mark for subscribers opted into overload shedding.
pub const DEFAULT_HIGH_WATER: usize = 50;

/// Overload policy for one named subscriber.
///
/// When the subscriber's queue depth exceeds `high_water` and
/// `drop_oldest` is set, the publisher sheds the oldest queued event
/// before enqueueing the new one. Oldest-drop favours freshness, which is
/// what a pose integrator wants when it falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressurePolicy {
    /// Queue depth above which shedding starts.
    pub high_water: usize,
    /// Whether to shed the oldest queued event to make room.
    pub drop_oldest: bool,
}

impl Default for PressurePolicy {
    fn default() -> Self {
        Self {
            high_water: DEFAULT_HIGH_WATER,
            drop_oldest: true,
        }
    }
}

/// Per-subscriber overload policies, keyed by subscriber name.
///
/// Empty by default: no subscriber sheds events unless opted in by name.
#[derive(Debug, Clone, Default)]
pub struct PressureConfig {
    policies: FxHashMap<String, PressurePolicy>,
}

impl PressureConfig {
    /// Creates an empty pressure configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a policy for the named subscriber.
    #[must_use]
    pub fn with_policy(mut self, subscriber: impl Into<String>, policy: PressurePolicy) -> Self {
        self.policies.insert(subscriber.into(), policy);
        self
    }

    /// Returns the policy for the named subscriber, if one was configured.
    #[must_use]
    pub fn policy(&self, subscriber: &str) -> Option<PressurePolicy> {
        self.policies.get(subscriber).copied()
    }

    /// Returns true if no subscriber has a policy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Process-wide switchboard configuration.
#[derive(Debug, Clone)]
pub struct SwitchboardConfig {
    /// Depth of the per-topic latest-value ring (rounded up to a power of
    /// two; must be at least 1).
    pub latest_ring_size: usize,

    /// Steady-state target depth for subscription delivery queues. The
    /// queues may grow past this under load.
    pub queue_hint: usize,

    /// Dequeue timeout in the delivery worker loop. This bounds how long a
    /// stop request waits for an idle worker to notice it.
    pub poll_interval: Duration,

    /// Per-subscriber overload policies.
    pub pressure: PressureConfig,

    /// Enables the payload-type and single-writer assertions on the
    /// publish path.
    pub debug_checks: bool,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            latest_ring_size: DEFAULT_LATEST_RING_SIZE,
            queue_hint: DEFAULT_QUEUE_HINT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pressure: PressureConfig::default(),
            debug_checks: cfg!(debug_assertions),
        }
    }
}

impl SwitchboardConfig {
    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> SwitchboardConfigBuilder {
        SwitchboardConfigBuilder::default()
    }

    /// Returns the effective ring depth (rounded up to a power of two).
    #[must_use]
    pub fn effective_ring_size(&self) -> usize {
        self.latest_ring_size.max(1).next_power_of_two()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the ring depth or queue hint is
    /// zero, or the poll interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.latest_ring_size == 0 {
            return Err(Error::InvalidConfig("latest_ring_size must be at least 1".into()));
        }
        if self.queue_hint == 0 {
            return Err(Error::InvalidConfig("queue_hint must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll_interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for [`SwitchboardConfig`].
#[derive(Debug, Default)]
pub struct SwitchboardConfigBuilder {
    latest_ring_size: Option<usize>,
    queue_hint: Option<usize>,
    poll_interval: Option<Duration>,
    pressure: PressureConfig,
    debug_checks: Option<bool>,
}

impl SwitchboardConfigBuilder {
    /// Sets the latest-value ring depth.
    #[must_use]
    pub fn latest_ring_size(mut self, size: usize) -> Self {
        self.latest_ring_size = Some(size);
        self
    }

    /// Sets the delivery queue steady-state hint.
    #[must_use]
    pub fn queue_hint(mut self, hint: usize) -> Self {
        self.queue_hint = Some(hint);
        self
    }

    /// Sets the worker dequeue timeout.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Adds an overload policy for the named subscriber.
    #[must_use]
    pub fn pressure_policy(mut self, subscriber: impl Into<String>, policy: PressurePolicy) -> Self {
        self.pressure = self.pressure.with_policy(subscriber, policy);
        self
    }

    /// Enables or disables the publish-path debug assertions.
    #[must_use]
    pub fn debug_checks(mut self, enabled: bool) -> Self {
        self.debug_checks = Some(enabled);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SwitchboardConfig {
        SwitchboardConfig {
            latest_ring_size: self.latest_ring_size.unwrap_or(DEFAULT_LATEST_RING_SIZE),
            queue_hint: self.queue_hint.unwrap_or(DEFAULT_QUEUE_HINT),
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            pressure: self.pressure,
            debug_checks: self.debug_checks.unwrap_or(cfg!(debug_assertions)),
        }
    }
}
