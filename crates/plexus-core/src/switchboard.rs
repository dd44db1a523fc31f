//! The switchboard: topic registry and public entry point.
//!
//! The registry maps names to topics and enforces one payload type per
//! name for the life of the process. It is insertion-only: `stop()` halts
//! delivery everywhere but leaves every topic registered, so handles
//! already distributed across components keep working during teardown
//! instead of failing in cascade.
//!
//! Handle creation goes through the registry once; after that the hot
//! paths (publish, latest, callback delivery) never touch it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::config::SwitchboardConfig;
use crate::error::{Error, Result};
use crate::event::TypeTag;
use crate::handle::{Reader, Writer};
use crate::subscription::ErasedCallback;
use crate::topic::Topic;

/// Typed, named, in-process event fabric.
///
/// Constructed once per process and shared by reference between
/// components. See the [crate docs](crate) for an overview and example.
pub struct Switchboard {
    topics: RwLock<FxHashMap<String, Arc<Topic>>>,
    config: Arc<SwitchboardConfig>,
    stopped: AtomicBool,
}

impl Switchboard {
    /// Creates a switchboard with the default configuration.
    ///
    /// Collaborator lookup is reserved for future use; the switchboard
    /// currently has no constructor dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: RwLock::default(),
            config: Arc::new(SwitchboardConfig::default()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Creates a switchboard with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn with_config(config: SwitchboardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            topics: RwLock::default(),
            config: Arc::new(config),
            stopped: AtomicBool::new(false),
        })
    }

    /// Returns a handle that publishes `T` events to `topic_name`,
    /// creating the topic on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the topic already exists with a
    /// different payload type.
    pub fn get_writer<T: Send + Sync + 'static>(&self, topic_name: &str) -> Result<Writer<T>> {
        self.get_or_create(topic_name, TypeTag::of::<T>())
            .map(Writer::new)
    }

    /// Returns a handle that reads the latest `T` event on `topic_name`,
    /// creating the topic on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the topic already exists with a
    /// different payload type.
    pub fn get_reader<T: Send + Sync + 'static>(&self, topic_name: &str) -> Result<Reader<T>> {
        self.get_or_create(topic_name, TypeTag::of::<T>())
            .map(Reader::new)
    }

    /// Schedules `callback` on every event published to `topic_name`,
    /// creating the topic on first use.
    ///
    /// The callback runs on a dedicated thread owned by the switchboard
    /// and receives each event together with a per-subscription iteration
    /// number starting at 1. It only sees events published after this call
    /// returns. A panicking callback aborts the process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the topic already exists with a
    /// different payload type, or [`Error::WorkerSpawn`] if the delivery
    /// thread cannot be started.
    pub fn schedule<T, F>(&self, subscriber_name: &str, topic_name: &str, callback: F) -> Result<()>
    where
        T: Send + Sync + 'static,
        F: Fn(&T, u64) + Send + Sync + 'static,
    {
        let topic = self.get_or_create(topic_name, TypeTag::of::<T>())?;
        if self.stopped.load(Ordering::Acquire) {
            tracing::warn!(
                subscriber = %subscriber_name,
                topic = %topic_name,
                "schedule after stop ignored"
            );
            return Ok(());
        }

        let erased: ErasedCallback = Box::new(move |event, iteration| {
            if let Some(event) = event.downcast_ref::<T>() {
                callback(event, iteration);
            }
        });
        topic.schedule(subscriber_name.to_owned(), erased)
    }

    /// Halts all callback delivery fabric-wide. Idempotent.
    ///
    /// Workers drain their queues and are joined before this returns.
    /// Topics stay registered: existing handles keep answering `latest()`
    /// and may keep publishing, which becomes a silent drop in effect.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let topics = self.topics.read();
        for topic in topics.values() {
            topic.stop();
        }
        tracing::debug!(topics = topics.len(), "switchboard stopped");
    }

    /// Names of every registered topic.
    #[must_use]
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }

    /// Number of registered topics.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    /// Number of live subscriptions across all topics.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.topics
            .read()
            .values()
            .map(|topic| topic.subscription_count())
            .sum()
    }

    /// The configuration this switchboard was built with.
    #[must_use]
    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    /// Looks up `name`, verifying the payload type; creates the topic if
    /// absent. Concurrent creators converge on the same topic.
    fn get_or_create(&self, name: &str, tag: TypeTag) -> Result<Arc<Topic>> {
        if let Some(topic) = self.topics.read().get(name) {
            return Self::verify(topic, tag);
        }

        let mut topics = self.topics.write();
        // Another creator may have won the race between the locks.
        if let Some(topic) = topics.get(name) {
            return Self::verify(topic, tag);
        }

        let topic = Arc::new(Topic::new(name.to_owned(), tag, Arc::clone(&self.config)));
        topics.insert(name.to_owned(), Arc::clone(&topic));
        tracing::debug!(topic = %name, payload = %tag.name(), "topic created");
        Ok(topic)
    }

    fn verify(topic: &Arc<Topic>, tag: TypeTag) -> Result<Arc<Topic>> {
        if topic.tag() == tag {
            Ok(Arc::clone(topic))
        } else {
            Err(Error::TypeMismatch {
                topic: topic.name().to_owned(),
                expected: topic.tag().name(),
                actual: tag.name(),
            })
        }
    }
}

impl Default for Switchboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Switchboard {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Switchboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchboard")
            .field("topics", &self.topic_count())
            .field("subscriptions", &self.subscription_count())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_topic() {
        let sb = Switchboard::new();
        let writer = sb.get_writer::<u64>("pose").unwrap();
        let reader = sb.get_reader::<u64>("pose").unwrap();
        assert_eq!(sb.topic_count(), 1);

        writer.publish(writer.allocate(11));
        assert_eq!(*reader.latest().unwrap(), 11);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let sb = Switchboard::new();
        let _writer = sb.get_writer::<i32>("t").unwrap();

        let err = sb.get_reader::<f64>("t").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        // The topic is unchanged and still serves its original type.
        assert!(sb.get_reader::<i32>("t").is_ok());
        assert_eq!(sb.topic_count(), 1);
    }

    #[test]
    fn test_concurrent_creators_converge() {
        let sb = Arc::new(Switchboard::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sb = Arc::clone(&sb);
                std::thread::spawn(move || sb.get_writer::<u64>("shared").is_ok())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(sb.topic_count(), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let sb = Switchboard::new();
        let _writer = sb.get_writer::<u64>("pose").unwrap();
        sb.stop();
        sb.stop();
        assert_eq!(sb.topic_count(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SwitchboardConfig::builder().latest_ring_size(0).build();
        assert!(matches!(
            Switchboard::with_config(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
