//! Typed reader and writer handles over an erased topic.
//!
//! Handles re-impose the compile-time payload type on top of the topic's
//! runtime tag. The tag is verified exactly once, when the handle is
//! constructed by the [`Switchboard`](crate::Switchboard); after that the
//! hot paths carry no type checks beyond the downcast at this boundary.
//! Handles are cheap to clone and own nothing but a reference to their
//! topic, so they can be handed out liberally and outlive `stop()`.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::topic::Topic;

/// A handle that reads the most recent event on a topic.
///
/// Reads are wait-free and idempotent: two consecutive calls may return
/// the same event. Cloning the returned `Arc` is the only cost.
pub struct Reader<T> {
    topic: Arc<Topic>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Reader<T> {
    /// Caller must have verified the topic's tag against `T`.
    pub(crate) fn new(topic: Arc<Topic>) -> Self {
        Self {
            topic,
            _marker: PhantomData,
        }
    }

    /// Returns the most recent event, or `None` before the first publish.
    #[must_use]
    pub fn latest_or_none(&self) -> Option<Arc<T>> {
        self.topic.latest().and_then(|event| event.downcast::<T>().ok())
    }

    /// Returns the most recent event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEventYet`] before the first publish on the
    /// topic.
    pub fn latest(&self) -> Result<Arc<T>> {
        self.latest_or_none().ok_or_else(|| Error::NoEventYet {
            topic: self.topic.name().to_owned(),
        })
    }

    /// Returns an independently owned, mutable copy of the most recent
    /// event. Mutating the copy does not affect other observers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEventYet`] before the first publish on the
    /// topic.
    pub fn latest_mut(&self) -> Result<T>
    where
        T: Clone,
    {
        self.latest().map(|event| (*event).clone())
    }

    /// Name of the topic this handle reads.
    #[must_use]
    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self {
            topic: Arc::clone(&self.topic),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader").field("topic", &self.topic.name()).finish()
    }
}

/// A handle that publishes events to a topic.
///
/// Publishing on a given topic must come from one thread at a time; the
/// fabric detects violations under debug checks.
pub struct Writer<T> {
    topic: Arc<Topic>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Send + Sync + 'static> Writer<T> {
    /// Caller must have verified the topic's tag against `T`.
    pub(crate) fn new(topic: Arc<Topic>) -> Self {
        Self {
            topic,
            _marker: PhantomData,
        }
    }

    /// Constructs a new payload buffer for this topic.
    ///
    /// Callers should not assume a fresh allocation: the boxed indirection
    /// leaves room for recycling retired event buffers later without
    /// touching call sites.
    #[must_use]
    pub fn allocate(&self, value: T) -> Box<T> {
        Box::new(value)
    }

    /// Publishes the payload, converting it to a shared read-only
    /// reference. The caller gives up mutable access.
    pub fn publish(&self, event: Box<T>) {
        let event: Box<dyn Any + Send + Sync> = event;
        let event: Arc<dyn Any + Send + Sync> = Arc::from(event);
        self.topic.publish(event);
    }

    /// Name of the topic this handle publishes to.
    #[must_use]
    pub fn topic_name(&self) -> &str {
        self.topic.name()
    }
}

impl<T> Clone for Writer<T> {
    fn clone(&self) -> Self {
        Self {
            topic: Arc::clone(&self.topic),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Writer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer").field("topic", &self.topic.name()).finish()
    }
}
