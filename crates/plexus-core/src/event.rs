//! Type-erased event payloads and runtime type tags.
//!
//! Topics carry exactly one payload type for their whole lifetime, but the
//! registry stores them behind a single erased type. Published events are
//! immutable and reference-counted: the latest-value ring, every
//! subscription queue, every in-flight callback, and every asynchronous
//! reader hold independent references to the same allocation. The typed
//! [`Reader`](crate::Reader) and [`Writer`](crate::Writer) handles confine
//! all downcasting to their own boundary.

use std::any::{Any, TypeId};
use std::sync::Arc;

/// A published, immutable, shared event payload.
pub(crate) type ErasedEvent = Arc<dyn Any + Send + Sync>;

/// Runtime identifier for a topic's payload type.
///
/// Equality is decided by the [`TypeId`] alone; the type name rides along
/// for diagnostics.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Returns the tag for `T`.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the human-readable type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if the erased event carries a payload of this type.
    pub fn matches(&self, event: &ErasedEvent) -> bool {
        (**event).type_id() == self.id
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}
