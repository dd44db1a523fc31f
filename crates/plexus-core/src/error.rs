//! Error types for the switchboard.
//!
//! Only one condition is routinely surfaced to callers: reading a topic
//! before anything has been published (`NoEventYet`). Type mismatches and
//! configuration problems are reported at handle-construction time, where
//! the mistake was made. Everything else is a contract violation and goes
//! through [`fatal`], which logs a diagnostic and aborts the process; the
//! fabric has no policy for limping along with a broken consumer.

use thiserror::Error;

/// Result type for switchboard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for switchboard operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A handle or scheduled callback disagrees with the payload type the
    /// topic was created with.
    #[error("topic '{topic}' carries '{expected}' events, but '{actual}' was requested")]
    TypeMismatch {
        /// Topic name.
        topic: String,
        /// Payload type the topic was created with.
        expected: &'static str,
        /// Payload type the caller asked for.
        actual: &'static str,
    },

    /// A non-nullable read was attempted before any publish on the topic.
    #[error("no event has been published on topic '{topic}' yet")]
    NoEventYet {
        /// Topic name.
        topic: String,
    },

    /// The configuration handed to the switchboard is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The OS refused to spawn a delivery worker thread.
    #[error("failed to spawn delivery worker for subscriber '{subscriber}' on topic '{topic}'")]
    WorkerSpawn {
        /// Subscriber name.
        subscriber: String,
        /// Topic name.
        topic: String,
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },
}

/// Logs a diagnostic and aborts the process.
///
/// Used for contract violations (callback panics, drain accounting
/// mismatches, concurrent writers) where continuing would corrupt
/// delivery state.
#[cold]
pub(crate) fn fatal(diagnostic: std::fmt::Arguments<'_>) -> ! {
    tracing::error!("{diagnostic}");
    std::process::abort();
}
