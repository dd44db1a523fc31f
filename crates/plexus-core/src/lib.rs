//! # Plexus Core
//!
//! The in-process event fabric for the plexus XR runtime: a typed, named,
//! multi-producer/multi-consumer switchboard that wires sensor producers
//! (IMU, camera, pose estimators) to consumers (SLAM, renderers,
//! integrators) without coupling them to each other.
//!
//! This crate provides:
//! - **Switchboard**: the topic registry and public entry point
//! - **Reader / Writer**: typed handles over named topics
//! - **Latest-value ring**: wait-free access to the most recent event
//! - **Scheduled callbacks**: one bounded queue and one delivery thread per
//!   (topic, subscriber) pair, so a slow consumer never blocks a publisher
//!
//! ## Design Principles
//!
//! 1. **Registry off the hot path** - handles resolve their topic once
//! 2. **No locks on the read path** - `latest()` is two atomic loads and a
//!    slot read
//! 3. **Single writer per topic** - serial numbers come from one thread
//! 4. **Fail fast on contract violations** - only "no event yet" is a
//!    recoverable error
//!
//! ## Example
//!
//! ```rust,ignore
//! use plexus_core::Switchboard;
//!
//! let sb = Switchboard::new();
//!
//! // Deliver every pose to a dedicated thread.
//! sb.schedule::<Pose, _>("integrator", "slow_pose", |pose, iteration| {
//!     integrate(pose, iteration);
//! })?;
//!
//! let writer = sb.get_writer::<Pose>("slow_pose")?;
//! writer.publish(writer.allocate(Pose::identity()));
//!
//! // Any thread can sample the freshest value without blocking.
//! let reader = sb.get_reader::<Pose>("slow_pose")?;
//! if let Some(pose) = reader.latest_or_none() {
//!     render(&pose);
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Allow unsafe in the ring module for the seqlock slots
#![allow(unsafe_code)]

pub mod config;
pub mod error;

mod event;
mod handle;
mod queue;
mod ring;
mod subscription;
mod switchboard;
mod topic;


pub use config::{PressureConfig, PressurePolicy, SwitchboardConfig, SwitchboardConfigBuilder};
pub use error::{Error, Result};
pub use handle::{Reader, Writer};
pub use switchboard::Switchboard;
