//! Latest-value ring for wait-free reads of the freshest event.
//!
//! A fixed, power-of-two array of seqlock slots indexed by serial number.
//! The single publisher installs each event into `slots[serial & mask]` and
//! then store-releases the head counter; readers load-acquire the head and
//! read the corresponding slot. A slot is only rewritten after a full lap
//! of the ring, so at the publish rates this fabric targets a reader can
//! never observe a slot mid-overwrite in practice. The per-slot version
//! check catches the theoretical case anyway and retries the read.
//!
//! The head counter doubles as the serial number: it is zero until the
//! first publish, and after a publish it equals the serial of the event
//! just installed.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::ErasedEvent;

/// One seqlock slot: an even version means the value is stable, odd means
/// a write is in progress.
struct Slot {
    version: AtomicU64,
    value: UnsafeCell<Option<ErasedEvent>>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            version: AtomicU64::new(0),
            value: UnsafeCell::new(None),
        }
    }
}

/// Single-writer, many-reader ring of the most recent events on a topic.
pub(crate) struct LatestRing {
    slots: Box<[Slot]>,
    mask: u64,
    head: AtomicU64,
}

// SAFETY: LatestRing is designed for single-producer, multi-consumer use:
// - Exactly one thread calls install() at a time (the topic's single-writer
//   contract; enforced by a debug assertion in Topic::publish)
// - Readers only clone the Arc out of a slot, and only accept the clone if
//   the slot version was even and unchanged across the read
// - The head counter is store-released after the slot write, so a reader
//   that observes serial N also observes slot N's contents
unsafe impl Send for LatestRing {}
// SAFETY: see above; concurrent readers never write through the UnsafeCell.
unsafe impl Sync for LatestRing {}

impl LatestRing {
    /// Creates a ring with `capacity` slots. `capacity` must be a power of
    /// two and at least 1.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Self {
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            mask: (capacity - 1) as u64,
            head: AtomicU64::new(0),
        }
    }

    /// Installs an event and returns its serial number.
    ///
    /// Must only be called from one thread at a time per ring.
    pub fn install(&self, event: ErasedEvent) -> u64 {
        let serial = self.head.load(Ordering::Relaxed) + 1;
        let slot = self.slot(serial);

        // Seqlock write: odd version while the slot is unstable. The
        // overwritten reference (one lap old) is dropped here.
        slot.version.fetch_add(1, Ordering::AcqRel);
        // SAFETY: single-writer contract; no other thread writes this slot,
        // and readers reject values read under an odd version.
        unsafe {
            *slot.value.get() = Some(event);
        }
        slot.version.fetch_add(1, Ordering::Release);

        self.head.store(serial, Ordering::Release);
        serial
    }

    /// Returns the most recent event, or `None` if nothing has been
    /// published. Never blocks.
    pub fn latest(&self) -> Option<ErasedEvent> {
        let serial = self.head.load(Ordering::Acquire);
        if serial == 0 {
            return None;
        }
        Some(self.read(serial))
    }

    fn read(&self, serial: u64) -> ErasedEvent {
        let slot = self.slot(serial);
        loop {
            let before = slot.version.load(Ordering::Acquire);
            if before & 1 == 0 {
                // SAFETY: the version was even, so no write was in progress
                // when we started. If the writer laps us mid-clone the
                // version check below fails and we retry; the clone itself
                // only bumps a reference count.
                let value = unsafe { (*slot.value.get()).clone() };
                let after = slot.version.load(Ordering::Acquire);
                if before == after {
                    if let Some(event) = value {
                        return event;
                    }
                }
            }
            std::hint::spin_loop();
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn slot(&self, serial: u64) -> &Slot {
        &self.slots[(serial & self.mask) as usize]
    }
}
