//! Fixed-capacity circular buffer of trace records over a caller-owned
//! memory region.
//!
//! # Design
//!
//! - The tracer never allocates. The caller hands over a `[start, end)`
//!   region once, at initialization; the usable end is rounded down so the
//!   region holds a whole number of records.
//! - The head cursor always points at the next slot to claim. Claiming
//!   returns the slot and advances head, wrapping back to `start` in the
//!   same claim that fills the last slot. Once full, the oldest records are
//!   silently overwritten. There is no backpressure and no "full" error.
//! - An unset ring (never initialized) turns every capture into a no-op at
//!   the cost of one null check, so tracing can be compiled in and left
//!   dormant.
//!
//! # Concurrency
//!
//! The head advance is the only read-modify-write of shared state in the
//! capture path. It is bracketed by the interrupt mask guard, not a
//! hardware atomic: the target is a single core where preemption is the
//! only hazard. A claimed slot is exclusively owned by the claiming context
//! until the buffer wraps back around to it.

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::irq::{InterruptMask, InterruptOps};
use crate::record::TraceRecord;

/// Rejected trace-region geometry, reported once at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// `start` is not aligned for [`TraceRecord`].
    Misaligned,
    /// The region is smaller than one record.
    TooSmall,
    /// The ring was already initialized.
    AlreadyInitialized,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::Misaligned => write!(f, "trace region start is misaligned"),
            RegionError::TooSmall => write!(f, "trace region smaller than one record"),
            RegionError::AlreadyInitialized => write!(f, "trace region already initialized"),
        }
    }
}

/// The circular trace-record buffer.
///
/// All three pointers are null until [`TraceRing::init`] runs; a null head
/// is the "disabled" state. The pointers are atomics only so the ring can
/// live in a `static`; on the single-core targets this runs on, relaxed
/// loads and stores are sufficient.
pub struct TraceRing {
    start: AtomicPtr<TraceRecord>,
    end: AtomicPtr<TraceRecord>,
    head: AtomicPtr<TraceRecord>,
}

impl TraceRing {
    /// An unset ring. Every [`claim`] on it returns `None`.
    ///
    /// [`claim`]: TraceRing::claim
    pub const fn new() -> Self {
        Self {
            start: AtomicPtr::new(core::ptr::null_mut()),
            end: AtomicPtr::new(core::ptr::null_mut()),
            head: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    /// Take ownership of the `[start, end)` region and arm the ring.
    ///
    /// `end` is rounded down so the region holds a whole number of records;
    /// the geometry checks run only here, never on the capture path.
    ///
    /// # Safety
    ///
    /// `start..end` must be valid for reads and writes, exclusively owned
    /// by this ring from now on, and live for the rest of the program.
    pub unsafe fn init(&self, start: *mut u8, end: *mut u8) -> Result<(), RegionError> {
        if !self.head.load(Ordering::Relaxed).is_null() {
            return Err(RegionError::AlreadyInitialized);
        }
        if start.align_offset(core::mem::align_of::<TraceRecord>()) != 0 {
            return Err(RegionError::Misaligned);
        }

        let bytes = (end as usize).saturating_sub(start as usize);
        let capacity = bytes / core::mem::size_of::<TraceRecord>();
        if capacity == 0 {
            return Err(RegionError::TooSmall);
        }

        let start = start.cast::<TraceRecord>();
        self.start.store(start, Ordering::Relaxed);
        // SAFETY: capacity slots fit in the region per the checks above.
        self.end.store(unsafe { start.add(capacity) }, Ordering::Relaxed);
        // Publishing head arms the ring; no claim can have run before this,
        // initialization completes before any hook fires.
        self.head.store(start, Ordering::Release);
        Ok(())
    }

    /// Claim the next slot and advance head, wrapping at the rounded end.
    ///
    /// Returns `None` when the ring was never initialized. The head
    /// read-modify-write runs under the mask guard so a claim from an
    /// interrupting context cannot observe it half-done; the returned slot
    /// is already exclusively owned when the guard drops.
    #[inline(always)]
    pub fn claim<I: InterruptOps>(
        &self,
        mask: &InterruptMask<I>,
    ) -> Option<NonNull<TraceRecord>> {
        if self.head.load(Ordering::Relaxed).is_null() {
            return None;
        }

        let token = mask.acquire();
        let slot = self.head.load(Ordering::Relaxed);
        // SAFETY: head is non-null and inside [start, end) once initialized,
        // so one-past-slot stays in bounds of the rounded region.
        let next = unsafe { slot.add(1) };
        let next = if next == self.end.load(Ordering::Relaxed) {
            self.start.load(Ordering::Relaxed)
        } else {
            next
        };
        self.head.store(next, Ordering::Relaxed);
        mask.restore(token);

        NonNull::new(slot)
    }

    /// Number of record slots, zero while the ring is unset.
    pub fn capacity(&self) -> usize {
        let start = self.start.load(Ordering::Relaxed);
        let end = self.end.load(Ordering::Relaxed);
        if start.is_null() {
            return 0;
        }
        (end as usize - start as usize) / core::mem::size_of::<TraceRecord>()
    }

    /// Whether [`TraceRing::init`] has run.
    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        !self.head.load(Ordering::Relaxed).is_null()
    }

    /// Slot index the head currently points at (the next slot to claim).
    pub fn head_index(&self) -> usize {
        let start = self.start.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        if head.is_null() {
            return 0;
        }
        (head as usize - start as usize) / core::mem::size_of::<TraceRecord>()
    }

    /// Read back one slot by index. `None` when out of bounds or unset.
    ///
    /// Slots that were never claimed read back as whatever the region held;
    /// zero-fill the region before [`TraceRing::init`] to make them decode
    /// as [`TraceRecord::is_empty`].
    pub fn read(&self, index: usize) -> Option<TraceRecord> {
        if index >= self.capacity() {
            return None;
        }
        let start = self.start.load(Ordering::Relaxed);
        // SAFETY: index is in bounds of the initialized region; a volatile
        // read tolerates a concurrent overwrite producing a torn record,
        // which post-mortem readers accept.
        Some(unsafe { start.add(index).read_volatile() })
    }

    /// Walk every slot from the one head points at, oldest first once the
    /// ring has wrapped.
    ///
    /// Reading while capture is live races with overwrites; stop recording
    /// before iterating for analysis.
    pub fn iter(&self) -> impl Iterator<Item = TraceRecord> + '_ {
        let capacity = self.capacity();
        let head = self.head_index();
        (0..capacity).filter_map(move |i| self.read((head + i) % capacity))
    }
}

impl Default for TraceRing {
    fn default() -> Self {
        Self::new()
    }
}
