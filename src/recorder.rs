//! The tracer context object: one trace session wiring a ring, an
//! interrupt mask and a clock together.
//!
//! `Tracer` owns no global state. The interrupt binding and the clock are
//! injected at construction, so independent sessions can coexist and the
//! whole capture path runs on a host with fakes. The compiler-facing C ABI
//! entry points live in [`crate::hooks`] and forward to one registered
//! session.
//!
//! Capture must never perturb the instrumented program: no failure paths,
//! no blocking, no allocation. The only observable effect of a hook call is
//! one record written (or overwritten) in the ring.

use core::ptr::NonNull;

use crate::clock::Clock;
use crate::irq::{InterruptMask, InterruptOps};
use crate::record::{Meta, TraceRecord};
use crate::ring::{RegionError, TraceRing};

/// Destination for enter/exit events, object-safe so a hook layer can hold
/// any session type-erased.
pub trait TraceSink: Sync {
    fn on_enter(&self, pc: usize, lr: usize);
    fn on_exit(&self, pc: usize, lr: usize);
}

/// One trace session.
pub struct Tracer<C, I> {
    ring: TraceRing,
    mask: InterruptMask<I>,
    clock: C,
}

impl<C: Clock, I: InterruptOps> Tracer<C, I> {
    /// A dormant tracer. Hook calls are no-ops until [`Tracer::init`] runs.
    pub const fn new(clock: C, irq: I) -> Self {
        Self {
            ring: TraceRing::new(),
            mask: InterruptMask::new(irq),
            clock,
        }
    }

    /// One-time initialization: start the clock, then arm the ring over
    /// the caller-owned `[start, end)` region (rounded down to whole
    /// records).
    ///
    /// Call once, before any instrumented function runs. No interrupt
    /// protection is needed here; no concurrent claim can exist before the
    /// first hook fires.
    ///
    /// # Safety
    ///
    /// `start..end` must be valid for reads and writes, exclusively owned
    /// by this tracer from now on, and live for the rest of the program.
    pub unsafe fn init(&self, start: *mut u8, end: *mut u8) -> Result<(), RegionError> {
        self.clock.start();
        // SAFETY: forwarded caller contract.
        unsafe { self.ring.init(start, end)? };
        log::info!(
            "trace region armed: {} records of {} bytes",
            self.ring.capacity(),
            core::mem::size_of::<TraceRecord>()
        );
        Ok(())
    }

    /// Record a function-entry event.
    #[inline(always)]
    pub fn on_enter(&self, pc: usize, lr: usize) {
        self.record(Meta::ENTER, pc, lr);
    }

    /// Record a function-exit event.
    #[inline(always)]
    pub fn on_exit(&self, pc: usize, lr: usize) {
        self.record(Meta::EXIT, pc, lr);
    }

    /// Read-side access to the captured records.
    pub fn ring(&self) -> &TraceRing {
        &self.ring
    }

    #[inline(always)]
    fn record(&self, kind: Meta, pc: usize, lr: usize) {
        // Disabled tracing costs exactly this claim's null check.
        let Some(slot) = self.ring.claim(&self.mask) else {
            return;
        };

        let timestamp = self.clock.timestamp();

        let mut meta = kind;
        if self.mask.interrupts_enabled() {
            meta |= Meta::IRQ_ENABLED;
        }
        if self.mask.in_interrupt_context() {
            meta |= Meta::IRQ_CONTEXT;
        }

        self.fill(slot, meta, timestamp, pc, lr);
    }

    #[inline(always)]
    fn fill(&self, slot: NonNull<TraceRecord>, meta: Meta, timestamp: u64, pc: usize, lr: usize) {
        // The claimed slot is exclusively ours until the ring wraps back to
        // it, so the fill needs no interrupt protection. Volatile keeps the
        // stores visible to external readers of the region.
        // SAFETY: claim returned a valid, exclusively owned slot.
        unsafe {
            slot.as_ptr().write_volatile(TraceRecord {
                meta,
                timestamp,
                pc,
                lr,
            });
        }
    }
}

impl<C: Clock + Sync, I: InterruptOps + Sync> TraceSink for Tracer<C, I> {
    #[inline(always)]
    fn on_enter(&self, pc: usize, lr: usize) {
        Tracer::on_enter(self, pc, lr);
    }

    #[inline(always)]
    fn on_exit(&self, pc: usize, lr: usize) {
        Tracer::on_exit(self, pc, lr);
    }
}
