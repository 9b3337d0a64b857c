//! Interrupt masking for the trace capture path.
//!
//! The only shared state in the capture path is the ring buffer's head
//! cursor, and the only concurrency hazard is interrupt preemption on a
//! single core. This module provides the critical-section primitive that
//! makes the head advance atomic with respect to preemption.
//!
//! The hardware side is abstracted behind [`InterruptOps`] so the core
//! logic runs unmodified on every supported target and on a host with fake
//! interrupts injected for testing. [`InterruptMask`] layers the actual
//! guard semantics on top: a single process-wide flag records whether the
//! priority threshold has already been raised, so nested acquires do not
//! escalate twice and only the outermost restore de-escalates.
//!
//! The flag is deliberately a binary flag and not a nesting counter. Nested
//! acquire/restore pairs compose through the caller-carried [`MaskToken`],
//! and unbalanced or stale-token use is a programming error that is not
//! detected here.

use core::sync::atomic::{AtomicU32, Ordering};

/// Flag bit recording that the priority threshold is currently raised.
const MASK_ACTIVE: u32 = 1 << 0;

/// Hardware interrupt operations, implemented by a target binding.
///
/// Implementations must be cheap and non-blocking; every method runs on the
/// per-event capture path.
pub trait InterruptOps {
    /// Run `f` with all interrupts inhibited.
    ///
    /// This brackets only the mask-flag update, never the buffer work
    /// itself, so the window is a handful of instructions.
    fn with_all_inhibited<T>(&self, f: impl FnOnce() -> T) -> T;

    /// Raise the interrupt priority threshold so the capture path cannot be
    /// preempted by interrupts at or below the traced priority level.
    fn raise_threshold(&self);

    /// Drop the priority threshold back to its resting level.
    fn reset_threshold(&self);

    /// Whether interrupts are currently enabled. Annotation only, never
    /// used for control flow inside the guard.
    fn interrupts_enabled(&self) -> bool;

    /// Whether the current code is executing in interrupt context.
    /// Annotation only.
    fn in_interrupt_context(&self) -> bool;
}

/// Opaque token returned by [`InterruptMask::acquire`], carrying the prior
/// mask state back into the matching [`InterruptMask::restore`].
#[derive(Clone, Copy, Debug)]
pub struct MaskToken(u32);

/// The interrupt-mask guard protecting the trace buffer's head cursor.
///
/// Holds the escalation flag plus the injected hardware binding. All
/// mutation of the flag happens with interrupts inhibited; the flag is an
/// atomic only so the guard can live in a `static`.
pub struct InterruptMask<I> {
    ops: I,
    flags: AtomicU32,
}

impl<I: InterruptOps> InterruptMask<I> {
    pub const fn new(ops: I) -> Self {
        Self {
            ops,
            flags: AtomicU32::new(0),
        }
    }

    /// Raise the priority threshold if this is the outermost acquire, and
    /// return the prior mask state.
    ///
    /// Safe to call when the threshold is already raised: the flag check
    /// prevents a second escalation.
    pub fn acquire(&self) -> MaskToken {
        let prior = self.ops.with_all_inhibited(|| {
            let prior = self.flags.load(Ordering::Relaxed);
            if prior & MASK_ACTIVE == 0 {
                self.flags.store(prior | MASK_ACTIVE, Ordering::Relaxed);
            }
            prior
        });
        if prior & MASK_ACTIVE == 0 {
            self.ops.raise_threshold();
        }
        MaskToken(prior)
    }

    /// Revert the mask state to what the matching [`acquire`] observed.
    ///
    /// The hardware threshold is only dropped when it is currently raised
    /// and the token says the caller found it lowered, so nested pairs
    /// compose without a push/pop stack.
    ///
    /// [`acquire`]: InterruptMask::acquire
    pub fn restore(&self, token: MaskToken) {
        let lower = self.ops.with_all_inhibited(|| {
            let current = self.flags.load(Ordering::Relaxed);
            let lower = current & MASK_ACTIVE != 0 && token.0 & MASK_ACTIVE == 0;
            self.flags.store(token.0, Ordering::Relaxed);
            lower
        });
        if lower {
            self.ops.reset_threshold();
        }
    }

    /// The injected hardware binding.
    pub fn ops(&self) -> &I {
        &self.ops
    }

    /// Whether interrupts are enabled right now. See
    /// [`InterruptOps::interrupts_enabled`].
    #[inline(always)]
    pub fn interrupts_enabled(&self) -> bool {
        self.ops.interrupts_enabled()
    }

    /// Whether the caller is running in interrupt context. See
    /// [`InterruptOps::in_interrupt_context`].
    #[inline(always)]
    pub fn in_interrupt_context(&self) -> bool {
        self.ops.in_interrupt_context()
    }
}

// =============================================================================
// Target bindings
// =============================================================================

/// x86-64 binding.
///
/// The architecture has no separate priority threshold register in this
/// configuration, so raising the threshold collapses to clearing IF. A
/// consequence is that acquiring the mask inside a foreign cli region and
/// restoring it will set IF; callers own that ordering.
///
/// Interrupt-context tracking needs kernel per-CPU state, which a
/// standalone tracer does not have, so `in_interrupt_context` reports
/// false.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub struct NativeInterrupts;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
impl InterruptOps for NativeInterrupts {
    #[inline(always)]
    fn with_all_inhibited<T>(&self, f: impl FnOnce() -> T) -> T {
        x86_64::instructions::interrupts::without_interrupts(f)
    }

    #[inline(always)]
    fn raise_threshold(&self) {
        x86_64::instructions::interrupts::disable();
    }

    #[inline(always)]
    fn reset_threshold(&self) {
        x86_64::instructions::interrupts::enable();
    }

    #[inline(always)]
    fn interrupts_enabled(&self) -> bool {
        x86_64::instructions::interrupts::are_enabled()
    }

    #[inline(always)]
    fn in_interrupt_context(&self) -> bool {
        false
    }
}

/// ARM64 binding, masking IRQs through the DAIF I bit.
///
/// Raw `asm!` rather than a register-access crate keeps the capture path to
/// a single instruction per operation.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub struct NativeInterrupts;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
impl InterruptOps for NativeInterrupts {
    #[inline(always)]
    fn with_all_inhibited<T>(&self, f: impl FnOnce() -> T) -> T {
        let daif: u64;
        unsafe {
            core::arch::asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack));
            core::arch::asm!("msr daifset, #2", options(nomem, nostack));
        }
        let t = f();
        unsafe {
            core::arch::asm!("msr daif, {}", in(reg) daif, options(nomem, nostack));
        }
        t
    }

    #[inline(always)]
    fn raise_threshold(&self) {
        unsafe {
            core::arch::asm!("msr daifset, #2", options(nomem, nostack));
        }
    }

    #[inline(always)]
    fn reset_threshold(&self) {
        unsafe {
            core::arch::asm!("msr daifclr, #2", options(nomem, nostack));
        }
    }

    #[inline(always)]
    fn interrupts_enabled(&self) -> bool {
        let daif: u64;
        unsafe {
            core::arch::asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack));
        }
        // Bit 7 is the I mask; set means IRQs are masked.
        daif & (1 << 7) == 0
    }

    #[inline(always)]
    fn in_interrupt_context(&self) -> bool {
        false
    }
}

/// Binding for environments without interrupts: hosted test builds, or
/// polling-only firmware. Masks nothing and reports normal context.
pub struct Unmasked;

impl InterruptOps for Unmasked {
    #[inline(always)]
    fn with_all_inhibited<T>(&self, f: impl FnOnce() -> T) -> T {
        f()
    }

    #[inline(always)]
    fn raise_threshold(&self) {}

    #[inline(always)]
    fn reset_threshold(&self) {}

    #[inline(always)]
    fn interrupts_enabled(&self) -> bool {
        true
    }

    #[inline(always)]
    fn in_interrupt_context(&self) -> bool {
        false
    }
}

// =============================================================================
// Test support
// =============================================================================


#[cfg(test)]
mod tests {
    use super::fake::FakeInterrupts;
    use super::*;

    #[test]
    fn outermost_acquire_raises_the_threshold_once() {
        let mask = InterruptMask::new(FakeInterrupts::new());

        let outer = mask.acquire();
        assert_eq!(mask.ops.raises.get(), 1);

        // Nested acquire sees the flag already set and does not escalate.
        let inner = mask.acquire();
        assert_eq!(mask.ops.raises.get(), 1);

        // Inner restore carries an already-escalated token: no de-escalation.
        mask.restore(inner);
        assert_eq!(mask.ops.resets.get(), 0);

        // Outer restore drops the threshold.
        mask.restore(outer);
        assert_eq!(mask.ops.resets.get(), 1);
    }

    #[test]
    fn reacquire_after_restore_escalates_again() {
        let mask = InterruptMask::new(FakeInterrupts::new());

        let token = mask.acquire();
        mask.restore(token);
        let token = mask.acquire();
        mask.restore(token);

        assert_eq!(mask.ops.raises.get(), 2);
        assert_eq!(mask.ops.resets.get(), 2);
    }

    #[test]
    fn flag_updates_run_with_interrupts_inhibited() {
        let mask = InterruptMask::new(FakeInterrupts::new());

        let token = mask.acquire();
        mask.restore(token);

        // One bracket per flag mutation.
        assert_eq!(mask.ops.inhibits.get(), 2);
    }

    #[test]
    fn annotation_reads_pass_through() {
        let mask = InterruptMask::new(FakeInterrupts::new());

        assert!(mask.interrupts_enabled());
        assert!(!mask.in_interrupt_context());

        mask.ops.enabled.set(false);
        mask.ops.in_interrupt.set(true);
        assert!(!mask.interrupts_enabled());
        assert!(mask.in_interrupt_context());
    }

    #[test]
    fn unmasked_binding_reports_normal_context() {
        let mask = InterruptMask::new(Unmasked);

        let token = mask.acquire();
        mask.restore(token);
        assert!(mask.interrupts_enabled());
        assert!(!mask.in_interrupt_context());
    }
}
