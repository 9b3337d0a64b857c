//! Low-overhead function-call tracing for bare-metal targets.
//!
//! A compiler-inserted hook fires on every function entry and exit; this
//! crate records each event into a fixed, caller-owned memory region fast
//! enough not to perturb real-time behavior, and stays safe to call from
//! both normal execution and interrupt context.
//!
//! # Design Principles
//!
//! 1. **Bounded footprint**: one pre-allocated region, overwritten
//!    circularly. The tracer never allocates, never grows, never flushes.
//! 2. **Interrupt-safe**: the only shared mutation is the ring head
//!    advance, bracketed by an interrupt mask guard; everything else runs
//!    on exclusively owned data.
//! 3. **Never observable**: hook calls have no return value, no failure
//!    path and no side effect beyond one record. Uninitialized tracing
//!    degrades to a null check per call.
//! 4. **Injected hardware**: interrupt control and the timestamp source
//!    are capability traits, so one core runs on every target and on a
//!    host with fakes under test.
//!
//! # Architecture
//!
//! ```text
//! instrumented code
//!   __cyg_profile_func_enter / _exit      (hooks)
//!         |
//!         v
//! +------------------+   claim    +------------------+
//! |      Tracer      | ---------> |    TraceRing     |
//! |  (one session)   |            | head / wrap over |
//! +---+----------+---+            | caller's region  |
//!     |          |                +------------------+
//!     v          v
//! +-------+  +---------------+
//! | Clock |  | InterruptMask |
//! | trait |  | + InterruptOps|
//! +-------+  +---------------+
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use calltrace::{hooks, CycleClock, NativeInterrupts, Tracer};
//!
//! static TRACER: Tracer<CycleClock, NativeInterrupts> =
//!     Tracer::new(CycleClock::new(), NativeInterrupts);
//!
//! // Once, before any instrumented function runs:
//! unsafe { TRACER.init(region_start, region_end) }?;
//! hooks::attach(&TRACER)?;
//! ```
//!
//! The captured region is read back offline (memory dump or debugger);
//! [`record::TraceRecord`] documents the layout contract.

#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod hooks;
pub mod irq;
pub mod record;
pub mod recorder;
pub mod ring;

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub use clock::CycleClock;
pub use clock::{Clock, TickClock};
#[cfg(all(
    any(target_arch = "x86_64", target_arch = "aarch64"),
    target_os = "none"
))]
pub use irq::NativeInterrupts;
pub use irq::{InterruptMask, InterruptOps, MaskToken, Unmasked};
pub use record::{Meta, TraceRecord};
pub use recorder::{TraceSink, Tracer};
pub use ring::{RegionError, TraceRing};
