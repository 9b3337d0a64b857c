//! Compiler-facing instrumentation entry points.
//!
//! Toolchains with function instrumentation (`-finstrument-functions` in
//! GCC/Clang, `-Z instrument-function-entry-exit` in rustc) emit a call to
//! `__cyg_profile_func_enter` just after every instrumented function entry
//! and `__cyg_profile_func_exit` just before every exit, passing the
//! callee address and the call site. This module exports those two symbols
//! and forwards them to one registered [`TraceSink`].
//!
//! The hooks must not be instrumented themselves or every capture would
//! recurse. C code marks them `no_instrument_function`; the Rust
//! arrangement is to enable the instrumentation flag only on the
//! application's own crates and compile this crate without it.
//!
//! Until [`attach`] runs, each hook call is a single atomic load and a
//! branch.

use core::ffi::c_void;
use core::fmt;

use conquer_once::spin::OnceCell;

use crate::recorder::TraceSink;

static HOOK_TARGET: OnceCell<&'static dyn TraceSink> = OnceCell::uninit();

/// A second [`attach`] was rejected; the hook target is set once for the
/// process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyAttached;

impl fmt::Display for AlreadyAttached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook target already attached")
    }
}

/// Point the instrumentation hooks at `sink`.
///
/// Call after the sink's ring is initialized and before instrumented code
/// runs; hook calls that arrive earlier are dropped without effect.
pub fn attach(sink: &'static dyn TraceSink) -> Result<(), AlreadyAttached> {
    HOOK_TARGET
        .try_init_once(|| sink)
        .map_err(|_| AlreadyAttached)?;
    log::debug!("function-call hooks attached");
    Ok(())
}

/// Entry hook, called by instrumented function prologues.
#[no_mangle]
pub extern "C" fn __cyg_profile_func_enter(this_fn: *mut c_void, call_site: *mut c_void) {
    if let Ok(sink) = HOOK_TARGET.try_get() {
        sink.on_enter(this_fn as usize, call_site as usize);
    }
}

/// Exit hook, called by instrumented function epilogues.
#[no_mangle]
pub extern "C" fn __cyg_profile_func_exit(this_fn: *mut c_void, call_site: *mut c_void) {
    if let Ok(sink) = HOOK_TARGET.try_get() {
        sink.on_exit(this_fn as usize, call_site as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TickClock;
    use crate::irq::Unmasked;
    use crate::record::{Meta, TraceRecord};
    use crate::recorder::Tracer;

    const REC: usize = core::mem::size_of::<TraceRecord>();

    #[repr(align(8))]
    struct Region([u8; 4 * REC]);

    static TRACER: Tracer<TickClock, Unmasked> = Tracer::new(TickClock::new(), Unmasked);
    static mut REGION: Region = Region([0; 4 * REC]);

    // One test owns the process-wide hook target; splitting this into
    // several #[test] functions would race on it.
    #[test]
    fn hook_lifecycle() {
        // Unattached hooks drop events without effect.
        __cyg_profile_func_enter(0x1000 as *mut c_void, 0x2000 as *mut c_void);
        __cyg_profile_func_exit(0x1000 as *mut c_void, 0x2000 as *mut c_void);
        assert!(!TRACER.ring().is_enabled());

        let start = unsafe { core::ptr::addr_of_mut!(REGION.0) }.cast::<u8>();
        unsafe { TRACER.init(start, start.add(4 * REC)) }.unwrap();
        attach(&TRACER).unwrap();

        __cyg_profile_func_enter(0x1000 as *mut c_void, 0x2000 as *mut c_void);
        __cyg_profile_func_exit(0x1000 as *mut c_void, 0x2000 as *mut c_void);

        let enter = TRACER.ring().read(0).unwrap();
        assert!(enter.meta.contains(Meta::ENTER));
        assert_eq!(enter.pc, 0x1000);
        assert_eq!(enter.lr, 0x2000);

        let exit = TRACER.ring().read(1).unwrap();
        assert!(exit.meta.contains(Meta::EXIT));

        // The target is set once per process.
        assert_eq!(attach(&TRACER), Err(AlreadyAttached));
    }
}
