//! Trace record wire format.
//!
//! Each enter/exit event is one fixed-size record written into the trace
//! region. The region is read back by external tools (memory dump, debugger
//! script), so record size, field order and the `meta` bit assignments are a
//! stable contract and must not change.

use bitflags::bitflags;

bitflags! {
    /// Capture-time annotations stored in the `meta` field of a record.
    ///
    /// Exactly one of `ENTER`/`EXIT` is set in any written record.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Meta: u32 {
        /// Function entry event.
        const ENTER = 1 << 0;
        /// Function exit event.
        const EXIT = 1 << 1;
        /// Interrupts were enabled at capture time.
        const IRQ_ENABLED = 1 << 2;
        /// The hook ran in interrupt context.
        const IRQ_CONTEXT = 1 << 3;
    }
}

/// One trace record.
///
/// # Memory Layout
///
/// ```text
/// +-----------+-----------+-----------+-----------+
/// | meta (4)  | pad       | timestamp (8)         |
/// +-----------+-----------+-----------+-----------+
/// | pc (word) | lr (word) |
/// +-----------+-----------+
/// ```
///
/// `pc` and `lr` are target-word sized, so the record is 32 bytes on 64-bit
/// targets and 24 bytes on 32-bit targets with 8-byte `u64` alignment.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TraceRecord {
    /// Event kind and interrupt-state annotations.
    pub meta: Meta,
    /// Capture time, in the unit of the clock variant in use.
    pub timestamp: u64,
    /// Address of the instrumented function (the callee).
    pub pc: usize,
    /// Return/call-site address (the caller).
    pub lr: usize,
}

impl TraceRecord {
    /// An all-zero record, distinguishable from any captured event because
    /// a captured record always has an `ENTER` or `EXIT` bit set.
    pub const fn empty() -> Self {
        Self {
            meta: Meta::empty(),
            timestamp: 0,
            pc: 0,
            lr: 0,
        }
    }

    /// Whether this slot holds no captured event (see [`TraceRecord::empty`]).
    pub const fn is_empty(&self) -> bool {
        self.meta.bits() & (Meta::ENTER.bits() | Meta::EXIT.bits()) == 0
    }
}

#[cfg(target_pointer_width = "64")]
const _: () = assert!(
    core::mem::size_of::<TraceRecord>() == 32,
    "TraceRecord layout is a wire contract"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_bit_assignments_are_stable() {
        assert_eq!(Meta::ENTER.bits(), 1 << 0);
        assert_eq!(Meta::EXIT.bits(), 1 << 1);
        assert_eq!(Meta::IRQ_ENABLED.bits(), 1 << 2);
        assert_eq!(Meta::IRQ_CONTEXT.bits(), 1 << 3);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn field_offsets_are_stable() {
        assert_eq!(core::mem::offset_of!(TraceRecord, meta), 0);
        assert_eq!(core::mem::offset_of!(TraceRecord, timestamp), 8);
        assert_eq!(core::mem::offset_of!(TraceRecord, pc), 16);
        assert_eq!(core::mem::offset_of!(TraceRecord, lr), 24);
    }

    #[test]
    fn empty_record_is_never_a_captured_event() {
        assert!(TraceRecord::empty().is_empty());

        let rec = TraceRecord {
            meta: Meta::EXIT | Meta::IRQ_ENABLED,
            timestamp: 0,
            pc: 0,
            lr: 0,
        };
        assert!(!rec.is_empty());
    }
}
