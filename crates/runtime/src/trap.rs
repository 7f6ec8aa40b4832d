//! Trap kinds and the pending-trap cell.
//!
//! Runtime helpers never unwind across the VM boundary. A helper that
//! detects a fault records a pending trap in thread-local state and
//! returns a sentinel; the VM drains the cell after every extern call and
//! runs the full trap protocol with the faulting instruction's source
//! location attached.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;

/// The closed set of trap kinds. Every checked opcode and every
/// trap-on-misuse runtime helper maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrapKind {
    DomainError,
    DivideByZero,
    Overflow,
    Bounds,
    InvalidCast,
    StackOverflow,
}

impl TrapKind {
    pub fn name(self) -> &'static str {
        match self {
            TrapKind::DomainError => "DomainError",
            TrapKind::DivideByZero => "DivideByZero",
            TrapKind::Overflow => "Overflow",
            TrapKind::Bounds => "Bounds",
            TrapKind::InvalidCast => "InvalidCast",
            TrapKind::StackOverflow => "StackOverflow",
        }
    }

    /// Stable numeric code exposed to IL through `rt_err_kind`.
    pub fn code(self) -> i64 {
        match self {
            TrapKind::DomainError => 0,
            TrapKind::DivideByZero => 1,
            TrapKind::Overflow => 2,
            TrapKind::Bounds => 3,
            TrapKind::InvalidCast => 4,
            TrapKind::StackOverflow => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<TrapKind> {
        Some(match code {
            0 => TrapKind::DomainError,
            1 => TrapKind::DivideByZero,
            2 => TrapKind::Overflow,
            3 => TrapKind::Bounds,
            4 => TrapKind::InvalidCast,
            5 => TrapKind::StackOverflow,
            _ => return None,
        })
    }
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fault recorded by a runtime helper, before the VM attaches source
/// attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrap {
    pub kind: TrapKind,
    pub message: String,
}

thread_local! {
    static PENDING: RefCell<Option<PendingTrap>> = const { RefCell::new(None) };
}

/// Record a fault for the current thread. An earlier unconsumed trap is
/// kept; the first fault wins.
pub fn raise(kind: TrapKind, message: impl Into<String>) {
    PENDING.with(|p| {
        let mut slot = p.borrow_mut();
        if slot.is_none() {
            *slot = Some(PendingTrap {
                kind,
                message: message.into(),
            });
        }
    });
}

/// Take (and clear) the pending trap.
pub fn take_pending() -> Option<PendingTrap> {
    PENDING.with(|p| p.borrow_mut().take())
}

pub fn has_pending() -> bool {
    PENDING.with(|p| p.borrow().is_some())
}

pub fn clear_pending() {
    PENDING.with(|p| *p.borrow_mut() = None);
}

/// Payload of the opaque `Error` value handed to handler blocks. The VM
/// allocates one per dispatched trap; IL code inspects it through the
/// `rt_err_*` externs.
struct RtError {
    kind: TrapKind,
    message: String,
    line: i64,
}

unsafe fn finalize_error(p: crate::heap::RtHandle) {
    unsafe { std::ptr::drop_in_place(p as *mut RtError) };
}

/// Allocate an error object carrying a trap descriptor's payload.
pub fn error_new(kind: TrapKind, message: impl Into<String>, line: i64) -> crate::heap::RtHandle {
    crate::heap::alloc_object(
        RtError {
            kind,
            message: message.into(),
            line,
        },
        finalize_error,
    )
}

/// Numeric trap kind (see [`TrapKind::code`]); -1 for a null handle.
pub fn error_kind(h: crate::heap::RtHandle) -> i64 {
    unsafe { crate::heap::object_ref::<RtError>(h) }.map_or(-1, |e| e.kind.code())
}

/// The trap message as a fresh runtime string.
pub fn error_message(h: crate::heap::RtHandle) -> crate::heap::RtStr {
    match unsafe { crate::heap::object_ref::<RtError>(h) } {
        Some(e) => crate::string::str_new(&e.message),
        None => std::ptr::null_mut(),
    }
}

/// Source line the trap was raised at; -1 for a null handle.
pub fn error_line(h: crate::heap::RtHandle) -> i64 {
    unsafe { crate::heap::object_ref::<RtError>(h) }.map_or(-1, |e| e.line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fault_wins() {
        clear_pending();
        raise(TrapKind::DivideByZero, "divide by zero");
        raise(TrapKind::Overflow, "late");
        let t = take_pending().unwrap();
        assert_eq!(t.kind, TrapKind::DivideByZero);
        assert_eq!(t.message, "divide by zero");
        assert!(take_pending().is_none());
    }

    #[test]
    fn error_object_carries_descriptor_payload() {
        let e = error_new(TrapKind::Overflow, "integer overflow", 42);
        assert_eq!(error_kind(e), TrapKind::Overflow.code());
        assert_eq!(error_line(e), 42);
        let msg = error_message(e);
        let bytes = unsafe { crate::string::str_bytes(msg) };
        assert_eq!(bytes, b"integer overflow");
        crate::heap::release(msg);
        crate::heap::release(e);
    }

    #[test]
    fn codes_round_trip() {
        for kind in [
            TrapKind::DomainError,
            TrapKind::DivideByZero,
            TrapKind::Overflow,
            TrapKind::Bounds,
            TrapKind::InvalidCast,
            TrapKind::StackOverflow,
        ] {
            assert_eq!(TrapKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(TrapKind::from_code(99), None);
    }
}
