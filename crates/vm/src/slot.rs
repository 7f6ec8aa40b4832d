//! Runtime slot values: the discriminated union stored in frame temp
//! tables and passed across the extern boundary.

use viper_runtime::heap::RtHandle;

/// A runtime value. Integer widths narrower than 64 bits are carried
/// widened; the owning temp's declared type gives them their width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    /// No value (void results, uninitialized temps).
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Raw, non-refcounted pointer (alloca buffers).
    Ptr(*mut u8),
    /// Refcounted string handle (may be null).
    Str(RtHandle),
    /// Refcounted object handle (arrays, collections, primitives).
    Obj(RtHandle),
    /// Trap error object delivered to a handler block.
    Error(RtHandle),
    /// Resume token delivered to a handler block; consumed by
    /// `resume.label`.
    Resume(u64),
    /// The null handle literal.
    Null,
}

impl Slot {
    /// Integer payload; booleans read as 0/1.
    pub fn as_i64(self) -> i64 {
        match self {
            Slot::Int(v) => v,
            Slot::Bool(b) => b as i64,
            _ => 0,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Slot::Float(v) => v,
            _ => 0.0,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Slot::Bool(b) => b,
            Slot::Int(v) => v != 0,
            _ => false,
        }
    }

    /// Handle payload for pointer-like slots; `Null` and non-pointer
    /// slots read as the null handle.
    pub fn as_handle(self) -> RtHandle {
        match self {
            Slot::Ptr(p) => p,
            Slot::Str(h) | Slot::Obj(h) | Slot::Error(h) => h,
            _ => std::ptr::null_mut(),
        }
    }

    /// Whether this slot holds a reference the frame must balance when
    /// it owns the value.
    pub fn is_refcounted(self) -> bool {
        matches!(self, Slot::Str(_) | Slot::Obj(_) | Slot::Error(_))
    }
}
