//! IL type tags.
//!
//! Types are value-copied tags with no identity. `Error` and `ResumeTok` are
//! opaque to IL programs: the only operations on them are receiving them as
//! handler block parameters and (for tokens) consuming them with
//! `resume.label`.

use std::fmt;

/// Type of an IL value, temp, parameter, or return slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// Boolean, produced by comparisons and consumed by `cbr`.
    I1,
    I16,
    I32,
    I64,
    F64,
    /// Opaque machine pointer (alloca buffers, runtime object handles).
    Ptr,
    /// Runtime string handle.
    Str,
    /// Opaque error value delivered to handler blocks.
    Error,
    /// Opaque resume token delivered to handler blocks.
    ResumeTok,
}

impl Type {
    /// True for the integer family, including `i1`.
    pub fn is_integer(self) -> bool {
        matches!(self, Type::I1 | Type::I16 | Type::I32 | Type::I64)
    }

    /// True for the widths checked arithmetic is defined at.
    pub fn is_checked_int(self) -> bool {
        matches!(self, Type::I16 | Type::I32 | Type::I64)
    }

    /// True when values of this type participate in the retain/release
    /// protocol. `Ptr` is deliberately excluded: alloca buffers are
    /// frame-owned and runtime helpers that hand out heap objects transfer
    /// ownership explicitly.
    pub fn is_refcounted(self) -> bool {
        matches!(self, Type::Str | Type::Error)
    }

    /// Signed range of a checked integer width, `None` for other types.
    pub fn int_range(self) -> Option<(i64, i64)> {
        match self {
            Type::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            Type::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            Type::I64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Width in bits for the integer family.
    pub fn bit_width(self) -> Option<u32> {
        match self {
            Type::I1 => Some(1),
            Type::I16 => Some(16),
            Type::I32 => Some(32),
            Type::I64 => Some(64),
            _ => None,
        }
    }

    /// Canonical spelling used by the textual form.
    pub fn name(self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::I1 => "i1",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F64 => "f64",
            Type::Ptr => "ptr",
            Type::Str => "str",
            Type::Error => "error",
            Type::ResumeTok => "resumetok",
        }
    }

    /// Parse the textual spelling back into a tag.
    pub fn from_name(name: &str) -> Option<Type> {
        Some(match name {
            "void" => Type::Void,
            "i1" => Type::I1,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "f64" => Type::F64,
            "ptr" => Type::Ptr,
            "str" => Type::Str,
            "error" => Type::Error,
            "resumetok" => Type::ResumeTok,
            _ => return None,
        })
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
