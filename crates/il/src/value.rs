//! Instruction operands.

use std::fmt;

/// Function-local single-assignment value id. Temps are indices into a
/// per-function temp table; they carry no other identity.
pub type TempId = u32;

/// An operand of an instruction.
///
/// Constants are polymorphic over compatible types: a `ConstInt` is accepted
/// wherever an integer width is expected (the verifier range-checks it
/// against the instruction's type), `Null` wherever a pointer-like type is
/// expected.
#[derive(Debug, Clone)]
pub enum Value {
    ConstInt(i64),
    /// Float constants are compared and carried by bit pattern so NaN
    /// payloads and signed zeros survive a print/parse round trip.
    ConstFloat(f64),
    ConstBool(bool),
    Temp(TempId),
    GlobalRef(String),
    Null,
}

impl Value {
    pub fn const_int(v: i64) -> Value {
        Value::ConstInt(v)
    }

    pub fn const_float(v: f64) -> Value {
        Value::ConstFloat(v)
    }

    pub fn const_bool(v: bool) -> Value {
        Value::ConstBool(v)
    }

    pub fn temp(id: TempId) -> Value {
        Value::Temp(id)
    }

    pub fn global(name: impl Into<String>) -> Value {
        Value::GlobalRef(name.into())
    }

    pub fn as_temp(&self) -> Option<TempId> {
        match self {
            Value::Temp(id) => Some(*id),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::ConstInt(a), Value::ConstInt(b)) => a == b,
            // Bit comparison: NaN == NaN, 0.0 != -0.0.
            (Value::ConstFloat(a), Value::ConstFloat(b)) => a.to_bits() == b.to_bits(),
            (Value::ConstBool(a), Value::ConstBool(b)) => a == b,
            (Value::Temp(a), Value::Temp(b)) => a == b,
            (Value::GlobalRef(a), Value::GlobalRef(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::ConstInt(v) => write!(f, "{}", v),
            Value::ConstFloat(v) => write!(f, "{}", crate::text::format_f64(*v)),
            Value::ConstBool(v) => write!(f, "{}", v),
            Value::Temp(id) => write!(f, "%{}", id),
            Value::GlobalRef(name) => write!(f, "@{}", name),
            Value::Null => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(Value::const_float(f64::NAN), Value::const_float(f64::NAN));
        assert_ne!(Value::const_float(0.0), Value::const_float(-0.0));
        assert_eq!(Value::const_float(1.5), Value::const_float(1.5));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::const_int(-3).to_string(), "-3");
        assert_eq!(Value::temp(7).to_string(), "%7");
        assert_eq!(Value::global("msg").to_string(), "@msg");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::const_bool(true).to_string(), "true");
    }
}
