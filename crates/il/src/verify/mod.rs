//! Module-level IL verification.
//!
//! The verifier accepts a module iff every structural and type rule holds.
//! It collects every failure as a human-readable note referencing the
//! function, block, and instruction index, and reports the first failure's
//! stable diagnostic code as the error identity.

mod externs;
mod function;

pub use externs::{known_extern_signature, ExternSig};

use crate::module::Module;
use std::collections::HashMap;
use std::fmt;

/// Verification failure: the first failing check plus every collected
/// explanation.
#[derive(Debug)]
pub struct VerifyError {
    /// Stable identifier of the first failing check, e.g. `dup-extern`.
    pub code: &'static str,
    /// Human-readable explanation of the first failure.
    pub message: String,
    /// All failures, in discovery order (including the first).
    pub notes: Vec<String>,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for VerifyError {}

/// Diagnostic sink shared by every check.
#[derive(Default)]
pub(crate) struct Sink {
    errors: Vec<(&'static str, String)>,
}

impl Sink {
    pub(crate) fn error(&mut self, code: &'static str, message: String) {
        self.errors.push((code, message));
    }

    fn into_result(self) -> Result<(), VerifyError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let (code, message) = self.errors[0].clone();
        let notes = self.errors.into_iter().map(|(_, m)| m).collect();
        Err(VerifyError {
            code,
            message,
            notes,
        })
    }
}

/// Verify a module; `Err` carries the first failing check and all notes.
pub fn verify_module(m: &Module) -> Result<(), VerifyError> {
    let mut sink = Sink::default();

    // Name uniqueness within each category.
    let mut extern_names = HashMap::new();
    for e in &m.externs {
        if let Some(prev) = extern_names.insert(e.name.as_str(), e) {
            let mismatch = prev.ret_type != e.ret_type || prev.params != e.params;
            let suffix = if mismatch { " with mismatched signature" } else { "" };
            sink.error(
                "dup-extern",
                format!("duplicate extern @{}{}", e.name, suffix),
            );
            continue;
        }
        // Known runtime helpers must match the built-in table exactly.
        if let Some(expected) = known_extern_signature(&e.name) {
            if e.ret_type != expected.ret || e.params != expected.params {
                sink.error(
                    "extern-sig",
                    format!("extern @{} signature mismatch", e.name),
                );
            }
        }
    }

    let mut global_names = HashMap::new();
    for g in &m.globals {
        if global_names.insert(g.name.as_str(), g).is_some() {
            sink.error("dup-global", format!("duplicate global @{}", g.name));
        }
    }

    let mut func_names = HashMap::new();
    for f in &m.functions {
        if func_names.insert(f.name.as_str(), f).is_some() {
            sink.error("dup-func", format!("duplicate function @{}", f.name));
        }
        if extern_names.contains_key(f.name.as_str()) {
            sink.error(
                "name-overlap",
                format!("function @{} collides with an extern of the same name", f.name),
            );
        }
    }

    for f in &m.functions {
        function::verify_function(m, f, &mut sink);
    }

    sink.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Extern, Function};
    use crate::types::Type;

    #[test]
    fn duplicate_extern_rejected() {
        let mut m = Module::new();
        m.externs.push(Extern::new("rt_len", Type::I64, vec![Type::Str]));
        m.externs.push(Extern::new("rt_len", Type::I64, vec![Type::Str]));
        let err = verify_module(&m).unwrap_err();
        assert_eq!(err.code, "dup-extern");
        assert!(err.message.contains("rt_len"));
    }

    #[test]
    fn known_extern_signature_enforced() {
        let mut m = Module::new();
        // rt_len takes str, not i64.
        m.externs.push(Extern::new("rt_len", Type::I64, vec![Type::I64]));
        let err = verify_module(&m).unwrap_err();
        assert_eq!(err.code, "extern-sig");
    }

    #[test]
    fn extern_function_namespace_overlap_rejected() {
        let mut m = Module::new();
        m.externs.push(Extern::new("rt_len", Type::I64, vec![Type::Str]));
        let mut f = Function::new("rt_len", Type::Void);
        f.blocks.push(crate::module::Block::new("entry"));
        f.blocks[0]
            .instructions
            .push(crate::instr::Instr::new(crate::instr::Opcode::Ret, Type::Void));
        f.blocks[0].terminated = true;
        m.functions.push(f);
        let err = verify_module(&m).unwrap_err();
        assert!(err.notes.iter().any(|n| n.contains("collides")));
    }

    #[test]
    fn empty_module_verifies() {
        assert!(verify_module(&Module::new()).is_ok());
    }
}
