//! The native-backend contract.
//!
//! A backend compiles (or otherwise executes) verified IL modules and
//! must be observably equivalent to the interpreter for every
//! instruction: the same return values, the same trap kinds raised at
//! the same source lines, and the same retain/release balance on runtime
//! objects. The contract is enforced by a conformance suite of
//! module-builder cases; the interpreter itself is the reference backend
//! and must pass every case.

use crate::vm::{Outcome, TrapDescriptor, Vm};
use viper_il::{verify_module, IrBuilder, Module, Opcode, SourceLoc, Type, Value};
use viper_runtime::TrapKind;

/// What a backend observed when executing `@main`.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutcome {
    /// Normal termination with `@main`'s return value.
    Exit(i64),
    /// An uncaught trap of this kind at this source line.
    Trap(TrapKind, u32),
}

/// A native (or interpreting) execution engine for verified IL.
pub trait Backend {
    fn name(&self) -> &str;

    /// Execute the module's `@main`. The module has already passed the
    /// verifier.
    fn execute(&self, module: &Module) -> Result<BackendOutcome, String>;
}

/// The interpreter as the reference backend.
pub struct VmBackend;

impl Backend for VmBackend {
    fn name(&self) -> &str {
        "vm"
    }

    fn execute(&self, module: &Module) -> Result<BackendOutcome, String> {
        let mut vm = Vm::new(module);
        match vm.call("main", &[]) {
            Ok(Outcome::Return(slot)) => Ok(BackendOutcome::Exit(slot.as_i64())),
            Ok(Outcome::Trap(TrapDescriptor { kind, loc, .. })) => {
                Ok(BackendOutcome::Trap(kind, loc.line))
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

/// One conformance case: a module builder plus its required observable
/// behavior.
pub struct ConformanceCase {
    pub name: &'static str,
    pub build: fn() -> Module,
    pub expected: BackendOutcome,
}

fn loc(line: u32) -> SourceLoc {
    SourceLoc::new(1, line, 1)
}

/// The behavioral-equivalence suite every backend must pass.
pub fn conformance_cases() -> Vec<ConformanceCase> {
    vec![
        ConformanceCase {
            name: "add-wraps-at-i64",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                let t = b.emit_bin(
                    Opcode::Add,
                    Type::I64,
                    Value::const_int(i64::MAX),
                    Value::const_int(1),
                    loc(1),
                );
                b.emit_ret(Some(Value::temp(t)), loc(2));
                m
            },
            expected: BackendOutcome::Exit(i64::MIN),
        },
        ConformanceCase {
            name: "iadd-ovf-traps-at-i32",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                let _t = b.emit_bin(
                    Opcode::IAddOvf,
                    Type::I32,
                    Value::const_int(i32::MAX as i64),
                    Value::const_int(1),
                    loc(200),
                );
                b.emit_ret(Some(Value::const_int(0)), loc(201));
                m
            },
            expected: BackendOutcome::Trap(TrapKind::Overflow, 200),
        },
        ConformanceCase {
            name: "sdiv-min-by-minus-one-traps-overflow",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                let t = b.emit_bin(
                    Opcode::SDivChk0,
                    Type::I64,
                    Value::const_int(i64::MIN),
                    Value::const_int(-1),
                    loc(10),
                );
                b.emit_ret(Some(Value::temp(t)), loc(11));
                m
            },
            expected: BackendOutcome::Trap(TrapKind::Overflow, 10),
        },
        ConformanceCase {
            name: "srem-min-by-minus-one-is-zero",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                let t = b.emit_bin(
                    Opcode::SRemChk0,
                    Type::I64,
                    Value::const_int(i64::MIN),
                    Value::const_int(-1),
                    loc(10),
                );
                b.emit_ret(Some(Value::temp(t)), loc(11));
                m
            },
            expected: BackendOutcome::Exit(0),
        },
        ConformanceCase {
            name: "sdiv-by-zero-traps",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                let t = b.emit_bin(
                    Opcode::SDivChk0,
                    Type::I64,
                    Value::const_int(10),
                    Value::const_int(0),
                    loc(100),
                );
                b.emit_ret(Some(Value::temp(t)), loc(101));
                m
            },
            expected: BackendOutcome::Trap(TrapKind::DivideByZero, 100),
        },
        ConformanceCase {
            name: "lshr-of-min-by-63-is-one",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                let t = b.emit_bin(
                    Opcode::LShr,
                    Type::I64,
                    Value::const_int(i64::MIN),
                    Value::const_int(63),
                    loc(1),
                );
                b.emit_ret(Some(Value::temp(t)), loc(2));
                m
            },
            expected: BackendOutcome::Exit(1),
        },
        ConformanceCase {
            name: "ashr-sign-extends-with-masked-count",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                // Shift count 127 masks to 63.
                let t = b.emit_bin(
                    Opcode::AShr,
                    Type::I64,
                    Value::const_int(-1),
                    Value::const_int(127),
                    loc(1),
                );
                b.emit_ret(Some(Value::temp(t)), loc(2));
                m
            },
            expected: BackendOutcome::Exit(-1),
        },
        ConformanceCase {
            name: "fdiv-by-zero-is-infinity-not-a-trap",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                let yes = b.create_block("yes");
                let no = b.create_block("no");
                b.set_insert_point(entry);
                let d = b.emit_bin(
                    Opcode::FDiv,
                    Type::F64,
                    Value::const_float(1.0),
                    Value::const_float(0.0),
                    loc(1),
                );
                let c = b.emit_bin(
                    Opcode::FCmp(viper_il::FloatPredicate::Eq),
                    Type::I1,
                    Value::temp(d),
                    Value::const_float(f64::INFINITY),
                    loc(2),
                );
                b.emit_cbr(Value::temp(c), "yes", vec![], "no", vec![], loc(3));
                b.set_insert_point(yes);
                b.emit_ret(Some(Value::const_int(1)), loc(4));
                b.set_insert_point(no);
                b.emit_ret(Some(Value::const_int(0)), loc(5));
                m
            },
            expected: BackendOutcome::Exit(1),
        },
        ConformanceCase {
            name: "nan-compares-unordered",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                let yes = b.create_block("yes");
                let no = b.create_block("no");
                b.set_insert_point(entry);
                // 0/0 is quiet NaN; Uno must see it, Ord must not.
                let nan = b.emit_bin(
                    Opcode::FDiv,
                    Type::F64,
                    Value::const_float(0.0),
                    Value::const_float(0.0),
                    loc(1),
                );
                let uno = b.emit_bin(
                    Opcode::FCmp(viper_il::FloatPredicate::Uno),
                    Type::I1,
                    Value::temp(nan),
                    Value::const_float(1.0),
                    loc(2),
                );
                b.emit_cbr(Value::temp(uno), "yes", vec![], "no", vec![], loc(3));
                b.set_insert_point(yes);
                b.emit_ret(Some(Value::const_int(1)), loc(4));
                b.set_insert_point(no);
                b.emit_ret(Some(Value::const_int(0)), loc(5));
                m
            },
            expected: BackendOutcome::Exit(1),
        },
        ConformanceCase {
            name: "cast-nan-traps-invalid-cast",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                let t = b.emit_un(
                    Opcode::CastFpToSiRteChk,
                    Type::I64,
                    Value::const_float(f64::NAN),
                    loc(30),
                );
                b.emit_ret(Some(Value::temp(t)), loc(31));
                m
            },
            expected: BackendOutcome::Trap(TrapKind::InvalidCast, 30),
        },
        ConformanceCase {
            name: "cast-negative-to-unsigned-traps",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                let t = b.emit_un(
                    Opcode::CastFpToUiRteChk,
                    Type::I64,
                    Value::const_float(-0.6),
                    loc(40),
                );
                b.emit_ret(Some(Value::temp(t)), loc(41));
                m
            },
            expected: BackendOutcome::Trap(TrapKind::InvalidCast, 40),
        },
        ConformanceCase {
            name: "idx-chk-traps-bounds",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                let t = b.emit_bin(
                    Opcode::IdxChk,
                    Type::I64,
                    Value::const_int(10),
                    Value::const_int(5),
                    loc(300),
                );
                b.emit_ret(Some(Value::temp(t)), loc(301));
                m
            },
            expected: BackendOutcome::Trap(TrapKind::Bounds, 300),
        },
        ConformanceCase {
            name: "trap-opcode-is-domain-error",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                b.set_insert_point(entry);
                b.emit_trap(loc(42));
                m
            },
            expected: BackendOutcome::Trap(TrapKind::DomainError, 42),
        },
        ConformanceCase {
            name: "block-params-select-the-branch-argument",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                let left = b.create_block("left");
                let right = b.create_block("right");
                let (merge, ids) = b.create_block_with_params("merge", vec![Type::I64]);
                b.set_insert_point(entry);
                b.emit_cbr(Value::const_bool(true), "left", vec![], "right", vec![], loc(1));
                b.set_insert_point(left);
                b.emit_br("merge", vec![Value::const_int(1)], loc(2));
                b.set_insert_point(right);
                b.emit_br("merge", vec![Value::const_int(2)], loc(3));
                b.set_insert_point(merge);
                b.emit_ret(Some(Value::temp(ids[0])), loc(4));
                m
            },
            expected: BackendOutcome::Exit(1),
        },
        ConformanceCase {
            name: "overflow-caught-by-handler-and-resumed",
            build: || {
                let mut m = Module::new();
                m.externs.push(viper_il::Extern::new(
                    "rt_err_kind",
                    Type::I64,
                    vec![Type::Error],
                ));
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let entry = b.create_block("entry");
                let (handler, ids) =
                    b.create_block_with_params("handler", vec![Type::Error, Type::ResumeTok]);
                let cont = b.create_block("cont");
                b.set_insert_point(entry);
                b.emit_eh_push("handler", loc(1));
                let _t = b.emit_bin(
                    Opcode::IAddOvf,
                    Type::I32,
                    Value::const_int(2147483647),
                    Value::const_int(1),
                    loc(7),
                );
                b.emit_eh_pop(loc(8));
                b.emit_ret(Some(Value::const_int(99)), loc(10));
                b.set_insert_point(handler);
                b.emit_eh_entry(loc(11));
                let _k = b.emit_call("rt_err_kind", Type::I64, vec![Value::temp(ids[0])], loc(12));
                b.emit_resume(Value::temp(ids[1]), "cont", loc(13));
                b.set_insert_point(cont);
                b.emit_ret(Some(Value::const_int(0)), loc(14));
                m
            },
            expected: BackendOutcome::Exit(0),
        },
        ConformanceCase {
            name: "calls-pass-arguments-and-return-values",
            build: || {
                let mut m = Module::new();
                let mut b = IrBuilder::new(&mut m);
                b.start_function(
                    "add2",
                    Type::I64,
                    vec![("a".into(), Type::I64), ("b".into(), Type::I64)],
                );
                let e = b.create_block("entry");
                b.set_insert_point(e);
                let s = b.emit_bin(Opcode::Add, Type::I64, Value::temp(0), Value::temp(1), loc(1));
                b.emit_ret(Some(Value::temp(s)), loc(2));

                b.start_function("main", Type::I64, vec![]);
                let e = b.create_block("entry");
                b.set_insert_point(e);
                let r = b
                    .emit_call(
                        "add2",
                        Type::I64,
                        vec![Value::const_int(40), Value::const_int(2)],
                        loc(3),
                    )
                    .expect("non-void call");
                b.emit_ret(Some(Value::temp(r)), loc(4));
                m
            },
            expected: BackendOutcome::Exit(42),
        },
        ConformanceCase {
            name: "runtime-strings-concat-through-externs",
            build: || {
                let mut m = Module::new();
                m.externs.push(viper_il::Extern::new(
                    "rt_concat",
                    Type::Str,
                    vec![Type::Str, Type::Str],
                ));
                m.externs.push(viper_il::Extern::new("rt_len", Type::I64, vec![Type::Str]));
                m.globals.push(viper_il::Global {
                    name: "a".into(),
                    ty: Type::Str,
                    init: viper_il::module::GlobalInit::Str("ab".into()),
                });
                m.globals.push(viper_il::Global {
                    name: "b".into(),
                    ty: Type::Str,
                    init: viper_il::module::GlobalInit::Str("cde".into()),
                });
                let mut b = IrBuilder::new(&mut m);
                b.start_function("main", Type::I64, vec![]);
                let e = b.create_block("entry");
                b.set_insert_point(e);
                let joined = b
                    .emit_call(
                        "rt_concat",
                        Type::Str,
                        vec![Value::global("a"), Value::global("b")],
                        loc(1),
                    )
                    .expect("non-void call");
                let n = b
                    .emit_call("rt_len", Type::I64, vec![Value::temp(joined)], loc(2))
                    .expect("non-void call");
                b.emit_ret(Some(Value::temp(n)), loc(3));
                m
            },
            expected: BackendOutcome::Exit(5),
        },
    ]
}

/// Run every conformance case against a backend; returns the list of
/// failures (empty on full conformance).
pub fn run_conformance(backend: &dyn Backend) -> Vec<String> {
    let mut failures = Vec::new();
    for case in conformance_cases() {
        let module = (case.build)();
        if let Err(e) = verify_module(&module) {
            failures.push(format!("{}: case module failed verification: {}", case.name, e));
            continue;
        }
        match backend.execute(&module) {
            Ok(outcome) if outcome == case.expected => {}
            Ok(outcome) => failures.push(format!(
                "{}: expected {:?}, backend '{}' produced {:?}",
                case.name,
                case.expected,
                backend.name(),
                outcome
            )),
            Err(e) => failures.push(format!("{}: backend error: {}", case.name, e)),
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpreter_passes_its_own_contract() {
        let failures = run_conformance(&VmBackend);
        assert!(failures.is_empty(), "{}", failures.join("\n"));
    }

    #[test]
    fn every_case_module_verifies() {
        for case in conformance_cases() {
            let m = (case.build)();
            assert!(
                verify_module(&m).is_ok(),
                "case {} failed verification: {:?}",
                case.name,
                verify_module(&m).err()
            );
        }
    }
}
