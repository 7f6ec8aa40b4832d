//! Instructions: opcodes, comparison predicates, and source attribution.

use crate::types::Type;
use crate::value::{TempId, Value};
use serde::Serialize;
use std::fmt;

/// Source attribution carried by every instruction. Traps report the line
/// of the faulting instruction, so frontends must stamp real locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SourceLoc {
    pub file_id: u32,
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    pub fn new(file_id: u32, line: u32, column: u32) -> SourceLoc {
        SourceLoc { file_id, line, column }
    }

    /// Line 0 marks synthesized instructions with no source counterpart.
    pub fn is_known(self) -> bool {
        self.line != 0
    }
}

/// Integer comparison predicates. `S*` compare as signed i64, `U*` as
/// unsigned u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl IntPredicate {
    pub fn name(self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
        }
    }

    pub fn from_name(name: &str) -> Option<IntPredicate> {
        Some(match name {
            "eq" => IntPredicate::Eq,
            "ne" => IntPredicate::Ne,
            "slt" => IntPredicate::Slt,
            "sle" => IntPredicate::Sle,
            "sgt" => IntPredicate::Sgt,
            "sge" => IntPredicate::Sge,
            "ult" => IntPredicate::Ult,
            "ule" => IntPredicate::Ule,
            "ugt" => IntPredicate::Ugt,
            "uge" => IntPredicate::Uge,
            _ => return None,
        })
    }
}

/// Float comparison predicates. Ordered predicates are false when either
/// operand is NaN; `Ne` is true on unordered operands; `Uno` is true iff
/// any operand is NaN and `Ord` is its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatPredicate {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Ord,
    Uno,
}

impl FloatPredicate {
    pub fn name(self) -> &'static str {
        match self {
            FloatPredicate::Eq => "eq",
            FloatPredicate::Ne => "ne",
            FloatPredicate::Lt => "lt",
            FloatPredicate::Le => "le",
            FloatPredicate::Gt => "gt",
            FloatPredicate::Ge => "ge",
            FloatPredicate::Ord => "ord",
            FloatPredicate::Uno => "uno",
        }
    }

    pub fn from_name(name: &str) -> Option<FloatPredicate> {
        Some(match name {
            "eq" => FloatPredicate::Eq,
            "ne" => FloatPredicate::Ne,
            "lt" => FloatPredicate::Lt,
            "le" => FloatPredicate::Le,
            "gt" => FloatPredicate::Gt,
            "ge" => FloatPredicate::Ge,
            "ord" => FloatPredicate::Ord,
            "uno" => FloatPredicate::Uno,
            _ => return None,
        })
    }
}

/// The opcode set: the contract between frontends, verifier, VM, and
/// native backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Unchecked i64 arithmetic, two's-complement wrap.
    Add,
    Sub,
    Mul,

    // Checked arithmetic, valid at i16/i32/i64 (the instruction's type).
    IAddOvf,
    ISubOvf,
    IMulOvf,
    SDivChk0,
    SRemChk0,
    UDivChk0,
    URemChk0,

    // Bitwise and shifts at i64; shift counts are masked to `& 63`.
    And,
    Or,
    Xor,
    Not,
    Shl,
    AShr,
    LShr,

    // IEEE-754 f64 arithmetic; never traps.
    FAdd,
    FSub,
    FMul,
    FDiv,

    // Comparisons producing i1.
    ICmp(IntPredicate),
    FCmp(FloatPredicate),

    // Conversions.
    CastSiToFp,
    CastUiToFp,
    CastFpToSiRteChk,
    CastFpToUiRteChk,

    // Bounds check: yields the index unchanged or traps Bounds.
    IdxChk,

    // Typed constants; the literal rides in operands[0].
    ConstI1,
    ConstI16,
    ConstI32,
    ConstI64,
    ConstF64,

    // Memory.
    Alloca,
    Load,
    Store,

    // Control flow.
    Br,
    CBr,
    Ret,
    Trap,

    // Exception handling.
    EhPush,
    EhPop,
    EhEntry,
    ResumeLabel,

    // Direct call to an intra-module function or extern.
    Call,
}

impl Opcode {
    /// Terminators end a block and redirect control.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Br | Opcode::CBr | Opcode::Ret | Opcode::Trap | Opcode::ResumeLabel
        )
    }

    /// Base mnemonic for the textual form. Checked opcodes append a type
    /// suffix (`iadd.ovf.i32`) and cast opcodes a target width; the printer
    /// handles those.
    pub fn mnemonic(self) -> String {
        match self {
            Opcode::Add => "add".into(),
            Opcode::Sub => "sub".into(),
            Opcode::Mul => "mul".into(),
            Opcode::IAddOvf => "iadd.ovf".into(),
            Opcode::ISubOvf => "isub.ovf".into(),
            Opcode::IMulOvf => "imul.ovf".into(),
            Opcode::SDivChk0 => "sdiv.chk0".into(),
            Opcode::SRemChk0 => "srem.chk0".into(),
            Opcode::UDivChk0 => "udiv.chk0".into(),
            Opcode::URemChk0 => "urem.chk0".into(),
            Opcode::And => "and".into(),
            Opcode::Or => "or".into(),
            Opcode::Xor => "xor".into(),
            Opcode::Not => "not".into(),
            Opcode::Shl => "shl".into(),
            Opcode::AShr => "ashr".into(),
            Opcode::LShr => "lshr".into(),
            Opcode::FAdd => "fadd".into(),
            Opcode::FSub => "fsub".into(),
            Opcode::FMul => "fmul".into(),
            Opcode::FDiv => "fdiv".into(),
            Opcode::ICmp(p) => format!("icmp.{}", p.name()),
            Opcode::FCmp(p) => format!("fcmp.{}", p.name()),
            Opcode::CastSiToFp => "cast.si_to_fp".into(),
            Opcode::CastUiToFp => "cast.ui_to_fp".into(),
            Opcode::CastFpToSiRteChk => "cast.fp_to_si.rte.chk".into(),
            Opcode::CastFpToUiRteChk => "cast.fp_to_ui.rte.chk".into(),
            Opcode::IdxChk => "idx.chk".into(),
            Opcode::ConstI1 => "const.i1".into(),
            Opcode::ConstI16 => "const.i16".into(),
            Opcode::ConstI32 => "const.i32".into(),
            Opcode::ConstI64 => "const.i64".into(),
            Opcode::ConstF64 => "const.f64".into(),
            Opcode::Alloca => "alloca".into(),
            Opcode::Load => "load".into(),
            Opcode::Store => "store".into(),
            Opcode::Br => "br".into(),
            Opcode::CBr => "cbr".into(),
            Opcode::Ret => "ret".into(),
            Opcode::Trap => "trap".into(),
            Opcode::EhPush => "eh.push".into(),
            Opcode::EhPop => "eh.pop".into(),
            Opcode::EhEntry => "eh.entry".into(),
            Opcode::ResumeLabel => "resume.label".into(),
            Opcode::Call => "call".into(),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic())
    }
}

/// A single IL instruction.
///
/// Branch arguments live flattened in `operands`, grouped per target label:
/// `br` carries exactly the args of its one target; `cbr` carries
/// `[cond, true_args.., false_args..]` where the split point is the
/// parameter count of the true target. The verifier, the VM, and the
/// codegen contract all share this grouping rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    /// Destination temp, when the opcode produces a value.
    pub result: Option<TempId>,
    pub op: Opcode,
    /// Result type; also the checked width for the checked family and the
    /// accessed type for `load`/`store`.
    pub ty: Type,
    pub operands: Vec<Value>,
    /// Branch target labels, ordered (true target first for `cbr`).
    pub labels: Vec<String>,
    /// Callee name for `call`.
    pub callee: Option<String>,
    pub loc: SourceLoc,
}

impl Instr {
    /// A blank instruction to be filled field by field, mirroring how
    /// tests and frontends assemble IL.
    pub fn new(op: Opcode, ty: Type) -> Instr {
        Instr {
            result: None,
            op,
            ty,
            operands: Vec::new(),
            labels: Vec::new(),
            callee: None,
            loc: SourceLoc::default(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_classification() {
        assert!(Opcode::Br.is_terminator());
        assert!(Opcode::CBr.is_terminator());
        assert!(Opcode::Ret.is_terminator());
        assert!(Opcode::Trap.is_terminator());
        assert!(Opcode::ResumeLabel.is_terminator());
        assert!(!Opcode::EhPush.is_terminator());
        assert!(!Opcode::EhEntry.is_terminator());
        assert!(!Opcode::Call.is_terminator());
    }

    #[test]
    fn mnemonics() {
        assert_eq!(Opcode::IAddOvf.mnemonic(), "iadd.ovf");
        assert_eq!(Opcode::ICmp(IntPredicate::Slt).mnemonic(), "icmp.slt");
        assert_eq!(Opcode::FCmp(FloatPredicate::Uno).mnemonic(), "fcmp.uno");
        assert_eq!(Opcode::ResumeLabel.mnemonic(), "resume.label");
    }

    #[test]
    fn unknown_loc() {
        assert!(!SourceLoc::default().is_known());
        assert!(SourceLoc::new(1, 42, 1).is_known());
    }
}
