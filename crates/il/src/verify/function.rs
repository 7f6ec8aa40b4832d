//! Function-level verification: block structure, label resolution,
//! block-argument agreement, temp typing and dominance, opcode operand
//! signatures, return consistency, and exception-handler balance.

use super::Sink;
use crate::analysis::{successors, DomTree};
use crate::instr::{Instr, Opcode};
use crate::module::{Block, Function, Module};
use crate::types::Type;
use crate::value::{TempId, Value};
use std::collections::{HashMap, HashSet, VecDeque};

/// How a value can type-check: exactly one type, any integer width
/// (integer literals), or any handle type (`null`).
#[derive(Debug, Clone, Copy, PartialEq)]
enum VType {
    Exact(Type),
    IntLit(i64),
    NullLike,
}

struct Ctx<'a> {
    module: &'a Module,
    func: &'a Function,
    /// temp id -> (type, defining block, defining instruction index).
    /// Block/function parameters use `usize::MAX` as the instruction index
    /// so they dominate every instruction in their block.
    temps: HashMap<TempId, (Type, usize, usize)>,
}

impl Ctx<'_> {
    fn vtype(&self, v: &Value) -> Result<VType, String> {
        match v {
            Value::ConstInt(n) => Ok(VType::IntLit(*n)),
            Value::ConstFloat(_) => Ok(VType::Exact(Type::F64)),
            Value::ConstBool(_) => Ok(VType::Exact(Type::I1)),
            Value::Null => Ok(VType::NullLike),
            Value::Temp(id) => self
                .temps
                .get(id)
                .map(|(ty, _, _)| VType::Exact(*ty))
                .ok_or_else(|| format!("use of undefined temp %{}", id)),
            Value::GlobalRef(name) => self
                .module
                .global(name)
                .map(|g| VType::Exact(g.ty))
                .ok_or_else(|| format!("reference to unknown global @{}", name)),
        }
    }

    fn check_value(&self, v: &Value, expected: Type, sink: &mut Sink, at: &str) {
        match self.vtype(v) {
            Err(msg) => sink.error("undef-value", format!("{}: {}", at, msg)),
            Ok(VType::Exact(ty)) if ty == expected => {}
            Ok(VType::Exact(ty)) => sink.error(
                "operand-type",
                format!("{}: expected {}, got {}", at, expected, ty),
            ),
            Ok(VType::IntLit(n)) => {
                match expected.int_range() {
                    Some((lo, hi)) if n >= lo && n <= hi => {}
                    Some(_) => sink.error(
                        "const-range",
                        format!("{}: literal {} does not fit {}", at, n, expected),
                    ),
                    None if expected == Type::I1 => {
                        if n != 0 && n != 1 {
                            sink.error(
                                "const-range",
                                format!("{}: literal {} is not a valid i1", at, n),
                            );
                        }
                    }
                    None => sink.error(
                        "operand-type",
                        format!("{}: expected {}, got integer literal", at, expected),
                    ),
                }
            }
            Ok(VType::NullLike) => {
                if !matches!(expected, Type::Ptr | Type::Str | Type::Error) {
                    sink.error(
                        "operand-type",
                        format!("{}: null is not a {}", at, expected),
                    );
                }
            }
        }
    }
}

pub(crate) fn verify_function(m: &Module, f: &Function, sink: &mut Sink) {
    if f.blocks.is_empty() {
        sink.error("no-blocks", format!("function @{} has no blocks", f.name));
        return;
    }

    // Entry block parameters are forbidden; function params own the
    // preassigned temp ids instead.
    if !f.blocks[0].params.is_empty() {
        sink.error(
            "entry-params",
            format!("function @{}: entry block must not take parameters", f.name),
        );
    }

    // Unique labels.
    let mut labels = HashSet::new();
    for b in &f.blocks {
        if !labels.insert(b.label.as_str()) {
            sink.error(
                "dup-label",
                format!("function @{}: duplicate block label {}", f.name, b.label),
            );
        }
    }

    // Block termination and dead-terminator rules.
    for b in &f.blocks {
        verify_block_shape(f, b, sink);
    }

    // Label resolution for terminators and eh.push.
    for b in &f.blocks {
        for (idx, i) in b.instructions.iter().enumerate() {
            for label in &i.labels {
                if f.block_index(label).is_none() {
                    sink.error(
                        "bad-label",
                        format!(
                            "function @{}, block {}, instr {}: unknown label ^{}",
                            f.name, b.label, idx, label
                        ),
                    );
                }
            }
        }
    }

    // Temp definitions: exactly one def per temp.
    let mut ctx = Ctx {
        module: m,
        func: f,
        temps: HashMap::new(),
    };
    for p in &f.params {
        if ctx.temps.insert(p.id, (p.ty, 0, usize::MAX)).is_some() {
            sink.error(
                "dup-temp",
                format!("function @{}: duplicate parameter temp %{}", f.name, p.id),
            );
        }
    }
    for (bi, b) in f.blocks.iter().enumerate() {
        for p in &b.params {
            if ctx.temps.insert(p.id, (p.ty, bi, usize::MAX)).is_some() {
                sink.error(
                    "dup-temp",
                    format!(
                        "function @{}, block {}: temp %{} defined more than once",
                        f.name, b.label, p.id
                    ),
                );
            }
        }
        for (ii, i) in b.instructions.iter().enumerate() {
            if let Some(r) = i.result {
                if ctx.temps.insert(r, (i.ty, bi, ii)).is_some() {
                    sink.error(
                        "dup-temp",
                        format!(
                            "function @{}, block {}, instr {}: temp %{} defined more than once",
                            f.name, b.label, ii, r
                        ),
                    );
                }
            }
        }
    }

    // Opcode operand signatures, branch argument agreement, return
    // consistency.
    for b in &f.blocks {
        for (ii, i) in b.instructions.iter().enumerate() {
            let at = format!("function @{}, block {}, instr {}", f.name, b.label, ii);
            check_instr(&ctx, b, ii, i, &at, sink);
        }
    }

    // Dominance: every use is dominated by its definition.
    check_dominance(&ctx, f, sink);

    // Exception-handler discipline.
    check_eh(f, sink);
}

fn verify_block_shape(f: &Function, b: &Block, sink: &mut Sink) {
    if b.instructions.is_empty() {
        sink.error(
            "empty-block",
            format!("function @{}, block {}: block is empty", f.name, b.label),
        );
        return;
    }
    let last = b.instructions.len() - 1;
    for (idx, i) in b.instructions.iter().enumerate() {
        if idx != last && i.is_terminator() {
            sink.error(
                "dead-code",
                format!(
                    "function @{}, block {}, instr {}: instructions after terminator",
                    f.name, b.label, idx
                ),
            );
        }
    }
    if !b.instructions[last].is_terminator() {
        sink.error(
            "unterminated",
            format!(
                "function @{}, block {}: missing terminator",
                f.name, b.label
            ),
        );
    }
}

fn check_instr(ctx: &Ctx, block: &Block, idx: usize, i: &Instr, at: &str, sink: &mut Sink) {
    let f = ctx.func;
    let expect_operands = |n: usize, sink: &mut Sink| -> bool {
        if i.operands.len() != n {
            sink.error(
                "operand-count",
                format!("{}: {} expects {} operands, got {}", at, i.op, n, i.operands.len()),
            );
            false
        } else {
            true
        }
    };
    let expect_result = |want: bool, sink: &mut Sink| {
        if want && i.result.is_none() {
            sink.error("missing-result", format!("{}: {} requires a result", at, i.op));
        } else if !want && i.result.is_some() {
            sink.error("stray-result", format!("{}: {} has no result", at, i.op));
        }
    };

    match i.op {
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::AShr
        | Opcode::LShr => {
            expect_result(true, sink);
            if i.ty != Type::I64 {
                sink.error("instr-type", format!("{}: {} is defined at i64", at, i.op));
            }
            if expect_operands(2, sink) {
                ctx.check_value(&i.operands[0], Type::I64, sink, at);
                ctx.check_value(&i.operands[1], Type::I64, sink, at);
            }
        }
        Opcode::Not => {
            expect_result(true, sink);
            if i.ty != Type::I64 {
                sink.error("instr-type", format!("{}: not is defined at i64", at));
            }
            if expect_operands(1, sink) {
                ctx.check_value(&i.operands[0], Type::I64, sink, at);
            }
        }
        Opcode::IAddOvf
        | Opcode::ISubOvf
        | Opcode::IMulOvf
        | Opcode::SDivChk0
        | Opcode::SRemChk0
        | Opcode::UDivChk0
        | Opcode::URemChk0 => {
            expect_result(true, sink);
            if !i.ty.is_checked_int() {
                sink.error(
                    "instr-type",
                    format!("{}: {} is defined at i16/i32/i64, not {}", at, i.op, i.ty),
                );
            }
            if expect_operands(2, sink) {
                ctx.check_value(&i.operands[0], i.ty, sink, at);
                ctx.check_value(&i.operands[1], i.ty, sink, at);
            }
        }
        Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => {
            expect_result(true, sink);
            if i.ty != Type::F64 {
                sink.error("instr-type", format!("{}: {} is defined at f64", at, i.op));
            }
            if expect_operands(2, sink) {
                ctx.check_value(&i.operands[0], Type::F64, sink, at);
                ctx.check_value(&i.operands[1], Type::F64, sink, at);
            }
        }
        Opcode::ICmp(_) => {
            expect_result(true, sink);
            if i.ty != Type::I1 {
                sink.error("instr-type", format!("{}: comparisons produce i1", at));
            }
            if expect_operands(2, sink) {
                ctx.check_value(&i.operands[0], Type::I64, sink, at);
                ctx.check_value(&i.operands[1], Type::I64, sink, at);
            }
        }
        Opcode::FCmp(_) => {
            expect_result(true, sink);
            if i.ty != Type::I1 {
                sink.error("instr-type", format!("{}: comparisons produce i1", at));
            }
            if expect_operands(2, sink) {
                ctx.check_value(&i.operands[0], Type::F64, sink, at);
                ctx.check_value(&i.operands[1], Type::F64, sink, at);
            }
        }
        Opcode::CastSiToFp | Opcode::CastUiToFp => {
            expect_result(true, sink);
            if i.ty != Type::F64 {
                sink.error("instr-type", format!("{}: {} produces f64", at, i.op));
            }
            if expect_operands(1, sink) {
                // Any integer width converts; literals pass as-is.
                match ctx.vtype(&i.operands[0]) {
                    Ok(VType::Exact(t)) if t.is_integer() => {}
                    Ok(VType::IntLit(_)) => {}
                    Ok(_) => sink.error(
                        "operand-type",
                        format!("{}: {} takes an integer operand", at, i.op),
                    ),
                    Err(msg) => sink.error("undef-value", format!("{}: {}", at, msg)),
                }
            }
        }
        Opcode::CastFpToSiRteChk | Opcode::CastFpToUiRteChk => {
            expect_result(true, sink);
            if !i.ty.is_checked_int() {
                sink.error(
                    "instr-type",
                    format!("{}: {} produces i16/i32/i64", at, i.op),
                );
            }
            if expect_operands(1, sink) {
                ctx.check_value(&i.operands[0], Type::F64, sink, at);
            }
        }
        Opcode::IdxChk => {
            expect_result(true, sink);
            if i.ty != Type::I64 {
                sink.error("instr-type", format!("{}: idx.chk is defined at i64", at));
            }
            if expect_operands(2, sink) {
                ctx.check_value(&i.operands[0], Type::I64, sink, at);
                ctx.check_value(&i.operands[1], Type::I64, sink, at);
            }
        }
        Opcode::ConstI1 => {
            expect_result(true, sink);
            if expect_operands(1, sink) {
                ctx.check_value(&i.operands[0], Type::I1, sink, at);
            }
        }
        Opcode::ConstI16 | Opcode::ConstI32 | Opcode::ConstI64 => {
            expect_result(true, sink);
            if expect_operands(1, sink) {
                ctx.check_value(&i.operands[0], i.ty, sink, at);
            }
        }
        Opcode::ConstF64 => {
            expect_result(true, sink);
            if expect_operands(1, sink) {
                ctx.check_value(&i.operands[0], Type::F64, sink, at);
            }
        }
        Opcode::Alloca => {
            expect_result(true, sink);
            if i.ty != Type::Ptr {
                sink.error("instr-type", format!("{}: alloca produces ptr", at));
            }
            if expect_operands(1, sink) {
                ctx.check_value(&i.operands[0], Type::I64, sink, at);
            }
        }
        Opcode::Load => {
            expect_result(true, sink);
            if !is_loadable(i.ty) {
                sink.error(
                    "instr-type",
                    format!("{}: load is defined for primitive types, not {}", at, i.ty),
                );
            }
            if expect_operands(1, sink) {
                ctx.check_value(&i.operands[0], Type::Ptr, sink, at);
            }
        }
        Opcode::Store => {
            expect_result(false, sink);
            if !is_loadable(i.ty) {
                sink.error(
                    "instr-type",
                    format!("{}: store is defined for primitive types, not {}", at, i.ty),
                );
            }
            if expect_operands(2, sink) {
                ctx.check_value(&i.operands[0], Type::Ptr, sink, at);
                ctx.check_value(&i.operands[1], i.ty, sink, at);
            }
        }
        Opcode::Br => {
            expect_result(false, sink);
            if i.labels.len() != 1 {
                sink.error("bad-branch", format!("{}: br takes one target", at));
                return;
            }
            check_branch_args(ctx, &i.labels[0], &i.operands, at, sink);
        }
        Opcode::CBr => {
            expect_result(false, sink);
            if i.labels.len() != 2 {
                sink.error("bad-branch", format!("{}: cbr takes two targets", at));
                return;
            }
            if i.operands.is_empty() {
                sink.error("operand-count", format!("{}: cbr is missing its condition", at));
                return;
            }
            ctx.check_value(&i.operands[0], Type::I1, sink, at);
            // [cond, true_args.., false_args..]: the split point is the
            // true target's parameter count.
            let (Some(tb), Some(fb)) = (f.block(&i.labels[0]), f.block(&i.labels[1])) else {
                return; // unresolved labels already reported
            };
            let rest = &i.operands[1..];
            if rest.len() != tb.params.len() + fb.params.len() {
                sink.error(
                    "arg-arity",
                    format!(
                        "{}: cbr carries {} branch args, targets expect {} + {}",
                        at,
                        rest.len(),
                        tb.params.len(),
                        fb.params.len()
                    ),
                );
                return;
            }
            let (t_args, f_args) = rest.split_at(tb.params.len());
            for (arg, p) in t_args.iter().zip(&tb.params) {
                ctx.check_value(arg, p.ty, sink, at);
            }
            for (arg, p) in f_args.iter().zip(&fb.params) {
                ctx.check_value(arg, p.ty, sink, at);
            }
        }
        Opcode::Ret => {
            expect_result(false, sink);
            match (f.ret_type, i.operands.len()) {
                (Type::Void, 0) => {}
                (Type::Void, _) => sink.error(
                    "ret-type",
                    format!("{}: void function returns a value", at),
                ),
                (ty, 1) => ctx.check_value(&i.operands[0], ty, sink, at),
                (ty, n) => sink.error(
                    "ret-type",
                    format!("{}: function returns {}, ret carries {} operands", at, ty, n),
                ),
            }
        }
        Opcode::Trap => {
            expect_result(false, sink);
            let _ = expect_operands(0, sink);
        }
        Opcode::EhPush => {
            expect_result(false, sink);
            if i.labels.len() != 1 {
                sink.error("bad-branch", format!("{}: eh.push takes one handler label", at));
            } else if let Some(h) = f.block(&i.labels[0]) {
                if h.instructions.first().map(|fi| fi.op) != Some(Opcode::EhEntry) {
                    sink.error(
                        "eh-handler",
                        format!(
                            "{}: handler ^{} must begin with eh.entry",
                            at, i.labels[0]
                        ),
                    );
                }
            }
        }
        Opcode::EhPop => {
            expect_result(false, sink);
            let _ = expect_operands(0, sink);
        }
        Opcode::EhEntry => {
            expect_result(false, sink);
            if idx != 0 {
                sink.error(
                    "eh-entry",
                    format!("{}: eh.entry must be the first instruction of its block", at),
                );
            }
            let ptypes: Vec<Type> = block.params.iter().map(|p| p.ty).collect();
            if ptypes != [Type::Error, Type::ResumeTok] {
                sink.error(
                    "eh-entry",
                    format!(
                        "{}: handler blocks take (error, resumetok) parameters",
                        at
                    ),
                );
            }
        }
        Opcode::ResumeLabel => {
            expect_result(false, sink);
            if i.labels.len() != 1 {
                sink.error(
                    "bad-branch",
                    format!("{}: resume.label takes one continuation label", at),
                );
            } else if let Some(cont) = f.block(&i.labels[0]) {
                // Resume passes no branch arguments.
                if !cont.params.is_empty() {
                    sink.error(
                        "bad-branch",
                        format!(
                            "{}: resume continuation ^{} must not take parameters",
                            at, i.labels[0]
                        ),
                    );
                }
            }
            if expect_operands(1, sink) {
                match ctx.vtype(&i.operands[0]) {
                    Ok(VType::Exact(Type::ResumeTok)) => {}
                    Ok(_) => sink.error(
                        "operand-type",
                        format!("{}: resume.label consumes a resumetok", at),
                    ),
                    Err(msg) => sink.error("undef-value", format!("{}: {}", at, msg)),
                }
            }
        }
        Opcode::Call => {
            let Some(callee) = i.callee.as_deref() else {
                sink.error("bad-call", format!("{}: call without a callee", at));
                return;
            };
            let (params, ret): (Vec<Type>, Type) = if let Some(e) = ctx.module.extern_decl(callee)
            {
                (e.params.clone(), e.ret_type)
            } else if let Some(g) = ctx.module.function(callee) {
                (g.params.iter().map(|p| p.ty).collect(), g.ret_type)
            } else {
                sink.error(
                    "bad-call",
                    format!("{}: call to unknown callee @{}", at, callee),
                );
                return;
            };
            if i.ty != ret {
                sink.error(
                    "call-type",
                    format!("{}: @{} returns {}, call is typed {}", at, callee, ret, i.ty),
                );
            }
            expect_result(ret != Type::Void, sink);
            if i.operands.len() != params.len() {
                sink.error(
                    "arg-arity",
                    format!(
                        "{}: @{} takes {} arguments, got {}",
                        at,
                        callee,
                        params.len(),
                        i.operands.len()
                    ),
                );
                return;
            }
            for (arg, pty) in i.operands.iter().zip(&params) {
                ctx.check_value(arg, *pty, sink, at);
            }
        }
    }
}

fn check_branch_args(ctx: &Ctx, label: &str, args: &[Value], at: &str, sink: &mut Sink) {
    let Some(target) = ctx.func.block(label) else {
        return; // unresolved label already reported
    };
    if args.len() != target.params.len() {
        sink.error(
            "arg-arity",
            format!(
                "{}: branch to ^{} carries {} args, block expects {}",
                at,
                label,
                args.len(),
                target.params.len()
            ),
        );
        return;
    }
    for (arg, p) in args.iter().zip(&target.params) {
        ctx.check_value(arg, p.ty, sink, at);
    }
}

fn is_loadable(ty: Type) -> bool {
    matches!(ty, Type::I1 | Type::I16 | Type::I32 | Type::I64 | Type::F64 | Type::Ptr)
}

/// Every use of a temp must be dominated by its definition. Within a
/// block, the def's instruction index must precede the use; across blocks
/// the def's block must dominate the use's block in the CFG extended
/// with exceptional (`eh.push` handler) edges, so handler bodies and
/// their continuations are covered too.
fn check_dominance(ctx: &Ctx, f: &Function, sink: &mut Sink) {
    let dom = DomTree::compute_from(f.blocks.len(), |b| {
        let mut out = successors(f, b);
        for i in &f.blocks[b].instructions {
            if i.op == Opcode::EhPush {
                if let Some(h) = i.labels.first().and_then(|l| f.block_index(l)) {
                    if !out.contains(&h) {
                        out.push(h);
                    }
                }
            }
        }
        out
    });

    for (bi, b) in f.blocks.iter().enumerate() {
        for (ii, i) in b.instructions.iter().enumerate() {
            for v in &i.operands {
                let Some(id) = v.as_temp() else { continue };
                let Some(&(_, def_block, def_idx)) = ctx.temps.get(&id) else {
                    continue; // undefined temp already reported
                };
                let ok = if def_block == bi {
                    def_idx == usize::MAX || def_idx < ii
                } else if dom.is_reachable(bi) && dom.is_reachable(def_block) {
                    dom.dominates(def_block, bi)
                } else {
                    // Exceptional blocks: accept defs from the entry
                    // environment (function params) and local defs only.
                    def_idx == usize::MAX && def_block == 0
                };
                if !ok {
                    sink.error(
                        "dominance",
                        format!(
                            "function @{}, block {}, instr {}: %{} used before its definition dominates it",
                            f.name, b.label, ii, id
                        ),
                    );
                }
            }
        }
    }
}

/// Exception-handler discipline: every block reachable from entry has one
/// well-defined handler-stack depth, `eh.pop` never underflows, returns
/// happen at depth zero, and handler blocks are entered only via traps.
fn check_eh(f: &Function, sink: &mut Sink) {
    let is_handler: Vec<bool> = f
        .blocks
        .iter()
        .map(|b| b.instructions.first().map(|i| i.op) == Some(Opcode::EhEntry))
        .collect();

    // Handler blocks must not be targets of normal branches.
    for (bi, b) in f.blocks.iter().enumerate() {
        for s in successors(f, bi) {
            if is_handler[s] {
                sink.error(
                    "eh-handler",
                    format!(
                        "function @{}, block {}: handler {} is entered by a normal branch",
                        f.name, b.label, f.blocks[s].label
                    ),
                );
            }
        }
    }

    // Depth propagation over the normal CFG; handler blocks start at the
    // depth their eh.push site had before the push (the trap pops the
    // entry it dispatches to).
    let mut depth: Vec<Option<i32>> = vec![None; f.blocks.len()];
    depth[0] = Some(0);
    let mut work = VecDeque::from([0usize]);

    while let Some(bi) = work.pop_front() {
        let b = &f.blocks[bi];
        let mut d = depth[bi].expect("queued block has a depth");
        for (ii, i) in b.instructions.iter().enumerate() {
            match i.op {
                Opcode::EhPush => {
                    // The handler observes the depth outside its own
                    // region.
                    if let Some(h) = f.block_index(&i.labels[0]) {
                        propagate(f, h, d, &mut depth, &mut work, sink);
                    }
                    d += 1;
                }
                Opcode::EhPop => {
                    d -= 1;
                    if d < 0 {
                        sink.error(
                            "eh-balance",
                            format!(
                                "function @{}, block {}, instr {}: eh.pop on an empty handler stack",
                                f.name, b.label, ii
                            ),
                        );
                        d = 0;
                    }
                }
                Opcode::Ret => {
                    if d != 0 {
                        sink.error(
                            "eh-balance",
                            format!(
                                "function @{}, block {}: return with {} unpopped handler(s)",
                                f.name, b.label, d
                            ),
                        );
                    }
                }
                _ => {}
            }
        }
        for s in successors(f, bi) {
            propagate(f, s, d, &mut depth, &mut work, sink);
        }
    }
}

fn propagate(
    f: &Function,
    block: usize,
    d: i32,
    depth: &mut [Option<i32>],
    work: &mut VecDeque<usize>,
    sink: &mut Sink,
) {
    match depth[block] {
        None => {
            depth[block] = Some(d);
            work.push_back(block);
        }
        Some(prev) if prev != d => {
            sink.error(
                "eh-balance",
                format!(
                    "function @{}, block {}: handler stack depth is {} on one path and {} on another",
                    f.name, f.blocks[block].label, prev, d
                ),
            );
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use crate::build::IrBuilder;
    use crate::instr::{Instr, Opcode, SourceLoc};
    use crate::module::Module;
    use crate::types::Type;
    use crate::value::Value;
    use crate::verify::verify_module;

    fn loc() -> SourceLoc {
        SourceLoc::new(1, 1, 1)
    }

    #[test]
    fn accepts_well_formed_function() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("main", Type::I64, vec![]);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        let t = b.emit_bin(Opcode::Add, Type::I64, Value::const_int(1), Value::const_int(2), loc());
        b.emit_ret(Some(Value::temp(t)), loc());
        assert!(verify_module(&m).is_ok());
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::Void, vec![]);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        let mut i = Instr::new(Opcode::Add, Type::I64);
        i.result = Some(0);
        i.operands = vec![Value::const_int(1), Value::const_int(1)];
        b.push(i);
        let err = verify_module(&m).unwrap_err();
        assert_eq!(err.code, "unterminated");
    }

    #[test]
    fn rejects_instruction_after_terminator() {
        let mut m = Module::new();
        let mut f = crate::module::Function::new("f", Type::Void);
        let mut blk = crate::module::Block::new("entry");
        blk.instructions.push(Instr::new(Opcode::Ret, Type::Void));
        blk.instructions.push(Instr::new(Opcode::Ret, Type::Void));
        blk.terminated = true;
        f.blocks.push(blk);
        m.functions.push(f);
        let err = verify_module(&m).unwrap_err();
        assert!(err.notes.iter().any(|n| n.contains("after terminator")));
    }

    #[test]
    fn rejects_unknown_branch_target() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::Void, vec![]);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        b.emit_br("nowhere", vec![], loc());
        let err = verify_module(&m).unwrap_err();
        assert_eq!(err.code, "bad-label");
    }

    #[test]
    fn rejects_branch_arg_type_mismatch() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::Void, vec![]);
        let entry = b.create_block("entry");
        let (merge, ids) = b.create_block_with_params("merge", vec![Type::Str]);
        b.set_insert_point(entry);
        b.emit_br("merge", vec![Value::const_int(1)], loc());
        b.set_insert_point(merge);
        b.emit_call("rt_print_str", Type::Void, vec![Value::temp(ids[0])], loc());
        b.emit_ret(None, loc());
        m.externs
            .push(crate::module::Extern::new("rt_print_str", Type::Void, vec![Type::Str]));
        let err = verify_module(&m).unwrap_err();
        assert!(err.notes.iter().any(|n| n.contains("expected str")));
    }

    #[test]
    fn rejects_use_before_def() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::I64, vec![]);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        // %5 is never defined.
        b.emit_ret(Some(Value::temp(5)), loc());
        let err = verify_module(&m).unwrap_err();
        assert!(err.notes.iter().any(|n| n.contains("undefined temp %5")));
    }

    #[test]
    fn rejects_checked_arith_at_bad_width() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::I64, vec![]);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        let t = b.emit_bin(
            Opcode::IAddOvf,
            Type::I1,
            Value::const_int(0),
            Value::const_int(1),
            loc(),
        );
        b.emit_ret(Some(Value::temp(t)), loc());
        let err = verify_module(&m).unwrap_err();
        assert!(err.notes.iter().any(|n| n.contains("i16/i32/i64")));
    }

    #[test]
    fn rejects_literal_out_of_width() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::I64, vec![]);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        let t = b.emit_bin(
            Opcode::IAddOvf,
            Type::I16,
            Value::const_int(70_000),
            Value::const_int(1),
            loc(),
        );
        let w = b.reserve_temp_id();
        let mut cast = Instr::new(Opcode::CastSiToFp, Type::F64);
        cast.result = Some(w);
        cast.operands = vec![Value::temp(t)];
        b.push(cast);
        b.emit_ret(Some(Value::const_int(0)), loc());
        let err = verify_module(&m).unwrap_err();
        assert!(err.notes.iter().any(|n| n.contains("does not fit i16")));
    }

    #[test]
    fn rejects_ret_value_from_void_function() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::Void, vec![]);
        let entry = b.create_block("entry");
        b.set_insert_point(entry);
        b.emit_ret(Some(Value::const_int(0)), loc());
        let err = verify_module(&m).unwrap_err();
        assert_eq!(err.code, "ret-type");
    }

    #[test]
    fn rejects_unbalanced_eh() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::Void, vec![]);
        let entry = b.create_block("entry");
        let (handler, _ids) =
            b.create_block_with_params("handler", vec![Type::Error, Type::ResumeTok]);
        b.set_insert_point(entry);
        b.emit_eh_push("handler", loc());
        // Missing eh.pop before the return.
        b.emit_ret(None, loc());
        b.set_insert_point(handler);
        b.emit_eh_entry(loc());
        b.emit_ret(None, loc());
        let err = verify_module(&m).unwrap_err();
        assert!(err.notes.iter().any(|n| n.contains("unpopped handler")));
    }

    #[test]
    fn rejects_normal_branch_into_handler() {
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::Void, vec![]);
        let entry = b.create_block("entry");
        let (handler, ids) = b.create_block_with_params("handler", vec![Type::Error, Type::ResumeTok]);
        b.set_insert_point(entry);
        b.emit_br(
            "handler",
            vec![Value::Null, Value::temp(ids[1])],
            loc(),
        );
        b.set_insert_point(handler);
        b.emit_eh_entry(loc());
        b.emit_ret(None, loc());
        let err = verify_module(&m).unwrap_err();
        assert!(err
            .notes
            .iter()
            .any(|n| n.contains("entered by a normal branch")));
    }

    #[test]
    fn accepts_eh_push_pop_pair() {
        let mut m = Module::new();
        m.externs
            .push(crate::module::Extern::new("rt_err_line", Type::I64, vec![Type::Error]));
        let mut b = IrBuilder::new(&mut m);
        b.start_function("f", Type::I64, vec![]);
        let entry = b.create_block("entry");
        let (handler, ids) = b.create_block_with_params("handler", vec![Type::Error, Type::ResumeTok]);
        let cont = b.create_block("cont");
        b.set_insert_point(entry);
        b.emit_eh_push("handler", loc());
        let t = b.emit_bin(
            Opcode::SDivChk0,
            Type::I64,
            Value::const_int(10),
            Value::const_int(2),
            loc(),
        );
        b.emit_eh_pop(loc());
        b.emit_ret(Some(Value::temp(t)), loc());
        b.set_insert_point(handler);
        b.emit_eh_entry(loc());
        let line = b.emit_call("rt_err_line", Type::I64, vec![Value::temp(ids[0])], loc());
        let _ = line;
        b.emit_resume(Value::temp(ids[1]), "cont", loc());
        b.set_insert_point(cont);
        b.emit_ret(Some(Value::const_int(0)), loc());
        assert!(verify_module(&m).is_ok(), "{:?}", verify_module(&m).err());
    }
}
