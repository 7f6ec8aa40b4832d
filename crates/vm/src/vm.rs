//! The tree-walking interpreter.
//!
//! Each intra-module call executes recursively with its own [`Frame`].
//! Checked opcodes trap at the instruction that detects the fault, with
//! the instruction's source location attached. A trap first unwinds to
//! the nearest frame with a non-empty handler stack (tearing down frames
//! below it), allocates an `Error` and a resume token, and enters the
//! handler block; with no active handler anywhere it prints one
//! diagnostic line and execution fails with [`VmError::Trap`].

use crate::externs::{ExternFn, ExternRegistry, Signature};
use crate::frame::Frame;
use crate::slot::Slot;
use std::collections::HashMap;
use std::fmt;
use viper_il::{
    FloatPredicate, Function, Instr, IntPredicate, Module, Opcode, SourceLoc, Type, Value,
};
use viper_il::module::GlobalInit;
use viper_runtime::{heap, stack_safety, string, trap, TrapKind};

/// Everything known about a dispatched fault.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapDescriptor {
    pub kind: TrapKind,
    pub message: String,
    pub loc: SourceLoc,
    pub function: String,
    pub block: String,
    pub instr_index: usize,
}

impl fmt::Display for TrapDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trap: {} @{} {}:{} (line {})",
            self.kind, self.function, self.block, self.instr_index, self.loc.line
        )?;
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}

/// Interpreter configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Emit a `tracing` event per executed instruction.
    pub trace: bool,
    /// Hard step limit; `None` runs to completion.
    pub max_steps: Option<u64>,
    /// Interpreter recursion limit; exceeding it raises a catchable
    /// `StackOverflow` trap at the call site.
    pub max_frames: usize,
}

impl Default for RunConfig {
    fn default() -> RunConfig {
        RunConfig {
            trace: false,
            max_steps: None,
            max_frames: 512,
        }
    }
}

/// Execution failure.
#[derive(Debug)]
pub enum VmError {
    /// An uncaught trap terminated the program.
    Trap(TrapDescriptor),
    /// The module has no function of the requested name.
    MissingFunction(String),
    /// A call named an extern that was never registered.
    UnknownExtern(String),
    /// The configured step limit was exhausted.
    StepLimitExceeded(u64),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Trap(d) => write!(f, "{}", d),
            VmError::MissingFunction(name) => write!(f, "unknown function @{}", name),
            VmError::UnknownExtern(name) => write!(f, "unregistered extern @{}", name),
            VmError::StepLimitExceeded(n) => write!(f, "step limit of {} exceeded", n),
        }
    }
}

impl std::error::Error for VmError {}

/// Result of running one function to completion.
#[derive(Debug)]
pub enum Outcome {
    Return(Slot),
    Trap(TrapDescriptor),
}

enum Control {
    Next,
    Jump,
    Return(Slot),
    /// Fault detected at the current instruction.
    Fault(TrapKind, String),
    /// Trap descriptor propagating out of a callee.
    Propagate(TrapDescriptor),
}

pub struct Vm<'m> {
    module: &'m Module,
    config: RunConfig,
    externs: ExternRegistry,
    globals: HashMap<String, Slot>,
    /// Handles owned by the globals table, released on drop.
    owned_globals: Vec<heap::RtHandle>,
    instr_count: u64,
    last_trap: Option<TrapDescriptor>,
    next_token: u64,
    depth: usize,
}

impl<'m> Vm<'m> {
    /// Build a VM over a verified module with the default configuration.
    pub fn new(module: &'m Module) -> Vm<'m> {
        Vm::with_config(module, RunConfig::default())
    }

    pub fn with_config(module: &'m Module, config: RunConfig) -> Vm<'m> {
        let mut globals = HashMap::new();
        let mut owned = Vec::new();
        for g in &module.globals {
            let slot = match &g.init {
                GlobalInit::Str(text) => {
                    let h = string::str_new(text);
                    owned.push(h);
                    Slot::Str(h)
                }
                GlobalInit::Value(v) => match v {
                    Value::ConstInt(n) => Slot::Int(*n),
                    Value::ConstFloat(x) => Slot::Float(*x),
                    Value::ConstBool(b) => Slot::Bool(*b),
                    _ => Slot::Null,
                },
            };
            globals.insert(g.name.clone(), slot);
        }
        Vm {
            module,
            config,
            externs: ExternRegistry::with_runtime(),
            globals,
            owned_globals: owned,
            instr_count: 0,
            last_trap: None,
            next_token: 1,
            depth: 0,
        }
    }

    /// Register a user-supplied extern before running.
    pub fn register_extern(&mut self, name: impl Into<String>, sig: Signature, f: ExternFn) {
        self.externs.register(name, sig, f);
    }

    /// Instructions executed so far.
    pub fn instruction_count(&self) -> u64 {
        self.instr_count
    }

    /// The most recent trap descriptor, caught or not.
    pub fn last_trap(&self) -> Option<&TrapDescriptor> {
        self.last_trap.as_ref()
    }

    pub fn last_trap_message(&self) -> Option<String> {
        self.last_trap.as_ref().map(|d| d.to_string())
    }

    /// Execute `@main` to completion. An uncaught trap prints its
    /// diagnostic to stderr and yields [`VmError::Trap`].
    pub fn run(&mut self) -> Result<i64, VmError> {
        stack_safety::init_stack_safety();
        match self.call("main", &[])? {
            Outcome::Return(slot) => {
                let code = slot.as_i64();
                // A refcounted return was retained for us; balance it.
                if slot.is_refcounted() {
                    heap::release(slot.as_handle());
                }
                Ok(code)
            }
            Outcome::Trap(desc) => {
                eprintln!("{}", desc);
                Err(VmError::Trap(desc))
            }
        }
    }

    /// Execute a named function with marshaled arguments.
    pub fn call(&mut self, name: &str, args: &[Slot]) -> Result<Outcome, VmError> {
        let Some(idx) = self.module.functions.iter().position(|f| f.name == name) else {
            return Err(VmError::MissingFunction(name.to_string()));
        };
        trap::clear_pending();
        self.exec_function(idx, args)
    }

    fn exec_function(&mut self, func_idx: usize, args: &[Slot]) -> Result<Outcome, VmError> {
        let func: &'m Function = &self.module.functions[func_idx];
        let mut frame = Frame::new(func_idx, func.next_temp as usize);
        for (p, arg) in func.params.iter().zip(args) {
            // Arguments are borrowed by the callee; the caller holds the
            // reference throughout the call.
            frame.write_temp(p.id, *arg, p.ty, false);
        }

        loop {
            let block = &func.blocks[frame.block];
            let Some(instr) = block.instructions.get(frame.pc) else {
                // Verified IL always terminates blocks; treat a fallthrough
                // as a domain fault rather than UB.
                let desc = self.descriptor(
                    func,
                    frame.block,
                    frame.pc,
                    SourceLoc::default(),
                    TrapKind::DomainError,
                    "block fell through without a terminator".to_string(),
                );
                frame.teardown();
                return Ok(Outcome::Trap(desc));
            };

            self.instr_count += 1;
            if let Some(max) = self.config.max_steps {
                if self.instr_count > max {
                    frame.teardown();
                    return Err(VmError::StepLimitExceeded(max));
                }
            }
            if self.config.trace {
                tracing::trace!(
                    function = %func.name,
                    block = %block.label,
                    pc = frame.pc,
                    op = %instr.op,
                    "step"
                );
            }

            let control = self.step(&mut frame, func, instr)?;
            match control {
                Control::Next => frame.pc += 1,
                Control::Jump => {}
                Control::Return(slot) => {
                    frame.teardown();
                    return Ok(Outcome::Return(slot));
                }
                Control::Fault(kind, message) => {
                    let desc = self.descriptor(
                        func,
                        frame.block,
                        frame.pc,
                        instr.loc,
                        kind,
                        message,
                    );
                    if !self.dispatch_trap(&mut frame, &desc) {
                        frame.teardown();
                        return Ok(Outcome::Trap(desc));
                    }
                }
                Control::Propagate(desc) => {
                    if !self.dispatch_trap(&mut frame, &desc) {
                        frame.teardown();
                        return Ok(Outcome::Trap(desc));
                    }
                }
            }
        }
    }

    fn descriptor(
        &mut self,
        func: &Function,
        block: usize,
        pc: usize,
        loc: SourceLoc,
        kind: TrapKind,
        message: String,
    ) -> TrapDescriptor {
        let desc = TrapDescriptor {
            kind,
            message,
            loc,
            function: func.name.clone(),
            block: func.blocks[block].label.clone(),
            instr_index: pc,
        };
        self.last_trap = Some(desc.clone());
        desc
    }

    /// Enter the innermost active handler, if any: pop its label, mint an
    /// `Error` and resume token, and bind them to the handler block's
    /// parameters.
    fn dispatch_trap(&mut self, frame: &mut Frame, desc: &TrapDescriptor) -> bool {
        let func = &self.module.functions[frame.func];
        let Some(label) = frame.handlers.pop() else {
            return false;
        };
        let hidx = func
            .block_index(&label)
            .expect("verified modules only push resolvable handler labels");
        let hblock = &func.blocks[hidx];
        let err = trap::error_new(desc.kind, desc.message.clone(), desc.loc.line as i64);
        let tok = self.next_token;
        self.next_token += 1;
        frame.mint_token(tok);
        frame.write_temp(hblock.params[0].id, Slot::Error(err), Type::Error, true);
        frame.write_temp(hblock.params[1].id, Slot::Resume(tok), Type::ResumeTok, false);
        frame.block = hidx;
        frame.pc = 0;
        true
    }

    fn eval(&self, frame: &Frame, v: &Value) -> Slot {
        match v {
            Value::ConstInt(n) => Slot::Int(*n),
            Value::ConstFloat(x) => Slot::Float(*x),
            Value::ConstBool(b) => Slot::Bool(*b),
            Value::Null => Slot::Null,
            Value::Temp(id) => frame.read_temp(*id).map(|t| t.value).unwrap_or(Slot::Unit),
            Value::GlobalRef(name) => self.globals.get(name).copied().unwrap_or(Slot::Unit),
        }
    }

    fn operand_type(&self, frame: &Frame, v: &Value) -> Type {
        match v {
            Value::ConstInt(_) => Type::I64,
            Value::ConstFloat(_) => Type::F64,
            Value::ConstBool(_) => Type::I1,
            Value::Null => Type::Ptr,
            Value::Temp(id) => frame.read_temp(*id).map(|t| t.ty).unwrap_or(Type::I64),
            Value::GlobalRef(name) => self
                .module
                .global(name)
                .map(|g| g.ty)
                .unwrap_or(Type::Ptr),
        }
    }

    /// Branch with block arguments: a parallel assignment (all argument
    /// values are snapshot in the source frame first, so swap-shaped
    /// edges resolve correctly), retaining refcounted values into the
    /// target's parameter temps.
    fn branch(&mut self, frame: &mut Frame, func: &Function, label: &str, args: &[Value]) {
        let tidx = func
            .block_index(label)
            .expect("verified modules only branch to resolvable labels");
        let snapshot: Vec<Slot> = args.iter().map(|v| self.eval(frame, v)).collect();
        let tblock = &func.blocks[tidx];
        for (p, v) in tblock.params.iter().zip(snapshot) {
            if v.is_refcounted() {
                heap::retain(v.as_handle());
            }
            frame.write_temp(p.id, v, p.ty, v.is_refcounted());
        }
        frame.block = tidx;
        frame.pc = 0;
    }

    fn step(
        &mut self,
        frame: &mut Frame,
        func: &'m Function,
        instr: &'m Instr,
    ) -> Result<Control, VmError> {
        let ops = &instr.operands;
        let write = |frame: &mut Frame, instr: &Instr, v: Slot| {
            if let Some(r) = instr.result {
                frame.write_temp(r, v, instr.ty, false);
            }
        };

        match instr.op {
            // Unchecked i64 arithmetic wraps.
            Opcode::Add => {
                let v = self.eval(frame, &ops[0]).as_i64().wrapping_add(self.eval(frame, &ops[1]).as_i64());
                write(frame, instr, Slot::Int(v));
                Ok(Control::Next)
            }
            Opcode::Sub => {
                let v = self.eval(frame, &ops[0]).as_i64().wrapping_sub(self.eval(frame, &ops[1]).as_i64());
                write(frame, instr, Slot::Int(v));
                Ok(Control::Next)
            }
            Opcode::Mul => {
                let v = self.eval(frame, &ops[0]).as_i64().wrapping_mul(self.eval(frame, &ops[1]).as_i64());
                write(frame, instr, Slot::Int(v));
                Ok(Control::Next)
            }
            Opcode::And => {
                let v = self.eval(frame, &ops[0]).as_i64() & self.eval(frame, &ops[1]).as_i64();
                write(frame, instr, Slot::Int(v));
                Ok(Control::Next)
            }
            Opcode::Or => {
                let v = self.eval(frame, &ops[0]).as_i64() | self.eval(frame, &ops[1]).as_i64();
                write(frame, instr, Slot::Int(v));
                Ok(Control::Next)
            }
            Opcode::Xor => {
                let v = self.eval(frame, &ops[0]).as_i64() ^ self.eval(frame, &ops[1]).as_i64();
                write(frame, instr, Slot::Int(v));
                Ok(Control::Next)
            }
            Opcode::Not => {
                let v = !self.eval(frame, &ops[0]).as_i64();
                write(frame, instr, Slot::Int(v));
                Ok(Control::Next)
            }
            // Shift counts are masked to `& 63`.
            Opcode::Shl => {
                let a = self.eval(frame, &ops[0]).as_i64();
                let s = (self.eval(frame, &ops[1]).as_i64() & 63) as u32;
                write(frame, instr, Slot::Int(a.wrapping_shl(s)));
                Ok(Control::Next)
            }
            Opcode::AShr => {
                let a = self.eval(frame, &ops[0]).as_i64();
                let s = (self.eval(frame, &ops[1]).as_i64() & 63) as u32;
                write(frame, instr, Slot::Int(a.wrapping_shr(s)));
                Ok(Control::Next)
            }
            Opcode::LShr => {
                let a = self.eval(frame, &ops[0]).as_i64() as u64;
                let s = (self.eval(frame, &ops[1]).as_i64() & 63) as u32;
                write(frame, instr, Slot::Int((a >> s) as i64));
                Ok(Control::Next)
            }

            Opcode::IAddOvf | Opcode::ISubOvf | Opcode::IMulOvf => {
                let a = self.eval(frame, &ops[0]).as_i64() as i128;
                let b = self.eval(frame, &ops[1]).as_i64() as i128;
                let wide = match instr.op {
                    Opcode::IAddOvf => a + b,
                    Opcode::ISubOvf => a - b,
                    _ => a * b,
                };
                let (min, max) = instr.ty.int_range().expect("verified checked width");
                if wide < min as i128 || wide > max as i128 {
                    return Ok(Control::Fault(
                        TrapKind::Overflow,
                        format!("integer overflow in {}", instr.op),
                    ));
                }
                write(frame, instr, Slot::Int(wide as i64));
                Ok(Control::Next)
            }
            Opcode::SDivChk0 | Opcode::SRemChk0 => {
                let a = self.eval(frame, &ops[0]).as_i64();
                let b = self.eval(frame, &ops[1]).as_i64();
                if b == 0 {
                    return Ok(Control::Fault(TrapKind::DivideByZero, "division by zero".into()));
                }
                let (min, _) = instr.ty.int_range().expect("verified checked width");
                if instr.op == Opcode::SDivChk0 {
                    if a == min && b == -1 {
                        return Ok(Control::Fault(
                            TrapKind::Overflow,
                            format!("integer overflow in {}", instr.op),
                        ));
                    }
                    // Truncating division, like the source languages.
                    write(frame, instr, Slot::Int(a / b));
                } else {
                    // MIN % -1 is defined as 0, not a trap.
                    write(frame, instr, Slot::Int(a.wrapping_rem(b)));
                }
                Ok(Control::Next)
            }
            Opcode::UDivChk0 | Opcode::URemChk0 => {
                let mask = width_mask(instr.ty);
                let a = (self.eval(frame, &ops[0]).as_i64() as u64) & mask;
                let b = (self.eval(frame, &ops[1]).as_i64() as u64) & mask;
                if b == 0 {
                    return Ok(Control::Fault(TrapKind::DivideByZero, "division by zero".into()));
                }
                let r = if instr.op == Opcode::UDivChk0 { a / b } else { a % b };
                write(frame, instr, Slot::Int(sign_wrap(r, instr.ty)));
                Ok(Control::Next)
            }

            Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => {
                let a = self.eval(frame, &ops[0]).as_f64();
                let b = self.eval(frame, &ops[1]).as_f64();
                let v = match instr.op {
                    Opcode::FAdd => a + b,
                    Opcode::FSub => a - b,
                    Opcode::FMul => a * b,
                    _ => a / b,
                };
                write(frame, instr, Slot::Float(v));
                Ok(Control::Next)
            }

            Opcode::ICmp(pred) => {
                let a = self.eval(frame, &ops[0]).as_i64();
                let b = self.eval(frame, &ops[1]).as_i64();
                let (ua, ub) = (a as u64, b as u64);
                let v = match pred {
                    IntPredicate::Eq => a == b,
                    IntPredicate::Ne => a != b,
                    IntPredicate::Slt => a < b,
                    IntPredicate::Sle => a <= b,
                    IntPredicate::Sgt => a > b,
                    IntPredicate::Sge => a >= b,
                    IntPredicate::Ult => ua < ub,
                    IntPredicate::Ule => ua <= ub,
                    IntPredicate::Ugt => ua > ub,
                    IntPredicate::Uge => ua >= ub,
                };
                write(frame, instr, Slot::Bool(v));
                Ok(Control::Next)
            }
            Opcode::FCmp(pred) => {
                let a = self.eval(frame, &ops[0]).as_f64();
                let b = self.eval(frame, &ops[1]).as_f64();
                let v = match pred {
                    FloatPredicate::Eq => a == b,
                    FloatPredicate::Ne => a != b,
                    FloatPredicate::Lt => a < b,
                    FloatPredicate::Le => a <= b,
                    FloatPredicate::Gt => a > b,
                    FloatPredicate::Ge => a >= b,
                    FloatPredicate::Ord => !a.is_nan() && !b.is_nan(),
                    FloatPredicate::Uno => a.is_nan() || b.is_nan(),
                };
                write(frame, instr, Slot::Bool(v));
                Ok(Control::Next)
            }

            Opcode::CastSiToFp => {
                let v = self.eval(frame, &ops[0]).as_i64();
                write(frame, instr, Slot::Float(v as f64));
                Ok(Control::Next)
            }
            Opcode::CastUiToFp => {
                let ty = self.operand_type(frame, &ops[0]);
                let v = (self.eval(frame, &ops[0]).as_i64() as u64) & width_mask(ty);
                write(frame, instr, Slot::Float(v as f64));
                Ok(Control::Next)
            }
            Opcode::CastFpToSiRteChk => {
                let f = self.eval(frame, &ops[0]).as_f64();
                if f.is_nan() || f.is_infinite() {
                    return Ok(Control::Fault(
                        TrapKind::InvalidCast,
                        format!("cannot convert {} to {}", f, instr.ty),
                    ));
                }
                let r = f.round_ties_even();
                let (min, max) = instr.ty.int_range().expect("verified checked width");
                let wide = r as i128;
                if wide < min as i128 || wide > max as i128 {
                    return Ok(Control::Fault(
                        TrapKind::InvalidCast,
                        format!("{} is out of range for {}", f, instr.ty),
                    ));
                }
                write(frame, instr, Slot::Int(wide as i64));
                Ok(Control::Next)
            }
            Opcode::CastFpToUiRteChk => {
                let f = self.eval(frame, &ops[0]).as_f64();
                if f.is_nan() || f.is_infinite() {
                    return Ok(Control::Fault(
                        TrapKind::InvalidCast,
                        format!("cannot convert {} to {}", f, instr.ty),
                    ));
                }
                let r = f.round_ties_even();
                if r < 0.0 {
                    return Ok(Control::Fault(
                        TrapKind::InvalidCast,
                        format!("{} is negative", f),
                    ));
                }
                let wide = r as u128;
                if wide > width_mask(instr.ty) as u128 {
                    return Ok(Control::Fault(
                        TrapKind::InvalidCast,
                        format!("{} is out of range for {}", f, instr.ty),
                    ));
                }
                write(frame, instr, Slot::Int(sign_wrap(wide as u64, instr.ty)));
                Ok(Control::Next)
            }

            Opcode::IdxChk => {
                let idx = self.eval(frame, &ops[0]).as_i64();
                let len = self.eval(frame, &ops[1]).as_i64();
                if idx < 0 || idx >= len {
                    return Ok(Control::Fault(
                        TrapKind::Bounds,
                        format!("index {} out of range for length {}", idx, len),
                    ));
                }
                write(frame, instr, Slot::Int(idx));
                Ok(Control::Next)
            }

            Opcode::ConstI1 | Opcode::ConstI16 | Opcode::ConstI32 | Opcode::ConstI64
            | Opcode::ConstF64 => {
                let v = self.eval(frame, &ops[0]);
                write(frame, instr, v);
                Ok(Control::Next)
            }

            Opcode::Alloca => {
                let size = self.eval(frame, &ops[0]).as_i64();
                if size < 0 {
                    return Ok(Control::Fault(
                        TrapKind::DomainError,
                        format!("alloca: negative size {}", size),
                    ));
                }
                let mut buf = vec![0u8; size as usize].into_boxed_slice();
                let ptr = buf.as_mut_ptr();
                frame.allocas.push(buf);
                write(frame, instr, Slot::Ptr(ptr));
                Ok(Control::Next)
            }
            Opcode::Load => {
                let p = self.eval(frame, &ops[0]).as_handle();
                if p.is_null() {
                    return Ok(Control::Fault(TrapKind::DomainError, "load from null".into()));
                }
                let v = unsafe { load_typed(p, instr.ty) };
                write(frame, instr, v);
                Ok(Control::Next)
            }
            Opcode::Store => {
                let p = self.eval(frame, &ops[0]).as_handle();
                if p.is_null() {
                    return Ok(Control::Fault(TrapKind::DomainError, "store to null".into()));
                }
                let v = self.eval(frame, &ops[1]);
                unsafe { store_typed(p, instr.ty, v) };
                Ok(Control::Next)
            }

            Opcode::Br => {
                self.branch(frame, func, &instr.labels[0], ops);
                Ok(Control::Jump)
            }
            Opcode::CBr => {
                let cond = self.eval(frame, &ops[0]).as_bool();
                let t_params = func
                    .block(&instr.labels[0])
                    .map(|b| b.params.len())
                    .unwrap_or(0);
                let rest = &ops[1..];
                let (t_args, f_args) = rest.split_at(t_params.min(rest.len()));
                if cond {
                    self.branch(frame, func, &instr.labels[0], t_args);
                } else {
                    self.branch(frame, func, &instr.labels[1], f_args);
                }
                Ok(Control::Jump)
            }
            Opcode::Ret => {
                let slot = match ops.first() {
                    Some(v) => self.eval(frame, v),
                    None => Slot::Unit,
                };
                // Returned values transfer: retained for the caller
                // before this frame's teardown drops its own references.
                if slot.is_refcounted() {
                    heap::retain(slot.as_handle());
                }
                Ok(Control::Return(slot))
            }
            Opcode::Trap => Ok(Control::Fault(TrapKind::DomainError, String::new())),

            Opcode::EhPush => {
                frame.handlers.push(instr.labels[0].clone());
                Ok(Control::Next)
            }
            Opcode::EhPop => {
                if frame.handlers.pop().is_none() {
                    return Ok(Control::Fault(
                        TrapKind::DomainError,
                        "eh.pop on an empty handler stack".into(),
                    ));
                }
                Ok(Control::Next)
            }
            Opcode::EhEntry => Ok(Control::Next),
            Opcode::ResumeLabel => {
                let tok = self.eval(frame, &ops[0]);
                let Slot::Resume(id) = tok else {
                    return Ok(Control::Fault(
                        TrapKind::DomainError,
                        "resume.label without a resume token".into(),
                    ));
                };
                if !frame.consume_token(id) {
                    return Ok(Control::Fault(
                        TrapKind::DomainError,
                        "resume token already consumed".into(),
                    ));
                }
                self.branch(frame, func, &instr.labels[0], &[]);
                Ok(Control::Jump)
            }

            Opcode::Call => self.call_instr(frame, func, instr),
        }
    }

    fn call_instr(
        &mut self,
        frame: &mut Frame,
        _func: &Function,
        instr: &'m Instr,
    ) -> Result<Control, VmError> {
        let callee = instr
            .callee
            .as_deref()
            .expect("verified calls carry a callee");
        let args: Vec<Slot> = instr.operands.iter().map(|v| self.eval(frame, v)).collect();

        if let Some(fidx) = self.module.functions.iter().position(|f| f.name == callee) {
            if self.depth + 1 >= self.config.max_frames {
                return Ok(Control::Fault(
                    TrapKind::StackOverflow,
                    format!("interpreter frame limit of {} exceeded", self.config.max_frames),
                ));
            }
            self.depth += 1;
            let outcome = self.exec_function(fidx, &args);
            self.depth -= 1;
            return match outcome? {
                Outcome::Return(v) => {
                    if let Some(r) = instr.result {
                        // The callee retained the value for us.
                        frame.write_temp(r, v, instr.ty, v.is_refcounted());
                    } else if v.is_refcounted() {
                        heap::release(v.as_handle());
                    }
                    Ok(Control::Next)
                }
                Outcome::Trap(desc) => Ok(Control::Propagate(desc)),
            };
        }

        let Some((sig, f)) = self.externs.lookup(callee) else {
            return Err(VmError::UnknownExtern(callee.to_string()));
        };
        if args.len() != sig.params.len() {
            return Ok(Control::Fault(
                TrapKind::DomainError,
                format!(
                    "extern @{} takes {} arguments, got {}",
                    callee,
                    sig.params.len(),
                    args.len()
                ),
            ));
        }
        let f: ExternFn = *f;
        let result = f(&args);
        if let Some(pending) = trap::take_pending() {
            // The helper faulted; any sentinel it returned is dropped.
            if result.is_refcounted() {
                heap::release(result.as_handle());
            }
            return Ok(Control::Fault(pending.kind, pending.message));
        }
        if let Some(r) = instr.result {
            frame.write_temp(r, result, instr.ty, result.is_refcounted());
        } else if result.is_refcounted() {
            heap::release(result.as_handle());
        }
        Ok(Control::Next)
    }
}

impl Drop for Vm<'_> {
    fn drop(&mut self) {
        for &h in &self.owned_globals {
            heap::release(h);
        }
    }
}

fn width_mask(ty: Type) -> u64 {
    match ty {
        Type::I16 => 0xFFFF,
        Type::I32 => 0xFFFF_FFFF,
        _ => u64::MAX,
    }
}

/// Reinterpret the low bits of `v` as a signed value of width `ty`.
fn sign_wrap(v: u64, ty: Type) -> i64 {
    match ty {
        Type::I16 => v as u16 as i16 as i64,
        Type::I32 => v as u32 as i32 as i64,
        _ => v as i64,
    }
}

unsafe fn load_typed(p: *mut u8, ty: Type) -> Slot {
    unsafe {
        match ty {
            Type::I1 => Slot::Bool(p.read() != 0),
            Type::I16 => Slot::Int((p as *const i16).read_unaligned() as i64),
            Type::I32 => Slot::Int((p as *const i32).read_unaligned() as i64),
            Type::I64 => Slot::Int((p as *const i64).read_unaligned()),
            Type::F64 => Slot::Float((p as *const f64).read_unaligned()),
            _ => Slot::Ptr((p as *const *mut u8).read_unaligned()),
        }
    }
}

unsafe fn store_typed(p: *mut u8, ty: Type, v: Slot) {
    unsafe {
        match ty {
            Type::I1 => p.write(v.as_bool() as u8),
            Type::I16 => (p as *mut i16).write_unaligned(v.as_i64() as i16),
            Type::I32 => (p as *mut i32).write_unaligned(v.as_i64() as i32),
            Type::I64 => (p as *mut i64).write_unaligned(v.as_i64()),
            Type::F64 => (p as *mut f64).write_unaligned(v.as_f64()),
            _ => (p as *mut *mut u8).write_unaligned(v.as_handle()),
        }
    }
}

/// One-shot convenience wrapper mirroring the command-line tooling.
pub fn run_module(module: &Module, config: RunConfig) -> Result<i64, VmError> {
    Vm::with_config(module, config).run()
}
