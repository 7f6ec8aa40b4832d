//! IR construction.
//!
//! `IrBuilder` is the one write path for modules: it creates functions with
//! typed parameters, appends blocks with typed block-parameter lists,
//! reserves fresh temp ids monotonically within a function, and appends
//! instructions at an insert point. Appending past a terminator is a
//! programming error and panics; malformed modules that slip through are
//! caught by the verifier.

use crate::instr::{Instr, Opcode, SourceLoc};
use crate::module::{Block, Function, FunctionParam, Module, Param};
use crate::types::Type;
use crate::value::{TempId, Value};

pub struct IrBuilder<'m> {
    module: &'m mut Module,
    cur_func: Option<usize>,
    insert_block: Option<usize>,
}

impl<'m> IrBuilder<'m> {
    pub fn new(module: &'m mut Module) -> IrBuilder<'m> {
        IrBuilder {
            module,
            cur_func: None,
            insert_block: None,
        }
    }

    /// Begin a new function; its parameters are bound to temp ids `0..n`.
    /// Returns the function's index within the module.
    pub fn start_function(
        &mut self,
        name: impl Into<String>,
        ret_type: Type,
        params: Vec<(String, Type)>,
    ) -> usize {
        let mut f = Function::new(name, ret_type);
        for (i, (pname, pty)) in params.into_iter().enumerate() {
            f.params.push(FunctionParam {
                name: pname,
                ty: pty,
                id: i as TempId,
            });
        }
        f.next_temp = f.params.len() as TempId;
        self.module.functions.push(f);
        let idx = self.module.functions.len() - 1;
        self.cur_func = Some(idx);
        self.insert_block = None;
        idx
    }

    /// Append a parameterless block to the current function.
    pub fn create_block(&mut self, label: impl Into<String>) -> usize {
        let f = self.cur_func_mut();
        f.blocks.push(Block::new(label));
        f.blocks.len() - 1
    }

    /// Append a block with typed parameters; returns the block index and
    /// the freshly reserved temp ids backing each parameter.
    pub fn create_block_with_params(
        &mut self,
        label: impl Into<String>,
        param_types: Vec<Type>,
    ) -> (usize, Vec<TempId>) {
        let f = self.cur_func_mut();
        let mut block = Block::new(label);
        let mut ids = Vec::with_capacity(param_types.len());
        for ty in param_types {
            let id = f.next_temp;
            f.next_temp += 1;
            block.params.push(Param { id, ty });
            ids.push(id);
        }
        f.blocks.push(block);
        (f.blocks.len() - 1, ids)
    }

    /// Direct the next `push` calls at the given block.
    pub fn set_insert_point(&mut self, block: usize) {
        let f = self.cur_func();
        assert!(block < f.blocks.len(), "insert point out of range");
        self.insert_block = Some(block);
    }

    /// Reserve a fresh temp id in the current function.
    pub fn reserve_temp_id(&mut self) -> TempId {
        let f = self.cur_func_mut();
        let id = f.next_temp;
        f.next_temp += 1;
        id
    }

    /// Append an instruction at the insert point. Marks the block
    /// terminated when a terminator is pushed.
    pub fn push(&mut self, instr: Instr) {
        let block = self.insert_block.expect("no insert point set");
        let is_term = instr.is_terminator();
        let f = self.cur_func_mut();
        let b = &mut f.blocks[block];
        assert!(!b.terminated, "appending to a terminated block");
        b.instructions.push(instr);
        if is_term {
            b.terminated = true;
        }
    }

    /// Emit a two-operand instruction producing a fresh temp.
    pub fn emit_bin(
        &mut self,
        op: Opcode,
        ty: Type,
        lhs: Value,
        rhs: Value,
        loc: SourceLoc,
    ) -> TempId {
        let result = self.reserve_temp_id();
        let mut i = Instr::new(op, ty);
        i.result = Some(result);
        i.operands = vec![lhs, rhs];
        i.loc = loc;
        self.push(i);
        result
    }

    /// Emit a one-operand instruction producing a fresh temp.
    pub fn emit_un(&mut self, op: Opcode, ty: Type, v: Value, loc: SourceLoc) -> TempId {
        let result = self.reserve_temp_id();
        let mut i = Instr::new(op, ty);
        i.result = Some(result);
        i.operands = vec![v];
        i.loc = loc;
        self.push(i);
        result
    }

    /// Emit a direct call; returns the result temp for non-void callees.
    pub fn emit_call(
        &mut self,
        callee: impl Into<String>,
        ret_type: Type,
        args: Vec<Value>,
        loc: SourceLoc,
    ) -> Option<TempId> {
        let result = if ret_type == Type::Void {
            None
        } else {
            Some(self.reserve_temp_id())
        };
        let mut i = Instr::new(Opcode::Call, ret_type);
        i.result = result;
        i.operands = args;
        i.callee = Some(callee.into());
        i.loc = loc;
        self.push(i);
        result
    }

    pub fn emit_br(&mut self, target: impl Into<String>, args: Vec<Value>, loc: SourceLoc) {
        let mut i = Instr::new(Opcode::Br, Type::Void);
        i.labels = vec![target.into()];
        i.operands = args;
        i.loc = loc;
        self.push(i);
    }

    /// `cbr` flattens its branch arguments as `[cond, true_args.., false_args..]`.
    #[allow(clippy::too_many_arguments)]
    pub fn emit_cbr(
        &mut self,
        cond: Value,
        true_target: impl Into<String>,
        true_args: Vec<Value>,
        false_target: impl Into<String>,
        false_args: Vec<Value>,
        loc: SourceLoc,
    ) {
        let mut i = Instr::new(Opcode::CBr, Type::Void);
        i.labels = vec![true_target.into(), false_target.into()];
        i.operands = Vec::with_capacity(1 + true_args.len() + false_args.len());
        i.operands.push(cond);
        i.operands.extend(true_args);
        i.operands.extend(false_args);
        i.loc = loc;
        self.push(i);
    }

    pub fn emit_ret(&mut self, value: Option<Value>, loc: SourceLoc) {
        let mut i = Instr::new(Opcode::Ret, Type::Void);
        if let Some(v) = value {
            i.operands.push(v);
        }
        i.loc = loc;
        self.push(i);
    }

    pub fn emit_trap(&mut self, loc: SourceLoc) {
        let mut i = Instr::new(Opcode::Trap, Type::Void);
        i.loc = loc;
        self.push(i);
    }

    pub fn emit_eh_push(&mut self, handler: impl Into<String>, loc: SourceLoc) {
        let mut i = Instr::new(Opcode::EhPush, Type::Void);
        i.labels = vec![handler.into()];
        i.loc = loc;
        self.push(i);
    }

    pub fn emit_eh_pop(&mut self, loc: SourceLoc) {
        let mut i = Instr::new(Opcode::EhPop, Type::Void);
        i.loc = loc;
        self.push(i);
    }

    pub fn emit_eh_entry(&mut self, loc: SourceLoc) {
        let mut i = Instr::new(Opcode::EhEntry, Type::Void);
        i.loc = loc;
        self.push(i);
    }

    pub fn emit_resume(&mut self, tok: Value, continuation: impl Into<String>, loc: SourceLoc) {
        let mut i = Instr::new(Opcode::ResumeLabel, Type::Void);
        i.operands = vec![tok];
        i.labels = vec![continuation.into()];
        i.loc = loc;
        self.push(i);
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    fn cur_func(&self) -> &Function {
        let idx = self.cur_func.expect("no current function");
        &self.module.functions[idx]
    }

    fn cur_func_mut(&mut self) -> &mut Function {
        let idx = self.cur_func.expect("no current function");
        &mut self.module.functions[idx]
    }
}
