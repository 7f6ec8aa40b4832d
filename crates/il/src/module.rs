//! The IL entity tree: `Module` → `Function` → `Block` → `Instr`.
//!
//! All of this is passive data. Construction goes through
//! [`crate::build::IrBuilder`] or the textual parser; inspection is plain
//! field access and the lookup helpers below.

use crate::instr::Instr;
use crate::types::Type;
use crate::value::{TempId, Value};

/// A block parameter: an SSA-style formal filled by branch arguments from
/// predecessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub id: TempId,
    pub ty: Type,
}

/// A function parameter. Parameters are bound to preassigned temp ids
/// (0..n in declaration order); the entry block carries no block params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionParam {
    pub name: String,
    pub ty: Type,
    pub id: TempId,
}

/// A basic block. `terminated` is true iff the last instruction is a
/// terminator; the builder maintains it and the verifier re-checks it.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub params: Vec<Param>,
    pub instructions: Vec<Instr>,
    pub terminated: bool,
}

impl Block {
    pub fn new(label: impl Into<String>) -> Block {
        Block {
            label: label.into(),
            params: Vec::new(),
            instructions: Vec::new(),
            terminated: false,
        }
    }

    /// The terminator, when the block is well-formed.
    pub fn terminator(&self) -> Option<&Instr> {
        self.instructions.last().filter(|i| i.is_terminator())
    }
}

/// A function. `blocks[0]` is the entry block.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ret_type: Type,
    pub params: Vec<FunctionParam>,
    pub blocks: Vec<Block>,
    /// High-water mark for temp ids; the builder reserves monotonically.
    pub next_temp: TempId,
}

impl Function {
    pub fn new(name: impl Into<String>, ret_type: Type) -> Function {
        Function {
            name: name.into(),
            ret_type,
            params: Vec::new(),
            blocks: Vec::new(),
            next_temp: 0,
        }
    }

    pub fn entry(&self) -> Option<&Block> {
        self.blocks.first()
    }

    pub fn block_index(&self, label: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.label == label)
    }

    pub fn block(&self, label: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.label == label)
    }
}

/// Declaration of a native function callable from IL. Runtime helpers all
/// begin with `rt_`; the verifier checks those against a built-in table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extern {
    pub name: String,
    pub ret_type: Type,
    pub params: Vec<Type>,
}

impl Extern {
    pub fn new(name: impl Into<String>, ret_type: Type, params: Vec<Type>) -> Extern {
        Extern {
            name: name.into(),
            ret_type,
            params,
        }
    }
}

/// Process-lifetime storage, initialized before `main` runs. Globals are
/// read-only at the IL level; mutation goes through runtime objects.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub init: GlobalInit,
}

/// Initial value of a global.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalInit {
    Str(String),
    Value(Value),
}

/// A whole compilation unit: externs, globals, and functions. Names are
/// unique within each category and the extern/function namespaces do not
/// overlap; the verifier enforces both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub externs: Vec<Extern>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn extern_decl(&self, name: &str) -> Option<&Extern> {
        self.externs.iter().find(|e| e.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{Instr, Opcode};

    #[test]
    fn block_terminator_lookup() {
        let mut b = Block::new("entry");
        assert!(b.terminator().is_none());
        b.instructions.push(Instr::new(Opcode::Ret, Type::Void));
        b.terminated = true;
        assert!(b.terminator().is_some());
    }

    #[test]
    fn module_lookups() {
        let mut m = Module::new();
        m.functions.push(Function::new("main", Type::I64));
        m.externs.push(Extern::new("rt_print_i64", Type::Void, vec![Type::I64]));
        assert!(m.function("main").is_some());
        assert!(m.function("other").is_none());
        assert!(m.extern_decl("rt_print_i64").is_some());
    }
}
