//! Per-call frame storage: the temp table, the handler stack, alloca
//! buffers, and outstanding resume tokens.

use crate::slot::Slot;
use viper_il::{TempId, Type};
use viper_runtime::heap;

/// One entry of the temp table: the value, its declared type, and
/// whether the frame owns a reference to it (block parameters, call
/// results, and trap errors are owned; plain loads are borrowed).
#[derive(Debug, Clone, Copy)]
pub struct TempSlot {
    pub value: Slot,
    pub ty: Type,
    pub owned: bool,
}

/// A function activation.
pub struct Frame {
    /// Function index within the module.
    pub func: usize,
    /// Current block index and instruction cursor.
    pub block: usize,
    pub pc: usize,
    /// Temp table indexed by temp id.
    pub temps: Vec<Option<TempSlot>>,
    /// Active handler block labels, innermost last.
    pub handlers: Vec<String>,
    /// Function-lifetime stack buffers.
    pub allocas: Vec<Box<[u8]>>,
    /// Resume tokens minted for this frame that are still consumable.
    pub tokens: Vec<u64>,
}

impl Frame {
    pub fn new(func: usize, temp_count: usize) -> Frame {
        Frame {
            func,
            block: 0,
            pc: 0,
            temps: vec![None; temp_count],
            handlers: Vec::new(),
            allocas: Vec::new(),
            tokens: Vec::new(),
        }
    }

    /// Write a temp slot, balancing references: an owned refcounted
    /// newcomer was already retained by the caller; an owned refcounted
    /// occupant is released.
    pub fn write_temp(&mut self, id: TempId, value: Slot, ty: Type, owned: bool) {
        let idx = id as usize;
        if idx >= self.temps.len() {
            self.temps.resize(idx + 1, None);
        }
        if let Some(old) = self.temps[idx] {
            if old.owned && old.value.is_refcounted() {
                heap::release(old.value.as_handle());
            }
        }
        self.temps[idx] = Some(TempSlot { value, ty, owned });
    }

    pub fn read_temp(&self, id: TempId) -> Option<TempSlot> {
        self.temps.get(id as usize).copied().flatten()
    }

    /// Release every owned reference; called once on every exit path.
    pub fn teardown(&mut self) {
        for slot in self.temps.iter_mut() {
            if let Some(s) = slot.take() {
                if s.owned && s.value.is_refcounted() {
                    heap::release(s.value.as_handle());
                }
            }
        }
        self.allocas.clear();
        self.tokens.clear();
        self.handlers.clear();
    }

    /// Mint a resume token for a dispatched trap.
    pub fn mint_token(&mut self, id: u64) {
        self.tokens.push(id);
    }

    /// Consume a token; false when it was never minted or already used.
    pub fn consume_token(&mut self, id: u64) -> bool {
        match self.tokens.iter().position(|&t| t == id) {
            Some(i) => {
                self.tokens.swap_remove(i);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_runtime::heap::{refcount, release};
    use viper_runtime::string::str_new;

    #[test]
    fn owned_overwrite_releases() {
        let mut f = Frame::new(0, 2);
        let a = str_new("a");
        let b = str_new("b");
        viper_runtime::heap::retain(a);
        f.write_temp(0, Slot::Str(a), Type::Str, true);
        assert_eq!(refcount(a), 2);
        viper_runtime::heap::retain(b);
        f.write_temp(0, Slot::Str(b), Type::Str, true);
        assert_eq!(refcount(a), 1);
        f.teardown();
        assert_eq!(refcount(b), 1);
        release(a);
        release(b);
    }

    #[test]
    fn borrowed_slots_are_left_alone() {
        let mut f = Frame::new(0, 1);
        let s = str_new("borrowed");
        f.write_temp(0, Slot::Str(s), Type::Str, false);
        f.teardown();
        assert_eq!(refcount(s), 1);
        release(s);
    }

    #[test]
    fn tokens_consume_once() {
        let mut f = Frame::new(0, 0);
        f.mint_token(7);
        assert!(f.consume_token(7));
        assert!(!f.consume_token(7));
        assert!(!f.consume_token(8));
    }
}
