//! CFG utilities: successors, predecessors, traversal orders.
//!
//! Results are computed on demand from the IL; nothing is cached. Blocks
//! are identified by their index within the owning function.

mod dominators;

pub use dominators::{DomTree, PostDomTree};

use crate::instr::Opcode;
use crate::module::Function;

/// Successor block indices, read off the block's terminator labels.
/// `ret` and `trap` end the function, so they contribute no edges.
pub fn successors(f: &Function, block: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let Some(term) = f.blocks[block].instructions.last() else {
        return out;
    };
    if !matches!(term.op, Opcode::Br | Opcode::CBr | Opcode::ResumeLabel) {
        return out;
    }
    for label in &term.labels {
        if let Some(idx) = f.block_index(label) {
            out.push(idx);
        }
    }
    out
}

/// Predecessor lists for every block, computed by one scan over the
/// function.
pub fn predecessors(f: &Function) -> Vec<Vec<usize>> {
    let mut preds = vec![Vec::new(); f.blocks.len()];
    for b in 0..f.blocks.len() {
        for s in successors(f, b) {
            if !preds[s].contains(&b) {
                preds[s].push(b);
            }
        }
    }
    preds
}

/// Iterative DFS post-order from the entry block; each reachable block
/// appears exactly once and the entry block is last.
pub fn post_order(f: &Function) -> Vec<usize> {
    let mut out = Vec::new();
    if f.blocks.is_empty() {
        return out;
    }

    struct Frame {
        block: usize,
        idx: usize,
        succ: Vec<usize>,
    }

    let mut visited = vec![false; f.blocks.len()];
    let mut stack = vec![Frame {
        block: 0,
        idx: 0,
        succ: successors(f, 0),
    }];
    visited[0] = true;

    while let Some(top) = stack.last_mut() {
        if top.idx < top.succ.len() {
            let next = top.succ[top.idx];
            top.idx += 1;
            if !visited[next] {
                visited[next] = true;
                stack.push(Frame {
                    block: next,
                    idx: 0,
                    succ: successors(f, next),
                });
            }
        } else {
            out.push(top.block);
            stack.pop();
        }
    }
    out
}

/// Reverse post-order; the entry block is first.
pub fn reverse_post_order(f: &Function) -> Vec<usize> {
    let mut po = post_order(f);
    po.reverse();
    po
}

/// True when the block's terminator leaves the function: a return or an
/// unhandled trap. These blocks feed the post-dominator virtual exit.
pub fn is_exit_block(f: &Function, block: usize) -> bool {
    matches!(
        f.blocks[block].instructions.last().map(|i| i.op),
        Some(Opcode::Ret) | Some(Opcode::Trap)
    )
}
