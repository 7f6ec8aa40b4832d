//! Dominator and post-dominator trees.
//!
//! Both use the Cooper-Harvey-Kennedy data-flow algorithm: iterate the
//! idom intersection over reverse post-order until fixed point. The
//! post-dominator tree is the dominator tree of the reversed CFG with a
//! synthetic virtual exit joining every block whose terminator is a return
//! or unhandled trap; exit blocks have the virtual exit (`None`) as their
//! immediate post-dominator.

use super::{is_exit_block, predecessors, successors};
use crate::module::Function;

/// Dominator tree over a function's CFG. The entry block's immediate
/// dominator is the sentinel `None`; unreachable blocks are absent.
#[derive(Debug)]
pub struct DomTree {
    idom: Vec<Option<usize>>,
    reachable: Vec<bool>,
}

impl DomTree {
    pub fn compute(f: &Function) -> DomTree {
        DomTree::compute_from(f.blocks.len(), |b| successors(f, b))
    }

    /// Dominator tree over an arbitrary edge function rooted at block 0.
    /// The verifier uses this with exceptional (`eh.push`) edges added so
    /// handler bodies get dominance-checked too.
    pub fn compute_from(n: usize, succ: impl Fn(usize) -> Vec<usize>) -> DomTree {
        let mut idom: Vec<Option<usize>> = vec![None; n];
        let mut reachable = vec![false; n];
        if n == 0 {
            return DomTree { idom, reachable };
        }

        // Iterative DFS post-order over the supplied edges.
        let mut po = Vec::new();
        let mut visited = vec![false; n];
        let mut stack = vec![(0usize, 0usize, succ(0))];
        visited[0] = true;
        while let Some(top) = stack.last_mut() {
            if top.1 < top.2.len() {
                let next = top.2[top.1];
                top.1 += 1;
                if !visited[next] {
                    visited[next] = true;
                    let s = succ(next);
                    stack.push((next, 0, s));
                }
            } else {
                po.push(top.0);
                stack.pop();
            }
        }
        po.reverse();
        let rpo = po;

        let mut order = vec![usize::MAX; n];
        for (i, &b) in rpo.iter().enumerate() {
            order[b] = i;
            reachable[b] = true;
        }
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        for b in 0..n {
            if !reachable[b] {
                continue;
            }
            for s in succ(b) {
                if !preds[s].contains(&b) {
                    preds[s].push(b);
                }
            }
        }

        // idom[entry] stays None (sentinel); processed[] tracks which
        // blocks have an initialized idom so the intersect walk is safe.
        let mut processed = vec![false; n];
        processed[rpo[0]] = true;

        let intersect = |idom: &[Option<usize>], order: &[usize], mut b1: usize, mut b2: usize| {
            while b1 != b2 {
                while order[b1] > order[b2] {
                    b1 = idom[b1].expect("intersect walked past the entry");
                }
                while order[b2] > order[b1] {
                    b2 = idom[b2].expect("intersect walked past the entry");
                }
            }
            b1
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom = None;
                for &p in &preds[b] {
                    if !processed[p] {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, &order, p, cur),
                    });
                }
                let Some(new_idom) = new_idom else { continue };
                if !processed[b] || idom[b] != Some(new_idom) {
                    idom[b] = Some(new_idom);
                    processed[b] = true;
                    changed = true;
                }
            }
        }

        DomTree { idom, reachable }
    }

    /// Immediate dominator; `None` for the entry block and for blocks
    /// unreachable from entry.
    pub fn immediate_dominator(&self, block: usize) -> Option<usize> {
        self.idom.get(block).copied().flatten()
    }

    pub fn is_reachable(&self, block: usize) -> bool {
        self.reachable.get(block).copied().unwrap_or(false)
    }

    /// A dominates B iff every path from entry to B passes through A.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if a == b {
            return true;
        }
        if !self.is_reachable(b) {
            return false;
        }
        let mut cur = self.idom[b];
        while let Some(x) = cur {
            if x == a {
                return true;
            }
            cur = self.idom[x];
        }
        false
    }
}

/// Post-dominator tree: the dominator tree of the reversed CFG rooted at a
/// virtual exit. `immediate_post_dominator` returns `None` both for exit
/// blocks (their ipostdom is the virtual exit) and for blocks that cannot
/// reach an exit.
#[derive(Debug)]
pub struct PostDomTree {
    ipdom: Vec<Option<usize>>,
    reaches_exit: Vec<bool>,
}

impl PostDomTree {
    pub fn compute(f: &Function) -> PostDomTree {
        let n = f.blocks.len();
        let mut ipdom: Vec<Option<usize>> = vec![None; n];
        let mut reaches_exit = vec![false; n];
        if n == 0 {
            return PostDomTree { ipdom, reaches_exit };
        }

        // Node n is the virtual exit. Reversed-graph successors walk
        // original predecessors; reversed-graph predecessors walk original
        // successors (plus the virtual exit for Ret/Trap blocks).
        let virt = n;
        let preds = predecessors(f);
        let exits: Vec<usize> = (0..n).filter(|&b| is_exit_block(f, b)).collect();

        let succ_rev = |b: usize| -> Vec<usize> {
            if b == virt {
                exits.clone()
            } else {
                preds[b].clone()
            }
        };

        // RPO of the reversed graph from the virtual exit.
        let mut po = Vec::new();
        let mut visited = vec![false; n + 1];
        let mut stack = vec![(virt, 0usize, succ_rev(virt))];
        visited[virt] = true;
        while let Some(top) = stack.last_mut() {
            if top.1 < top.2.len() {
                let next = top.2[top.1];
                top.1 += 1;
                if !visited[next] {
                    visited[next] = true;
                    let s = succ_rev(next);
                    stack.push((next, 0, s));
                }
            } else {
                po.push(top.0);
                stack.pop();
            }
        }
        po.reverse();
        let rpo = po;

        let mut order = vec![usize::MAX; n + 1];
        for (i, &b) in rpo.iter().enumerate() {
            order[b] = i;
            if b != virt {
                reaches_exit[b] = true;
            }
        }

        // Reversed-graph predecessors of b are the original successors of
        // b, plus the virtual exit for Ret/Trap blocks.
        let mut preds_rev: Vec<Vec<usize>> = vec![Vec::new(); n + 1];
        for b in 0..n {
            for s in successors(f, b) {
                preds_rev[b].push(s);
            }
            if is_exit_block(f, b) {
                preds_rev[b].push(virt);
            }
        }

        let mut idom: Vec<Option<usize>> = vec![None; n + 1];
        let mut processed = vec![false; n + 1];
        processed[virt] = true;

        let intersect = |idom: &[Option<usize>], order: &[usize], mut b1: usize, mut b2: usize| {
            while b1 != b2 {
                while order[b1] > order[b2] {
                    b1 = idom[b1].expect("intersect walked past the virtual exit");
                }
                while order[b2] > order[b1] {
                    b2 = idom[b2].expect("intersect walked past the virtual exit");
                }
            }
            b1
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom = None;
                for &p in &preds_rev[b] {
                    if !processed[p] {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, &order, p, cur),
                    });
                }
                let Some(ni) = new_idom else { continue };
                if !processed[b] || idom[b] != Some(ni) {
                    idom[b] = Some(ni);
                    processed[b] = true;
                    changed = true;
                }
            }
        }

        for b in 0..n {
            ipdom[b] = match idom[b] {
                Some(x) if x != virt => Some(x),
                _ => None,
            };
        }

        PostDomTree { ipdom, reaches_exit }
    }

    /// Immediate post-dominator; `None` means the virtual exit.
    pub fn immediate_post_dominator(&self, block: usize) -> Option<usize> {
        self.ipdom.get(block).copied().flatten()
    }

    /// A post-dominates B iff every path from B to any exit passes
    /// through A.
    pub fn post_dominates(&self, a: usize, b: usize) -> bool {
        if a == b {
            return true;
        }
        if !self.reaches_exit.get(b).copied().unwrap_or(false) {
            return false;
        }
        let mut cur = self.ipdom[b];
        while let Some(x) = cur {
            if x == a {
                return true;
            }
            cur = self.ipdom[x];
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::IrBuilder;
    use crate::instr::SourceLoc;
    use crate::module::Module;
    use crate::types::Type;
    use crate::value::Value;

    fn chain() -> Module {
        // entry -> a -> b -> exit(ret)
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("chain", Type::Void, vec![]);
        let entry = b.create_block("entry");
        let ba = b.create_block("a");
        let bb = b.create_block("b");
        let bexit = b.create_block("exit");
        b.set_insert_point(entry);
        b.emit_br("a", vec![], SourceLoc::default());
        b.set_insert_point(ba);
        b.emit_br("b", vec![], SourceLoc::default());
        b.set_insert_point(bb);
        b.emit_br("exit", vec![], SourceLoc::default());
        b.set_insert_point(bexit);
        b.emit_ret(None, SourceLoc::default());
        let _ = (entry, ba, bb, bexit);
        m
    }

    fn diamond() -> Module {
        // entry -> {left, right} -> merge(ret)
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("d", Type::Void, vec![]);
        let entry = b.create_block("entry");
        let left = b.create_block("left");
        let right = b.create_block("right");
        let merge = b.create_block("merge");
        b.set_insert_point(entry);
        b.emit_cbr(
            Value::const_bool(true),
            "left",
            vec![],
            "right",
            vec![],
            SourceLoc::default(),
        );
        b.set_insert_point(left);
        b.emit_br("merge", vec![], SourceLoc::default());
        b.set_insert_point(right);
        b.emit_br("merge", vec![], SourceLoc::default());
        b.set_insert_point(merge);
        b.emit_ret(None, SourceLoc::default());
        let _ = (entry, left, right, merge);
        m
    }

    #[test]
    fn chain_dominators() {
        let m = chain();
        let f = &m.functions[0];
        let dt = DomTree::compute(f);
        assert_eq!(dt.immediate_dominator(0), None);
        assert_eq!(dt.immediate_dominator(1), Some(0));
        assert_eq!(dt.immediate_dominator(2), Some(1));
        assert_eq!(dt.immediate_dominator(3), Some(2));
        assert!(dt.dominates(0, 3));
        assert!(dt.dominates(1, 2));
        assert!(!dt.dominates(2, 1));
    }

    #[test]
    fn chain_post_dominators() {
        let m = chain();
        let f = &m.functions[0];
        let pdt = PostDomTree::compute(f);
        // Exit block's ipostdom is the virtual exit.
        assert_eq!(pdt.immediate_post_dominator(3), None);
        assert_eq!(pdt.immediate_post_dominator(2), Some(3));
        assert_eq!(pdt.immediate_post_dominator(1), Some(2));
        assert_eq!(pdt.immediate_post_dominator(0), Some(1));
        assert!(pdt.post_dominates(3, 0));
        assert!(pdt.post_dominates(2, 1));
        assert!(!pdt.post_dominates(1, 2));
    }

    #[test]
    fn diamond_dominators() {
        let m = diamond();
        let f = &m.functions[0];
        let dt = DomTree::compute(f);
        // Merge's idom is entry, not either side of the diamond.
        assert_eq!(dt.immediate_dominator(3), Some(0));
        assert!(dt.dominates(0, 3));
        assert!(!dt.dominates(1, 3));
        assert!(!dt.dominates(2, 3));
    }

    #[test]
    fn diamond_post_dominators() {
        let m = diamond();
        let f = &m.functions[0];
        let pdt = PostDomTree::compute(f);
        // Merge post-dominates entry; the arms do not post-dominate each
        // other.
        assert!(pdt.post_dominates(3, 0));
        assert!(!pdt.post_dominates(1, 2));
        assert!(!pdt.post_dominates(2, 1));
        assert_eq!(pdt.immediate_post_dominator(0), Some(3));
    }

    #[test]
    fn two_exits_share_only_the_virtual_exit() {
        // entry -> {left(ret), right(ret)}
        let mut m = Module::new();
        let mut b = IrBuilder::new(&mut m);
        b.start_function("two", Type::Void, vec![]);
        let entry = b.create_block("entry");
        let left = b.create_block("left");
        let right = b.create_block("right");
        b.set_insert_point(entry);
        b.emit_cbr(
            Value::const_bool(true),
            "left",
            vec![],
            "right",
            vec![],
            SourceLoc::default(),
        );
        b.set_insert_point(left);
        b.emit_ret(None, SourceLoc::default());
        b.set_insert_point(right);
        b.emit_ret(None, SourceLoc::default());
        let _ = (entry, left, right);

        let f = &m.functions[0];
        let pdt = PostDomTree::compute(f);
        assert_eq!(pdt.immediate_post_dominator(1), None);
        assert_eq!(pdt.immediate_post_dominator(2), None);
        // No concrete block post-dominates entry.
        assert_eq!(pdt.immediate_post_dominator(0), None);
        assert!(!pdt.post_dominates(1, 0));
        assert!(!pdt.post_dominates(2, 0));
    }
}
