// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Dominator tree and dominance frontiers.
//!
//! Uses the Cooper-Harvey-Kennedy iterative scheme: immediate dominators
//! converge over reverse post-order passes with a two-finger intersect,
//! then frontiers fall out of a walk from each join block's predecessors
//! up to its immediate dominator. All edge kinds participate; exceptional
//! edges shape dominance exactly like sequential ones.
//!
//! Blocks unreachable from entry get no immediate dominator and appear in
//! no frontier. Phi insertion and renaming skip them.

use std::collections::BTreeSet;

use super::{BlockId, Graph};

/// Dominance information for one graph.
#[derive(Debug)]
pub struct Dominators {
    idom: Vec<Option<BlockId>>,
    rpo: Vec<BlockId>,
    rpo_index: Vec<usize>,
    frontier: Vec<Vec<BlockId>>,
    children: Vec<Vec<BlockId>>,
}

impl Dominators {
    #[must_use]
    pub fn compute(graph: &Graph) -> Self {
        let n = graph.len();
        let rpo = reverse_post_order(graph);
        let mut rpo_index = vec![usize::MAX; n];
        for (i, &b) in rpo.iter().enumerate() {
            rpo_index[b.index()] = i;
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        idom[graph.entry().index()] = Some(graph.entry());
        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &p in &graph.block(b).preds {
                    if idom[p.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(current) => intersect(&idom, &rpo_index, p, current),
                    });
                }
                if let Some(winner) = new_idom {
                    if idom[b.index()] != Some(winner) {
                        idom[b.index()] = Some(winner);
                        changed = true;
                    }
                }
            }
        }

        let mut frontier: Vec<Vec<BlockId>> = vec![Vec::new(); n];
        for &b in &rpo {
            let preds: Vec<BlockId> = graph
                .block(b)
                .preds
                .iter()
                .copied()
                .filter(|p| idom[p.index()].is_some())
                .collect();
            if preds.len() < 2 {
                continue;
            }
            let Some(target_idom) = idom[b.index()] else {
                continue;
            };
            for p in preds {
                let mut runner = p;
                while runner != target_idom {
                    if !frontier[runner.index()].contains(&b) {
                        frontier[runner.index()].push(b);
                    }
                    match idom[runner.index()] {
                        Some(next) if next != runner => runner = next,
                        _ => break,
                    }
                }
            }
        }

        let mut children: Vec<Vec<BlockId>> = vec![Vec::new(); n];
        for &b in rpo.iter().skip(1) {
            if let Some(parent) = idom[b.index()] {
                children[parent.index()].push(b);
            }
        }

        Dominators {
            idom,
            rpo,
            rpo_index,
            frontier,
            children,
        }
    }

    /// The immediate dominator. Entry is its own; unreachable blocks have
    /// none.
    #[must_use]
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom[block.index()]
    }

    /// Reachable blocks in reverse post-order.
    #[must_use]
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    #[must_use]
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo_index[block.index()] != usize::MAX
    }

    /// The dominance frontier of `block`.
    #[must_use]
    pub fn frontier(&self, block: BlockId) -> &[BlockId] {
        &self.frontier[block.index()]
    }

    /// The block's children in the dominator tree, in reverse post-order.
    #[must_use]
    pub fn children(&self, block: BlockId) -> &[BlockId] {
        &self.children[block.index()]
    }

    /// Does `a` dominate `b`? Every block dominates itself.
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(b) {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom[current.index()] {
                Some(parent) if parent != current => current = parent,
                _ => return false,
            }
        }
    }

    /// The iterated dominance frontier of a set of blocks, where phi
    /// functions go.
    #[must_use]
    pub fn iterated_frontier(&self, blocks: &BTreeSet<BlockId>) -> BTreeSet<BlockId> {
        let mut result = BTreeSet::new();
        let mut work: Vec<BlockId> = blocks.iter().copied().collect();
        while let Some(b) = work.pop() {
            for &f in self.frontier(b) {
                if result.insert(f) {
                    work.push(f);
                }
            }
        }
        result
    }
}

fn reverse_post_order(graph: &Graph) -> Vec<BlockId> {
    let n = graph.len();
    let mut post = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    let mut stack: Vec<(BlockId, usize)> = vec![(graph.entry(), 0)];
    visited[graph.entry().index()] = true;
    while let Some(&(block, idx)) = stack.last() {
        let succs = &graph.block(block).succs;
        if idx < succs.len() {
            let top = stack.len() - 1;
            stack[top].1 += 1;
            let (next, _) = succs[idx];
            if !visited[next.index()] {
                visited[next.index()] = true;
                stack.push((next, 0));
            }
        } else {
            post.push(block);
            stack.pop();
        }
    }
    post.reverse();
    post
}

fn intersect(
    idom: &[Option<BlockId>],
    rpo_index: &[usize],
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while rpo_index[a.index()] > rpo_index[b.index()] {
            match idom[a.index()] {
                Some(next) => a = next,
                None => return b,
            }
        }
        while rpo_index[b.index()] > rpo_index[a.index()] {
            match idom[b.index()] {
                Some(next) => b = next,
                None => return a,
            }
        }
    }
    a
}
