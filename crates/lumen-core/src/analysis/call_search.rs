// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Call site search over a method graph.
//!
//! Structural queries: every site is reported whether or not the block
//! it sits in is reachable. Callers that only care about live sites
//! filter on the block's `reachable` flag.

use crate::control_flow::{BlockId, Graph, Inst};
use crate::tree::NodeId;

/// One located instruction inside a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSite {
    pub block: BlockId,
    /// Index into the block's instruction list.
    pub index: usize,
    pub node: NodeId,
}

/// All sends of `name`, in block then instruction order.
#[must_use]
pub fn find_sends(graph: &Graph, name: &str) -> Vec<SendSite> {
    let mut out = Vec::new();
    for block in graph.block_ids() {
        for (index, inst) in graph.block(block).insts.iter().enumerate() {
            if let Inst::Call { name: called, node, .. } = inst {
                if *called == name {
                    out.push(SendSite { block, index, node: *node });
                }
            }
        }
    }
    out
}

/// All `super` sites.
#[must_use]
pub fn find_supers(graph: &Graph) -> Vec<SendSite> {
    let mut out = Vec::new();
    for block in graph.block_ids() {
        for (index, inst) in graph.block(block).insts.iter().enumerate() {
            if let Inst::Super { node, .. } = inst {
                out.push(SendSite { block, index, node: *node });
            }
        }
    }
    out
}

/// All `yield` sites.
#[must_use]
pub fn find_yields(graph: &Graph) -> Vec<SendSite> {
    let mut out = Vec::new();
    for block in graph.block_ids() {
        for (index, inst) in graph.block(block).insts.iter().enumerate() {
            if let Inst::Yield { node, .. } = inst {
                out.push(SendSite { block, index, node: *node });
            }
        }
    }
    out
}

/// All `raise` sites.
#[must_use]
pub fn find_raises(graph: &Graph) -> Vec<SendSite> {
    let mut out = Vec::new();
    for block in graph.block_ids() {
        for (index, inst) in graph.block(block).insts.iter().enumerate() {
            if let Inst::Raise { node, .. } = inst {
                out.push(SendSite { block, index, node: *node });
            }
        }
    }
    out
}
