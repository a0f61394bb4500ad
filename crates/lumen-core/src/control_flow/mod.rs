// Copyright 2026 James Casey
// SPDX-License-Identifier: Apache-2.0

//! Per-method control flow graphs.
//!
//! Each analyzable method body is lowered to a [`Graph`] of basic blocks
//! over a small instruction set. Every graph has three distinguished
//! blocks: `entry`, `exit` (the target of every return), and
//! `exception_exit` (where an exception leaves the method when no rescue
//! catches it). Exceptional control flow is modelled at block granularity:
//! a block containing an instruction that may raise gets one `Exception`
//! edge to the innermost handler.
//!
//! Construction is per-method and failure is isolated per-method: a body
//! the builder cannot lower yields a [`GraphError`] and the method is
//! marked unanalyzable, while every other method proceeds normally.

mod builder;
mod dominance;
mod ssa;

pub use builder::build_method;
pub use dominance::Dominators;
pub use ssa::{convert_to_ssa, verify_ssa};

use ecow::EcoString;
use thiserror::Error;

use crate::scope::BindingId;
use crate::tree::{ConstValue, NodeId, NodeKind};
use crate::types::Ty;

/// Index of a basic block in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        BlockId(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Sequential,
    BranchTrue,
    BranchFalse,
    /// An exception raised in the source block reaches the target.
    Exception,
    /// Exception dispatch entering one rescue arm.
    RescueHandler,
    /// Entry into an ensure block.
    Ensure,
    /// The back edge of a loop.
    LoopBack,
}

/// An SSA variable: a binding plus a version. Version 0 means "not yet
/// versioned": before conversion every variable is version 0, and after
/// conversion a version-0 read of a local is a read before any write,
/// which yields nil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var {
    pub binding: BindingId,
    pub version: u32,
}

impl Var {
    #[must_use]
    pub fn unversioned(binding: BindingId) -> Self {
        Var {
            binding,
            version: 0,
        }
    }
}

/// A value an instruction reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var(Var),
    Const(ConstValue),
    SelfVal,
    /// The i-th method argument.
    Arg(u32),
    /// A value the builder could not track, with the best type it knows.
    Opaque(Ty),
}

/// One instruction. Calls, supers, yields and constructions may raise;
/// everything else cannot.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Assign {
        dst: Var,
        src: Operand,
        node: NodeId,
    },
    /// Collection literal with non-constant elements.
    Construct {
        dst: Var,
        class: EcoString,
        args: Vec<Operand>,
        node: NodeId,
    },
    Call {
        dst: Var,
        recv: Operand,
        name: EcoString,
        args: Vec<Operand>,
        node: NodeId,
    },
    Super {
        dst: Var,
        args: Vec<Operand>,
        node: NodeId,
    },
    Yield {
        dst: Var,
        args: Vec<Operand>,
        node: NodeId,
    },
    /// Branch condition; the block's `BranchTrue`/`BranchFalse` edges
    /// dispatch on it.
    Test {
        cond: Operand,
        node: NodeId,
    },
    Return {
        value: Operand,
        node: NodeId,
    },
    Raise {
        value: Option<Operand>,
        node: NodeId,
    },
    Phi {
        dst: Var,
        /// One argument per walked predecessor.
        args: Vec<(BlockId, Var)>,
        node: Option<NodeId>,
    },
}

impl Inst {
    /// The variable this instruction writes, if any.
    #[must_use]
    pub fn dst(&self) -> Option<Var> {
        match self {
            Inst::Assign { dst, .. }
            | Inst::Construct { dst, .. }
            | Inst::Call { dst, .. }
            | Inst::Super { dst, .. }
            | Inst::Yield { dst, .. }
            | Inst::Phi { dst, .. } => Some(*dst),
            Inst::Test { .. } | Inst::Return { .. } | Inst::Raise { .. } => None,
        }
    }

    /// May executing this instruction raise?
    #[must_use]
    pub fn may_raise(&self) -> bool {
        matches!(
            self,
            Inst::Call { .. }
                | Inst::Super { .. }
                | Inst::Yield { .. }
                | Inst::Construct { .. }
                | Inst::Raise { .. }
        )
    }

    /// Visits every operand this instruction reads. Phi arguments are
    /// not visited; they are reads at the tail of the predecessor, not
    /// here.
    pub fn for_each_operand(&self, mut f: impl FnMut(&Operand)) {
        match self {
            Inst::Assign { src, .. } => f(src),
            Inst::Construct { args, .. } | Inst::Super { args, .. } | Inst::Yield { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
            Inst::Call { recv, args, .. } => {
                f(recv);
                for arg in args {
                    f(arg);
                }
            }
            Inst::Test { cond, .. } => f(cond),
            Inst::Return { value, .. } => f(value),
            Inst::Raise { value, .. } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            Inst::Phi { .. } => {}
        }
    }

    /// The syntax node this instruction was lowered from.
    #[must_use]
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Inst::Assign { node, .. }
            | Inst::Construct { node, .. }
            | Inst::Call { node, .. }
            | Inst::Super { node, .. }
            | Inst::Yield { node, .. }
            | Inst::Test { node, .. }
            | Inst::Return { node, .. }
            | Inst::Raise { node, .. } => Some(*node),
            Inst::Phi { node, .. } => *node,
        }
    }
}

/// One basic block.
#[derive(Debug, Default)]
pub struct BasicBlock {
    pub insts: Vec<Inst>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<(BlockId, EdgeKind)>,
    /// The first syntax node lowered into this block.
    pub origin: Option<NodeId>,
    /// Cleared by the unreachability analysis; the block itself is
    /// retained.
    pub reachable: bool,
}

/// A method's control flow graph.
#[derive(Debug)]
pub struct Graph {
    blocks: Vec<BasicBlock>,
    entry: BlockId,
    exit: BlockId,
    exception_exit: BlockId,
}

impl Graph {
    /// An empty graph with its three distinguished blocks.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = Graph {
            blocks: Vec::new(),
            entry: BlockId(0),
            exit: BlockId(0),
            exception_exit: BlockId(0),
        };
        graph.entry = graph.add_block();
        graph.exit = graph.add_block();
        graph.exception_exit = graph.add_block();
        graph
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId::from_index(self.blocks.len());
        self.blocks.push(BasicBlock {
            reachable: true,
            ..BasicBlock::default()
        });
        id
    }

    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    #[must_use]
    pub fn exit(&self) -> BlockId {
        self.exit
    }

    #[must_use]
    pub fn exception_exit(&self) -> BlockId {
        self.exception_exit
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::from_index)
    }

    /// Adds an edge, ignoring an exact duplicate. Predecessor lists hold
    /// each predecessor once however many edge kinds connect the pair, so
    /// phi arguments stay one-per-predecessor.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        if self.blocks[from.index()].succs.contains(&(to, kind)) {
            return;
        }
        self.blocks[from.index()].succs.push((to, kind));
        if !self.blocks[to.index()].preds.contains(&from) {
            self.blocks[to.index()].preds.push(from);
        }
    }

    /// Appends an instruction, recording the block's origin node on first
    /// append.
    pub fn append(&mut self, block: BlockId, inst: Inst) {
        let data = &mut self.blocks[block.index()];
        if data.origin.is_none() {
            data.origin = inst.node();
        }
        data.insts.push(inst);
    }

    /// Whether the block ends in a return or raise.
    #[must_use]
    pub fn is_terminated(&self, block: BlockId) -> bool {
        matches!(
            self.blocks[block.index()].insts.last(),
            Some(Inst::Return { .. } | Inst::Raise { .. })
        )
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/// Graph construction failure. One per method; other methods are
/// unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("cannot analyze `{}` here", .kind.label())]
    Unsupported { kind: NodeKind, node: NodeId },
    #[error("malformed `{}` node: {detail}", .kind.label())]
    Malformed {
        kind: NodeKind,
        node: NodeId,
        detail: &'static str,
    },
}

impl GraphError {
    /// The node the failure points at.
    #[must_use]
    pub fn node(&self) -> NodeId {
        match self {
            GraphError::Unsupported { node, .. } | GraphError::Malformed { node, .. } => *node,
        }
    }
}
