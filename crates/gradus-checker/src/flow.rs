//! Control flow graph recorded while checking
//!
//! One node per program point the checker visits, with the refined type
//! environment at that point. Consumers query it for hover types and for
//! branches whose environment became unreachable.

use crate::ast::Span;
use crate::narrowing::TypeEnv;
use gradus_types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowNodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowNodeKind {
    /// Start of a unit or function body
    Entry,
    /// After a statement
    Statement,
    /// True edge of a condition
    BranchTrue,
    /// False edge of a condition
    BranchFalse,
    /// Merge of several predecessors
    Join,
    /// Entry of a `case` or `default` clause
    CaseClause,
    /// Head of a loop
    LoopHeader,
    /// Code after `return`, `throw` or `break`
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct FlowNode {
    pub kind: FlowNodeKind,
    pub preds: Vec<FlowNodeId>,
    pub env: TypeEnv,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        kind: FlowNodeKind,
        preds: Vec<FlowNodeId>,
        env: TypeEnv,
        span: Span,
    ) -> FlowNodeId {
        let id = FlowNodeId(self.nodes.len() as u32);
        let kind = if env.is_reachable() {
            kind
        } else {
            FlowNodeKind::Unreachable
        };
        self.nodes.push(FlowNode {
            kind,
            preds,
            env,
            span,
        });
        id
    }

    pub fn node(&self, id: FlowNodeId) -> Option<&FlowNode> {
        self.nodes.get(id.0 as usize)
    }

    /// Refined type of `var` at a node
    pub fn type_at(&self, id: FlowNodeId, var: &str) -> Option<TypeId> {
        self.node(id).and_then(|n| n.env.get(var))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FlowNodeId, &FlowNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (FlowNodeId(i as u32), n))
    }

    /// Nodes of one kind whose span starts at `offset`
    pub fn nodes_at(&self, kind: FlowNodeKind, offset: usize) -> Vec<FlowNodeId> {
        self.iter()
            .filter(|(_, n)| n.kind == kind && n.span.start == offset)
            .map(|(id, _)| id)
            .collect()
    }
}
