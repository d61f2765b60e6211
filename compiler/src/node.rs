// node.rs — Node model for unit generator expression graphs
//
// A unit is a DAG of nodes (plus state feedback) stored in a `UnitGraph`
// arena. Each node has a closed `NodeKind`, ordered dependency edges, an
// optional resolved rate, and the flags rate inference and rewriting read.
//
// A State node carries two explicit edges: `deps[0]` is the initial value
// and `deps[1]` the recurrence. The recurrence may read the State itself;
// that read is a register read, not a cycle.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::id::NodeId;
use crate::rate::Rate;

// ── Value types ─────────────────────────────────────────────────────────────

/// Host-language type of a node's value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Sample,
    Float,
    Double,
    Int,
    /// Opaque host type such as `Table_ptr`.
    Named(String),
}

impl ValueType {
    pub fn parse(name: &str) -> ValueType {
        match name {
            "sample" => ValueType::Sample,
            "float" => ValueType::Float,
            "double" => ValueType::Double,
            "int" => ValueType::Int,
            other => ValueType::Named(other.to_string()),
        }
    }

    pub fn cpp(&self) -> &str {
        match self {
            ValueType::Sample => "sample",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Int => "int",
            ValueType::Named(name) => name,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cpp())
    }
}

/// Result type of a binary operator: sample dominates, then double, then float.
pub fn binary_result_type(lhs: &ValueType, rhs: &ValueType) -> ValueType {
    for ty in [ValueType::Sample, ValueType::Double, ValueType::Float] {
        if *lhs == ty || *rhs == ty {
            return ty;
        }
    }
    lhs.clone()
}

// ── Node kinds ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    /// Named constant supplied by the runtime (`AR`, `BL`, ...).
    Symbol(String),
}

impl Literal {
    /// Host-language spelling. Floats keep a decimal point so integer
    /// arithmetic is never introduced by accident.
    pub fn code(&self) -> String {
        match self {
            Literal::Int(v) => v.to_string(),
            Literal::Float(v) => format!("{v:?}"),
            Literal::Symbol(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarOrigin {
    Declared,
    /// Synthetic variable inserted by the rewriter.
    CachedTemp,
}

/// Overwrite `state` with `value` whenever the owning parameter is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    pub state: NodeId,
    pub value: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Constant(Literal),
    Parameter { actions: Vec<Action> },
    Variable(VarOrigin),
    State,
    /// Unary operator or one-argument library function (`fabs`, `int`, `-`).
    Unary(String),
    Binary(BinOp),
    /// Two-argument library function (`fmax`, `phase_wrap`, ...).
    BinaryFn(String),
    /// `deps = [table, index]`
    Subscript,
    /// `deps = [test, then, else]`
    Conditional,
    /// Linear interpolation of a block-rate value up to audio rate.
    Upsample,
}

// ── Node ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub deps: Vec<NodeId>,
    pub rate: Option<Rate>,
    /// Forced to the variant's target output rate.
    pub output_rate: bool,
    /// May be linearly interpolated when read at audio rate.
    pub interpolate: bool,
    pub name: Option<String>,
    pub ty: ValueType,
}

impl Node {
    pub fn new(kind: NodeKind, deps: Vec<NodeId>, ty: ValueType) -> Self {
        Self {
            kind,
            deps,
            rate: None,
            output_rate: false,
            interpolate: true,
            name: None,
            ty,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_state(&self) -> bool {
        matches!(self.kind, NodeKind::State)
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.kind, NodeKind::Parameter { .. })
    }

    /// Variables and state registers: values already held in storage.
    pub fn is_variable(&self) -> bool {
        matches!(self.kind, NodeKind::Variable(_) | NodeKind::State)
    }

    /// Leaves whose reads never need caching.
    pub fn is_trivial(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Constant(_) | NodeKind::Parameter { .. } | NodeKind::Variable(_) | NodeKind::State
        )
    }

    pub fn recurrence(&self) -> Option<NodeId> {
        if self.is_state() {
            self.deps.get(1).copied()
        } else {
            None
        }
    }

    pub fn actions(&self) -> &[Action] {
        match &self.kind {
            NodeKind::Parameter { actions } => actions,
            _ => &[],
        }
    }

    /// Short human-readable description used in error messages.
    pub fn describe(&self) -> String {
        let kind = match &self.kind {
            NodeKind::Constant(lit) => return format!("constant {}", lit.code()),
            NodeKind::Parameter { .. } => "parameter",
            NodeKind::Variable(VarOrigin::Declared) => "variable",
            NodeKind::Variable(VarOrigin::CachedTemp) => "cached temporary",
            NodeKind::State => "state",
            NodeKind::Unary(op) => return format!("unary '{op}'"),
            NodeKind::Binary(op) => return format!("binary '{}'", op.symbol()),
            NodeKind::BinaryFn(func) => return format!("call '{func}'"),
            NodeKind::Subscript => "subscript",
            NodeKind::Conditional => "conditional",
            NodeKind::Upsample => "upsample",
        };
        match &self.name {
            Some(name) => format!("{kind} '{name}'"),
            None => kind.to_string(),
        }
    }
}

// ── Arena ───────────────────────────────────────────────────────────────────

/// Arena of nodes for one unit (or one compiled variant).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitGraph {
    nodes: Vec<Node>,
}

impl UnitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn describe(&self, id: NodeId) -> String {
        match self.get(id) {
            Some(node) => node.describe(),
            None => format!("unknown node {id}"),
        }
    }
}

impl Index<NodeId> for UnitGraph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for UnitGraph {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}
