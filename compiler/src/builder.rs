// builder.rs — Graph construction API for unit definitions
//
// A `UnitBuilder` owns the node arena and the name table for exactly one
// unit. Operations accept existing nodes, numeric literals (coerced to
// Constant nodes), or names (resolved through the table), and return the
// new node's id. `finish` checks the definition and yields a `UnitDef`.
//
// Preconditions: none.
// Postconditions: returned `UnitDef`s have every reachable State complete.
// Failure modes: lookup failures, type mismatches, and structural errors
//                are returned as `GenError`; the builder stays usable.
// Side effects: none.

use std::collections::HashMap;

use crate::error::GenError;
use crate::id::NodeId;
use crate::node::*;
use crate::rate::{Category, RateSet};

// ── Operands ────────────────────────────────────────────────────────────────

/// Anything that can stand where a node is expected.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Node(NodeId),
    Int(i64),
    Float(f64),
    Name(String),
}

impl From<NodeId> for Operand {
    fn from(id: NodeId) -> Self {
        Operand::Node(id)
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Int(v)
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Int(v.into())
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Float(v)
    }
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Name(name.to_string())
    }
}

impl From<String> for Operand {
    fn from(name: String) -> Self {
        Operand::Name(name)
    }
}

// ── Library functions ───────────────────────────────────────────────────────

/// A named function callable from unit definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct LibFn {
    pub name: &'static str,
    pub arity: usize,
    /// Fixed result type; `None` means derived from the arguments.
    pub result: Option<ValueType>,
}

pub fn lookup_function(name: &str) -> Option<LibFn> {
    let (name, arity, result) = match name {
        "fabs" => ("fabs", 1, None),
        "int" => ("int", 1, Some(ValueType::Int)),
        "table_len" => ("table_len", 1, Some(ValueType::Int)),
        "fmax" => ("fmax", 2, None),
        "fmin" => ("fmin", 2, None),
        "pow" => ("pow", 2, None),
        "fmod" => ("fmod", 2, None),
        "fmodf" => ("fmodf", 2, None),
        "phase_wrap" => ("phase_wrap", 2, Some(ValueType::Double)),
        "cond" => ("cond", 3, None),
        _ => return None,
    };
    Some(LibFn {
        name,
        arity,
        result,
    })
}

// ── Unit definition ─────────────────────────────────────────────────────────

/// A complete unit: graph, ordered parameters, output, rate options.
#[derive(Debug, Clone)]
pub struct UnitDef {
    pub name: String,
    pub graph: UnitGraph,
    pub params: Vec<NodeId>,
    pub rate_sets: Vec<RateSet>,
    pub output: NodeId,
    pub category: Category,
    pub commutative: bool,
}

impl UnitDef {
    pub fn param_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter_map(|&p| self.graph[p].name.as_deref())
            .collect()
    }

    /// Every node the compiled code may touch: output, parameters, and
    /// the states and values named by parameter actions.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots = vec![self.output];
        for &p in &self.params {
            roots.push(p);
            for action in self.graph[p].actions() {
                roots.push(action.state);
                roots.push(action.value);
            }
        }
        roots
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct UnitBuilder {
    unit: String,
    graph: UnitGraph,
    names: HashMap<String, NodeId>,
    params: Vec<NodeId>,
    rate_sets: Vec<RateSet>,
}

impl UnitBuilder {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            graph: UnitGraph::new(),
            names: HashMap::new(),
            params: Vec::new(),
            rate_sets: Vec::new(),
        }
    }

    pub fn unit_name(&self) -> &str {
        &self.unit
    }

    pub fn graph(&self) -> &UnitGraph {
        &self.graph
    }

    // ── Names and coercion ──

    pub fn lookup(&self, name: &str) -> Result<NodeId, GenError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| GenError::UnknownName {
                unit: self.unit.clone(),
                name: name.to_string(),
            })
    }

    /// Bind `name` to an existing node without creating storage.
    pub fn bind(&mut self, name: &str, value: impl Into<Operand>) -> Result<NodeId, GenError> {
        let id = self.operand(value)?;
        self.declare(name, id)?;
        Ok(id)
    }

    fn declare(&mut self, name: &str, id: NodeId) -> Result<(), GenError> {
        if self.names.contains_key(name) {
            return Err(GenError::DuplicateName {
                unit: self.unit.clone(),
                name: name.to_string(),
            });
        }
        self.names.insert(name.to_string(), id);
        Ok(())
    }

    pub fn operand(&mut self, op: impl Into<Operand>) -> Result<NodeId, GenError> {
        match op.into() {
            Operand::Node(id) if id.index() < self.graph.len() => Ok(id),
            Operand::Node(id) => Err(GenError::Uncoercible {
                unit: self.unit.clone(),
                what: format!("foreign node {id}"),
            }),
            Operand::Int(v) => Ok(self.constant(Literal::Int(v))),
            Operand::Float(v) if v.is_finite() => Ok(self.constant(Literal::Float(v))),
            Operand::Float(v) => Err(GenError::Uncoercible {
                unit: self.unit.clone(),
                what: format!("non-finite literal {v}"),
            }),
            Operand::Name(name) => self.lookup(&name),
        }
    }

    fn constant(&mut self, lit: Literal) -> NodeId {
        self.graph
            .add(Node::new(NodeKind::Constant(lit), vec![], ValueType::Sample))
    }

    fn not_a_state(&self, id: NodeId) -> GenError {
        GenError::NotAState {
            unit: self.unit.clone(),
            node: self.graph.describe(id),
        }
    }

    // ── Leaves ──

    pub fn param(
        &mut self,
        name: &str,
        ty: ValueType,
        rates: RateSet,
    ) -> Result<NodeId, GenError> {
        if rates.is_empty() {
            return Err(GenError::EmptyRateSet {
                unit: self.unit.clone(),
                param: name.to_string(),
            });
        }
        let node = Node::new(NodeKind::Parameter { actions: vec![] }, vec![], ty).named(name);
        let id = self.graph.add(node);
        self.declare(name, id)?;
        self.params.push(id);
        self.rate_sets.push(rates);
        Ok(id)
    }

    /// Named constant supplied by the runtime header.
    pub fn symbol(&mut self, name: &str, ty: ValueType) -> Result<NodeId, GenError> {
        let node = Node::new(NodeKind::Constant(Literal::Symbol(name.to_string())), vec![], ty);
        let id = self.graph.add(node);
        self.declare(name, id)?;
        Ok(id)
    }

    // ── Storage ──

    pub fn var(
        &mut self,
        name: &str,
        value: impl Into<Operand>,
        ty: Option<ValueType>,
    ) -> Result<NodeId, GenError> {
        let value = self.operand(value)?;
        let ty = ty.unwrap_or_else(|| self.graph[value].ty.clone());
        let node = Node::new(NodeKind::Variable(VarOrigin::Declared), vec![value], ty).named(name);
        let id = self.graph.add(node);
        self.declare(name, id)?;
        Ok(id)
    }

    /// Declare a state register. Its recurrence is attached with `next`.
    pub fn state(
        &mut self,
        name: &str,
        init: impl Into<Operand>,
        ty: Option<ValueType>,
    ) -> Result<NodeId, GenError> {
        let init = self.operand(init)?;
        let ty = ty.unwrap_or_else(|| self.graph[init].ty.clone());
        let id = self
            .graph
            .add(Node::new(NodeKind::State, vec![init], ty).named(name));
        self.declare(name, id)?;
        Ok(id)
    }

    pub fn next(
        &mut self,
        state: impl Into<Operand>,
        value: impl Into<Operand>,
    ) -> Result<(), GenError> {
        let state = self.operand(state)?;
        if !self.graph[state].is_state() {
            return Err(self.not_a_state(state));
        }
        if self.graph[state].recurrence().is_some() {
            return Err(GenError::RecurrenceRedefined {
                unit: self.unit.clone(),
                node: self.graph.describe(state),
            });
        }
        let value = self.operand(value)?;
        self.graph[state].deps.push(value);
        Ok(())
    }

    // ── Operators ──

    pub fn binary(
        &mut self,
        op: BinOp,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> Result<NodeId, GenError> {
        let lhs = self.operand(lhs)?;
        let rhs = self.operand(rhs)?;
        let ty = binary_result_type(&self.graph[lhs].ty, &self.graph[rhs].ty);
        Ok(self
            .graph
            .add(Node::new(NodeKind::Binary(op), vec![lhs, rhs], ty)))
    }

    pub fn add(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GenError> {
        self.binary(BinOp::Add, a, b)
    }

    pub fn sub(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GenError> {
        self.binary(BinOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GenError> {
        self.binary(BinOp::Mul, a, b)
    }

    pub fn div(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GenError> {
        self.binary(BinOp::Div, a, b)
    }

    pub fn lt(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<NodeId, GenError> {
        self.binary(BinOp::Lt, a, b)
    }

    pub fn unary(
        &mut self,
        op: &str,
        x: impl Into<Operand>,
        ty: Option<ValueType>,
    ) -> Result<NodeId, GenError> {
        let x = self.operand(x)?;
        let ty = ty.unwrap_or_else(|| self.graph[x].ty.clone());
        Ok(self
            .graph
            .add(Node::new(NodeKind::Unary(op.to_string()), vec![x], ty)))
    }

    pub fn neg(&mut self, x: impl Into<Operand>) -> Result<NodeId, GenError> {
        self.unary("-", x, None)
    }

    pub fn binary_fn(
        &mut self,
        func: &str,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
        ty: Option<ValueType>,
    ) -> Result<NodeId, GenError> {
        let a = self.operand(a)?;
        let b = self.operand(b)?;
        let ty = ty.unwrap_or_else(|| {
            if self.graph[b].ty == ValueType::Double {
                ValueType::Double
            } else {
                self.graph[a].ty.clone()
            }
        });
        Ok(self
            .graph
            .add(Node::new(NodeKind::BinaryFn(func.to_string()), vec![a, b], ty)))
    }

    pub fn subscript(
        &mut self,
        table: impl Into<Operand>,
        index: impl Into<Operand>,
    ) -> Result<NodeId, GenError> {
        let table = self.operand(table)?;
        let index = self.operand(index)?;
        Ok(self
            .graph
            .add(Node::new(NodeKind::Subscript, vec![table, index], ValueType::Sample)))
    }

    pub fn cond(
        &mut self,
        test: impl Into<Operand>,
        then: impl Into<Operand>,
        otherwise: impl Into<Operand>,
    ) -> Result<NodeId, GenError> {
        let test = self.operand(test)?;
        let then = self.operand(then)?;
        let otherwise = self.operand(otherwise)?;
        let then_ty = self.graph[then].ty.clone();
        let else_ty = self.graph[otherwise].ty.clone();
        if then_ty != else_ty {
            return Err(GenError::TypeMismatch {
                unit: self.unit.clone(),
                node: "conditional".to_string(),
                then_ty,
                else_ty,
            });
        }
        Ok(self.graph.add(Node::new(
            NodeKind::Conditional,
            vec![test, then, otherwise],
            then_ty,
        )))
    }

    /// Call a library function by name.
    pub fn call(&mut self, name: &str, args: Vec<Operand>) -> Result<NodeId, GenError> {
        let func = lookup_function(name).ok_or_else(|| GenError::UnknownFunction {
            unit: self.unit.clone(),
            name: name.to_string(),
        })?;
        if args.len() != func.arity {
            return Err(GenError::Arity {
                unit: self.unit.clone(),
                function: name.to_string(),
                expected: func.arity,
                found: args.len(),
            });
        }
        let mut args = args.into_iter();
        let mut arg = || args.next().unwrap_or(Operand::Int(0));
        match func.arity {
            1 => self.unary(func.name, arg(), func.result),
            2 => self.binary_fn(func.name, arg(), arg(), func.result),
            _ => {
                let (test, then, otherwise) = (arg(), arg(), arg());
                self.cond(test, then, otherwise)
            }
        }
    }

    // ── Flags and actions ──

    /// Force `x` to run at the variant's output rate.
    pub fn use_output_rate(&mut self, x: impl Into<Operand>) -> Result<(), GenError> {
        let x = self.operand(x)?;
        self.graph[x].output_rate = true;
        Ok(())
    }

    /// Serve audio-rate reads of block-rate `x` from a cached value
    /// instead of interpolating.
    pub fn no_interpolate(&mut self, x: impl Into<Operand>) -> Result<(), GenError> {
        let x = self.operand(x)?;
        self.graph[x].interpolate = false;
        Ok(())
    }

    /// When `param` is written, overwrite `state` with `value`.
    pub fn on_write(
        &mut self,
        param: impl Into<Operand>,
        state: impl Into<Operand>,
        value: impl Into<Operand>,
    ) -> Result<(), GenError> {
        let param = self.operand(param)?;
        let state = self.operand(state)?;
        let value = self.operand(value)?;
        if !self.graph[state].is_state() {
            return Err(self.not_a_state(state));
        }
        match &mut self.graph[param].kind {
            NodeKind::Parameter { actions } => {
                actions.push(Action { state, value });
                Ok(())
            }
            _ => Err(GenError::NotAParameter {
                unit: self.unit.clone(),
                node: self.graph.describe(param),
            }),
        }
    }

    // ── Completion ──

    pub fn finish(
        mut self,
        output: impl Into<Operand>,
        category: Category,
        commutative: bool,
    ) -> Result<UnitDef, GenError> {
        let output = self.operand(output)?;
        if commutative && self.params.len() != 2 {
            return Err(GenError::Commutativity {
                unit: self.unit,
                found: self.params.len(),
            });
        }
        let def = UnitDef {
            name: self.unit,
            graph: self.graph,
            params: self.params,
            rate_sets: self.rate_sets,
            output,
            category,
            commutative,
        };
        // Surfaces incomplete states before any variant is attempted.
        crate::schedule::schedule(&def.name, &def.graph, &def.roots())?;
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::Rate;

    fn rates(codes: &str) -> RateSet {
        RateSet::parse(codes).unwrap()
    }

    #[test]
    fn literals_become_constants() {
        let mut b = UnitBuilder::new("U");
        let x = b.param("x", ValueType::Sample, rates("ab")).unwrap();
        let y = b.mul(x, 0.5).unwrap();
        let node = &b.graph()[y];
        assert_eq!(node.kind, NodeKind::Binary(BinOp::Mul));
        assert_eq!(
            b.graph()[node.deps[1]].kind,
            NodeKind::Constant(Literal::Float(0.5))
        );
    }

    #[test]
    fn names_resolve_through_table() {
        let mut b = UnitBuilder::new("U");
        let x = b.param("x", ValueType::Sample, rates("a")).unwrap();
        let sum = b.add("x", 1).unwrap();
        assert_eq!(b.graph()[sum].deps[0], x);
    }

    #[test]
    fn undeclared_name_is_lookup_error() {
        let mut b = UnitBuilder::new("U");
        let err = b.add("nope", 1).unwrap_err();
        assert_eq!(
            err,
            GenError::UnknownName {
                unit: "U".into(),
                name: "nope".into()
            }
        );
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut b = UnitBuilder::new("U");
        b.param("x", ValueType::Sample, rates("a")).unwrap();
        let err = b.var("x", 1, None).unwrap_err();
        assert!(matches!(err, GenError::DuplicateName { .. }));
    }

    #[test]
    fn non_finite_literal_is_uncoercible() {
        let mut b = UnitBuilder::new("U");
        let err = b.add(f64::NAN, 1).unwrap_err();
        assert!(matches!(err, GenError::Uncoercible { .. }));
    }

    #[test]
    fn state_takes_two_edges() {
        let mut b = UnitBuilder::new("U");
        let s = b.state("s", 0, None).unwrap();
        let decayed = b.mul(s, 0.9).unwrap();
        b.next(s, decayed).unwrap();
        assert_eq!(b.graph()[s].deps.len(), 2);
        assert_eq!(b.graph()[s].recurrence(), Some(decayed));
    }

    #[test]
    fn next_on_non_state_rejected() {
        let mut b = UnitBuilder::new("U");
        let v = b.var("v", 1, None).unwrap();
        assert!(matches!(b.next(v, 2), Err(GenError::NotAState { .. })));
    }

    #[test]
    fn recurrence_cannot_be_redefined() {
        let mut b = UnitBuilder::new("U");
        let s = b.state("s", 0, None).unwrap();
        b.next(s, 1).unwrap();
        assert!(matches!(
            b.next(s, 2),
            Err(GenError::RecurrenceRedefined { .. })
        ));
    }

    #[test]
    fn incomplete_state_fails_finish() {
        let mut b = UnitBuilder::new("Smooth");
        let s = b.state("s", 0, None).unwrap();
        let err = b.finish(s, Category::Generator(Rate::Block), false).unwrap_err();
        assert_eq!(
            err,
            GenError::IncompleteState {
                unit: "Smooth".into(),
                node: "state 's'".into()
            }
        );
    }

    #[test]
    fn conditional_branch_types_must_match() {
        let mut b = UnitBuilder::new("U");
        let d = b.param("d", ValueType::Double, rates("c")).unwrap();
        let i = b.unary("int", d, Some(ValueType::Int)).unwrap();
        let t = b.lt(d, 1).unwrap();
        let err = b.cond(t, d, i).unwrap_err();
        assert_eq!(
            err,
            GenError::TypeMismatch {
                unit: "U".into(),
                node: "conditional".into(),
                then_ty: ValueType::Double,
                else_ty: ValueType::Int,
            }
        );
    }

    #[test]
    fn library_calls_check_name_and_arity() {
        let mut b = UnitBuilder::new("U");
        let x = b.param("x", ValueType::Sample, rates("a")).unwrap();
        let idx = b.call("int", vec![x.into()]).unwrap();
        assert_eq!(b.graph()[idx].ty, ValueType::Int);
        let wrapped = b.call("phase_wrap", vec![x.into(), 1.into()]).unwrap();
        assert_eq!(b.graph()[wrapped].ty, ValueType::Double);
        assert!(matches!(
            b.call("sinh", vec![x.into()]),
            Err(GenError::UnknownFunction { .. })
        ));
        assert!(matches!(
            b.call("fmax", vec![x.into()]),
            Err(GenError::Arity {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn binary_fn_type_prefers_double_second_argument() {
        let mut b = UnitBuilder::new("U");
        let s = b.param("s", ValueType::Sample, rates("c")).unwrap();
        let d = b.param("d", ValueType::Double, rates("c")).unwrap();
        let f = b.binary_fn("fmax", s, d, None).unwrap();
        assert_eq!(b.graph()[f].ty, ValueType::Double);
        let g = b.binary_fn("fmax", d, s, None).unwrap();
        assert_eq!(b.graph()[g].ty, ValueType::Double);
    }

    #[test]
    fn actions_attach_to_parameters_only() {
        let mut b = UnitBuilder::new("Decay");
        let amp = b.param("amp", ValueType::Sample, rates("c")).unwrap();
        let env = b.state("env", amp, None).unwrap();
        b.on_write(amp, env, amp).unwrap();
        assert_eq!(
            b.graph()[amp].actions(),
            &[Action {
                state: env,
                value: amp
            }]
        );
        assert!(matches!(
            b.on_write(env, env, amp),
            Err(GenError::NotAParameter { .. })
        ));
    }

    #[test]
    fn commutative_requires_two_params() {
        let mut b = UnitBuilder::new("U");
        let x = b.param("x", ValueType::Sample, rates("a")).unwrap();
        let err = b.finish(x, Category::Filter, true).unwrap_err();
        assert!(matches!(err, GenError::Commutativity { found: 1, .. }));
    }

    #[test]
    fn empty_rate_set_rejected() {
        let mut b = UnitBuilder::new("U");
        assert!(matches!(
            b.param("x", ValueType::Sample, RateSet::default()),
            Err(GenError::EmptyRateSet { .. })
        ));
    }

    #[test]
    fn finish_records_parameters_in_order() {
        let mut b = UnitBuilder::new("Mult");
        b.param("x1", ValueType::Sample, rates("ab")).unwrap();
        b.param("x2", ValueType::Sample, rates("abc")).unwrap();
        let out = b.mul("x1", "x2").unwrap();
        let def = b.finish(out, Category::Filter, true).unwrap();
        assert_eq!(def.param_names(), vec!["x1", "x2"]);
        assert_eq!(def.rate_sets[1].to_string(), "abc");
    }
}
