// schedule.rs — Topological evaluation order for unit graphs
//
// Depth-first post-order from one or more roots. A node is emitted once,
// after every dependency. A State's two edges (initial value, recurrence)
// are both followed; reads of a State are register reads and therefore
// exempt from ordering, which is what lets a recurrence read its own state.
//
// Preconditions: every id reachable from `roots` exists in `graph`.
// Postconditions: returned order contains each reachable node exactly once.
// Failure modes: a reachable State without a recurrence is `IncompleteState`.
// Side effects: none (visited marks live in the traversal context).

use std::collections::{HashMap, HashSet};

use crate::error::GenError;
use crate::id::NodeId;
use crate::node::UnitGraph;
use crate::pass::StageCert;

// ── Public entry point ──────────────────────────────────────────────────────

pub fn schedule(unit: &str, graph: &UnitGraph, roots: &[NodeId]) -> Result<Vec<NodeId>, GenError> {
    let mut ctx = ScheduleCtx {
        unit,
        graph,
        visited: HashSet::new(),
        order: Vec::new(),
    };
    for &root in roots {
        ctx.visit(root)?;
    }
    Ok(ctx.order)
}

// ── Internal context ────────────────────────────────────────────────────────

struct ScheduleCtx<'a> {
    unit: &'a str,
    graph: &'a UnitGraph,
    visited: HashSet<NodeId>,
    order: Vec<NodeId>,
}

impl ScheduleCtx<'_> {
    fn visit(&mut self, id: NodeId) -> Result<(), GenError> {
        if !self.visited.insert(id) {
            return Ok(());
        }
        let node = &self.graph[id];
        if node.is_state() && node.recurrence().is_none() {
            return Err(GenError::IncompleteState {
                unit: self.unit.to_string(),
                node: node.describe(),
            });
        }
        for &dep in &node.deps {
            self.visit(dep)?;
        }
        self.order.push(id);
        Ok(())
    }
}

// ── Verification ─────────────────────────────────────────────────────────────

/// Machine-checkable evidence for schedule postconditions.
#[derive(Debug, Clone)]
pub struct ScheduleCert {
    /// S1: every node reachable from the roots is scheduled, nothing else is.
    pub s1_covers_reachable: bool,
    /// S2: no node appears twice.
    pub s2_unique: bool,
    /// S3: every non-State dependency precedes its consumer.
    pub s3_dependency_order: bool,
}

impl StageCert for ScheduleCert {
    fn all_pass(&self) -> bool {
        self.s1_covers_reachable && self.s2_unique && self.s3_dependency_order
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("S1_covers_reachable", self.s1_covers_reachable),
            ("S2_unique", self.s2_unique),
            ("S3_dependency_order", self.s3_dependency_order),
        ]
    }
}

pub fn verify_schedule(graph: &UnitGraph, roots: &[NodeId], order: &[NodeId]) -> ScheduleCert {
    let mut position = HashMap::new();
    let mut unique = true;
    for (i, &id) in order.iter().enumerate() {
        if position.insert(id, i).is_some() {
            unique = false;
        }
    }

    // Reachability computed independently of the traversal under test.
    let mut reachable = HashSet::new();
    let mut stack: Vec<NodeId> = roots.to_vec();
    while let Some(id) = stack.pop() {
        if reachable.insert(id) {
            stack.extend(graph[id].deps.iter().copied());
        }
    }
    let covers = reachable.len() == position.len()
        && reachable.iter().all(|id| position.contains_key(id));

    let ordered = order.iter().all(|&id| {
        graph[id].deps.iter().all(|&dep| {
            graph[dep].is_state()
                || matches!((position.get(&dep), position.get(&id)), (Some(d), Some(n)) if d < n)
        })
    });

    ScheduleCert {
        s1_covers_reachable: covers,
        s2_unique: unique,
        s3_dependency_order: ordered,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::UnitBuilder;
    use crate::node::ValueType;
    use crate::rate::RateSet;

    fn smooth() -> (UnitBuilder, NodeId, NodeId) {
        let mut b = UnitBuilder::new("Smooth");
        let p = b
            .param("p", ValueType::Sample, RateSet::parse("b").unwrap())
            .unwrap();
        let s = b.state("s", 0, None).unwrap();
        let a = b.mul(s, 0.9).unwrap();
        let c = b.mul(p, 0.1).unwrap();
        let next = b.add(a, c).unwrap();
        b.next(s, next).unwrap();
        (b, s, next)
    }

    #[test]
    fn post_order_places_dependencies_first() {
        let mut b = UnitBuilder::new("U");
        let x = b
            .param("x", ValueType::Sample, RateSet::parse("a").unwrap())
            .unwrap();
        let y = b.mul(x, 2).unwrap();
        let z = b.add(y, x).unwrap();
        let order = schedule("U", b.graph(), &[z]).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], x);
        assert_eq!(*order.last().unwrap(), z);
        let pos = |id| order.iter().position(|&o| o == id).unwrap();
        assert!(pos(y) < pos(z));
    }

    #[test]
    fn shared_subexpression_scheduled_once() {
        let mut b = UnitBuilder::new("U");
        let x = b
            .param("x", ValueType::Sample, RateSet::parse("a").unwrap())
            .unwrap();
        let sq = b.mul(x, x).unwrap();
        let out = b.add(sq, sq).unwrap();
        let order = schedule("U", b.graph(), &[out]).unwrap();
        assert_eq!(order, vec![x, sq, out]);
    }

    #[test]
    fn state_recurrence_scheduled_before_state() {
        let (b, s, next) = smooth();
        let order = schedule("Smooth", b.graph(), &[s]).unwrap();
        let pos = |id| order.iter().position(|&o| o == id).unwrap();
        assert!(pos(next) < pos(s));
        let cert = verify_schedule(b.graph(), &[s], &order);
        assert!(cert.all_pass(), "{:?}", cert.obligations());
    }

    #[test]
    fn incomplete_state_reported() {
        let mut b = UnitBuilder::new("U");
        let s = b.state("s", 0, None).unwrap();
        let out = b.mul(s, 2).unwrap();
        let err = schedule("U", b.graph(), &[out]).unwrap_err();
        assert!(matches!(err, GenError::IncompleteState { .. }));
    }

    #[test]
    fn schedule_is_repeatable() {
        let (b, s, _) = smooth();
        let first = schedule("Smooth", b.graph(), &[s]).unwrap();
        let second = schedule("Smooth", b.graph(), &[s]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn verify_detects_missing_node() {
        let (b, s, _) = smooth();
        let mut order = schedule("Smooth", b.graph(), &[s]).unwrap();
        order.remove(0);
        let cert = verify_schedule(b.graph(), &[s], &order);
        assert!(!cert.s1_covers_reachable);
    }

    #[test]
    fn verify_detects_misordering() {
        let (b, s, _) = smooth();
        let mut order = schedule("Smooth", b.graph(), &[s]).unwrap();
        order.reverse();
        let cert = verify_schedule(b.graph(), &[s], &order);
        assert!(cert.s1_covers_reachable && cert.s2_unique);
        assert!(!cert.s3_dependency_order);
    }

    #[test]
    fn verify_detects_duplicates() {
        let (b, s, _) = smooth();
        let mut order = schedule("Smooth", b.graph(), &[s]).unwrap();
        order.push(order[0]);
        let cert = verify_schedule(b.graph(), &[s], &order);
        assert!(!cert.s2_unique);
    }
}
