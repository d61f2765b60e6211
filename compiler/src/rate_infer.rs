// rate_infer.rs — Rate inference for one rate combination
//
// Assigns every scheduled node a rate:
//   1. a node forced to the output rate gets the target rate;
//   2. otherwise the maximum of its dependencies' rates (constant if none);
//   3. a State is at least block rate.
// Parameters are leaves whose rates come from the combination.
//
// A recurrence may read its own State, so the rules are solved as a
// monotone fixpoint over the schedule: rates only rise and there are three
// levels, so iteration stops after a handful of sweeps.
//
// Preconditions: `order` is a schedule of `graph` (dependencies first).
// Postconditions: every node in `order` has a rate in the returned map.
// Failure modes: a forced node whose dependencies need a faster rate than
//                the target is `RateConflict`.
// Side effects: none; the definition graph is not touched.

use std::collections::HashMap;

use tracing::trace;

use crate::error::GenError;
use crate::id::NodeId;
use crate::node::{NodeKind, UnitGraph};
use crate::rate::Rate;

/// Memoised rates for one variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateMap {
    rates: HashMap<NodeId, Rate>,
}

impl RateMap {
    /// Resolved rate of `id`, if it was scheduled.
    pub fn resolve_rate(&self, id: NodeId) -> Option<Rate> {
        self.rates.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

pub fn infer_rates(
    unit: &str,
    graph: &UnitGraph,
    order: &[NodeId],
    param_rates: &HashMap<NodeId, Rate>,
    target: Rate,
) -> Result<RateMap, GenError> {
    let mut rates: HashMap<NodeId, Rate> = HashMap::with_capacity(order.len());
    for &id in order {
        let node = &graph[id];
        let initial = if let NodeKind::Parameter { .. } = node.kind {
            param_rates.get(&id).copied().unwrap_or(Rate::Constant)
        } else if node.output_rate {
            target
        } else if node.is_state() {
            Rate::Block
        } else {
            Rate::Constant
        };
        rates.insert(id, initial);
    }

    let mut sweeps = 0;
    loop {
        sweeps += 1;
        let mut changed = false;
        for &id in order {
            let node = &graph[id];
            if node.is_parameter() || node.output_rate {
                continue;
            }
            let required = dependency_rate(&rates, &node.deps);
            let current = rates[&id];
            if required > current {
                rates.insert(id, required);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    trace!(unit, sweeps, nodes = order.len(), "rate fixpoint reached");

    for &id in order {
        let node = &graph[id];
        if !node.output_rate {
            continue;
        }
        let required = dependency_rate(&rates, &node.deps);
        if required > target {
            return Err(GenError::RateConflict {
                unit: unit.to_string(),
                node: node.describe(),
                required,
                target,
            });
        }
    }

    Ok(RateMap { rates })
}

fn dependency_rate(rates: &HashMap<NodeId, Rate>, deps: &[NodeId]) -> Rate {
    deps.iter()
        .filter_map(|d| rates.get(d).copied())
        .max()
        .unwrap_or(Rate::Constant)
}

// ── Tests ───────────────────────────────────────────────────────────────────
