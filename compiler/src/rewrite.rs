// rewrite.rs — Per-variant graph cloning and adapter insertion
//
// Clones the scheduled nodes of a definition into a fresh arena, stamps
// each clone with its inferred rate, remaps every reference, then serves
// each under-rate read at audio rate through an adapter:
//   - block value, interpolation eligible      → Upsample
//   - block value, not eligible, not a variable → CachedTemp at block rate
//   - non-trivial constant-rate expression      → CachedTemp at constant rate
// A State's initial-value slot is evaluated in the constructor and is
// never adapted. The unit output is read at the target rate like any other
// consumer. Adapters are shared per dependency through a side table.
//
// Preconditions: `order` schedules `def.roots()`; `rates` covers `order`.
// Postconditions: the returned variant passes `verify_rewrite`.
// Failure modes: output faster than the target rate is `RateConflict`;
//                incomplete states surface from re-scheduling.
// Side effects: none; the definition is never mutated.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::builder::UnitDef;
use crate::enumerate::RateCombination;
use crate::error::GenError;
use crate::id::{NameAllocator, NodeId};
use crate::node::*;
use crate::pass::StageCert;
use crate::rate::Rate;
use crate::rate_infer::RateMap;
use crate::schedule::schedule;

// ── Public types ────────────────────────────────────────────────────────────

/// A rate-resolved, adapted copy of a unit for one rate combination.
#[derive(Debug, Clone)]
pub struct Variant {
    pub unit: String,
    pub combination: RateCombination,
    pub graph: UnitGraph,
    /// Emission order over the unit roots, starting at the (possibly adapted) output.
    pub schedule: Vec<NodeId>,
    pub output: NodeId,
    pub params: Vec<NodeId>,
}

impl Variant {
    pub fn class_name(&self) -> String {
        format!("{}_{}", self.unit, self.combination.suffix())
    }

    pub fn output_rate(&self) -> Rate {
        self.combination.output
    }

    /// Rate of a cloned node. Every node in a variant carries one.
    pub fn rate(&self, id: NodeId) -> Rate {
        self.graph[id].rate.unwrap_or(Rate::Constant)
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.graph[id].name.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Upsample,
    CachedTemp(Rate),
}

/// Adapter needed when a consumer at `consumer` rate reads `dep`, if any.
pub fn adapter_needed(consumer: Rate, dep: &Node) -> Option<AdapterKind> {
    if consumer != Rate::Audio {
        return None;
    }
    match dep.rate? {
        Rate::Block if dep.interpolate => Some(AdapterKind::Upsample),
        Rate::Block if !dep.is_variable() => Some(AdapterKind::CachedTemp(Rate::Block)),
        Rate::Constant if !dep.is_trivial() => Some(AdapterKind::CachedTemp(Rate::Constant)),
        _ => None,
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn rewrite(
    def: &UnitDef,
    order: &[NodeId],
    rates: &RateMap,
    combination: RateCombination,
) -> Result<Variant, GenError> {
    let mut ctx = RewriteCtx::clone_from(def, order, rates);
    let output = ctx.map[&def.output];
    let target = combination.output;

    let out_rate = ctx.graph[output].rate.unwrap_or(Rate::Constant);
    if out_rate > target {
        return Err(GenError::RateConflict {
            unit: def.name.clone(),
            node: ctx.graph.describe(output),
            required: out_rate,
            target,
        });
    }

    // Only nodes that run() evaluates get adapters; setter-only
    // expressions are emitted as written.
    let reachable = schedule(&def.name, &ctx.graph, &[output])?;
    for &id in &reachable {
        ctx.adapt_consumer(id);
    }
    let output = match adapter_needed(target, &ctx.graph[output]) {
        Some(kind) => ctx.adapter_for(output, kind),
        None => output,
    };

    // Same roots as the definition, with the output swapped for its adapter.
    let roots: Vec<NodeId> = std::iter::once(output)
        .chain(def.roots().iter().skip(1).map(|r| ctx.map[r]))
        .collect();
    let schedule = schedule(&def.name, &ctx.graph, &roots)?;
    let params = def.params.iter().map(|p| ctx.map[p]).collect();
    Ok(Variant {
        unit: def.name.clone(),
        combination,
        graph: ctx.graph,
        schedule,
        output,
        params,
    })
}

// ── Internal context ────────────────────────────────────────────────────────

/// Members and locals the emitter derives from an upsample's name.
const UPSAMPLE_SUFFIXES: &[&str] = &["_arate", "_step"];

struct RewriteCtx {
    graph: UnitGraph,
    /// Definition node → clone.
    map: HashMap<NodeId, NodeId>,
    /// Dependency (clone) → its adapter.
    adapters: HashMap<NodeId, NodeId>,
    names: NameAllocator,
}

impl RewriteCtx {
    fn clone_from(def: &UnitDef, order: &[NodeId], rates: &RateMap) -> Self {
        let mut graph = UnitGraph::new();
        let mut map = HashMap::with_capacity(order.len());
        for &old in order {
            let mut node = def.graph[old].clone();
            node.rate = rates.resolve_rate(old);
            map.insert(old, graph.add(node));
        }
        for &new in map.values() {
            let node = &mut graph[new];
            for dep in &mut node.deps {
                *dep = map[&*dep];
            }
            if let NodeKind::Parameter { actions } = &mut node.kind {
                for action in actions {
                    action.state = map[&action.state];
                    action.value = map[&action.value];
                }
            }
        }
        let names = NameAllocator::new(def.graph.iter().filter_map(|(_, n)| n.name.clone()));
        Self {
            graph,
            map,
            adapters: HashMap::new(),
            names,
        }
    }

    fn adapt_consumer(&mut self, id: NodeId) {
        let consumer = &self.graph[id];
        let Some(rate) = consumer.rate else {
            return;
        };
        let first_slot = usize::from(consumer.is_state());
        for slot in first_slot..consumer.deps.len() {
            let dep = self.graph[id].deps[slot];
            if let Some(kind) = adapter_needed(rate, &self.graph[dep]) {
                let adapter = self.adapter_for(dep, kind);
                self.graph[id].deps[slot] = adapter;
            }
        }
    }

    fn adapter_for(&mut self, dep: NodeId, kind: AdapterKind) -> NodeId {
        if let Some(&adapter) = self.adapters.get(&dep) {
            return adapter;
        }
        let source = &self.graph[dep];
        let mut node = match kind {
            AdapterKind::Upsample => {
                let name = self.names.alloc_stem(source.name.as_deref(), UPSAMPLE_SUFFIXES);
                let mut node = Node::new(NodeKind::Upsample, vec![dep], ValueType::Sample);
                node.name = Some(name);
                node.rate = Some(Rate::Audio);
                node
            }
            AdapterKind::CachedTemp(rate) => {
                let ty = source.ty.clone();
                let mut node = Node::new(NodeKind::Variable(VarOrigin::CachedTemp), vec![dep], ty);
                node.name = Some(self.names.alloc());
                node.rate = Some(rate);
                node
            }
        };
        node.interpolate = false;
        debug!(
            dep = %self.graph.describe(dep),
            adapter = ?kind,
            name = node.name.as_deref().unwrap_or(""),
            "inserted adapter"
        );
        let adapter = self.graph.add(node);
        self.adapters.insert(dep, adapter);
        adapter
    }
}

// ── Verification ─────────────────────────────────────────────────────────────

/// Machine-checkable evidence for rewrite postconditions.
#[derive(Debug, Clone)]
pub struct RewriteCert {
    /// R1: every scheduled node has a rate.
    pub r1_rates_assigned: bool,
    /// R2: no audio-rate consumer evaluated by run() reads an unadapted
    /// slower value.
    pub r2_no_under_rate_reads: bool,
    /// R3: each dependency has at most one adapter.
    pub r3_adapters_shared: bool,
}

impl StageCert for RewriteCert {
    fn all_pass(&self) -> bool {
        self.r1_rates_assigned && self.r2_no_under_rate_reads && self.r3_adapters_shared
    }

    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("R1_rates_assigned", self.r1_rates_assigned),
            ("R2_no_under_rate_reads", self.r2_no_under_rate_reads),
            ("R3_adapters_shared", self.r3_adapters_shared),
        ]
    }
}

pub fn verify_rewrite(variant: &Variant) -> RewriteCert {
    let graph = &variant.graph;
    let rates_assigned = variant.schedule.iter().all(|&id| graph[id].rate.is_some());

    let mut run_nodes = HashSet::new();
    let mut stack = vec![variant.output];
    while let Some(id) = stack.pop() {
        if run_nodes.insert(id) {
            stack.extend(graph[id].deps.iter().copied());
        }
    }

    let slot_ok = |consumer: Rate, dep: NodeId| adapter_needed(consumer, &graph[dep]).is_none();
    let no_under_rate = run_nodes.iter().all(|&id| {
        let node = &graph[id];
        let rate = node.rate.unwrap_or(Rate::Constant);
        // An upsample reads its block-rate source once per block.
        let first_slot = match node.kind {
            NodeKind::Upsample => node.deps.len(),
            _ => usize::from(node.is_state()),
        };
        node.deps[first_slot.min(node.deps.len())..]
            .iter()
            .all(|&dep| slot_ok(rate, dep))
    }) && slot_ok(variant.output_rate(), variant.output);

    let mut adapted = HashSet::new();
    let shared = graph
        .iter()
        .filter(|(_, n)| {
            matches!(
                n.kind,
                NodeKind::Upsample | NodeKind::Variable(VarOrigin::CachedTemp)
            )
        })
        .all(|(_, n)| adapted.insert(n.deps[0]));

    RewriteCert {
        r1_rates_assigned: rates_assigned,
        r2_no_under_rate_reads: no_under_rate,
        r3_adapters_shared: shared,
    }
}

// ── Display ─────────────────────────────────────────────────────────────────

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "variant {} (output {})", self.class_name(), self.output_rate())?;
        for &id in &self.schedule {
            let node = &self.graph[id];
            let rate = node.rate.map_or('?', |r| r.code());
            let deps: Vec<String> = node.deps.iter().map(|d| d.to_string()).collect();
            write!(f, "  {:<4} {} {}", id.to_string(), rate, node.describe())?;
            if !deps.is_empty() {
                write!(f, " <- {}", deps.join(", "))?;
            }
            if node.output_rate {
                write!(f, " [output_rate]")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
