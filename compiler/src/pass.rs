// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the compiler's per-unit passes (parse and lower are outside the
// runner), their dependency edges, and the artifacts they produce. Used by
// the pipeline runner to compute minimal pass subsets for each --emit target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass (parse and lower excluded, handled before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Enumerate,
    Schedule,
    InferRates,
    Rewrite,
    Emit,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Combinations, // Vec<RateCombination>
    Order,        // Vec<NodeId>
    Rates,        // RateMap
    Variant,      // Variant
    Artifacts,    // UnitArtifacts
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics and logs.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// Whether the pass runs once per rate combination.
    pub per_variant: bool,
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::Enumerate => PassDescriptor {
            name: "enumerate",
            inputs: &[],
            outputs: &[ArtifactId::Combinations],
            per_variant: false,
            invariants: "no combination has constant output, commutative duplicates pruned",
        },
        PassId::Schedule => PassDescriptor {
            name: "schedule",
            inputs: &[PassId::Enumerate],
            outputs: &[ArtifactId::Order],
            per_variant: false,
            invariants: "S1-S3: reachable nodes once each, dependencies first",
        },
        PassId::InferRates => PassDescriptor {
            name: "infer_rates",
            inputs: &[PassId::Schedule],
            outputs: &[ArtifactId::Rates],
            per_variant: true,
            invariants: "every scheduled node has a rate, states at least block",
        },
        PassId::Rewrite => PassDescriptor {
            name: "rewrite",
            inputs: &[PassId::InferRates],
            outputs: &[ArtifactId::Variant],
            per_variant: true,
            invariants: "R1-R3: no under-rate reads, one adapter per dependency",
        },
        PassId::Emit => PassDescriptor {
            name: "emit",
            inputs: &[PassId::Rewrite],
            outputs: &[ArtifactId::Artifacts],
            per_variant: false,
            invariants: "valid C++ emitted, lookup table covers every variant",
        },
    }
}

/// Evidence that a pass met its postconditions.
pub trait StageCert {
    fn all_pass(&self) -> bool;
    fn obligations(&self) -> Vec<(&'static str, bool)>;

    /// Names of the failed obligations, comma separated.
    fn failures(&self) -> String {
        self.obligations()
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 5] = [
    PassId::Enumerate,
    PassId::Schedule,
    PassId::InferRates,
    PassId::Rewrite,
    PassId::Emit,
];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────
