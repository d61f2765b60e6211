// dot.rs — Graphviz DOT output for compiled unit variants
//
// Renders each variant of a unit as a cluster: nodes are filled by rate,
// shaped by kind, and adapters stand out as diamonds (upsample) or notes
// (cached temporaries). State recurrence edges are dashed and initial
// value edges dotted, since neither is evaluated in ordinary data order.
//
// Preconditions: every variant passed `verify_rewrite`.
// Postconditions: returns a valid DOT string.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use crate::id::NodeId;
use crate::node::*;
use crate::rate::Rate;
use crate::rewrite::Variant;

/// Emit all variants of one unit as a Graphviz DOT string.
pub fn emit_dot(unit: &str, variants: &[Variant]) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "digraph {} {{", sanitize(unit));
    let _ = writeln!(buf, "    rankdir=LR;");
    let _ = writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];");
    let _ = writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];");

    for variant in variants {
        let class = variant.class_name();
        let prefix = sanitize(&class);
        let _ = writeln!(buf);
        let _ = writeln!(buf, "    subgraph cluster_{prefix} {{");
        let _ = writeln!(buf, "        label=\"{class}\";");
        let _ = writeln!(buf, "        style=rounded;");
        let _ = writeln!(buf, "        color=gray50;");
        write_variant(&mut buf, &prefix, variant);
        let _ = writeln!(buf, "    }}");
    }

    let _ = writeln!(buf, "}}");
    buf
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn dot_node_id(prefix: &str, node: NodeId) -> String {
    format!("{prefix}_n{}", node.0)
}

fn node_label(node: &Node) -> String {
    let base = match &node.kind {
        NodeKind::Constant(lit) => lit.code(),
        NodeKind::Unary(op) => op.clone(),
        NodeKind::Binary(op) => op.symbol().to_string(),
        NodeKind::BinaryFn(func) => func.clone(),
        NodeKind::Subscript => "[]".to_string(),
        NodeKind::Conditional => "?:".to_string(),
        NodeKind::Upsample => format!("^{}", node.name.as_deref().unwrap_or("")),
        NodeKind::Parameter { .. } | NodeKind::Variable(_) | NodeKind::State => {
            node.name.clone().unwrap_or_default()
        }
    };
    let rate = node.rate.map_or('?', Rate::code);
    format!("{} ({rate})", base.replace('"', "\\\""))
}

fn node_attrs(node: &Node) -> String {
    let shape = match node.kind {
        NodeKind::Parameter { .. } => "invhouse",
        NodeKind::State => "box3d",
        NodeKind::Variable(VarOrigin::Declared) => "box",
        NodeKind::Variable(VarOrigin::CachedTemp) => "note",
        NodeKind::Upsample => "diamond",
        NodeKind::Constant(_) => "plaintext",
        _ => "ellipse",
    };
    let color = match node.rate {
        Some(Rate::Audio) => "lightsalmon",
        Some(Rate::Block) => "lightblue",
        Some(Rate::Constant) | None => "gray90",
    };
    format!(
        "shape={shape}, style=filled, fillcolor={color}, label=\"{}\"",
        node_label(node)
    )
}

fn write_variant(buf: &mut String, prefix: &str, variant: &Variant) {
    let graph = &variant.graph;
    for &id in &variant.schedule {
        let node = &graph[id];
        let mut attrs = node_attrs(node);
        if id == variant.output {
            attrs.push_str(", penwidth=2");
        }
        let _ = writeln!(buf, "        {} [{attrs}];", dot_node_id(prefix, id));
    }
    for &id in &variant.schedule {
        let node = &graph[id];
        for (slot, &dep) in node.deps.iter().enumerate() {
            let style = match (node.is_state(), slot) {
                (true, 0) => " [style=dotted]",
                (true, _) => " [style=dashed, constraint=false]",
                _ => "",
            };
            let _ = writeln!(
                buf,
                "        {} -> {}{style};",
                dot_node_id(prefix, dep),
                dot_node_id(prefix, id)
            );
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
