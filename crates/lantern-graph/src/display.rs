//! Text dump of a graph for diagnostics.

use std::fmt::Write;

use crate::graph::{Graph, NodeKind, Value};

fn format_value(value: Value) -> String {
    match value {
        Value::Node(h) => format!("%{}", h.index()),
        Value::Var(h) => format!("${}", h.index()),
    }
}

/// Renders a graph as text: one line per node, then one per variable.
///
/// The listing is deterministic for structurally identical graphs, so it
/// doubles as a cheap structural fingerprint.
pub fn dump_graph(graph: &Graph) -> String {
    let mut out = String::new();

    writeln!(out, "Nodes:").unwrap();
    for (handle, node) in graph.nodes() {
        write!(
            out,
            "  %{} = {} \"{}\" : {}",
            handle.index(),
            node.kind.op_name(),
            node.name,
            node.ty
        )
        .unwrap();
        let inputs = node.kind.inputs();
        if !inputs.is_empty() {
            let args: Vec<String> = inputs.into_iter().map(format_value).collect();
            write!(out, " ({})", args.join(", ")).unwrap();
        }
        match &node.kind {
            NodeKind::Transpose { shuffle, .. } => {
                write!(out, " shuffle={shuffle:?}").unwrap();
            }
            NodeKind::Concat { dim, .. } => {
                write!(out, " dim={dim}").unwrap();
            }
            NodeKind::BatchNormalization { channel_idx, .. } => {
                write!(out, " channel={channel_idx}").unwrap();
            }
            _ => {}
        }
        writeln!(out, " [{} users]", node.num_users()).unwrap();
    }

    writeln!(out, "Variables:").unwrap();
    for (handle, var) in graph.variables() {
        writeln!(
            out,
            "  ${} \"{}\" : {} [{} users]",
            handle.index(),
            var.name,
            var.ty,
            var.num_users()
        )
        .unwrap();
    }

    out
}
