// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Emission of Mermaid flowchart source for a topology [`Graph`].

use std::fmt::Write;

use crate::area::Area;
use crate::graph::{Edge, Graph, Node, NodeKind, Relation};

/// Fill, stroke, and text colors for one node class.
struct Style {
    class: &'static str,
    fill: &'static str,
    stroke: &'static str,
    color: &'static str,
}

const fn style(
    class: &'static str,
    fill: &'static str,
    stroke: &'static str,
    color: &'static str,
) -> Style {
    Style {
        class,
        fill,
        stroke,
        color,
    }
}

const LIGHT: [Style; 8] = [
    style("zone", "#1e293b", "#0f172a", "#f8fafc"),
    style("email", "#fef3c7", "#d97706", "#451a03"),
    style("web", "#dbeafe", "#2563eb", "#172554"),
    style("infra", "#ede9fe", "#7c3aed", "#2e1065"),
    style("misc", "#f1f5f9", "#64748b", "#0f172a"),
    style("host", "#ffffff", "#94a3b8", "#0f172a"),
    style("addr", "#dcfce7", "#16a34a", "#052e16"),
    style("service", "#fce7f3", "#db2777", "#500724"),
];

const DARK: [Style; 8] = [
    style("zone", "#e2e8f0", "#f8fafc", "#0f172a"),
    style("email", "#78350f", "#f59e0b", "#fef3c7"),
    style("web", "#1e3a8a", "#60a5fa", "#dbeafe"),
    style("infra", "#4c1d95", "#a78bfa", "#ede9fe"),
    style("misc", "#334155", "#94a3b8", "#f1f5f9"),
    style("host", "#0f172a", "#64748b", "#e2e8f0"),
    style("addr", "#14532d", "#4ade80", "#dcfce7"),
    style("service", "#831843", "#f472b6", "#fce7f3"),
];

/// Produces the Mermaid source of `graph`. Nodes and edges are emitted
/// in the graph's order, so equal graphs give equal source.
pub fn render_mermaid(graph: &Graph, dark_mode: bool) -> String {
    let (theme, styles) = if dark_mode {
        ("dark", &DARK)
    } else {
        ("default", &LIGHT)
    };

    // Writing to a String cannot fail.
    let mut out = String::new();
    let _ = writeln!(out, "%%{{init: {{\"theme\": \"{}\"}}}}%%", theme);
    out.push_str("flowchart LR\n");
    for style in styles.iter() {
        let _ = writeln!(
            out,
            "  classDef {} fill:{},stroke:{},color:{}",
            style.class, style.fill, style.stroke, style.color,
        );
    }
    for node in graph.nodes() {
        write_node(&mut out, node);
    }
    for edge in graph.edges() {
        write_edge(&mut out, edge);
    }
    out
}

fn write_node(out: &mut String, node: &Node) {
    let label = escape_label(&node.label);
    let _ = match node.kind {
        NodeKind::Zone => writeln!(out, "  {}[[\"{}\"]]:::zone", node.id, label),
        NodeKind::Record => writeln!(
            out,
            "  {}[\"{}\"]:::{}",
            node.id,
            label,
            node.area.unwrap_or(Area::Misc)
        ),
        NodeKind::Hostname => writeln!(out, "  {}([\"{}\"]):::host", node.id, label),
        NodeKind::Address => writeln!(out, "  {}{{{{\"{}\"}}}}:::addr", node.id, label),
        NodeKind::Service => writeln!(out, "  {}[/\"{}\"/]:::service", node.id, label),
    };
}

fn write_edge(out: &mut String, edge: &Edge) {
    let text = match edge.relation {
        Relation::Contains | Relation::Target => None,
        relation => Some(relation.as_str()),
    };
    let _ = match (edge.external, text) {
        (false, None) => writeln!(out, "  {} --> {}", edge.from, edge.to),
        (false, Some(text)) => writeln!(out, "  {} -->|{}| {}", edge.from, text, edge.to),
        (true, None) => writeln!(out, "  {} -.-> {}", edge.from, edge.to),
        (true, Some(text)) => writeln!(out, "  {} -. {} .-> {}", edge.from, text, edge.to),
    };
}

/// Escapes a label for use inside a double-quoted Mermaid string.
fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '#' => out.push_str("#35;"),
            '"' => out.push_str("#quot;"),
            '<' => out.push_str("#lt;"),
            '>' => out.push_str("#gt;"),
            '\n' => out.push_str("<br/>"),
            '\r' => (),
            c => out.push(c),
        }
    }
    out
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
