//! Graphviz rendering of a lowered logical graph: one cluster per vertex,
//! holding the vertex's origin expression and a table node per lowered
//! lambda listing its instructions.

use crate::expr::render;
use crate::graph::{LGraph, VertexId};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::process::{Command, Stdio};

const ORIGIN_TINT: &str = "#E1BEE7";
const LAMBDA_TINT: &str = "#E3F2FD";

/// Renders the graph to DOT text.
pub fn render_dot(graph: &LGraph) -> String {
    let mut dot = DotBuilder::new();
    dot.open_graph("lowered");

    for (vid, vertex) in &graph.vertices {
        dot.open_vertex_cluster(*vid);

        let origin_id = format!("origin_{}", vid.0);
        let origin_text = match vertex.origin {
            Some(origin) => render(&graph.exprs, origin),
            None => "(synthetic)".to_string(),
        };
        dot.table_node(&origin_id, ORIGIN_TINT, "origin", [origin_text.as_str()]);

        for (lambda, body) in &vertex.lowered {
            let node_id = format!("lambda_{}_{}", vid.0, lambda.0);
            let header = render(&graph.exprs, *lambda);
            let listing = body.render();
            dot.table_node(&node_id, LAMBDA_TINT, &header, listing.lines());
            dot.arrow(&origin_id, &node_id);
        }

        dot.close_block();
    }

    dot.close_block();
    dot.finish()
}

/// Renders the graph to an SVG byte vector via the `dot` binary.
pub fn render_svg(graph: &LGraph) -> io::Result<Vec<u8>> {
    let dot_text = render_dot(graph);

    let mut child = Command::new("dot")
        .arg("-Tsvg")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "dot stdin unavailable"))?;
    stdin.write_all(dot_text.as_bytes())?;
    // Closing stdin lets dot see end-of-input and finish.
    drop(stdin);

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "dot -Tsvg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    Ok(output.stdout)
}

/// Accumulates the DOT text for one rendering. Label text is escaped at the
/// point a table node is written, so callers pass plain strings.
struct DotBuilder {
    out: String,
    depth: usize,
}

impl DotBuilder {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open_graph(&mut self, name: &str) {
        self.line(&format!("digraph {} {{", name));
        self.depth += 1;
        self.line("rankdir=TB;");
        self.line("fontname=\"Helvetica\";");
        // Table nodes carry their own borders; the default shape stays bare.
        self.line("node [shape=plain fontname=\"Helvetica\" fontsize=12];");
        self.line("edge [color=\"#555555\"];");
    }

    fn open_vertex_cluster(&mut self, vid: VertexId) {
        self.line(&format!("subgraph cluster_v{} {{", vid.0));
        self.depth += 1;
        self.line(&format!("label=\"vertex {}\";", vid.0));
        self.line("style=\"rounded,filled\";");
        self.line("color=\"#f8f9fa\";");
    }

    /// Closes the innermost open cluster or the graph itself.
    fn close_block(&mut self) {
        self.depth -= 1;
        self.line("}");
    }

    /// A one-column HTML table: a tinted bold header row followed by
    /// left-aligned body rows.
    fn table_node<'r>(
        &mut self,
        id: &str,
        tint: &str,
        header: &str,
        rows: impl IntoIterator<Item = &'r str>,
    ) {
        let mut label = format!(
            r#"<TABLE BORDER="0" CELLBORDER="1" CELLSPACING="0" CELLPADDING="4"><TR><TD BGCOLOR="{}"><B>{}</B></TD></TR>"#,
            tint,
            escape_html(header)
        );
        for row in rows {
            let _ = write!(
                label,
                r#"<TR><TD ALIGN="LEFT">{}</TD></TR>"#,
                escape_html(row)
            );
        }
        label.push_str("</TABLE>");
        self.line(&format!("{} [label=<{}>];", id, label));
    }

    fn arrow(&mut self, from: &str, to: &str) {
        self.line(&format!("{} -> {};", from, to));
    }

    fn finish(self) -> String {
        self.out
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
