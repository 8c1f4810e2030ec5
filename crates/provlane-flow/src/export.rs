//! Graph interchange encodings
//!
//! JSON is the canonical snapshot form (`{nodes, edges}`); GEXF and GraphML
//! carry the same nodes, edges and attributes for desktop graph tools.

use crate::error::{FlowError, FlowResult};
use crate::graph::GraphSnapshot;
use crate::utils::display_text;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Json,
    Gexf,
    GraphMl,
}

impl GraphFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            GraphFormat::Json => "json",
            GraphFormat::Gexf => "gexf",
            GraphFormat::GraphMl => "graphml",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            GraphFormat::Json => "application/json",
            GraphFormat::Gexf | GraphFormat::GraphMl => "application/xml",
        }
    }

    /// Format implied by a file extension; unknown or missing means GEXF
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or(GraphFormat::Gexf)
    }

    /// Resolve where and how to export the graph replayed from `input`.
    /// An explicit format name wins over the output extension; without an
    /// output path the file sits next to `input` with the format's extension.
    pub fn resolve_target(
        input: &Path,
        output: Option<PathBuf>,
        format: Option<&str>,
    ) -> FlowResult<(Self, PathBuf)> {
        let format = match (format, &output) {
            (Some(name), _) => name.parse()?,
            (None, Some(path)) => Self::from_path(path),
            (None, None) => GraphFormat::Gexf,
        };
        let output = output.unwrap_or_else(|| input.with_extension(format.extension()));
        Ok((format, output))
    }
}

impl FromStr for GraphFormat {
    type Err = FlowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(GraphFormat::Json),
            "gexf" => Ok(GraphFormat::Gexf),
            "graphml" => Ok(GraphFormat::GraphMl),
            other => Err(FlowError::UnsupportedFormat(other.to_string())),
        }
    }
}

pub fn export_graph(snapshot: &GraphSnapshot, format: GraphFormat) -> FlowResult<String> {
    match format {
        GraphFormat::Json => Ok(serde_json::to_string_pretty(snapshot)?),
        GraphFormat::Gexf => to_gexf(snapshot),
        GraphFormat::GraphMl => to_graphml(snapshot),
    }
}

/// Attribute names used across all nodes, in sorted order
fn node_attribute_names(snapshot: &GraphSnapshot) -> Vec<String> {
    snapshot
        .nodes
        .iter()
        .flat_map(|node| node.attributes.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn to_gexf(snapshot: &GraphSnapshot) -> FlowResult<String> {
    let attributes = node_attribute_names(snapshot);
    let mut out = String::new();
    let fmt_err = |e: std::fmt::Error| FlowError::serialization(e.to_string());

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#).map_err(fmt_err)?;
    writeln!(out, r#"<gexf xmlns="http://gexf.net/1.2" version="1.2">"#).map_err(fmt_err)?;
    writeln!(out, "  <meta>\n    <creator>provlane</creator>\n  </meta>").map_err(fmt_err)?;
    writeln!(out, r#"  <graph mode="static" defaultedgetype="directed">"#).map_err(fmt_err)?;

    writeln!(out, r#"    <attributes class="node">"#).map_err(fmt_err)?;
    writeln!(out, r#"      <attribute id="type" title="type" type="string"/>"#).map_err(fmt_err)?;
    for name in &attributes {
        writeln!(
            out,
            r#"      <attribute id="{0}" title="{0}" type="string"/>"#,
            xml_escape(name)
        )
        .map_err(fmt_err)?;
    }
    writeln!(out, "    </attributes>").map_err(fmt_err)?;
    writeln!(out, r#"    <attributes class="edge">"#).map_err(fmt_err)?;
    writeln!(out, r#"      <attribute id="relation" title="relation" type="string"/>"#)
        .map_err(fmt_err)?;
    writeln!(out, r#"      <attribute id="index" title="index" type="integer"/>"#)
        .map_err(fmt_err)?;
    writeln!(out, "    </attributes>").map_err(fmt_err)?;

    writeln!(out, "    <nodes>").map_err(fmt_err)?;
    for node in &snapshot.nodes {
        writeln!(
            out,
            r#"      <node id="{}" label="{}">"#,
            xml_escape(&node.id),
            xml_escape(&node.label)
        )
        .map_err(fmt_err)?;
        writeln!(out, "        <attvalues>").map_err(fmt_err)?;
        writeln!(
            out,
            r#"          <attvalue for="type" value="{}"/>"#,
            node.kind.as_str()
        )
        .map_err(fmt_err)?;
        for (name, value) in &node.attributes {
            writeln!(
                out,
                r#"          <attvalue for="{}" value="{}"/>"#,
                xml_escape(name),
                xml_escape(&display_text(value))
            )
            .map_err(fmt_err)?;
        }
        writeln!(out, "        </attvalues>\n      </node>").map_err(fmt_err)?;
    }
    writeln!(out, "    </nodes>").map_err(fmt_err)?;

    writeln!(out, "    <edges>").map_err(fmt_err)?;
    for (id, edge) in snapshot.edges.iter().enumerate() {
        writeln!(
            out,
            r#"      <edge id="{id}" source="{}" target="{}" label="{}">"#,
            xml_escape(&edge.source),
            xml_escape(&edge.target),
            edge.relation.as_str()
        )
        .map_err(fmt_err)?;
        writeln!(out, "        <attvalues>").map_err(fmt_err)?;
        writeln!(
            out,
            r#"          <attvalue for="relation" value="{}"/>"#,
            edge.relation.as_str()
        )
        .map_err(fmt_err)?;
        if let Some(index) = edge.index {
            writeln!(out, r#"          <attvalue for="index" value="{index}"/>"#)
                .map_err(fmt_err)?;
        }
        writeln!(out, "        </attvalues>\n      </edge>").map_err(fmt_err)?;
    }
    writeln!(out, "    </edges>\n  </graph>\n</gexf>").map_err(fmt_err)?;

    Ok(out)
}

pub fn to_graphml(snapshot: &GraphSnapshot) -> FlowResult<String> {
    let attributes = node_attribute_names(snapshot);
    let mut out = String::new();
    let fmt_err = |e: std::fmt::Error| FlowError::serialization(e.to_string());

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#).map_err(fmt_err)?;
    writeln!(
        out,
        r#"<graphml xmlns="http://graphml.graphdrawing.org/xmlns" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://graphml.graphdrawing.org/xmlns http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd">"#
    )
    .map_err(fmt_err)?;
    writeln!(
        out,
        r#"  <key id="type" for="node" attr.name="type" attr.type="string"/>"#
    )
    .map_err(fmt_err)?;
    writeln!(
        out,
        r#"  <key id="label" for="node" attr.name="label" attr.type="string"/>"#
    )
    .map_err(fmt_err)?;
    for name in &attributes {
        writeln!(
            out,
            r#"  <key id="n_{0}" for="node" attr.name="{0}" attr.type="string"/>"#,
            xml_escape(name)
        )
        .map_err(fmt_err)?;
    }
    writeln!(
        out,
        r#"  <key id="relation" for="edge" attr.name="relation" attr.type="string"/>"#
    )
    .map_err(fmt_err)?;
    writeln!(
        out,
        r#"  <key id="index" for="edge" attr.name="index" attr.type="int"/>"#
    )
    .map_err(fmt_err)?;
    writeln!(out, r#"  <graph id="provenance" edgedefault="directed">"#).map_err(fmt_err)?;

    for node in &snapshot.nodes {
        writeln!(out, r#"    <node id="{}">"#, xml_escape(&node.id)).map_err(fmt_err)?;
        writeln!(out, r#"      <data key="type">{}</data>"#, node.kind.as_str()).map_err(fmt_err)?;
        writeln!(out, r#"      <data key="label">{}</data>"#, xml_escape(&node.label))
            .map_err(fmt_err)?;
        for (name, value) in &node.attributes {
            writeln!(
                out,
                r#"      <data key="n_{}">{}</data>"#,
                xml_escape(name),
                xml_escape(&display_text(value))
            )
            .map_err(fmt_err)?;
        }
        writeln!(out, "    </node>").map_err(fmt_err)?;
    }

    for edge in &snapshot.edges {
        writeln!(
            out,
            r#"    <edge source="{}" target="{}">"#,
            xml_escape(&edge.source),
            xml_escape(&edge.target)
        )
        .map_err(fmt_err)?;
        writeln!(
            out,
            r#"      <data key="relation">{}</data>"#,
            edge.relation.as_str()
        )
        .map_err(fmt_err)?;
        if let Some(index) = edge.index {
            writeln!(out, r#"      <data key="index">{index}</data>"#).map_err(fmt_err)?;
        }
        writeln!(out, "    </edge>").map_err(fmt_err)?;
    }
    writeln!(out, "  </graph>\n</graphml>").map_err(fmt_err)?;

    Ok(out)
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\n' => escaped.push_str("&#10;"),
            c if (c as u32) < 0x20 && c != '\t' && c != '\r' => {}
            c => escaped.push(c),
        }
    }
    escaped
}
