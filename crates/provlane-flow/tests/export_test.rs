//! Graph export encodings

use provlane_flow::export::{export_graph, GraphFormat};
use provlane_flow::{GraphSnapshot, ProvenanceGraph};
use provlane_types::EventRecord;
use rstest::rstest;
use serde_json::json;
use std::path::{Path, PathBuf};

fn sample_graph() -> ProvenanceGraph {
    let mut graph = ProvenanceGraph::default();
    graph.apply(
        &EventRecord::parse(json!({
            "type": "action",
            "agent": "A",
            "sequence": 1,
            "start_time": 1.0,
            "model_output": "use <search> & \"quote\"",
            "tool_calls": [{"name": "search", "arguments": {"q": "x"}}],
            "observations": "ok",
        }))
        .unwrap(),
    );
    graph
}

#[test]
fn test_json_export_round_trips_snapshot() {
    let graph = sample_graph();
    let text = graph.export_as(GraphFormat::Json).unwrap();
    let parsed: GraphSnapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, graph.snapshot());
}

#[test]
fn test_gexf_contains_nodes_edges_and_escaped_text() {
    let gexf = sample_graph().export_as(GraphFormat::Gexf).unwrap();
    assert!(gexf.starts_with("<?xml"));
    assert!(gexf.contains(r#"<gexf xmlns="http://gexf.net/1.2" version="1.2">"#));
    assert!(gexf.contains(r#"<node id="agent:A" label="A">"#));
    assert!(gexf.contains(r#"source="agent:A" target="agent:A:step:1""#));
    assert!(gexf.contains(r#"<attvalue for="relation" value="calls_tool"/>"#));
    assert!(gexf.contains(r#"<attvalue for="index" value="0"/>"#));
    assert!(gexf.contains("use &lt;search&gt; &amp; &quot;quote&quot;"));
    assert!(!gexf.contains("<search>"));
}

#[test]
fn test_graphml_declares_keys_before_graph() {
    let graphml = sample_graph().export_as(GraphFormat::GraphMl).unwrap();
    let key_pos = graphml.find(r#"<key id="type""#).unwrap();
    let graph_pos = graphml.find("<graph ").unwrap();
    assert!(key_pos < graph_pos);
    assert!(graphml.contains(r#"<key id="n_content" for="node""#));
    assert!(graphml.contains(r#"<data key="type">tool_call</data>"#));
    assert!(graphml.contains(r#"<data key="relation">uses_tool</data>"#));
}

#[rstest]
#[case("json", GraphFormat::Json)]
#[case("GEXF", GraphFormat::Gexf)]
#[case("graphml", GraphFormat::GraphMl)]
fn test_format_names(#[case] name: &str, #[case] expected: GraphFormat) {
    assert_eq!(name.parse::<GraphFormat>().unwrap(), expected);
}

#[test]
fn test_empty_graph_exports_cleanly() {
    let empty = GraphSnapshot::default();
    for format in [GraphFormat::Json, GraphFormat::Gexf, GraphFormat::GraphMl] {
        assert!(!export_graph(&empty, format).unwrap().is_empty());
    }
}

#[rstest]
#[case(None, None, GraphFormat::Gexf, "run.gexf")]
#[case(None, Some("graphml"), GraphFormat::GraphMl, "run.graphml")]
#[case(Some("out/graph.json"), None, GraphFormat::Json, "out/graph.json")]
#[case(Some("graph.gexf"), Some("json"), GraphFormat::Json, "graph.gexf")]
#[case(Some("graph.dat"), None, GraphFormat::Gexf, "graph.dat")]
fn test_export_target_resolution(
    #[case] output: Option<&str>,
    #[case] format: Option<&str>,
    #[case] expected_format: GraphFormat,
    #[case] expected_path: &str,
) {
    let (resolved, path) =
        GraphFormat::resolve_target(Path::new("run.json"), output.map(PathBuf::from), format)
            .unwrap();
    assert_eq!(resolved, expected_format);
    assert_eq!(path, PathBuf::from(expected_path));
}

#[test]
fn test_export_target_rejects_unknown_format() {
    assert!(GraphFormat::resolve_target(Path::new("run.json"), None, Some("dot")).is_err());
}
