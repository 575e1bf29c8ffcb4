//! End-to-end integration tests for the full pipeline
//!
//! Tests the complete flow: node creation → connection → dependency-ordered
//! execution → data arriving through the file-backed channels.

use pipegraph::error::PipeGraphError;
use pipegraph::graph::ProcessingGraph;
use pipegraph::port::{NodeId, PortRef};
use pipegraph::report::RunStatus;
use tempfile::TempDir;

/// Build the classic demo: const(3) and const(4) into an adder into a
/// printer. Returns the graph, the adder's output, and the printer id.
async fn adder_graph() -> (ProcessingGraph, PortRef, NodeId) {
    let mut g = ProcessingGraph::new();
    let c1 = g.create_node("c1", "const").await.unwrap();
    let c2 = g.create_node("c2", "const").await.unwrap();
    let a = g.create_node("a", "add").await.unwrap();
    let p = g.create_node("p", "print").await.unwrap();

    g.node_mut(c1).unwrap().set_param("value", "3").unwrap();
    g.node_mut(c2).unwrap().set_param("value", "4").unwrap();

    g.connect(&PortRef::output(c1, "out"), &PortRef::input(a, "summand1"))
        .unwrap();
    g.connect(&PortRef::output(c2, "out"), &PortRef::input(a, "summand2"))
        .unwrap();
    g.connect(&PortRef::output(a, "sum"), &PortRef::input(p, "in"))
        .unwrap();
    (g, PortRef::output(a, "sum"), p)
}

#[tokio::test]
async fn test_adder_pipeline_end_to_end() {
    let (mut g, sum_port, p) = adder_graph().await;

    let report = g.process(Some(&[p])).await.unwrap();
    assert!(report.success());
    assert_eq!(report.records.len(), 4);
    assert!(report
        .records
        .iter()
        .all(|r| r.status == RunStatus::Completed));

    // Producers precede consumers in the execution order
    let pos = |name: &str| {
        report
            .records
            .iter()
            .position(|r| r.name == name)
            .unwrap_or_else(|| panic!("{name} missing from report"))
    };
    assert!(pos("c1") < pos("a"));
    assert!(pos("c2") < pos("a"));
    assert!(pos("a") < pos("p"));

    // The printer received the byte-encoding of 7.0 through the channel
    let backing = g.port(&sum_port).unwrap().backing_path().unwrap();
    assert_eq!(std::fs::read(backing).unwrap(), b"7.0");
}

#[tokio::test]
async fn test_run_from_sinks_by_default() {
    let (mut g, sum_port, _) = adder_graph().await;
    let report = g.process(None).await.unwrap();
    assert!(report.success());
    assert_eq!(report.records.len(), 4);
    let backing = g.port(&sum_port).unwrap().backing_path().unwrap();
    assert_eq!(std::fs::read(backing).unwrap(), b"7.0");
}

#[tokio::test]
async fn test_repeated_runs_recompute() {
    let (mut g, sum_port, _) = adder_graph().await;
    g.process(None).await.unwrap();

    // Change an input and run again: read handles are rewound, so the
    // second run sees the new producer output
    let c1 = g.nodes().iter().find(|n| n.name == "c1").unwrap().id;
    g.node_mut(c1).unwrap().set_param("value", "10").unwrap();
    let report = g.process(None).await.unwrap();
    assert!(report.success());

    let backing = g.port(&sum_port).unwrap().backing_path().unwrap();
    assert_eq!(std::fs::read(backing).unwrap(), b"14.0");
}

#[tokio::test]
async fn test_bare_add_node_is_skipped_with_diagnostic() {
    let mut g = ProcessingGraph::new();
    let a = g.create_node("lonely", "add").await.unwrap();

    let report = g.process(Some(&[a])).await.unwrap();
    assert!(report.success(), "a skip is reported, not a failure");
    assert_eq!(report.records.len(), 1);
    assert_eq!(
        report.records[0].status,
        RunStatus::Skipped {
            unconnected: vec![
                "in:summand1".to_string(),
                "in:summand2".to_string(),
                "out:sum".to_string(),
            ]
        }
    );
}

#[tokio::test]
async fn test_fan_out_consumers_read_independently() {
    let dir = TempDir::new().unwrap();
    let sink1 = dir.path().join("sink1.txt");
    let sink2 = dir.path().join("sink2.txt");

    let mut g = ProcessingGraph::new();
    let c = g.create_node("c", "const").await.unwrap();
    let w1 = g.create_node("w1", "filewrite").await.unwrap();
    let w2 = g.create_node("w2", "filewrite").await.unwrap();

    g.node_mut(c).unwrap().set_param("value", "shared").unwrap();
    g.node_mut(w1)
        .unwrap()
        .set_param("filename", sink1.display().to_string())
        .unwrap();
    g.node_mut(w2)
        .unwrap()
        .set_param("filename", sink2.display().to_string())
        .unwrap();

    g.connect(&PortRef::output(c, "out"), &PortRef::input(w1, "in"))
        .unwrap();
    g.connect(&PortRef::output(c, "out"), &PortRef::input(w2, "in"))
        .unwrap();

    let report = g.process(None).await.unwrap();
    assert!(report.success());

    // Both consumers read the full payload from the one shared file
    assert_eq!(std::fs::read(&sink1).unwrap(), b"shared");
    assert_eq!(std::fs::read(&sink2).unwrap(), b"shared");
}

#[tokio::test]
async fn test_failing_node_aborts_the_rest_of_the_run() {
    let mut g = ProcessingGraph::new();
    let c1 = g.create_node("c1", "const").await.unwrap();
    let c2 = g.create_node("c2", "const").await.unwrap();
    let a = g.create_node("a", "add").await.unwrap();
    let p = g.create_node("p", "print").await.unwrap();

    // Not a number: the adder's handler raises, the node fails
    g.node_mut(c1).unwrap().set_param("value", "three").unwrap();
    g.node_mut(c2).unwrap().set_param("value", "4").unwrap();

    g.connect(&PortRef::output(c1, "out"), &PortRef::input(a, "summand1"))
        .unwrap();
    g.connect(&PortRef::output(c2, "out"), &PortRef::input(a, "summand2"))
        .unwrap();
    g.connect(&PortRef::output(a, "sum"), &PortRef::input(p, "in"))
        .unwrap();

    let report = g.process(None).await.unwrap();
    assert!(!report.success());

    // The constants ran, the adder failed, the printer never ran
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.records[2].name, "a");
    assert_eq!(report.records[2].status, RunStatus::Failed);
    assert!(!report.records.iter().any(|r| r.name == "p"));
}

#[tokio::test]
async fn test_partial_run_executes_only_ancestors() {
    let (mut g, _, _) = adder_graph().await;
    let a = g.nodes().iter().find(|n| n.name == "a").unwrap().id;

    let report = g.process(Some(&[a])).await.unwrap();
    assert!(report.success());

    let names: Vec<&str> = report.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["c1", "c2", "a"]);
}

#[tokio::test]
async fn test_cyclic_graph_reports_instead_of_truncating() {
    let mut g = ProcessingGraph::new();
    let a = g.create_node("a", "").await.unwrap();
    let b = g.create_node("b", "").await.unwrap();
    g.connect(&PortRef::output(a, "out"), &PortRef::input(b, "in"))
        .unwrap();
    g.connect(&PortRef::output(b, "out"), &PortRef::input(a, "in"))
        .unwrap();

    let result = g.process(None).await;
    assert!(matches!(result, Err(PipeGraphError::CycleDetected(_))));
}

#[tokio::test]
async fn test_fileread_to_filewrite_pipeline() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.txt");
    let sink = dir.path().join("sink.txt");
    std::fs::write(&source, "round and round").unwrap();

    let mut g = ProcessingGraph::new();
    let r = g.create_node("reader", "fileread").await.unwrap();
    let w = g.create_node("writer", "filewrite").await.unwrap();
    g.node_mut(r)
        .unwrap()
        .set_param("filename", source.display().to_string())
        .unwrap();
    g.node_mut(w)
        .unwrap()
        .set_param("filename", sink.display().to_string())
        .unwrap();
    g.connect(&PortRef::output(r, "out"), &PortRef::input(w, "in"))
        .unwrap();

    let report = g.process(None).await.unwrap();
    assert!(report.success());
    assert_eq!(std::fs::read(&sink).unwrap(), b"round and round");
}

/// Probe line plus pass-through execution, the full shell protocol.
const PASSTHROUGH_SCRIPT: &str = r#"#!/bin/bash
if [ "$#" -eq 0 ]; then
    echo "in;out"
    exit 0
fi
inputs="${1%%;*}"
outputs="${1#*;}"
cat "$inputs" > "$outputs"
"#;

#[tokio::test]
async fn test_bash_handler_probe_and_run() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("passthrough.bash");
    std::fs::write(&script, PASSTHROUGH_SCRIPT).unwrap();

    // The probe reads the filename parameter, so the bash node comes in
    // through a document where the parameter is set before the probe runs
    let doc = format!(
        r#"<graph>
  <node name="c" type="const">
    <params><param name="value" value="via bash"/></params>
    <ports><output name="out" id="0"><connection to="1"/></output></ports>
  </node>
  <node name="b" type="bash">
    <params><param name="filename" value="{}"/></params>
    <ports>
      <input name="in" id="1"/>
      <output name="out" id="2"/>
    </ports>
  </node>
</graph>"#,
        script.display()
    );
    let path = dir.path().join("graph.xml");
    std::fs::write(&path, doc).unwrap();

    let mut g = ProcessingGraph::new();
    g.load_from_file(&path).await.unwrap();
    let b = g.nodes().iter().find(|n| n.name == "b").unwrap().id;

    // Wire a consumer so the bash output has a backing file
    let sink = dir.path().join("sink.txt");
    let w = g.create_node("w", "filewrite").await.unwrap();
    g.node_mut(w)
        .unwrap()
        .set_param("filename", sink.display().to_string())
        .unwrap();
    g.connect(&PortRef::output(b, "out"), &PortRef::input(w, "in"))
        .unwrap();

    let report = g.process(None).await.unwrap();
    assert!(report.success());
    assert_eq!(std::fs::read(&sink).unwrap(), b"via bash");
}

#[tokio::test]
async fn test_bash_handler_nonzero_exit_fails_node() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("failing.bash");
    std::fs::write(
        &script,
        "#!/bin/bash\nif [ \"$#\" -eq 0 ]; then echo \";out\"; exit 0; fi\nexit 3\n",
    )
    .unwrap();

    let doc = format!(
        r#"<graph>
  <node name="b" type="bash">
    <params><param name="filename" value="{}"/></params>
    <ports><output name="out" id="0"><connection to="1"/></output></ports>
  </node>
  <node name="p" type="print">
    <params/>
    <ports><input name="in" id="1"/></ports>
  </node>
</graph>"#,
        script.display()
    );
    let path = dir.path().join("graph.xml");
    std::fs::write(&path, doc).unwrap();

    let mut g = ProcessingGraph::new();
    g.load_from_file(&path).await.unwrap();

    let report = g.process(None).await.unwrap();
    assert!(!report.success());
    let b = report.records.iter().find(|r| r.name == "b").unwrap();
    assert_eq!(b.status, RunStatus::Failed);
}
