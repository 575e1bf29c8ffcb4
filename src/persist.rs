//! XML persistence for the processing graph
//!
//! The document carries one element per node with its name and handler
//! type tag, a parameters block, and a ports block; each output port lists
//! the ids of the input ports it feeds. Loading is all-or-nothing: any
//! failure leaves the graph empty, never partially populated.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use quick_xml::se::Serializer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipeGraphError, Result};
use crate::graph::ProcessingGraph;
use crate::handlers::Handler;
use crate::port::{Direction, Port, PortRef};

/// Size limit for graph documents.
pub const MAX_DOC_SIZE: usize = 1_048_576; // 1 MB

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename = "graph")]
pub struct GraphDoc {
    #[serde(rename = "node", default)]
    pub nodes: Vec<NodeDoc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeDoc {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub kind: String,
    #[serde(default)]
    pub params: ParamsDoc,
    #[serde(default)]
    pub ports: PortsDoc,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ParamsDoc {
    #[serde(rename = "param", default)]
    pub params: Vec<ParamDoc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamDoc {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value")]
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PortsDoc {
    #[serde(rename = "input", default)]
    pub inputs: Vec<InputPortDoc>,
    #[serde(rename = "output", default)]
    pub outputs: Vec<OutputPortDoc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputPortDoc {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@id")]
    pub id: u32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputPortDoc {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@id")]
    pub id: u32,
    #[serde(rename = "connection", default)]
    pub connections: Vec<ConnectionDoc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionDoc {
    #[serde(rename = "@to")]
    pub to: u32,
}

/// Assign a persistence id to every port that lacks one. Ids stick across
/// subsequent saves.
fn assign_persist_ids(graph: &mut ProcessingGraph) {
    let mut next = graph.next_persist_id;
    for node in graph.nodes_mut() {
        for port in node.ports_mut() {
            if port.persist_id.is_none() {
                port.persist_id = Some(next);
                next += 1;
            }
        }
    }
    graph.next_persist_id = next;
}

/// Build the document model for a graph, assigning persistence ids first.
pub(crate) fn graph_to_doc(graph: &mut ProcessingGraph) -> GraphDoc {
    assign_persist_ids(graph);

    let mut nodes = Vec::with_capacity(graph.nodes().len());
    for node in graph.nodes() {
        // BTreeMap iteration keeps the parameter block deterministic
        let params = node
            .handler
            .params()
            .iter()
            .map(|(name, value)| ParamDoc {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();

        let inputs = node
            .inputs()
            .iter()
            .map(|port| InputPortDoc {
                name: port.name.clone(),
                id: port.persist_id.expect("assigned in id pass"),
            })
            .collect();

        let outputs = node
            .outputs()
            .iter()
            .map(|port| OutputPortDoc {
                name: port.name.clone(),
                id: port.persist_id.expect("assigned in id pass"),
                connections: port
                    .peers()
                    .iter()
                    .filter_map(|peer| {
                        graph.port(peer).ok().and_then(|p| p.persist_id)
                    })
                    .map(|to| ConnectionDoc { to })
                    .collect(),
            })
            .collect();

        nodes.push(NodeDoc {
            name: node.name.clone(),
            kind: node.handler.kind().as_tag().to_string(),
            params: ParamsDoc { params },
            ports: PortsDoc { inputs, outputs },
        });
    }
    GraphDoc { nodes }
}

/// Serialize a graph to XML text.
pub fn graph_to_string(graph: &mut ProcessingGraph) -> Result<String> {
    let doc = graph_to_doc(graph);
    let mut buffer = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let mut serializer = Serializer::new(&mut buffer);
    serializer.indent(' ', 2);
    doc.serialize(serializer)?;
    buffer.push('\n');
    Ok(buffer)
}

/// Write a graph to an XML file.
pub fn save_graph_file<P: AsRef<Path>>(graph: &mut ProcessingGraph, path: P) -> Result<()> {
    let content = graph_to_string(graph)?;
    fs::write(path.as_ref(), content)?;
    info!(
        path = %path.as_ref().display(),
        nodes = graph.len(),
        "Saved graph"
    );
    Ok(())
}

/// Replace `graph` with the contents of an XML file. On any failure the
/// graph ends up empty.
pub async fn load_graph_file<P: AsRef<Path>>(graph: &mut ProcessingGraph, path: P) -> Result<()> {
    graph.clear();
    if let Err(e) = load_inner(graph, path.as_ref()).await {
        graph.clear();
        return Err(e);
    }
    info!(path = %path.as_ref().display(), nodes = graph.len(), "Loaded graph");
    Ok(())
}

async fn load_inner(graph: &mut ProcessingGraph, path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)?;
    if content.len() > MAX_DOC_SIZE {
        return Err(PipeGraphError::DocumentTooLarge(content.len()));
    }
    let doc: GraphDoc = quick_xml::de::from_str(&content)?;
    restore_graph(graph, &doc).await
}

/// Rebuild a graph from its document model.
///
/// Nodes go through the same construction path as `create_node` (so probe
/// hooks run), then their constructor-derived ports are discarded and
/// rebuilt from the document. Parameters are inserted raw, without schema
/// validation. Connections replay through `connect`, creating backing files
/// fresh.
pub(crate) async fn restore_graph(graph: &mut ProcessingGraph, doc: &GraphDoc) -> Result<()> {
    let mut inputs_by_id: HashMap<u32, PortRef> = HashMap::new();
    let mut seen_ids: HashSet<u32> = HashSet::new();
    let mut max_id = 0u32;
    let mut connections: Vec<(PortRef, u32)> = Vec::new();

    for node_doc in &doc.nodes {
        let id = graph.create_node(&node_doc.name, &node_doc.kind).await?;
        let node = graph.node_mut(id)?;

        for param in &node_doc.params.params {
            node.handler
                .params_mut()
                .insert(param.name.clone(), param.value.clone());
        }
        // Probing handlers see default parameters during create_node; run
        // the hook again now that the saved parameters are in place
        node.handler.init().await;

        let mut inputs = Vec::with_capacity(node_doc.ports.inputs.len());
        for input in &node_doc.ports.inputs {
            if !seen_ids.insert(input.id) {
                return Err(PipeGraphError::MalformedDocument(format!(
                    "duplicate port id {}",
                    input.id
                )));
            }
            max_id = max_id.max(input.id);
            let mut port = Port::new(id, &input.name, Direction::In);
            port.persist_id = Some(input.id);
            inputs_by_id.insert(input.id, PortRef::input(id, &input.name));
            inputs.push(port);
        }

        let mut outputs = Vec::with_capacity(node_doc.ports.outputs.len());
        for output in &node_doc.ports.outputs {
            if !seen_ids.insert(output.id) {
                return Err(PipeGraphError::MalformedDocument(format!(
                    "duplicate port id {}",
                    output.id
                )));
            }
            max_id = max_id.max(output.id);
            let mut port = Port::new(id, &output.name, Direction::Out);
            port.persist_id = Some(output.id);
            outputs.push(port);
            for connection in &output.connections {
                connections.push((PortRef::output(id, &output.name), connection.to));
            }
        }

        node.replace_ports(inputs, outputs);
        debug!(node = %node_doc.name, "Restored node");
    }

    for (from, to_id) in connections {
        let to = inputs_by_id
            .get(&to_id)
            .ok_or_else(|| {
                PipeGraphError::MalformedDocument(format!(
                    "connection to unknown input port id {to_id}"
                ))
            })?
            .clone();
        graph.connect(&from, &to)?;
    }

    if !seen_ids.is_empty() {
        graph.next_persist_id = graph.next_persist_id.max(max_id + 1);
    }
    Ok(())
}
