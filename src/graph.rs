//! The processing graph: node collection, channel lifecycle, execution

use std::fs::File;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dag::DependencyDag;
use crate::error::{PipeGraphError, Result};
use crate::handlers::{BuiltinHandler, Handler, HandlerKind};
use crate::node::Node;
use crate::persist;
use crate::port::{Direction, NodeId, Port, PortRef};
use crate::report::{NodeRunRecord, RunReport, RunStatus};

/// An ordered collection of nodes and the operations on them: creation,
/// connection management, dependency-ordered execution, and persistence.
#[derive(Debug, Default)]
pub struct ProcessingGraph {
    nodes: Vec<Node>,
    next_node_id: u32,
    pub(crate) next_persist_id: u32,
}

impl ProcessingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node wrapping the handler the type tag names.
    ///
    /// The handler's `init` hook runs before ports are derived, so handlers
    /// that probe for their port spec (bash) declare ports here.
    pub async fn create_node(&mut self, name: &str, type_tag: &str) -> Result<NodeId> {
        let kind: HandlerKind = type_tag.parse()?;
        let mut handler = BuiltinHandler::new(kind);
        handler.init().await;

        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        debug!(node = name, %id, tag = type_tag, "Created node");
        self.nodes.push(Node::new(id, name, handler));
        Ok(id)
    }

    /// Remove a node, disconnecting every port (and releasing backing
    /// files) first.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let mut pairs = Vec::new();
        for port in node.inputs() {
            for peer in port.peers() {
                pairs.push((peer.clone(), PortRef::input(id, &port.name)));
            }
        }
        for port in node.outputs() {
            for peer in port.peers() {
                pairs.push((PortRef::output(id, &port.name), peer.clone()));
            }
        }
        for (from, to) in pairs {
            if let Err(e) = self.disconnect(&from, &to) {
                warn!("Disconnect during node removal failed: {e}");
            }
        }

        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or(PipeGraphError::UnknownNode(id.0))?;
        self.nodes.remove(index);
        Ok(())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .ok_or(PipeGraphError::UnknownNode(id.0))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(PipeGraphError::UnknownNode(id.0))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node. Backing files are released with their ports.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.next_persist_id = 0;
    }

    pub fn port(&self, r: &PortRef) -> Result<&Port> {
        let node = self.node(r.node)?;
        node.port(r.direction, &r.name)
            .ok_or_else(|| PipeGraphError::UnknownPort {
                node: node.name.clone(),
                direction: r.direction.to_string(),
                port: r.name.clone(),
            })
    }

    fn port_mut(&mut self, r: &PortRef) -> Result<&mut Port> {
        let node = self.node_mut(r.node)?;
        let name = node.name.clone();
        node.port_mut(r.direction, &r.name)
            .ok_or_else(|| PipeGraphError::UnknownPort {
                node: name,
                direction: r.direction.to_string(),
                port: r.name.clone(),
            })
    }

    /// Human-readable `node.port` label for diagnostics.
    fn port_label(&self, r: &PortRef) -> String {
        match self.node(r.node) {
            Ok(node) => format!("{}.{}", node.name, r.name),
            Err(_) => r.to_string(),
        }
    }

    /// Connect an output port to an input port.
    ///
    /// Arguments may come in either order; same-direction pairs and already
    /// occupied inputs are reported without mutating anything. On success
    /// the producer's backing file exists (created lazily on the first
    /// consumer) and the consumer holds a fresh read handle on it.
    pub fn connect(&mut self, a: &PortRef, b: &PortRef) -> Result<()> {
        if a.direction == b.direction {
            return Err(PipeGraphError::DirectionMismatch {
                from: self.port_label(a),
                to: self.port_label(b),
            });
        }
        let (from, to) = if a.direction == Direction::Out {
            (a, b)
        } else {
            (b, a)
        };

        self.port(from)?;
        if self.port(to)?.is_connected() {
            return Err(PipeGraphError::InputOccupied {
                port: self.port_label(to),
            });
        }

        let path = self.port_mut(from)?.ensure_backing_file()?;
        let reader = match File::open(&path) {
            Ok(reader) => reader,
            Err(e) => {
                // Roll back a backing file created for this connection only
                let producer = self.port_mut(from)?;
                if !producer.is_connected() {
                    producer.release_channel();
                }
                return Err(e.into());
            }
        };
        self.port_mut(to)?.attach_reader(path, reader);

        self.port_mut(from)?.add_peer(to.clone());
        self.port_mut(to)?.add_peer(from.clone());
        debug!(
            from = %self.port_label(from),
            to = %self.port_label(to),
            "Connected ports"
        );
        Ok(())
    }

    /// Undo a connection. The consumer's read handle is dropped; when the
    /// producer loses its last consumer its backing file is deleted.
    pub fn disconnect(&mut self, a: &PortRef, b: &PortRef) -> Result<()> {
        if a.direction == b.direction {
            return Err(PipeGraphError::NotConnected {
                from: self.port_label(a),
                to: self.port_label(b),
            });
        }
        let (from, to) = if a.direction == Direction::Out {
            (a, b)
        } else {
            (b, a)
        };

        if !self.port(from)?.peers().contains(to) || !self.port(to)?.peers().contains(from) {
            return Err(PipeGraphError::NotConnected {
                from: self.port_label(from),
                to: self.port_label(to),
            });
        }

        self.port_mut(from)?.remove_peer(to);
        self.port_mut(to)?.remove_peer(from);
        self.port_mut(to)?.release_channel();
        let producer = self.port_mut(from)?;
        if !producer.is_connected() {
            producer.release_channel();
        }
        debug!(
            from = %self.port_label(from),
            to = %self.port_label(to),
            "Disconnected ports"
        );
        Ok(())
    }

    /// Every node with no output ports or with only unconnected outputs.
    pub fn sinks(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_sink())
            .map(|n| n.id)
            .collect()
    }

    /// Execute the graph in dependency order, sources before the sinks that
    /// consume them.
    ///
    /// `start` limits the run to the given nodes and their ancestors; `None`
    /// runs from every sink and validates acyclicity up front. Nodes run
    /// strictly one after another; a failed node aborts the rest of the
    /// schedule and the report flags the run as failed.
    pub async fn process(&mut self, start: Option<&[NodeId]>) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let run_start = Instant::now();

        let dag = DependencyDag::build(self);
        if start.is_none() {
            dag.validate_acyclic()?;
        }
        let start_ids = match start {
            Some(ids) => ids.to_vec(),
            None => self.sinks(),
        };
        info!(%run_id, start = ?start_ids, "Starting graph run");

        let visitation = dag.visitation_order(&start_ids)?;
        debug!(?visitation, "Visitation order (start set toward sources)");

        let mut records = Vec::new();
        for &id in visitation.iter().rev() {
            let node = self.node_mut(id)?;
            let name = node.name.clone();
            info!(node = %name, "Processing node");

            let node_start = Instant::now();
            let status = node.process().await;
            let failed = matches!(status, RunStatus::Failed);
            records.push(NodeRunRecord {
                node: id,
                name: name.clone(),
                status,
                duration: node_start.elapsed(),
            });

            if failed {
                error!(node = %name, "Node failed, aborting run");
                break;
            }
        }

        let report = RunReport {
            run_id,
            started_at,
            duration: run_start.elapsed(),
            records,
        };
        if report.success() {
            info!(%run_id, "Graph run completed");
        } else {
            error!(%run_id, "Graph run failed");
        }
        Ok(report)
    }

    /// Write the graph to an XML document. Persistence ids are assigned on
    /// first save and stick for subsequent saves.
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        persist::save_graph_file(self, path)
    }

    /// Replace this graph with the one in the given XML document.
    ///
    /// The current nodes are cleared first; on any failure the graph is
    /// left empty, never partially populated.
    pub async fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        persist::load_graph_file(self, path).await
    }
}
