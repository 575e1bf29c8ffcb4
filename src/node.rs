//! Nodes bundle a handler with the ports it declares

use crate::error::{PipeGraphError, Result};
use crate::handlers::{BuiltinHandler, Handler};
use crate::port::{Direction, NodeId, Port, PortRef};
use crate::report::RunStatus;
use tracing::{error, warn};

/// One processing step in the graph: a handler instance plus the ports
/// derived from its port spec at construction. Names are not required to be
/// unique across the graph.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub handler: BuiltinHandler,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: impl Into<String>, handler: BuiltinHandler) -> Self {
        let spec = handler.port_spec();
        let inputs = spec
            .inputs
            .iter()
            .map(|n| Port::new(id, n, Direction::In))
            .collect();
        let outputs = spec
            .outputs
            .iter()
            .map(|n| Port::new(id, n, Direction::Out))
            .collect();
        Self {
            id,
            name: name.into(),
            handler,
            inputs,
            outputs,
        }
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub fn port(&self, direction: Direction, name: &str) -> Option<&Port> {
        let ports = match direction {
            Direction::In => &self.inputs,
            Direction::Out => &self.outputs,
        };
        ports.iter().find(|p| p.name == name)
    }

    pub(crate) fn port_mut(&mut self, direction: Direction, name: &str) -> Option<&mut Port> {
        let ports = match direction {
            Direction::In => &mut self.inputs,
            Direction::Out => &mut self.outputs,
        };
        ports.iter_mut().find(|p| p.name == name)
    }

    pub(crate) fn ports_mut(&mut self) -> impl Iterator<Item = &mut Port> {
        self.inputs.iter_mut().chain(self.outputs.iter_mut())
    }

    /// Replace every port. Used by the loader, which discards the
    /// constructor-derived ports and rebuilds them from the saved document.
    pub(crate) fn replace_ports(&mut self, inputs: Vec<Port>, outputs: Vec<Port>) {
        self.inputs = inputs;
        self.outputs = outputs;
    }

    /// A sink has no output ports, or none of its outputs has a consumer.
    pub fn is_sink(&self) -> bool {
        self.outputs.iter().all(|p| !p.is_connected())
    }

    /// Set a parameter, rejecting names the handler did not declare at
    /// construction. The persistence loader bypasses this check.
    pub fn set_param(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        if !self.handler.params().contains_key(name) {
            return Err(PipeGraphError::UnknownParam {
                node: self.name.clone(),
                param: name.to_string(),
            });
        }
        self.handler.params_mut().insert(name.to_string(), value.into());
        Ok(())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.handler.params().get(name).map(String::as_str)
    }

    /// True only if every input port is current and the handler reports
    /// current. Always false today; headroom for future caching.
    pub fn is_up_to_date(&self) -> bool {
        self.inputs.iter().all(|p| p.is_up_to_date()) && self.handler.is_up_to_date()
    }

    /// Collect backing paths in port-spec order and invoke the handler.
    ///
    /// A port without a backing channel makes this a skip, reported with the
    /// exact list of unconnected ports. A handler error is caught here and
    /// becomes a failure result; it never crosses the node boundary.
    pub async fn process(&mut self) -> RunStatus {
        let spec = self.handler.port_spec().clone();

        let mut unconnected = Vec::new();
        let mut input_paths = Vec::with_capacity(spec.inputs.len());
        for name in &spec.inputs {
            match self
                .port(Direction::In, name)
                .and_then(|p| p.backing_path())
            {
                Some(path) => input_paths.push(path.to_path_buf()),
                None => unconnected.push(format!("in:{name}")),
            }
        }
        let mut output_paths = Vec::with_capacity(spec.outputs.len());
        for name in &spec.outputs {
            match self
                .port(Direction::Out, name)
                .and_then(|p| p.backing_path())
            {
                Some(path) => output_paths.push(path.to_path_buf()),
                None => unconnected.push(format!("out:{name}")),
            }
        }

        if !unconnected.is_empty() {
            warn!(
                node = %self.name,
                "Skipping node, unconnected ports: {}",
                unconnected.join(", ")
            );
            return RunStatus::Skipped { unconnected };
        }

        // Re-runs must see the producer's current output from the start.
        for port in &mut self.inputs {
            if let Err(e) = port.rewind() {
                warn!(node = %self.name, port = %port.name, "Failed to rewind read handle: {e}");
            }
        }

        match self.handler.run(&input_paths, &output_paths).await {
            Ok(()) => RunStatus::Completed,
            Err(e) => {
                error!(node = %self.name, "Handler failed: {e}");
                RunStatus::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerKind;

    fn node(kind: HandlerKind, name: &str) -> Node {
        Node::new(NodeId(0), name, BuiltinHandler::new(kind))
    }

    #[test]
    fn test_ports_follow_handler_spec() {
        let n = node(HandlerKind::Add, "a");
        assert_eq!(n.inputs().len(), 2);
        assert_eq!(n.inputs()[0].name, "summand1");
        assert_eq!(n.inputs()[1].name, "summand2");
        assert_eq!(n.outputs().len(), 1);
        assert_eq!(n.outputs()[0].name, "sum");
    }

    #[test]
    fn test_set_param_validates_schema() {
        let mut n = node(HandlerKind::Const, "c");
        n.set_param("value", "42").unwrap();
        assert_eq!(n.param("value"), Some("42"));

        let err = n.set_param("valeu", "42").unwrap_err();
        assert!(matches!(err, PipeGraphError::UnknownParam { .. }));
    }

    #[test]
    fn test_sink_definition() {
        // No output ports at all
        assert!(node(HandlerKind::Print, "p").is_sink());
        // Output ports exist but have no consumers
        assert!(node(HandlerKind::Const, "c").is_sink());
    }

    #[test]
    fn test_never_up_to_date() {
        assert!(!node(HandlerKind::Add, "a").is_up_to_date());
        assert!(!node(HandlerKind::Const, "c").is_up_to_date());
    }

    #[tokio::test]
    async fn test_process_skips_with_unconnected_port_diagnostic() {
        let mut n = node(HandlerKind::Add, "a");
        let status = n.process().await;
        assert_eq!(
            status,
            RunStatus::Skipped {
                unconnected: vec![
                    "in:summand1".to_string(),
                    "in:summand2".to_string(),
                    "out:sum".to_string(),
                ]
            }
        );
    }

    #[test]
    fn test_port_reference_resolution() {
        let n = node(HandlerKind::Add, "a");
        assert!(n.port(Direction::In, "summand1").is_some());
        assert!(n.port(Direction::Out, "summand1").is_none());
        assert!(n.port(Direction::Out, "sum").is_some());
    }
}
