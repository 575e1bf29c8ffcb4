//! Error types for pipegraph

use thiserror::Error;

/// Pipegraph error types
#[derive(Error, Debug)]
pub enum PipeGraphError {
    /// Connection attempted between two ports of the same direction
    #[error("Ports '{from}' and '{to}' have the same direction")]
    DirectionMismatch { from: String, to: String },

    /// Input port already has a producer
    #[error("Input port '{port}' is already connected")]
    InputOccupied { port: String },

    /// Disconnect of a pair that is not linked
    #[error("Ports '{from}' and '{to}' are not connected")]
    NotConnected { from: String, to: String },

    /// Unknown handler type tag at node creation
    #[error("Unknown handler type '{tag}'")]
    UnknownHandler { tag: String },

    /// Reference to a node that is not in the graph
    #[error("No node with id {0} in the graph")]
    UnknownNode(u32),

    /// Reference to a port a node does not have
    #[error("Node '{node}' has no {direction} port named '{port}'")]
    UnknownPort {
        node: String,
        direction: String,
        port: String,
    },

    /// Parameter name not declared by the handler
    #[error("Node '{node}' does not declare parameter '{param}'")]
    UnknownParam { node: String, param: String },

    /// Scheduling errors
    #[error("Cycle detected in graph: {0}")]
    CycleDetected(String),

    /// Graph document exceeded size limit
    #[error("Graph document exceeds 1MB limit (size: {0} bytes)")]
    DocumentTooLarge(usize),

    /// XML parsing errors
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),

    /// XML serialization errors
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),

    /// Structurally valid XML that is not a valid graph document
    #[error("Malformed graph document: {0}")]
    MalformedDocument(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using PipeGraphError
pub type Result<T> = std::result::Result<T, PipeGraphError>;
