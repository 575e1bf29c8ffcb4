//! Ports and the file-backed channel ends they own
//!
//! Every output port with at least one consumer lazily owns a backing temp
//! file; every connected input port owns a private read handle on its
//! producer's file. All channel lifecycle transitions go through
//! [`crate::graph::ProcessingGraph::connect`] and
//! [`crate::graph::ProcessingGraph::disconnect`].

use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, error};

use crate::error::Result;

/// Graph-scoped node identity, allocated monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a port consumes or produces data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

/// Stable reference to a port: owning node, direction, and name.
///
/// Ports are never renamed after node construction, so a `PortRef` stays
/// valid as long as its node is in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRef {
    pub node: NodeId,
    pub direction: Direction,
    pub name: String,
}

impl PortRef {
    pub fn input(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            direction: Direction::In,
            name: name.into(),
        }
    }

    pub fn output(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            direction: Direction::Out,
            name: name.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.node, self.direction, self.name)
    }
}

/// One end of the file-backed channel between an output and its consumers.
#[derive(Debug)]
pub enum ChannelEnd {
    /// Output side: sole writer, owns the backing temp file.
    Producer(NamedTempFile),
    /// Input side: private read handle on the producer's file.
    Consumer { path: PathBuf, reader: File },
}

/// A named, directional connection endpoint owned by a node.
#[derive(Debug)]
pub struct Port {
    pub node: NodeId,
    pub name: String,
    pub direction: Direction,
    peers: Vec<PortRef>,
    /// Small integer identifier used only by the persistence layer.
    pub persist_id: Option<u32>,
    channel: Option<ChannelEnd>,
}

impl Port {
    pub fn new(node: NodeId, name: impl Into<String>, direction: Direction) -> Self {
        Self {
            node,
            name: name.into(),
            direction,
            peers: Vec::new(),
            persist_id: None,
            channel: None,
        }
    }

    /// Ports connected to this one. At most one for an input port.
    pub fn peers(&self) -> &[PortRef] {
        &self.peers
    }

    pub fn is_connected(&self) -> bool {
        !self.peers.is_empty()
    }

    pub(crate) fn add_peer(&mut self, peer: PortRef) {
        self.peers.push(peer);
    }

    pub(crate) fn remove_peer(&mut self, peer: &PortRef) -> bool {
        match self.peers.iter().position(|p| p == peer) {
            Some(idx) => {
                self.peers.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Path of the backing file this port reads from or writes to, if any.
    pub fn backing_path(&self) -> Option<&Path> {
        match &self.channel {
            Some(ChannelEnd::Producer(file)) => Some(file.path()),
            Some(ChannelEnd::Consumer { path, .. }) => Some(path.as_path()),
            None => None,
        }
    }

    /// Create the backing temp file if this output does not have one yet.
    ///
    /// Returns the backing path. Only meaningful for output ports.
    pub(crate) fn ensure_backing_file(&mut self) -> Result<PathBuf> {
        if self.channel.is_none() {
            let file = NamedTempFile::new()?;
            debug!(port = %self.name, path = %file.path().display(), "created backing file");
            self.channel = Some(ChannelEnd::Producer(file));
        }
        // Unwrap is safe: the channel was just ensured above.
        Ok(self
            .backing_path()
            .expect("producer channel just created")
            .to_path_buf())
    }

    /// Attach a consumer-side read handle. The handle is positioned at the
    /// start of the producer's file.
    pub(crate) fn attach_reader(&mut self, path: PathBuf, reader: File) {
        self.channel = Some(ChannelEnd::Consumer { path, reader });
    }

    /// Release this port's channel end. For a producer this closes and
    /// deletes the backing file; close errors are logged, not propagated.
    pub(crate) fn release_channel(&mut self) {
        match self.channel.take() {
            Some(ChannelEnd::Producer(file)) => {
                let path = file.path().to_path_buf();
                if let Err(e) = file.close() {
                    error!(port = %self.name, path = %path.display(), "failed to remove backing file: {e}");
                } else {
                    debug!(port = %self.name, path = %path.display(), "removed backing file");
                }
            }
            Some(ChannelEnd::Consumer { .. }) => {
                // Read handle is dropped; the producer owns the file.
            }
            None => {}
        }
    }

    /// Reposition a consumer's read handle at the start of the backing file.
    /// No-op for producers and unconnected ports.
    pub(crate) fn rewind(&mut self) -> std::io::Result<()> {
        if let Some(ChannelEnd::Consumer { reader, .. }) = &mut self.channel {
            reader.seek(SeekFrom::Start(0))?;
        }
        Ok(())
    }

    /// Whether this port's data is current. No port tracks freshness yet, so
    /// every run recomputes (extension point for future memoization).
    pub fn is_up_to_date(&self) -> bool {
        false
    }
}
