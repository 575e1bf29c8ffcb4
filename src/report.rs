//! Per-run outcome records

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::port::NodeId;

/// Outcome of one node within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Handler ran to completion.
    Completed,
    /// Node skipped because some of its ports have no backing channel.
    Skipped { unconnected: Vec<String> },
    /// Handler raised; the run was aborted after this node.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Skipped { unconnected } => {
                write!(f, "skipped (unconnected: {})", unconnected.join(", "))
            }
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One node's record within a [`RunReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRunRecord {
    pub node: NodeId,
    pub name: String,
    pub status: RunStatus,
    pub duration: Duration,
}

/// Everything the engine reports about one `process()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub records: Vec<NodeRunRecord>,
}

impl RunReport {
    /// True when no node failed. Skipped nodes do not fail a run.
    pub fn success(&self) -> bool {
        !self
            .records
            .iter()
            .any(|r| matches!(r.status, RunStatus::Failed))
    }
}
