use thiserror::Error;

use crate::node::NodeId;

/// Errors returned by HLOD build requests.
///
/// Conditions that only skip work (feature disabled, no levels configured,
/// ineligible actors, failed proxy builds) are reported through the message
/// log instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HlodError {
    #[error("HLOD level {level} is out of range (1..={configured} configured)")]
    LevelOutOfRange { level: u32, configured: usize },

    #[error("unknown HLOD node {0}")]
    UnknownNode(NodeId),

    #[error("{node} is on level {actual}, not level {requested}")]
    NodeLevelMismatch {
        node: NodeId,
        actual: u32,
        requested: u32,
    },

    #[error("{0} has no static components to merge")]
    NoMergeableComponents(NodeId),

    #[error("adding {child} under {node} would create a cycle")]
    CyclicHierarchy { node: NodeId, child: NodeId },
}
