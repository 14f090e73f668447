use thiserror::Error;

/// Structural problems found while validating or resolving a flow.
///
/// These are always caused by the submitted graph and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphShapeError {
    /// The flow declares no nodes at all.
    #[error("flow contains no nodes")]
    EmptyGraph,
    /// No node of the input kind was declared.
    #[error("flow must contain exactly one Input node, found none")]
    MissingInput,
    /// More than one input node was declared.
    #[error("flow must contain exactly one Input node, found {count}")]
    AmbiguousInput {
        /// Number of input nodes found.
        count: usize,
    },
    /// No node of the output kind was declared.
    #[error("flow must contain exactly one Output node, found none")]
    MissingOutput,
    /// More than one output node was declared.
    #[error("flow must contain exactly one Output node, found {count}")]
    AmbiguousOutput {
        /// Number of output nodes found.
        count: usize,
    },
    /// A non-output node on the path has no outgoing edge.
    #[error("node '{node_id}' has no outgoing edge and is not the Output node")]
    DeadEnd {
        /// Node where the walk stopped.
        node_id: String,
    },
    /// A node on the path has more than one outgoing edge.
    #[error("node '{node_id}' has {count} outgoing edges; only linear flows are supported")]
    Branching {
        /// Node with several successors.
        node_id: String,
        /// Number of outgoing edges.
        count: usize,
    },
    /// An edge points at a node id that does not exist.
    #[error("edge '{edge_id}' targets unknown node '{target}'")]
    DanglingEdge {
        /// Offending edge.
        edge_id: String,
        /// Id that could not be resolved.
        target: String,
    },
    /// The walk came back to a node it already visited.
    #[error("cycle detected at node '{node_id}'")]
    CycleDetected {
        /// First node visited twice.
        node_id: String,
    },
    /// The walk used up its hop budget without reaching the output node.
    #[error("path did not reach the Output node within {limit} steps")]
    PathTooLong {
        /// Hop budget (number of nodes in the flow).
        limit: usize,
    },
}

impl GraphShapeError {
    /// Stable snake_case name for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyGraph => "empty_graph",
            Self::MissingInput => "missing_input",
            Self::AmbiguousInput { .. } => "ambiguous_input",
            Self::MissingOutput => "missing_output",
            Self::AmbiguousOutput { .. } => "ambiguous_output",
            Self::DeadEnd { .. } => "dead_end",
            Self::Branching { .. } => "branching",
            Self::DanglingEdge { .. } => "dangling_edge",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::PathTooLong { .. } => "path_too_long",
        }
    }
}
