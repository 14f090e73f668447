//! Error taxonomy, run settings, and outcome types for flow execution.

use crate::flow::{ExecutionPath, GraphShapeError, NodeKind, PathEntry};
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

use super::payload::{Payload, PayloadTag};

/// Errors produced while turning elements into chunks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkingError {
    /// The window would not advance (`overlap >= size`).
    #[error("invalid chunk window: overlap {overlap} must be smaller than size {size}")]
    InvalidChunkWindow {
        /// Requested window size in characters.
        size: usize,
        /// Requested overlap in characters.
        overlap: usize,
    },
    /// `chunking_strategy` named a strategy this engine does not provide.
    #[error("unsupported chunking strategy '{0}'")]
    UnsupportedChunkingStrategy(String),
    /// A chunking collaborator failed for its own reasons.
    #[error("chunking collaborator failed: {0}")]
    Collaborator(String),
}

/// Errors raised by a partitioning collaborator.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The referenced file no longer exists.
    #[error("input file is missing: {}", .0.display())]
    MissingFile(PathBuf),
    /// The parser does not handle this file type.
    #[error("unsupported file type '.{extension}'")]
    UnsupportedFileType {
        /// Lowercased extension of the upload.
        extension: String,
    },
    /// File contents are not valid UTF-8 text.
    #[error("unable to decode '{filename}' as UTF-8 text")]
    Decode {
        /// Name of the offending upload.
        filename: String,
    },
    /// Reading the file failed.
    #[error("failed to read input file: {0}")]
    Io(#[from] std::io::Error),
    /// The parsing engine reported an error.
    #[error("parser failed: {0}")]
    Parser(String),
}

/// A node-level failure, tagged with the node that caused it.
#[derive(Debug, Error)]
pub enum StageExecutionError {
    /// A partition node could not produce elements.
    #[error("partition node '{node_id}' failed: {source}")]
    PartitionFailed {
        /// Failing node.
        node_id: String,
        /// Collaborator error.
        #[source]
        source: PartitionError,
    },
    /// A chunk node could not produce chunks.
    #[error("chunk node '{node_id}' failed: {source}")]
    ChunkFailed {
        /// Failing node.
        node_id: String,
        /// Chunking error.
        #[source]
        source: ChunkingError,
    },
}

impl StageExecutionError {
    /// Id of the node that failed.
    pub fn node_id(&self) -> &str {
        match self {
            Self::PartitionFailed { node_id, .. } | Self::ChunkFailed { node_id, .. } => node_id,
        }
    }
}

/// Every way a flow run can fail.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The submitted graph is malformed. Client fault.
    #[error("invalid flow: {0}")]
    Graph(#[from] GraphShapeError),
    /// A node received a payload it cannot consume.
    #[error("node '{node_id}' expected {expected} but received {found}")]
    TypeMismatch {
        /// Node that rejected the payload.
        node_id: String,
        /// Payload the node consumes.
        expected: PayloadTag,
        /// Payload actually in the register.
        found: PayloadTag,
    },
    /// A stage collaborator failed.
    #[error(transparent)]
    Stage(#[from] StageExecutionError),
    /// The upload could not be written to a temporary file.
    #[error("failed to materialize upload: {0}")]
    Materialize(#[source] std::io::Error),
    /// The run was interrupted before producing a result.
    #[error("flow run aborted: {0}")]
    Internal(String),
}

impl FlowError {
    /// Taxonomy tag reported to callers.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Graph(_) => "graph_shape",
            Self::TypeMismatch { .. } => "payload_type_mismatch",
            Self::Stage(_) => "stage_execution",
            Self::Materialize(_) => "resource",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the request itself was at fault.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Graph(_))
    }

    /// Node responsible for the failure, when there is one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::TypeMismatch { node_id, .. } => Some(node_id),
            Self::Stage(stage) => Some(stage.node_id()),
            _ => None,
        }
    }
}

/// Engine settings resolved once at construction time.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Chunk size used when a chunk node does not set `chunk_max_characters`.
    pub default_chunk_max_characters: usize,
    /// Overlap used when a chunk node does not set `chunk_overlap`.
    pub default_chunk_overlap: usize,
    /// Directory for materialized uploads; the system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            default_chunk_max_characters: 500,
            default_chunk_overlap: 0,
            temp_dir: None,
        }
    }
}

/// An uploaded document awaiting processing.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name supplied by the client.
    pub filename: String,
    /// Raw contents.
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Wrap raw bytes with their file name.
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// One line of the per-stage trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTrace {
    /// Node that ran.
    pub node_id: String,
    /// Kind of that node.
    pub kind: NodeKind,
    /// What the node did.
    pub summary: String,
}

/// How execution ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// The output node was reached.
    Completed,
    /// Execution halted at a node kind without an implementation.
    Stopped {
        /// Node where execution halted.
        node_id: String,
        /// Its kind.
        kind: NodeKind,
    },
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct FlowOutcome {
    /// Id assigned to this run.
    pub run_id: String,
    /// Resolved execution order.
    #[serde(serialize_with = "serialize_path")]
    pub path: ExecutionPath,
    /// Completion state.
    pub run_status: RunStatus,
    /// Payload held when execution ended.
    pub stage_output: Payload,
    /// One entry per node executed.
    pub trace: Vec<StageTrace>,
    /// RFC3339 start timestamp.
    pub started_at: String,
    /// Wall-clock duration of the run.
    pub elapsed_ms: u64,
}

impl FlowOutcome {
    /// Whether the output node was reached.
    pub fn is_completed(&self) -> bool {
        self.run_status == RunStatus::Completed
    }
}

fn serialize_path<S>(path: &ExecutionPath, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let entries: Vec<PathEntry> = path.entries();
    entries.serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_errors_are_client_faults() {
        let err = FlowError::from(GraphShapeError::AmbiguousInput { count: 2 });
        assert!(err.is_client_fault());
        assert_eq!(err.tag(), "graph_shape");
        assert!(err.to_string().contains("Input node"));
        assert_eq!(err.node_id(), None);
    }

    #[test]
    fn stage_errors_carry_the_failing_node() {
        let err = FlowError::from(StageExecutionError::ChunkFailed {
            node_id: "c1".into(),
            source: ChunkingError::UnsupportedChunkingStrategy("by_page".into()),
        });
        assert!(!err.is_client_fault());
        assert_eq!(err.tag(), "stage_execution");
        assert_eq!(err.node_id(), Some("c1"));
        assert!(err.to_string().contains("by_page"));
    }

    #[test]
    fn type_mismatch_is_a_server_fault() {
        let err = FlowError::TypeMismatch {
            node_id: "p".into(),
            expected: PayloadTag::FileReference,
            found: PayloadTag::ChunkList,
        };
        assert!(!err.is_client_fault());
        assert_eq!(err.tag(), "payload_type_mismatch");
        assert_eq!(
            err.to_string(),
            "node 'p' expected file_reference but received chunk_list"
        );
    }
}
