//! Structural preconditions checked before any path resolution or I/O.

use super::error::GraphShapeError;
use super::model::{Flow, Node, NodeKind};

/// A flow known to contain exactly one input and exactly one output node.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedFlow<'a> {
    flow: &'a Flow,
    input: &'a Node,
}

impl<'a> ValidatedFlow<'a> {
    /// The underlying flow.
    pub fn flow(&self) -> &'a Flow {
        self.flow
    }

    /// The unique input node.
    pub fn input(&self) -> &'a Node {
        self.input
    }
}

/// Check that `flow` is non-empty and has exactly one input and one output node.
///
/// Checks run in that order and stop at the first failure. Edge shape is left to
/// [`crate::flow::resolve_path`].
pub fn validate(flow: &Flow) -> Result<ValidatedFlow<'_>, GraphShapeError> {
    if flow.nodes.is_empty() {
        return Err(GraphShapeError::EmptyGraph);
    }

    let input = exactly_one(
        flow,
        NodeKind::Input,
        GraphShapeError::MissingInput,
        |count| GraphShapeError::AmbiguousInput { count },
    )?;
    let output = exactly_one(
        flow,
        NodeKind::Output,
        GraphShapeError::MissingOutput,
        |count| GraphShapeError::AmbiguousOutput { count },
    )?;

    tracing::debug!(
        nodes = flow.nodes.len(),
        edges = flow.edges.len(),
        input = %input.id,
        output = %output.id,
        "Flow passed structural validation"
    );

    Ok(ValidatedFlow { flow, input })
}

fn exactly_one<'a>(
    flow: &'a Flow,
    kind: NodeKind,
    missing: GraphShapeError,
    ambiguous: impl FnOnce(usize) -> GraphShapeError,
) -> Result<&'a Node, GraphShapeError> {
    let mut matches = flow.nodes_of_kind(kind);
    let Some(first) = matches.next() else {
        return Err(missing);
    };
    let extra = matches.count();
    if extra > 0 {
        return Err(ambiguous(extra + 1));
    }
    Ok(first)
}
