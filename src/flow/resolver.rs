//! Walks a validated flow from its input node to its output node.

use std::collections::{HashMap, HashSet};

use super::error::GraphShapeError;
use super::model::{Edge, ExecutionPath, Node, NodeKind};
use super::validator::ValidatedFlow;

/// Resolve the single linear path from the input node to the output node.
///
/// The walk is bounded to `nodes.len()` hops, so malformed edge sets end in a typed failure
/// instead of an unbounded traversal. On failure no partial path is returned.
pub fn resolve_path(validated: &ValidatedFlow<'_>) -> Result<ExecutionPath, GraphShapeError> {
    let flow = validated.flow();

    let mut by_id: HashMap<&str, &Node> = HashMap::with_capacity(flow.nodes.len());
    for node in &flow.nodes {
        by_id.entry(node.id.as_str()).or_insert(node);
    }
    let mut outgoing: HashMap<&str, Vec<&Edge>> = HashMap::new();
    for edge in &flow.edges {
        outgoing.entry(edge.source.as_str()).or_default().push(edge);
    }

    let start = validated.input();
    let mut current = start;
    let mut visited: HashSet<&str> = HashSet::from([start.id.as_str()]);
    let mut path = vec![start.clone()];
    let limit = flow.nodes.len();

    for _ in 0..limit {
        if current.kind == NodeKind::Output {
            tracing::debug!(steps = path.len(), "Resolved execution path");
            return Ok(ExecutionPath::new(path));
        }

        let edges = outgoing
            .get(current.id.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let edge = match edges {
            [] => {
                return Err(GraphShapeError::DeadEnd {
                    node_id: current.id.clone(),
                });
            }
            [single] => *single,
            many => {
                return Err(GraphShapeError::Branching {
                    node_id: current.id.clone(),
                    count: many.len(),
                });
            }
        };

        let Some(next) = by_id.get(edge.target.as_str()).copied() else {
            return Err(GraphShapeError::DanglingEdge {
                edge_id: edge.id.clone(),
                target: edge.target.clone(),
            });
        };
        if !visited.insert(next.id.as_str()) {
            return Err(GraphShapeError::CycleDetected {
                node_id: next.id.clone(),
            });
        }

        path.push(next.clone());
        current = next;
    }

    Err(GraphShapeError::PathTooLong { limit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::model::Flow;
    use crate::flow::validate;

    fn resolve(flow: &Flow) -> Result<ExecutionPath, GraphShapeError> {
        let validated = validate(flow).expect("structurally valid");
        resolve_path(&validated)
    }

    fn nodes(entries: &[(&str, NodeKind)]) -> Vec<Node> {
        entries.iter()
            .map(|(id, kind)| Node::new(*id, kind.clone()))
            .collect()
    }

    #[test]
    fn follows_edges_rather_than_declaration_order() {
        let flow = Flow {
            nodes: nodes(&[
                ("out", NodeKind::Output),
                ("chunk", NodeKind::Chunk),
                ("in", NodeKind::Input),
                ("part", NodeKind::Partition),
            ]),
            edges: vec![
                Edge::new("e3", "chunk", "out"),
                Edge::new("e1", "in", "part"),
                Edge::new("e2", "part", "chunk"),
            ],
        };

        let path = resolve(&flow).expect("linear path");
        assert_eq!(path.ids(), vec!["in", "part", "chunk", "out"]);
        assert_eq!(path.len(), flow.nodes.len());
    }

    #[test]
    fn input_wired_straight_to_output() {
        let flow = Flow::linear(nodes(&[("1", NodeKind::Input), ("2", NodeKind::Output)]));
        let path = resolve(&flow).expect("two-node path");
        assert_eq!(path.ids(), vec!["1", "2"]);
    }

    #[test]
    fn missing_successor_is_a_dead_end() {
        let flow = Flow {
            nodes: nodes(&[
                ("1", NodeKind::Input),
                ("2", NodeKind::Partition),
                ("3", NodeKind::Output),
            ]),
            edges: vec![Edge::new("e1", "1", "2")],
        };
        assert_eq!(
            resolve(&flow).unwrap_err(),
            GraphShapeError::DeadEnd {
                node_id: "2".into()
            }
        );
    }

    #[test]
    fn two_successors_are_rejected_as_branching() {
        let flow = Flow {
            nodes: nodes(&[
                ("1", NodeKind::Input),
                ("2", NodeKind::Partition),
                ("3", NodeKind::Output),
            ]),
            edges: vec![
                Edge::new("e1", "1", "2"),
                Edge::new("e2", "1", "3"),
                Edge::new("e3", "2", "3"),
            ],
        };
        assert_eq!(
            resolve(&flow).unwrap_err(),
            GraphShapeError::Branching {
                node_id: "1".into(),
                count: 2
            }
        );
    }

    #[test]
    fn unknown_target_is_a_dangling_edge() {
        let flow = Flow {
            nodes: nodes(&[("1", NodeKind::Input), ("2", NodeKind::Output)]),
            edges: vec![Edge::new("e1", "1", "ghost")],
        };
        assert_eq!(
            resolve(&flow).unwrap_err(),
            GraphShapeError::DanglingEdge {
                edge_id: "e1".into(),
                target: "ghost".into()
            }
        );
    }

    #[test]
    fn loop_back_to_visited_node_is_a_cycle() {
        let flow = Flow {
            nodes: nodes(&[
                ("1", NodeKind::Input),
                ("2", NodeKind::Partition),
                ("3", NodeKind::Chunk),
                ("4", NodeKind::Output),
            ]),
            edges: vec![
                Edge::new("e1", "1", "2"),
                Edge::new("e2", "2", "3"),
                Edge::new("e3", "3", "2"),
            ],
        };
        assert_eq!(
            resolve(&flow).unwrap_err(),
            GraphShapeError::CycleDetected {
                node_id: "2".into()
            }
        );
    }

    #[test]
    fn self_loop_on_input_is_a_cycle() {
        let flow = Flow {
            nodes: nodes(&[("1", NodeKind::Input), ("2", NodeKind::Output)]),
            edges: vec![Edge::new("e1", "1", "1")],
        };
        assert_eq!(
            resolve(&flow).unwrap_err(),
            GraphShapeError::CycleDetected {
                node_id: "1".into()
            }
        );
    }

    #[test]
    fn unimplemented_kinds_are_walked_like_any_other_node() {
        let flow = Flow::linear(vec![
            Node::new("1", NodeKind::Input),
            Node::new("2", "embedNode"),
            Node::new("3", NodeKind::Output),
        ]);
        let path = resolve(&flow).expect("linear path");
        assert_eq!(path.nodes()[1].kind, NodeKind::Other("embedNode".into()));
    }
}
