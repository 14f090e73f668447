//! Property-based tests using proptest

use docflow::flow::{Edge, Flow, GraphShapeError, Node, NodeKind, resolve_path, validate};
use docflow::processing::{ChunkingError, window_chunks};
use proptest::prelude::*;

fn chain(ids: &[String]) -> Vec<Node> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let kind = if i == 0 {
                NodeKind::Input
            } else if i == ids.len() - 1 {
                NodeKind::Output
            } else {
                NodeKind::Partition
            };
            Node::new(id.clone(), kind)
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn windows_reconstruct_text(
        text in "\\PC{0,200}",
        size in 1usize..40,
        overlap_seed in 0usize..40,
    ) {
        let overlap = overlap_seed % size;
        let chunks = window_chunks(&text, size, overlap, "doc").unwrap();

        let mut rebuilt = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let skip = if i == 0 { 0 } else { overlap };
            rebuilt.extend(chunk.text.chars().skip(skip));
            prop_assert!(chunk.text.chars().count() <= size);
            prop_assert_eq!(&chunk.id, &format!("doc_chunk_{i}"));
        }
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn oversized_window_yields_the_whole_text(text in "\\PC{0,120}") {
        let size = text.chars().count() + 1;
        let chunks = window_chunks(&text, size, 0, "doc").unwrap();
        prop_assert_eq!(chunks.len(), 1);
        prop_assert_eq!(&chunks[0].text, &text);
        prop_assert_eq!(chunks[0].offset, 0);
    }

    #[test]
    fn non_advancing_window_is_rejected(
        text in "\\PC{0,50}",
        size in 0usize..20,
        extra in 0usize..20,
    ) {
        let overlap = size + extra;
        let err = window_chunks(&text, size, overlap, "doc").unwrap_err();
        prop_assert_eq!(err, ChunkingError::InvalidChunkWindow { size, overlap });
    }

    #[test]
    fn chains_resolve_in_edge_order_regardless_of_declaration(
        len in 2usize..12,
        rotation in 0usize..12,
    ) {
        let ids: Vec<String> = (0..len).map(|i| format!("n{i}")).collect();
        let edges: Vec<Edge> = ids
            .windows(2)
            .enumerate()
            .map(|(i, pair)| Edge::new(format!("e{i}"), pair[0].clone(), pair[1].clone()))
            .collect();
        let mut nodes = chain(&ids);
        nodes.rotate_left(rotation % len);
        let flow = Flow { nodes, edges };

        let validated = validate(&flow).unwrap();
        let path = resolve_path(&validated).unwrap();
        prop_assert_eq!(path.len(), len);
        let resolved: Vec<String> = path.ids().into_iter().map(str::to_string).collect();
        prop_assert_eq!(resolved, ids);
    }

    #[test]
    fn cycles_are_detected(len in 3usize..10, back_to in 1usize..9) {
        // n0 -> n1 -> ... -> n{len-2} -> n{back}, output n{len-1} unreachable.
        let ids: Vec<String> = (0..len).map(|i| format!("n{i}")).collect();
        let back = 1 + back_to % (len - 2);
        let mut edges: Vec<Edge> = ids[..len - 1]
            .windows(2)
            .enumerate()
            .map(|(i, pair)| Edge::new(format!("e{i}"), pair[0].clone(), pair[1].clone()))
            .collect();
        edges.push(Edge::new("back", ids[len - 2].clone(), ids[back].clone()));
        let flow = Flow { nodes: chain(&ids), edges };

        let validated = validate(&flow).unwrap();
        let err = resolve_path(&validated).unwrap_err();
        prop_assert!(
            matches!(err, GraphShapeError::CycleDetected { .. }),
            "expected cycle, got {:?}",
            err
        );
    }

    #[test]
    fn branching_is_rejected(len in 3usize..10, extra_target in 0usize..10) {
        let ids: Vec<String> = (0..len).map(|i| format!("n{i}")).collect();
        let mut edges: Vec<Edge> = ids
            .windows(2)
            .enumerate()
            .map(|(i, pair)| Edge::new(format!("e{i}"), pair[0].clone(), pair[1].clone()))
            .collect();
        // Second edge out of the input node.
        let target = 2 + extra_target % (len - 2);
        edges.push(Edge::new("fork", ids[0].clone(), ids[target].clone()));
        let flow = Flow { nodes: chain(&ids), edges };

        let validated = validate(&flow).unwrap();
        let err = resolve_path(&validated).unwrap_err();
        prop_assert_eq!(
            err,
            GraphShapeError::Branching { node_id: "n0".into(), count: 2 }
        );
    }
}
