use std::sync::atomic::{AtomicU64, Ordering};

use crate::processing::{FlowOutcome, Payload, RunStatus};

/// Thread-safe counters describing flow activity.
#[derive(Default)]
pub struct FlowMetrics {
    flows_completed: AtomicU64,
    flows_stopped: AtomicU64,
    flows_failed: AtomicU64,
    elements_produced: AtomicU64,
    chunks_produced: AtomicU64,
}

impl FlowMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a run that returned an outcome, counting what its final payload holds.
    pub fn record_outcome(&self, outcome: &FlowOutcome) {
        match outcome.run_status {
            RunStatus::Completed => self.flows_completed.fetch_add(1, Ordering::Relaxed),
            RunStatus::Stopped { .. } => self.flows_stopped.fetch_add(1, Ordering::Relaxed),
        };
        match &outcome.stage_output {
            Payload::ElementList(elements) => {
                self.elements_produced
                    .fetch_add(elements.len() as u64, Ordering::Relaxed);
            }
            Payload::ChunkList(chunks) => {
                self.chunks_produced
                    .fetch_add(chunks.len() as u64, Ordering::Relaxed);
            }
            Payload::FileReference(_) => {}
        }
    }

    /// Record a run that ended in an error.
    pub fn record_failure(&self) {
        self.flows_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            flows_completed: self.flows_completed.load(Ordering::Relaxed),
            flows_stopped: self.flows_stopped.load(Ordering::Relaxed),
            flows_failed: self.flows_failed.load(Ordering::Relaxed),
            elements_produced: self.elements_produced.load(Ordering::Relaxed),
            chunks_produced: self.chunks_produced.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of flow counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Runs that reached their output node.
    pub flows_completed: u64,
    /// Runs halted at an unimplemented node kind.
    pub flows_stopped: u64,
    /// Runs that returned an error.
    pub flows_failed: u64,
    /// Elements held by runs whose final payload was an element list.
    pub elements_produced: u64,
    /// Chunks held by runs whose final payload was a chunk list.
    pub chunks_produced: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Flow, Node, NodeKind, resolve_path, validate};
    use crate::processing::{Chunk, Element, Metadata};

    fn outcome(run_status: RunStatus, stage_output: Payload) -> FlowOutcome {
        let flow = Flow::linear(vec![
            Node::new("in", NodeKind::Input),
            Node::new("out", NodeKind::Output),
        ]);
        let path = resolve_path(&validate(&flow).expect("valid")).expect("path");
        FlowOutcome {
            run_id: "r".into(),
            path,
            run_status,
            stage_output,
            trace: Vec::new(),
            started_at: "1970-01-01T00:00:00Z".into(),
            elapsed_ms: 0,
        }
    }

    #[test]
    fn records_outcomes_by_status_and_payload() {
        let metrics = FlowMetrics::new();
        let chunk = Chunk {
            id: "d_chunk_0".into(),
            text: "x".into(),
            offset: 0,
            metadata: Metadata::new(),
        };
        metrics.record_outcome(&outcome(
            RunStatus::Completed,
            Payload::ChunkList(vec![chunk.clone(), chunk]),
        ));
        metrics.record_outcome(&outcome(
            RunStatus::Stopped {
                node_id: "embed".into(),
                kind: NodeKind::Other("embed".into()),
            },
            Payload::ElementList(vec![Element::new("a")]),
        ));
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.flows_completed, 1);
        assert_eq!(snapshot.flows_stopped, 1);
        assert_eq!(snapshot.flows_failed, 1);
        assert_eq!(snapshot.elements_produced, 1);
        assert_eq!(snapshot.chunks_produced, 2);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(FlowMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
