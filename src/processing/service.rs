//! Async facade over the synchronous flow runner.

use std::sync::Arc;

use async_trait::async_trait;

use crate::flow::Flow;
use crate::metrics::{FlowMetrics, MetricsSnapshot};

use super::runner::FlowRunner;
use super::types::{FlowError, FlowOutcome, Upload};

/// Abstraction over the flow engine used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait FlowApi: Send + Sync {
    /// Validate, resolve, and execute `flow` against `upload`.
    async fn run_flow(&self, flow: Flow, upload: Upload) -> Result<FlowOutcome, FlowError>;

    /// Extensions the configured parser fully supports.
    fn supported_extensions(&self) -> Vec<String>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Shares one [`FlowRunner`] across requests and keeps run counters.
///
/// Runs execute on the blocking thread pool since partitioning reads files and chunking is CPU
/// bound. Construct once near process start and share through an `Arc`.
pub struct FlowService {
    runner: Arc<FlowRunner>,
    metrics: Arc<FlowMetrics>,
}

impl FlowService {
    /// Wrap a configured runner.
    pub fn new(runner: FlowRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            metrics: Arc::new(FlowMetrics::new()),
        }
    }

    /// Run a flow on the blocking pool and record the result.
    pub async fn run_flow(&self, flow: Flow, upload: Upload) -> Result<FlowOutcome, FlowError> {
        let runner = Arc::clone(&self.runner);
        let result = tokio::task::spawn_blocking(move || runner.run(&flow, upload))
            .await
            .unwrap_or_else(|join_err| {
                tracing::error!(error = %join_err, "Flow run task did not complete");
                Err(FlowError::Internal(join_err.to_string()))
            });

        match &result {
            Ok(outcome) => self.metrics.record_outcome(outcome),
            Err(err) => {
                self.metrics.record_failure();
                tracing::warn!(error = %err, tag = err.tag(), "Flow run failed");
            }
        }
        result
    }

    /// Return the current flow metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl FlowApi for FlowService {
    async fn run_flow(&self, flow: Flow, upload: Upload) -> Result<FlowOutcome, FlowError> {
        FlowService::run_flow(self, flow, upload).await
    }

    fn supported_extensions(&self) -> Vec<String> {
        self.runner.supported_extensions()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        FlowService::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Node, NodeKind};
    use crate::processing::RunnerSettings;

    #[tokio::test]
    async fn counts_completed_and_failed_runs() {
        let service = FlowService::new(FlowRunner::new(RunnerSettings::default()));
        let good = Flow::linear(vec![
            Node::new("in", NodeKind::Input),
            Node::new("part", NodeKind::Partition),
            Node::new("out", NodeKind::Output),
        ]);
        let bad = Flow::linear(vec![Node::new("part", NodeKind::Partition)]);

        let outcome = service
            .run_flow(good, Upload::new("a.txt", "one.\n\ntwo."))
            .await
            .expect("run");
        assert!(outcome.is_completed());
        assert!(service.run_flow(bad, Upload::new("a.txt", "x")).await.is_err());

        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.flows_completed, 1);
        assert_eq!(snapshot.flows_failed, 1);
        assert_eq!(snapshot.elements_produced, 2);
    }
}
