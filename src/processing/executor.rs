//! Node-by-node execution of a resolved path.
//!
//! The payload register starts out as the materialized file reference. Each node either
//! replaces the register with its output and advances, finishes the run (output node), halts the
//! run (unimplemented kind), or fails. The register is only replaced after a node succeeds.

use std::sync::Arc;

use crate::flow::{ExecutionPath, Node, NodeConfig, NodeKind};

use super::chunking::{BasicChunker, ChunkingStrategy, TitleChunker, identity_chunks};
use super::collaborators::{
    ChunkOptions, ElementChunker, PartitionOptions, Partitioner, WhitespaceCleaner,
};
use super::partition::{ExtraWhitespaceCleaner, PlainTextPartitioner};
use super::payload::{Chunk, Element, InputFile, Payload, PayloadTag};
use super::types::{
    ChunkingError, FlowError, PartitionError, RunStatus, RunnerSettings, StageExecutionError,
    StageTrace,
};

/// Final register, trace, and completion state of an execution.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Payload held when execution ended.
    pub output: Payload,
    /// One entry per node executed.
    pub trace: Vec<StageTrace>,
    /// Whether the output node was reached.
    pub status: RunStatus,
}

enum Transition {
    Advance(Payload, String),
    Complete,
    Halt,
}

/// Applies each node's transformation to the payload register, in path order.
#[derive(Clone)]
pub struct NodeExecutor {
    partitioner: Arc<dyn Partitioner>,
    cleaner: Arc<dyn WhitespaceCleaner>,
    title_chunker: Arc<dyn ElementChunker>,
    basic_chunker: Arc<dyn ElementChunker>,
    default_chunk_max_characters: usize,
    default_chunk_overlap: usize,
}

impl NodeExecutor {
    /// Executor wired to the built-in collaborators.
    pub fn new(settings: &RunnerSettings) -> Self {
        Self {
            partitioner: Arc::new(PlainTextPartitioner),
            cleaner: Arc::new(ExtraWhitespaceCleaner),
            title_chunker: Arc::new(TitleChunker),
            basic_chunker: Arc::new(BasicChunker),
            default_chunk_max_characters: settings.default_chunk_max_characters,
            default_chunk_overlap: settings.default_chunk_overlap,
        }
    }

    /// Replace the document parser.
    pub fn with_partitioner(mut self, partitioner: Arc<dyn Partitioner>) -> Self {
        self.partitioner = partitioner;
        self
    }

    /// Replace the whitespace cleaner.
    pub fn with_cleaner(mut self, cleaner: Arc<dyn WhitespaceCleaner>) -> Self {
        self.cleaner = cleaner;
        self
    }

    /// Replace the `by_title` strategy.
    pub fn with_title_chunker(mut self, chunker: Arc<dyn ElementChunker>) -> Self {
        self.title_chunker = chunker;
        self
    }

    /// Replace the `basic` strategy.
    pub fn with_basic_chunker(mut self, chunker: Arc<dyn ElementChunker>) -> Self {
        self.basic_chunker = chunker;
        self
    }

    /// Extensions the configured parser fully supports.
    pub fn supported_extensions(&self) -> Vec<String> {
        self.partitioner.supported_extensions()
    }

    /// Run every node of `path` against the file referenced by `source`.
    ///
    /// Stops at the output node, at the first unimplemented node kind (returned as
    /// [`RunStatus::Stopped`] with the partial trace), or at the first failing node.
    pub fn execute(&self, path: &ExecutionPath, source: &InputFile) -> Result<Execution, FlowError> {
        let mut register = Payload::FileReference(source.clone());
        let mut trace = Vec::with_capacity(path.len());

        for node in path.nodes() {
            tracing::debug!(
                node_id = %node.id,
                kind = %node.kind,
                register = %register.tag(),
                "Executing node"
            );

            match self.step(node, &register, source)? {
                Transition::Advance(next, summary) => {
                    trace.push(stage(node, summary));
                    register = next;
                }
                Transition::Complete => {
                    trace.push(stage(node, format!("completed with {}", register.describe())));
                    return Ok(Execution {
                        output: register,
                        trace,
                        status: RunStatus::Completed,
                    });
                }
                Transition::Halt => {
                    tracing::info!(
                        node_id = %node.id,
                        kind = %node.kind,
                        "Node kind not implemented; stopping"
                    );
                    trace.push(stage(
                        node,
                        format!("node kind '{}' is not implemented; execution stopped", node.kind),
                    ));
                    return Ok(Execution {
                        output: register,
                        trace,
                        status: RunStatus::Stopped {
                            node_id: node.id.clone(),
                            kind: node.kind.clone(),
                        },
                    });
                }
            }
        }

        Err(FlowError::Internal(
            "execution path ended without an Output node".into(),
        ))
    }

    fn step(
        &self,
        node: &Node,
        register: &Payload,
        source: &InputFile,
    ) -> Result<Transition, FlowError> {
        match &node.kind {
            NodeKind::Input => match register {
                Payload::FileReference(file) => Ok(Transition::Advance(
                    register.clone(),
                    format!("received file '{}' ({} bytes)", file.filename, file.size_bytes),
                )),
                other => Err(mismatch(node, PayloadTag::FileReference, other)),
            },
            NodeKind::Partition => {
                let Payload::FileReference(file) = register else {
                    return Err(mismatch(node, PayloadTag::FileReference, register));
                };
                let (elements, strategy) = self.partition(node, file)?;
                let summary = format!(
                    "partitioned '{}' into {} element(s) using strategy '{}'",
                    file.filename,
                    elements.len(),
                    strategy
                );
                Ok(Transition::Advance(Payload::ElementList(elements), summary))
            }
            NodeKind::Chunk => {
                let Payload::ElementList(elements) = register else {
                    return Err(mismatch(node, PayloadTag::ElementList, register));
                };
                let (chunks, strategy) = self.chunk(node, elements, source)?;
                let summary = format!(
                    "chunked {} element(s) into {} chunk(s) using strategy '{}'",
                    elements.len(),
                    chunks.len(),
                    strategy.as_str()
                );
                Ok(Transition::Advance(Payload::ChunkList(chunks), summary))
            }
            NodeKind::Output => Ok(Transition::Complete),
            NodeKind::Other(_) => Ok(Transition::Halt),
        }
    }

    fn partition(
        &self,
        node: &Node,
        file: &InputFile,
    ) -> Result<(Vec<Element>, String), StageExecutionError> {
        let fail = |cause: PartitionError| StageExecutionError::PartitionFailed {
            node_id: node.id.clone(),
            source: cause,
        };
        if !file.path.exists() {
            return Err(fail(PartitionError::MissingFile(file.path.clone())));
        }

        let options = PartitionOptions::from_config(&node.config);
        let mut elements = self.partitioner.partition(file, &options).map_err(|cause| {
            tracing::warn!(node_id = %node.id, error = %cause, "Partitioning failed");
            fail(cause)
        })?;

        if node.config.remove_extra_whitespace.unwrap_or(true) {
            for element in &mut elements {
                element.text = self.cleaner.clean(&element.text);
            }
        }
        Ok((elements, options.strategy))
    }

    fn chunk(
        &self,
        node: &Node,
        elements: &[Element],
        source: &InputFile,
    ) -> Result<(Vec<Chunk>, ChunkingStrategy), StageExecutionError> {
        let fail = |cause: ChunkingError| {
            tracing::warn!(node_id = %node.id, error = %cause, "Chunking failed");
            StageExecutionError::ChunkFailed {
                node_id: node.id.clone(),
                source: cause,
            }
        };

        let strategy =
            ChunkingStrategy::from_config(node.config.chunking_strategy.as_deref()).map_err(fail)?;
        let options = self.chunk_options(&node.config, source);
        tracing::debug!(
            node_id = %node.id,
            strategy = strategy.as_str(),
            max_characters = options.max_characters,
            overlap = options.overlap,
            "Chunking elements"
        );

        let chunks = match strategy {
            ChunkingStrategy::ByTitle => self.title_chunker.chunk(elements, &options),
            ChunkingStrategy::Basic => self.basic_chunker.chunk(elements, &options),
            ChunkingStrategy::None => Ok(identity_chunks(elements, &options)),
        }
        .map_err(fail)?;
        Ok((chunks, strategy))
    }

    fn chunk_options(&self, config: &NodeConfig, source: &InputFile) -> ChunkOptions {
        let max_characters = config
            .chunk_max_characters
            .unwrap_or(self.default_chunk_max_characters);
        ChunkOptions {
            max_characters,
            new_after_n_chars: config.chunk_new_after_n_chars.unwrap_or(max_characters),
            combine_text_under_n_chars: config.chunk_combine_text_under_n_chars.unwrap_or(0),
            overlap: config.chunk_overlap.unwrap_or(self.default_chunk_overlap),
            multipage_sections: config.chunk_multipage_sections.unwrap_or(true),
            document_id: source.document_id.clone(),
            filename: source.filename.clone(),
        }
    }
}

fn stage(node: &Node, summary: String) -> StageTrace {
    StageTrace {
        node_id: node.id.clone(),
        kind: node.kind.clone(),
        summary,
    }
}

fn mismatch(node: &Node, expected: PayloadTag, found: &Payload) -> FlowError {
    tracing::warn!(
        node_id = %node.id,
        expected = %expected,
        found = %found.tag(),
        "Payload type mismatch"
    );
    FlowError::TypeMismatch {
        node_id: node.id.clone(),
        expected,
        found: found.tag(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Flow, resolve_path, validate};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    fn path_for(nodes: Vec<Node>) -> ExecutionPath {
        let flow = Flow::linear(nodes);
        resolve_path(&validate(&flow).expect("valid")).expect("resolvable")
    }

    fn source(contents: &str) -> (NamedTempFile, InputFile) {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        let input = InputFile {
            path: file.path().to_path_buf(),
            filename: "doc.txt".into(),
            size_bytes: contents.len() as u64,
            document_id: "d1".into(),
        };
        (file, input)
    }

    fn chunk_node(strategy: &str, size: usize, overlap: usize) -> Node {
        Node::new("chunk", NodeKind::Chunk).with_config(NodeConfig {
            chunking_strategy: Some(strategy.into()),
            chunk_max_characters: Some(size),
            chunk_overlap: Some(overlap),
            ..NodeConfig::default()
        })
    }

    struct CountingPartitioner {
        calls: AtomicUsize,
    }

    impl Partitioner for CountingPartitioner {
        fn partition(
            &self,
            _file: &InputFile,
            _options: &PartitionOptions,
        ) -> Result<Vec<Element>, PartitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Element::new("  spaced   out  ")])
        }
    }

    struct FailingPartitioner;

    impl Partitioner for FailingPartitioner {
        fn partition(
            &self,
            _file: &InputFile,
            _options: &PartitionOptions,
        ) -> Result<Vec<Element>, PartitionError> {
            Err(PartitionError::Parser("engine crashed".into()))
        }
    }

    #[test]
    fn partition_then_chunk_produces_chunk_list() {
        let executor = NodeExecutor::new(&RunnerSettings::default());
        let path = path_for(vec![
            Node::new("in", NodeKind::Input),
            Node::new("part", NodeKind::Partition),
            chunk_node("basic", 5, 1),
            Node::new("out", NodeKind::Output),
        ]);
        let (_guard, input) = source("abcdefgh");

        let execution = executor.execute(&path, &input).expect("execution");
        assert_eq!(execution.status, RunStatus::Completed);
        let Payload::ChunkList(chunks) = &execution.output else {
            panic!("expected chunks, got {:?}", execution.output.tag());
        };
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcde", "efgh"]);
        assert_eq!(execution.trace.len(), 4);
        assert!(execution.trace[2].summary.contains("2 chunk(s)"));
    }

    #[test]
    fn whitespace_normalization_can_be_disabled() {
        let partitioner = Arc::new(CountingPartitioner {
            calls: AtomicUsize::new(0),
        });
        let executor =
            NodeExecutor::new(&RunnerSettings::default()).with_partitioner(partitioner.clone());
        let (_guard, input) = source("ignored");

        let cleaned = executor
            .execute(
                &path_for(vec![
                    Node::new("in", NodeKind::Input),
                    Node::new("part", NodeKind::Partition),
                    Node::new("out", NodeKind::Output),
                ]),
                &input,
            )
            .expect("execution");
        assert_eq!(
            cleaned.output,
            Payload::ElementList(vec![Element::new("spaced out")])
        );

        let raw = executor
            .execute(
                &path_for(vec![
                    Node::new("in", NodeKind::Input),
                    Node::new("part", NodeKind::Partition).with_config(NodeConfig {
                        remove_extra_whitespace: Some(false),
                        ..NodeConfig::default()
                    }),
                    Node::new("out", NodeKind::Output),
                ]),
                &input,
            )
            .expect("execution");
        assert_eq!(
            raw.output,
            Payload::ElementList(vec![Element::new("  spaced   out  ")])
        );
        assert_eq!(partitioner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn chunk_node_rejects_file_reference() {
        let executor = NodeExecutor::new(&RunnerSettings::default());
        let path = path_for(vec![
            Node::new("in", NodeKind::Input),
            chunk_node("basic", 5, 0),
            Node::new("out", NodeKind::Output),
        ]);
        let (_guard, input) = source("text");

        let err = executor.execute(&path, &input).unwrap_err();
        assert!(matches!(
            err,
            FlowError::TypeMismatch {
                expected: PayloadTag::ElementList,
                found: PayloadTag::FileReference,
                ..
            }
        ));
    }

    #[test]
    fn partition_node_rejects_element_list() {
        let executor = NodeExecutor::new(&RunnerSettings::default());
        let path = path_for(vec![
            Node::new("in", NodeKind::Input),
            Node::new("p1", NodeKind::Partition),
            Node::new("p2", NodeKind::Partition),
            Node::new("out", NodeKind::Output),
        ]);
        let (_guard, input) = source("text");

        let err = executor.execute(&path, &input).unwrap_err();
        assert_eq!(err.node_id(), Some("p2"));
        assert_eq!(err.tag(), "payload_type_mismatch");
    }

    #[test]
    fn collaborator_failure_is_wrapped_with_node_id() {
        let executor = NodeExecutor::new(&RunnerSettings::default())
            .with_partitioner(Arc::new(FailingPartitioner));
        let path = path_for(vec![
            Node::new("in", NodeKind::Input),
            Node::new("part", NodeKind::Partition),
            Node::new("out", NodeKind::Output),
        ]);
        let (_guard, input) = source("text");

        let err = executor.execute(&path, &input).unwrap_err();
        match err {
            FlowError::Stage(StageExecutionError::PartitionFailed { node_id, source }) => {
                assert_eq!(node_id, "part");
                assert!(matches!(source, PartitionError::Parser(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_file_fails_partition() {
        let executor = NodeExecutor::new(&RunnerSettings::default());
        let path = path_for(vec![
            Node::new("in", NodeKind::Input),
            Node::new("part", NodeKind::Partition),
            Node::new("out", NodeKind::Output),
        ]);
        let (guard, input) = source("text");
        drop(guard);

        let err = executor.execute(&path, &input).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Stage(StageExecutionError::PartitionFailed {
                source: PartitionError::MissingFile(_),
                ..
            })
        ));
    }

    #[test]
    fn unknown_chunking_strategy_fails_chunk_node() {
        let executor = NodeExecutor::new(&RunnerSettings::default());
        let path = path_for(vec![
            Node::new("in", NodeKind::Input),
            Node::new("part", NodeKind::Partition),
            chunk_node("semantic", 10, 0),
            Node::new("out", NodeKind::Output),
        ]);
        let (_guard, input) = source("text");

        let err = executor.execute(&path, &input).unwrap_err();
        match err {
            FlowError::Stage(StageExecutionError::ChunkFailed { node_id, source }) => {
                assert_eq!(node_id, "chunk");
                assert_eq!(
                    source,
                    ChunkingError::UnsupportedChunkingStrategy("semantic".into())
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_window_fails_chunk_node() {
        let executor = NodeExecutor::new(&RunnerSettings::default());
        let path = path_for(vec![
            Node::new("in", NodeKind::Input),
            Node::new("part", NodeKind::Partition),
            chunk_node("basic", 3, 3),
            Node::new("out", NodeKind::Output),
        ]);
        let (_guard, input) = source("text");

        let err = executor.execute(&path, &input).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Stage(StageExecutionError::ChunkFailed {
                source: ChunkingError::InvalidChunkWindow { size: 3, overlap: 3 },
                ..
            })
        ));
    }

    #[test]
    fn unimplemented_kind_stops_with_partial_trace() {
        let executor = NodeExecutor::new(&RunnerSettings::default());
        let path = path_for(vec![
            Node::new("in", NodeKind::Input),
            Node::new("part", NodeKind::Partition),
            Node::new("llm", "llmExtractNode"),
            Node::new("out", NodeKind::Output),
        ]);
        let (_guard, input) = source("hello");

        let execution = executor.execute(&path, &input).expect("soft stop");
        assert_eq!(
            execution.status,
            RunStatus::Stopped {
                node_id: "llm".into(),
                kind: NodeKind::Other("llmExtractNode".into()),
            }
        );
        assert_eq!(execution.output.tag(), PayloadTag::ElementList);
        assert_eq!(execution.trace.len(), 3);
        assert!(execution.trace[2].summary.contains("not implemented"));
    }

    #[test]
    fn chunk_defaults_come_from_settings() {
        let settings = RunnerSettings {
            default_chunk_max_characters: 4,
            default_chunk_overlap: 0,
            temp_dir: None,
        };
        let executor = NodeExecutor::new(&settings);
        let path = path_for(vec![
            Node::new("in", NodeKind::Input),
            Node::new("part", NodeKind::Partition),
            Node::new("chunk", NodeKind::Chunk).with_config(NodeConfig {
                chunking_strategy: Some("basic".into()),
                ..NodeConfig::default()
            }),
            Node::new("out", NodeKind::Output),
        ]);
        let (_guard, input) = source("abcdefgh");

        let execution = executor.execute(&path, &input).expect("execution");
        let Payload::ChunkList(chunks) = execution.output else {
            panic!("expected chunks");
        };
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "d1_chunk_0");
    }
}
