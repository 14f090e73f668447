//! Flow execution: payloads, stage collaborators, chunking, and orchestration.

pub mod chunking;
pub mod collaborators;
mod executor;
pub mod partition;
mod payload;
mod runner;
mod service;
pub mod types;

pub use chunking::{BasicChunker, ChunkingStrategy, TitleChunker, window_chunks};
pub use collaborators::{
    ChunkOptions, ElementChunker, PartitionOptions, Partitioner, WhitespaceCleaner,
};
pub use executor::{Execution, NodeExecutor};
pub use partition::{ExtraWhitespaceCleaner, PlainTextPartitioner};
pub use payload::{
    CATEGORY_KEY, Chunk, Element, InputFile, Metadata, PAGE_NUMBER_KEY, Payload, PayloadTag,
    document_digest,
};
pub use runner::{FlowRunner, FlowRunnerBuilder};
pub use service::{FlowApi, FlowService};
pub use types::{
    ChunkingError, FlowError, FlowOutcome, PartitionError, RunStatus, RunnerSettings,
    StageExecutionError, StageTrace, Upload,
};
