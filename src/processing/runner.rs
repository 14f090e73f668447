//! Top-level orchestration of a single flow run.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::{Builder, NamedTempFile};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::flow::{Flow, resolve_path, validate};

use super::collaborators::{ElementChunker, Partitioner, WhitespaceCleaner};
use super::executor::{Execution, NodeExecutor};
use super::payload::{InputFile, document_digest};
use super::types::{FlowError, FlowOutcome, RunnerSettings, Upload};

const TEMP_PREFIX: &str = "docflow-";

/// Validates, resolves, and executes flows against uploaded documents.
///
/// A runner holds only immutable collaborators and settings, so one instance can serve any number
/// of concurrent runs. Each run owns its temporary file and payload register.
#[derive(Clone)]
pub struct FlowRunner {
    executor: NodeExecutor,
    temp_dir: Option<PathBuf>,
}

impl FlowRunner {
    /// Runner wired to the built-in collaborators.
    pub fn new(settings: RunnerSettings) -> Self {
        Self::builder(settings).build()
    }

    /// Start configuring a runner with custom collaborators.
    pub fn builder(settings: RunnerSettings) -> FlowRunnerBuilder {
        FlowRunnerBuilder {
            executor: NodeExecutor::new(&settings),
            temp_dir: settings.temp_dir,
        }
    }

    /// Extensions the configured parser fully supports.
    pub fn supported_extensions(&self) -> Vec<String> {
        self.executor.supported_extensions()
    }

    /// Run `flow` against `upload`.
    ///
    /// The graph is validated and resolved before any file is written. The upload is then
    /// materialized to a temporary file that is removed when the run ends, whatever the outcome.
    pub fn run(&self, flow: &Flow, upload: Upload) -> Result<FlowOutcome, FlowError> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("flow_run", run_id = %run_id);
        let _entered = span.enter();

        let started = Instant::now();
        let started_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());

        let validated = validate(flow)?;
        let path = resolve_path(&validated)?;
        tracing::info!(
            nodes = path.len(),
            path = ?path.ids(),
            filename = %upload.filename,
            "Resolved execution path"
        );

        let Execution {
            output,
            trace,
            status,
        } = {
            let materialized = MaterializedInput::create(&upload, self.temp_dir.as_deref())
                .map_err(|err| {
                    tracing::warn!(error = %err, "Failed to materialize upload");
                    FlowError::Materialize(err)
                })?;
            self.executor.execute(&path, materialized.input())?
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            status = ?status,
            output = %output.describe(),
            elapsed_ms,
            "Flow run finished"
        );

        Ok(FlowOutcome {
            run_id,
            path,
            run_status: status,
            stage_output: output,
            trace,
            started_at,
            elapsed_ms,
        })
    }
}

/// Configures the collaborators of a [`FlowRunner`].
pub struct FlowRunnerBuilder {
    executor: NodeExecutor,
    temp_dir: Option<PathBuf>,
}

impl FlowRunnerBuilder {
    /// Use `partitioner` for partition nodes.
    pub fn partitioner(mut self, partitioner: impl Partitioner + 'static) -> Self {
        self.executor = self.executor.with_partitioner(Arc::new(partitioner));
        self
    }

    /// Use `cleaner` for whitespace normalization after partitioning.
    pub fn cleaner(mut self, cleaner: impl WhitespaceCleaner + 'static) -> Self {
        self.executor = self.executor.with_cleaner(Arc::new(cleaner));
        self
    }

    /// Use `chunker` for the `by_title` strategy.
    pub fn title_chunker(mut self, chunker: impl ElementChunker + 'static) -> Self {
        self.executor = self.executor.with_title_chunker(Arc::new(chunker));
        self
    }

    /// Use `chunker` for the `basic` strategy.
    pub fn basic_chunker(mut self, chunker: impl ElementChunker + 'static) -> Self {
        self.executor = self.executor.with_basic_chunker(Arc::new(chunker));
        self
    }

    /// Finish building the runner.
    pub fn build(self) -> FlowRunner {
        FlowRunner {
            executor: self.executor,
            temp_dir: self.temp_dir,
        }
    }
}

/// Upload written to a temporary file that is deleted when the guard drops.
struct MaterializedInput {
    file: Option<NamedTempFile>,
    input: InputFile,
}

impl MaterializedInput {
    fn create(upload: &Upload, temp_dir: Option<&Path>) -> io::Result<Self> {
        let suffix = Path::new(&upload.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let mut builder = Builder::new();
        builder.prefix(TEMP_PREFIX).suffix(&suffix);
        let mut file = match temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(&upload.bytes)?;
        file.flush()?;

        let input = InputFile {
            path: file.path().to_path_buf(),
            filename: upload.filename.clone(),
            size_bytes: upload.bytes.len() as u64,
            document_id: document_digest(&upload.bytes),
        };
        tracing::debug!(
            path = %input.path.display(),
            size_bytes = input.size_bytes,
            "Materialized upload"
        );
        Ok(Self {
            file: Some(file),
            input,
        })
    }

    fn input(&self) -> &InputFile {
        &self.input
    }
}

impl Drop for MaterializedInput {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            match file.close() {
                Ok(()) => tracing::debug!(path = %self.input.path.display(), "Removed upload"),
                Err(err) => tracing::warn!(
                    path = %self.input.path.display(),
                    error = %err,
                    "Failed to remove temporary upload"
                ),
            }
        }
    }
}
