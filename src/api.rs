//! HTTP surface for docflow.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /process-flow` – Multipart form with `flow_data_json` (the editor graph) and `file`
//!   (the document). Validates the graph, runs it, and returns the execution path, per-stage
//!   trace, and final payload.
//! - `POST /process-document` – Multipart form with `file` plus partition/chunk settings as
//!   individual fields. Runs a fixed Input → Partition → [Chunk] → Output flow.
//! - `GET /health` – Liveness probe.
//! - `GET /supported-formats` – File types the configured parser handles.
//! - `GET /metrics` – Flow counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Errors are returned as `{"status": "error", "error": <tag>, "detail": <message>}` with an
//! extra `node_id` when a specific node failed. Malformed graphs and requests map to 400,
//! oversized uploads to 413, and everything else to 500.

use crate::flow::{Flow, Node, NodeConfig, NodeKind};
use crate::processing::{FlowApi, FlowError, FlowOutcome, Upload};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, State,
        multipart::{Multipart, MultipartError},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

const FLOW_FIELD: &str = "flow_data_json";
const FILE_FIELD: &str = "file";

/// Build the HTTP router exposing the flow API surface.
///
/// `max_upload_bytes` caps the size of multipart request bodies.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: FlowApi + 'static,
{
    Router::new()
        .route("/process-flow", post(process_flow::<S>))
        .route("/process-document", post(process_document::<S>))
        .route("/health", get(health))
        .route("/supported-formats", get(supported_formats::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Success response for the processing endpoints.
#[derive(Serialize)]
struct FlowResponse {
    status: &'static str,
    #[serde(flatten)]
    outcome: FlowOutcome,
}

impl From<FlowOutcome> for FlowResponse {
    fn from(outcome: FlowOutcome) -> Self {
        Self {
            status: "ok",
            outcome,
        }
    }
}

/// Text fields and the uploaded file from a multipart request.
#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<Upload>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == FILE_FIELD {
                let filename = field
                    .file_name()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| AppError::BadRequest("No file name provided.".into()))?;
                let bytes = field.bytes().await?;
                form.file = Some(Upload::new(filename, bytes.to_vec()));
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.text(key).map(|value| value.eq_ignore_ascii_case("true"))
    }

    fn number<T: FromStr>(&self, key: &str) -> Result<Option<T>, AppError> {
        self.text(key)
            .map(|value| {
                value.parse().map_err(|_| {
                    AppError::BadRequest(format!("Field '{key}' must be a non-negative integer."))
                })
            })
            .transpose()
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .text(key)?
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
        (!items.is_empty()).then_some(items)
    }

    fn take_file(&mut self) -> Result<Upload, AppError> {
        self.file
            .take()
            .ok_or_else(|| AppError::BadRequest(format!("Missing '{FILE_FIELD}' upload.")))
    }
}

/// Run a user-authored flow against an uploaded document.
async fn process_flow<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Json<FlowResponse>, AppError>
where
    S: FlowApi,
{
    let mut form = UploadForm::read(multipart).await?;
    let raw = form
        .text(FLOW_FIELD)
        .ok_or_else(|| AppError::BadRequest(format!("Missing '{FLOW_FIELD}' field.")))?;
    let flow = Flow::from_json(raw).map_err(|err| {
        AppError::BadRequest(format!("Invalid JSON in '{FLOW_FIELD}': {err}"))
    })?;
    let upload = form.take_file()?;

    tracing::info!(
        nodes = flow.nodes.len(),
        edges = flow.edges.len(),
        filename = %upload.filename,
        size_bytes = upload.bytes.len(),
        "Process flow request received"
    );
    let outcome = service.run_flow(flow, upload).await?;
    Ok(Json(outcome.into()))
}

/// Build the fixed single-document flow from form fields.
fn document_flow(form: &UploadForm) -> Result<Flow, AppError> {
    let partition = NodeConfig {
        strategy: form.text("strategy").map(str::to_string),
        remove_extra_whitespace: form.flag("remove_extra_whitespace"),
        ocr_languages: form.list("ocr_languages"),
        pdf_infer_table_structure: form.flag("pdf_infer_table_structure"),
        extract_image_block_types: form.list("extract_image_block_types"),
        ..NodeConfig::default()
    };

    let mut nodes = vec![
        Node::new("input", NodeKind::Input),
        Node::new("partition", NodeKind::Partition).with_config(partition),
    ];

    let strategy = form
        .text("chunking_strategy")
        .filter(|name| !name.eq_ignore_ascii_case("none"));
    if let Some(strategy) = strategy {
        let chunk = NodeConfig {
            chunking_strategy: Some(strategy.to_string()),
            chunk_max_characters: form.number("chunk_max_characters")?,
            chunk_new_after_n_chars: form.number("chunk_new_after_n_chars")?,
            chunk_combine_text_under_n_chars: form.number("chunk_combine_text_under_n_chars")?,
            chunk_overlap: form.number("chunk_overlap")?,
            chunk_multipage_sections: form.flag("chunk_multipage_sections"),
            ..NodeConfig::default()
        };
        nodes.push(Node::new("chunk", NodeKind::Chunk).with_config(chunk));
    }

    nodes.push(Node::new("output", NodeKind::Output));
    Ok(Flow::linear(nodes))
}

/// Partition (and optionally chunk) a single document.
async fn process_document<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Json<FlowResponse>, AppError>
where
    S: FlowApi,
{
    let mut form = UploadForm::read(multipart).await?;
    let flow = document_flow(&form)?;
    let upload = form.take_file()?;
    ensure_supported(&upload.filename, &service.supported_extensions())?;

    tracing::info!(
        filename = %upload.filename,
        size_bytes = upload.bytes.len(),
        stages = flow.nodes.len(),
        "Process document request received"
    );
    let outcome = service.run_flow(flow, upload).await?;
    Ok(Json(outcome.into()))
}

/// Reject uploads whose extension the parser does not handle. Extensionless names pass.
fn ensure_supported(filename: &str, supported: &[String]) -> Result<(), AppError> {
    let Some(ext) = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
    else {
        return Ok(());
    };
    if supported.iter().any(|known| known.eq_ignore_ascii_case(&ext)) {
        return Ok(());
    }
    let listed = supported
        .iter()
        .map(|known| format!(".{known}"))
        .collect::<Vec<_>>()
        .join(", ");
    Err(AppError::BadRequest(format!(
        "Unsupported file type: .{ext}. Supported types: {listed}"
    )))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Response body for `GET /supported-formats`.
#[derive(Serialize)]
struct SupportedFormatsResponse {
    fully_supported: Vec<String>,
}

async fn supported_formats<S>(State(service): State<Arc<S>>) -> Json<SupportedFormatsResponse>
where
    S: FlowApi,
{
    let fully_supported = service
        .supported_extensions()
        .into_iter()
        .map(|ext| format!(".{ext}"))
        .collect();
    Json(SupportedFormatsResponse { fully_supported })
}

/// Return the flow counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: FlowApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "process_flow",
                method: "POST",
                path: "/process-flow",
                description: "Run a node graph against an uploaded document. Multipart fields: flow_data_json (graph JSON) and file.",
                request_example: Some(json!({
                    "flow_data_json": {
                        "nodes": [
                            {"id": "in", "type": "inputNode"},
                            {"id": "part", "type": "partitionNode", "config": {"strategy": "auto"}},
                            {"id": "chunk", "type": "chunkNode", "config": {"chunking_strategy": "by_title", "chunk_max_characters": 500}},
                            {"id": "out", "type": "outputNode"}
                        ],
                        "edges": [
                            {"id": "e1", "source": "in", "target": "part"},
                            {"id": "e2", "source": "part", "target": "chunk"},
                            {"id": "e3", "source": "chunk", "target": "out"}
                        ]
                    },
                    "file": "<binary>"
                })),
            },
            CommandDescriptor {
                name: "process_document",
                method: "POST",
                path: "/process-document",
                description: "Partition and optionally chunk one document using form fields instead of a graph.",
                request_example: Some(json!({
                    "file": "<binary>",
                    "strategy": "auto",
                    "chunking_strategy": "basic",
                    "chunk_max_characters": "500",
                    "chunk_overlap": "50"
                })),
            },
            CommandDescriptor {
                name: "supported_formats",
                method: "GET",
                path: "/supported-formats",
                description: "List file extensions the configured parser fully supports.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return flow counters useful for observability dashboards.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Multipart(MultipartError),
    Flow(FlowError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(err) => err.status(),
            Self::Flow(err) if err.is_client_fault() => StatusCode::BAD_REQUEST,
            Self::Flow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Multipart(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "payload_too_large"
            }
            Self::Multipart(_) => "bad_request",
            Self::Flow(err) => err.tag(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "status": "error",
            "error": self.tag(),
        });
        match &self {
            Self::BadRequest(detail) => body["detail"] = json!(detail),
            Self::Multipart(err) => body["detail"] = json!(err.body_text()),
            Self::Flow(err) => {
                body["detail"] = json!(err.to_string());
                if let Some(node_id) = err.node_id() {
                    body["node_id"] = json!(node_id);
                }
            }
        }
        if status.is_server_error() {
            tracing::error!(status = %status, body = %body, "Request failed");
        } else {
            tracing::debug!(status = %status, body = %body, "Request rejected");
        }
        (status, Json(body)).into_response()
    }
}

impl From<FlowError> for AppError {
    fn from(inner: FlowError) -> Self {
        Self::Flow(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}
