//! Graph model submitted by flow authors: nodes, edges, and per-node configuration.

use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};
use std::fmt;

/// Stage kind attached to a node.
///
/// Frontends send strings such as `inputNode` or `chunkNode`; matching is case-insensitive and the
/// `Node` suffix is optional. Anything unrecognized is kept verbatim as [`NodeKind::Other`] and is
/// treated as an unimplemented stage at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    /// Entry point receiving the uploaded file.
    Input,
    /// Terminal node; the payload reaching it is the flow result.
    Output,
    /// Turns a file reference into extracted elements.
    Partition,
    /// Turns extracted elements into chunks.
    Chunk,
    /// Any kind this engine does not implement.
    Other(String),
}

impl NodeKind {
    /// Canonical lowercase name used in traces and responses.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Partition => "partition",
            Self::Chunk => "chunk",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for NodeKind {
    fn from(raw: String) -> Self {
        let normalized = raw.trim().to_lowercase();
        let base = normalized.strip_suffix("node").unwrap_or(&normalized);
        match base.trim_end_matches(['_', '-']) {
            "input" => Self::Input,
            "output" => Self::Output,
            "partition" => Self::Partition,
            "chunk" => Self::Chunk,
            _ => Self::Other(raw),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional per-node settings. Each stage reads only the fields it understands.
///
/// Keys that are not modelled here are kept in [`NodeConfig::extra`] and survive a
/// serialize/deserialize cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Display label set by the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Partitioning strategy (`auto`, `fast`, `hi_res`, `ocr_only`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// OCR languages, either comma-separated or as a list.
    #[serde(
        default,
        deserialize_with = "comma_separated",
        skip_serializing_if = "Option::is_none"
    )]
    pub ocr_languages: Option<Vec<String>>,
    /// Whether table structure should be inferred for PDFs.
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub pdf_infer_table_structure: Option<bool>,
    /// Element types whose image blocks should be extracted.
    #[serde(
        default,
        deserialize_with = "comma_separated",
        skip_serializing_if = "Option::is_none"
    )]
    pub extract_image_block_types: Option<Vec<String>>,
    /// Collapse whitespace runs in extracted element text.
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub remove_extra_whitespace: Option<bool>,

    /// Chunking strategy name (`by_title`, `basic`, `none`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunking_strategy: Option<String>,
    /// Hard upper bound on chunk length in characters.
    #[serde(
        default,
        deserialize_with = "lenient_usize",
        skip_serializing_if = "Option::is_none"
    )]
    pub chunk_max_characters: Option<usize>,
    /// Soft bound after which a new chunk is started.
    #[serde(
        default,
        deserialize_with = "lenient_usize",
        skip_serializing_if = "Option::is_none"
    )]
    pub chunk_new_after_n_chars: Option<usize>,
    /// Sections shorter than this are combined with the next one.
    #[serde(
        default,
        deserialize_with = "lenient_usize",
        skip_serializing_if = "Option::is_none"
    )]
    pub chunk_combine_text_under_n_chars: Option<usize>,
    /// Characters shared between consecutive chunks.
    #[serde(
        default,
        deserialize_with = "lenient_usize",
        skip_serializing_if = "Option::is_none"
    )]
    pub chunk_overlap: Option<usize>,
    /// Allow sections to span page boundaries.
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub chunk_multipage_sections: Option<bool>,

    /// Unrecognized keys, preserved as submitted.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accept `"eng, deu"`, `["eng", "deu"]`, or `null`; empty results collapse to `None`.
fn comma_separated<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Joined(String),
        List(Vec<String>),
    }

    let items = match Option::<Raw>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Raw::Joined(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>(),
        Some(Raw::List(list)) => list
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
    };

    Ok(if items.is_empty() { None } else { Some(items) })
}

/// Accepts a number or a numeric string, as sent by form inputs.
fn lenient_usize<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(usize),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(value)) => Ok(Some(value)),
        Some(Raw::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse().map(Some).map_err(|_| {
                de::Error::invalid_value(de::Unexpected::Str(text), &"a non-negative integer")
            })
        }
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Flag(flag)) => Ok(Some(flag)),
        Some(Raw::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(de::Error::invalid_value(
                de::Unexpected::Str(&text),
                &"true or false",
            )),
        },
    }
}

/// One stage of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Identifier, unique within its flow.
    pub id: String,
    /// Stage kind. The editor sends this as `type`.
    #[serde(rename = "type", alias = "kind")]
    pub kind: NodeKind,
    /// Stage settings; absent config means all defaults.
    #[serde(default)]
    pub config: NodeConfig,
}

impl Node {
    /// Node with default configuration.
    pub fn new(id: impl Into<String>, kind: impl Into<NodeKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            config: NodeConfig::default(),
        }
    }

    /// Replace the node configuration.
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }
}

/// Directed link between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identifier.
    pub id: String,
    /// Id of the upstream node.
    pub source: String,
    /// Id of the downstream node.
    pub target: String,
}

impl Edge {
    /// Build an edge from `source` to `target`.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A user-submitted processing graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Nodes in submission order.
    pub nodes: Vec<Node>,
    /// Directed edges between nodes.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Flow {
    /// Parse a flow from the JSON document posted by the editor.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Build a strictly linear flow, wiring `nodes` in the given order.
    pub fn linear(nodes: Vec<Node>) -> Self {
        let edges = nodes
            .windows(2)
            .enumerate()
            .map(|(idx, pair)| Edge::new(format!("e{}", idx + 1), &pair[0].id, &pair[1].id))
            .collect();
        Self { nodes, edges }
    }

    /// Nodes of the given kind, in submission order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(move |node| node.kind == kind)
    }
}

/// `{id, kind}` pair reported back to callers for each step of a resolved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathEntry {
    /// Node id.
    pub id: String,
    /// Node kind.
    pub kind: NodeKind,
}

/// Linear execution order from the input node to the output node.
///
/// Built only by [`crate::flow::resolve_path`]; read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPath {
    nodes: Vec<Node>,
}

impl ExecutionPath {
    pub(crate) fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Nodes in execution order, both endpoints included.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of steps on the path.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false` for a resolved path; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of the nodes in order.
    pub fn ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.id.as_str()).collect()
    }

    /// `{id, kind}` view used in responses.
    pub fn entries(&self) -> Vec<PathEntry> {
        self.nodes
            .iter()
            .map(|node| PathEntry {
                id: node.id.clone(),
                kind: node.kind.clone(),
            })
            .collect()
    }
}
