//! Flow graphs: the submitted model, structural validation, and path resolution.

mod error;
pub mod model;
mod resolver;
mod validator;

pub use error::GraphShapeError;
pub use model::{Edge, ExecutionPath, Flow, Node, NodeConfig, NodeKind, PathEntry};
pub use resolver::resolve_path;
pub use validator::{ValidatedFlow, validate};
