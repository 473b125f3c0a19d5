//! Knowledge graph store adapter
//!
//! [`GraphStore`] is the set of graph operations the pipeline needs, phrased
//! in terms of the node kinds it manages:
//!
//! - entity nodes, MERGEd on `(label, name)` and marked provisional
//!   (`onProgress`, `progressId`, `originalType`) until the chunk is finalized
//! - `:Chunk` nodes, one per graph chunk
//! - `:PdfFile` nodes, one per document, target of `DefinedInFile` edges
//!
//! While a chunk is being consolidated nodes are addressed by a store handle
//! ([`NodeId`]) so that property overwrites cannot make a node unreachable.
//!
//! Two implementations: [`MemoryGraph`] (tests, dry runs) and
//! [`MemgraphStore`] (Bolt). Values always travel as query parameters; labels
//! and relationship types are checked with [`check_label`] before they are
//! back-quoted into a query.

pub mod memgraph;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::StatusCode;
use crate::utils::is_safe_identifier;

pub use memgraph::MemgraphStore;
pub use memory::MemoryGraph;

/// Store handle of a node
pub type NodeId = i64;

/// Property names used by the pipeline
pub mod props {
    pub const NAME: &str = "name";
    pub const ON_PROGRESS: &str = "onProgress";
    pub const PROGRESS_ID: &str = "progressId";
    pub const ORIGINAL_TYPE: &str = "originalType";
    pub const PERSISTENT: &str = "persistent";
    pub const ALIAS: &str = "alias";
    pub const ID: &str = "id";

    /// Cleared by the finalizer
    pub const PROVISIONAL: [&str; 4] = [ON_PROGRESS, PROGRESS_ID, PERSISTENT, ORIGINAL_TYPE];
}

pub const CHUNK_LABEL: &str = "Chunk";
pub const FILE_LABEL: &str = "PdfFile";
pub const DEFINED_IN_FILE: &str = "DefinedInFile";

// ============================================================================
// Errors
// ============================================================================

/// Graph store errors
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Could not connect to graph store: {0}")]
    Connection(String),

    #[error("Query failed: {reason}\n{query}")]
    Query { query: String, reason: String },

    #[error("'{label}' cannot be used as a label or relationship type")]
    InvalidLabel { label: String },

    #[error("Schema unavailable: {0}")]
    Schema(String),

    #[error("Operation not supported by this store: {0}")]
    Unsupported(String),
}

impl GraphError {
    pub fn query(query: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Query {
            query: query.into(),
            reason: reason.to_string(),
        }
    }

    pub fn code(&self) -> StatusCode {
        match self {
            Self::Connection(_) => StatusCode::GRAPH_CONNECT,
            Self::Query { .. } | Self::Unsupported(_) => StatusCode::GRAPH_QUERY,
            Self::Schema(_) => StatusCode::GRAPH_SCHEMA,
            Self::InvalidLabel { .. } => StatusCode::GRAPH_INVALID_LABEL,
        }
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Reject anything that is not `[A-Za-z0-9_]+`
pub fn check_label(label: &str) -> GraphResult<&str> {
    if is_safe_identifier(label) {
        Ok(label)
    } else {
        Err(GraphError::InvalidLabel {
            label: label.to_string(),
        })
    }
}

// ============================================================================
// Records
// ============================================================================

/// Identity of an entity node: one label and the `name` property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub label: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(:{} {{name: '{}'}})", self.label, self.name)
    }
}

/// Entity node as first written for a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalEntity {
    pub key: EntityKey,
    pub progress_id: String,
}

/// Node still carrying `onProgress`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveNode {
    pub handle: NodeId,
    pub name: String,
    pub progress_id: String,
    pub original_type: String,
}

/// Direction of an edge relative to the node it was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// An edge seen from one of its endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentEdge {
    pub relation: String,
    pub direction: Direction,
    pub other: NodeId,
}

/// `:Chunk` node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkNode {
    #[serde(rename = "chunkId")]
    pub chunk_id: String,
    pub directory: String,
    #[serde(rename = "formId")]
    pub form_id: String,
    #[serde(rename = "chunkSeqId")]
    pub chunk_seq_id: i64,
    pub text: String,
}

/// `:PdfFile` node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    #[serde(rename = "fileId")]
    pub file_id: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

// ============================================================================
// Store
// ============================================================================

/// Graph operations used by ingestion, consolidation and chat
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Remove every node and edge
    async fn truncate(&self) -> GraphResult<()>;

    /// MERGE a chunk node on `chunkId`
    async fn merge_chunk(&self, chunk: &ChunkNode) -> GraphResult<()>;

    /// MERGE a file node on `fileId`
    async fn merge_file(&self, file: &FileNode) -> GraphResult<()>;

    /// MERGE an entity on `(label, name)`; provisional markers are set only
    /// when the node is created
    async fn merge_entity(&self, entity: &ProvisionalEntity) -> GraphResult<()>;

    /// Add labels to every node matching `key`
    async fn add_labels(&self, key: &EntityKey, labels: &[String]) -> GraphResult<()>;

    /// MERGE `(head)-[:relation]->(tail)` between nodes matching the keys
    async fn merge_relation(&self, head: &EntityKey, relation: &str, tail: &EntityKey) -> GraphResult<()>;

    /// MERGE `(left)-[:relation]->(right)` between nodes matching progress ids
    async fn merge_relation_by_progress(&self, left: &str, relation: &str, right: &str) -> GraphResult<()>;

    /// Nodes with `onProgress` set, in store order
    async fn active_nodes(&self) -> GraphResult<Vec<ActiveNode>>;

    /// Set `persistent = 'Y'` and add `labels`
    async fn mark_persistent(&self, node: NodeId, labels: &[String]) -> GraphResult<()>;

    /// Copy every property of `from` onto `to`, overwriting
    async fn copy_properties(&self, from: NodeId, to: NodeId) -> GraphResult<()>;

    /// Add every label of `from` to `to`
    async fn copy_labels(&self, from: NodeId, to: NodeId) -> GraphResult<()>;

    /// Edges touching `node`
    async fn incident_edges(&self, node: NodeId) -> GraphResult<Vec<IncidentEdge>>;

    /// MERGE `(from)-[:relation]->(to)`
    async fn merge_edge(&self, from: NodeId, relation: &str, to: NodeId) -> GraphResult<()>;

    /// DETACH DELETE `node` unless it is `persistent`; true when deleted
    async fn delete_unless_persistent(&self, node: NodeId) -> GraphResult<bool>;

    /// Set the `alias` property
    async fn set_alias(&self, node: NodeId, alias: &str) -> GraphResult<()>;

    /// Number of nodes without `onProgress`
    async fn count_committed(&self) -> GraphResult<u64>;

    /// Set the permanent `id` property
    async fn assign_id(&self, node: NodeId, id: &str) -> GraphResult<()>;

    /// MERGE `DefinedInFile` from every active node to the file node
    async fn link_active_to_file(&self, file_id: &str) -> GraphResult<()>;

    /// Remove the provisional properties from every node
    async fn clear_provisional(&self) -> GraphResult<()>;

    /// Textual schema of the graph
    async fn schema(&self) -> GraphResult<String>;

    /// Run a read-only query, one JSON object per row
    async fn read_query(&self, query: &str) -> GraphResult<Vec<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_label() {
        assert_eq!(check_label("has_Employer").unwrap(), "has_Employer");
        assert!(matches!(
            check_label("Person`) DETACH DELETE (n"),
            Err(GraphError::InvalidLabel { .. })
        ));
        assert!(check_label("").is_err());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(GraphError::Connection("x".into()).code(), StatusCode::GRAPH_CONNECT);
        assert_eq!(GraphError::query("MATCH (n)", "boom").code(), StatusCode::GRAPH_QUERY);
        assert_eq!(GraphError::Schema("x".into()).code(), StatusCode::GRAPH_SCHEMA);
    }

    #[test]
    fn test_chunk_node_property_names() {
        let chunk = ChunkNode {
            chunk_id: "report-chunk000000".into(),
            directory: "docs".into(),
            form_id: "report".into(),
            chunk_seq_id: 0,
            text: "Alice works at Acme.".into(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["chunkId"], "report-chunk000000");
        assert_eq!(json["formId"], "report");
        assert_eq!(json["chunkSeqId"], 0);
    }
}
