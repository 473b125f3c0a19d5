//! Memgraph over Bolt

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query};
use serde_json::Value;

use super::{
    check_label, ActiveNode, ChunkNode, Direction, EntityKey, FileNode, GraphError, GraphResult,
    GraphStore, IncidentEdge, NodeId, ProvisionalEntity,
};

const SCHEMA_QUERY: &str = "SHOW SCHEMA INFO";

const SCHEMA_HELP: &str = "This could be caused by missing configuration options in Memgraph. \
Please, validate that the file /etc/memgraph/memgraph.conf has the option --schema-info-enabled set to True. \
If the option --schema-info-enabled is set to False, or if it doesn't exist in the configuration file, \
please adjust it and restart the Memgraph service. \
For more information on Memgraph configuration, please visit: https://memgraph.com/docs/database-management/configuration \
For information regarding the operation SHOW SCHEMA INFO, visit: https://memgraph.com/docs/querying/schema";

/// Graph store backed by a Memgraph server
pub struct MemgraphStore {
    graph: Graph,
}

impl MemgraphStore {
    /// Connect and check the server with a trivial query
    pub async fn connect(uri: &str, user: &str, password: &str) -> GraphResult<Self> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        let graph = Graph::connect(config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri, "Connected to Memgraph");
        Ok(Self { graph })
    }

    async fn run(&self, text: &str, q: Query) -> GraphResult<()> {
        tracing::debug!(query = text, "Running Cypher");
        self.graph
            .run(q)
            .await
            .map_err(|e| GraphError::query(text, e))
    }

    async fn rows(&self, text: &str, q: Query) -> GraphResult<Vec<neo4rs::Row>> {
        tracing::debug!(query = text, "Running Cypher");
        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(|e| GraphError::query(text, e))?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(|e| GraphError::query(text, e))? {
            rows.push(row);
        }
        Ok(rows)
    }
}

fn field<T: serde::de::DeserializeOwned>(row: &neo4rs::Row, key: &str, text: &str) -> GraphResult<T> {
    row.get::<T>(key).map_err(|e| GraphError::query(text, e))
}

/// `:`A`:`B`` label list, every label checked
fn label_list(labels: &[String]) -> GraphResult<String> {
    labels
        .iter()
        .map(|l| check_label(l).map(|l| format!(":`{l}`")))
        .collect()
}

#[async_trait]
impl GraphStore for MemgraphStore {
    async fn truncate(&self) -> GraphResult<()> {
        let text = "MATCH (n) DETACH DELETE n";
        self.run(text, query(text)).await
    }

    async fn merge_chunk(&self, chunk: &ChunkNode) -> GraphResult<()> {
        tracing::debug!(chunk_id = %chunk.chunk_id, "Creating `:Chunk` node");
        let text = "MERGE (c:Chunk {chunkId: $chunkId})
            ON CREATE SET c.directory = $directory, c.formId = $formId,
                          c.chunkSeqId = $chunkSeqId, c.text = $text";
        let q = query(text)
            .param("chunkId", chunk.chunk_id.as_str())
            .param("directory", chunk.directory.as_str())
            .param("formId", chunk.form_id.as_str())
            .param("chunkSeqId", chunk.chunk_seq_id)
            .param("text", chunk.text.as_str());
        self.run(text, q).await
    }

    async fn merge_file(&self, file: &FileNode) -> GraphResult<()> {
        let text = "MERGE (f:PdfFile {fileId: $fileId}) ON CREATE SET f.filePath = $filePath";
        let q = query(text)
            .param("fileId", file.file_id.as_str())
            .param("filePath", file.file_path.as_str());
        self.run(text, q).await
    }

    async fn merge_entity(&self, entity: &ProvisionalEntity) -> GraphResult<()> {
        let label = check_label(&entity.key.label)?;
        let text = format!(
            "MERGE (m:`{label}` {{name: $name}})
                ON CREATE SET m.onProgress = 'Y', m.progressId = $progressId, m.originalType = $originalType"
        );
        let q = query(&text)
            .param("name", entity.key.name.as_str())
            .param("progressId", entity.progress_id.as_str())
            .param("originalType", label);
        self.run(&text, q).await
    }

    async fn add_labels(&self, key: &EntityKey, labels: &[String]) -> GraphResult<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let label = check_label(&key.label)?;
        let text = format!("MATCH (m:`{label}` {{name: $name}}) SET m{}", label_list(labels)?);
        let q = query(&text).param("name", key.name.as_str());
        self.run(&text, q).await
    }

    async fn merge_relation(&self, head: &EntityKey, relation: &str, tail: &EntityKey) -> GraphResult<()> {
        let text = format!(
            "MATCH (m:`{}` {{name: $head}}), (n:`{}` {{name: $tail}}) MERGE (m)-[:`{}`]->(n)",
            check_label(&head.label)?,
            check_label(&tail.label)?,
            check_label(relation)?
        );
        let q = query(&text)
            .param("head", head.name.as_str())
            .param("tail", tail.name.as_str());
        self.run(&text, q).await
    }

    async fn merge_relation_by_progress(&self, left: &str, relation: &str, right: &str) -> GraphResult<()> {
        let text = format!(
            "MATCH (m {{progressId: $left}}), (n {{progressId: $right}}) MERGE (m)-[:`{}`]->(n)",
            check_label(relation)?
        );
        let q = query(&text).param("left", left).param("right", right);
        self.run(&text, q).await
    }

    async fn active_nodes(&self) -> GraphResult<Vec<ActiveNode>> {
        let text = "MATCH (n) WHERE n.onProgress IS NOT NULL
            RETURN id(n) AS handle, n.name AS name, n.progressId AS progressId, n.originalType AS originalType";
        let rows = self.rows(text, query(text)).await?;
        rows.iter()
            .map(|row| {
                Ok(ActiveNode {
                    handle: field(row, "handle", text)?,
                    name: field::<Option<String>>(row, "name", text)?.unwrap_or_default(),
                    progress_id: field::<Option<String>>(row, "progressId", text)?.unwrap_or_default(),
                    original_type: field::<Option<String>>(row, "originalType", text)?.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn mark_persistent(&self, node: NodeId, labels: &[String]) -> GraphResult<()> {
        let extra = if labels.is_empty() {
            String::new()
        } else {
            format!(", n{}", label_list(labels)?)
        };
        let text = format!("MATCH (n) WHERE id(n) = $handle SET n.persistent = 'Y'{extra}");
        let q = query(&text).param("handle", node);
        self.run(&text, q).await
    }

    async fn copy_properties(&self, from: NodeId, to: NodeId) -> GraphResult<()> {
        let text = "MATCH (old), (new) WHERE id(old) = $from AND id(new) = $to SET new += old";
        let q = query(text).param("from", from).param("to", to);
        self.run(text, q).await
    }

    async fn copy_labels(&self, from: NodeId, to: NodeId) -> GraphResult<()> {
        let text = "MATCH (n) WHERE id(n) = $handle RETURN labels(n) AS labels";
        let labels: Vec<String> = match self.rows(text, query(text).param("handle", from)).await?.first() {
            Some(row) => field(row, "labels", text)?,
            None => return Ok(()),
        };
        if labels.is_empty() {
            return Ok(());
        }

        let text = format!("MATCH (n) WHERE id(n) = $handle SET n{}", label_list(&labels)?);
        let q = query(&text).param("handle", to);
        self.run(&text, q).await
    }

    async fn incident_edges(&self, node: NodeId) -> GraphResult<Vec<IncidentEdge>> {
        let text = "MATCH (n)-[r]-(o) WHERE id(n) = $handle
            RETURN type(r) AS relation, id(startNode(r)) AS start, id(o) AS other";
        let rows = self.rows(text, query(text).param("handle", node)).await?;
        rows.iter()
            .map(|row| {
                let start: NodeId = field(row, "start", text)?;
                Ok(IncidentEdge {
                    relation: field(row, "relation", text)?,
                    direction: if start == node {
                        Direction::Outgoing
                    } else {
                        Direction::Incoming
                    },
                    other: field(row, "other", text)?,
                })
            })
            .collect()
    }

    async fn merge_edge(&self, from: NodeId, relation: &str, to: NodeId) -> GraphResult<()> {
        let text = format!(
            "MATCH (a), (b) WHERE id(a) = $from AND id(b) = $to MERGE (a)-[:`{}`]->(b)",
            check_label(relation)?
        );
        let q = query(&text).param("from", from).param("to", to);
        self.run(&text, q).await
    }

    async fn delete_unless_persistent(&self, node: NodeId) -> GraphResult<bool> {
        let text = "MATCH (n) WHERE id(n) = $handle AND n.persistent IS NULL
            DETACH DELETE n RETURN count(*) AS deleted";
        let rows = self.rows(text, query(text).param("handle", node)).await?;
        let deleted: i64 = match rows.first() {
            Some(row) => field(row, "deleted", text)?,
            None => 0,
        };
        Ok(deleted > 0)
    }

    async fn set_alias(&self, node: NodeId, alias: &str) -> GraphResult<()> {
        let text = "MATCH (n) WHERE id(n) = $handle SET n.alias = $alias";
        let q = query(text).param("handle", node).param("alias", alias);
        self.run(text, q).await
    }

    async fn count_committed(&self) -> GraphResult<u64> {
        let text = "MATCH (n) WHERE n.onProgress IS NULL RETURN count(n) AS total_past_nodes";
        let rows = self.rows(text, query(text)).await?;
        let total: i64 = match rows.first() {
            Some(row) => field(row, "total_past_nodes", text)?,
            None => 0,
        };
        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn assign_id(&self, node: NodeId, id: &str) -> GraphResult<()> {
        let text = "MATCH (n) WHERE id(n) = $handle SET n.id = $id";
        let q = query(text).param("handle", node).param("id", id);
        self.run(text, q).await
    }

    async fn link_active_to_file(&self, file_id: &str) -> GraphResult<()> {
        let text = "MATCH (m), (f:PdfFile {fileId: $fileId}) WHERE m.onProgress IS NOT NULL
            MERGE (m)-[:DefinedInFile]->(f)";
        self.run(text, query(text).param("fileId", file_id)).await
    }

    async fn clear_provisional(&self) -> GraphResult<()> {
        let text = "MATCH (n)
            WHERE n.onProgress IS NOT NULL OR n.progressId IS NOT NULL
               OR n.persistent IS NOT NULL OR n.originalType IS NOT NULL
            SET n.onProgress = NULL, n.progressId = NULL, n.persistent = NULL, n.originalType = NULL";
        self.run(text, query(text)).await
    }

    async fn schema(&self) -> GraphResult<String> {
        let rows = match self.rows(SCHEMA_QUERY, query(SCHEMA_QUERY)).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("Error during execution of '{SCHEMA_QUERY}': {e}. {SCHEMA_HELP}");
                return Err(GraphError::Schema(e.to_string()));
            }
        };

        let schema = rows
            .first()
            .and_then(|row| row.get::<String>("schema").ok())
            .filter(|s| !s.is_empty());
        match schema {
            Some(s) => Ok(s),
            None => {
                tracing::error!("'{SCHEMA_QUERY}' returned no schema. {SCHEMA_HELP}");
                Err(GraphError::Schema("empty schema".to_string()))
            }
        }
    }

    async fn read_query(&self, text: &str) -> GraphResult<Vec<Value>> {
        let rows = self.rows(text, query(text)).await?;
        rows.iter()
            .map(|row| row.to::<Value>().map_err(|e| GraphError::query(text, e)))
            .collect()
    }
}

impl std::fmt::Debug for MemgraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemgraphStore").finish_non_exhaustive()
    }
}
