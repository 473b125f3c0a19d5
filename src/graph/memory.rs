//! In-memory graph store
//!
//! Follows the Cypher semantics of the Memgraph queries (MERGE matches every
//! node with the label and name, MERGE of an edge is idempotent, DETACH DELETE
//! drops incident edges). Nodes iterate in creation order.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

use super::{
    check_label, props, ActiveNode, ChunkNode, Direction, EntityKey, FileNode, GraphError,
    GraphResult, GraphStore, IncidentEdge, NodeId, ProvisionalEntity, CHUNK_LABEL,
    DEFINED_IN_FILE, FILE_LABEL,
};

/// Node as stored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryNode {
    pub handle: NodeId,
    pub labels: BTreeSet<String>,
    pub properties: Map<String, Value>,
}

impl MemoryNode {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// Directed typed edge
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MemoryEdge {
    pub from: NodeId,
    pub relation: String,
    pub to: NodeId,
}

#[derive(Debug, Default)]
struct Inner {
    next_handle: NodeId,
    nodes: BTreeMap<NodeId, MemoryNode>,
    edges: BTreeSet<MemoryEdge>,
}

impl Inner {
    fn create(&mut self, label: &str, properties: Map<String, Value>) -> NodeId {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.nodes.insert(
            handle,
            MemoryNode {
                handle,
                labels: BTreeSet::from([label.to_string()]),
                properties,
            },
        );
        handle
    }

    fn find_by(&self, label: Option<&str>, key: &str, value: &str) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| label.map_or(true, |l| n.has_label(l)))
            .filter(|n| n.get_str(key) == Some(value))
            .map(|n| n.handle)
            .collect()
    }

    fn node_mut(&mut self, handle: NodeId) -> GraphResult<&mut MemoryNode> {
        self.nodes
            .get_mut(&handle)
            .ok_or_else(|| GraphError::query(format!("node {handle}"), "no such node"))
    }

    fn merge_edges(&mut self, from: &[NodeId], relation: &str, to: &[NodeId]) {
        for f in from {
            for t in to {
                self.edges.insert(MemoryEdge {
                    from: *f,
                    relation: relation.to_string(),
                    to: *t,
                });
            }
        }
    }
}

/// Graph held in process memory
#[derive(Debug, Default)]
pub struct MemoryGraph {
    inner: Mutex<Inner>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every node, in creation order
    pub async fn nodes(&self) -> Vec<MemoryNode> {
        self.inner.lock().await.nodes.values().cloned().collect()
    }

    /// Snapshot of every edge
    pub async fn edges(&self) -> Vec<MemoryEdge> {
        self.inner.lock().await.edges.iter().cloned().collect()
    }

    /// Nodes with `label` and `name`
    pub async fn find(&self, label: &str, name: &str) -> Vec<MemoryNode> {
        let inner = self.inner.lock().await;
        inner
            .find_by(Some(label), props::NAME, name)
            .into_iter()
            .filter_map(|h| inner.nodes.get(&h).cloned())
            .collect()
    }

    /// Relationship types from `from` to `to`
    pub async fn relations_between(&self, from: NodeId, to: NodeId) -> Vec<String> {
        self.inner
            .lock()
            .await
            .edges
            .iter()
            .filter(|e| e.from == from && e.to == to)
            .map(|e| e.relation.clone())
            .collect()
    }
}

fn provisional(node: &MemoryNode) -> bool {
    props::PROVISIONAL.iter().any(|p| node.properties.contains_key(*p))
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn truncate(&self) -> GraphResult<()> {
        let mut inner = self.inner.lock().await;
        inner.nodes.clear();
        inner.edges.clear();
        Ok(())
    }

    async fn merge_chunk(&self, chunk: &ChunkNode) -> GraphResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.find_by(Some(CHUNK_LABEL), "chunkId", &chunk.chunk_id).is_empty() {
            let properties = match serde_json::to_value(chunk) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            inner.create(CHUNK_LABEL, properties);
        }
        Ok(())
    }

    async fn merge_file(&self, file: &FileNode) -> GraphResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.find_by(Some(FILE_LABEL), "fileId", &file.file_id).is_empty() {
            let mut properties = Map::new();
            properties.insert("fileId".into(), json!(file.file_id));
            properties.insert("filePath".into(), json!(file.file_path));
            inner.create(FILE_LABEL, properties);
        }
        Ok(())
    }

    async fn merge_entity(&self, entity: &ProvisionalEntity) -> GraphResult<()> {
        let label = check_label(&entity.key.label)?;
        let mut inner = self.inner.lock().await;
        if inner.find_by(Some(label), props::NAME, &entity.key.name).is_empty() {
            let mut properties = Map::new();
            properties.insert(props::NAME.into(), json!(entity.key.name));
            properties.insert(props::ON_PROGRESS.into(), json!("Y"));
            properties.insert(props::PROGRESS_ID.into(), json!(entity.progress_id));
            properties.insert(props::ORIGINAL_TYPE.into(), json!(label));
            inner.create(label, properties);
        }
        Ok(())
    }

    async fn add_labels(&self, key: &EntityKey, labels: &[String]) -> GraphResult<()> {
        let label = check_label(&key.label)?;
        for l in labels {
            check_label(l)?;
        }
        let mut inner = self.inner.lock().await;
        for handle in inner.find_by(Some(label), props::NAME, &key.name) {
            inner.node_mut(handle)?.labels.extend(labels.iter().cloned());
        }
        Ok(())
    }

    async fn merge_relation(&self, head: &EntityKey, relation: &str, tail: &EntityKey) -> GraphResult<()> {
        let relation = check_label(relation)?;
        let mut inner = self.inner.lock().await;
        let from = inner.find_by(Some(check_label(&head.label)?), props::NAME, &head.name);
        let to = inner.find_by(Some(check_label(&tail.label)?), props::NAME, &tail.name);
        inner.merge_edges(&from, relation, &to);
        Ok(())
    }

    async fn merge_relation_by_progress(&self, left: &str, relation: &str, right: &str) -> GraphResult<()> {
        let relation = check_label(relation)?;
        let mut inner = self.inner.lock().await;
        let from = inner.find_by(None, props::PROGRESS_ID, left);
        let to = inner.find_by(None, props::PROGRESS_ID, right);
        inner.merge_edges(&from, relation, &to);
        Ok(())
    }

    async fn active_nodes(&self) -> GraphResult<Vec<ActiveNode>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .nodes
            .values()
            .filter(|n| n.properties.contains_key(props::ON_PROGRESS))
            .map(|n| ActiveNode {
                handle: n.handle,
                name: n.get_str(props::NAME).unwrap_or_default().to_string(),
                progress_id: n.get_str(props::PROGRESS_ID).unwrap_or_default().to_string(),
                original_type: n.get_str(props::ORIGINAL_TYPE).unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn mark_persistent(&self, node: NodeId, labels: &[String]) -> GraphResult<()> {
        for l in labels {
            check_label(l)?;
        }
        let mut inner = self.inner.lock().await;
        let n = inner.node_mut(node)?;
        n.properties.insert(props::PERSISTENT.into(), json!("Y"));
        n.labels.extend(labels.iter().cloned());
        Ok(())
    }

    async fn copy_properties(&self, from: NodeId, to: NodeId) -> GraphResult<()> {
        let mut inner = self.inner.lock().await;
        let source = inner.node_mut(from)?.properties.clone();
        inner.node_mut(to)?.properties.extend(source);
        Ok(())
    }

    async fn copy_labels(&self, from: NodeId, to: NodeId) -> GraphResult<()> {
        let mut inner = self.inner.lock().await;
        let labels = inner.node_mut(from)?.labels.clone();
        inner.node_mut(to)?.labels.extend(labels);
        Ok(())
    }

    async fn incident_edges(&self, node: NodeId) -> GraphResult<Vec<IncidentEdge>> {
        let inner = self.inner.lock().await;
        let mut out = Vec::new();
        for e in &inner.edges {
            if e.from == node {
                out.push(IncidentEdge {
                    relation: e.relation.clone(),
                    direction: Direction::Outgoing,
                    other: e.to,
                });
            } else if e.to == node {
                out.push(IncidentEdge {
                    relation: e.relation.clone(),
                    direction: Direction::Incoming,
                    other: e.from,
                });
            }
        }
        Ok(out)
    }

    async fn merge_edge(&self, from: NodeId, relation: &str, to: NodeId) -> GraphResult<()> {
        let relation = check_label(relation)?;
        let mut inner = self.inner.lock().await;
        if inner.nodes.contains_key(&from) && inner.nodes.contains_key(&to) {
            inner.merge_edges(&[from], relation, &[to]);
        }
        Ok(())
    }

    async fn delete_unless_persistent(&self, node: NodeId) -> GraphResult<bool> {
        let mut inner = self.inner.lock().await;
        let deletable = inner
            .nodes
            .get(&node)
            .is_some_and(|n| !n.properties.contains_key(props::PERSISTENT));
        if deletable {
            inner.nodes.remove(&node);
            inner.edges.retain(|e| e.from != node && e.to != node);
        }
        Ok(deletable)
    }

    async fn set_alias(&self, node: NodeId, alias: &str) -> GraphResult<()> {
        let mut inner = self.inner.lock().await;
        inner.node_mut(node)?.properties.insert(props::ALIAS.into(), json!(alias));
        Ok(())
    }

    async fn count_committed(&self) -> GraphResult<u64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .nodes
            .values()
            .filter(|n| !n.properties.contains_key(props::ON_PROGRESS))
            .count() as u64)
    }

    async fn assign_id(&self, node: NodeId, id: &str) -> GraphResult<()> {
        let mut inner = self.inner.lock().await;
        inner.node_mut(node)?.properties.insert(props::ID.into(), json!(id));
        Ok(())
    }

    async fn link_active_to_file(&self, file_id: &str) -> GraphResult<()> {
        let mut inner = self.inner.lock().await;
        let files = inner.find_by(Some(FILE_LABEL), "fileId", file_id);
        let active: Vec<NodeId> = inner
            .nodes
            .values()
            .filter(|n| n.properties.contains_key(props::ON_PROGRESS))
            .map(|n| n.handle)
            .collect();
        inner.merge_edges(&active, DEFINED_IN_FILE, &files);
        Ok(())
    }

    async fn clear_provisional(&self) -> GraphResult<()> {
        let mut inner = self.inner.lock().await;
        for node in inner.nodes.values_mut().filter(|n| provisional(n)) {
            for p in props::PROVISIONAL {
                node.properties.remove(p);
            }
        }
        Ok(())
    }

    async fn schema(&self) -> GraphResult<String> {
        let inner = self.inner.lock().await;

        let mut node_counts: BTreeMap<Vec<String>, u64> = BTreeMap::new();
        for n in inner.nodes.values() {
            *node_counts.entry(n.labels.iter().cloned().collect()).or_default() += 1;
        }
        let nodes: Vec<Value> = node_counts
            .into_iter()
            .map(|(labels, count)| json!({"labels": labels, "count": count}))
            .collect();

        let mut edge_counts: BTreeMap<(String, Vec<String>, Vec<String>), u64> = BTreeMap::new();
        for e in &inner.edges {
            let labels_of = |h: &NodeId| -> Vec<String> {
                inner
                    .nodes
                    .get(h)
                    .map(|n| n.labels.iter().cloned().collect())
                    .unwrap_or_default()
            };
            *edge_counts
                .entry((e.relation.clone(), labels_of(&e.from), labels_of(&e.to)))
                .or_default() += 1;
        }
        let edges: Vec<Value> = edge_counts
            .into_iter()
            .map(|((rel, start, end), count)| {
                json!({"type": rel, "start_node_labels": start, "end_node_labels": end, "count": count})
            })
            .collect();

        Ok(json!({"nodes": nodes, "edges": edges}).to_string())
    }

    async fn read_query(&self, _query: &str) -> GraphResult<Vec<Value>> {
        Err(GraphError::Unsupported(
            "the in-memory graph does not execute Cypher".to_string(),
        ))
    }
}
