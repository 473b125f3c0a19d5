//! Entity resolution within a chunk
//!
//! After a chunk's triples are ingested, the active nodes are grouped by
//! `originalType` and handed to a [`CoreferenceOracle`], which answers with
//! an ordered partition per type. Each co-referent group is merged into the
//! node of its first member:
//!
//! 1. the first member is marked `persistent` and receives the superclass
//!    labels of the type
//! 2. every following member has its properties copied onto the survivor
//!    (overwriting, `progressId` and `name` included), its edges recreated on
//!    the survivor with their direction, and is then deleted
//! 3. the survivor's `alias` lists every absorbed name except the last one,
//!    which is now the survivor's `name`
//!
//! Because properties are overwritten in chain order, the survivor ends up
//! with the last member's properties on the first member's node.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::graph::{ActiveNode, Direction, GraphStore, NodeId};
use crate::llm::{extract_json, ChatMessage, LanguageModel};
use crate::ontology::OntologyStore;
use crate::prompts::{ids, PromptStore, PromptVariables};
use crate::utils::sanitize_label;

/// Active nodes keyed by `originalType`
pub type ActiveGroups = BTreeMap<String, Vec<ActiveNode>>;

/// `originalType` → ordered co-referent groups of progress ids
pub type Partition = BTreeMap<String, Vec<Vec<String>>>;

/// relation → `(leftProgressId, rightProgressId)` pairs
pub type ImpliedRelations = BTreeMap<String, Vec<(String, String)>>;

/// Decides which active nodes refer to the same entity
#[async_trait]
pub trait CoreferenceOracle: Send + Sync {
    /// Ordered co-referent groups for each type group
    async fn group(&self, active: &ActiveGroups) -> Partition;

    /// Relations implied by the consolidated chunk
    async fn implied_relations(&self, _active: &[ActiveNode]) -> ImpliedRelations {
        ImpliedRelations::new()
    }
}

/// Group active nodes by `originalType`, in store order
pub fn group_by_type(active: &[ActiveNode]) -> ActiveGroups {
    let mut groups = ActiveGroups::new();
    for node in active {
        groups
            .entry(node.original_type.clone())
            .or_default()
            .push(node.clone());
    }
    groups
}

// ============================================================================
// LLM oracle
// ============================================================================

/// Oracle backed by prompts 3 (grouping) and 4 (implied relations)
pub struct LlmCoreferenceOracle {
    llm: Arc<dyn LanguageModel>,
    prompts: PromptStore,
    relation_names: Vec<String>,
}

impl LlmCoreferenceOracle {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: PromptStore, ontology: Option<&OntologyStore>) -> Self {
        Self {
            llm,
            prompts,
            relation_names: ontology.map(OntologyStore::properties).unwrap_or_default(),
        }
    }

    async fn ask(&self, prompt_id: i32, variables: PromptVariables, payload: &Value) -> Option<Value> {
        let system = self.prompts.render(prompt_id, &variables).await;
        if system.is_empty() {
            tracing::warn!(prompt_id, "Prompt is empty; skipping LLM call");
            return None;
        }
        let messages = [ChatMessage::system(system), ChatMessage::user(payload.to_string())];
        let answer = self.llm.chat(&messages).await?;
        match serde_json::from_str(&extract_json(&answer)) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(prompt_id, "Could not parse LLM answer as JSON: {e}");
                None
            }
        }
    }
}

fn nodes_payload(active: &ActiveGroups) -> Value {
    let groups: serde_json::Map<String, Value> = active
        .iter()
        .map(|(ty, nodes)| {
            let entries: Vec<Value> = nodes
                .iter()
                .map(|n| json!({"progressId": n.progress_id, "name": n.name}))
                .collect();
            (ty.clone(), Value::Array(entries))
        })
        .collect();
    Value::Object(groups)
}

/// Read `{type: [[id, ...], ...]}`; a flat `[id, ...]` is one group
pub fn parse_partition(value: &Value) -> Partition {
    let Some(map) = value.as_object() else {
        return Partition::new();
    };
    let ids = |v: &Value| -> Vec<String> {
        v.as_array()
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };

    map.iter()
        .filter_map(|(ty, groups)| {
            let groups = groups.as_array()?;
            let partition: Vec<Vec<String>> = if groups.iter().all(Value::is_string) {
                vec![ids(&Value::Array(groups.clone()))]
            } else {
                groups.iter().map(ids).filter(|g| !g.is_empty()).collect()
            };
            Some((ty.clone(), partition))
        })
        .collect()
}

/// Read `{relation: [[left, right], ...]}`
pub fn parse_implied_relations(value: &Value) -> ImpliedRelations {
    let Some(map) = value.as_object() else {
        return ImpliedRelations::new();
    };
    map.iter()
        .filter_map(|(relation, pairs)| {
            let pairs: Vec<(String, String)> = pairs
                .as_array()?
                .iter()
                .filter_map(|p| {
                    let p = p.as_array()?;
                    match (p.first()?.as_str(), p.get(1)?.as_str()) {
                        (Some(l), Some(r)) => Some((l.to_string(), r.to_string())),
                        _ => None,
                    }
                })
                .collect();
            Some((relation.clone(), pairs))
        })
        .collect()
}

#[async_trait]
impl CoreferenceOracle for LlmCoreferenceOracle {
    async fn group(&self, active: &ActiveGroups) -> Partition {
        let payload = nodes_payload(active);
        let variables = PromptVariables::from([
            ("nodes".to_string(), payload.to_string()),
            (
                "node_types".to_string(),
                active.keys().cloned().collect::<Vec<_>>().join(", "),
            ),
        ]);
        self.ask(ids::COREFERENCE, variables, &payload)
            .await
            .map(|v| parse_partition(&v))
            .unwrap_or_default()
    }

    async fn implied_relations(&self, active: &[ActiveNode]) -> ImpliedRelations {
        let nodes: Vec<Value> = active
            .iter()
            .map(|n| json!({"progressId": n.progress_id, "name": n.name, "type": n.original_type}))
            .collect();
        let payload = Value::Array(nodes);
        let variables = PromptVariables::from([
            ("nodes".to_string(), payload.to_string()),
            ("relations".to_string(), self.relation_names.join(", ")),
        ]);
        self.ask(ids::IMPLIED_RELATIONS, variables, &payload)
            .await
            .map(|v| parse_implied_relations(&v))
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for LlmCoreferenceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCoreferenceOracle")
            .field("prompts", &self.prompts)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Counters of one resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub groups: usize,
    pub absorbed: usize,
}

/// Merges co-referent active nodes
#[derive(Clone)]
pub struct EntityResolver {
    graph: Arc<dyn GraphStore>,
    ontology: Option<Arc<OntologyStore>>,
    oracle: Arc<dyn CoreferenceOracle>,
}

impl EntityResolver {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        ontology: Option<Arc<OntologyStore>>,
        oracle: Arc<dyn CoreferenceOracle>,
    ) -> Self {
        Self { graph, ontology, oracle }
    }

    /// Ask the oracle about every type group with two or more active nodes
    /// and merge what it returns
    pub async fn resolve(&self) -> ResolveReport {
        let active = match self.graph.active_nodes().await {
            Ok(active) => active,
            Err(e) => {
                tracing::error!("Could not read active nodes: {e}");
                return ResolveReport::default();
            }
        };

        let candidates: ActiveGroups = group_by_type(&active)
            .into_iter()
            .filter(|(_, nodes)| nodes.len() > 1)
            .collect();
        if candidates.is_empty() {
            return ResolveReport::default();
        }

        let partition = self.oracle.group(&candidates).await;
        tracing::debug!(?partition, "Co-reference partition");
        self.merge_partition(&active, &partition).await
    }

    /// Merge every group of `partition`
    pub async fn merge_partition(&self, active: &[ActiveNode], partition: &Partition) -> ResolveReport {
        let index: HashMap<&str, &ActiveNode> =
            active.iter().map(|n| (n.progress_id.as_str(), n)).collect();
        let mut consumed: HashSet<String> = HashSet::new();
        let mut report = ResolveReport::default();

        for (original_type, groups) in partition {
            for group in groups {
                let mut members: Vec<&ActiveNode> = Vec::new();
                for id in group {
                    match index.get(id.as_str()) {
                        None => tracing::warn!(progress_id = %id, "Unknown progress id in co-reference group"),
                        Some(_) if consumed.contains(id) => {
                            tracing::warn!(progress_id = %id, "Progress id already merged; ignoring")
                        }
                        Some(node) if node.original_type != *original_type => tracing::warn!(
                            progress_id = %id,
                            expected = %original_type,
                            found = %node.original_type,
                            "Node type does not match its co-reference group"
                        ),
                        Some(node) => {
                            consumed.insert(id.clone());
                            members.push(node);
                        }
                    }
                }
                if members.is_empty() {
                    continue;
                }

                report.groups += 1;
                report.absorbed += self.merge_group(original_type, &members).await;
            }
        }

        report
    }

    async fn merge_group(&self, original_type: &str, members: &[&ActiveNode]) -> usize {
        let survivor = members[0].handle;
        let labels = match &self.ontology {
            Some(o) => o.superclass_labels(original_type),
            None => Vec::new(),
        };
        if let Err(e) = self.graph.mark_persistent(survivor, &labels).await {
            tracing::error!(progress_id = %members[0].progress_id, "Could not mark merge survivor: {e}");
            return 0;
        }

        let mut alias = vec![members[0].name.clone()];
        let mut absorbed = 0;
        for member in &members[1..] {
            if let Err(e) = self.absorb(survivor, member.handle).await {
                tracing::error!(progress_id = %member.progress_id, "Merge failed: {e}");
                continue;
            }
            alias.push(member.name.clone());
            absorbed += 1;
        }

        if alias.len() > 1 {
            let joined = alias[..alias.len() - 1].join(";");
            if let Err(e) = self.graph.set_alias(survivor, &joined).await {
                tracing::error!("Could not set alias: {e}");
            }
        }
        absorbed
    }

    async fn absorb(&self, survivor: NodeId, member: NodeId) -> crate::graph::GraphResult<()> {
        self.graph.copy_properties(member, survivor).await?;
        self.graph.copy_labels(member, survivor).await?;

        for edge in self.graph.incident_edges(member).await? {
            let other = if edge.other == member { survivor } else { edge.other };
            match edge.direction {
                Direction::Outgoing => self.graph.merge_edge(survivor, &edge.relation, other).await?,
                Direction::Incoming => self.graph.merge_edge(other, &edge.relation, survivor).await?,
            }
        }

        if !self.graph.delete_unless_persistent(member).await? {
            tracing::warn!(node = member, "Merged node is persistent and was kept");
        }
        Ok(())
    }

    /// Ask the oracle for implied relations and write them
    pub async fn add_implied_relations(&self) -> usize {
        let active = match self.graph.active_nodes().await {
            Ok(active) if !active.is_empty() => active,
            Ok(_) => return 0,
            Err(e) => {
                tracing::error!("Could not read active nodes: {e}");
                return 0;
            }
        };
        let relations = self.oracle.implied_relations(&active).await;
        create_new_relations(self.graph.as_ref(), &relations).await
    }
}

impl std::fmt::Debug for EntityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityResolver")
            .field("ontology", &self.ontology.is_some())
            .finish_non_exhaustive()
    }
}

/// MERGE each `(left)-[:relation]->(right)` by progress id, unchecked
/// against the ontology; returns the number of pairs written
pub async fn create_new_relations(graph: &dyn GraphStore, relations: &ImpliedRelations) -> usize {
    let mut written = 0;
    for (relation, pairs) in relations {
        let label = sanitize_label(relation);
        if label.is_empty() {
            tracing::warn!(relation = %relation, "Relation name is empty after cleaning");
            continue;
        }
        for (left, right) in pairs {
            match graph.merge_relation_by_progress(left, &label, right).await {
                Ok(()) => written += 1,
                Err(e) => tracing::error!("Error during execution: {e}"),
            }
        }
    }
    written
}
