//! Triple validation and ingestion
//!
//! A chunk's triples go into the graph in two passes. The first pass
//! normalizes every triple and MERGEs its endpoint nodes (with their
//! superclass labels); the second emits the relations. Relations are checked
//! against the ontology in both directions: a triple the ontology only allows
//! reversed is written reversed, one it allows in neither direction is
//! dropped while its nodes stay.

use std::sync::Arc;

use super::extractor::Triple;
use crate::graph::{EntityKey, GraphStore, ProvisionalEntity};
use crate::ontology::OntologyStore;
use crate::utils::{clean_name, match_key, sanitize_label};

/// Map an LLM-proposed type or relation onto an approved name.
///
/// With no approved names (no ontology) the sanitized candidate is kept.
/// Otherwise the approved name with the same [`match_key`] is returned, or
/// the empty string when there is none.
pub fn approve(candidate: &str, approved: &[String]) -> String {
    let cleaned = sanitize_label(candidate);
    if approved.is_empty() || cleaned.is_empty() {
        return cleaned;
    }
    let key = match_key(&cleaned);
    approved
        .iter()
        .find(|a| match_key(a) == key)
        .cloned()
        .unwrap_or_default()
}

/// A triple after normalization and name validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedTriple {
    pub head: String,
    pub head_type: String,
    pub relation: String,
    pub tail: String,
    pub tail_type: String,
    pub prefix_id: String,
}

impl ValidatedTriple {
    pub fn head_key(&self) -> Option<EntityKey> {
        (!self.head.is_empty() && !self.head_type.is_empty())
            .then(|| EntityKey::new(&self.head_type, &self.head))
    }

    pub fn tail_key(&self) -> Option<EntityKey> {
        (!self.tail.is_empty() && !self.tail_type.is_empty())
            .then(|| EntityKey::new(&self.tail_type, &self.tail))
    }

    fn is_complete(&self) -> bool {
        self.head_key().is_some() && self.tail_key().is_some() && !self.relation.is_empty()
    }

    fn reversed(&self) -> Self {
        Self {
            head: self.tail.clone(),
            head_type: self.tail_type.clone(),
            relation: self.relation.clone(),
            tail: self.head.clone(),
            tail_type: self.head_type.clone(),
            prefix_id: self.prefix_id.clone(),
        }
    }
}

/// What happened to the relation of a triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOutcome {
    /// Written as proposed
    Forward,
    /// Written with head and tail swapped
    Reversed,
    /// Not allowed in either direction
    Denied,
    /// A type or the relation has no ontology URI
    Unresolved,
    /// An endpoint or the relation is missing
    Incomplete,
    /// The graph store rejected the write
    Failed,
}

/// Writes validated triples into the graph
#[derive(Clone)]
pub struct TripleIngestor {
    graph: Arc<dyn GraphStore>,
    ontology: Option<Arc<OntologyStore>>,
    classes: Vec<String>,
    properties: Vec<String>,
}

impl TripleIngestor {
    pub fn new(graph: Arc<dyn GraphStore>, ontology: Option<Arc<OntologyStore>>) -> Self {
        let (classes, properties) = match &ontology {
            Some(o) => (o.classes(), o.properties()),
            None => (Vec::new(), Vec::new()),
        };
        Self {
            graph,
            ontology,
            classes,
            properties,
        }
    }

    /// Normalize names and validate types and relation
    pub fn validate(&self, triple: &Triple) -> ValidatedTriple {
        ValidatedTriple {
            head: clean_name(&triple.head),
            head_type: approve(&triple.head_type, &self.classes),
            relation: approve(&triple.relation, &self.properties),
            tail: clean_name(&triple.tail),
            tail_type: approve(&triple.tail_type, &self.classes),
            prefix_id: triple.prefix_id.clone(),
        }
    }

    /// Ingest the triples of one chunk, nodes first
    pub async fn ingest(&self, triples: &[Triple]) -> Vec<RelationOutcome> {
        let validated: Vec<ValidatedTriple> = triples.iter().map(|t| self.validate(t)).collect();

        for t in &validated {
            if let Some(key) = t.head_key() {
                self.materialize(key, format!("{}A", t.prefix_id)).await;
            }
            if let Some(key) = t.tail_key() {
                self.materialize(key, format!("{}B", t.prefix_id)).await;
            }
        }

        let mut outcomes = Vec::with_capacity(validated.len());
        for t in &validated {
            outcomes.push(self.emit_relation(t).await);
        }
        outcomes
    }

    async fn materialize(&self, key: EntityKey, progress_id: String) {
        let entity = ProvisionalEntity { key, progress_id };
        if let Err(e) = self.graph.merge_entity(&entity).await {
            tracing::error!(node = %entity.key, "Could not merge node: {e}");
            return;
        }

        if let Some(ontology) = &self.ontology {
            let superclasses = ontology.superclass_labels(&entity.key.label);
            if !superclasses.is_empty() {
                tracing::debug!(node = %entity.key, ?superclasses, "Adding superclasses");
                if let Err(e) = self.graph.add_labels(&entity.key, &superclasses).await {
                    tracing::error!(node = %entity.key, "Could not add superclasses: {e}");
                }
            }
        }
    }

    /// Check the relation of one triple and write it, reversed if needed
    pub async fn emit_relation(&self, triple: &ValidatedTriple) -> RelationOutcome {
        if !triple.is_complete() {
            return RelationOutcome::Incomplete;
        }

        let Some(ontology) = &self.ontology else {
            return self.write(triple, &[], RelationOutcome::Forward).await;
        };

        let uris = (
            ontology.uri_of(&triple.head_type),
            ontology.uri_of(&triple.relation),
            ontology.uri_of(&triple.tail_type),
        );
        let (Some(head_uri), Some(rel_uri), Some(tail_uri)) = uris else {
            tracing::error!(
                head_type = %triple.head_type,
                relation = %triple.relation,
                tail_type = %triple.tail_type,
                "Couldn't retrieve LLM detected labels and RDF labels"
            );
            return RelationOutcome::Unresolved;
        };

        let superproperties = ontology.superproperty_labels(&triple.relation);

        if permits(ontology, head_uri, rel_uri, tail_uri) {
            return self.write(triple, &superproperties, RelationOutcome::Forward).await;
        }

        if permits(ontology, tail_uri, rel_uri, head_uri) {
            let reversed = triple.reversed();
            tracing::warn!(
                "LLM created a relation with an inverse direction. Detected <<head: {}, head_type: {}, relation: {}, tail: {}, tail_type: {}>>, changing to <<head: {}, head_type: {}, relation: {}, tail: {}, tail_type: {}>>",
                triple.head, triple.head_type, triple.relation, triple.tail, triple.tail_type,
                reversed.head, reversed.head_type, reversed.relation, reversed.tail, reversed.tail_type,
            );
            return self.write(&reversed, &superproperties, RelationOutcome::Reversed).await;
        }

        tracing::info!(
            "Relation '{}' cannot exist between classes '{}' and '{}'. Skipping relation...",
            triple.relation,
            triple.head_type,
            triple.tail_type
        );
        RelationOutcome::Denied
    }

    async fn write(
        &self,
        triple: &ValidatedTriple,
        superproperties: &[String],
        outcome: RelationOutcome,
    ) -> RelationOutcome {
        let (Some(head), Some(tail)) = (triple.head_key(), triple.tail_key()) else {
            return RelationOutcome::Incomplete;
        };

        for relation in std::iter::once(&triple.relation).chain(superproperties) {
            if let Err(e) = self.graph.merge_relation(&head, relation, &tail).await {
                tracing::error!(%head, relation = %relation, %tail, "Could not merge relation: {e}");
                return RelationOutcome::Failed;
            }
        }
        outcome
    }
}

fn permits(ontology: &OntologyStore, domain: &str, relation: &str, range: &str) -> bool {
    ontology.permits(domain, relation, range).unwrap_or_else(|e| {
        tracing::error!("{e}");
        false
    })
}

impl std::fmt::Debug for TripleIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripleIngestor")
            .field("ontology", &self.ontology.is_some())
            .field("classes", &self.classes.len())
            .field("properties", &self.properties.len())
            .finish()
    }
}
