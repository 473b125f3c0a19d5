//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ontorag::error::Result;
use ontorag::graph::ActiveNode;
use ontorag::kg::{ActiveGroups, CoreferenceOracle, ImpliedRelations, Partition, Triple};
use ontorag::llm::{ChatMessage, LanguageModel};
use ontorag::ontology::OntologyStore;
use ontorag::prompts::{ids, MemoryPromptSource, PromptRow, PromptStore};
use ontorag::storage::{RetrievedChunk, VectorIndex, VectorRecord};

pub const NS: &str = "http://example.org/onto#";

/// Person ⊑ Agent; hasEmployer: Person → Organization;
/// managesCompany ⊑ hasEmployer; locatedIn via schema:*Includes
pub const ONTOLOGY: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
         xmlns:owl="http://www.w3.org/2002/07/owl#"
         xmlns:schema="http://schema.org/">
  <owl:Class rdf:about="http://example.org/onto#Agent">
    <rdfs:comment>Something that acts</rdfs:comment>
  </owl:Class>
  <owl:Class rdf:about="http://example.org/onto#Person">
    <rdfs:subClassOf rdf:resource="http://example.org/onto#Agent"/>
    <rdfs:comment>A human being</rdfs:comment>
  </owl:Class>
  <owl:Class rdf:about="http://example.org/onto#Organization">
    <rdfs:comment>A company or institution</rdfs:comment>
  </owl:Class>
  <owl:Class rdf:about="http://example.org/onto#Place"/>
  <owl:ObjectProperty rdf:about="http://example.org/onto#hasEmployer">
    <rdfs:domain rdf:resource="http://example.org/onto#Person"/>
    <rdfs:range rdf:resource="http://example.org/onto#Organization"/>
    <rdfs:comment>Who pays the person</rdfs:comment>
  </owl:ObjectProperty>
  <owl:ObjectProperty rdf:about="http://example.org/onto#managesCompany">
    <rdfs:subPropertyOf rdf:resource="http://example.org/onto#hasEmployer"/>
  </owl:ObjectProperty>
  <owl:ObjectProperty rdf:about="http://example.org/onto#locatedIn">
    <schema:domainIncludes rdf:resource="http://example.org/onto#Agent"/>
    <schema:rangeIncludes rdf:resource="http://example.org/onto#Place"/>
  </owl:ObjectProperty>
</rdf:RDF>"#;

pub fn ontology() -> Arc<OntologyStore> {
    Arc::new(OntologyStore::from_reader(ONTOLOGY.as_bytes()).expect("fixture ontology parses"))
}

pub fn triple(head: &str, head_type: &str, relation: &str, tail: &str, tail_type: &str) -> Triple {
    Triple {
        head: head.into(),
        head_type: head_type.into(),
        relation: relation.into(),
        tail: tail.into(),
        tail_type: tail_type.into(),
        prefix_id: String::new(),
    }
}

/// Triples with prefix ids `<chunk>_<index>`
pub fn numbered(chunk: usize, triples: Vec<Triple>) -> Vec<Triple> {
    triples
        .into_iter()
        .enumerate()
        .map(|(i, mut t)| {
            t.prefix_id = format!("{chunk}_{i}");
            t
        })
        .collect()
}

fn row(general: i32, seq: i32, text: &str, vars: &str) -> PromptRow {
    PromptRow {
        prompt_id: general * 100 + seq,
        general_prompt_id: general,
        sequence_id: seq,
        lang: "en".into(),
        kind: "system".into(),
        description: String::new(),
        prompt: text.into(),
        variables: vars.into(),
    }
}

/// One short English prompt per id
pub fn prompt_store() -> PromptStore {
    let prompts = vec![
        row(ids::EXTRACTION_SYSTEM, 1, "Extract triples. Labels: {node_labels}. Relations: {rel_types}", "node_labels,rel_types"),
        row(ids::EXTRACTION_USER, 1, "Text: ", ""),
        row(ids::COREFERENCE, 1, "Group co-referent nodes of types {node_types}", "node_types"),
        row(ids::IMPLIED_RELATIONS, 1, "Propose relations among {nodes}", "nodes"),
        row(ids::VECTOR_ANSWER, 1, "Answer from: {context}", "context"),
        row(ids::GRAPH_QUERY, 1, "Schema: {schema}", "schema"),
        row(ids::GRAPH_ANSWER, 1, "Rows: {results}", "results"),
        row(ids::COMBINED_ANSWER, 1, "Context: {context} Rows: {results}", "context,results"),
    ];
    PromptStore::new(Arc::new(MemoryPromptSource::new(prompts, Vec::new())), "en")
}

/// LLM stub answering chats from a script, in order
#[derive(Default)]
pub struct ScriptedLlm {
    answers: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
    pub embedding: Option<Vec<f32>>,
}

impl ScriptedLlm {
    pub fn new<S: Into<String>>(answers: impl IntoIterator<Item = S>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
            embedding: Some(vec![1.0, 0.0, 0.0]),
        }
    }

    pub fn without_embeddings() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn chat(&self, messages: &[ChatMessage]) -> Option<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.answers.lock().unwrap().pop_front()
    }

    async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        self.embedding.clone()
    }
}

/// Oracle returning fixed answers
#[derive(Default)]
pub struct StubOracle {
    pub partition: Partition,
    pub implied: ImpliedRelations,
    pub seen: Mutex<Vec<ActiveGroups>>,
}

impl StubOracle {
    pub fn grouping(groups: &[(&str, Vec<Vec<&str>>)]) -> Self {
        let partition = groups
            .iter()
            .map(|(ty, gs)| {
                let gs = gs
                    .iter()
                    .map(|g| g.iter().map(|s| s.to_string()).collect())
                    .collect();
                (ty.to_string(), gs)
            })
            .collect();
        Self {
            partition,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CoreferenceOracle for StubOracle {
    async fn group(&self, active: &ActiveGroups) -> Partition {
        self.seen.lock().unwrap().push(active.clone());
        self.partition.clone()
    }

    async fn implied_relations(&self, _active: &[ActiveNode]) -> ImpliedRelations {
        self.implied.clone()
    }
}

/// Vector index kept in memory, nearest by cosine distance
#[derive(Default)]
pub struct MemoryVectorIndex {
    pub records: Mutex<Vec<VectorRecord>>,
    pub dimension: Mutex<Option<usize>>,
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        1.0
    } else {
        1.0 - dot / (na * nb)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn reset(&self, dimension: usize) -> Result<()> {
        self.records.lock().unwrap().clear();
        *self.dimension.lock().unwrap() = Some(dimension);
        Ok(())
    }

    async fn insert(&self, record: &VectorRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let mut records = self.records.lock().unwrap().clone();
        records.sort_by(|a, b| {
            cosine_distance(&a.embedding, embedding).total_cmp(&cosine_distance(&b.embedding, embedding))
        });
        Ok(records
            .into_iter()
            .take(k)
            .map(|r| RetrievedChunk {
                chunk_id: r.chunk_id,
                filename: r.filename,
                chunk: r.chunk,
            })
            .collect())
    }
}
