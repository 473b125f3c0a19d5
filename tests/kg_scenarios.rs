//! End-to-end knowledge graph scenarios on the in-memory graph store

mod common;

use std::sync::Arc;
use tracing_test::traced_test;

use common::{numbered, ontology, prompt_store, triple, ScriptedLlm, StubOracle};
use ontorag::graph::{props, ChunkNode, FileNode, GraphStore, MemoryGraph, DEFINED_IN_FILE, FILE_LABEL};
use ontorag::kg::{KgBuilder, KgContext, RelationOutcome, TripleIngestor};

fn ingestor(graph: &Arc<MemoryGraph>, with_ontology: bool) -> TripleIngestor {
    TripleIngestor::new(graph.clone(), with_ontology.then(ontology))
}

async fn handle(graph: &MemoryGraph, label: &str, name: &str) -> i64 {
    let found = graph.find(label, name).await;
    assert_eq!(found.len(), 1, "expected one ({label} {{name: {name}}})");
    found[0].handle
}

#[tokio::test]
async fn test_permitted_triple_gets_superclass_labels() {
    let graph = Arc::new(MemoryGraph::new());
    let triples = numbered(0, vec![triple("Alice", "Person", "hasEmployer", "Acme", "Organization")]);

    let outcomes = ingestor(&graph, true).ingest(&triples).await;
    assert_eq!(outcomes, [RelationOutcome::Forward]);

    let alice = &graph.find("Person", "Alice").await[0];
    let labels: Vec<&str> = alice.labels.iter().map(String::as_str).collect();
    assert_eq!(labels, ["Agent", "Person"]);
    let acme = &graph.find("Organization", "Acme").await[0];
    assert_eq!(acme.labels.len(), 1);

    assert_eq!(graph.relations_between(alice.handle, acme.handle).await, ["hasEmployer"]);
    assert!(graph.relations_between(acme.handle, alice.handle).await.is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_inverse_relation_is_rewritten() {
    let graph = Arc::new(MemoryGraph::new());
    let triples = numbered(0, vec![triple("Acme", "Organization", "hasEmployer", "Alice", "Person")]);

    let outcomes = ingestor(&graph, true).ingest(&triples).await;
    assert_eq!(outcomes, [RelationOutcome::Reversed]);

    let alice = handle(&graph, "Person", "Alice").await;
    let acme = handle(&graph, "Organization", "Acme").await;
    assert_eq!(graph.relations_between(alice, acme).await, ["hasEmployer"]);
    assert!(graph.relations_between(acme, alice).await.is_empty());
    assert!(logs_contain("inverse direction"));
}

#[tokio::test]
#[traced_test]
async fn test_forbidden_relation_keeps_nodes() {
    let graph = Arc::new(MemoryGraph::new());
    let triples = numbered(0, vec![triple("Alice", "Person", "hasEmployer", "Bob", "Person")]);

    let outcomes = ingestor(&graph, true).ingest(&triples).await;
    assert_eq!(outcomes, [RelationOutcome::Denied]);

    handle(&graph, "Person", "Alice").await;
    handle(&graph, "Person", "Bob").await;
    assert!(graph.edges().await.is_empty());
    assert!(logs_contain("cannot exist between classes"));
}

#[tokio::test]
async fn test_superproperty_edges_are_added() {
    let graph = Arc::new(MemoryGraph::new());
    let triples = numbered(0, vec![triple("Alice", "Person", "managesCompany", "Acme", "Organization")]);

    let outcomes = ingestor(&graph, true).ingest(&triples).await;
    assert_eq!(outcomes, [RelationOutcome::Forward]);

    let alice = handle(&graph, "Person", "Alice").await;
    let acme = handle(&graph, "Organization", "Acme").await;
    assert_eq!(
        graph.relations_between(alice, acme).await,
        ["hasEmployer", "managesCompany"]
    );
}

#[tokio::test]
async fn test_permissive_mode_keeps_proposed_names() {
    let graph = Arc::new(MemoryGraph::new());
    let triples = numbered(0, vec![triple("X", "Widget", "partOf", "Y", "Gadget")]);

    let outcomes = ingestor(&graph, false).ingest(&triples).await;
    assert_eq!(outcomes, [RelationOutcome::Forward]);

    let x = &graph.find("Widget", "X").await[0];
    let y = &graph.find("Gadget", "Y").await[0];
    assert_eq!(x.labels.len(), 1);
    assert_eq!(y.labels.len(), 1);
    assert_eq!(graph.relations_between(x.handle, y.handle).await, ["partOf"]);
}

#[tokio::test]
async fn test_unknown_type_is_dropped_in_ontology_mode() {
    let graph = Arc::new(MemoryGraph::new());
    let triples = numbered(0, vec![triple("Alice", "Person", "hasEmployer", "Acme", "Company")]);

    let outcomes = ingestor(&graph, true).ingest(&triples).await;
    assert_eq!(outcomes, [RelationOutcome::Incomplete]);
    assert_eq!(graph.nodes().await.len(), 1);
}

#[tokio::test]
async fn test_loose_names_match_ontology_labels() {
    let graph = Arc::new(MemoryGraph::new());
    let triples = numbered(0, vec![triple("Alice", "person", "has_employer", "Acme", "ORGANIZATION")]);

    let outcomes = ingestor(&graph, true).ingest(&triples).await;
    assert_eq!(outcomes, [RelationOutcome::Forward]);
    handle(&graph, "Person", "Alice").await;
    handle(&graph, "Organization", "Acme").await;
}

const EXTRACTION_ANSWER: &str = r#"```json
[
  {"head": "Alice", "head_type": "Person", "relation": "hasEmployer", "tail": "Acme", "tail_type": "Organization"},
  {"head": "Alice Smith", "head_type": "Person", "relation": "locatedIn", "tail": "Paris", "tail_type": "Place"}
]
```"#;

async fn builder_with(graph: Arc<MemoryGraph>, llm: Arc<ScriptedLlm>, oracle: Arc<StubOracle>) -> KgBuilder {
    KgBuilder::new(KgContext {
        graph,
        llm,
        prompts: prompt_store(),
        ontology: Some(ontology()),
        oracle,
        implied_relations: false,
    })
    .await
}

fn chunk(seq: i64, text: &str) -> ChunkNode {
    ChunkNode {
        chunk_id: format!("report-chunk{seq:06}"),
        directory: "pdfs".into(),
        form_id: "report".into(),
        chunk_seq_id: seq,
        text: text.into(),
    }
}

#[tokio::test]
async fn test_coreferent_nodes_are_merged() {
    let graph = Arc::new(MemoryGraph::new());
    let llm = Arc::new(ScriptedLlm::new([EXTRACTION_ANSWER]));
    let oracle = Arc::new(StubOracle::grouping(&[("Person", vec![vec!["0_0A", "0_1A"]])]));
    let builder = builder_with(graph.clone(), llm.clone(), oracle.clone()).await;

    graph
        .merge_file(&FileNode {
            file_id: "000000".into(),
            file_path: "pdfs/report.pdf".into(),
        })
        .await
        .unwrap();
    let report = builder
        .process_chunk(&chunk(0, "Alice works for Acme. Alice Smith lives in Paris."), "000000")
        .await;

    assert_eq!(report.triples, 2);
    assert_eq!(report.relations_written(), 2);
    assert_eq!(report.resolved.absorbed, 1);

    // only the Person group had two candidates
    let seen = oracle.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].keys().collect::<Vec<_>>(), ["Person"]);

    // the survivor carries the last member's name and keeps both relations
    assert!(graph.find("Person", "Alice").await.is_empty());
    let survivor = &graph.find("Person", "Alice Smith").await[0];
    assert_eq!(survivor.get_str(props::ALIAS), Some("Alice"));
    assert!(survivor.has_label("Agent"));
    let acme = handle(&graph, "Organization", "Acme").await;
    let paris = handle(&graph, "Place", "Paris").await;
    assert_eq!(graph.relations_between(survivor.handle, acme).await, ["hasEmployer"]);
    assert_eq!(graph.relations_between(survivor.handle, paris).await, ["locatedIn"]);

    for node in graph.nodes().await {
        for p in props::PROVISIONAL {
            assert!(node.get(p).is_none(), "{p} left on {:?}", node.labels);
        }
    }
}

#[tokio::test]
async fn test_every_entity_is_linked_to_one_file() {
    let graph = Arc::new(MemoryGraph::new());
    let llm = Arc::new(ScriptedLlm::new([EXTRACTION_ANSWER]));
    let builder = builder_with(graph.clone(), llm, Arc::new(StubOracle::default())).await;

    graph
        .merge_file(&FileNode {
            file_id: "000000".into(),
            file_path: "pdfs/report.pdf".into(),
        })
        .await
        .unwrap();
    builder.process_chunk(&chunk(0, "text"), "000000").await;
    builder.finish_file("000000").await;

    let nodes = graph.nodes().await;
    let edges = graph.edges().await;
    let file = nodes.iter().find(|n| n.has_label(FILE_LABEL)).unwrap().handle;
    let entities: Vec<_> = nodes
        .iter()
        .filter(|n| n.get_str(props::NAME).is_some())
        .collect();
    assert_eq!(entities.len(), 4);

    for entity in entities {
        let links: Vec<_> = edges
            .iter()
            .filter(|e| e.from == entity.handle && e.relation == DEFINED_IN_FILE)
            .collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].to, file);

        let id = entity.get_str(props::ID).unwrap();
        assert_eq!(id.len(), 9);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}

#[tokio::test]
async fn test_empty_llm_answer_commits_nothing() {
    let graph = Arc::new(MemoryGraph::new());
    let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
    let builder = builder_with(graph.clone(), llm.clone(), Arc::new(StubOracle::default())).await;

    let report = builder.process_chunk(&chunk(0, "text"), "000000").await;
    assert_eq!(report.triples, 0);
    assert_eq!(llm.request_count(), 1);
    // just the chunk node
    assert_eq!(graph.nodes().await.len(), 1);
}

#[tokio::test]
async fn test_implied_relations_are_written() {
    let graph = Arc::new(MemoryGraph::new());
    let llm = Arc::new(ScriptedLlm::new([EXTRACTION_ANSWER]));
    let mut oracle = StubOracle::default();
    oracle
        .implied
        .insert("worksWith".into(), vec![("0_0A".into(), "0_1A".into())]);
    let builder = KgBuilder::new(KgContext {
        graph: graph.clone(),
        llm,
        prompts: prompt_store(),
        ontology: Some(ontology()),
        oracle: Arc::new(oracle),
        implied_relations: true,
    })
    .await;

    let report = builder.process_chunk(&chunk(0, "text"), "000000").await;
    assert_eq!(report.implied, 1);

    let alice = handle(&graph, "Person", "Alice").await;
    let smith = handle(&graph, "Person", "Alice Smith").await;
    assert_eq!(graph.relations_between(alice, smith).await, ["worksWith"]);
}
