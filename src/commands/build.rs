use anyhow::{Context, Result};
use std::sync::Arc;

use ontorag::ingest::{RagIngestor, Splitters};
use ontorag::kg::{KgBuilder, KgContext, LlmCoreferenceOracle};
use ontorag::storage::PgVectorIndex;

use super::AppContext;

/// Rebuild both indexes from the configured PDF folder
pub async fn build_rag(app: &AppContext, use_ontology: bool) -> Result<()> {
    let config = &app.config;
    let ontology = app.ontology(use_ontology)?;

    let splitters = Splitters::new(&config.chunks).map_err(|e| {
        tracing::error!("{}", e.report_line());
        anyhow::anyhow!(e)
    })?;
    tracing::info!(chunks = ?config.chunks, "Splitter sizes");

    let oracle = LlmCoreferenceOracle::new(app.llm.clone(), app.prompts.clone(), ontology.as_deref());
    let builder = KgBuilder::new(KgContext {
        graph: app.graph.clone(),
        llm: app.llm.clone(),
        prompts: app.prompts.clone(),
        ontology,
        oracle: Arc::new(oracle),
        implied_relations: config.kg_implied_relations,
    })
    .await;

    let vectors = Arc::new(PgVectorIndex::new(app.db.clone()));
    let ingestor = RagIngestor::new(builder, app.llm.clone(), vectors, splitters);

    let dimension = usize::try_from(config.llm_embedding_vector_len).context("Invalid embedding length")?;
    ingestor.reset(dimension).await.map_err(|e| {
        tracing::error!("{}", e.report_line());
        anyhow::anyhow!(e)
    })?;

    let stats = ingestor.ingest_folder(&config.pdf_folder_path).await.map_err(|e| {
        tracing::error!("{}", e.report_line());
        anyhow::anyhow!(e)
    })?;

    println!(
        "Processed {} file(s): {} vector chunk(s), {} graph chunk(s), {} relation(s)",
        stats.files, stats.vector_chunks, stats.graph_chunks, stats.relations
    );
    if stats.files_failed > 0 {
        println!("{} file(s) could not be read; see the log", stats.files_failed);
    }
    Ok(())
}
