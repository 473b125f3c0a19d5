//! Per-chunk knowledge graph construction
//!
//! [`KgBuilder`] carries everything the pipeline needs for one run and
//! drives a chunk through extraction, ingestion, resolution and commit.

use std::sync::Arc;

use super::extractor::{extract, ExtractionPrompts};
use super::finalizer::{finalize, FinalizeReport};
use super::linker::{CoreferenceOracle, EntityResolver, ResolveReport};
use super::validator::{RelationOutcome, TripleIngestor};
use crate::graph::{ChunkNode, GraphStore};
use crate::llm::LanguageModel;
use crate::ontology::OntologyStore;
use crate::prompts::PromptStore;

/// Collaborators of a knowledge graph build
#[derive(Clone)]
pub struct KgContext {
    pub graph: Arc<dyn GraphStore>,
    pub llm: Arc<dyn LanguageModel>,
    pub prompts: PromptStore,
    pub ontology: Option<Arc<OntologyStore>>,
    pub oracle: Arc<dyn CoreferenceOracle>,
    pub implied_relations: bool,
}

/// Outcome of one chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub triples: usize,
    pub outcomes: Vec<RelationOutcome>,
    pub resolved: ResolveReport,
    pub implied: usize,
    pub finalized: Option<FinalizeReport>,
}

impl ChunkReport {
    /// Relations written, forward or reversed
    pub fn relations_written(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, RelationOutcome::Forward | RelationOutcome::Reversed))
            .count()
    }
}

pub struct KgBuilder {
    graph: Arc<dyn GraphStore>,
    llm: Arc<dyn LanguageModel>,
    extraction: ExtractionPrompts,
    ingestor: TripleIngestor,
    resolver: EntityResolver,
    implied_relations: bool,
}

impl KgBuilder {
    /// Render the extraction prompts once for the whole run
    pub async fn new(context: KgContext) -> Self {
        let extraction = ExtractionPrompts::render(&context.prompts, context.ontology.as_deref()).await;
        let ingestor = TripleIngestor::new(context.graph.clone(), context.ontology.clone());
        let resolver = EntityResolver::new(context.graph.clone(), context.ontology.clone(), context.oracle.clone());

        Self {
            graph: context.graph,
            llm: context.llm,
            extraction,
            ingestor,
            resolver,
            implied_relations: context.implied_relations,
        }
    }

    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    /// Run one graph chunk through the pipeline and commit it to `file_id`
    pub async fn process_chunk(&self, chunk: &ChunkNode, file_id: &str) -> ChunkReport {
        if let Err(e) = self.graph.merge_chunk(chunk).await {
            tracing::error!(chunk = %chunk.chunk_id, "{} - Could not create chunk node: {e}", e.code());
        }

        let seq = usize::try_from(chunk.chunk_seq_id).unwrap_or_default();
        let triples = extract(self.llm.as_ref(), &self.extraction, &chunk.text, seq).await;
        let outcomes = self.ingestor.ingest(&triples).await;
        let resolved = self.resolver.resolve().await;
        let implied = if self.implied_relations {
            self.resolver.add_implied_relations().await
        } else {
            0
        };
        let finalized = self.commit(file_id).await;

        let report = ChunkReport {
            triples: triples.len(),
            outcomes,
            resolved,
            implied,
            finalized,
        };
        tracing::info!(
            chunk = %chunk.chunk_id,
            triples = report.triples,
            relations = report.relations_written(),
            merged = report.resolved.absorbed,
            "Chunk processed"
        );
        report
    }

    /// Commit whatever is still active once the file is done
    pub async fn finish_file(&self, file_id: &str) -> Option<FinalizeReport> {
        self.commit(file_id).await
    }

    async fn commit(&self, file_id: &str) -> Option<FinalizeReport> {
        match finalize(self.graph.as_ref(), file_id).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(file_id, "{} - Finalization failed: {e}", e.code());
                None
            }
        }
    }
}

impl std::fmt::Debug for KgBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KgBuilder")
            .field("extraction", &self.extraction)
            .field("ingestor", &self.ingestor)
            .field("implied_relations", &self.implied_relations)
            .finish_non_exhaustive()
    }
}
