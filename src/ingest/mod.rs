//! RAG construction from a folder of PDFs
//!
//! Each PDF is read once and split twice: vector chunks are embedded into
//! the [`VectorIndex`], graph chunks go through the [`KgBuilder`]. Files are
//! visited in path order and numbered from zero.
//!
//! ```text
//! PDF ──► text ─┬─► vector chunks ──► embed ──► VectorIndex
//!               └─► graph chunks  ──► KgBuilder ──► GraphStore
//! ```

pub mod pdf;

use std::path::Path;
use std::sync::Arc;
use text_splitter::{Characters, ChunkConfig, TextSplitter};

use crate::config::ChunkSizes;
use crate::error::{Error, Result, StatusCode};
use crate::graph::{ChunkNode, FileNode};
use crate::kg::KgBuilder;
use crate::llm::LanguageModel;
use crate::storage::{VectorIndex, VectorRecord};
use crate::utils::{file_stem, parent_folder_name};

pub use pdf::{list_pdfs, read_pdf};

/// `fileId` of the `file_seq`-th file
pub fn file_id(file_seq: usize) -> String {
    format!("{file_seq:06x}")
}

/// Primary key of a vector chunk
pub fn vector_chunk_id(file_seq: usize, stem: &str, chunk_seq: usize) -> String {
    format!("file-{file_seq:06x}_form-{stem}_chunk-{chunk_seq:09}")
}

/// `chunkId` of a graph chunk
pub fn graph_chunk_id(stem: &str, chunk_seq: usize) -> String {
    format!("{stem}-chunk{chunk_seq:06}")
}

/// The two character splitters of a run
pub struct Splitters {
    vector: TextSplitter<Characters>,
    graph: TextSplitter<Characters>,
}

impl Splitters {
    pub fn new(sizes: &ChunkSizes) -> Result<Self> {
        let build = |size: usize, overlap: usize, code: StatusCode| {
            ChunkConfig::new(size)
                .with_overlap(overlap)
                .map(TextSplitter::new)
                .map_err(|e| Error::other(code, format!("Error while creating the text splitter: {e}")))
        };

        Ok(Self {
            vector: build(sizes.chunk_size, sizes.chunk_overlap, StatusCode::SPLITTER_INIT)?,
            graph: build(
                sizes.chunk_size_graph,
                sizes.chunk_overlap_graph,
                StatusCode::GRAPH_SPLITTER_INIT,
            )?,
        })
    }

    pub fn vector_chunks<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.vector.chunks(text).collect()
    }

    pub fn graph_chunks<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.graph.chunks(text).collect()
    }
}

impl std::fmt::Debug for Splitters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Splitters").finish_non_exhaustive()
    }
}

/// Counters of an ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files: usize,
    pub files_failed: usize,
    pub vector_chunks: usize,
    pub vector_failures: usize,
    pub graph_chunks: usize,
    pub triples: usize,
    pub relations: usize,
}

impl IngestStats {
    fn absorb(&mut self, other: IngestStats) {
        self.files += other.files;
        self.files_failed += other.files_failed;
        self.vector_chunks += other.vector_chunks;
        self.vector_failures += other.vector_failures;
        self.graph_chunks += other.graph_chunks;
        self.triples += other.triples;
        self.relations += other.relations;
    }
}

/// Builds both indexes from PDFs
pub struct RagIngestor {
    builder: KgBuilder,
    llm: Arc<dyn LanguageModel>,
    vectors: Arc<dyn VectorIndex>,
    splitters: Splitters,
}

impl RagIngestor {
    pub fn new(
        builder: KgBuilder,
        llm: Arc<dyn LanguageModel>,
        vectors: Arc<dyn VectorIndex>,
        splitters: Splitters,
    ) -> Self {
        Self {
            builder,
            llm,
            vectors,
            splitters,
        }
    }

    /// Empty the graph and recreate the vector table
    pub async fn reset(&self, dimension: usize) -> Result<()> {
        self.builder.graph().truncate().await?;
        tracing::info!("Knowledge graph emptied");
        self.vectors.reset(dimension).await
    }

    /// Ingest every PDF of `folder`; an unreadable file is skipped
    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestStats> {
        let pdfs = list_pdfs(folder).await?;
        tracing::info!(folder = %folder.display(), files = pdfs.len(), "Starting ingestion");

        let mut stats = IngestStats::default();
        for (file_seq, path) in pdfs.iter().enumerate() {
            match read_pdf(path).await {
                Ok(text) => stats.absorb(self.ingest_text(path, file_seq, &text).await),
                Err(e) => {
                    tracing::error!(file = %path.display(), "{}", e.report_line());
                    stats.files_failed += 1;
                }
            }
        }

        tracing::info!(?stats, "Ingestion finished");
        Ok(stats)
    }

    /// Ingest the text of one file
    pub async fn ingest_text(&self, path: &Path, file_seq: usize, text: &str) -> IngestStats {
        let stem = file_stem(path);
        let mut stats = IngestStats {
            files: 1,
            ..IngestStats::default()
        };
        tracing::info!(file = %path.display(), file_seq, "Processing file");

        for (seq, chunk) in self.splitters.vector_chunks(text).into_iter().enumerate() {
            if self.embed_chunk(&vector_chunk_id(file_seq, &stem, seq), path, chunk).await {
                stats.vector_chunks += 1;
            } else {
                stats.vector_failures += 1;
            }
        }

        let file = FileNode {
            file_id: file_id(file_seq),
            file_path: path.display().to_string(),
        };
        if let Err(e) = self.builder.graph().merge_file(&file).await {
            tracing::error!(file = %file.file_path, "{} - Could not create file node: {e}", e.code());
        }

        let directory = parent_folder_name(path);
        for (seq, chunk) in self.splitters.graph_chunks(text).into_iter().enumerate() {
            let node = ChunkNode {
                chunk_id: graph_chunk_id(&stem, seq),
                directory: directory.clone(),
                form_id: stem.clone(),
                chunk_seq_id: i64::try_from(seq).unwrap_or(i64::MAX),
                text: chunk.to_string(),
            };
            let report = self.builder.process_chunk(&node, &file.file_id).await;
            stats.graph_chunks += 1;
            stats.triples += report.triples;
            stats.relations += report.relations_written();
        }

        self.builder.finish_file(&file.file_id).await;
        stats
    }

    async fn embed_chunk(&self, chunk_id: &str, path: &Path, chunk: &str) -> bool {
        let Some(embedding) = self.llm.embed(chunk).await else {
            tracing::warn!(chunk = chunk_id, "No embedding for chunk; skipped");
            return false;
        };

        let record = VectorRecord {
            chunk_id: chunk_id.to_string(),
            filename: path.display().to_string(),
            chunk: chunk.to_string(),
            embedding,
        };
        match self.vectors.insert(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(chunk = chunk_id, "{}", e.report_line());
                false
            }
        }
    }
}

impl std::fmt::Debug for RagIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagIngestor")
            .field("builder", &self.builder)
            .field("splitters", &self.splitters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert_eq!(file_id(26), "00001a");
        assert_eq!(vector_chunk_id(10, "report", 7), "file-00000a_form-report_chunk-000000007");
        assert_eq!(graph_chunk_id("report", 12), "report-chunk000012");
    }

    #[test]
    fn test_splitters_respect_sizes() {
        let sizes = ChunkSizes {
            chunk_size: 50,
            chunk_overlap: 10,
            chunk_size_graph: 200,
            chunk_overlap_graph: 20,
        };
        let splitters = Splitters::new(&sizes).unwrap();
        let text = "Alice works for Acme. ".repeat(20);

        let vector = splitters.vector_chunks(&text);
        let graph = splitters.graph_chunks(&text);
        assert!(vector.len() > graph.len());
        assert!(vector.iter().all(|c| c.chars().count() <= 50));
        assert!(graph.iter().all(|c| c.chars().count() <= 200));
    }

    #[test]
    fn test_overlap_larger_than_size() {
        let sizes = ChunkSizes {
            chunk_size: 50,
            chunk_overlap: 60,
            chunk_size_graph: 200,
            chunk_overlap_graph: 20,
        };
        let err = Splitters::new(&sizes).unwrap_err();
        assert_eq!(err.code(), StatusCode::SPLITTER_INIT);
    }
}
