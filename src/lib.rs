//! ontorag - Ontology-guided RAG builder
//!
//! Builds two indexes from a folder of PDFs and answers questions over them:
//! a pgvector table of embedded text chunks and a typed knowledge graph in
//! Memgraph whose nodes and relations are checked against an RDF ontology.
//!
//! # Architecture
//!
//! - [`config`] - `config.yaml` loading, validation and derived chunk sizes
//! - [`ontology`] - RDF/XML ontology store and schema questions
//! - [`prompts`] - prompt templates by id and language
//! - [`llm`] - chat and embedding endpoints
//! - [`graph`] - graph store trait, Memgraph and in-memory stores
//! - [`kg`] - triple extraction, validation, entity resolution and commit
//! - [`storage`] - Postgres pool and vector index
//! - [`ingest`] - PDF reading and dual chunking
//! - [`chat`] - question answering loops
//! - [`utils`] - text normalization helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ontorag::prelude::*;
//!
//! # async fn example(llm: Arc<dyn LanguageModel>, prompts: PromptStore, oracle: Arc<dyn CoreferenceOracle>) {
//! let context = KgContext {
//!     graph: Arc::new(MemoryGraph::new()),
//!     llm,
//!     prompts,
//!     ontology: None,
//!     oracle,
//!     implied_relations: false,
//! };
//! let builder = KgBuilder::new(context).await;
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod kg;
pub mod llm;
pub mod ontology;
pub mod prompts;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::chat::{ChatMode, ChatSession};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, StatusCode};
    pub use crate::graph::{GraphStore, MemgraphStore, MemoryGraph};
    pub use crate::ingest::{RagIngestor, Splitters};
    pub use crate::kg::{CoreferenceOracle, KgBuilder, KgContext, LlmCoreferenceOracle, Triple};
    pub use crate::llm::{ChatMessage, LanguageModel, LlmClient, LlmConfig};
    pub use crate::ontology::OntologyStore;
    pub use crate::prompts::{PromptSource, PromptStore, PromptVariables};
    pub use crate::storage::{Database, PgVectorIndex, VectorIndex};
}
