//! Ontology-guided knowledge graph construction
//!
//! A graph chunk flows through four stages:
//!
//! - [`extractor`]: prompts the LLM and parses its triples
//! - [`validator`]: checks types and relations against the ontology and
//!   writes nodes and edges
//! - [`linker`]: merges co-referent nodes of the chunk
//! - [`finalizer`]: links the nodes to their file, numbers them and clears
//!   the provisional markers
//!
//! [`KgBuilder`] runs the stages in order for each chunk.

pub mod builder;
pub mod extractor;
pub mod finalizer;
pub mod linker;
pub mod validator;

pub use builder::{ChunkReport, KgBuilder, KgContext};
pub use extractor::{parse_triples, ExtractionPrompts, Triple};
pub use finalizer::{finalize, FinalizeReport};
pub use linker::{
    create_new_relations, ActiveGroups, CoreferenceOracle, EntityResolver, ImpliedRelations,
    LlmCoreferenceOracle, Partition, ResolveReport,
};
pub use validator::{approve, RelationOutcome, TripleIngestor, ValidatedTriple};
