//! Ontology Store
//!
//! Loads a domain ontology from RDF/XML and answers the schema questions the
//! knowledge graph builder needs:
//!
//! - which classes and object properties exist, keyed by graph label
//! - what each of them means (`rdfs:comment`), for the extraction prompt
//! - the transitive subclass / subproperty closures
//! - whether a relation may link a given domain to a given range
//!
//! # Quick Start
//!
//! ```ignore
//! use ontorag::ontology::{HierarchyKind, OntologyStore};
//!
//! let ontology = OntologyStore::load(Path::new("ontology.rdf"))?;
//! let person = ontology.uri_of("Person").unwrap();
//! let employer = ontology.uri_of("hasEmployer").unwrap();
//! let org = ontology.uri_of("Organization").unwrap();
//! assert!(ontology.permits(person, employer, org)?);
//! ```
//!
//! A missing file is not fatal: [`load_optional`] returns `None` and the
//! pipeline runs in permissive mode.

use std::path::Path;

pub mod error;
pub mod hierarchy;
pub mod store;

pub use error::{OntologyError, OntologyResult};
pub use hierarchy::{Hierarchy, HierarchyKind};
pub use store::{ElementKind, OntologyElement, OntologyStore};

/// Load the ontology if one is configured and present.
///
/// An unset path or a missing file logs a warning and yields `Ok(None)`; a
/// file that exists but cannot be parsed is an error.
pub fn load_optional(path: Option<&Path>) -> OntologyResult<Option<OntologyStore>> {
    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        let err = OntologyError::PathNotConfigured;
        tracing::warn!("{} - {}; running without ontology", err.code(), err);
        return Ok(None);
    };

    match OntologyStore::load(path) {
        Ok(store) => Ok(Some(store)),
        Err(err) if err.is_recoverable() => {
            tracing::warn!("{} - {}; running without ontology", err.code(), err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_optional_without_path() {
        assert!(load_optional(None).unwrap().is_none());
        assert!(load_optional(Some(Path::new(""))).unwrap().is_none());
    }

    #[test]
    fn test_load_optional_missing_file() {
        let result = load_optional(Some(Path::new("/no/such/ontology.rdf"))).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_optional_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.rdf");
        std::fs::write(&path, r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><undeclared:Thing rdf:about="http://example.org/x"/></rdf:RDF>"#).unwrap();

        assert!(load_optional(Some(&path)).is_err());
    }
}
