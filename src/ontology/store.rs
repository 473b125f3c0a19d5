//! RDF/XML ontology loaded into an in-memory SPARQL store

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{NamedNode, Term};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use super::error::{OntologyError, OntologyResult};
use super::hierarchy::{Hierarchy, HierarchyKind};
use crate::utils::{local_name, sanitize_label};

const PREFIXES: &str = "\
PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX owl: <http://www.w3.org/2002/07/owl#>
";

const CLASS_INTRO: &str =
    "Use the following definitions to help you determine what types of head, and tail you need to select\n";
const PROPERTY_INTRO: &str =
    "Use the following definitions to help you determine what types of relation you need to select\n";

/// Whether an ontology element is a node type or an edge type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Class,
    ObjectProperty,
}

impl ElementKind {
    fn owl_type(self) -> &'static str {
        match self {
            ElementKind::Class => "owl:Class",
            ElementKind::ObjectProperty => "owl:ObjectProperty",
        }
    }
}

/// A class or object property read from the ontology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OntologyElement {
    pub uri: String,
    /// Local name made safe for use as a graph label
    pub label: String,
    pub kind: ElementKind,
    pub comment: Option<String>,
}

/// Indexed view over an ontology file
pub struct OntologyStore {
    store: Store,
    classes: Vec<OntologyElement>,
    properties: Vec<OntologyElement>,
    local_to_uri: BTreeMap<String, String>,
    class_hierarchy: Hierarchy,
    property_hierarchy: Hierarchy,
}

impl OntologyStore {
    /// Load an RDF/XML ontology from disk
    pub fn load(path: &Path) -> OntologyResult<Self> {
        if !path.is_file() {
            return Err(OntologyError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path)
            .map_err(|e| OntologyError::io_error("open ontology", Some(path.to_path_buf()), e))?;

        let store = Self::parse(BufReader::new(file)).map_err(|e| match e {
            OntologyError::ParseFailed { reason, .. } => {
                OntologyError::parse_failed(Some(path.to_path_buf()), reason)
            }
            other => other,
        })?;

        tracing::info!(
            path = %path.display(),
            classes = store.classes.len(),
            properties = store.properties.len(),
            "Ontology loaded"
        );
        Ok(store)
    }

    /// Load an RDF/XML ontology from any reader
    pub fn from_reader(reader: impl Read) -> OntologyResult<Self> {
        Self::parse(reader)
    }

    fn parse(reader: impl Read) -> OntologyResult<Self> {
        let store = Store::new().map_err(|e| OntologyError::StoreInit {
            reason: e.to_string(),
        })?;
        store
            .load_from_reader(RdfParser::from_format(RdfFormat::RdfXml), reader)
            .map_err(|e| OntologyError::parse_failed(None, e.to_string()))?;

        let mut ontology = Self {
            store,
            classes: Vec::new(),
            properties: Vec::new(),
            local_to_uri: BTreeMap::new(),
            class_hierarchy: Hierarchy::default(),
            property_hierarchy: Hierarchy::default(),
        };
        ontology.classes = ontology.read_elements(ElementKind::Class)?;
        ontology.properties = ontology.read_elements(ElementKind::ObjectProperty)?;
        ontology.local_to_uri = index_local_names(ontology.classes.iter().chain(&ontology.properties));
        ontology.class_hierarchy = ontology.read_hierarchy(HierarchyKind::Object)?;
        ontology.property_hierarchy = ontology.read_hierarchy(HierarchyKind::Property)?;
        Ok(ontology)
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    /// Class labels, ordered by URI
    pub fn classes(&self) -> Vec<String> {
        self.classes.iter().map(|e| e.label.clone()).collect()
    }

    /// Object property labels, ordered by URI
    pub fn properties(&self) -> Vec<String> {
        self.properties.iter().map(|e| e.label.clone()).collect()
    }

    /// Every class and object property with its comment
    pub fn elements(&self) -> impl Iterator<Item = &OntologyElement> {
        self.classes.iter().chain(&self.properties)
    }

    /// Label → comment for every class and object property
    pub fn definitions(&self) -> BTreeMap<String, String> {
        self.elements()
            .map(|e| (e.label.clone(), e.comment.clone().unwrap_or_default()))
            .collect()
    }

    /// Label → URI for every class and object property
    pub fn local_to_uri(&self) -> &BTreeMap<String, String> {
        &self.local_to_uri
    }

    /// URI behind a graph label
    pub fn uri_of(&self, label: &str) -> Option<&str> {
        self.local_to_uri.get(label).map(String::as_str)
    }

    pub fn class_hierarchy(&self, kind: HierarchyKind) -> &Hierarchy {
        match kind {
            HierarchyKind::Object => &self.class_hierarchy,
            HierarchyKind::Property => &self.property_hierarchy,
        }
    }

    /// Labels of every ancestor of the class behind `label`
    pub fn superclass_labels(&self, label: &str) -> Vec<String> {
        self.ancestor_labels(label, HierarchyKind::Object)
    }

    /// Labels of every ancestor of the property behind `label`
    pub fn superproperty_labels(&self, label: &str) -> Vec<String> {
        self.ancestor_labels(label, HierarchyKind::Property)
    }

    fn ancestor_labels(&self, label: &str, kind: HierarchyKind) -> Vec<String> {
        let Some(uri) = self.uri_of(label) else {
            tracing::error!(label, "Unreferenced URI error caused by label");
            return Vec::new();
        };
        let ancestors = self.class_hierarchy(kind).ancestors(uri);
        if ancestors.is_empty() {
            tracing::debug!(uri, "URI does not have ancestors");
        }
        ancestors
            .iter()
            .map(|a| sanitize_label(local_name(a)))
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Definitions block appended to the extraction system prompt
    pub fn additional_instructions(&self) -> String {
        let mut out = String::new();
        for (intro, elements) in [(CLASS_INTRO, &self.classes), (PROPERTY_INTRO, &self.properties)] {
            if elements.is_empty() {
                continue;
            }
            out.push_str(intro);
            for e in elements {
                out.push_str(&format!("{{{}, {}}}\n", e.label, e.comment.as_deref().unwrap_or("")));
            }
        }
        out
    }

    // =========================================================================
    // Schema questions
    // =========================================================================

    /// Whether `relation` may link an instance of `domain` to one of `range`.
    ///
    /// Declared `rdfs:domain`/`rdfs:range`, inherited through
    /// `rdfs:subPropertyOf*`, are tried first. Otherwise every
    /// `domainIncludes`/`rangeIncludes` or declared candidate is compared with
    /// the requested class, accepting equality or a subclass link in either
    /// direction. Both sides need a match.
    pub fn permits(&self, domain: &str, relation: &str, range: &str) -> OntologyResult<bool> {
        let domain_node = named_node(domain)?;
        let relation_node = named_node(relation)?;
        let range_node = named_node(range)?;

        let ask = format!(
            "{PREFIXES}ASK WHERE {{
  {relation_node} rdfs:subPropertyOf* ?p .
  ?p rdfs:domain ?dom .
  ?p rdfs:range ?ran .
  ?dom rdfs:subClassOf* {domain_node} .
  ?ran rdfs:subClassOf* {range_node} .
}}"
        );
        if self.ask(&ask)? {
            return Ok(true);
        }

        let ranges = self.end_candidates(&relation_node, "range")?;
        if !self.any_related(range, &ranges) {
            return Ok(false);
        }
        let domains = self.end_candidates(&relation_node, "domain")?;
        Ok(self.any_related(domain, &domains))
    }

    /// `rdfs:comment` of a URI, if any
    pub fn comment_of(&self, uri: &str) -> OntologyResult<Option<String>> {
        if let Some(e) = self.elements().find(|e| e.uri == uri) {
            return Ok(e.comment.clone());
        }
        let node = named_node(uri)?;
        let query = format!("{PREFIXES}SELECT ?comment WHERE {{ {node} rdfs:comment ?comment }} LIMIT 1");
        Ok(self.select(&query, &["comment"])?.into_iter().next().and_then(|mut row| row.pop()))
    }

    fn any_related(&self, class: &str, candidates: &[String]) -> bool {
        candidates.iter().any(|candidate| {
            candidate == class
                || self.class_hierarchy.is_child(class, candidate)
                || self.class_hierarchy.is_child(candidate, class)
        })
    }

    fn end_candidates(&self, relation: &NamedNode, end: &str) -> OntologyResult<Vec<String>> {
        let query = format!(
            "{PREFIXES}SELECT DISTINCT ?var WHERE {{
  {relation} rdfs:subPropertyOf* ?p .
  {{ ?p ?includes ?var . FILTER(STRENDS(STR(?includes), \"{end}Includes\")) }}
  UNION
  {{ ?p rdfs:{end} ?var }}
  FILTER(isIRI(?var))
}}"
        );
        Ok(self
            .select(&query, &["var"])?
            .into_iter()
            .filter_map(|mut row| row.pop())
            .collect())
    }

    // =========================================================================
    // Loading helpers
    // =========================================================================

    fn read_elements(&self, kind: ElementKind) -> OntologyResult<Vec<OntologyElement>> {
        let query = format!(
            "{PREFIXES}SELECT ?subject ?comment WHERE {{
  ?subject rdf:type {} .
  FILTER(isIRI(?subject))
  OPTIONAL {{ ?subject rdfs:comment ?comment }}
}} ORDER BY ?subject",
            kind.owl_type()
        );

        let mut elements: Vec<OntologyElement> = Vec::new();
        for row in self.select_optional(&query, &["subject", "comment"])? {
            let [Some(uri), comment] = <[Option<String>; 2]>::try_from(row).unwrap_or([None, None]) else {
                continue;
            };
            if elements.last().is_some_and(|prev| prev.uri == uri) {
                continue;
            }
            let label = sanitize_label(local_name(&uri));
            if label.is_empty() {
                tracing::warn!(uri = %uri, "Ontology element has no usable local name, skipping");
                continue;
            }
            elements.push(OntologyElement {
                uri,
                label,
                kind,
                comment,
            });
        }
        Ok(elements)
    }

    fn read_hierarchy(&self, kind: HierarchyKind) -> OntologyResult<Hierarchy> {
        let query = format!(
            "SELECT ?child ?parent WHERE {{ ?child <{}> ?parent . FILTER(isIRI(?child) && isIRI(?parent)) }}",
            kind.predicate()
        );
        let edges = self
            .select(&query, &["child", "parent"])?
            .into_iter()
            .filter_map(|row| match <[String; 2]>::try_from(row) {
                Ok([child, parent]) => Some((child, parent)),
                Err(_) => None,
            });
        Ok(Hierarchy::from_edges(edges))
    }

    // =========================================================================
    // SPARQL plumbing
    // =========================================================================

    fn ask(&self, query: &str) -> OntologyResult<bool> {
        let results = self
            .store
            .query(query)
            .map_err(|e| OntologyError::query_failed(query, e.to_string()))?;
        match results {
            QueryResults::Boolean(b) => Ok(b),
            _ => Err(OntologyError::unexpected_result(query, "a boolean")),
        }
    }

    /// Rows where every requested variable is bound
    fn select(&self, query: &str, vars: &[&str]) -> OntologyResult<Vec<Vec<String>>> {
        Ok(self
            .select_optional(query, vars)?
            .into_iter()
            .filter_map(|row| row.into_iter().collect::<Option<Vec<String>>>())
            .collect())
    }

    fn select_optional(&self, query: &str, vars: &[&str]) -> OntologyResult<Vec<Vec<Option<String>>>> {
        let results = self
            .store
            .query(query)
            .map_err(|e| OntologyError::query_failed(query, e.to_string()))?;
        let QueryResults::Solutions(solutions) = results else {
            return Err(OntologyError::unexpected_result(query, "solutions"));
        };

        let mut rows = Vec::new();
        for solution in solutions {
            let solution = solution.map_err(|e| OntologyError::query_failed(query, e.to_string()))?;
            rows.push(vars.iter().map(|v| solution.get(*v).and_then(term_text)).collect());
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for OntologyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OntologyStore")
            .field("classes", &self.classes.len())
            .field("properties", &self.properties.len())
            .finish()
    }
}

fn named_node(uri: &str) -> OntologyResult<NamedNode> {
    NamedNode::new(uri).map_err(|e| OntologyError::InvalidIri {
        value: uri.to_string(),
        reason: e.to_string(),
    })
}

fn term_text(term: &Term) -> Option<String> {
    match term {
        Term::NamedNode(node) => Some(node.as_str().to_string()),
        Term::Literal(literal) => Some(literal.value().to_string()),
        _ => None,
    }
}

fn index_local_names<'a>(elements: impl Iterator<Item = &'a OntologyElement>) -> BTreeMap<String, String> {
    let mut index = BTreeMap::new();
    for e in elements {
        if let Some(previous) = index.insert(e.label.clone(), e.uri.clone()) {
            if previous != e.uri {
                tracing::warn!(
                    label = %e.label,
                    previous = %previous,
                    uri = %e.uri,
                    "Local name now represents a different URI; the previous one becomes unreferenced"
                );
            }
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const ONTOLOGY: &str = r#"<?xml version="1.0"?>
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
  <owl:Class rdf:about="http://example.org/onto#Organization"/>
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

    const NS: &str = "http://example.org/onto#";

    fn uri(local: &str) -> String {
        format!("{NS}{local}")
    }

    fn store() -> OntologyStore {
        OntologyStore::from_reader(ONTOLOGY.as_bytes()).unwrap()
    }

    #[test]
    fn test_classes_and_properties() {
        let s = store();
        assert_eq!(s.classes(), ["Agent", "Organization", "Person", "Place"]);
        assert_eq!(s.properties(), ["hasEmployer", "locatedIn", "managesCompany"]);
        assert_eq!(s.local_to_uri().len(), 7);
    }

    #[test]
    fn test_local_name_round_trip() {
        let s = store();
        for (label, u) in s.local_to_uri() {
            assert_eq!(local_name(u), label);
        }
    }

    #[test]
    fn test_definitions() {
        let s = store();
        let defs = s.definitions();
        assert_eq!(defs["Person"], "A human being");
        assert_eq!(defs["Organization"], "");
        assert_eq!(s.comment_of(&uri("hasEmployer")).unwrap().as_deref(), Some("Who pays the person"));
        assert_eq!(s.comment_of(&uri("Place")).unwrap(), None);
    }

    #[test]
    fn test_hierarchies() {
        let s = store();
        assert_eq!(s.superclass_labels("Person"), ["Agent"]);
        assert!(s.superclass_labels("Organization").is_empty());
        assert_eq!(s.superproperty_labels("managesCompany"), ["hasEmployer"]);
        assert!(s.class_hierarchy(HierarchyKind::Object).is_descendant(&uri("Person"), &uri("Agent")));
    }

    #[test]
    fn test_permits_declared() {
        let s = store();
        assert!(s.permits(&uri("Person"), &uri("hasEmployer"), &uri("Organization")).unwrap());
        assert!(!s.permits(&uri("Organization"), &uri("hasEmployer"), &uri("Person")).unwrap());
        assert!(!s.permits(&uri("Person"), &uri("hasEmployer"), &uri("Person")).unwrap());
    }

    #[test]
    fn test_permits_inherited_by_subproperty() {
        let s = store();
        assert!(s.permits(&uri("Person"), &uri("managesCompany"), &uri("Organization")).unwrap());
        assert!(!s.permits(&uri("Organization"), &uri("managesCompany"), &uri("Person")).unwrap());
    }

    #[test]
    fn test_permits_includes_with_subclass_either_direction() {
        let s = store();
        assert!(s.permits(&uri("Agent"), &uri("locatedIn"), &uri("Place")).unwrap());
        assert!(s.permits(&uri("Person"), &uri("locatedIn"), &uri("Place")).unwrap());
        assert!(!s.permits(&uri("Organization"), &uri("locatedIn"), &uri("Place")).unwrap());
        assert!(!s.permits(&uri("Person"), &uri("locatedIn"), &uri("Organization")).unwrap());
    }

    #[test]
    fn test_permits_includes_is_one_hop() {
        let rdf = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
         xmlns:owl="http://www.w3.org/2002/07/owl#"
         xmlns:schema="http://schema.org/">
  <owl:Class rdf:about="http://example.org/onto#Thing"/>
  <owl:Class rdf:about="http://example.org/onto#Agent">
    <rdfs:subClassOf rdf:resource="http://example.org/onto#Thing"/>
  </owl:Class>
  <owl:Class rdf:about="http://example.org/onto#Person">
    <rdfs:subClassOf rdf:resource="http://example.org/onto#Agent"/>
  </owl:Class>
  <owl:Class rdf:about="http://example.org/onto#Place"/>
  <owl:ObjectProperty rdf:about="http://example.org/onto#locatedIn">
    <schema:domainIncludes rdf:resource="http://example.org/onto#Thing"/>
    <schema:rangeIncludes rdf:resource="http://example.org/onto#Place"/>
  </owl:ObjectProperty>
</rdf:RDF>"#;
        let s = OntologyStore::from_reader(rdf.as_bytes()).unwrap();

        assert!(s.permits(&uri("Thing"), &uri("locatedIn"), &uri("Place")).unwrap());
        assert!(s.permits(&uri("Agent"), &uri("locatedIn"), &uri("Place")).unwrap());
        // Person is two hops below Thing
        assert!(!s.permits(&uri("Person"), &uri("locatedIn"), &uri("Place")).unwrap());
    }

    #[test]
    fn test_permits_rejects_invalid_iri() {
        let s = store();
        let result = s.permits("not an iri", &uri("hasEmployer"), &uri("Organization"));
        assert!(matches!(result, Err(OntologyError::InvalidIri { .. })));
    }

    #[test]
    fn test_additional_instructions() {
        let text = store().additional_instructions();
        assert!(text.starts_with(CLASS_INTRO));
        assert!(text.contains("{Person, A human being}\n"));
        assert!(text.contains("{Organization, }\n"));
        assert!(text.contains(PROPERTY_INTRO));
        assert!(text.find("{Agent,").unwrap() < text.find(PROPERTY_INTRO).unwrap());
    }

    #[test]
    fn test_load_missing_file() {
        let err = OntologyStore::load(Path::new("/definitely/not/here.rdf")).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_load_unparsable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.rdf");
        std::fs::write(&path, r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><undeclared:Thing rdf:about="http://example.org/x"/></rdf:RDF>"#).unwrap();

        let err = OntologyStore::load(&path).unwrap_err();
        assert!(matches!(err, OntologyError::ParseFailed { path: Some(_), .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    #[traced_test]
    fn test_unknown_label_logs_error() {
        let s = store();
        assert!(s.superclass_labels("Spaceship").is_empty());
        assert!(logs_contain("Unreferenced URI error caused by label"));
    }

    #[test]
    fn test_cyclic_ontology_loads() {
        let cyclic = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
         xmlns:owl="http://www.w3.org/2002/07/owl#">
  <owl:Class rdf:about="http://example.org/onto#A">
    <rdfs:subClassOf rdf:resource="http://example.org/onto#B"/>
  </owl:Class>
  <owl:Class rdf:about="http://example.org/onto#B">
    <rdfs:subClassOf rdf:resource="http://example.org/onto#A"/>
  </owl:Class>
</rdf:RDF>"#;
        let s = OntologyStore::from_reader(cyclic.as_bytes()).unwrap();
        assert_eq!(s.superclass_labels("A"), ["B"]);
        assert_eq!(s.superclass_labels("B"), ["A"]);
    }
}
