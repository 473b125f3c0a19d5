//! Transitive subclass / subproperty closures
//!
//! Built once from the direct `rdfs:subClassOf` or `rdfs:subPropertyOf`
//! edges. The walk keeps a visited set, so cyclic ontologies terminate.

use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Which hierarchy to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HierarchyKind {
    /// Classes, through `rdfs:subClassOf`
    Object,
    /// Object properties, through `rdfs:subPropertyOf`
    Property,
}

impl HierarchyKind {
    /// RDFS predicate that links a child to its direct parent
    pub fn predicate(self) -> &'static str {
        match self {
            HierarchyKind::Object => "http://www.w3.org/2000/01/rdf-schema#subClassOf",
            HierarchyKind::Property => "http://www.w3.org/2000/01/rdf-schema#subPropertyOf",
        }
    }
}

/// For every URI seen in the hierarchy, the set of all its ancestors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    parents: BTreeMap<String, BTreeSet<String>>,
    ancestors: BTreeMap<String, Vec<String>>,
}

impl Hierarchy {
    /// Build the closure from direct `(child, parent)` edges.
    ///
    /// Every URI that appears on either side gets an entry; roots map to an
    /// empty list. Ancestors are listed nearest first and never include the
    /// URI itself, even inside a cycle.
    pub fn from_edges<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut parents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (child, parent) in edges {
            let child = child.into();
            let parent = parent.into();
            parents.entry(parent.clone()).or_default();
            parents.entry(child).or_default().insert(parent);
        }

        let ancestors = parents
            .keys()
            .map(|uri| (uri.clone(), walk(uri, &parents)))
            .collect();

        Self { parents, ancestors }
    }

    /// All ancestors of `uri`; empty when unknown or a root
    pub fn ancestors(&self, uri: &str) -> &[String] {
        self.ancestors.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `uri` appears anywhere in the hierarchy
    pub fn contains(&self, uri: &str) -> bool {
        self.ancestors.contains_key(uri)
    }

    /// Whether `parent` is a direct parent of `uri`
    pub fn is_child(&self, uri: &str, parent: &str) -> bool {
        self.parents.get(uri).is_some_and(|p| p.contains(parent))
    }

    /// Whether `ancestor` is reachable from `uri` by one or more hops
    pub fn is_descendant(&self, uri: &str, ancestor: &str) -> bool {
        self.ancestors(uri).iter().any(|a| a == ancestor)
    }

    /// Iterate over `(uri, ancestors)` in URI order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.ancestors
            .iter()
            .map(|(uri, ancestors)| (uri.as_str(), ancestors.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.ancestors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ancestors.is_empty()
    }
}

fn walk(start: &str, parents: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::from([start]);
    let mut found = Vec::new();
    let mut frontier: Vec<&str> = vec![start];

    // Breadth-first so nearer ancestors come first
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for uri in frontier {
            let Some(direct) = parents.get(uri) else {
                continue;
            };
            for parent in direct {
                if visited.insert(parent.as_str()) {
                    found.push(parent.clone());
                    next.push(parent.as_str());
                }
            }
        }
        frontier = next;
    }

    found
}
