//! An in-memory [RDF dataset](https://www.w3.org/TR/rdf11-concepts/#dfn-rdf-dataset).
//!
//! Usage example:
//! ```
//! use rdfterm::*;
//!
//! let mut dataset = Dataset::new();
//!
//! // insertion
//! let ex = NamedNode::new("http://example.com")?;
//! let quad = Quad::new(ex.clone(), ex.clone(), ex.clone(), ex.clone());
//! dataset.insert(quad.clone());
//!
//! // simple filter
//! let results: Vec<_> = dataset
//!     .quads_for_pattern(Some(&ex.clone().into()), None, None, None)
//!     .collect();
//! assert_eq!(vec![quad], results);
//!
//! // the named graph is registered
//! assert!(dataset.contains_named_graph(&ex.into()));
//! # Result::<_,Box<dyn std::error::Error>>::Ok(())
//! ```

use crate::named_node::NamedNode;
use crate::term::{GraphName, NamedOrBlankNode, Quad, Term, Triple};
use std::collections::{BTreeMap, BTreeSet};

/// An in-memory [RDF dataset](https://www.w3.org/TR/rdf11-concepts/#dfn-rdf-dataset).
///
/// Named graphs are tracked explicitly: a named graph might exist while containing no triple.
/// The default graph always exists.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Dataset {
    graphs: BTreeMap<GraphName, BTreeSet<Triple>>,
}

impl Dataset {
    /// Creates a new dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a quad to the dataset, registering its graph if needed.
    ///
    /// Returns `false` if the quad was already there.
    pub fn insert(&mut self, quad: Quad) -> bool {
        let Quad {
            subject,
            predicate,
            object,
            graph_name,
        } = quad;
        self.graphs.entry(graph_name).or_default().insert(Triple {
            subject,
            predicate,
            object,
        })
    }

    /// Removes a concrete quad from the dataset.
    ///
    /// The graph stays registered even if it becomes empty.
    pub fn remove(&mut self, quad: &Quad) -> bool {
        self.graphs
            .get_mut(&quad.graph_name)
            .is_some_and(|graph| graph.remove(&triple_of(quad)))
    }

    /// Checks if the dataset contains the given quad
    pub fn contains(&self, quad: &Quad) -> bool {
        self.graphs
            .get(&quad.graph_name)
            .is_some_and(|graph| graph.contains(&triple_of(quad)))
    }

    /// Returns the number of quads in this dataset.
    pub fn len(&self) -> usize {
        self.graphs.values().map(BTreeSet::len).sum()
    }

    /// Checks if this dataset contains a quad.
    pub fn is_empty(&self) -> bool {
        self.graphs.values().all(BTreeSet::is_empty)
    }

    /// Returns all the quads contained by the dataset.
    pub fn iter(&self) -> impl Iterator<Item = Quad> + '_ {
        self.quads_for_pattern(None, None, None, None)
    }

    /// Returns all the quads matching the given pattern, `None` being a wildcard.
    pub fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&'a NamedOrBlankNode>,
        predicate: Option<&'a NamedNode>,
        object: Option<&'a Term>,
        graph_name: Option<&'a GraphName>,
    ) -> impl Iterator<Item = Quad> + 'a {
        self.graphs
            .iter()
            .filter(move |(name, _)| graph_name.is_none_or(|g| g == *name))
            .flat_map(move |(name, triples)| {
                triples
                    .iter()
                    .filter(move |t| {
                        subject.is_none_or(|s| *s == t.subject)
                            && predicate.is_none_or(|p| *p == t.predicate)
                            && object.is_none_or(|o| *o == t.object)
                    })
                    .map(move |t| t.clone().in_graph(name.clone()))
            })
    }

    /// Returns the triples of every graph, default graph included, without copying them.
    pub fn graph_triples(&self) -> impl Iterator<Item = (&GraphName, &Triple)> + '_ {
        self.graphs
            .iter()
            .flat_map(|(name, triples)| triples.iter().map(move |t| (name, t)))
    }

    /// Returns the triples of a single graph, without copying them.
    pub fn triples_in_graph<'a>(
        &'a self,
        graph_name: &GraphName,
    ) -> impl Iterator<Item = &'a Triple> + use<'a> {
        self.graphs.get(graph_name).into_iter().flatten()
    }

    /// Returns the names of all the named graphs, including the empty ones.
    pub fn named_graphs(&self) -> impl Iterator<Item = NamedOrBlankNode> + '_ {
        self.graphs.keys().filter_map(|name| match name {
            GraphName::NamedNode(node) => Some(node.clone().into()),
            GraphName::BlankNode(node) => Some(node.clone().into()),
            GraphName::DefaultGraph => None,
        })
    }

    pub fn contains_named_graph(&self, graph_name: &NamedOrBlankNode) -> bool {
        self.graphs.contains_key(&graph_name.clone().into())
    }

    /// Registers an empty named graph.
    ///
    /// Returns `false` if the graph already existed.
    pub fn insert_named_graph(&mut self, graph_name: NamedOrBlankNode) -> bool {
        let name = GraphName::from(graph_name);
        if self.graphs.contains_key(&name) {
            false
        } else {
            self.graphs.insert(name, BTreeSet::new());
            true
        }
    }

    /// Removes a named graph and all its quads.
    ///
    /// Returns `false` if the graph did not exist.
    pub fn remove_named_graph(&mut self, graph_name: &NamedOrBlankNode) -> bool {
        self.graphs.remove(&graph_name.clone().into()).is_some()
    }

    /// Removes all the quads of a graph without unregistering it.
    pub fn clear_graph(&mut self, graph_name: &GraphName) {
        if let Some(graph) = self.graphs.get_mut(graph_name) {
            graph.clear();
        }
    }

    /// Removes all quads and named graphs.
    pub fn clear(&mut self) {
        self.graphs.clear();
    }
}

fn triple_of(quad: &Quad) -> Triple {
    Triple::new(
        quad.subject.clone(),
        quad.predicate.clone(),
        quad.object.clone(),
    )
}

impl Extend<Quad> for Dataset {
    fn extend<I: IntoIterator<Item = Quad>>(&mut self, iter: I) {
        for quad in iter {
            self.insert(quad);
        }
    }
}

impl FromIterator<Quad> for Dataset {
    fn from_iter<I: IntoIterator<Item = Quad>>(iter: I) -> Self {
        let mut dataset = Self::new();
        dataset.extend(iter);
        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlankNode, Literal};

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    #[test]
    fn test_pattern_matching() {
        let dataset: Dataset = [
            Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph),
            Quad::new(ex("a"), ex("p"), Literal::from(1), ex("g")),
            Quad::new(BlankNode::default(), ex("q"), ex("b"), ex("g")),
        ]
        .into_iter()
        .collect();
        assert_eq!(dataset.len(), 3);
        assert_eq!(
            dataset
                .quads_for_pattern(Some(&ex("a").into()), None, None, None)
                .count(),
            2
        );
        assert_eq!(
            dataset
                .quads_for_pattern(None, None, Some(&ex("b").into()), None)
                .count(),
            2
        );
        assert_eq!(
            dataset
                .quads_for_pattern(None, None, None, Some(&GraphName::DefaultGraph))
                .count(),
            1
        );
        assert_eq!(
            dataset
                .quads_for_pattern(None, Some(&ex("q")), None, Some(&ex("g").into()))
                .count(),
            1
        );
    }

    #[test]
    fn test_named_graphs() {
        let mut dataset = Dataset::new();
        assert!(dataset.insert_named_graph(ex("g").into()));
        assert!(!dataset.insert_named_graph(ex("g").into()));
        assert!(dataset.is_empty());
        assert_eq!(dataset.named_graphs().collect::<Vec<_>>(), vec![ex("g").into()]);

        let quad = Quad::new(ex("a"), ex("p"), ex("b"), ex("g"));
        assert!(dataset.insert(quad.clone()));
        assert!(dataset.contains(&quad));
        dataset.clear_graph(&ex("g").into());
        assert!(!dataset.contains(&quad));
        assert!(dataset.contains_named_graph(&ex("g").into()));
        assert!(dataset.remove_named_graph(&ex("g").into()));
        assert_eq!(dataset.named_graphs().count(), 0);
    }

    #[test]
    fn test_remove_keeps_graph() {
        let mut dataset = Dataset::new();
        let quad = Quad::new(ex("a"), ex("p"), ex("b"), ex("g"));
        dataset.insert(quad.clone());
        assert!(dataset.remove(&quad));
        assert!(!dataset.remove(&quad));
        assert!(dataset.contains_named_graph(&ex("g").into()));
    }

    #[test]
    fn test_borrowed_graph_access() {
        let dataset: Dataset = [
            Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph),
            Quad::new(ex("a"), ex("p"), ex("c"), ex("g")),
        ]
        .into_iter()
        .collect();
        assert_eq!(dataset.graph_triples().count(), 2);
        let in_g: Vec<_> = dataset.triples_in_graph(&ex("g").into()).collect();
        assert_eq!(in_g, vec![&Triple::new(ex("a"), ex("p"), ex("c"))]);
        assert_eq!(dataset.triples_in_graph(&ex("h").into()).count(), 0);
    }
}
