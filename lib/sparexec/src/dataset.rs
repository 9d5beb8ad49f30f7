use crate::error::QueryEvaluationError;
use rdfterm::{Dataset, GraphName, NamedNode, NamedOrBlankNode, Quad, Term, Triple};
use rustc_hash::FxHashSet;
use sparalgebra::algebra::QueryDataset;
use std::convert::Infallible;
use std::error::Error;
use std::iter::empty;
use std::rc::Rc;

/// A read-only RDF dataset the queries are evaluated against.
///
/// Implement it to evaluate queries on your own storage.
/// It is implemented by the in-memory [`Dataset`].
///
/// ```
/// use rdfterm::{Dataset, NamedNode, Quad};
/// use sparexec::TripleSource;
///
/// let ex = NamedNode::new("http://example.com")?;
/// let dataset = Dataset::from_iter([Quad::new(ex.clone(), ex.clone(), ex.clone(), ex.clone())]);
/// let quads = TripleSource::quads_for_pattern(&dataset, None, Some(&ex), None, None)
///     .collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(quads.len(), 1);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait TripleSource {
    type Error: Error + Send + Sync + 'static;

    /// Returns the quads matching a pattern, `None` being a wildcard.
    ///
    /// A `None` graph name matches all the graphs, the default graph included.
    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&NamedOrBlankNode>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph_name: Option<&GraphName>,
    ) -> Box<dyn Iterator<Item = Result<Quad, Self::Error>> + 'a>;

    /// Returns all the named graphs, including the ones without any quad.
    fn named_graphs(&self) -> Box<dyn Iterator<Item = Result<NamedOrBlankNode, Self::Error>> + '_>;

    fn contains_named_graph(&self, graph_name: &NamedOrBlankNode) -> Result<bool, Self::Error>;
}

/// A [`TripleSource`] that SPARQL updates are able to modify.
pub trait MutableTripleSource: TripleSource {
    /// Returns `false` if the quad was already there.
    fn insert(&mut self, quad: Quad) -> Result<bool, Self::Error>;

    /// Returns `false` if the quad was not there.
    fn remove(&mut self, quad: &Quad) -> Result<bool, Self::Error>;

    fn insert_named_graph(&mut self, graph_name: NamedOrBlankNode) -> Result<bool, Self::Error>;

    /// Removes a named graph and all its quads.
    fn remove_named_graph(&mut self, graph_name: &NamedOrBlankNode) -> Result<bool, Self::Error>;

    /// Removes all the quads of a graph.
    fn clear_graph(&mut self, graph_name: &GraphName) -> Result<(), Self::Error>;
}

impl TripleSource for Dataset {
    type Error = Infallible;

    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&NamedOrBlankNode>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph_name: Option<&GraphName>,
    ) -> Box<dyn Iterator<Item = Result<Quad, Infallible>> + 'a> {
        let subject = subject.cloned();
        let predicate = predicate.cloned();
        let object = object.cloned();
        let matches = move |t: &Triple| {
            subject.as_ref().is_none_or(|s| *s == t.subject)
                && predicate.as_ref().is_none_or(|p| *p == t.predicate)
                && object.as_ref().is_none_or(|o| *o == t.object)
        };
        if let Some(graph_name) = graph_name {
            let graph_name = graph_name.clone();
            Box::new(
                self.triples_in_graph(&graph_name)
                    .filter(move |t| matches(t))
                    .map(move |t| Ok(t.clone().in_graph(graph_name.clone()))),
            )
        } else {
            Box::new(
                self.graph_triples()
                    .filter(move |(_, t)| matches(t))
                    .map(|(g, t)| Ok(t.clone().in_graph(g.clone()))),
            )
        }
    }

    fn named_graphs(&self) -> Box<dyn Iterator<Item = Result<NamedOrBlankNode, Infallible>> + '_> {
        Box::new(Self::named_graphs(self).map(Ok))
    }

    fn contains_named_graph(&self, graph_name: &NamedOrBlankNode) -> Result<bool, Infallible> {
        Ok(Self::contains_named_graph(self, graph_name))
    }
}

impl MutableTripleSource for Dataset {
    fn insert(&mut self, quad: Quad) -> Result<bool, Infallible> {
        Ok(Self::insert(self, quad))
    }

    fn remove(&mut self, quad: &Quad) -> Result<bool, Infallible> {
        Ok(Self::remove(self, quad))
    }

    fn insert_named_graph(&mut self, graph_name: NamedOrBlankNode) -> Result<bool, Infallible> {
        Ok(Self::insert_named_graph(self, graph_name))
    }

    fn remove_named_graph(&mut self, graph_name: &NamedOrBlankNode) -> Result<bool, Infallible> {
        Ok(Self::remove_named_graph(self, graph_name))
    }

    fn clear_graph(&mut self, graph_name: &GraphName) -> Result<(), Infallible> {
        Self::clear_graph(self, graph_name);
        Ok(())
    }
}

/// The graph the triple patterns are currently matched against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActiveGraph {
    /// The query default graph.
    Default,
    Named(NamedOrBlankNode),
}

enum DefaultGraph {
    /// The default graph of the triple source
    Default,
    /// The union of all graphs
    Union,
    /// The merge of the graphs listed in `FROM`
    Graphs(Vec<GraphName>),
}

/// The view of a [`TripleSource`] defined by the query dataset and the default graph policy.
pub struct EvalDataset<'a, D: TripleSource + ?Sized> {
    source: &'a D,
    default: Rc<DefaultGraph>,
    named: Option<Rc<[NamedOrBlankNode]>>,
}

impl<D: TripleSource + ?Sized> Clone for EvalDataset<'_, D> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            default: Rc::clone(&self.default),
            named: self.named.clone(),
        }
    }
}

impl<'a, D: TripleSource + ?Sized> EvalDataset<'a, D> {
    pub fn new(
        source: &'a D,
        dataset: Option<&QueryDataset>,
        default_graph_as_union: bool,
    ) -> Self {
        let (default, named) = match dataset {
            Some(QueryDataset { default, named })
                if !default.is_empty() || named.is_some() =>
            {
                (
                    DefaultGraph::Graphs(default.iter().cloned().map(GraphName::from).collect()),
                    named.as_ref().map(|named| {
                        named
                            .iter()
                            .cloned()
                            .map(NamedOrBlankNode::from)
                            .collect()
                    }),
                )
            }
            _ if default_graph_as_union => (DefaultGraph::Union, None),
            _ => (DefaultGraph::Default, None),
        };
        Self {
            source,
            default: Rc::new(default),
            named,
        }
    }

    pub fn triples_for_pattern(
        &self,
        subject: Option<&NamedOrBlankNode>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph: &ActiveGraph,
    ) -> Box<dyn Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a> {
        match graph {
            ActiveGraph::Named(graph_name) => self.triples_in_graph(
                subject,
                predicate,
                object,
                &graph_name.clone().into(),
            ),
            ActiveGraph::Default => match &*self.default {
                DefaultGraph::Default => {
                    self.triples_in_graph(subject, predicate, object, &GraphName::DefaultGraph)
                }
                DefaultGraph::Union => deduplicate(
                    self.source
                        .quads_for_pattern(subject, predicate, object, None)
                        .map(|q| q.map(|q| Triple::new(q.subject, q.predicate, q.object)).map_err(dataset_error)),
                ),
                DefaultGraph::Graphs(graphs) => match graphs.as_slice() {
                    [] => Box::new(empty()),
                    [graph_name] => self.triples_in_graph(subject, predicate, object, graph_name),
                    _ => {
                        let mut iters = Vec::with_capacity(graphs.len());
                        for graph_name in graphs {
                            iters.push(self.triples_in_graph(
                                subject, predicate, object, graph_name,
                            ));
                        }
                        deduplicate(iters.into_iter().flatten())
                    }
                },
            },
        }
    }

    fn triples_in_graph(
        &self,
        subject: Option<&NamedOrBlankNode>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
        graph_name: &GraphName,
    ) -> Box<dyn Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a> {
        Box::new(
            self.source
                .quads_for_pattern(subject, predicate, object, Some(graph_name))
                .map(|q| q.map(|q| Triple::new(q.subject, q.predicate, q.object)).map_err(dataset_error)),
        )
    }

    /// The named graphs available to `GRAPH`.
    pub fn named_graphs(
        &self,
    ) -> Box<dyn Iterator<Item = Result<NamedOrBlankNode, QueryEvaluationError>> + 'a> {
        if let Some(named) = &self.named {
            let named = Rc::clone(named);
            Box::new((0..named.len()).map(move |i| Ok(named[i].clone())))
        } else {
            Box::new(self.source.named_graphs().map(|g| g.map_err(dataset_error)))
        }
    }

    pub fn contains_named_graph(
        &self,
        graph_name: &NamedOrBlankNode,
    ) -> Result<bool, QueryEvaluationError> {
        if let Some(named) = &self.named {
            Ok(named.contains(graph_name))
        } else {
            self.source
                .contains_named_graph(graph_name)
                .map_err(dataset_error)
        }
    }
}

fn deduplicate<'a>(
    iter: impl Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a,
) -> Box<dyn Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a> {
    let mut seen = FxHashSet::default();
    Box::new(iter.filter(move |t| match t {
        Ok(t) => seen.insert(t.clone()),
        Err(_) => true,
    }))
}

pub(crate) fn dataset_error(error: impl Error + Send + Sync + 'static) -> QueryEvaluationError {
    let error: Box<dyn Error + Send + Sync> = Box::new(error);
    match error.downcast() {
        Ok(error) => *error,
        Err(error) => QueryEvaluationError::Dataset(error),
    }
}
