use crate::QuerySolution;
use crate::context::{CustomFunctionRegistry, QueryContext};
use crate::dataset::{EvalDataset, MutableTripleSource, dataset_error};
use crate::error::QueryEvaluationError;
use crate::eval::SimpleEvaluator;
use crate::service::ServiceHandlerRegistry;
use oxiri::Iri;
use oxsdatatypes::DateTime;
use rdfterm::{BlankNode, GraphName, NamedNode, NamedOrBlankNode, Quad, Term};
use rustc_hash::FxHashMap;
use sparalgebra::algebra::{GraphPattern, GraphTarget, QueryDataset};
use sparalgebra::term::{GraphNamePattern, NamedNodePattern, QuadPattern, TermPattern};
use sparalgebra::{GraphUpdateOperation, Update};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Applies the operations of an [`Update`] one after the other.
///
/// An operation sees the changes of the previous ones.
pub(crate) struct SimpleUpdateEvaluator<'a, D: MutableTripleSource + ?Sized> {
    pub dataset: &'a mut D,
    pub base_iri: Option<Arc<Iri<String>>>,
    pub now: Option<DateTime>,
    pub default_graph_as_union: bool,
    pub service_handler: Rc<ServiceHandlerRegistry>,
    pub custom_functions: Rc<CustomFunctionRegistry>,
}

impl<D: MutableTripleSource + ?Sized> SimpleUpdateEvaluator<'_, D> {
    pub fn eval_all(&mut self, update: &Update) -> Result<(), QueryEvaluationError> {
        if let Some(base_iri) = &update.base_iri {
            self.base_iri = Some(Arc::new(base_iri.clone()));
        }
        for operation in &update.operations {
            self.eval(operation)?;
        }
        Ok(())
    }

    fn eval(&mut self, operation: &GraphUpdateOperation) -> Result<(), QueryEvaluationError> {
        match operation {
            GraphUpdateOperation::InsertData { data } => {
                debug!(quads = data.len(), "INSERT DATA");
                self.eval_insert_data(data)
            }
            GraphUpdateOperation::DeleteData { data } => {
                debug!(quads = data.len(), "DELETE DATA");
                for quad in data {
                    self.dataset.remove(quad).map_err(dataset_error)?;
                }
                Ok(())
            }
            GraphUpdateOperation::DeleteInsert {
                delete,
                insert,
                using,
                pattern,
            } => self.eval_delete_insert(delete, insert, using.as_ref(), pattern),
            GraphUpdateOperation::Load { silent, source, .. } => {
                debug!(%source, silent, "LOAD");
                if *silent {
                    Ok(())
                } else {
                    Err(QueryEvaluationError::UnsupportedLoad(source.clone()))
                }
            }
            GraphUpdateOperation::Clear { silent, graph } => {
                debug!(?graph, silent, "CLEAR");
                self.eval_clear(graph, *silent)
            }
            GraphUpdateOperation::Create { silent, graph } => {
                debug!(%graph, silent, "CREATE");
                self.eval_create(graph, *silent)
            }
            GraphUpdateOperation::Drop { silent, graph } => {
                debug!(?graph, silent, "DROP");
                self.eval_drop(graph, *silent)
            }
        }
    }

    fn eval_insert_data(&mut self, data: &[Quad]) -> Result<(), QueryEvaluationError> {
        // blank nodes of the data are fresh
        let mut bnodes = FxHashMap::default();
        for quad in data {
            let subject: NamedOrBlankNode = match &quad.subject {
                NamedOrBlankNode::NamedNode(node) => node.clone().into(),
                NamedOrBlankNode::BlankNode(node) => convert_blank_node(node, &mut bnodes).into(),
            };
            let object: Term = match &quad.object {
                Term::BlankNode(node) => convert_blank_node(node, &mut bnodes).into(),
                object => object.clone(),
            };
            self.dataset
                .insert(Quad::new(
                    subject,
                    quad.predicate.clone(),
                    object,
                    quad.graph_name.clone(),
                ))
                .map_err(dataset_error)?;
        }
        Ok(())
    }

    fn eval_delete_insert(
        &mut self,
        delete: &[QuadPattern],
        insert: &[QuadPattern],
        using: Option<&QueryDataset>,
        pattern: &GraphPattern,
    ) -> Result<(), QueryEvaluationError> {
        // all the solutions are computed before the dataset is modified
        let solutions = {
            let evaluator = SimpleEvaluator::new(
                EvalDataset::new(&*self.dataset, using, self.default_graph_as_union),
                QueryContext::new(self.now, self.base_iri.clone()),
                Rc::clone(&self.service_handler),
                Rc::clone(&self.custom_functions),
            );
            evaluator
                .evaluate_select(pattern, [])?
                .collect::<Result<Vec<_>, _>>()?
        };
        debug!(
            solutions = solutions.len(),
            delete = delete.len(),
            insert = insert.len(),
            "DELETE/INSERT"
        );
        let mut bnodes = FxHashMap::default();
        for solution in &solutions {
            for quad in delete {
                if let Some(quad) = fill_quad_pattern(quad, solution, None) {
                    self.dataset.remove(&quad).map_err(dataset_error)?;
                }
            }
        }
        for solution in &solutions {
            for quad in insert {
                if let Some(quad) = fill_quad_pattern(quad, solution, Some(&mut bnodes)) {
                    self.dataset.insert(quad).map_err(dataset_error)?;
                }
            }
            bnodes.clear();
        }
        Ok(())
    }

    fn eval_clear(&mut self, graph: &GraphTarget, silent: bool) -> Result<(), QueryEvaluationError> {
        match graph {
            GraphTarget::NamedNode(graph_name) => {
                if self.contains_named_graph(graph_name)? {
                    self.dataset
                        .clear_graph(&graph_name.clone().into())
                        .map_err(dataset_error)
                } else if silent {
                    Ok(())
                } else {
                    Err(QueryEvaluationError::GraphDoesNotExist(graph_name.clone()))
                }
            }
            GraphTarget::DefaultGraph => self
                .dataset
                .clear_graph(&GraphName::DefaultGraph)
                .map_err(dataset_error),
            GraphTarget::NamedGraphs => {
                for graph_name in self.named_graphs()? {
                    self.dataset
                        .clear_graph(&graph_name.into())
                        .map_err(dataset_error)?;
                }
                Ok(())
            }
            GraphTarget::AllGraphs => {
                self.eval_clear(&GraphTarget::DefaultGraph, silent)?;
                self.eval_clear(&GraphTarget::NamedGraphs, silent)
            }
        }
    }

    fn eval_create(&mut self, graph_name: &NamedNode, silent: bool) -> Result<(), QueryEvaluationError> {
        if self.contains_named_graph(graph_name)? {
            if silent {
                Ok(())
            } else {
                Err(QueryEvaluationError::GraphAlreadyExists(graph_name.clone()))
            }
        } else {
            self.dataset
                .insert_named_graph(graph_name.clone().into())
                .map_err(dataset_error)?;
            Ok(())
        }
    }

    fn eval_drop(&mut self, graph: &GraphTarget, silent: bool) -> Result<(), QueryEvaluationError> {
        match graph {
            GraphTarget::NamedNode(graph_name) => {
                if self.contains_named_graph(graph_name)? {
                    self.dataset
                        .remove_named_graph(&graph_name.clone().into())
                        .map_err(dataset_error)?;
                    Ok(())
                } else if silent {
                    Ok(())
                } else {
                    Err(QueryEvaluationError::GraphDoesNotExist(graph_name.clone()))
                }
            }
            // the default graph always exists
            GraphTarget::DefaultGraph => self.eval_clear(graph, silent),
            GraphTarget::NamedGraphs => {
                for graph_name in self.named_graphs()? {
                    self.dataset
                        .remove_named_graph(&graph_name)
                        .map_err(dataset_error)?;
                }
                Ok(())
            }
            GraphTarget::AllGraphs => {
                self.eval_clear(&GraphTarget::DefaultGraph, silent)?;
                self.eval_drop(&GraphTarget::NamedGraphs, silent)
            }
        }
    }

    fn contains_named_graph(&self, graph_name: &NamedNode) -> Result<bool, QueryEvaluationError> {
        self.dataset
            .contains_named_graph(&graph_name.clone().into())
            .map_err(dataset_error)
    }

    fn named_graphs(&self) -> Result<Vec<NamedOrBlankNode>, QueryEvaluationError> {
        self.dataset
            .named_graphs()
            .collect::<Result<Vec<_>, _>>()
            .map_err(dataset_error)
    }
}

/// Instantiates a template quad, `None` if it is not a valid quad for the solution.
///
/// Without `bnodes` the patterns with blank nodes never match, as in `DELETE` templates.
fn fill_quad_pattern(
    quad: &QuadPattern,
    solution: &QuerySolution,
    mut bnodes: Option<&mut FxHashMap<BlankNode, BlankNode>>,
) -> Option<Quad> {
    let subject = match fill_term_or_var(&quad.subject, solution, bnodes.as_deref_mut())? {
        Term::NamedNode(node) => NamedOrBlankNode::from(node),
        Term::BlankNode(node) => node.into(),
        Term::Literal(_) => return None,
    };
    Some(Quad::new(
        subject,
        fill_named_node_or_var(&quad.predicate, solution)?,
        fill_term_or_var(&quad.object, solution, bnodes)?,
        fill_graph_name_or_var(&quad.graph_name, solution)?,
    ))
}

fn fill_term_or_var(
    term: &TermPattern,
    solution: &QuerySolution,
    bnodes: Option<&mut FxHashMap<BlankNode, BlankNode>>,
) -> Option<Term> {
    Some(match term {
        TermPattern::NamedNode(term) => term.clone().into(),
        TermPattern::BlankNode(bnode) => convert_blank_node(bnode, bnodes?).into(),
        TermPattern::Literal(term) => term.clone().into(),
        TermPattern::Variable(v) => solution.get(v)?.clone(),
    })
}

fn fill_named_node_or_var(term: &NamedNodePattern, solution: &QuerySolution) -> Option<NamedNode> {
    Some(match term {
        NamedNodePattern::NamedNode(term) => term.clone(),
        NamedNodePattern::Variable(v) => {
            if let Term::NamedNode(s) = solution.get(v)? {
                s.clone()
            } else {
                return None;
            }
        }
    })
}

fn fill_graph_name_or_var(term: &GraphNamePattern, solution: &QuerySolution) -> Option<GraphName> {
    Some(match term {
        GraphNamePattern::NamedNode(term) => term.clone().into(),
        GraphNamePattern::DefaultGraph => GraphName::DefaultGraph,
        GraphNamePattern::Variable(v) => match solution.get(v)? {
            Term::NamedNode(node) => node.clone().into(),
            Term::BlankNode(node) => node.clone().into(),
            Term::Literal(_) => return None,
        },
    })
}

fn convert_blank_node(node: &BlankNode, bnodes: &mut FxHashMap<BlankNode, BlankNode>) -> BlankNode {
    bnodes.entry(node.clone()).or_default().clone()
}
