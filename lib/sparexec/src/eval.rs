use crate::aggregate::Aggregator;
use crate::binding::{AlreadyBound, Binding, ScopedBinding};
use crate::context::{CustomFunctionRegistry, QueryContext};
use crate::dataset::{ActiveGraph, EvalDataset, TripleSource};
use crate::error::{ExpressionError, QueryEvaluationError};
use crate::expression::{self, ExpressionResult};
use crate::model::{QuerySolutionIter, QueryTripleIter};
use crate::service::ServiceHandlerRegistry;
use crate::term::ExpressionTerm;
use md5::Md5;
use rdfterm::vocab::xsd;
use rdfterm::{BlankNode, NamedNode, NamedOrBlankNode, Term, Triple, Variable};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use sparalgebra::Query;
use sparalgebra::algebra::{
    AggregateExpression, AggregateFunction, Expression, Function, GraphPattern, OrderExpression,
    PropertyPathExpression,
};
use sparalgebra::term::{GroundTerm, NamedNodePattern, TermPattern, TriplePattern};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::iter::{empty, once};
use std::rc::Rc;
use tracing::{debug, trace};

/// A lazy sequence of solutions.
pub type BindingIter<'a> = Box<dyn Iterator<Item = Result<Binding, QueryEvaluationError>> + 'a>;

/// A compiled graph pattern.
///
/// Every solution it returns extends the given input binding.
type PatternEvaluator<'a> = Rc<dyn Fn(Binding, ActiveGraph) -> BindingIter<'a> + 'a>;

type ExpressionEvaluator<'a> = Rc<dyn Fn(&Binding, &ActiveGraph) -> ExpressionResult + 'a>;

type TripleIter<'a> = Box<dyn Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a>;
type TermIter<'a> = Box<dyn Iterator<Item = Result<Term, QueryEvaluationError>> + 'a>;
type TermPairIter<'a> = Box<dyn Iterator<Item = Result<(Term, Term), QueryEvaluationError>> + 'a>;

/// Compiles algebra trees into closures and runs them against a dataset.
///
/// Variables are numbered while compiling: each one gets a position in the [`Binding`]s.
pub struct SimpleEvaluator<'a, D: TripleSource + ?Sized> {
    dataset: EvalDataset<'a, D>,
    context: Rc<QueryContext>,
    service_handler: Rc<ServiceHandlerRegistry>,
    custom_functions: Rc<CustomFunctionRegistry>,
}

impl<D: TripleSource + ?Sized> Clone for SimpleEvaluator<'_, D> {
    fn clone(&self) -> Self {
        Self {
            dataset: self.dataset.clone(),
            context: Rc::clone(&self.context),
            service_handler: Rc::clone(&self.service_handler),
            custom_functions: Rc::clone(&self.custom_functions),
        }
    }
}

impl<'a, D: TripleSource + ?Sized + 'a> SimpleEvaluator<'a, D> {
    pub fn new(
        dataset: EvalDataset<'a, D>,
        context: QueryContext,
        service_handler: Rc<ServiceHandlerRegistry>,
        custom_functions: Rc<CustomFunctionRegistry>,
    ) -> Self {
        Self {
            dataset,
            context: Rc::new(context),
            service_handler,
            custom_functions,
        }
    }

    pub fn evaluate_select(
        &self,
        pattern: &GraphPattern,
        substitutions: impl IntoIterator<Item = (Variable, Term)>,
    ) -> Result<QuerySolutionIter<'a>, QueryEvaluationError> {
        debug!(algebra = %pattern.to_sse(), "evaluating SELECT");
        let output = pattern.in_scope_variables();
        let substitutions = substitutions.into_iter().collect::<Vec<_>>();
        let pattern = expose_substituted_variables(pattern, &substitutions);
        let mut variables = Vec::new();
        let eval = self.graph_pattern_evaluator(&pattern, &mut variables);
        let from = encode_initial_bindings(&mut variables, substitutions)?;
        let positions = output
            .iter()
            .map(|v| encode_variable(&mut variables, v))
            .collect::<Vec<_>>();
        Ok(QuerySolutionIter::from_rows(
            output.into(),
            eval(from, ActiveGraph::Default).map(move |solution| {
                let solution = solution?;
                Ok(positions
                    .iter()
                    .map(|position| solution.get(*position).cloned())
                    .collect())
            }),
        ))
    }

    pub fn evaluate_ask(
        &self,
        pattern: &GraphPattern,
        substitutions: impl IntoIterator<Item = (Variable, Term)>,
    ) -> Result<bool, QueryEvaluationError> {
        debug!(algebra = %pattern.to_sse(), "evaluating ASK");
        let substitutions = substitutions.into_iter().collect::<Vec<_>>();
        let pattern = expose_substituted_variables(pattern, &substitutions);
        let mut variables = Vec::new();
        let eval = self.graph_pattern_evaluator(&pattern, &mut variables);
        let from = encode_initial_bindings(&mut variables, substitutions)?;
        // true if we get any valid solution, the first error if we only get errors
        let mut error = None;
        for solution in eval(from, ActiveGraph::Default) {
            match solution {
                Ok(_) => return Ok(true),
                Err(e) => {
                    error.get_or_insert(e);
                }
            }
        }
        error.map_or(Ok(false), Err)
    }

    pub fn evaluate_construct(
        &self,
        pattern: &GraphPattern,
        template: &[TriplePattern],
        substitutions: impl IntoIterator<Item = (Variable, Term)>,
    ) -> Result<QueryTripleIter<'a>, QueryEvaluationError> {
        debug!(algebra = %pattern.to_sse(), "evaluating CONSTRUCT");
        let substitutions = substitutions.into_iter().collect::<Vec<_>>();
        let pattern = expose_substituted_variables(pattern, &substitutions);
        let mut variables = Vec::new();
        let eval = self.graph_pattern_evaluator(&pattern, &mut variables);
        let mut bnodes = Vec::new();
        let template = template
            .iter()
            .map(|t| TripleTemplate {
                subject: TemplateValue::from_term_pattern(&t.subject, &mut variables, &mut bnodes),
                predicate: TemplateValue::from_named_node_pattern(&t.predicate, &mut variables),
                object: TemplateValue::from_term_pattern(&t.object, &mut variables, &mut bnodes),
            })
            .collect();
        let from = encode_initial_bindings(&mut variables, substitutions)?;
        Ok(QueryTripleIter::new(ConstructIterator {
            solutions: eval(from, ActiveGraph::Default),
            template,
            buffered_results: Vec::new(),
            already_emitted_results: FxHashSet::default(),
            bnodes: Vec::new(),
        }))
    }

    pub fn evaluate_describe(
        &self,
        pattern: &GraphPattern,
        substitutions: impl IntoIterator<Item = (Variable, Term)>,
    ) -> Result<QueryTripleIter<'a>, QueryEvaluationError> {
        debug!(algebra = %pattern.to_sse(), "evaluating DESCRIBE");
        let described = pattern.in_scope_variables();
        let substitutions = substitutions.into_iter().collect::<Vec<_>>();
        let pattern = expose_substituted_variables(pattern, &substitutions);
        let mut variables = Vec::new();
        let eval = self.graph_pattern_evaluator(&pattern, &mut variables);
        let from = encode_initial_bindings(&mut variables, substitutions)?;
        let positions = described
            .iter()
            .map(|v| encode_variable(&mut variables, v))
            .collect();
        Ok(QueryTripleIter::new(DescribeIterator {
            dataset: self.dataset.clone(),
            positions,
            solutions: eval(from, ActiveGraph::Default),
            nodes_described: FxHashSet::default(),
            nodes_to_describe: Vec::new(),
            triples: Box::new(empty()),
        }))
    }

    /// Evaluates a single expression, its errors are not recovered from.
    pub fn evaluate_expression(
        &self,
        expression: &Expression,
        substitutions: impl IntoIterator<Item = (Variable, Term)>,
    ) -> Result<Term, QueryEvaluationError> {
        let mut variables = Vec::new();
        let eval = self.expression_evaluator(expression, &mut variables);
        let binding = encode_initial_bindings(&mut variables, substitutions)?;
        Ok(eval(&binding, &ActiveGraph::Default)?.into())
    }

    fn graph_pattern_evaluator(
        &self,
        pattern: &GraphPattern,
        variables: &mut Vec<Variable>,
    ) -> PatternEvaluator<'a> {
        match pattern {
            GraphPattern::Bgp { patterns } => {
                let patterns = patterns
                    .iter()
                    .map(|t| EncodedTriplePattern {
                        subject: PatternValue::from_term_pattern(&t.subject, variables),
                        predicate: PatternValue::from_named_node_pattern(&t.predicate, variables),
                        object: PatternValue::from_term_pattern(&t.object, variables),
                    })
                    .collect::<Rc<[_]>>();
                if patterns.is_empty() {
                    return Rc::new(|from, _| Box::new(once(Ok(from))));
                }
                let dataset = self.dataset.clone();
                Rc::new(move |from, graph| {
                    let binding = ScopedBinding::new(from);
                    let first = patterns[0].matches(&dataset, &binding, &graph);
                    Box::new(BgpIterator {
                        dataset: dataset.clone(),
                        graph,
                        patterns: Rc::clone(&patterns),
                        binding,
                        stack: vec![first],
                    })
                })
            }
            GraphPattern::Path {
                subject,
                path,
                object,
            } => self.path_evaluator(subject, path, object, variables),
            GraphPattern::Join { left, right, lazy } => {
                let left_eval = self.graph_pattern_evaluator(left, variables);
                let right_eval = self.graph_pattern_evaluator(right, variables);
                if *lazy {
                    debug!("streaming join: the right side is evaluated per left solution");
                    return Rc::new(move |from, graph| {
                        let right_eval = Rc::clone(&right_eval);
                        Box::new(left_eval(from, graph.clone()).flat_map(
                            move |left| -> BindingIter<'a> {
                                match left {
                                    Ok(left) => right_eval(left, graph.clone()),
                                    Err(e) => Box::new(once(Err(e))),
                                }
                            },
                        ))
                    });
                }
                let right_variables = right.in_scope_variables();
                let keys = left
                    .in_scope_variables()
                    .iter()
                    .filter(|v| right_variables.contains(v))
                    .map(|v| encode_variable(variables, v))
                    .collect::<Rc<[_]>>();
                debug!(keys = keys.len(), "hash join: the right side is materialized");
                Rc::new(move |from, graph| {
                    let mut errors = Vec::new();
                    let mut table = JoinTable::new(Rc::clone(&keys));
                    for solution in right_eval(from.clone(), graph.clone()) {
                        match solution {
                            Ok(solution) => table.insert(solution),
                            Err(e) => errors.push(e),
                        }
                    }
                    Box::new(
                        errors.into_iter().map(Err).chain(
                            left_eval(from, graph)
                                .flat_map(move |left| -> Vec<Result<Binding, _>> {
                                    match left {
                                        Ok(left) => table.probe(&left).map(Ok).collect(),
                                        Err(e) => vec![Err(e)],
                                    }
                                }),
                        ),
                    )
                })
            }
            GraphPattern::LeftJoin {
                left,
                right,
                expression,
            } => {
                let left_eval = self.graph_pattern_evaluator(left, variables);
                let right_eval = self.graph_pattern_evaluator(right, variables);
                let expression = expression
                    .as_ref()
                    .map(|e| self.expression_evaluator(e, variables));
                let left_positions = left
                    .in_scope_variables()
                    .iter()
                    .map(|v| encode_variable(variables, v))
                    .collect::<Rc<[_]>>();
                Rc::new(move |from, graph| {
                    let check_outer_scope = !from.is_empty();
                    Box::new(LeftJoinIterator {
                        left: left_eval(from, graph.clone()),
                        right: Rc::clone(&right_eval),
                        expression: expression.clone(),
                        left_positions: Rc::clone(&left_positions),
                        check_outer_scope,
                        graph,
                        current_left: None,
                        current_right: Box::new(empty()),
                        matched: false,
                    })
                })
            }
            GraphPattern::Filter {
                expr,
                inner,
                isolated,
            } => {
                let child = self.graph_pattern_evaluator(inner, variables);
                let expression = self.expression_evaluator(expr, variables);
                let visible = isolated.then(|| {
                    inner
                        .in_scope_variables()
                        .iter()
                        .map(|v| encode_variable(variables, v))
                        .collect::<Rc<[_]>>()
                });
                Rc::new(move |from, graph| {
                    // nothing to hide if nothing is bound outside
                    let visible = visible.clone().filter(|_| !from.is_empty());
                    let expression = Rc::clone(&expression);
                    let filter_graph = graph.clone();
                    Box::new(child(from, graph).filter(move |solution| {
                        let Ok(solution) = solution else {
                            return true;
                        };
                        let value = if let Some(visible) = &visible {
                            expression(&solution.project(visible), &filter_graph)
                        } else {
                            expression(solution, &filter_graph)
                        };
                        value
                            .and_then(|v| expression::effective_boolean_value(&v))
                            .unwrap_or(false)
                    }))
                })
            }
            GraphPattern::Union { .. } => {
                let mut plans = Vec::new();
                let mut todo = vec![pattern];
                while let Some(pattern) = todo.pop() {
                    if let GraphPattern::Union { left, right } = pattern {
                        todo.push(right);
                        todo.push(left);
                    } else {
                        plans.push(self.graph_pattern_evaluator(pattern, variables));
                    }
                }
                let plans = Rc::<[_]>::from(plans);
                Rc::new(move |from, graph| {
                    Box::new(UnionIterator {
                        plans: Rc::clone(&plans),
                        input: from,
                        graph,
                        current: Box::new(empty()),
                        next_plan: 0,
                    })
                })
            }
            GraphPattern::Graph { name, inner } => {
                let child = self.graph_pattern_evaluator(inner, variables);
                let dataset = self.dataset.clone();
                match name {
                    NamedNodePattern::NamedNode(name) => {
                        let name = NamedOrBlankNode::from(name.clone());
                        Rc::new(move |from, _| match dataset.contains_named_graph(&name) {
                            Ok(true) => child(from, ActiveGraph::Named(name.clone())),
                            Ok(false) => Box::new(empty()),
                            Err(e) => Box::new(once(Err(e))),
                        })
                    }
                    NamedNodePattern::Variable(variable) => {
                        let position = encode_variable(variables, variable);
                        Rc::new(move |from, _| {
                            if let Some(graph_name) = from.get(position) {
                                let Ok(graph_name) = NamedOrBlankNode::try_from(graph_name.clone())
                                else {
                                    return Box::new(empty());
                                };
                                return match dataset.contains_named_graph(&graph_name) {
                                    Ok(true) => child(from, ActiveGraph::Named(graph_name)),
                                    Ok(false) => Box::new(empty()),
                                    Err(e) => Box::new(once(Err(e))),
                                };
                            }
                            let child = Rc::clone(&child);
                            Box::new(dataset.named_graphs().flat_map(
                                move |graph_name| -> BindingIter<'a> {
                                    match graph_name {
                                        Ok(graph_name) => {
                                            let mut input = from.clone();
                                            input.set(position, graph_name.clone().into());
                                            child(input, ActiveGraph::Named(graph_name))
                                        }
                                        Err(e) => Box::new(once(Err(e))),
                                    }
                                },
                            ))
                        })
                    }
                }
            }
            GraphPattern::Extend {
                inner,
                variable,
                expression,
            } => {
                let child = self.graph_pattern_evaluator(inner, variables);
                let position = encode_variable(variables, variable);
                let expression = self.expression_evaluator(expression, variables);
                // the expression only sees the variables of its group, like an isolated filter
                let visible = inner
                    .in_scope_variables()
                    .iter()
                    .map(|v| encode_variable(variables, v))
                    .collect::<Rc<[_]>>();
                Rc::new(move |from, graph| {
                    let visible = (!from.is_empty()).then(|| Rc::clone(&visible));
                    let expression = Rc::clone(&expression);
                    let extend_graph = graph.clone();
                    Box::new(child(from, graph).filter_map(move |solution| {
                        let mut solution = match solution {
                            Ok(solution) => solution,
                            Err(e) => return Some(Err(e)),
                        };
                        let value = if let Some(visible) = &visible {
                            expression(&solution.project(visible), &extend_graph)
                        } else {
                            expression(&solution, &extend_graph)
                        };
                        match value {
                            Ok(value) => {
                                let value = Term::from(value);
                                match solution.get(position) {
                                    Some(existing) if *existing != value => return None,
                                    Some(_) => (),
                                    None => solution.set(position, value),
                                }
                            }
                            Err(error) => {
                                trace!(%error, "BIND expression failed, the variable stays unbound")
                            }
                        }
                        Some(Ok(solution))
                    }))
                })
            }
            GraphPattern::Minus { left, right } => {
                let left_eval = self.graph_pattern_evaluator(left, variables);
                let right_eval = self.graph_pattern_evaluator(right, variables);
                Rc::new(move |from, graph| {
                    let mut errors = Vec::new();
                    let mut right_solutions = Vec::new();
                    for solution in right_eval(Binding::default(), graph.clone()) {
                        match solution {
                            Ok(solution) => right_solutions.push(solution),
                            Err(e) => errors.push(e),
                        }
                    }
                    Box::new(errors.into_iter().map(Err).chain(
                        left_eval(from, graph).filter(move |left| {
                            let Ok(left) = left else {
                                return true;
                            };
                            !right_solutions.iter().any(|right| {
                                left.is_compatible_with(right) && !left.is_disjoint_with(right)
                            })
                        }),
                    ))
                })
            }
            GraphPattern::Values {
                variables: header,
                bindings,
            } => {
                let positions = header
                    .iter()
                    .map(|v| encode_variable(variables, v))
                    .collect::<Vec<_>>();
                let rows = bindings
                    .iter()
                    .map(|row| {
                        let mut binding = Binding::with_capacity(positions.len());
                        for (position, value) in positions.iter().zip(row) {
                            if let Some(value) = value {
                                binding.set(*position, value.clone().into());
                            }
                        }
                        binding
                    })
                    .collect::<Rc<[_]>>();
                Rc::new(move |from, _| {
                    let rows = Rc::clone(&rows);
                    Box::new((0..rows.len()).filter_map(move |i| from.merge(&rows[i]).map(Ok)))
                })
            }
            GraphPattern::ToMultiSet { inner } => self.graph_pattern_evaluator(inner, variables),
            GraphPattern::OrderBy { inner, expression } => {
                let child = self.graph_pattern_evaluator(inner, variables);
                let keys = expression
                    .iter()
                    .map(|key| match key {
                        OrderExpression::Asc(e) => (false, self.expression_evaluator(e, variables)),
                        OrderExpression::Desc(e) => (true, self.expression_evaluator(e, variables)),
                    })
                    .collect::<Rc<[_]>>();
                Rc::new(move |from, graph| {
                    let mut errors = Vec::new();
                    let mut rows = Vec::new();
                    for solution in child(from, graph.clone()) {
                        match solution {
                            Ok(solution) => {
                                let values = keys
                                    .iter()
                                    .map(|(_, key)| key(&solution, &graph).ok())
                                    .collect::<Vec<_>>();
                                rows.push((values, solution));
                            }
                            Err(e) => errors.push(e),
                        }
                    }
                    // stable: solutions equal on all keys keep their order
                    rows.sort_by(|(a, _), (b, _)| {
                        for ((descending, _), (a, b)) in keys.iter().zip(a.iter().zip(b)) {
                            let ordering = expression::cmp_terms(a.as_ref(), b.as_ref());
                            let ordering = if *descending {
                                ordering.reverse()
                            } else {
                                ordering
                            };
                            if ordering != Ordering::Equal {
                                return ordering;
                            }
                        }
                        Ordering::Equal
                    });
                    Box::new(
                        errors
                            .into_iter()
                            .map(Err)
                            .chain(rows.into_iter().map(|(_, solution)| Ok(solution))),
                    )
                })
            }
            GraphPattern::Project {
                inner,
                variables: projection,
            } => {
                let mut inner_variables = projection.clone();
                let child = self.graph_pattern_evaluator(inner, &mut inner_variables);
                let mapping = projection
                    .iter()
                    .enumerate()
                    .map(|(inner_position, variable)| {
                        (inner_position, encode_variable(variables, variable))
                    })
                    .collect::<Rc<[_]>>();
                Rc::new(move |from, graph| {
                    let mut input = Binding::with_capacity(mapping.len());
                    for (inner_position, outer_position) in mapping.iter() {
                        if let Some(value) = from.get(*outer_position) {
                            input.set(*inner_position, value.clone());
                        }
                    }
                    let mapping = Rc::clone(&mapping);
                    Box::new(child(input, graph).filter_map(move |solution| {
                        let solution = match solution {
                            Ok(solution) => solution,
                            Err(e) => return Some(Err(e)),
                        };
                        let mut output = from.clone();
                        for (inner_position, outer_position) in mapping.iter() {
                            if let Some(value) = solution.get(*inner_position) {
                                match output.get(*outer_position) {
                                    Some(existing) if existing != value => return None,
                                    Some(_) => (),
                                    None => output.set(*outer_position, value.clone()),
                                }
                            }
                        }
                        Some(Ok(output))
                    }))
                })
            }
            GraphPattern::Distinct { inner } => {
                let child = self.graph_pattern_evaluator(inner, variables);
                Rc::new(move |from, graph| Box::new(hash_deduplicate(child(from, graph))))
            }
            GraphPattern::Reduced { inner } => {
                let child = self.graph_pattern_evaluator(inner, variables);
                Rc::new(move |from, graph| {
                    Box::new(ConsecutiveDeduplication {
                        inner: child(from, graph),
                        current: None,
                    })
                })
            }
            GraphPattern::Slice {
                inner,
                start,
                length,
            } => {
                let mut child = self.graph_pattern_evaluator(inner, variables);
                let start = *start;
                if start > 0 {
                    child = Rc::new(move |from, graph| Box::new(child(from, graph).skip(start)));
                }
                if let Some(length) = *length {
                    child = Rc::new(move |from, graph| Box::new(child(from, graph).take(length)));
                }
                child
            }
            GraphPattern::Group { inner, expressions } => {
                self.group_evaluator(inner, expressions, &[], variables)
            }
            GraphPattern::AggregateJoin { group, aggregates } => {
                if let GraphPattern::Group { inner, expressions } = group.as_ref() {
                    self.group_evaluator(inner, expressions, aggregates, variables)
                } else {
                    self.group_evaluator(group, &[], aggregates, variables)
                }
            }
            GraphPattern::Service {
                name,
                inner,
                silent,
            } => self.service_evaluator(name, inner, *silent, variables),
        }
    }

    fn path_evaluator(
        &self,
        subject: &TermPattern,
        path: &PropertyPathExpression,
        object: &TermPattern,
        variables: &mut Vec<Variable>,
    ) -> PatternEvaluator<'a> {
        let subject = PatternValue::from_term_pattern(subject, variables);
        let object = PatternValue::from_term_pattern(object, variables);
        let path = PathPlan::from(path);
        let dataset = self.dataset.clone();
        Rc::new(move |from, graph| {
            let eval = PathEvaluator {
                dataset: dataset.clone(),
                graph,
            };
            match (subject.get(&from).cloned(), object.get(&from).cloned()) {
                (Some(start), Some(end)) => match eval.eval_closed(&path, &start, &end) {
                    Ok(true) => Box::new(once(Ok(from))),
                    Ok(false) => Box::new(empty()),
                    Err(e) => Box::new(once(Err(e))),
                },
                (Some(start), None) => {
                    let object = object.clone();
                    Box::new(
                        eval.eval_from(&path, &start)
                            .filter_map(move |end| match end {
                                Ok(end) => {
                                    let mut solution = from.clone();
                                    object.bind(&mut solution, end).then_some(Ok(solution))
                                }
                                Err(e) => Some(Err(e)),
                            }),
                    )
                }
                (None, Some(end)) => {
                    let subject = subject.clone();
                    Box::new(eval.eval_to(&path, &end).filter_map(move |start| match start {
                        Ok(start) => {
                            let mut solution = from.clone();
                            subject.bind(&mut solution, start).then_some(Ok(solution))
                        }
                        Err(e) => Some(Err(e)),
                    }))
                }
                (None, None) => {
                    let subject = subject.clone();
                    let object = object.clone();
                    Box::new(eval.eval_open(&path).filter_map(move |pair| match pair {
                        Ok((start, end)) => {
                            let mut solution = from.clone();
                            (subject.bind(&mut solution, start) && object.bind(&mut solution, end))
                                .then_some(Ok(solution))
                        }
                        Err(e) => Some(Err(e)),
                    }))
                }
            }
        })
    }

    fn group_evaluator(
        &self,
        inner: &GraphPattern,
        keys: &[Expression],
        aggregates: &[(Variable, AggregateExpression)],
        variables: &mut Vec<Variable>,
    ) -> PatternEvaluator<'a> {
        let child = self.graph_pattern_evaluator(inner, variables);
        // COUNT(*) only sees the variables of the grouped pattern, not blank nodes or outer values
        let row_positions = inner
            .in_scope_variables()
            .iter()
            .map(|v| encode_variable(variables, v))
            .collect::<Rc<[_]>>();
        let key_evaluators = keys
            .iter()
            .map(|e| self.expression_evaluator(e, variables))
            .collect::<Rc<[_]>>();
        let key_positions = keys
            .iter()
            .map(|e| {
                if let Expression::Variable(v) = e {
                    Some(encode_variable(variables, v))
                } else {
                    None
                }
            })
            .collect::<Rc<[_]>>();
        let variable_keys = key_positions.iter().flatten().copied().collect::<Rc<[_]>>();
        let aggregates = aggregates
            .iter()
            .map(|(variable, aggregate)| CompiledAggregate {
                position: encode_variable(variables, variable),
                function: aggregate.function.clone(),
                distinct: aggregate.distinct,
                expression: aggregate
                    .expr
                    .as_ref()
                    .map(|e| self.expression_evaluator(e, variables)),
            })
            .collect::<Rc<[_]>>();
        let implicit_group = keys.is_empty();
        Rc::new(move |from, graph| {
            let new_aggregators = || {
                aggregates
                    .iter()
                    .map(CompiledAggregate::aggregator)
                    .collect::<Vec<_>>()
            };
            let mut errors = Vec::new();
            let mut groups = Vec::<(Vec<Option<Term>>, Vec<Aggregator>)>::new();
            let mut group_index = FxHashMap::<Vec<Option<Term>>, usize>::default();
            if implicit_group {
                // a single group, even without any solution
                groups.push((Vec::new(), new_aggregators()));
                group_index.insert(Vec::new(), 0);
            }
            // outer values of the other variables must not restrict the grouped solutions
            for solution in child(from.project(&variable_keys), graph.clone()) {
                let solution = match solution {
                    Ok(solution) => solution,
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                };
                let key = key_evaluators
                    .iter()
                    .map(|key| key(&solution, &graph).ok().map(Term::from))
                    .collect::<Vec<_>>();
                let index = *group_index.entry(key.clone()).or_insert_with(|| {
                    groups.push((key, new_aggregators()));
                    groups.len() - 1
                });
                for (aggregate, aggregator) in aggregates.iter().zip(&mut groups[index].1) {
                    if let Some(expression) = &aggregate.expression {
                        if let Ok(value) = expression(&solution, &graph) {
                            aggregator.add_value(value);
                        }
                    } else {
                        aggregator.add_row(&solution.project(&row_positions));
                    }
                }
            }
            trace!(groups = groups.len(), "grouped solutions");
            let key_positions = Rc::clone(&key_positions);
            let aggregates = Rc::clone(&aggregates);
            Box::new(errors.into_iter().map(Err).chain(groups.into_iter().filter_map(
                move |(key, aggregators)| {
                    let mut result = Binding::default();
                    for (position, value) in key_positions.iter().zip(key) {
                        if let (Some(position), Some(value)) = (position, value) {
                            result.set(*position, value);
                        }
                    }
                    for (aggregate, aggregator) in aggregates.iter().zip(aggregators) {
                        if let Some(value) = aggregator.finish() {
                            result.set(aggregate.position, value.into());
                        }
                    }
                    from.merge(&result).map(Ok)
                },
            )))
        })
    }

    fn service_evaluator(
        &self,
        name: &NamedNodePattern,
        inner: &GraphPattern,
        silent: bool,
        variables: &mut Vec<Variable>,
    ) -> PatternEvaluator<'a> {
        let name = PatternValue::from_named_node_pattern(name, variables);
        let inner_variables = inner
            .in_scope_variables()
            .into_iter()
            .map(|v| {
                let position = encode_variable(variables, &v);
                (v, position)
            })
            .collect::<Rc<[_]>>();
        let inner = Rc::new(inner.clone());
        let eval = self.clone();
        Rc::new(move |from, _| {
            match eval.call_service(&name, &inner, Rc::clone(&inner_variables), &from) {
                Ok(solutions) => solutions,
                Err(error) if silent => {
                    debug!(%error, "SILENT service failed");
                    Box::new(once(Ok(from)))
                }
                Err(error) => Box::new(once(Err(error))),
            }
        })
    }

    fn call_service(
        &self,
        name: &PatternValue,
        inner: &GraphPattern,
        inner_variables: Rc<[(Variable, usize)]>,
        from: &Binding,
    ) -> Result<BindingIter<'a>, QueryEvaluationError> {
        let service_name = match name.get(from) {
            Some(Term::NamedNode(service_name)) => service_name.clone(),
            Some(term) => return Err(QueryEvaluationError::InvalidServiceName(term.clone())),
            None => return Err(QueryEvaluationError::UnboundService),
        };
        let mut pattern = inner.clone();
        if !matches!(inner, GraphPattern::Project { .. }) {
            // the already bound values are shipped with the pattern
            let mut header = Vec::new();
            let mut row = Vec::new();
            for (variable, position) in inner_variables.iter() {
                let value = match from.get(*position) {
                    Some(Term::NamedNode(value)) => GroundTerm::from(value.clone()),
                    Some(Term::Literal(value)) => GroundTerm::from(value.clone()),
                    Some(Term::BlankNode(_)) | None => continue,
                };
                header.push(variable.clone());
                row.push(Some(value));
            }
            if !header.is_empty() {
                pattern = GraphPattern::Join {
                    left: Box::new(pattern),
                    right: Box::new(GraphPattern::Values {
                        variables: header,
                        bindings: vec![row],
                    }),
                    lazy: false,
                };
            }
        }
        let query = Query::Select {
            dataset: None,
            pattern: GraphPattern::Reduced {
                inner: Box::new(pattern),
            },
            base_iri: self.context.base_iri.as_deref().cloned(),
        };
        debug!(service = %service_name, %query, "calling SERVICE");
        let solutions = self.service_handler.handle(&service_name, &query)?;
        let from = from.clone();
        Ok(Box::new(solutions.filter_map(move |solution| {
            let solution = match solution {
                Ok(solution) => solution,
                Err(e) => return Some(Err(e)),
            };
            let mut binding = from.clone();
            for (variable, position) in inner_variables.iter() {
                if let Some(value) = solution.get(variable) {
                    match binding.get(*position) {
                        Some(existing) if existing != value => return None,
                        Some(_) => (),
                        None => binding.set(*position, value.clone()),
                    }
                }
            }
            Some(Ok(binding))
        })))
    }

    fn expression_evaluator(
        &self,
        expression: &Expression,
        variables: &mut Vec<Variable>,
    ) -> ExpressionEvaluator<'a> {
        match expression {
            Expression::NamedNode(t) => {
                let t = ExpressionTerm::from(t.clone());
                Rc::new(move |_, _| Ok(t.clone()))
            }
            Expression::Literal(t) => {
                let t = ExpressionTerm::from(t.clone());
                Rc::new(move |_, _| Ok(t.clone()))
            }
            Expression::Variable(v) => {
                let position = encode_variable(variables, v);
                let v = v.clone();
                Rc::new(move |binding, _| {
                    binding
                        .get(position)
                        .map(|t| ExpressionTerm::from(t.clone()))
                        .ok_or_else(|| ExpressionError::NotBound(v.clone()))
                })
            }
            Expression::Bound(v) => {
                let position = encode_variable(variables, v);
                Rc::new(move |binding, _| Ok(binding.contains(position).into()))
            }
            Expression::Exists(pattern) => {
                let eval = self.graph_pattern_evaluator(pattern, variables);
                Rc::new(move |binding, graph| {
                    match eval(binding.clone(), graph.clone()).next() {
                        None => Ok(false.into()),
                        Some(Ok(_)) => Ok(true.into()),
                        Some(Err(e)) => Err(ExpressionError::Evaluation(Box::new(e))),
                    }
                })
            }
            Expression::Or(a, b) => {
                let a = self.expression_evaluator(a, variables);
                let b = self.expression_evaluator(b, variables);
                Rc::new(move |binding, graph| {
                    Ok(expression::or(ebv(&a, binding, graph), || ebv(&b, binding, graph))?.into())
                })
            }
            Expression::And(a, b) => {
                let a = self.expression_evaluator(a, variables);
                let b = self.expression_evaluator(b, variables);
                Rc::new(move |binding, graph| {
                    Ok(
                        expression::and(ebv(&a, binding, graph), || ebv(&b, binding, graph))?
                            .into(),
                    )
                })
            }
            Expression::Not(e) => {
                let e = self.expression_evaluator(e, variables);
                Rc::new(move |binding, graph| Ok(expression::not(&e(binding, graph)?)?.into()))
            }
            Expression::Equal(a, b) => {
                let a = self.expression_evaluator(a, variables);
                let b = self.expression_evaluator(b, variables);
                Rc::new(move |binding, graph| {
                    Ok(expression::equal(&a(binding, graph)?, &b(binding, graph)?)?.into())
                })
            }
            Expression::SameTerm(a, b) => {
                let a = self.expression_evaluator(a, variables);
                let b = self.expression_evaluator(b, variables);
                Rc::new(move |binding, graph| {
                    Ok((Term::from(a(binding, graph)?) == Term::from(b(binding, graph)?)).into())
                })
            }
            Expression::Greater(a, b) => {
                self.comparison_evaluator(a, b, variables, |o| o == Ordering::Greater)
            }
            Expression::GreaterOrEqual(a, b) => {
                self.comparison_evaluator(a, b, variables, |o| o != Ordering::Less)
            }
            Expression::Less(a, b) => {
                self.comparison_evaluator(a, b, variables, |o| o == Ordering::Less)
            }
            Expression::LessOrEqual(a, b) => {
                self.comparison_evaluator(a, b, variables, |o| o != Ordering::Greater)
            }
            Expression::In(needle, candidates) => {
                let needle = self.expression_evaluator(needle, variables);
                let candidates = candidates
                    .iter()
                    .map(|e| self.expression_evaluator(e, variables))
                    .collect::<Rc<[_]>>();
                Rc::new(move |binding, graph| {
                    let needle = needle(binding, graph)?;
                    Ok(expression::is_in(
                        &needle,
                        candidates.iter().map(|c| c(binding, graph)),
                    )?
                    .into())
                })
            }
            Expression::Add(a, b) => self.binary_evaluator(a, b, variables, expression::add),
            Expression::Subtract(a, b) => {
                self.binary_evaluator(a, b, variables, expression::subtract)
            }
            Expression::Multiply(a, b) => {
                self.binary_evaluator(a, b, variables, expression::multiply)
            }
            Expression::Divide(a, b) => self.binary_evaluator(a, b, variables, expression::divide),
            Expression::UnaryPlus(e) => {
                let e = self.expression_evaluator(e, variables);
                Rc::new(move |binding, graph| expression::unary_plus(e(binding, graph)?))
            }
            Expression::UnaryMinus(e) => {
                let e = self.expression_evaluator(e, variables);
                Rc::new(move |binding, graph| expression::unary_minus(e(binding, graph)?))
            }
            Expression::If(condition, then, otherwise) => {
                let condition = self.expression_evaluator(condition, variables);
                let then = self.expression_evaluator(then, variables);
                let otherwise = self.expression_evaluator(otherwise, variables);
                Rc::new(move |binding, graph| {
                    if ebv(&condition, binding, graph)? {
                        then(binding, graph)
                    } else {
                        otherwise(binding, graph)
                    }
                })
            }
            Expression::Coalesce(inner) => {
                let inner = inner
                    .iter()
                    .map(|e| self.expression_evaluator(e, variables))
                    .collect::<Rc<[_]>>();
                Rc::new(move |binding, graph| {
                    let mut error = ExpressionError::Type("COALESCE without arguments");
                    for e in inner.iter() {
                        match e(binding, graph) {
                            Ok(value) => return Ok(value),
                            Err(e) => error = e,
                        }
                    }
                    Err(error)
                })
            }
            Expression::FunctionCall(function, parameters) => {
                self.function_evaluator(function, parameters, variables)
            }
        }
    }

    fn function_evaluator(
        &self,
        function: &Function,
        parameters: &[Expression],
        variables: &mut Vec<Variable>,
    ) -> ExpressionEvaluator<'a> {
        match function {
            Function::Str => self.unary_function(parameters, variables, expression::to_str),
            Function::Lang => self.unary_function(parameters, variables, expression::lang),
            Function::LangMatches => {
                self.binary_function(parameters, variables, expression::lang_matches)
            }
            Function::Datatype => self.unary_function(parameters, variables, expression::datatype),
            Function::Iri => {
                let [arg] = parameters else {
                    return wrong_arity();
                };
                let arg = self.expression_evaluator(arg, variables);
                let base_iri = self.context.base_iri.clone();
                Rc::new(move |binding, graph| {
                    expression::iri(arg(binding, graph)?, base_iri.as_deref())
                })
            }
            Function::BNode => match parameters {
                [] => Rc::new(|_, _| Ok(ExpressionTerm::BlankNode(BlankNode::default()))),
                [label] => {
                    let label = self.expression_evaluator(label, variables);
                    let context = Rc::clone(&self.context);
                    Rc::new(move |binding, graph| match label(binding, graph)? {
                        ExpressionTerm::StringLiteral(label) => Ok(ExpressionTerm::BlankNode(
                            context.labeled_blank_node(binding, &label),
                        )),
                        _ => Err(ExpressionError::Type("BNODE expects a simple literal")),
                    })
                }
                _ => wrong_arity(),
            },
            Function::Rand => self.nullary_function(parameters, expression::rand),
            Function::Abs => self.unary_function(parameters, variables, expression::abs),
            Function::Ceil => self.unary_function(parameters, variables, expression::ceil),
            Function::Floor => self.unary_function(parameters, variables, expression::floor),
            Function::Round => self.unary_function(parameters, variables, expression::round),
            Function::Concat => {
                let args = parameters
                    .iter()
                    .map(|e| self.expression_evaluator(e, variables))
                    .collect::<Rc<[_]>>();
                Rc::new(move |binding, graph| {
                    expression::concat(args.iter().map(|arg| arg(binding, graph)))
                })
            }
            Function::SubStr => match parameters {
                [source, start] => {
                    let source = self.expression_evaluator(source, variables);
                    let start = self.expression_evaluator(start, variables);
                    Rc::new(move |binding, graph| {
                        expression::substr(source(binding, graph)?, start(binding, graph)?, None)
                    })
                }
                [source, start, length] => {
                    let source = self.expression_evaluator(source, variables);
                    let start = self.expression_evaluator(start, variables);
                    let length = self.expression_evaluator(length, variables);
                    Rc::new(move |binding, graph| {
                        expression::substr(
                            source(binding, graph)?,
                            start(binding, graph)?,
                            Some(length(binding, graph)?),
                        )
                    })
                }
                _ => wrong_arity(),
            },
            Function::StrLen => self.unary_function(parameters, variables, expression::strlen),
            Function::Replace => {
                let (text, pattern, replacement, flags) = match parameters {
                    [text, pattern, replacement] => (text, pattern, replacement, None),
                    [text, pattern, replacement, flags] => {
                        (text, pattern, replacement, Some(flags))
                    }
                    _ => return wrong_arity(),
                };
                let text = self.expression_evaluator(text, variables);
                let replacement = self.expression_evaluator(replacement, variables);
                let regex = self.regex_evaluator(pattern, flags, variables);
                Rc::new(move |binding, graph| {
                    let regex = regex(binding, graph)?;
                    expression::replace(text(binding, graph)?, &regex, replacement(binding, graph)?)
                })
            }
            Function::UCase => self.unary_function(parameters, variables, expression::ucase),
            Function::LCase => self.unary_function(parameters, variables, expression::lcase),
            Function::EncodeForUri => {
                self.unary_function(parameters, variables, expression::encode_for_uri)
            }
            Function::Contains => self.binary_function(parameters, variables, expression::contains),
            Function::StrStarts => {
                self.binary_function(parameters, variables, expression::str_starts)
            }
            Function::StrEnds => self.binary_function(parameters, variables, expression::str_ends),
            Function::StrBefore => {
                self.binary_function(parameters, variables, expression::str_before)
            }
            Function::StrAfter => {
                self.binary_function(parameters, variables, expression::str_after)
            }
            Function::Year => self.unary_function(parameters, variables, expression::year),
            Function::Month => self.unary_function(parameters, variables, expression::month),
            Function::Day => self.unary_function(parameters, variables, expression::day),
            Function::Hours => self.unary_function(parameters, variables, expression::hours),
            Function::Minutes => self.unary_function(parameters, variables, expression::minutes),
            Function::Seconds => self.unary_function(parameters, variables, expression::seconds),
            Function::Timezone => self.unary_function(parameters, variables, expression::timezone),
            Function::Tz => self.unary_function(parameters, variables, expression::tz),
            Function::Now => {
                if !parameters.is_empty() {
                    return wrong_arity();
                }
                let now = self.context.now;
                Rc::new(move |_, _| Ok(ExpressionTerm::DateTimeLiteral(now)))
            }
            Function::Uuid => self.nullary_function(parameters, expression::uuid),
            Function::StrUuid => self.nullary_function(parameters, expression::str_uuid),
            Function::Md5 => self.unary_function(parameters, variables, expression::hash::<Md5>),
            Function::Sha1 => self.unary_function(parameters, variables, expression::hash::<Sha1>),
            Function::Sha256 => {
                self.unary_function(parameters, variables, expression::hash::<Sha256>)
            }
            Function::Sha384 => {
                self.unary_function(parameters, variables, expression::hash::<Sha384>)
            }
            Function::Sha512 => {
                self.unary_function(parameters, variables, expression::hash::<Sha512>)
            }
            Function::StrLang => self.binary_function(parameters, variables, expression::str_lang),
            Function::StrDt => self.binary_function(parameters, variables, expression::str_dt),
            Function::IsIri => {
                self.unary_function(parameters, variables, |t| Ok(expression::is_iri(&t)))
            }
            Function::IsBlank => {
                self.unary_function(parameters, variables, |t| Ok(expression::is_blank(&t)))
            }
            Function::IsLiteral => {
                self.unary_function(parameters, variables, |t| Ok(expression::is_literal(&t)))
            }
            Function::IsNumeric => {
                self.unary_function(parameters, variables, |t| Ok(expression::is_numeric(&t)))
            }
            Function::Regex => {
                let (text, pattern, flags) = match parameters {
                    [text, pattern] => (text, pattern, None),
                    [text, pattern, flags] => (text, pattern, Some(flags)),
                    _ => return wrong_arity(),
                };
                let text = self.expression_evaluator(text, variables);
                let regex = self.regex_evaluator(pattern, flags, variables);
                Rc::new(move |binding, graph| {
                    let regex = regex(binding, graph)?;
                    Ok(expression::regex_matches(text(binding, graph)?, &regex)?.into())
                })
            }
            Function::Custom(name) => {
                if let Some(function) = self.custom_functions.get(name).cloned() {
                    let args = parameters
                        .iter()
                        .map(|e| self.expression_evaluator(e, variables))
                        .collect::<Rc<[_]>>();
                    return Rc::new(move |binding, graph| {
                        let args = args
                            .iter()
                            .map(|arg| Ok(Term::from(arg(binding, graph)?)))
                            .collect::<Result<Vec<_>, ExpressionError>>()?;
                        function(&args)
                            .map(ExpressionTerm::from)
                            .ok_or(ExpressionError::Type("the custom function returned no value"))
                    });
                }
                if expression::is_cast(name.as_ref()) {
                    let [arg] = parameters else {
                        return wrong_arity();
                    };
                    let arg = self.expression_evaluator(arg, variables);
                    let name = name.clone();
                    return Rc::new(move |binding, graph| {
                        expression::cast(name.as_ref(), arg(binding, graph)?)
                    });
                }
                let name = name.clone();
                Rc::new(move |_, _| Err(ExpressionError::UnknownFunction(name.clone())))
            }
        }
    }

    /// Compiles the pattern once if it is a constant, else on each call.
    fn regex_evaluator(
        &self,
        pattern: &Expression,
        flags: Option<&Expression>,
        variables: &mut Vec<Variable>,
    ) -> Rc<dyn Fn(&Binding, &ActiveGraph) -> Result<Rc<Regex>, ExpressionError> + 'a> {
        if let Some(regex) = compile_static_pattern(pattern, flags) {
            return match regex {
                Ok(regex) => {
                    let regex = Rc::new(regex);
                    Rc::new(move |_, _| Ok(Rc::clone(&regex)))
                }
                Err(_) => Rc::new(|_, _| Err(ExpressionError::Type("invalid regular expression"))),
            };
        }
        let pattern = self.expression_evaluator(pattern, variables);
        let flags = flags.map(|flags| self.expression_evaluator(flags, variables));
        Rc::new(move |binding, graph| {
            let ExpressionTerm::StringLiteral(pattern) = pattern(binding, graph)? else {
                return Err(ExpressionError::Type("regular expressions must be simple literals"));
            };
            let flags = if let Some(flags) = &flags {
                let ExpressionTerm::StringLiteral(flags) = flags(binding, graph)? else {
                    return Err(ExpressionError::Type("regular expression flags must be simple literals"));
                };
                Some(flags)
            } else {
                None
            };
            Ok(Rc::new(expression::compile_pattern(&pattern, flags.as_deref())?))
        })
    }

    fn comparison_evaluator(
        &self,
        a: &Expression,
        b: &Expression,
        variables: &mut Vec<Variable>,
        test: fn(Ordering) -> bool,
    ) -> ExpressionEvaluator<'a> {
        let a = self.expression_evaluator(a, variables);
        let b = self.expression_evaluator(b, variables);
        Rc::new(move |binding, graph| {
            Ok(test(expression::compare(&a(binding, graph)?, &b(binding, graph)?)?).into())
        })
    }

    fn binary_evaluator(
        &self,
        a: &Expression,
        b: &Expression,
        variables: &mut Vec<Variable>,
        operator: fn(ExpressionTerm, ExpressionTerm) -> ExpressionResult,
    ) -> ExpressionEvaluator<'a> {
        let a = self.expression_evaluator(a, variables);
        let b = self.expression_evaluator(b, variables);
        Rc::new(move |binding, graph| operator(a(binding, graph)?, b(binding, graph)?))
    }

    fn nullary_function(
        &self,
        parameters: &[Expression],
        function: fn() -> ExpressionTerm,
    ) -> ExpressionEvaluator<'a> {
        if !parameters.is_empty() {
            return wrong_arity();
        }
        Rc::new(move |_, _| Ok(function()))
    }

    fn unary_function(
        &self,
        parameters: &[Expression],
        variables: &mut Vec<Variable>,
        function: fn(ExpressionTerm) -> ExpressionResult,
    ) -> ExpressionEvaluator<'a> {
        let [arg] = parameters else {
            return wrong_arity();
        };
        let arg = self.expression_evaluator(arg, variables);
        Rc::new(move |binding, graph| function(arg(binding, graph)?))
    }

    fn binary_function(
        &self,
        parameters: &[Expression],
        variables: &mut Vec<Variable>,
        function: fn(ExpressionTerm, ExpressionTerm) -> ExpressionResult,
    ) -> ExpressionEvaluator<'a> {
        let [a, b] = parameters else {
            return wrong_arity();
        };
        self.binary_evaluator(a, b, variables, function)
    }
}

fn ebv(
    evaluator: &ExpressionEvaluator<'_>,
    binding: &Binding,
    graph: &ActiveGraph,
) -> Result<bool, ExpressionError> {
    expression::effective_boolean_value(&evaluator(binding, graph)?)
}

fn wrong_arity<'a>() -> ExpressionEvaluator<'a> {
    Rc::new(|_, _| Err(ExpressionError::Type("wrong number of arguments")))
}

fn static_string(expression: &Expression) -> Option<&str> {
    if let Expression::Literal(literal) = expression {
        (literal.datatype() == xsd::STRING).then(|| literal.value())
    } else {
        None
    }
}

fn compile_static_pattern(
    pattern: &Expression,
    flags: Option<&Expression>,
) -> Option<Result<Regex, ExpressionError>> {
    let pattern = static_string(pattern)?;
    let flags = match flags {
        Some(flags) => Some(static_string(flags)?),
        None => None,
    };
    Some(expression::compile_pattern(pattern, flags))
}

fn encode_variable(variables: &mut Vec<Variable>, variable: &Variable) -> usize {
    if let Some(key) = variables.iter().position(|v| v == variable) {
        key
    } else {
        variables.push(variable.clone());
        variables.len() - 1
    }
}

/// Blank nodes of patterns are matched like variables that can't be written in a query.
fn encode_blank_node(variables: &mut Vec<Variable>, blank_node: &BlankNode) -> usize {
    encode_variable(
        variables,
        &Variable::new_unchecked(format!("_:{}", blank_node.as_str())),
    )
}

/// Adds the substituted variables to the top level projection so that they reach the pattern it hides.
fn expose_substituted_variables(
    pattern: &GraphPattern,
    substitutions: &[(Variable, Term)],
) -> GraphPattern {
    match pattern {
        GraphPattern::Project { inner, variables } => {
            let mut variables = variables.clone();
            for (variable, _) in substitutions {
                if !variables.contains(variable) {
                    variables.push(variable.clone());
                }
            }
            GraphPattern::Project {
                inner: inner.clone(),
                variables,
            }
        }
        GraphPattern::Distinct { inner } => GraphPattern::Distinct {
            inner: Box::new(expose_substituted_variables(inner, substitutions)),
        },
        GraphPattern::Reduced { inner } => GraphPattern::Reduced {
            inner: Box::new(expose_substituted_variables(inner, substitutions)),
        },
        GraphPattern::Slice {
            inner,
            start,
            length,
        } => GraphPattern::Slice {
            inner: Box::new(expose_substituted_variables(inner, substitutions)),
            start: *start,
            length: *length,
        },
        GraphPattern::OrderBy { inner, expression } => GraphPattern::OrderBy {
            inner: Box::new(expose_substituted_variables(inner, substitutions)),
            expression: expression.clone(),
        },
        pattern => pattern.clone(),
    }
}

fn encode_initial_bindings(
    variables: &mut Vec<Variable>,
    substitutions: impl IntoIterator<Item = (Variable, Term)>,
) -> Result<Binding, QueryEvaluationError> {
    let mut binding = Binding::with_capacity(variables.len());
    for (variable, value) in substitutions {
        let position = encode_variable(variables, &variable);
        if binding.get(position).is_some_and(|existing| *existing != value) {
            return Err(QueryEvaluationError::AlreadyBound(variable));
        }
        binding.set(position, value);
    }
    Ok(binding)
}

#[derive(Clone)]
enum PatternValue {
    Constant(Term),
    Variable(usize),
}

impl PatternValue {
    fn from_term_pattern(pattern: &TermPattern, variables: &mut Vec<Variable>) -> Self {
        match pattern {
            TermPattern::NamedNode(node) => Self::Constant(node.clone().into()),
            TermPattern::Literal(literal) => Self::Constant(literal.clone().into()),
            TermPattern::BlankNode(bnode) => Self::Variable(encode_blank_node(variables, bnode)),
            TermPattern::Variable(v) => Self::Variable(encode_variable(variables, v)),
        }
    }

    fn from_named_node_pattern(pattern: &NamedNodePattern, variables: &mut Vec<Variable>) -> Self {
        match pattern {
            NamedNodePattern::NamedNode(node) => Self::Constant(node.clone().into()),
            NamedNodePattern::Variable(v) => Self::Variable(encode_variable(variables, v)),
        }
    }

    fn get<'b>(&'b self, binding: &'b Binding) -> Option<&'b Term> {
        match self {
            Self::Constant(term) => Some(term),
            Self::Variable(position) => binding.get(*position),
        }
    }

    fn get_scoped<'b>(&'b self, binding: &'b ScopedBinding) -> Option<&'b Term> {
        match self {
            Self::Constant(term) => Some(term),
            Self::Variable(position) => binding.get(*position),
        }
    }

    /// Returns `false` if the value conflicts with the binding.
    fn bind(&self, binding: &mut Binding, value: Term) -> bool {
        match self {
            Self::Constant(term) => *term == value,
            Self::Variable(position) => match binding.get(*position) {
                Some(existing) => *existing == value,
                None => {
                    binding.set(*position, value);
                    true
                }
            },
        }
    }
}

struct EncodedTriplePattern {
    subject: PatternValue,
    predicate: PatternValue,
    object: PatternValue,
}

impl EncodedTriplePattern {
    fn matches<'a, D: TripleSource + ?Sized>(
        &self,
        dataset: &EvalDataset<'a, D>,
        binding: &ScopedBinding,
        graph: &ActiveGraph,
    ) -> TripleIter<'a> {
        let subject = match self.subject.get_scoped(binding) {
            Some(Term::NamedNode(node)) => Some(NamedOrBlankNode::from(node.clone())),
            Some(Term::BlankNode(node)) => Some(NamedOrBlankNode::from(node.clone())),
            Some(Term::Literal(_)) => return Box::new(empty()),
            None => None,
        };
        let predicate = match self.predicate.get_scoped(binding) {
            Some(Term::NamedNode(node)) => Some(node.clone()),
            Some(_) => return Box::new(empty()),
            None => None,
        };
        let object = self.object.get_scoped(binding).cloned();
        dataset.triples_for_pattern(
            subject.as_ref(),
            predicate.as_ref(),
            object.as_ref(),
            graph,
        )
    }

    fn bind(&self, triple: Triple, binding: &mut ScopedBinding) -> Result<(), AlreadyBound> {
        if let PatternValue::Variable(position) = self.subject {
            binding.bind(position, triple.subject.into())?;
        }
        if let PatternValue::Variable(position) = self.predicate {
            binding.bind(position, triple.predicate.into())?;
        }
        if let PatternValue::Variable(position) = self.object {
            binding.bind(position, triple.object)?;
        }
        Ok(())
    }
}

/// Depth first matching of a basic graph pattern.
///
/// The iterator at depth `n` of the stack enumerates the matches of the `n`-th triple pattern
/// under the bindings of the scopes `0..n`.
struct BgpIterator<'a, D: TripleSource + ?Sized> {
    dataset: EvalDataset<'a, D>,
    graph: ActiveGraph,
    patterns: Rc<[EncodedTriplePattern]>,
    binding: ScopedBinding,
    stack: Vec<TripleIter<'a>>,
}

impl<D: TripleSource + ?Sized> Iterator for BgpIterator<'_, D> {
    type Item = Result<Binding, QueryEvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let triple = match self.stack.last_mut()?.next() {
                Some(Ok(triple)) => triple,
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.stack.pop();
                    if !self.stack.is_empty() {
                        // backtracking: the previous pattern match is undone
                        self.binding.pop_scope();
                    }
                    continue;
                }
            };
            let depth = self.stack.len();
            self.binding.push_scope();
            if self.patterns[depth - 1]
                .bind(triple, &mut self.binding)
                .is_err()
            {
                self.binding.pop_scope();
                continue;
            }
            if depth == self.patterns.len() {
                let solution = self.binding.snapshot();
                self.binding.pop_scope();
                return Some(Ok(solution));
            }
            let next = self.patterns[depth].matches(&self.dataset, &self.binding, &self.graph);
            self.stack.push(next);
        }
    }
}

/// Relational join support: the right solutions indexed by the values of the shared variables.
struct JoinTable {
    keys: Rc<[usize]>,
    buckets: FxHashMap<u64, Vec<Binding>>,
    /// The solutions where a shared variable is unbound
    unkeyed: Vec<Binding>,
}

impl JoinTable {
    fn new(keys: Rc<[usize]>) -> Self {
        Self {
            keys,
            buckets: FxHashMap::default(),
            unkeyed: Vec::new(),
        }
    }

    fn key(&self, binding: &Binding) -> Option<u64> {
        let mut hasher = FxHasher::default();
        for key in self.keys.iter() {
            binding.get(*key)?.hash(&mut hasher);
        }
        Some(hasher.finish())
    }

    fn insert(&mut self, binding: Binding) {
        if let Some(key) = self.key(&binding) {
            self.buckets.entry(key).or_default().push(binding);
        } else {
            self.unkeyed.push(binding);
        }
    }

    /// The merges of `left` with the compatible solutions.
    fn probe<'b>(&'b self, left: &'b Binding) -> impl Iterator<Item = Binding> + 'b {
        let candidates: Box<dyn Iterator<Item = &Binding> + 'b> = if let Some(key) = self.key(left) {
            Box::new(self.buckets.get(&key).into_iter().flatten())
        } else {
            Box::new(self.buckets.values().flatten())
        };
        candidates
            .chain(&self.unkeyed)
            .filter_map(move |right| left.merge(right))
    }
}

struct LeftJoinIterator<'a> {
    left: BindingIter<'a>,
    right: PatternEvaluator<'a>,
    expression: Option<ExpressionEvaluator<'a>>,
    left_positions: Rc<[usize]>,
    check_outer_scope: bool,
    graph: ActiveGraph,
    current_left: Option<Binding>,
    current_right: BindingIter<'a>,
    matched: bool,
}

impl Iterator for LeftJoinIterator<'_> {
    type Item = Result<Binding, QueryEvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for solution in &mut self.current_right {
                match solution {
                    Ok(solution) => {
                        if accepts(self.expression.as_ref(), &solution, &self.graph) {
                            self.matched = true;
                            return Some(Ok(solution));
                        }
                    }
                    Err(e) => return Some(Err(e)),
                }
            }
            if let Some(left) = self.current_left.take() {
                if !self.matched && !self.matches_without_outer_scope(&left) {
                    return Some(Ok(left));
                }
            }
            let left = match self.left.next()? {
                Ok(left) => left,
                Err(e) => return Some(Err(e)),
            };
            self.current_right = (self.right)(left.clone(), self.graph.clone());
            self.current_left = Some(left);
            self.matched = false;
        }
    }
}

impl LeftJoinIterator<'_> {
    /// The right side was evaluated with the variables bound outside of the left side.
    /// The left solution is only kept if they are not the reason why nothing matched.
    fn matches_without_outer_scope(&self, left: &Binding) -> bool {
        if !self.check_outer_scope {
            return false;
        }
        (self.right)(left.project(&self.left_positions), self.graph.clone()).any(|solution| {
            solution.is_ok_and(|solution| {
                accepts(self.expression.as_ref(), &solution, &self.graph)
            })
        })
    }
}

fn accepts(
    expression: Option<&ExpressionEvaluator<'_>>,
    binding: &Binding,
    graph: &ActiveGraph,
) -> bool {
    expression.is_none_or(|expression| ebv(expression, binding, graph).unwrap_or(false))
}

struct UnionIterator<'a> {
    plans: Rc<[PatternEvaluator<'a>]>,
    input: Binding,
    graph: ActiveGraph,
    current: BindingIter<'a>,
    next_plan: usize,
}

impl Iterator for UnionIterator<'_> {
    type Item = Result<Binding, QueryEvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(solution) = self.current.next() {
                return Some(solution);
            }
            let plan = self.plans.get(self.next_plan)?;
            self.current = plan(self.input.clone(), self.graph.clone());
            self.next_plan += 1;
        }
    }
}

struct ConsecutiveDeduplication<'a> {
    inner: BindingIter<'a>,
    current: Option<Binding>,
}

impl Iterator for ConsecutiveDeduplication<'_> {
    type Item = Result<Binding, QueryEvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        // We buffer the previous result and only emit it when we know the next one or it's the end
        loop {
            let Some(next) = self.inner.next() else {
                return self.current.take().map(Ok);
            };
            match next {
                Ok(next) => match self.current.take() {
                    Some(current) if current != next => {
                        self.current = Some(next);
                        return Some(Ok(current));
                    }
                    _ => self.current = Some(next),
                },
                Err(error) => return Some(Err(error)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (min, max) = self.inner.size_hint();
        ((min != 0).into(), max)
    }
}

fn hash_deduplicate<T: Eq + Hash + Clone, E>(
    iter: impl Iterator<Item = Result<T, E>>,
) -> impl Iterator<Item = Result<T, E>> {
    let mut already_seen = FxHashSet::default();
    iter.filter(move |e| {
        if let Ok(e) = e {
            already_seen.insert(e.clone())
        } else {
            true
        }
    })
}

struct CompiledAggregate<'a> {
    position: usize,
    function: AggregateFunction,
    distinct: bool,
    /// `None` for `COUNT(*)`
    expression: Option<ExpressionEvaluator<'a>>,
}

impl CompiledAggregate<'_> {
    fn aggregator(&self) -> Aggregator {
        if self.expression.is_some() {
            Aggregator::new(&self.function, self.distinct)
        } else {
            Aggregator::count_rows(self.distinct)
        }
    }
}

#[derive(Clone)]
enum TemplateValue {
    Constant(Term),
    Variable(usize),
    /// Index of the blank node among the template ones
    BlankNode(usize),
}

impl TemplateValue {
    fn from_term_pattern(
        pattern: &TermPattern,
        variables: &mut Vec<Variable>,
        bnodes: &mut Vec<BlankNode>,
    ) -> Self {
        match pattern {
            TermPattern::NamedNode(node) => Self::Constant(node.clone().into()),
            TermPattern::Literal(literal) => Self::Constant(literal.clone().into()),
            TermPattern::BlankNode(bnode) => Self::BlankNode(
                if let Some(key) = bnodes.iter().position(|b| b == bnode) {
                    key
                } else {
                    bnodes.push(bnode.clone());
                    bnodes.len() - 1
                },
            ),
            TermPattern::Variable(v) => Self::Variable(encode_variable(variables, v)),
        }
    }

    fn from_named_node_pattern(pattern: &NamedNodePattern, variables: &mut Vec<Variable>) -> Self {
        match pattern {
            NamedNodePattern::NamedNode(node) => Self::Constant(node.clone().into()),
            NamedNodePattern::Variable(v) => Self::Variable(encode_variable(variables, v)),
        }
    }

    fn instantiate(&self, solution: &Binding, bnodes: &mut Vec<BlankNode>) -> Option<Term> {
        match self {
            Self::Constant(term) => Some(term.clone()),
            Self::Variable(position) => solution.get(*position).cloned(),
            Self::BlankNode(key) => {
                if bnodes.len() <= *key {
                    bnodes.resize_with(*key + 1, BlankNode::default);
                }
                Some(bnodes[*key].clone().into())
            }
        }
    }
}

struct TripleTemplate {
    subject: TemplateValue,
    predicate: TemplateValue,
    object: TemplateValue,
}

struct ConstructIterator<'a> {
    solutions: BindingIter<'a>,
    template: Vec<TripleTemplate>,
    buffered_results: Vec<Triple>,
    already_emitted_results: FxHashSet<Triple>,
    /// The fresh blank nodes of the current solution
    bnodes: Vec<BlankNode>,
}

impl Iterator for ConstructIterator<'_> {
    type Item = Result<Triple, QueryEvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triple) = self.buffered_results.pop() {
                return Some(Ok(triple));
            }
            let solution = match self.solutions.next()? {
                Ok(solution) => solution,
                Err(error) => return Some(Err(error)),
            };
            for template in &self.template {
                let (Some(subject), Some(predicate), Some(object)) = (
                    template.subject.instantiate(&solution, &mut self.bnodes),
                    template.predicate.instantiate(&solution, &mut self.bnodes),
                    template.object.instantiate(&solution, &mut self.bnodes),
                ) else {
                    continue;
                };
                // ill formed triples are skipped
                let (Ok(subject), Term::NamedNode(predicate)) =
                    (NamedOrBlankNode::try_from(subject), predicate)
                else {
                    continue;
                };
                let triple = Triple::new(subject, predicate, object);
                if self.already_emitted_results.insert(triple.clone()) {
                    self.buffered_results.push(triple);
                }
            }
            self.bnodes.clear();
        }
    }
}

/// Concise bounded description of the solution terms.
struct DescribeIterator<'a, D: TripleSource + ?Sized> {
    dataset: EvalDataset<'a, D>,
    positions: Vec<usize>,
    solutions: BindingIter<'a>,
    nodes_described: FxHashSet<Term>,
    nodes_to_describe: Vec<NamedOrBlankNode>,
    triples: TripleIter<'a>,
}

impl<D: TripleSource + ?Sized> Iterator for DescribeIterator<'_, D> {
    type Item = Result<Triple, QueryEvaluationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(triple) = self.triples.next() {
                let triple = match triple {
                    Ok(triple) => triple,
                    Err(error) => return Some(Err(error)),
                };
                // blank node objects are described too
                if let Term::BlankNode(object) = &triple.object {
                    if self.nodes_described.insert(triple.object.clone()) {
                        self.nodes_to_describe.push(object.clone().into());
                    }
                }
                return Some(Ok(triple));
            }
            if let Some(node) = self.nodes_to_describe.pop() {
                self.triples =
                    self.dataset
                        .triples_for_pattern(Some(&node), None, None, &ActiveGraph::Default);
                continue;
            }
            let solution = match self.solutions.next()? {
                Ok(solution) => solution,
                Err(error) => return Some(Err(error)),
            };
            for position in &self.positions {
                let Some(term) = solution.get(*position) else {
                    continue;
                };
                if self.nodes_described.insert(term.clone()) {
                    if let Ok(node) = NamedOrBlankNode::try_from(term.clone()) {
                        self.nodes_to_describe.push(node);
                    }
                }
            }
        }
    }
}

/// A property path with shared sub-paths, to be captured by lazy iterators.
#[derive(Clone)]
enum PathPlan {
    Predicate(NamedNode),
    Reverse(Rc<Self>),
    Sequence(Rc<Self>, Rc<Self>),
    Alternative(Rc<Self>, Rc<Self>),
    ZeroOrMore(Rc<Self>),
    OneOrMore(Rc<Self>),
    ZeroOrOne(Rc<Self>),
    NegatedPropertySet(Rc<[NamedNode]>),
}

impl From<&PropertyPathExpression> for PathPlan {
    fn from(path: &PropertyPathExpression) -> Self {
        match path {
            PropertyPathExpression::NamedNode(p) => Self::Predicate(p.clone()),
            PropertyPathExpression::Reverse(p) => Self::Reverse(Rc::new(p.as_ref().into())),
            PropertyPathExpression::Sequence(a, b) => {
                Self::Sequence(Rc::new(a.as_ref().into()), Rc::new(b.as_ref().into()))
            }
            PropertyPathExpression::Alternative(a, b) => {
                Self::Alternative(Rc::new(a.as_ref().into()), Rc::new(b.as_ref().into()))
            }
            PropertyPathExpression::ZeroOrMore(p) => Self::ZeroOrMore(Rc::new(p.as_ref().into())),
            PropertyPathExpression::OneOrMore(p) => Self::OneOrMore(Rc::new(p.as_ref().into())),
            PropertyPathExpression::ZeroOrOne(p) => Self::ZeroOrOne(Rc::new(p.as_ref().into())),
            PropertyPathExpression::NegatedPropertySet(ps) => {
                Self::NegatedPropertySet(ps.as_slice().into())
            }
        }
    }
}

/// Evaluates property paths in a given graph.
///
/// `eval_closed` checks a path between two terms, `eval_from` and `eval_to` give the reachable
/// terms from a start or to an end and `eval_open` gives all the connected pairs.
struct PathEvaluator<'a, D: TripleSource + ?Sized> {
    dataset: EvalDataset<'a, D>,
    graph: ActiveGraph,
}

impl<D: TripleSource + ?Sized> Clone for PathEvaluator<'_, D> {
    fn clone(&self) -> Self {
        Self {
            dataset: self.dataset.clone(),
            graph: self.graph.clone(),
        }
    }
}

impl<'a, D: TripleSource + ?Sized + 'a> PathEvaluator<'a, D> {
    fn triples(
        &self,
        subject: Option<&Term>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
    ) -> TripleIter<'a> {
        let subject = match subject {
            Some(subject) => match NamedOrBlankNode::try_from(subject.clone()) {
                Ok(subject) => Some(subject),
                Err(_) => return Box::new(empty()),
            },
            None => None,
        };
        self.dataset
            .triples_for_pattern(subject.as_ref(), predicate, object, &self.graph)
    }

    fn eval_closed(
        &self,
        path: &PathPlan,
        start: &Term,
        end: &Term,
    ) -> Result<bool, QueryEvaluationError> {
        match path {
            PathPlan::Predicate(p) => Ok(self
                .triples(Some(start), Some(p), Some(end))
                .next()
                .transpose()?
                .is_some()),
            PathPlan::Reverse(p) => self.eval_closed(p, end, start),
            PathPlan::Sequence(a, b) => {
                for middle in self.eval_from(a, start) {
                    if self.eval_closed(b, &middle?, end)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            PathPlan::Alternative(a, b) => {
                Ok(self.eval_closed(a, start, end)? || self.eval_closed(b, start, end)?)
            }
            PathPlan::ZeroOrMore(p) => {
                if start == end {
                    return Ok(true);
                }
                look_in_transitive_closure(
                    self.eval_from(p, start),
                    |e| self.eval_from(p, &e),
                    end,
                )
            }
            PathPlan::OneOrMore(p) => look_in_transitive_closure(
                self.eval_from(p, start),
                |e| self.eval_from(p, &e),
                end,
            ),
            PathPlan::ZeroOrOne(p) => Ok(start == end || self.eval_closed(p, start, end)?),
            PathPlan::NegatedPropertySet(ps) => {
                for triple in self.triples(Some(start), None, Some(end)) {
                    if !ps.contains(&triple?.predicate) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn eval_from(&self, path: &PathPlan, start: &Term) -> TermIter<'a> {
        match path {
            PathPlan::Predicate(p) => Box::new(
                self.triples(Some(start), Some(p), None)
                    .map(|t| Ok(t?.object)),
            ),
            PathPlan::Reverse(p) => self.eval_to(p, start),
            PathPlan::Sequence(a, b) => {
                let this = self.clone();
                let b = Rc::clone(b);
                Box::new(
                    self.eval_from(a, start)
                        .flat_map(move |middle| -> TermIter<'a> {
                            match middle {
                                Ok(middle) => this.eval_from(&b, &middle),
                                Err(e) => Box::new(once(Err(e))),
                            }
                        }),
                )
            }
            PathPlan::Alternative(a, b) => {
                Box::new(self.eval_from(a, start).chain(self.eval_from(b, start)))
            }
            PathPlan::ZeroOrMore(p) => Box::new(
                transitive_closure(once(Ok(start.clone())), |e| self.eval_from(p, &e))
                    .into_iter(),
            ),
            PathPlan::OneOrMore(p) => Box::new(
                transitive_closure(self.eval_from(p, start), |e| self.eval_from(p, &e))
                    .into_iter(),
            ),
            PathPlan::ZeroOrOne(p) => Box::new(hash_deduplicate(
                once(Ok(start.clone())).chain(self.eval_from(p, start)),
            )),
            PathPlan::NegatedPropertySet(ps) => {
                let ps = Rc::clone(ps);
                Box::new(
                    self.triples(Some(start), None, None)
                        .filter_map(move |t| match t {
                            Ok(t) => (!ps.contains(&t.predicate)).then_some(Ok(t.object)),
                            Err(e) => Some(Err(e)),
                        }),
                )
            }
        }
    }

    fn eval_to(&self, path: &PathPlan, end: &Term) -> TermIter<'a> {
        match path {
            PathPlan::Predicate(p) => Box::new(
                self.triples(None, Some(p), Some(end))
                    .map(|t| Ok(t?.subject.into())),
            ),
            PathPlan::Reverse(p) => self.eval_from(p, end),
            PathPlan::Sequence(a, b) => {
                let this = self.clone();
                let a = Rc::clone(a);
                Box::new(self.eval_to(b, end).flat_map(move |middle| -> TermIter<'a> {
                    match middle {
                        Ok(middle) => this.eval_to(&a, &middle),
                        Err(e) => Box::new(once(Err(e))),
                    }
                }))
            }
            PathPlan::Alternative(a, b) => Box::new(self.eval_to(a, end).chain(self.eval_to(b, end))),
            PathPlan::ZeroOrMore(p) => Box::new(
                transitive_closure(once(Ok(end.clone())), |e| self.eval_to(p, &e)).into_iter(),
            ),
            PathPlan::OneOrMore(p) => Box::new(
                transitive_closure(self.eval_to(p, end), |e| self.eval_to(p, &e)).into_iter(),
            ),
            PathPlan::ZeroOrOne(p) => Box::new(hash_deduplicate(
                once(Ok(end.clone())).chain(self.eval_to(p, end)),
            )),
            PathPlan::NegatedPropertySet(ps) => {
                let ps = Rc::clone(ps);
                Box::new(
                    self.triples(None, None, Some(end))
                        .filter_map(move |t| match t {
                            Ok(t) => (!ps.contains(&t.predicate)).then(|| Ok(t.subject.into())),
                            Err(e) => Some(Err(e)),
                        }),
                )
            }
        }
    }

    fn eval_open(&self, path: &PathPlan) -> TermPairIter<'a> {
        match path {
            PathPlan::Predicate(p) => Box::new(self.triples(None, Some(p), None).map(|t| {
                let t = t?;
                Ok((t.subject.into(), t.object))
            })),
            PathPlan::Reverse(p) => {
                Box::new(self.eval_open(p).map(|pair| pair.map(|(start, end)| (end, start))))
            }
            PathPlan::Sequence(a, b) => {
                let this = self.clone();
                let b = Rc::clone(b);
                Box::new(self.eval_open(a).flat_map(move |pair| -> TermPairIter<'a> {
                    match pair {
                        Ok((start, middle)) => Box::new(
                            this.eval_from(&b, &middle)
                                .map(move |end| Ok((start.clone(), end?))),
                        ),
                        Err(e) => Box::new(once(Err(e))),
                    }
                }))
            }
            PathPlan::Alternative(a, b) => Box::new(self.eval_open(a).chain(self.eval_open(b))),
            PathPlan::ZeroOrMore(p) => {
                let this = self.clone();
                let p = Rc::clone(p);
                Box::new(self.graph_nodes().flat_map(move |start| -> TermPairIter<'a> {
                    match start {
                        Ok(start) => Box::new(
                            transitive_closure(once(Ok(start.clone())), |e| this.eval_from(&p, &e))
                                .into_iter()
                                .map(move |end| Ok((start.clone(), end?))),
                        ),
                        Err(e) => Box::new(once(Err(e))),
                    }
                }))
            }
            PathPlan::OneOrMore(p) => {
                let this = self.clone();
                let p = Rc::clone(p);
                let starts = hash_deduplicate(
                    self.eval_open(&p)
                        .map(|pair| pair.map(|(start, _)| start)),
                );
                Box::new(starts.flat_map(move |start| -> TermPairIter<'a> {
                    match start {
                        Ok(start) => Box::new(
                            transitive_closure(this.eval_from(&p, &start), |e| {
                                this.eval_from(&p, &e)
                            })
                            .into_iter()
                            .map(move |end| Ok((start.clone(), end?))),
                        ),
                        Err(e) => Box::new(once(Err(e))),
                    }
                }))
            }
            PathPlan::ZeroOrOne(p) => Box::new(hash_deduplicate(
                self.graph_nodes()
                    .map(|node| node.map(|node| (node.clone(), node)))
                    .chain(self.eval_open(p)),
            )),
            PathPlan::NegatedPropertySet(ps) => {
                let ps = Rc::clone(ps);
                Box::new(self.triples(None, None, None).filter_map(move |t| match t {
                    Ok(t) => (!ps.contains(&t.predicate)).then(|| Ok((t.subject.into(), t.object))),
                    Err(e) => Some(Err(e)),
                }))
            }
        }
    }

    /// The subjects and objects of the graph, the start and end of zero length paths.
    fn graph_nodes(&self) -> TermIter<'a> {
        Box::new(hash_deduplicate(self.triples(None, None, None).flat_map(
            |t| -> Vec<Result<Term, QueryEvaluationError>> {
                match t {
                    Ok(t) => vec![Ok(t.subject.into()), Ok(t.object)],
                    Err(e) => vec![Err(e)],
                }
            },
        )))
    }
}

/// All the elements reachable from `start` by repeatedly calling `next`, without duplicates.
fn transitive_closure<T: Clone + Eq + Hash, E, NI: Iterator<Item = Result<T, E>>>(
    start: impl IntoIterator<Item = Result<T, E>>,
    mut next: impl FnMut(T) -> NI,
) -> Vec<Result<T, E>> {
    let mut errors = Vec::new();
    let mut todo = start
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(e) => {
                errors.push(e);
                None
            }
        })
        .collect::<Vec<_>>();
    let mut all = todo.iter().cloned().collect::<FxHashSet<_>>();
    while let Some(e) = todo.pop() {
        for e in next(e) {
            match e {
                Ok(e) => {
                    if all.insert(e.clone()) {
                        todo.push(e)
                    }
                }
                Err(e) => errors.push(e),
            }
        }
    }
    errors
        .into_iter()
        .map(Err)
        .chain(all.into_iter().map(Ok))
        .collect()
}

fn look_in_transitive_closure<T: Clone + Eq + Hash, E, NI: Iterator<Item = Result<T, E>>>(
    start: impl IntoIterator<Item = Result<T, E>>,
    mut next: impl FnMut(T) -> NI,
    target: &T,
) -> Result<bool, E> {
    let mut todo = start.into_iter().collect::<Result<Vec<_>, _>>()?;
    let mut all = todo.iter().cloned().collect::<FxHashSet<_>>();
    while let Some(e) = todo.pop() {
        if e == *target {
            return Ok(true);
        }
        for e in next(e) {
            let e = e?;
            if all.insert(e.clone()) {
                todo.push(e);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdfterm::{Dataset, GraphName, Literal, Quad};
    use sparalgebra::algebra::QueryDataset;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn evaluator(dataset: &Dataset) -> SimpleEvaluator<'_, Dataset> {
        SimpleEvaluator::new(
            EvalDataset::new(dataset, None::<&QueryDataset>, false),
            QueryContext::new(None, None),
            Rc::default(),
            Rc::default(),
        )
    }

    fn chain() -> Dataset {
        [("a", "b"), ("b", "c"), ("c", "a"), ("c", "d")]
            .into_iter()
            .map(|(s, o)| Quad::new(ex(s), ex("p"), ex(o), GraphName::DefaultGraph))
            .collect()
    }

    fn path_evaluator(dataset: &Dataset) -> PathEvaluator<'_, Dataset> {
        PathEvaluator {
            dataset: EvalDataset::new(dataset, None, false),
            graph: ActiveGraph::Default,
        }
    }

    #[test]
    fn test_transitive_closure_with_cycle() {
        let dataset = chain();
        let eval = path_evaluator(&dataset);
        let path = PathPlan::OneOrMore(Rc::new(PathPlan::Predicate(ex("p"))));
        let mut reached = eval
            .eval_from(&path, &ex("a").into())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        reached.sort();
        assert_eq!(
            reached,
            vec![ex("a").into(), ex("b").into(), ex("c").into(), ex("d").into()]
        );
        assert!(
            eval.eval_closed(&path, &ex("d").into(), &ex("a").into())
                .is_ok_and(|found| !found)
        );
        let zero_or_more = PathPlan::ZeroOrMore(Rc::new(PathPlan::Predicate(ex("p"))));
        assert!(
            eval.eval_closed(&zero_or_more, &ex("z").into(), &ex("z").into())
                .unwrap()
        );
    }

    #[test]
    fn test_sequence_and_reverse() {
        let dataset = chain();
        let eval = path_evaluator(&dataset);
        let p = Rc::new(PathPlan::Predicate(ex("p")));
        let path = PathPlan::Sequence(Rc::clone(&p), Rc::new(PathPlan::Reverse(p)));
        let mut reached = eval
            .eval_from(&path, &ex("b").into())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        reached.sort();
        // b -> c <- b
        assert_eq!(reached, vec![ex("b").into()]);
        assert_eq!(eval.eval_open(&path).count(), 4);
    }

    #[test]
    fn test_bgp_with_repeated_variable() {
        let dataset: Dataset = [
            Quad::new(ex("a"), ex("p"), ex("a"), GraphName::DefaultGraph),
            Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph),
        ]
        .into_iter()
        .collect();
        let x = Variable::new_unchecked("x");
        let pattern = GraphPattern::Bgp {
            patterns: vec![TriplePattern {
                subject: x.clone().into(),
                predicate: ex("p").into(),
                object: x.clone().into(),
            }],
        };
        let solutions = evaluator(&dataset)
            .evaluate_select(&pattern, [])
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0][&x], ex("a").into());
    }

    #[test]
    fn test_literal_subject_matches_nothing() {
        let dataset = chain();
        let x = Variable::new_unchecked("x");
        let pattern = GraphPattern::Bgp {
            patterns: vec![TriplePattern {
                subject: x.clone().into(),
                predicate: ex("p").into(),
                object: Variable::new_unchecked("o").into(),
            }],
        };
        let solutions = evaluator(&dataset)
            .evaluate_select(&pattern, [(x, Literal::from(1).into())])
            .unwrap()
            .count();
        assert_eq!(solutions, 0);
    }
}
