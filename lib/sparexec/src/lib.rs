#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod aggregate;
mod binding;
mod context;
mod dataset;
mod error;
mod eval;
pub mod expression;
mod model;
mod service;
mod term;
mod update;

pub use crate::dataset::{MutableTripleSource, TripleSource};
pub use crate::error::{ExpressionError, QueryEvaluationError};
pub use crate::model::{
    QueryResults, QuerySolution, QuerySolutionIter, QueryTripleIter, VariableSolutionIndex,
};
pub use crate::service::{DefaultServiceHandler, ServiceHandler, ServiceResponse};
pub use crate::term::ExpressionTerm;
use crate::context::{CustomFunctionRegistry, QueryContext};
use crate::dataset::EvalDataset;
use crate::eval::SimpleEvaluator;
use crate::service::ServiceHandlerRegistry;
use crate::update::SimpleUpdateEvaluator;
use oxiri::{Iri, IriParseError};
use oxsdatatypes::DateTime;
use rdfterm::{Dataset, NamedNode, Term, Variable};
use sparalgebra::algebra::Expression;
use sparalgebra::{Query, Update};
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Evaluates a query against a given [RDF dataset](https://www.w3.org/TR/rdf11-concepts/#dfn-rdf-dataset)
///
/// The `FROM` and `FROM NAMED` clauses of the query select the graphs of the dataset, nothing is loaded from the web.
///
/// To adapt this software to work on your own RDF dataset, you need to implement the [`TripleSource`] trait.
///
/// ```
/// use rdfterm::{Dataset, GraphName, NamedNode, Quad};
/// use sparalgebra::QueryTranslator;
/// use sparalgebra::ast::{self, GroupPatternElement, SelectClause, TriplesPattern, VarOrTerm, Verb};
/// use sparexec::{QueryEvaluator, QueryResults};
///
/// let ex = NamedNode::new("http://example.com")?;
/// let dataset = Dataset::from_iter([Quad::new(
///     ex.clone(),
///     ex.clone(),
///     ex.clone(),
///     GraphName::DefaultGraph,
/// )]);
/// let query = QueryTranslator::new().translate(&ast::Query::Select {
///     prologue: ast::Prologue::default(),
///     select: SelectClause::all(),
///     dataset: Vec::new(),
///     pattern: vec![GroupPatternElement::Triples(vec![TriplesPattern {
///         subject: VarOrTerm::var("s"),
///         verb: Verb::Var("p".into()),
///         object: VarOrTerm::var("o"),
///     }])],
///     modifiers: ast::SolutionModifiers::default(),
///     values: None,
/// })?;
/// if let QueryResults::Solutions(solutions) = QueryEvaluator::new().execute(&dataset, &query)? {
///     let solutions = solutions.collect::<Result<Vec<_>, _>>()?;
///     assert_eq!(solutions.len(), 1);
///     assert_eq!(solutions[0]["s"], ex.into());
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct QueryEvaluator {
    service_handler: ServiceHandlerRegistry,
    custom_functions: CustomFunctionRegistry,
    default_graph_as_union: bool,
    initial_bindings: Vec<(Variable, Term)>,
    now: Option<DateTime>,
    base_iri: Option<Arc<Iri<String>>>,
}

impl QueryEvaluator {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execute<'a, D: TripleSource + ?Sized>(
        &self,
        dataset: &'a D,
        query: &Query,
    ) -> Result<QueryResults<'a>, QueryEvaluationError> {
        self.execute_with_substituted_variables(dataset, query, [])
    }

    /// Executes a query with some variables already bound.
    ///
    /// The substitutions are added to the ones given with [`QueryEvaluator::with_initial_binding`].
    /// A variable bound twice to different values is an [`AlreadyBound`](QueryEvaluationError::AlreadyBound) error.
    pub fn execute_with_substituted_variables<'a, D: TripleSource + ?Sized>(
        &self,
        dataset: &'a D,
        query: &Query,
        substitutions: impl IntoIterator<Item = (Variable, Term)>,
    ) -> Result<QueryResults<'a>, QueryEvaluationError> {
        let evaluator = self.evaluator(
            EvalDataset::new(dataset, query.dataset(), self.default_graph_as_union),
            query.base_iri(),
        );
        let substitutions = self.initial_bindings.iter().cloned().chain(substitutions);
        Ok(match query {
            Query::Select { pattern, .. } => {
                evaluator.evaluate_select(pattern, substitutions)?.into()
            }
            Query::Ask { pattern, .. } => evaluator.evaluate_ask(pattern, substitutions)?.into(),
            Query::Construct {
                template, pattern, ..
            } => evaluator
                .evaluate_construct(pattern, template, substitutions)?
                .into(),
            Query::Describe { pattern, .. } => {
                evaluator.evaluate_describe(pattern, substitutions)?.into()
            }
        })
    }

    /// Applies a [SPARQL update](https://www.w3.org/TR/sparql11-update/) to a dataset.
    ///
    /// The operations are applied in order. If one fails, the changes of the previous ones are kept.
    ///
    /// ```
    /// use rdfterm::{Dataset, GraphName, Literal, NamedNode, Quad};
    /// use sparalgebra::{GraphUpdateOperation, Update};
    /// use sparexec::QueryEvaluator;
    ///
    /// let ex = NamedNode::new("http://example.com")?;
    /// let quad = Quad::new(ex.clone(), ex.clone(), Literal::from(1), GraphName::DefaultGraph);
    /// let mut dataset = Dataset::new();
    /// QueryEvaluator::new().execute_update(
    ///     &mut dataset,
    ///     &Update {
    ///         base_iri: None,
    ///         operations: vec![GraphUpdateOperation::InsertData { data: vec![quad.clone()] }],
    ///     },
    /// )?;
    /// assert!(dataset.contains(&quad));
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn execute_update<D: MutableTripleSource + ?Sized>(
        &self,
        dataset: &mut D,
        update: &Update,
    ) -> Result<(), QueryEvaluationError> {
        debug!(algebra = %update.to_sse(), "executing update");
        SimpleUpdateEvaluator {
            dataset,
            base_iri: self.base_iri.clone(),
            now: self.now,
            default_graph_as_union: self.default_graph_as_union,
            service_handler: Rc::new(self.service_handler.clone()),
            custom_functions: Rc::new(self.custom_functions.clone()),
        }
        .eval_all(update)
    }

    /// Evaluates a single expression against an empty dataset.
    ///
    /// Contrary to the expressions inside of queries, the errors are returned.
    ///
    /// ```
    /// use rdfterm::{Literal, Variable};
    /// use sparalgebra::algebra::Expression;
    /// use sparexec::QueryEvaluator;
    ///
    /// let x = Variable::new("x")?;
    /// let result = QueryEvaluator::new().evaluate_expression(
    ///     &Expression::Add(
    ///         Box::new(Expression::Variable(x.clone())),
    ///         Box::new(Expression::Literal(Literal::from(1))),
    ///     ),
    ///     [(x, Literal::from(2).into())],
    /// )?;
    /// assert_eq!(result, Literal::from(3).into());
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn evaluate_expression(
        &self,
        expression: &Expression,
        substitutions: impl IntoIterator<Item = (Variable, Term)>,
    ) -> Result<Term, QueryEvaluationError> {
        let dataset = Dataset::new();
        self.evaluator(EvalDataset::new(&dataset, None, false), None)
            .evaluate_expression(
                expression,
                self.initial_bindings.iter().cloned().chain(substitutions),
            )
    }

    fn evaluator<'a, D: TripleSource + ?Sized + 'a>(
        &self,
        dataset: EvalDataset<'a, D>,
        base_iri: Option<&Iri<String>>,
    ) -> SimpleEvaluator<'a, D> {
        let base_iri = base_iri
            .map(|iri| Arc::new(iri.clone()))
            .or_else(|| self.base_iri.clone());
        SimpleEvaluator::new(
            dataset,
            QueryContext::new(self.now, base_iri),
            Rc::new(self.service_handler.clone()),
            Rc::new(self.custom_functions.clone()),
        )
    }

    /// The default graph is the union of all the graphs of the dataset when the query has no `FROM` clause.
    #[inline]
    #[must_use]
    pub fn with_default_graph_as_union(mut self) -> Self {
        self.default_graph_as_union = true;
        self
    }

    /// Use a given [`ServiceHandler`] to execute [SPARQL 1.1 Federated Query](https://www.w3.org/TR/sparql11-federated-query/) SERVICE calls.
    ///
    /// See [`ServiceHandler`] for an example.
    #[inline]
    #[must_use]
    pub fn with_service_handler(
        mut self,
        service_name: impl Into<NamedNode>,
        handler: impl ServiceHandler + 'static,
    ) -> Self {
        self.service_handler = self
            .service_handler
            .with_handler(service_name.into(), handler);
        self
    }

    /// Use a given [`DefaultServiceHandler`] to execute [SPARQL 1.1 Federated Query](https://www.w3.org/TR/sparql11-federated-query/) SERVICE calls if no explicit service handler is defined for the service.
    #[inline]
    #[must_use]
    pub fn with_default_service_handler(
        mut self,
        handler: impl DefaultServiceHandler + 'static,
    ) -> Self {
        self.service_handler = self.service_handler.with_default_handler(handler);
        self
    }

    /// Binds a variable before any evaluation.
    #[inline]
    #[must_use]
    pub fn with_initial_binding(mut self, variable: Variable, value: impl Into<Term>) -> Self {
        self.initial_bindings.push((variable, value.into()));
        self
    }

    /// Sets the value returned by `NOW()`, the current time by default.
    #[inline]
    #[must_use]
    pub fn with_now(mut self, now: DateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Sets the base IRI used by `IRI()` if the query does not have one.
    #[inline]
    pub fn with_base_iri(mut self, base_iri: impl Into<String>) -> Result<Self, IriParseError> {
        self.base_iri = Some(Arc::new(Iri::parse(base_iri.into())?));
        Ok(self)
    }

    /// Adds a custom SPARQL evaluation function.
    ///
    /// If the function returns `None` the evaluation of the expression fails.
    ///
    /// Example with a function serializing terms to N-Triples:
    /// ```
    /// use rdfterm::{Literal, NamedNode};
    /// use sparalgebra::algebra::{Expression, Function};
    /// use sparexec::QueryEvaluator;
    ///
    /// let nt = NamedNode::new("http://www.w3.org/ns/formats/N-Triples")?;
    /// let evaluator = QueryEvaluator::new().with_custom_function(nt.clone(), |args| {
    ///     args.first().map(|t| Literal::from(t.to_string()).into())
    /// });
    /// assert_eq!(
    ///     evaluator.evaluate_expression(
    ///         &Expression::FunctionCall(
    ///             Function::Custom(nt),
    ///             vec![Expression::Literal(Literal::from(1))]
    ///         ),
    ///         []
    ///     )?,
    ///     Literal::from("\"1\"^^<http://www.w3.org/2001/XMLSchema#integer>").into()
    /// );
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    #[inline]
    #[must_use]
    pub fn with_custom_function(
        mut self,
        name: NamedNode,
        evaluator: impl Fn(&[Term]) -> Option<Term> + Send + Sync + 'static,
    ) -> Self {
        self.custom_functions.insert(name, Arc::new(evaluator));
        self
    }
}
