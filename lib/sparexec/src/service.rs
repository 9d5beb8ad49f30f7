use crate::{QueryEvaluationError, QuerySolutionIter};
use rdfterm::NamedNode;
use sparalgebra::Query;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

/// The answer of a SERVICE endpoint.
pub enum ServiceResponse {
    /// The solutions of the sent query
    Solutions(QuerySolutionIter<'static>),
    /// The endpoint failed with the given [HTTP-like status code](https://www.rfc-editor.org/rfc/rfc9110#section-15).
    Failure { status: u16 },
}

/// Answers the SERVICE calls to one endpoint.
///
/// Register it with [`QueryEvaluator::with_service_handler`](super::QueryEvaluator::with_service_handler).
/// It receives a `SELECT REDUCED *` query built from the service pattern,
/// the [`Display`](std::fmt::Display) implementation of [`Query`] gives the SPARQL text to send.
///
/// ```
/// use rdfterm::{Dataset, Literal, NamedNode, Variable};
/// use sparalgebra::algebra::GraphPattern;
/// use sparalgebra::term::{NamedNodePattern, TriplePattern};
/// use sparalgebra::Query;
/// use sparexec::{QueryEvaluator, QueryResults, QuerySolution, QuerySolutionIter, ServiceHandler, ServiceResponse};
/// use std::convert::Infallible;
/// use std::iter::once;
/// use std::sync::Arc;
///
/// struct ConstantService;
///
/// impl ServiceHandler for ConstantService {
///     type Error = Infallible;
///
///     fn handle(&self, _query: &Query) -> Result<ServiceResponse, Self::Error> {
///         let variables: Arc<[Variable]> = [Variable::new_unchecked("foo")].into();
///         Ok(ServiceResponse::Solutions(QuerySolutionIter::new(
///             Arc::clone(&variables),
///             once(Ok(QuerySolution::from((
///                 variables,
///                 vec![Some(Literal::from(1).into())],
///             )))),
///         )))
///     }
/// }
///
/// let service = NamedNode::new("http://example.com/service")?;
/// let evaluator = QueryEvaluator::default().with_service_handler(service.clone(), ConstantService);
/// let query = Query::Select {
///     dataset: None,
///     pattern: GraphPattern::Service {
///         name: NamedNodePattern::NamedNode(service.clone()),
///         inner: Box::new(GraphPattern::Bgp {
///             patterns: vec![TriplePattern::new(Variable::new("foo")?, service.clone(), service)],
///         }),
///         silent: false,
///     },
///     base_iri: None,
/// };
/// if let QueryResults::Solutions(mut solutions) = evaluator.execute(&Dataset::new(), &query)? {
///     assert_eq!(
///         solutions.next().unwrap()?.get("foo"),
///         Some(&Literal::from(1).into())
///     );
/// }
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait ServiceHandler: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    fn handle(&self, query: &Query) -> Result<ServiceResponse, Self::Error>;
}

/// Answers the SERVICE calls to the endpoints without a dedicated [`ServiceHandler`].
///
/// Register it with [`QueryEvaluator::with_default_service_handler`](super::QueryEvaluator::with_default_service_handler).
pub trait DefaultServiceHandler: Send + Sync {
    type Error: Error + Send + Sync + 'static;

    fn handle(
        &self,
        service_name: &NamedNode,
        query: &Query,
    ) -> Result<ServiceResponse, Self::Error>;
}

type ServiceCall =
    Arc<dyn Fn(&NamedNode, &Query) -> Result<ServiceResponse, QueryEvaluationError> + Send + Sync>;

/// The handlers known by an evaluator, with their errors erased to [`QueryEvaluationError`].
#[derive(Clone, Default)]
pub struct ServiceHandlerRegistry {
    by_name: HashMap<NamedNode, ServiceCall>,
    fallback: Option<ServiceCall>,
}

impl ServiceHandlerRegistry {
    pub fn with_handler(
        mut self,
        service_name: NamedNode,
        handler: impl ServiceHandler + 'static,
    ) -> Self {
        let call: ServiceCall = Arc::new(move |_: &NamedNode, query: &Query| {
            handler.handle(query).map_err(into_evaluation_error)
        });
        self.by_name.insert(service_name, call);
        self
    }

    pub fn with_default_handler(mut self, handler: impl DefaultServiceHandler + 'static) -> Self {
        self.fallback = Some(Arc::new(move |service_name: &NamedNode, query: &Query| {
            handler
                .handle(service_name, query)
                .map_err(into_evaluation_error)
        }));
        self
    }

    /// Calls the service, a failure status is turned into an error.
    pub fn handle(
        &self,
        service_name: &NamedNode,
        query: &Query,
    ) -> Result<QuerySolutionIter<'static>, QueryEvaluationError> {
        let call = self
            .by_name
            .get(service_name)
            .or(self.fallback.as_ref())
            .ok_or_else(|| QueryEvaluationError::UnsupportedService(service_name.clone()))?;
        match call(service_name, query)? {
            ServiceResponse::Solutions(solutions) => Ok(solutions),
            ServiceResponse::Failure { status } => Err(QueryEvaluationError::ServiceStatus {
                service: service_name.clone(),
                status,
            }),
        }
    }
}

/// Handlers may return a [`QueryEvaluationError`] themselves, it is kept as is.
fn into_evaluation_error(error: impl Error + Send + Sync + 'static) -> QueryEvaluationError {
    let error: Box<dyn Error + Send + Sync> = Box::new(error);
    error
        .downcast::<QueryEvaluationError>()
        .map_or_else(QueryEvaluationError::Service, |error| *error)
}
