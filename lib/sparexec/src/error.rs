use rdfterm::{NamedNode, Term, Variable};
use std::convert::Infallible;
use std::error::Error;

/// A SPARQL evaluation error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryEvaluationError {
    /// Error from the underlying RDF dataset
    #[error(transparent)]
    Dataset(Box<dyn Error + Send + Sync>),
    /// Error during `SERVICE` evaluation
    #[error("{0}")]
    Service(#[source] Box<dyn Error + Send + Sync>),
    /// The `SERVICE` answered with a non-success status
    #[error("The service {service} answered with status {status}")]
    ServiceStatus { service: NamedNode, status: u16 },
    /// The variable storing the `SERVICE` name is unbound
    #[error("The variable encoding the service name is unbound")]
    UnboundService,
    /// Invalid service name
    #[error("{0} is not a valid service name")]
    InvalidServiceName(Term),
    /// The given `SERVICE` is not supported
    #[error("The service {0} is not supported")]
    UnsupportedService(NamedNode),
    /// A substituted variable is already bound to another value
    #[error("The variable {0} is already bound to an other value")]
    AlreadyBound(Variable),
    /// `LOAD` is not supported by this evaluator
    #[error("Loading {0} is not supported")]
    UnsupportedLoad(NamedNode),
    /// `CREATE` of an existing graph without `SILENT`
    #[error("The graph {0} already exists")]
    GraphAlreadyExists(NamedNode),
    /// `CLEAR` or `DROP` of a missing graph without `SILENT`
    #[error("The graph {0} does not exist")]
    GraphDoesNotExist(NamedNode),
    /// Error raised by [`QueryEvaluator::evaluate_expression`](super::QueryEvaluator::evaluate_expression)
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[doc(hidden)]
    #[error(transparent)]
    Unexpected(Box<dyn Error + Send + Sync>),
}

impl From<Infallible> for QueryEvaluationError {
    #[inline]
    fn from(error: Infallible) -> Self {
        match error {}
    }
}

/// An error raised while evaluating an expression.
///
/// Inside a query it is recovered from: a failing `FILTER` drops the solution and a failing `BIND` leaves its variable unbound.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExpressionError {
    #[error("The variable {0} is not bound")]
    NotBound(Variable),
    #[error("Type error: {0}")]
    Type(&'static str),
    #[error("The function {0} is not supported")]
    UnknownFunction(NamedNode),
    #[error("Arithmetic error: {0}")]
    Arithmetic(&'static str),
    /// The evaluation of an `EXISTS` pattern failed
    #[error(transparent)]
    Evaluation(Box<QueryEvaluationError>),
}
