use rdfterm::{Dataset, GraphName, Literal, NamedNode, Quad, Variable};
use sparalgebra::ast::{
    self, GroupPatternElement, Iri, SelectClause, TriplesPattern, VarOrIri, VarOrTerm, Verb,
};
use sparalgebra::{Query, QueryTranslator};
use sparexec::{
    DefaultServiceHandler, QueryEvaluationError, QueryEvaluator, QueryResults, QuerySolution,
    QuerySolutionIter, ServiceHandler, ServiceResponse,
};
use std::error::Error;
use std::sync::{Arc, Mutex};

const EX: &str = "http://example.com/";

fn ex(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{EX}{local}"))
}

fn triple(subject: &str, predicate: &str, object: &str) -> TriplesPattern {
    let term = |name: &str| {
        if let Some(name) = name.strip_prefix('?') {
            VarOrTerm::var(name)
        } else {
            VarOrTerm::Iri(Iri::prefixed("ex", name))
        }
    };
    TriplesPattern {
        subject: term(subject),
        verb: Verb::Path(ast::Path::Iri(Iri::prefixed("ex", predicate))),
        object: term(object),
    }
}

/// `SELECT * { ?s ex:knows ?o SERVICE <name> { ?o ex:name ?n } }`
fn federated_query(name: VarOrIri, silent: bool) -> Result<Query, Box<dyn Error>> {
    Ok(QueryTranslator::new()
        .with_prefix("ex", EX)?
        .translate(&ast::Query::Select {
            prologue: ast::Prologue::default(),
            select: SelectClause::all(),
            dataset: Vec::new(),
            pattern: vec![
                GroupPatternElement::Triples(vec![triple("?s", "knows", "?o")]),
                GroupPatternElement::Service {
                    name,
                    silent,
                    pattern: vec![GroupPatternElement::Triples(vec![triple(
                        "?o", "name", "?n",
                    )])],
                },
            ],
            modifiers: ast::SolutionModifiers::default(),
            values: None,
        })?)
}

fn local_dataset() -> Dataset {
    [Quad::new(ex("a"), ex("knows"), ex("b"), GraphName::DefaultGraph)]
        .into_iter()
        .collect()
}

fn collect(
    results: Result<QueryResults<'_>, QueryEvaluationError>,
) -> Result<Vec<QuerySolution>, QueryEvaluationError> {
    match results? {
        QueryResults::Solutions(solutions) => solutions.collect(),
        _ => Ok(Vec::new()),
    }
}

/// Evaluates the received queries against its own dataset and records them.
#[derive(Clone)]
struct DatasetService {
    dataset: Arc<Dataset>,
    received: Arc<Mutex<Vec<String>>>,
}

impl DatasetService {
    fn new() -> Self {
        Self {
            dataset: Arc::new(
                [
                    Quad::new(ex("b"), ex("name"), Literal::from("Bob"), GraphName::DefaultGraph),
                    Quad::new(
                        ex("c"),
                        ex("name"),
                        Literal::from("Carol"),
                        GraphName::DefaultGraph,
                    ),
                ]
                .into_iter()
                .collect(),
            ),
            received: Arc::default(),
        }
    }

    fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }
}

impl ServiceHandler for DatasetService {
    type Error = QueryEvaluationError;

    fn handle(&self, query: &Query) -> Result<ServiceResponse, Self::Error> {
        if let Ok(mut received) = self.received.lock() {
            received.push(query.to_string());
        }
        let QueryResults::Solutions(solutions) = QueryEvaluator::new().execute(&*self.dataset, query)?
        else {
            return Ok(ServiceResponse::Failure { status: 400 });
        };
        let variables: Arc<[Variable]> = solutions.variables().into();
        let solutions = solutions.collect::<Vec<_>>();
        Ok(ServiceResponse::Solutions(QuerySolutionIter::new(
            variables, solutions,
        )))
    }
}

struct UnavailableService;

impl DefaultServiceHandler for UnavailableService {
    type Error = QueryEvaluationError;

    fn handle(&self, _: &NamedNode, _: &Query) -> Result<ServiceResponse, Self::Error> {
        Ok(ServiceResponse::Failure { status: 503 })
    }
}

#[test]
fn test_service_receives_bound_values() -> Result<(), Box<dyn Error>> {
    let service = DatasetService::new();
    let evaluator = QueryEvaluator::new().with_service_handler(ex("remote"), service.clone());
    let solutions = collect(evaluator.execute(
        &local_dataset(),
        &federated_query(VarOrIri::Iri(Iri::prefixed("ex", "remote")), false)?,
    ))?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0]["n"], Literal::from("Bob").into());
    assert_eq!(solutions[0]["s"], ex("a").into());

    let received = service.received();
    assert_eq!(received.len(), 1);
    assert!(received[0].contains("VALUES"), "{}", received[0]);
    assert!(received[0].contains("<http://example.com/b>"), "{}", received[0]);
    Ok(())
}

#[test]
fn test_service_name_from_variable() -> Result<(), Box<dyn Error>> {
    let evaluator =
        QueryEvaluator::new().with_service_handler(ex("remote"), DatasetService::new());
    let query = federated_query(VarOrIri::Var("service".into()), false)?;
    let solutions = collect(evaluator.execute_with_substituted_variables(
        &local_dataset(),
        &query,
        [(Variable::new("service")?, ex("remote").into())],
    ))?;
    assert_eq!(solutions.len(), 1);

    assert!(matches!(
        collect(evaluator.execute(&local_dataset(), &query)),
        Err(QueryEvaluationError::UnboundService)
    ));
    assert!(matches!(
        collect(evaluator.execute_with_substituted_variables(
            &local_dataset(),
            &query,
            [(Variable::new("service")?, Literal::from(1).into())],
        )),
        Err(QueryEvaluationError::InvalidServiceName(_))
    ));
    Ok(())
}

#[test]
fn test_unknown_service() -> Result<(), Box<dyn Error>> {
    let result = collect(QueryEvaluator::new().execute(
        &local_dataset(),
        &federated_query(VarOrIri::Iri(Iri::prefixed("ex", "remote")), false)?,
    ));
    assert!(matches!(
        result,
        Err(QueryEvaluationError::UnsupportedService(name)) if name == ex("remote")
    ));
    Ok(())
}

#[test]
fn test_failure_status() -> Result<(), Box<dyn Error>> {
    let evaluator = QueryEvaluator::new().with_default_service_handler(UnavailableService);
    let result = collect(evaluator.execute(
        &local_dataset(),
        &federated_query(VarOrIri::Iri(Iri::prefixed("ex", "remote")), false)?,
    ));
    assert!(matches!(
        result,
        Err(QueryEvaluationError::ServiceStatus { status: 503, .. })
    ));
    Ok(())
}

#[test]
fn test_silent_service_keeps_solutions() -> Result<(), Box<dyn Error>> {
    let evaluator = QueryEvaluator::new().with_default_service_handler(UnavailableService);
    let solutions = collect(evaluator.execute(
        &local_dataset(),
        &federated_query(VarOrIri::Iri(Iri::prefixed("ex", "remote")), true)?,
    ))?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("n"), None);
    assert_eq!(solutions[0]["o"], ex("b").into());
    Ok(())
}

#[test]
fn test_explicit_handler_has_priority() -> Result<(), Box<dyn Error>> {
    let evaluator = QueryEvaluator::new()
        .with_default_service_handler(UnavailableService)
        .with_service_handler(ex("remote"), DatasetService::new());
    let solutions = collect(evaluator.execute(
        &local_dataset(),
        &federated_query(VarOrIri::Iri(Iri::prefixed("ex", "remote")), false)?,
    ))?;
    assert_eq!(solutions.len(), 1);
    Ok(())
}
