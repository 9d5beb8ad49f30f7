use rdfterm::{
    BlankNode, Dataset, GraphName, Literal, NamedNode, NamedOrBlankNode, Quad, Term, Triple,
    Variable,
};
use sparalgebra::algebra::{Expression, GraphPattern, PropertyPathExpression};
use sparalgebra::ast::{
    self, DatasetClause, GroupCondition, GroupPatternElement, Iri, OrderCondition, SelectClause,
    SelectItem, TriplesPattern, ValuesClause, VarOrIri, VarOrTerm, Verb,
};
use sparalgebra::term::{NamedNodePattern, TriplePattern};
use sparalgebra::{Query, QueryTranslator};
use sparexec::{QueryEvaluationError, QueryEvaluator, QueryResults, QuerySolution};
use std::error::Error;

const EX: &str = "http://example.com/";

fn ex(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{EX}{local}"))
}

fn iri(local: &str) -> VarOrTerm {
    VarOrTerm::Iri(Iri::prefixed("ex", local))
}

fn v(name: &str) -> VarOrTerm {
    VarOrTerm::var(name)
}

fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

fn integer(value: i64) -> ast::Expression {
    ast::Expression::Literal(ast::Literal::integer(value))
}

fn triple(subject: VarOrTerm, predicate: &str, object: VarOrTerm) -> TriplesPattern {
    TriplesPattern {
        subject,
        verb: Verb::Path(ast::Path::Iri(Iri::prefixed("ex", predicate))),
        object,
    }
}

fn triples(triples: impl IntoIterator<Item = TriplesPattern>) -> GroupPatternElement {
    GroupPatternElement::Triples(triples.into_iter().collect())
}

fn dataset(triples: &[(&str, &str, &str)]) -> Dataset {
    triples
        .iter()
        .map(|(s, p, o)| Quad::new(ex(s), ex(p), ex(o), GraphName::DefaultGraph))
        .collect()
}

fn translate(query: &ast::Query) -> Query {
    QueryTranslator::new()
        .with_prefix("ex", EX)
        .unwrap()
        .translate(query)
        .unwrap()
}

fn select(
    select: SelectClause,
    pattern: Vec<GroupPatternElement>,
    modifiers: ast::SolutionModifiers,
) -> Query {
    translate(&ast::Query::Select {
        prologue: ast::Prologue::default(),
        select,
        dataset: Vec::new(),
        pattern,
        modifiers,
        values: None,
    })
}

fn solutions(results: QueryResults<'_>) -> Result<Vec<QuerySolution>, Box<dyn Error>> {
    let QueryResults::Solutions(solutions) = results else {
        return Err("solutions expected".into());
    };
    Ok(solutions.collect::<Result<Vec<_>, _>>()?)
}

fn run(dataset: &Dataset, query: &Query) -> Result<Vec<QuerySolution>, Box<dyn Error>> {
    solutions(QueryEvaluator::new().execute(dataset, query)?)
}

/// Runs a bare algebra pattern as `SELECT *`.
fn run_pattern(
    dataset: &Dataset,
    pattern: GraphPattern,
) -> Result<Vec<QuerySolution>, Box<dyn Error>> {
    run(
        dataset,
        &Query::Select {
            dataset: None,
            pattern,
            base_iri: None,
        },
    )
}

/// The solutions as sorted rows of the given variables, for order independent comparisons.
fn rows(solutions: &[QuerySolution], variables: &[&str]) -> Vec<Vec<Option<Term>>> {
    let mut rows = solutions
        .iter()
        .map(|s| variables.iter().map(|v| s.get(*v).cloned()).collect())
        .collect::<Vec<_>>();
    rows.sort();
    rows
}

fn triple_pattern(subject: &str, predicate: &str, object: &str) -> TriplePattern {
    let term = |name: &str| -> sparalgebra::term::TermPattern {
        if let Some(name) = name.strip_prefix('?') {
            var(name).into()
        } else {
            ex(name).into()
        }
    };
    TriplePattern {
        subject: term(subject),
        predicate: ex(predicate).into(),
        object: term(object),
    }
}

fn bgp(patterns: impl IntoIterator<Item = TriplePattern>) -> GraphPattern {
    GraphPattern::Bgp {
        patterns: patterns.into_iter().collect(),
    }
}

#[test]
fn test_single_triple_pattern() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b")]);
    let solutions = run(
        &dataset,
        &select(
            SelectClause::vars(["o"]),
            vec![triples([triple(iri("a"), "p", v("o"))])],
            ast::SolutionModifiers::default(),
        ),
    )?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0]["o"], ex("b").into());
    assert_eq!(solutions[0].len(), 1);
    Ok(())
}

#[test]
fn test_optional_without_match_keeps_rows() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "knows", "b"), ("a", "knows", "c")]);
    let solutions = run(
        &dataset,
        &select(
            SelectClause::all(),
            vec![
                triples([triple(iri("a"), "knows", v("x"))]),
                GroupPatternElement::Optional(vec![triples([triple(v("x"), "age", v("age"))])]),
            ],
            ast::SolutionModifiers::default(),
        ),
    )?;
    assert_eq!(solutions.len(), 2);
    assert!(solutions.iter().all(|s| s.get("age").is_none()));
    Ok(())
}

#[test]
fn test_sum_of_inline_values() -> Result<(), Box<dyn Error>> {
    let solutions = run(
        &Dataset::new(),
        &select(
            SelectClause {
                projection: vec![SelectItem::Expression {
                    expression: ast::Expression::aggregate(
                        "SUM",
                        false,
                        Some(ast::Expression::var("n")),
                    ),
                    variable: "total".into(),
                }],
                ..SelectClause::default()
            },
            vec![GroupPatternElement::Values(ValuesClause {
                variables: vec!["n".into()],
                rows: (1..=3)
                    .map(|i| vec![Some(VarOrTerm::Literal(ast::Literal::integer(i)))])
                    .collect(),
            })],
            ast::SolutionModifiers::default(),
        ),
    )?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0]["total"], Literal::from(6).into());
    Ok(())
}

#[test]
fn test_ask_missing_triple() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b")]);
    let query = translate(&ast::Query::Ask {
        prologue: ast::Prologue::default(),
        dataset: Vec::new(),
        pattern: vec![triples([triple(iri("a"), "p", iri("missing"))])],
        modifiers: ast::SolutionModifiers::default(),
        values: None,
    });
    assert!(matches!(
        QueryEvaluator::new().execute(&dataset, &query)?,
        QueryResults::Boolean(false)
    ));
    Ok(())
}

#[test]
fn test_aggregates_over_empty_input() -> Result<(), Box<dyn Error>> {
    let aggregate = |name: &str, arg: Option<ast::Expression>| SelectItem::Expression {
        expression: ast::Expression::aggregate(name, false, arg),
        variable: name.to_ascii_lowercase(),
    };
    let solutions = run(
        &Dataset::new(),
        &select(
            SelectClause {
                projection: vec![
                    aggregate("COUNT", None),
                    aggregate("SUM", Some(ast::Expression::var("o"))),
                    aggregate("AVG", Some(ast::Expression::var("o"))),
                    aggregate("MIN", Some(ast::Expression::var("o"))),
                ],
                ..SelectClause::default()
            },
            vec![triples([triple(v("s"), "p", v("o"))])],
            ast::SolutionModifiers::default(),
        ),
    )?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0]["count"], Literal::from(0).into());
    assert_eq!(solutions[0]["sum"], Literal::from(0).into());
    assert_eq!(solutions[0]["avg"], Literal::from(0).into());
    assert_eq!(solutions[0].get("min"), None);
    Ok(())
}

#[test]
fn test_group_by_with_count() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[
        ("a", "knows", "b"),
        ("a", "knows", "c"),
        ("b", "knows", "c"),
    ]);
    let solutions = run(
        &dataset,
        &select(
            SelectClause {
                projection: vec![
                    SelectItem::Var("s".into()),
                    SelectItem::Expression {
                        expression: ast::Expression::aggregate(
                            "COUNT",
                            false,
                            Some(ast::Expression::var("o")),
                        ),
                        variable: "friends".into(),
                    },
                ],
                ..SelectClause::default()
            },
            vec![triples([triple(v("s"), "knows", v("o"))])],
            ast::SolutionModifiers {
                group_by: vec![GroupCondition {
                    expression: ast::Expression::var("s"),
                    variable: None,
                }],
                ..ast::SolutionModifiers::default()
            },
        ),
    )?;
    assert_eq!(
        rows(&solutions, &["s", "friends"]),
        vec![
            vec![Some(ex("a").into()), Some(Literal::from(2).into())],
            vec![Some(ex("b").into()), Some(Literal::from(1).into())],
        ]
    );
    Ok(())
}

#[test]
fn test_order_by_desc_with_limit() -> Result<(), Box<dyn Error>> {
    let dataset = [1, 3, 2]
        .into_iter()
        .map(|i| {
            Quad::new(
                ex(&format!("s{i}")),
                ex("v"),
                Literal::from(i),
                GraphName::DefaultGraph,
            )
        })
        .collect::<Dataset>();
    let solutions = run(
        &dataset,
        &select(
            SelectClause::vars(["v"]),
            vec![triples([triple(v("s"), "v", v("v"))])],
            ast::SolutionModifiers {
                order_by: vec![OrderCondition {
                    expression: ast::Expression::var("v"),
                    descending: true,
                }],
                limit: Some(2),
                ..ast::SolutionModifiers::default()
            },
        ),
    )?;
    assert_eq!(
        solutions.iter().map(|s| s["v"].clone()).collect::<Vec<_>>(),
        vec![Literal::from(3).into(), Literal::from(2).into()]
    );
    Ok(())
}

#[test]
fn test_union_keeps_duplicates() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("a", "q", "b"), ("c", "p", "d")]);
    let left = bgp([triple_pattern("?s", "p", "?o")]);
    let right = bgp([triple_pattern("?s", "q", "?o")]);
    let union = run_pattern(
        &dataset,
        GraphPattern::Union {
            left: Box::new(left.clone()),
            right: Box::new(right.clone()),
        },
    )?;
    assert_eq!(
        union.len(),
        run_pattern(&dataset, left)?.len() + run_pattern(&dataset, right)?.len()
    );
    assert_eq!(union.len(), 3);
    Ok(())
}

#[test]
fn test_slice_without_bounds_is_identity() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("c", "p", "d")]);
    let pattern = bgp([triple_pattern("?s", "p", "?o")]);
    let sliced = run_pattern(
        &dataset,
        GraphPattern::Slice {
            inner: Box::new(pattern.clone()),
            start: 0,
            length: None,
        },
    )?;
    assert_eq!(sliced.len(), run_pattern(&dataset, pattern)?.len());
    Ok(())
}

#[test]
fn test_distinct_is_idempotent() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("a", "p", "c"), ("d", "p", "b")]);
    let projection = GraphPattern::Project {
        inner: Box::new(bgp([triple_pattern("?s", "p", "?o")])),
        variables: vec![var("s")],
    };
    let once = run_pattern(
        &dataset,
        GraphPattern::Distinct {
            inner: Box::new(projection.clone()),
        },
    )?;
    let twice = run_pattern(
        &dataset,
        GraphPattern::Distinct {
            inner: Box::new(GraphPattern::Distinct {
                inner: Box::new(projection.clone()),
            }),
        },
    )?;
    assert_eq!(rows(&once, &["s"]), rows(&twice, &["s"]));
    assert_eq!(once.len(), 2);
    assert_eq!(run_pattern(&dataset, projection)?.len(), 3);
    Ok(())
}

#[test]
fn test_bgp_order_does_not_change_solutions() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[
        ("a", "knows", "b"),
        ("b", "knows", "c"),
        ("c", "knows", "a"),
        ("b", "name", "bob"),
        ("c", "name", "carol"),
    ]);
    let patterns = [
        triple_pattern("?x", "knows", "?y"),
        triple_pattern("?y", "name", "?n"),
        triple_pattern("?y", "knows", "?z"),
    ];
    let expected = rows(&run_pattern(&dataset, bgp(patterns.clone()))?, &["x", "y", "z", "n"]);
    assert_eq!(expected.len(), 2);
    let mut reversed = patterns.clone();
    reversed.reverse();
    assert_eq!(
        rows(&run_pattern(&dataset, bgp(reversed))?, &["x", "y", "z", "n"]),
        expected
    );
    let mut rotated = patterns;
    rotated.rotate_left(1);
    assert_eq!(
        rows(&run_pattern(&dataset, bgp(rotated))?, &["x", "y", "z", "n"]),
        expected
    );
    Ok(())
}

#[test]
fn test_left_join_never_drops_left_rows() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("c", "p", "d"), ("b", "q", "e")]);
    let left = bgp([triple_pattern("?s", "p", "?o")]);
    let solutions = run_pattern(
        &dataset,
        GraphPattern::LeftJoin {
            left: Box::new(left.clone()),
            right: Box::new(bgp([triple_pattern("?o", "q", "?x")])),
            expression: Some(Expression::Literal(Literal::from(true))),
        },
    )?;
    assert!(solutions.len() >= run_pattern(&dataset, left)?.len());
    assert_eq!(
        rows(&solutions, &["s", "x"]),
        vec![
            vec![Some(ex("a").into()), Some(ex("e").into())],
            vec![Some(ex("c").into()), None],
        ]
    );
    Ok(())
}

#[test]
fn test_lazy_and_hash_joins_agree() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[
        ("a", "p", "b"),
        ("c", "p", "d"),
        ("b", "q", "e"),
        ("b", "q", "f"),
        ("g", "q", "h"),
    ]);
    let join = |lazy| GraphPattern::Join {
        left: Box::new(bgp([triple_pattern("?s", "p", "?o")])),
        right: Box::new(bgp([triple_pattern("?o", "q", "?x")])),
        lazy,
    };
    let lazy = rows(&run_pattern(&dataset, join(true))?, &["s", "o", "x"]);
    let hash = rows(&run_pattern(&dataset, join(false))?, &["s", "o", "x"]);
    assert_eq!(lazy, hash);
    assert_eq!(lazy.len(), 2);
    Ok(())
}

#[test]
fn test_failing_bind_leaves_variable_unbound() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b")]);
    let solutions = run(
        &dataset,
        &select(
            SelectClause::all(),
            vec![
                triples([triple(v("s"), "p", v("o"))]),
                GroupPatternElement::Bind {
                    expression: ast::Expression::Divide(Box::new(integer(1)), Box::new(integer(0))),
                    variable: "x".into(),
                },
                GroupPatternElement::Bind {
                    expression: ast::Expression::Add(
                        Box::new(ast::Expression::var("missing")),
                        Box::new(integer(1)),
                    ),
                    variable: "y".into(),
                },
            ],
            ast::SolutionModifiers::default(),
        ),
    )?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].get("x"), None);
    assert_eq!(solutions[0].get("y"), None);
    assert_eq!(solutions[0]["s"], ex("a").into());
    Ok(())
}

#[test]
fn test_failing_filter_drops_rows() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b")]);
    let solutions = run(
        &dataset,
        &select(
            SelectClause::all(),
            vec![
                triples([triple(v("s"), "p", v("o"))]),
                GroupPatternElement::Filter(ast::Expression::Greater(
                    Box::new(ast::Expression::var("o")),
                    Box::new(integer(1)),
                )),
            ],
            ast::SolutionModifiers::default(),
        ),
    )?;
    assert!(solutions.is_empty());
    Ok(())
}

#[test]
fn test_minus() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("c", "p", "d"), ("a", "q", "x")]);
    let solutions = run(
        &dataset,
        &select(
            SelectClause::all(),
            vec![
                triples([triple(v("s"), "p", v("o"))]),
                GroupPatternElement::Minus(vec![triples([triple(v("s"), "q", v("z"))])]),
            ],
            ast::SolutionModifiers::default(),
        ),
    )?;
    assert_eq!(rows(&solutions, &["s"]), vec![vec![Some(ex("c").into())]]);
    Ok(())
}

#[test]
fn test_minus_without_shared_variables_removes_nothing() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("c", "q", "d")]);
    let solutions = run_pattern(
        &dataset,
        GraphPattern::Minus {
            left: Box::new(bgp([triple_pattern("?s", "p", "?o")])),
            right: Box::new(bgp([triple_pattern("?x", "q", "?y")])),
        },
    )?;
    assert_eq!(solutions.len(), 1);
    Ok(())
}

#[test]
fn test_property_paths() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("b", "p", "c"), ("c", "p", "a"), ("c", "q", "d")]);
    let path = |path, subject: &str, object: &str| {
        let term = |name: &str| -> sparalgebra::term::TermPattern {
            if let Some(name) = name.strip_prefix('?') {
                var(name).into()
            } else {
                ex(name).into()
            }
        };
        GraphPattern::Path {
            subject: term(subject),
            path,
            object: term(object),
        }
    };
    let p = PropertyPathExpression::NamedNode(ex("p"));
    let q = PropertyPathExpression::NamedNode(ex("q"));

    let one_or_more = PropertyPathExpression::OneOrMore(Box::new(p.clone()));
    assert_eq!(
        run_pattern(&dataset, path(one_or_more.clone(), "a", "?o"))?.len(),
        3
    );
    assert_eq!(run_pattern(&dataset, path(one_or_more, "?s", "?o"))?.len(), 9);

    let zero_or_more = PropertyPathExpression::ZeroOrMore(Box::new(p.clone()));
    assert_eq!(run_pattern(&dataset, path(zero_or_more.clone(), "d", "d"))?.len(), 1);
    assert_eq!(run_pattern(&dataset, path(zero_or_more, "?s", "d"))?.len(), 1);

    let sequence = PropertyPathExpression::Sequence(
        Box::new(PropertyPathExpression::OneOrMore(Box::new(p.clone()))),
        Box::new(q.clone()),
    );
    assert_eq!(
        rows(&run_pattern(&dataset, path(sequence, "?s", "d"))?, &["s"]),
        vec![
            vec![Some(ex("a").into())],
            vec![Some(ex("b").into())],
            vec![Some(ex("c").into())],
        ]
    );

    let reverse = PropertyPathExpression::Reverse(Box::new(p.clone()));
    assert_eq!(
        rows(&run_pattern(&dataset, path(reverse, "a", "?o"))?, &["o"]),
        vec![vec![Some(ex("c").into())]]
    );

    let alternative = PropertyPathExpression::Alternative(Box::new(p), Box::new(q));
    assert_eq!(run_pattern(&dataset, path(alternative, "c", "?o"))?.len(), 2);

    let negated = PropertyPathExpression::NegatedPropertySet(vec![ex("p")]);
    assert_eq!(
        rows(&run_pattern(&dataset, path(negated, "?s", "?o"))?, &["s", "o"]),
        vec![vec![Some(ex("c").into()), Some(ex("d").into())]]
    );
    Ok(())
}

#[test]
fn test_same_variable_on_both_path_ends() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("b", "p", "a"), ("c", "p", "d")]);
    let solutions = run_pattern(
        &dataset,
        GraphPattern::Path {
            subject: var("x").into(),
            path: PropertyPathExpression::OneOrMore(Box::new(PropertyPathExpression::NamedNode(
                ex("p"),
            ))),
            object: var("x").into(),
        },
    )?;
    assert_eq!(
        rows(&solutions, &["x"]),
        vec![vec![Some(ex("a").into())], vec![Some(ex("b").into())]]
    );
    Ok(())
}

#[test]
fn test_named_graphs() -> Result<(), Box<dyn Error>> {
    let dataset = [
        Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph),
        Quad::new(ex("c"), ex("p"), ex("d"), ex("g1")),
        Quad::new(ex("e"), ex("p"), ex("f"), ex("g2")),
    ]
    .into_iter()
    .collect::<Dataset>();
    let graph_query = |dataset_clauses: Vec<DatasetClause>| {
        translate(&ast::Query::Select {
            prologue: ast::Prologue::default(),
            select: SelectClause::all(),
            dataset: dataset_clauses,
            pattern: vec![GroupPatternElement::Graph {
                name: VarOrIri::Var("g".into()),
                pattern: vec![triples([triple(v("s"), "p", v("o"))])],
            }],
            modifiers: ast::SolutionModifiers::default(),
            values: None,
        })
    };
    assert_eq!(
        rows(&run(&dataset, &graph_query(Vec::new()))?, &["g", "s"]),
        vec![
            vec![Some(ex("g1").into()), Some(ex("c").into())],
            vec![Some(ex("g2").into()), Some(ex("e").into())],
        ]
    );
    assert_eq!(
        rows(
            &run(
                &dataset,
                &graph_query(vec![DatasetClause::Named(Iri::prefixed("ex", "g2"))])
            )?,
            &["g", "s"]
        ),
        vec![vec![Some(ex("g2").into()), Some(ex("e").into())]]
    );
    Ok(())
}

#[test]
fn test_from_and_default_graph_as_union() -> Result<(), Box<dyn Error>> {
    let dataset = [
        Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph),
        Quad::new(ex("c"), ex("p"), ex("d"), ex("g1")),
        Quad::new(ex("e"), ex("p"), ex("f"), ex("g2")),
    ]
    .into_iter()
    .collect::<Dataset>();
    let query = |dataset_clauses: Vec<DatasetClause>| {
        translate(&ast::Query::Select {
            prologue: ast::Prologue::default(),
            select: SelectClause::vars(["s"]),
            dataset: dataset_clauses,
            pattern: vec![triples([triple(v("s"), "p", v("o"))])],
            modifiers: ast::SolutionModifiers::default(),
            values: None,
        })
    };
    assert_eq!(
        rows(&run(&dataset, &query(Vec::new()))?, &["s"]),
        vec![vec![Some(ex("a").into())]]
    );
    assert_eq!(
        rows(
            &run(
                &dataset,
                &query(vec![
                    DatasetClause::Default(Iri::prefixed("ex", "g1")),
                    DatasetClause::Default(Iri::prefixed("ex", "g2")),
                ])
            )?,
            &["s"]
        ),
        vec![vec![Some(ex("c").into())], vec![Some(ex("e").into())]]
    );
    let union = solutions(
        QueryEvaluator::new()
            .with_default_graph_as_union()
            .execute(&dataset, &query(Vec::new()))?,
    )?;
    assert_eq!(union.len(), 3);
    Ok(())
}

#[test]
fn test_construct_with_fresh_blank_nodes() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("c", "p", "d")]);
    let query = translate(&ast::Query::Construct {
        prologue: ast::Prologue::default(),
        template: Some(vec![
            triple(VarOrTerm::BlankNode("n".into()), "from", v("s")),
            triple(VarOrTerm::BlankNode("n".into()), "to", v("o")),
            // not a valid triple: skipped
            triple(VarOrTerm::Literal(ast::Literal::integer(1)), "p", v("o")),
        ]),
        dataset: Vec::new(),
        pattern: vec![triples([triple(v("s"), "p", v("o"))])],
        modifiers: ast::SolutionModifiers::default(),
        values: None,
    });
    let QueryResults::Graph(triples) = QueryEvaluator::new().execute(&dataset, &query)? else {
        return Err("graph expected".into());
    };
    let triples = triples.collect::<Result<Vec<Triple>, _>>()?;
    assert_eq!(triples.len(), 4);
    let subjects = triples
        .iter()
        .map(|t| t.subject.clone())
        .collect::<std::collections::BTreeSet<_>>();
    // one blank node per solution, shared by the template triples
    assert_eq!(subjects.len(), 2);
    assert!(
        subjects
            .iter()
            .all(|s| matches!(s, NamedOrBlankNode::BlankNode(_)))
    );
    Ok(())
}

#[test]
fn test_describe_follows_blank_nodes() -> Result<(), Box<dyn Error>> {
    let address = BlankNode::new_unchecked("address");
    let dataset = [
        Quad::new(ex("a"), ex("name"), Literal::from("A"), GraphName::DefaultGraph),
        Quad::new(ex("a"), ex("address"), address.clone(), GraphName::DefaultGraph),
        Quad::new(address, ex("city"), Literal::from("Lyon"), GraphName::DefaultGraph),
        Quad::new(ex("b"), ex("name"), Literal::from("B"), GraphName::DefaultGraph),
    ]
    .into_iter()
    .collect::<Dataset>();
    let query = translate(&ast::Query::Describe {
        prologue: ast::Prologue::default(),
        targets: vec![VarOrIri::Iri(Iri::prefixed("ex", "a"))],
        dataset: Vec::new(),
        pattern: None,
        modifiers: ast::SolutionModifiers::default(),
        values: None,
    });
    let QueryResults::Graph(triples) = QueryEvaluator::new().execute(&dataset, &query)? else {
        return Err("graph expected".into());
    };
    assert_eq!(triples.collect::<Result<Vec<_>, _>>()?.len(), 3);
    Ok(())
}

#[test]
fn test_substituted_variables() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("c", "p", "d")]);
    let query = select(
        SelectClause::all(),
        vec![triples([triple(v("s"), "p", v("o"))])],
        ast::SolutionModifiers::default(),
    );
    let solutions = solutions(QueryEvaluator::new().execute_with_substituted_variables(
        &dataset,
        &query,
        [(var("s"), ex("c").into())],
    )?)?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0]["o"], ex("d").into());

    let evaluator = QueryEvaluator::new().with_initial_binding(var("s"), ex("a"));
    assert_eq!(solutions_of(&evaluator, &dataset, &query)?, 1);
    assert!(matches!(
        evaluator.execute_with_substituted_variables(&dataset, &query, [(var("s"), ex("c").into())]),
        Err(QueryEvaluationError::AlreadyBound(_))
    ));
    Ok(())
}

fn solutions_of(
    evaluator: &QueryEvaluator,
    dataset: &Dataset,
    query: &Query,
) -> Result<usize, Box<dyn Error>> {
    Ok(solutions(evaluator.execute(dataset, query)?)?.len())
}

#[test]
fn test_exists_sees_the_current_solution() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("c", "p", "d"), ("b", "q", "e")]);
    let solutions = run(
        &dataset,
        &select(
            SelectClause::vars(["s"]),
            vec![
                triples([triple(v("s"), "p", v("o"))]),
                GroupPatternElement::Filter(ast::Expression::NotExists(vec![triples([triple(
                    v("o"),
                    "q",
                    v("x"),
                )])])),
            ],
            ast::SolutionModifiers::default(),
        ),
    )?;
    assert_eq!(rows(&solutions, &["s"]), vec![vec![Some(ex("c").into())]]);
    Ok(())
}

#[test]
fn test_service_with_unbound_name_fails() {
    let pattern = GraphPattern::Service {
        name: NamedNodePattern::Variable(var("service")),
        inner: Box::new(bgp([triple_pattern("?s", "p", "?o")])),
        silent: false,
    };
    let dataset = Dataset::new();
    let results = QueryEvaluator::new().execute(
        &dataset,
        &Query::Select {
            dataset: None,
            pattern,
            base_iri: None,
        },
    );
    let Ok(QueryResults::Solutions(mut solutions)) = results else {
        return;
    };
    assert!(matches!(
        solutions.next(),
        Some(Err(QueryEvaluationError::UnboundService))
    ));
}

#[test]
fn test_reduced_removes_consecutive_duplicates() -> Result<(), Box<dyn Error>> {
    let values = GraphPattern::Values {
        variables: vec![var("s")],
        bindings: ["a", "a", "b", "a"]
            .into_iter()
            .map(|s| vec![Some(ex(s).into())])
            .collect(),
    };
    let solutions = run_pattern(
        &Dataset::new(),
        GraphPattern::Reduced {
            inner: Box::new(values),
        },
    )?;
    assert_eq!(
        solutions.iter().map(|s| s["s"].clone()).collect::<Vec<_>>(),
        vec![ex("a").into(), ex("b").into(), ex("a").into()]
    );
    Ok(())
}

#[test]
fn test_initial_binding_of_a_variable_outside_the_projection() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("c", "p", "d")]);
    let query = |distinct| {
        select(
            SelectClause {
                distinct,
                ..SelectClause::vars(["o"])
            },
            vec![triples([triple(v("s"), "p", v("o"))])],
            ast::SolutionModifiers::default(),
        )
    };
    let initial = solutions(
        QueryEvaluator::new()
            .with_initial_binding(var("s"), ex("a"))
            .execute(&dataset, &query(false))?,
    )?;
    assert_eq!(rows(&initial, &["o", "s"]), vec![vec![Some(ex("b").into()), None]]);

    let substituted = solutions(QueryEvaluator::new().execute_with_substituted_variables(
        &dataset,
        &query(true),
        [(var("s"), ex("c").into())],
    )?)?;
    assert_eq!(rows(&substituted, &["o"]), vec![vec![Some(ex("d").into())]]);
    Ok(())
}

#[test]
fn test_count_distinct_star_ignores_blank_nodes() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b"), ("a", "p", "c")]);
    let solutions = run(
        &dataset,
        &select(
            SelectClause {
                projection: vec![SelectItem::Expression {
                    expression: ast::Expression::aggregate("COUNT", true, None),
                    variable: "c".into(),
                }],
                ..SelectClause::default()
            },
            vec![triples([triple(v("s"), "p", VarOrTerm::BlankNode("x".into()))])],
            ast::SolutionModifiers::default(),
        ),
    )?;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0]["c"], Literal::from(1).into());
    Ok(())
}

#[test]
fn test_bind_does_not_see_the_other_side_of_a_join() -> Result<(), Box<dyn Error>> {
    let dataset = dataset(&[("a", "p", "b")]);
    let join = |lazy| GraphPattern::Join {
        left: Box::new(bgp([triple_pattern("?s", "p", "?o")])),
        right: Box::new(GraphPattern::Extend {
            inner: Box::new(GraphPattern::default()),
            variable: var("w"),
            expression: Expression::Variable(var("o")),
        }),
        lazy,
    };
    let lazy = rows(&run_pattern(&dataset, join(true))?, &["s", "o", "w"]);
    let hash = rows(&run_pattern(&dataset, join(false))?, &["s", "o", "w"]);
    assert_eq!(lazy, hash);
    assert_eq!(
        lazy,
        vec![vec![Some(ex("a").into()), Some(ex("b").into()), None]]
    );
    Ok(())
}
