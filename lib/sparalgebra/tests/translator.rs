#![allow(clippy::panic)]

use sparalgebra::algebra::{
    AggregateExpression, AggregateFunction, Expression, GraphPattern, PropertyPathExpression,
};
use sparalgebra::ast::{
    self, DatasetClause, GroupCondition, GroupPatternElement, Iri, SelectClause, SelectItem,
    TriplesPattern, VarOrTerm, Verb,
};
use sparalgebra::term::{NamedNode, TermPattern, Variable};
use sparalgebra::{
    GraphUpdateOperation, Query, QueryTranslator, ResolutionError, SyntaxLoweringError,
    TranslationError,
};

const EX: &str = "http://example.com/";

fn translator() -> QueryTranslator {
    QueryTranslator::new().with_prefix("ex", EX).unwrap()
}

fn ex(local: &str) -> Iri {
    Iri::prefixed("ex", local)
}

fn triple(subject: VarOrTerm, predicate: &str, object: VarOrTerm) -> TriplesPattern {
    TriplesPattern {
        subject,
        verb: Verb::Path(ast::Path::Iri(ex(predicate))),
        object,
    }
}

fn path_triple(subject: VarOrTerm, path: ast::Path, object: VarOrTerm) -> TriplesPattern {
    TriplesPattern {
        subject,
        verb: Verb::Path(path),
        object,
    }
}

fn triples(triples: impl IntoIterator<Item = TriplesPattern>) -> GroupPatternElement {
    GroupPatternElement::Triples(triples.into_iter().collect())
}

fn v(name: &str) -> VarOrTerm {
    VarOrTerm::var(name)
}

fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

fn select(
    select: SelectClause,
    pattern: Vec<GroupPatternElement>,
    modifiers: ast::SolutionModifiers,
) -> ast::Query {
    ast::Query::Select {
        prologue: ast::Prologue::default(),
        select,
        dataset: Vec::new(),
        pattern,
        modifiers,
        values: None,
    }
}

fn select_pattern(query: &Query) -> &GraphPattern {
    let GraphPattern::Project { inner, .. } = query.pattern() else {
        panic!("projection expected, found {}", query.to_sse())
    };
    inner
}

fn integer(value: i64) -> ast::Expression {
    ast::Expression::Literal(ast::Literal::integer(value))
}

#[test]
fn test_select_star_projects_in_scope_variables() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause::all(),
        vec![triples([
            triple(v("s"), "p", v("o")),
            triple(v("o"), "q", v("x")),
        ])],
        ast::SolutionModifiers::default(),
    ))?;
    assert_eq!(
        query.projected_variables(),
        vec![var("s"), var("o"), var("x")]
    );
    Ok(())
}

#[test]
fn test_filters_are_hoisted_over_the_group() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause::all(),
        vec![
            triples([triple(v("s"), "p", v("o"))]),
            GroupPatternElement::Filter(ast::Expression::Greater(
                Box::new(ast::Expression::var("o")),
                Box::new(integer(1)),
            )),
            triples([triple(v("s"), "q", v("x"))]),
        ],
        ast::SolutionModifiers::default(),
    ))?;
    let GraphPattern::Filter {
        inner, isolated, ..
    } = select_pattern(&query)
    else {
        panic!("filter expected, found {}", query.to_sse())
    };
    assert!(isolated);
    assert!(matches!(inner.as_ref(), GraphPattern::Bgp { patterns } if patterns.len() == 2));
    Ok(())
}

#[test]
fn test_optional_filter_becomes_left_join_expression() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause::all(),
        vec![
            triples([triple(v("s"), "p", v("o"))]),
            GroupPatternElement::Optional(vec![
                triples([triple(v("s"), "q", v("x"))]),
                GroupPatternElement::Filter(ast::Expression::call(
                    "isLiteral",
                    [ast::Expression::var("x")],
                )),
            ]),
        ],
        ast::SolutionModifiers::default(),
    ))?;
    let GraphPattern::LeftJoin {
        right, expression, ..
    } = select_pattern(&query)
    else {
        panic!("left join expected, found {}", query.to_sse())
    };
    assert!(matches!(right.as_ref(), GraphPattern::Bgp { .. }));
    assert!(expression.is_some());
    Ok(())
}

#[test]
fn test_aggregates_are_extracted() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause {
            projection: vec![
                SelectItem::Var("s".into()),
                SelectItem::Expression {
                    expression: ast::Expression::aggregate(
                        "count",
                        false,
                        Some(ast::Expression::var("o")),
                    ),
                    variable: "c".into(),
                },
            ],
            ..SelectClause::default()
        },
        vec![triples([triple(v("s"), "p", v("o"))])],
        ast::SolutionModifiers {
            group_by: vec![GroupCondition {
                expression: ast::Expression::var("s"),
                variable: None,
            }],
            ..ast::SolutionModifiers::default()
        },
    ))?;
    assert_eq!(
        query.to_sse(),
        "(project (?s ?c) (extend ((?c ?__agg_1__)) (aggregatejoin (((count ?o) ?__agg_1__)) (group (?s) (bgp (triple ?s <http://example.com/p> ?o))))))"
    );
    Ok(())
}

#[test]
fn test_same_aggregate_is_computed_once() -> Result<(), TranslationError> {
    let count = ast::Expression::aggregate("COUNT", true, None);
    let query = translator().translate(&select(
        SelectClause {
            projection: vec![SelectItem::Expression {
                expression: count.clone(),
                variable: "c".into(),
            }],
            ..SelectClause::default()
        },
        vec![triples([triple(v("s"), "p", v("o"))])],
        ast::SolutionModifiers {
            having: vec![ast::Expression::Greater(
                Box::new(count),
                Box::new(integer(2)),
            )],
            ..ast::SolutionModifiers::default()
        },
    ))?;
    let GraphPattern::Extend { inner, .. } = select_pattern(&query) else {
        panic!("extend expected, found {}", query.to_sse())
    };
    let GraphPattern::Filter { inner, .. } = inner.as_ref() else {
        panic!("having filter expected, found {}", query.to_sse())
    };
    let GraphPattern::AggregateJoin { group, aggregates } = inner.as_ref() else {
        panic!("aggregate join expected, found {}", query.to_sse())
    };
    assert_eq!(
        aggregates,
        &vec![(
            var("__agg_1__"),
            AggregateExpression {
                function: AggregateFunction::Count,
                expr: None,
                distinct: true,
            }
        )]
    );
    assert!(
        matches!(group.as_ref(), GraphPattern::Group { expressions, .. } if expressions.is_empty())
    );
    Ok(())
}

#[test]
fn test_ungrouped_variables_are_sampled() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause::vars(["s", "o"]),
        vec![triples([triple(v("s"), "p", v("o"))])],
        ast::SolutionModifiers {
            group_by: vec![GroupCondition {
                expression: ast::Expression::var("s"),
                variable: None,
            }],
            ..ast::SolutionModifiers::default()
        },
    ))?;
    let GraphPattern::Extend {
        inner,
        variable,
        expression,
    } = select_pattern(&query)
    else {
        panic!("extend expected, found {}", query.to_sse())
    };
    assert_eq!(variable, &var("o"));
    assert_eq!(expression, &Expression::Variable(var("__agg_1__")));
    let GraphPattern::AggregateJoin { aggregates, .. } = inner.as_ref() else {
        panic!("aggregate join expected, found {}", query.to_sse())
    };
    assert_eq!(aggregates[0].1.function, AggregateFunction::Sample);
    assert_eq!(query.projected_variables(), vec![var("s"), var("o")]);
    Ok(())
}

#[test]
fn test_aggregate_in_filter_is_rejected() {
    let result = translator().translate(&select(
        SelectClause::all(),
        vec![
            triples([triple(v("s"), "p", v("o"))]),
            GroupPatternElement::Filter(ast::Expression::aggregate(
                "sum",
                false,
                Some(ast::Expression::var("o")),
            )),
        ],
        ast::SolutionModifiers::default(),
    ));
    assert!(matches!(
        result,
        Err(TranslationError::SyntaxLowering(
            SyntaxLoweringError::AggregateNotAllowed
        ))
    ));
}

#[test]
fn test_unknown_aggregate_is_rejected() {
    let result = translator().translate(&select(
        SelectClause {
            projection: vec![SelectItem::Expression {
                expression: ast::Expression::aggregate("median", false, None),
                variable: "m".into(),
            }],
            ..SelectClause::default()
        },
        vec![triples([triple(v("s"), "p", v("o"))])],
        ast::SolutionModifiers::default(),
    ));
    assert!(matches!(
        result,
        Err(TranslationError::SyntaxLowering(
            SyntaxLoweringError::UnknownAggregate(name)
        )) if name == "median"
    ));
}

#[test]
fn test_sequence_and_inverse_paths_become_triples() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause::vars(["s", "o"]),
        vec![triples([path_triple(
            v("s"),
            ast::Path::Sequence(vec![
                ast::Path::Iri(ex("p")),
                ast::Path::Inverse(Box::new(ast::Path::Iri(ex("q")))),
            ]),
            v("o"),
        )])],
        ast::SolutionModifiers::default(),
    ))?;
    let GraphPattern::Bgp { patterns } = select_pattern(&query) else {
        panic!("bgp expected, found {}", query.to_sse())
    };
    assert_eq!(patterns.len(), 2);
    assert!(
        patterns
            .iter()
            .all(|t| t.subject == TermPattern::Variable(var("s"))
                || t.subject == TermPattern::Variable(var("o")))
    );
    assert!(
        patterns
            .iter()
            .all(|t| matches!(t.object, TermPattern::BlankNode(_)))
    );
    Ok(())
}

#[test]
fn test_transitive_path_is_kept_and_joined_lazily() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause::all(),
        vec![triples([
            triple(v("s"), "type", VarOrTerm::Iri(ex("Person"))),
            path_triple(
                v("s"),
                ast::Path::OneOrMore(Box::new(ast::Path::Iri(ex("knows")))),
                v("o"),
            ),
        ])],
        ast::SolutionModifiers::default(),
    ))?;
    let GraphPattern::Join { left, right, lazy } = select_pattern(&query) else {
        panic!("join expected, found {}", query.to_sse())
    };
    assert!(lazy);
    assert!(matches!(left.as_ref(), GraphPattern::Bgp { .. }));
    assert_eq!(
        right.as_ref(),
        &GraphPattern::Path {
            subject: var("s").into(),
            path: PropertyPathExpression::OneOrMore(Box::new(
                NamedNode::new_unchecked("http://example.com/knows").into()
            )),
            object: var("o").into(),
        }
    );
    Ok(())
}

#[test]
fn test_join_with_limited_sub_select_is_not_lazy() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause::all(),
        vec![
            triples([triple(v("s"), "p", v("o"))]),
            GroupPatternElement::SubSelect(Box::new(ast::SubSelect {
                select: SelectClause::vars(["s"]),
                pattern: vec![triples([triple(v("s"), "q", v("x"))])],
                modifiers: ast::SolutionModifiers {
                    limit: Some(1),
                    ..ast::SolutionModifiers::default()
                },
                values: None,
            })),
        ],
        ast::SolutionModifiers::default(),
    ))?;
    let GraphPattern::Join { right, lazy, .. } = select_pattern(&query) else {
        panic!("join expected, found {}", query.to_sse())
    };
    assert!(!lazy);
    assert!(matches!(right.as_ref(), GraphPattern::ToMultiSet { .. }));
    Ok(())
}

#[test]
fn test_empty_path_is_rejected() {
    let result = translator().translate(&select(
        SelectClause::all(),
        vec![triples([path_triple(
            v("s"),
            ast::Path::Alternative(Vec::new()),
            v("o"),
        )])],
        ast::SolutionModifiers::default(),
    ));
    assert!(matches!(
        result,
        Err(TranslationError::SyntaxLowering(
            SyntaxLoweringError::EmptyPath
        ))
    ));
}

#[test]
fn test_bind_of_bound_variable_is_rejected() {
    let result = translator().translate(&select(
        SelectClause::all(),
        vec![
            triples([triple(v("s"), "p", v("o"))]),
            GroupPatternElement::Bind {
                expression: integer(1),
                variable: "o".into(),
            },
        ],
        ast::SolutionModifiers::default(),
    ));
    assert!(matches!(
        result,
        Err(TranslationError::SyntaxLowering(
            SyntaxLoweringError::VariableAlreadyBound(v)
        )) if v.as_str() == "o"
    ));
}

#[test]
fn test_values_arity_is_checked() {
    let result = translator().translate(&select(
        SelectClause::all(),
        vec![GroupPatternElement::Values(ast::ValuesClause {
            variables: vec!["a".into(), "b".into()],
            rows: vec![vec![Some(VarOrTerm::Iri(ex("x")))]],
        })],
        ast::SolutionModifiers::default(),
    ));
    assert!(matches!(
        result,
        Err(TranslationError::SyntaxLowering(
            SyntaxLoweringError::ValuesArity {
                expected: 2,
                found: 1
            }
        ))
    ));
}

#[test]
fn test_undeclared_prefix_is_rejected() {
    let result = QueryTranslator::new().translate(&select(
        SelectClause::all(),
        vec![triples([triple(v("s"), "p", v("o"))])],
        ast::SolutionModifiers::default(),
    ));
    assert!(matches!(
        result,
        Err(TranslationError::Resolution(ResolutionError::UndeclaredPrefix(prefix))) if prefix == "ex"
    ));
}

#[test]
fn test_relative_iris_are_resolved_against_base() -> Result<(), TranslationError> {
    let query = QueryTranslator::new().translate(&ast::Query::Ask {
        prologue: ast::Prologue {
            base_iri: Some("http://example.com/data/".into()),
            prefixes: vec![("ex".into(), "vocab#".into())],
        },
        dataset: vec![DatasetClause::Named(Iri::full("g"))],
        pattern: vec![triples([TriplesPattern {
            subject: VarOrTerm::iri("s"),
            verb: Verb::iri("../p"),
            object: VarOrTerm::Iri(ex("o")),
        }])],
        modifiers: ast::SolutionModifiers::default(),
        values: None,
    })?;
    assert_eq!(
        query.to_sse(),
        "(base <http://example.com/data/> (ask (dataset ((named <http://example.com/data/g>)) (bgp (triple <http://example.com/data/s> <http://example.com/p> <http://example.com/data/vocab#o>)))))"
    );
    Ok(())
}

#[test]
fn test_exists_filter_sees_outer_bindings() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause::all(),
        vec![
            triples([triple(v("s"), "p", v("o"))]),
            GroupPatternElement::Filter(ast::Expression::NotExists(vec![
                triples([triple(v("o"), "q", v("x"))]),
                GroupPatternElement::Filter(ast::Expression::Equal(
                    Box::new(ast::Expression::var("x")),
                    Box::new(ast::Expression::var("s")),
                )),
            ])),
        ],
        ast::SolutionModifiers::default(),
    ))?;
    let GraphPattern::Filter { expr, .. } = select_pattern(&query) else {
        panic!("filter expected, found {}", query.to_sse())
    };
    let Expression::Not(inner) = expr else {
        panic!("negation expected, found {expr}")
    };
    let Expression::Exists(pattern) = inner.as_ref() else {
        panic!("exists expected, found {inner}")
    };
    assert!(matches!(
        pattern.as_ref(),
        GraphPattern::Filter {
            isolated: false,
            ..
        }
    ));
    Ok(())
}

#[test]
fn test_not_in_and_not_equal_are_negations() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause::all(),
        vec![
            triples([triple(v("s"), "p", v("o"))]),
            GroupPatternElement::Filter(ast::Expression::And(
                Box::new(ast::Expression::NotIn(
                    Box::new(ast::Expression::var("o")),
                    vec![integer(1), integer(2)],
                )),
                Box::new(ast::Expression::NotEqual(
                    Box::new(ast::Expression::var("o")),
                    Box::new(integer(3)),
                )),
            )),
        ],
        ast::SolutionModifiers::default(),
    ))?;
    let GraphPattern::Filter {
        expr: Expression::And(a, b),
        ..
    } = select_pattern(&query)
    else {
        panic!("conjunction expected, found {}", query.to_sse())
    };
    assert!(matches!(a.as_ref(), Expression::Not(e) if matches!(e.as_ref(), Expression::In(..))));
    assert!(
        matches!(b.as_ref(), Expression::Not(e) if matches!(e.as_ref(), Expression::Equal(..)))
    );
    Ok(())
}

#[test]
fn test_modifiers_order() -> Result<(), TranslationError> {
    let query = translator().translate(&select(
        SelectClause {
            distinct: true,
            ..SelectClause::vars(["s"])
        },
        vec![triples([triple(v("s"), "p", v("o"))])],
        ast::SolutionModifiers {
            order_by: vec![ast::OrderCondition {
                expression: ast::Expression::var("o"),
                descending: true,
            }],
            limit: Some(10),
            offset: Some(2),
            ..ast::SolutionModifiers::default()
        },
    ))?;
    assert_eq!(
        query.to_sse(),
        "(slice 2 10 (distinct (project (?s) (order ((desc ?o)) (bgp (triple ?s <http://example.com/p> ?o))))))"
    );
    Ok(())
}

#[test]
fn test_construct_where_uses_template() -> Result<(), TranslationError> {
    let query = translator().translate(&ast::Query::Construct {
        prologue: ast::Prologue::default(),
        template: None,
        dataset: Vec::new(),
        pattern: vec![triples([triple(v("s"), "p", v("o"))])],
        modifiers: ast::SolutionModifiers::default(),
        values: None,
    })?;
    let Query::Construct {
        template, pattern, ..
    } = &query
    else {
        panic!("construct expected")
    };
    assert_eq!(template.len(), 1);
    assert!(matches!(pattern, GraphPattern::Bgp { patterns } if patterns == template));
    Ok(())
}

#[test]
fn test_describe_binds_iris() -> Result<(), TranslationError> {
    let query = translator().translate(&ast::Query::Describe {
        prologue: ast::Prologue::default(),
        targets: vec![ast::VarOrIri::Iri(ex("alice"))],
        dataset: Vec::new(),
        pattern: None,
        modifiers: ast::SolutionModifiers::default(),
        values: None,
    })?;
    assert_eq!(
        query.to_sse(),
        "(describe (project (?__describe_1__) (extend ((?__describe_1__ <http://example.com/alice>)) (bgp))))"
    );
    Ok(())
}

#[test]
fn test_insert_data_rejects_variables() {
    let result = translator().translate_update(&ast::Update {
        prologue: ast::Prologue::default(),
        operations: vec![ast::UpdateOperation::InsertData(vec![
            ast::QuadsElement::Triples(vec![triple(VarOrTerm::Iri(ex("a")), "p", v("o"))]),
        ])],
    });
    assert!(matches!(
        result,
        Err(TranslationError::SyntaxLowering(
            SyntaxLoweringError::VariableNotAllowed(_)
        ))
    ));
}

#[test]
fn test_delete_data_rejects_blank_nodes() {
    let result = translator().translate_update(&ast::Update {
        prologue: ast::Prologue::default(),
        operations: vec![ast::UpdateOperation::DeleteData(vec![
            ast::QuadsElement::Triples(vec![triple(
                VarOrTerm::BlankNode("b".into()),
                "p",
                VarOrTerm::Iri(ex("o")),
            )]),
        ])],
    });
    assert!(matches!(
        result,
        Err(TranslationError::SyntaxLowering(
            SyntaxLoweringError::BlankNodeNotAllowed(_)
        ))
    ));
}

#[test]
fn test_with_graph_is_injected() -> Result<(), TranslationError> {
    let update = translator().translate_update(&ast::Update {
        prologue: ast::Prologue::default(),
        operations: vec![ast::UpdateOperation::Modify {
            with: Some(ex("g")),
            delete: vec![ast::QuadsElement::Triples(vec![triple(
                v("s"),
                "p",
                v("o"),
            )])],
            insert: Vec::new(),
            using: Vec::new(),
            pattern: vec![triples([triple(v("s"), "p", v("o"))])],
        }],
    })?;
    let [GraphUpdateOperation::DeleteInsert { delete, using, .. }] = update.operations.as_slice()
    else {
        panic!("a single modify expected, found {}", update.to_sse())
    };
    assert_eq!(
        delete[0].graph_name,
        sparalgebra::term::GraphNamePattern::NamedNode(NamedNode::new_unchecked(
            "http://example.com/g"
        ))
    );
    assert_eq!(
        using.as_ref().map(|u| u.default.clone()),
        Some(vec![NamedNode::new_unchecked("http://example.com/g")])
    );
    Ok(())
}

#[test]
fn test_move_is_lowered() -> Result<(), TranslationError> {
    let update = translator().translate_update(&ast::Update {
        prologue: ast::Prologue::default(),
        operations: vec![
            ast::UpdateOperation::Move {
                silent: false,
                from: ast::GraphOrDefault::Graph(ex("a")),
                to: ast::GraphOrDefault::Default,
            },
            ast::UpdateOperation::Copy {
                silent: false,
                from: ast::GraphOrDefault::Default,
                to: ast::GraphOrDefault::Default,
            },
        ],
    })?;
    assert_eq!(update.operations.len(), 3);
    assert!(matches!(
        &update.operations[0],
        GraphUpdateOperation::Drop { silent: true, .. }
    ));
    assert!(matches!(
        &update.operations[1],
        GraphUpdateOperation::DeleteInsert { .. }
    ));
    assert!(matches!(
        &update.operations[2],
        GraphUpdateOperation::Drop { silent: false, .. }
    ));
    Ok(())
}
