use crate::algebra::*;
use crate::ast;
use crate::error::{ResolutionError, SyntaxLoweringError, TranslationError};
use crate::query::Query;
use crate::term::*;
use crate::update::{GraphUpdateOperation, Update};
use oxiri::{Iri, IriParseError};
use rdfterm::vocab::rdf;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::mem::take;
use tracing::debug;

/// Translates [annotated parse trees](crate::ast) into the [query algebra](crate::algebra).
///
/// ```
/// use sparalgebra::ast::{self, GroupPatternElement, Iri, SelectClause, TriplesPattern, VarOrTerm, Verb};
/// use sparalgebra::QueryTranslator;
///
/// let query = ast::Query::Select {
///     prologue: ast::Prologue::default(),
///     select: SelectClause::vars(["o"]),
///     dataset: Vec::new(),
///     pattern: vec![GroupPatternElement::Triples(vec![TriplesPattern {
///         subject: VarOrTerm::Iri(Iri::prefixed("ex", "a")),
///         verb: Verb::Path(ast::Path::Iri(Iri::prefixed("ex", "p"))),
///         object: VarOrTerm::var("o"),
///     }])],
///     modifiers: ast::SolutionModifiers::default(),
///     values: None,
/// };
/// let query = QueryTranslator::new()
///     .with_prefix("ex", "http://example.com/")?
///     .translate(&query)?;
/// assert_eq!(
///     query.to_string(),
///     "SELECT ?o WHERE { <http://example.com/a> <http://example.com/p> ?o . }"
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[must_use]
#[derive(Clone, Default)]
pub struct QueryTranslator {
    base_iri: Option<Iri<String>>,
    prefixes: HashMap<String, String>,
}

impl QueryTranslator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provides an IRI that could be used to resolve the relative IRIs of the parse tree.
    ///
    /// A `BASE` declaration in the parse tree prologue is resolved against it.
    #[inline]
    pub fn with_base_iri(mut self, base_iri: impl Into<String>) -> Result<Self, IriParseError> {
        self.base_iri = Some(Iri::parse(base_iri.into())?);
        Ok(self)
    }

    /// Set a default IRI prefix used during translation.
    #[inline]
    pub fn with_prefix(
        mut self,
        prefix_name: impl Into<String>,
        prefix_iri: impl Into<String>,
    ) -> Result<Self, IriParseError> {
        self.prefixes.insert(
            prefix_name.into(),
            Iri::parse(prefix_iri.into())?.into_inner(),
        );
        Ok(self)
    }

    /// Translates a parsed query.
    pub fn translate(&self, query: &ast::Query) -> Result<Query, TranslationError> {
        let query = match query {
            ast::Query::Select {
                prologue,
                select,
                dataset,
                pattern,
                modifiers,
                values,
            } => {
                let mut state = self.state(prologue)?;
                let dataset = state.dataset(dataset)?;
                let pattern = state.pattern(pattern)?;
                Query::Select {
                    dataset,
                    pattern: state.select(Selection::from(select), pattern, modifiers, values)?,
                    base_iri: state.base_iri,
                }
            }
            ast::Query::Construct {
                prologue,
                template,
                dataset,
                pattern,
                modifiers,
                values,
            } => {
                let mut state = self.state(prologue)?;
                let dataset = state.dataset(dataset)?;
                let (template, pattern) = if let Some(template) = template {
                    (
                        state.triple_template(template, "CONSTRUCT templates")?,
                        state.pattern(pattern)?,
                    )
                } else {
                    let mut template = Vec::new();
                    for element in pattern {
                        match element {
                            ast::GroupPatternElement::Triples(triples) => template
                                .extend(state.triple_template(triples, "CONSTRUCT WHERE")?),
                            _ => {
                                return Err(SyntaxLoweringError::PathNotAllowed(
                                    "CONSTRUCT WHERE",
                                )
                                .into());
                            }
                        }
                    }
                    let pattern = bgp(template.clone());
                    (template, pattern)
                };
                Query::Construct {
                    template,
                    dataset,
                    pattern: state.select(Selection::everything(), pattern, modifiers, values)?,
                    base_iri: state.base_iri,
                }
            }
            ast::Query::Describe {
                prologue,
                targets,
                dataset,
                pattern,
                modifiers,
                values,
            } => {
                let mut state = self.state(prologue)?;
                let dataset = state.dataset(dataset)?;
                let pattern = match pattern {
                    Some(pattern) => state.pattern(pattern)?,
                    None => GraphPattern::default(),
                };
                let selection = if targets.is_empty() {
                    Selection {
                        distinct: false,
                        reduced: false,
                        members: SelectionMembers::All,
                    }
                } else {
                    let mut members = Vec::with_capacity(targets.len());
                    for target in targets {
                        members.push(match target {
                            ast::VarOrIri::Var(v) => SelectionMember::Variable(state.variable(v)?),
                            ast::VarOrIri::Iri(iri) => SelectionMember::Resolved(
                                state.iri(iri)?.into(),
                                state.fresh_variable("describe"),
                            ),
                        });
                    }
                    Selection {
                        distinct: false,
                        reduced: false,
                        members: SelectionMembers::Explicit(members),
                    }
                };
                Query::Describe {
                    dataset,
                    pattern: state.select(selection, pattern, modifiers, values)?,
                    base_iri: state.base_iri,
                }
            }
            ast::Query::Ask {
                prologue,
                dataset,
                pattern,
                modifiers,
                values,
            } => {
                let mut state = self.state(prologue)?;
                let dataset = state.dataset(dataset)?;
                let pattern = state.pattern(pattern)?;
                Query::Ask {
                    dataset,
                    pattern: state.select(Selection::everything(), pattern, modifiers, values)?,
                    base_iri: state.base_iri,
                }
            }
        };
        debug!(algebra = %query.to_sse(), "translated query");
        Ok(query)
    }

    /// Translates a parsed update request.
    pub fn translate_update(&self, update: &ast::Update) -> Result<Update, TranslationError> {
        let mut state = self.state(&update.prologue)?;
        let mut operations = Vec::new();
        for operation in &update.operations {
            state.update_operation(operation, &mut operations)?;
        }
        let update = Update {
            base_iri: state.base_iri,
            operations,
        };
        debug!(algebra = %update.to_sse(), "translated update");
        Ok(update)
    }

    fn state(&self, prologue: &ast::Prologue) -> Result<TranslationState, TranslationError> {
        let mut base_iri = self.base_iri.clone();
        if let Some(iri) = &prologue.base_iri {
            base_iri = Some(
                if let Some(base_iri) = &base_iri {
                    base_iri.resolve(iri)
                } else {
                    Iri::parse(iri.clone())
                }
                .map_err(|error| ResolutionError::InvalidBaseIri {
                    iri: iri.clone(),
                    error,
                })?,
            );
        }
        let mut state = TranslationState {
            base_iri,
            prefixes: self.prefixes.clone(),
            aggregates: None,
            counter: 0,
        };
        for (name, iri) in &prologue.prefixes {
            let iri = state.resolve_iri(iri)?.into_inner();
            state.prefixes.insert(name.clone(), iri);
        }
        Ok(state)
    }
}

struct TranslationState {
    base_iri: Option<Iri<String>>,
    prefixes: HashMap<String, String>,
    /// The aggregates of the SELECT being translated, `None` where aggregates are not allowed.
    aggregates: Option<Vec<(Variable, AggregateExpression)>>,
    counter: usize,
}

impl TranslationState {
    fn fresh_variable(&mut self, kind: &str) -> Variable {
        self.counter += 1;
        Variable::new_unchecked(format!("__{kind}_{}__", self.counter))
    }

    fn fresh_blank_node(&mut self) -> BlankNode {
        self.counter += 1;
        BlankNode::new_unchecked(format!("__path_{}", self.counter))
    }

    fn resolve_iri(&self, iri: &str) -> Result<Iri<String>, ResolutionError> {
        if let Some(base_iri) = &self.base_iri {
            base_iri.resolve(iri)
        } else {
            Iri::parse(iri.to_owned())
        }
        .map_err(|error| ResolutionError::InvalidIri {
            iri: iri.to_owned(),
            error,
        })
    }

    fn iri(&self, iri: &ast::Iri) -> Result<NamedNode, ResolutionError> {
        Ok(match iri {
            ast::Iri::Full(iri) => self.resolve_iri(iri)?.into(),
            ast::Iri::Prefixed { prefix, local } => {
                let Some(namespace) = self.prefixes.get(prefix) else {
                    return Err(ResolutionError::UndeclaredPrefix(prefix.clone()));
                };
                let iri = format!("{namespace}{local}");
                Iri::parse(iri.clone())
                    .map_err(|error| ResolutionError::InvalidIri { iri, error })?
                    .into()
            }
        })
    }

    fn variable(&self, name: &str) -> Result<Variable, ResolutionError> {
        Ok(Variable::new(name)?)
    }

    fn literal(&self, literal: &ast::Literal) -> Result<Literal, ResolutionError> {
        Ok(if let Some(language) = &literal.language {
            Literal::new_language_tagged_literal(literal.value.clone(), language.clone())?
        } else if let Some(datatype) = &literal.datatype {
            Literal::new_typed_literal(literal.value.clone(), self.iri(datatype)?)
        } else {
            Literal::new_simple_literal(literal.value.clone())
        })
    }

    fn var_or_iri(&self, term: &ast::VarOrIri) -> Result<NamedNodePattern, ResolutionError> {
        Ok(match term {
            ast::VarOrIri::Var(v) => self.variable(v)?.into(),
            ast::VarOrIri::Iri(iri) => self.iri(iri)?.into(),
        })
    }

    fn term_pattern(&self, term: &ast::VarOrTerm) -> Result<TermPattern, ResolutionError> {
        Ok(match term {
            ast::VarOrTerm::Var(v) => self.variable(v)?.into(),
            ast::VarOrTerm::Iri(iri) => self.iri(iri)?.into(),
            ast::VarOrTerm::BlankNode(id) => BlankNode::new(id.clone())?.into(),
            ast::VarOrTerm::Literal(literal) => self.literal(literal)?.into(),
        })
    }

    fn dataset(
        &self,
        clauses: &[ast::DatasetClause],
    ) -> Result<Option<QueryDataset>, TranslationError> {
        if clauses.is_empty() {
            return Ok(None);
        }
        let mut default = Vec::new();
        let mut named = Vec::new();
        for clause in clauses {
            match clause {
                ast::DatasetClause::Default(iri) => default.push(self.iri(iri)?),
                ast::DatasetClause::Named(iri) => named.push(self.iri(iri)?),
            }
        }
        Ok(Some(QueryDataset {
            default,
            named: Some(named),
        }))
    }

    /// Translates a `{ ... }` group where aggregates are not allowed.
    fn pattern(
        &mut self,
        elements: &[ast::GroupPatternElement],
    ) -> Result<GraphPattern, TranslationError> {
        let aggregates = self.aggregates.take();
        let result = self.group(elements);
        self.aggregates = aggregates;
        result
    }

    fn group(
        &mut self,
        elements: &[ast::GroupPatternElement],
    ) -> Result<GraphPattern, TranslationError> {
        let mut filters = Vec::new();
        let mut g = GraphPattern::default();
        for element in elements {
            match element {
                ast::GroupPatternElement::Triples(triples) => {
                    let triples = self.triples(triples)?;
                    g = new_join(g, triples);
                }
                ast::GroupPatternElement::Filter(expr) => filters.push(self.expression(expr)?),
                ast::GroupPatternElement::Optional(p) => {
                    g = match self.group(p)? {
                        GraphPattern::Filter { expr, inner, .. } => GraphPattern::LeftJoin {
                            left: Box::new(g),
                            right: inner,
                            expression: Some(expr),
                        },
                        p => GraphPattern::LeftJoin {
                            left: Box::new(g),
                            right: Box::new(p),
                            expression: None,
                        },
                    }
                }
                ast::GroupPatternElement::Minus(p) => {
                    g = GraphPattern::Minus {
                        left: Box::new(g),
                        right: Box::new(self.group(p)?),
                    }
                }
                ast::GroupPatternElement::Union(alternatives) => {
                    let mut union = None;
                    for alternative in alternatives {
                        let alternative = self.group(alternative)?;
                        union = Some(match union {
                            Some(left) => GraphPattern::Union {
                                left: Box::new(left),
                                right: Box::new(alternative),
                            },
                            None => alternative,
                        });
                    }
                    g = new_join(g, union.unwrap_or_default());
                }
                ast::GroupPatternElement::Group(p) => {
                    let p = self.group(p)?;
                    g = new_join(g, p);
                }
                ast::GroupPatternElement::Graph { name, pattern } => {
                    let name = self.var_or_iri(name)?;
                    let inner = self.group(pattern)?;
                    g = new_join(
                        g,
                        GraphPattern::Graph {
                            name,
                            inner: Box::new(inner),
                        },
                    );
                }
                ast::GroupPatternElement::Service {
                    name,
                    silent,
                    pattern,
                } => {
                    let name = self.var_or_iri(name)?;
                    let inner = self.group(pattern)?;
                    g = new_join(
                        g,
                        GraphPattern::Service {
                            name,
                            inner: Box::new(inner),
                            silent: *silent,
                        },
                    );
                }
                ast::GroupPatternElement::Bind {
                    expression,
                    variable,
                } => {
                    let variable = self.variable(variable)?;
                    if g.in_scope_variables().contains(&variable) {
                        return Err(SyntaxLoweringError::VariableAlreadyBound(variable).into());
                    }
                    g = GraphPattern::Extend {
                        inner: Box::new(g),
                        variable,
                        expression: self.expression(expression)?,
                    };
                }
                ast::GroupPatternElement::Values(values) => {
                    let values = self.values(values)?;
                    g = new_join(
                        g,
                        GraphPattern::ToMultiSet {
                            inner: Box::new(values),
                        },
                    );
                }
                ast::GroupPatternElement::SubSelect(sub_select) => {
                    let ast::SubSelect {
                        select,
                        pattern,
                        modifiers,
                        values,
                    } = sub_select.as_ref();
                    let pattern = self.group(pattern)?;
                    let aggregates = self.aggregates.take();
                    let inner = self.select(Selection::from(select), pattern, modifiers, values);
                    self.aggregates = aggregates;
                    g = new_join(
                        g,
                        GraphPattern::ToMultiSet {
                            inner: Box::new(inner?),
                        },
                    );
                }
            }
        }
        Ok(if let Some(expr) = Expression::and_all(filters) {
            GraphPattern::Filter {
                expr,
                inner: Box::new(g),
                isolated: true,
            }
        } else {
            g
        })
    }

    fn triples(&mut self, triples: &[ast::TriplesPattern]) -> Result<GraphPattern, TranslationError> {
        let mut patterns = Vec::new();
        for triple in triples {
            let subject = self.term_pattern(&triple.subject)?;
            let object = self.term_pattern(&triple.object)?;
            match &triple.verb {
                ast::Verb::Var(v) => patterns.push(TripleOrPathPattern::Triple(
                    TriplePattern::new(subject, self.variable(v)?, object),
                )),
                ast::Verb::Path(path) => {
                    let path = self.path(path)?;
                    self.add_to_triple_or_path_patterns(subject, path, object, &mut patterns);
                }
            }
        }
        Ok(build_bgp(patterns))
    }

    fn add_to_triple_or_path_patterns(
        &mut self,
        subject: TermPattern,
        path: PropertyPathExpression,
        object: TermPattern,
        patterns: &mut Vec<TripleOrPathPattern>,
    ) {
        match path {
            PropertyPathExpression::NamedNode(p) => {
                patterns.push(TripleOrPathPattern::Triple(TriplePattern::new(
                    subject, p, object,
                )));
            }
            PropertyPathExpression::Reverse(p) => {
                self.add_to_triple_or_path_patterns(object, *p, subject, patterns)
            }
            PropertyPathExpression::Sequence(a, b) => {
                let middle = self.fresh_blank_node();
                self.add_to_triple_or_path_patterns(subject, *a, middle.clone().into(), patterns);
                self.add_to_triple_or_path_patterns(middle.into(), *b, object, patterns);
            }
            path => patterns.push(TripleOrPathPattern::Path {
                subject,
                path,
                object,
            }),
        }
    }

    fn path(&self, path: &ast::Path) -> Result<PropertyPathExpression, TranslationError> {
        Ok(match path {
            ast::Path::Iri(iri) => self.iri(iri)?.into(),
            ast::Path::A => rdf::TYPE.into_owned().into(),
            ast::Path::Inverse(p) => PropertyPathExpression::Reverse(Box::new(self.path(p)?)),
            ast::Path::Sequence(elements) => self
                .paths(elements)?
                .into_iter()
                .reduce(|a, b| PropertyPathExpression::Sequence(Box::new(a), Box::new(b)))
                .ok_or(SyntaxLoweringError::EmptyPath)?,
            ast::Path::Alternative(elements) => self
                .paths(elements)?
                .into_iter()
                .reduce(|a, b| PropertyPathExpression::Alternative(Box::new(a), Box::new(b)))
                .ok_or(SyntaxLoweringError::EmptyPath)?,
            ast::Path::ZeroOrMore(p) => PropertyPathExpression::ZeroOrMore(Box::new(self.path(p)?)),
            ast::Path::OneOrMore(p) => PropertyPathExpression::OneOrMore(Box::new(self.path(p)?)),
            ast::Path::ZeroOrOne(p) => PropertyPathExpression::ZeroOrOne(Box::new(self.path(p)?)),
            ast::Path::NegatedPropertySet(elements) => {
                if elements.is_empty() {
                    return Err(SyntaxLoweringError::EmptyPath.into());
                }
                let mut direct = Vec::new();
                let mut inverse = Vec::new();
                for element in elements {
                    match element {
                        ast::NegatedPathElement::Iri(iri) => direct.push(self.iri(iri)?),
                        ast::NegatedPathElement::A => direct.push(rdf::TYPE.into_owned()),
                        ast::NegatedPathElement::Inverse(iri) => inverse.push(self.iri(iri)?),
                        ast::NegatedPathElement::InverseA => inverse.push(rdf::TYPE.into_owned()),
                    }
                }
                match (direct.is_empty(), inverse.is_empty()) {
                    (_, true) => PropertyPathExpression::NegatedPropertySet(direct),
                    (true, false) => PropertyPathExpression::Reverse(Box::new(
                        PropertyPathExpression::NegatedPropertySet(inverse),
                    )),
                    (false, false) => PropertyPathExpression::Alternative(
                        Box::new(PropertyPathExpression::NegatedPropertySet(direct)),
                        Box::new(PropertyPathExpression::Reverse(Box::new(
                            PropertyPathExpression::NegatedPropertySet(inverse),
                        ))),
                    ),
                }
            }
        })
    }

    fn paths(&self, paths: &[ast::Path]) -> Result<Vec<PropertyPathExpression>, TranslationError> {
        paths.iter().map(|p| self.path(p)).collect()
    }

    /// Triple patterns where only plain predicates are allowed.
    fn triple_template(
        &self,
        triples: &[ast::TriplesPattern],
        position: &'static str,
    ) -> Result<Vec<TriplePattern>, TranslationError> {
        triples
            .iter()
            .map(|triple| {
                let predicate: NamedNodePattern = match &triple.verb {
                    ast::Verb::Var(v) => self.variable(v)?.into(),
                    ast::Verb::Path(ast::Path::Iri(iri)) => self.iri(iri)?.into(),
                    ast::Verb::Path(ast::Path::A) => rdf::TYPE.into_owned().into(),
                    ast::Verb::Path(_) => {
                        return Err(SyntaxLoweringError::PathNotAllowed(position).into());
                    }
                };
                Ok(TriplePattern::new(
                    self.term_pattern(&triple.subject)?,
                    predicate,
                    self.term_pattern(&triple.object)?,
                ))
            })
            .collect()
    }

    fn values(&self, values: &ast::ValuesClause) -> Result<GraphPattern, TranslationError> {
        let variables = values
            .variables
            .iter()
            .map(|v| self.variable(v))
            .collect::<Result<Vec<_>, _>>()?;
        let mut bindings = Vec::with_capacity(values.rows.len());
        for row in &values.rows {
            if row.len() != variables.len() {
                return Err(SyntaxLoweringError::ValuesArity {
                    expected: variables.len(),
                    found: row.len(),
                }
                .into());
            }
            bindings.push(
                row.iter()
                    .map(|value| {
                        Ok(match value {
                            None => None,
                            Some(ast::VarOrTerm::Iri(iri)) => Some(self.iri(iri)?.into()),
                            Some(ast::VarOrTerm::Literal(l)) => Some(self.literal(l)?.into()),
                            Some(ast::VarOrTerm::Var(_)) => {
                                return Err(SyntaxLoweringError::VariableNotAllowed("VALUES").into());
                            }
                            Some(ast::VarOrTerm::BlankNode(_)) => {
                                return Err(SyntaxLoweringError::BlankNodeNotAllowed("VALUES").into());
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, TranslationError>>()?,
            );
        }
        Ok(GraphPattern::Values {
            variables,
            bindings,
        })
    }

    fn expression(&mut self, expr: &ast::Expression) -> Result<Expression, TranslationError> {
        Ok(match expr {
            ast::Expression::Var(v) => self.variable(v)?.into(),
            ast::Expression::Iri(iri) => self.iri(iri)?.into(),
            ast::Expression::Literal(l) => self.literal(l)?.into(),
            ast::Expression::Or(a, b) => Expression::Or(self.boxed(a)?, self.boxed(b)?),
            ast::Expression::And(a, b) => Expression::And(self.boxed(a)?, self.boxed(b)?),
            ast::Expression::Equal(a, b) => Expression::Equal(self.boxed(a)?, self.boxed(b)?),
            ast::Expression::NotEqual(a, b) => Expression::Not(Box::new(Expression::Equal(
                self.boxed(a)?,
                self.boxed(b)?,
            ))),
            ast::Expression::Less(a, b) => Expression::Less(self.boxed(a)?, self.boxed(b)?),
            ast::Expression::Greater(a, b) => Expression::Greater(self.boxed(a)?, self.boxed(b)?),
            ast::Expression::LessOrEqual(a, b) => {
                Expression::LessOrEqual(self.boxed(a)?, self.boxed(b)?)
            }
            ast::Expression::GreaterOrEqual(a, b) => {
                Expression::GreaterOrEqual(self.boxed(a)?, self.boxed(b)?)
            }
            ast::Expression::In(a, list) => Expression::In(self.boxed(a)?, self.expressions(list)?),
            ast::Expression::NotIn(a, list) => Expression::Not(Box::new(Expression::In(
                self.boxed(a)?,
                self.expressions(list)?,
            ))),
            ast::Expression::Add(a, b) => Expression::Add(self.boxed(a)?, self.boxed(b)?),
            ast::Expression::Subtract(a, b) => {
                Expression::Subtract(self.boxed(a)?, self.boxed(b)?)
            }
            ast::Expression::Multiply(a, b) => {
                Expression::Multiply(self.boxed(a)?, self.boxed(b)?)
            }
            ast::Expression::Divide(a, b) => Expression::Divide(self.boxed(a)?, self.boxed(b)?),
            ast::Expression::UnaryPlus(e) => Expression::UnaryPlus(self.boxed(e)?),
            ast::Expression::UnaryMinus(e) => Expression::UnaryMinus(self.boxed(e)?),
            ast::Expression::Not(e) => Expression::Not(self.boxed(e)?),
            ast::Expression::BuiltIn { name, args } => self.built_in(name, args)?,
            ast::Expression::FunctionCall { iri, args } => Expression::FunctionCall(
                Function::Custom(self.iri(iri)?),
                self.expressions(args)?,
            ),
            ast::Expression::Exists(p) => Expression::Exists(Box::new(self.exists(p)?)),
            ast::Expression::NotExists(p) => Expression::Not(Box::new(Expression::Exists(
                Box::new(self.exists(p)?),
            ))),
            ast::Expression::Aggregate {
                name,
                distinct,
                arg,
                separator,
            } => {
                let function = match name.to_ascii_uppercase().as_str() {
                    "COUNT" => AggregateFunction::Count,
                    "SUM" => AggregateFunction::Sum,
                    "AVG" => AggregateFunction::Avg,
                    "MIN" => AggregateFunction::Min,
                    "MAX" => AggregateFunction::Max,
                    "SAMPLE" => AggregateFunction::Sample,
                    "GROUP_CONCAT" => AggregateFunction::GroupConcat {
                        separator: separator.clone(),
                    },
                    _ => return Err(SyntaxLoweringError::UnknownAggregate(name.clone()).into()),
                };
                if arg.is_none() && function != AggregateFunction::Count {
                    return Err(SyntaxLoweringError::AggregateWithoutArgument(name.clone()).into());
                }
                let aggregate = AggregateExpression {
                    function,
                    expr: arg.as_deref().map(|a| self.boxed(a)).transpose()?,
                    distinct: *distinct,
                };
                self.new_aggregation(aggregate)?.into()
            }
        })
    }

    fn boxed(&mut self, expr: &ast::Expression) -> Result<Box<Expression>, TranslationError> {
        Ok(Box::new(self.expression(expr)?))
    }

    fn expressions(
        &mut self,
        exprs: &[ast::Expression],
    ) -> Result<Vec<Expression>, TranslationError> {
        exprs.iter().map(|e| self.expression(e)).collect()
    }

    fn built_in(
        &mut self,
        name: &str,
        args: &[ast::Expression],
    ) -> Result<Expression, TranslationError> {
        Ok(match (name.to_ascii_uppercase().as_str(), args) {
            ("BOUND", [ast::Expression::Var(v)]) => Expression::Bound(self.variable(v)?),
            ("IF", [a, b, c]) => Expression::If(self.boxed(a)?, self.boxed(b)?, self.boxed(c)?),
            ("COALESCE", args) => Expression::Coalesce(self.expressions(args)?),
            ("SAMETERM", [a, b]) => Expression::SameTerm(self.boxed(a)?, self.boxed(b)?),
            ("BOUND" | "IF" | "SAMETERM", _) => {
                return Err(SyntaxLoweringError::UnknownFunction(format!(
                    "{name}/{}",
                    args.len()
                ))
                .into());
            }
            _ => {
                let function = Function::from_keyword(name)
                    .ok_or_else(|| SyntaxLoweringError::UnknownFunction(name.to_owned()))?;
                Expression::FunctionCall(function, self.expressions(args)?)
            }
        })
    }

    /// The top-level filter of an `EXISTS` pattern sees the variables of the tested solution.
    fn exists(
        &mut self,
        elements: &[ast::GroupPatternElement],
    ) -> Result<GraphPattern, TranslationError> {
        Ok(match self.pattern(elements)? {
            GraphPattern::Filter { expr, inner, .. } => GraphPattern::Filter {
                expr,
                inner,
                isolated: false,
            },
            p => p,
        })
    }

    fn new_aggregation(
        &mut self,
        aggregate: AggregateExpression,
    ) -> Result<Variable, TranslationError> {
        if self.aggregates.is_none() {
            return Err(SyntaxLoweringError::AggregateNotAllowed.into());
        }
        if let Some(v) = self.aggregates.as_ref().and_then(|aggregates| {
            aggregates
                .iter()
                .find_map(|(v, a)| (*a == aggregate).then(|| v.clone()))
        }) {
            return Ok(v);
        }
        let v = self.fresh_variable("agg");
        if let Some(aggregates) = &mut self.aggregates {
            aggregates.push((v.clone(), aggregate));
        }
        Ok(v)
    }

    /// Builds the solution modifiers on top of `pattern`.
    ///
    /// The order is GROUP BY, aggregates, HAVING, VALUES, SELECT expressions, ORDER BY, projection, DISTINCT or REDUCED and finally OFFSET and LIMIT.
    fn select(
        &mut self,
        selection: Selection<'_>,
        mut p: GraphPattern,
        modifiers: &ast::SolutionModifiers,
        values: &Option<ast::ValuesClause>,
    ) -> Result<GraphPattern, TranslationError> {
        // GROUP BY
        let mut group_expressions = Vec::with_capacity(modifiers.group_by.len());
        for condition in &modifiers.group_by {
            let expression = self.pattern_expression(&condition.expression)?;
            if let Some(variable) = &condition.variable {
                let variable = self.variable(variable)?;
                p = GraphPattern::Extend {
                    inner: Box::new(p),
                    variable: variable.clone(),
                    expression,
                };
                group_expressions.push(variable.into());
            } else {
                group_expressions.push(expression);
            }
        }
        let group_keys = group_expressions
            .iter()
            .filter_map(|e| match e {
                Expression::Variable(v) => Some(v.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();

        // Aggregates are collected from the SELECT, HAVING and ORDER BY expressions
        self.aggregates = Some(Vec::new());
        let members = match &selection.members {
            SelectionMembers::Explicit(members) => members
                .iter()
                .map(|member| {
                    Ok(match member {
                        SelectionMember::Variable(v) => (v.clone(), None),
                        SelectionMember::Resolved(e, v) => (v.clone(), Some(e.clone())),
                        SelectionMember::Parsed(item) => match item {
                            ast::SelectItem::Var(v) => (self.variable(v)?, None),
                            ast::SelectItem::Expression {
                                expression,
                                variable,
                            } => (self.variable(variable)?, Some(self.expression(expression)?)),
                        },
                    })
                })
                .collect::<Result<Vec<_>, TranslationError>>(),
            SelectionMembers::All | SelectionMembers::Everything => Ok(Vec::new()),
        };
        let having = modifiers
            .having
            .iter()
            .map(|e| self.expression(e))
            .collect::<Result<Vec<_>, _>>();
        let order_by = modifiers
            .order_by
            .iter()
            .map(|c| {
                let e = self.expression(&c.expression)?;
                Ok(if c.descending {
                    OrderExpression::Desc(e)
                } else {
                    OrderExpression::Asc(e)
                })
            })
            .collect::<Result<Vec<_>, TranslationError>>();
        let mut aggregates = self.aggregates.take().unwrap_or_default();
        let mut members = members?;
        let mut having = having?;
        let mut order_by = order_by?;

        let grouped = !group_expressions.is_empty() || !aggregates.is_empty();
        if grouped {
            // Variables that are neither grouped nor aggregated are sampled
            let mut sampler = Sampler {
                keys: &group_keys,
                aggregates: &mut aggregates,
                state: self,
            };
            let mut sampled_members = Vec::with_capacity(members.len());
            for (v, e) in members {
                sampled_members.push(match e {
                    Some(e) => (v, Some(sampler.expression(e))),
                    None if group_keys.contains(&v) => (v, None),
                    None => {
                        let sample = sampler.sample(v.clone());
                        (v, Some(sample.into()))
                    }
                });
            }
            members = sampled_members;
            having = having.into_iter().map(|e| sampler.expression(e)).collect();
            order_by = order_by
                .into_iter()
                .map(|c| match c {
                    OrderExpression::Asc(e) => OrderExpression::Asc(sampler.expression(e)),
                    OrderExpression::Desc(e) => OrderExpression::Desc(sampler.expression(e)),
                })
                .collect();
            p = GraphPattern::AggregateJoin {
                group: Box::new(GraphPattern::Group {
                    inner: Box::new(p),
                    expressions: group_expressions,
                }),
                aggregates,
            };
        }

        // HAVING
        if let Some(expr) = Expression::and_all(having) {
            p = GraphPattern::Filter {
                expr,
                inner: Box::new(p),
                isolated: true,
            };
        }

        // VALUES
        if let Some(values) = values {
            let values = self.values(values)?;
            p = new_join(
                p,
                GraphPattern::ToMultiSet {
                    inner: Box::new(values),
                },
            );
        }

        // SELECT
        let projection = match selection.members {
            SelectionMembers::Explicit(_) => {
                let mut projection = Vec::with_capacity(members.len());
                for (variable, expression) in members {
                    if let Some(expression) = expression {
                        if p.in_scope_variables().contains(&variable) {
                            return Err(SyntaxLoweringError::VariableAlreadyBound(variable).into());
                        }
                        p = GraphPattern::Extend {
                            inner: Box::new(p),
                            variable: variable.clone(),
                            expression,
                        };
                    }
                    if !projection.contains(&variable) {
                        projection.push(variable);
                    }
                }
                Some(projection)
            }
            SelectionMembers::All => Some(if grouped {
                group_keys
            } else {
                p.in_scope_variables()
            }),
            SelectionMembers::Everything => None,
        };

        // ORDER BY
        if !order_by.is_empty() {
            p = GraphPattern::OrderBy {
                inner: Box::new(p),
                expression: order_by,
            };
        }

        // PROJECT
        if let Some(variables) = projection {
            p = GraphPattern::Project {
                inner: Box::new(p),
                variables,
            };
        }
        if selection.distinct {
            p = GraphPattern::Distinct { inner: Box::new(p) };
        } else if selection.reduced {
            p = GraphPattern::Reduced { inner: Box::new(p) };
        }

        // OFFSET LIMIT
        if modifiers.offset.is_some() || modifiers.limit.is_some() {
            p = GraphPattern::Slice {
                inner: Box::new(p),
                start: modifiers.offset.unwrap_or(0),
                length: modifiers.limit,
            };
        }
        Ok(p)
    }

    /// An expression of the WHERE part: aggregates are forbidden.
    fn pattern_expression(&mut self, expr: &ast::Expression) -> Result<Expression, TranslationError> {
        let aggregates = self.aggregates.take();
        let result = self.expression(expr);
        self.aggregates = aggregates;
        result
    }

    fn quads(
        &mut self,
        elements: &[ast::QuadsElement],
    ) -> Result<Vec<QuadPattern>, TranslationError> {
        let mut quads = Vec::new();
        for element in elements {
            let (graph_name, triples) = match element {
                ast::QuadsElement::Triples(triples) => (GraphNamePattern::DefaultGraph, triples),
                ast::QuadsElement::Graph { name, triples } => {
                    (self.var_or_iri(name)?.into(), triples)
                }
            };
            for triple in self.triple_template(triples, "quad templates")? {
                quads.push(QuadPattern::new(triple, graph_name.clone()));
            }
        }
        Ok(quads)
    }

    fn ground_quads(
        &mut self,
        elements: &[ast::QuadsElement],
        position: &'static str,
        allow_blank_nodes: bool,
    ) -> Result<Vec<Quad>, TranslationError> {
        self.quads(elements)?
            .into_iter()
            .map(|q| {
                let subject = match q.subject {
                    TermPattern::NamedNode(n) => n.into(),
                    TermPattern::BlankNode(n) if allow_blank_nodes => n.into(),
                    TermPattern::BlankNode(_) => {
                        return Err(SyntaxLoweringError::BlankNodeNotAllowed(position).into());
                    }
                    TermPattern::Literal(_) | TermPattern::Variable(_) => {
                        return Err(SyntaxLoweringError::VariableNotAllowed(position).into());
                    }
                };
                let NamedNodePattern::NamedNode(predicate) = q.predicate else {
                    return Err(SyntaxLoweringError::VariableNotAllowed(position).into());
                };
                let object: Term = match q.object {
                    TermPattern::NamedNode(n) => n.into(),
                    TermPattern::Literal(l) => l.into(),
                    TermPattern::BlankNode(n) if allow_blank_nodes => n.into(),
                    TermPattern::BlankNode(_) => {
                        return Err(SyntaxLoweringError::BlankNodeNotAllowed(position).into());
                    }
                    TermPattern::Variable(_) => {
                        return Err(SyntaxLoweringError::VariableNotAllowed(position).into());
                    }
                };
                let graph_name = match q.graph_name {
                    GraphNamePattern::NamedNode(n) => GraphName::from(n),
                    GraphNamePattern::DefaultGraph => GraphName::DefaultGraph,
                    GraphNamePattern::Variable(_) => {
                        return Err(SyntaxLoweringError::VariableNotAllowed(position).into());
                    }
                };
                Ok(Quad {
                    subject,
                    predicate,
                    object,
                    graph_name,
                })
            })
            .collect()
    }

    fn graph_or_default(&self, graph: &ast::GraphOrDefault) -> Result<GraphName, TranslationError> {
        Ok(match graph {
            ast::GraphOrDefault::Default => GraphName::DefaultGraph,
            ast::GraphOrDefault::Graph(iri) => self.iri(iri)?.into(),
        })
    }

    fn graph_target(&self, target: &ast::GraphRefAll) -> Result<GraphTarget, TranslationError> {
        Ok(match target {
            ast::GraphRefAll::Graph(iri) => GraphTarget::NamedNode(self.iri(iri)?),
            ast::GraphRefAll::Default => GraphTarget::DefaultGraph,
            ast::GraphRefAll::Named => GraphTarget::NamedGraphs,
            ast::GraphRefAll::All => GraphTarget::AllGraphs,
        })
    }

    fn update_operation(
        &mut self,
        operation: &ast::UpdateOperation,
        operations: &mut Vec<GraphUpdateOperation>,
    ) -> Result<(), TranslationError> {
        match operation {
            ast::UpdateOperation::InsertData(data) => {
                operations.push(GraphUpdateOperation::InsertData {
                    data: self.ground_quads(data, "INSERT DATA", true)?,
                });
            }
            ast::UpdateOperation::DeleteData(data) => {
                operations.push(GraphUpdateOperation::DeleteData {
                    data: self.ground_quads(data, "DELETE DATA", false)?,
                });
            }
            ast::UpdateOperation::DeleteWhere(data) => {
                let delete = self.quads(data)?;
                if delete
                    .iter()
                    .any(|q| matches!(q.subject, TermPattern::BlankNode(_)) || matches!(q.object, TermPattern::BlankNode(_)))
                {
                    return Err(SyntaxLoweringError::BlankNodeNotAllowed("DELETE WHERE").into());
                }
                let pattern = delete
                    .iter()
                    .map(|q| {
                        let bgp = bgp(vec![TriplePattern::new(
                            q.subject.clone(),
                            q.predicate.clone(),
                            q.object.clone(),
                        )]);
                        match &q.graph_name {
                            GraphNamePattern::NamedNode(g) => GraphPattern::Graph {
                                name: g.clone().into(),
                                inner: Box::new(bgp),
                            },
                            GraphNamePattern::Variable(g) => GraphPattern::Graph {
                                name: g.clone().into(),
                                inner: Box::new(bgp),
                            },
                            GraphNamePattern::DefaultGraph => bgp,
                        }
                    })
                    .reduce(new_join)
                    .unwrap_or_default();
                operations.push(GraphUpdateOperation::DeleteInsert {
                    delete,
                    insert: Vec::new(),
                    using: None,
                    pattern: Box::new(pattern),
                });
            }
            ast::UpdateOperation::Modify {
                with,
                delete,
                insert,
                using,
                pattern,
            } => {
                let mut delete = self.quads(delete)?;
                if delete
                    .iter()
                    .any(|q| matches!(q.subject, TermPattern::BlankNode(_)) || matches!(q.object, TermPattern::BlankNode(_)))
                {
                    return Err(SyntaxLoweringError::BlankNodeNotAllowed("DELETE").into());
                }
                let mut insert = self.quads(insert)?;
                let mut using = self.dataset(using)?;
                let pattern = self.pattern(pattern)?;
                if let Some(with) = with {
                    let with = self.iri(with)?;
                    for q in delete.iter_mut().chain(&mut insert) {
                        if q.graph_name == GraphNamePattern::DefaultGraph {
                            q.graph_name = GraphNamePattern::NamedNode(with.clone());
                        }
                    }
                    if using.is_none() {
                        using = Some(QueryDataset {
                            default: vec![with],
                            named: None,
                        });
                    }
                }
                operations.push(GraphUpdateOperation::DeleteInsert {
                    delete,
                    insert,
                    using,
                    pattern: Box::new(pattern),
                });
            }
            ast::UpdateOperation::Load {
                silent,
                source,
                destination,
            } => operations.push(GraphUpdateOperation::Load {
                silent: *silent,
                source: self.iri(source)?,
                destination: match destination {
                    Some(d) => self.iri(d)?.into(),
                    None => GraphName::DefaultGraph,
                },
            }),
            ast::UpdateOperation::Clear { silent, target } => {
                operations.push(GraphUpdateOperation::Clear {
                    silent: *silent,
                    graph: self.graph_target(target)?,
                })
            }
            ast::UpdateOperation::Drop { silent, target } => {
                operations.push(GraphUpdateOperation::Drop {
                    silent: *silent,
                    graph: self.graph_target(target)?,
                })
            }
            ast::UpdateOperation::Create { silent, graph } => {
                operations.push(GraphUpdateOperation::Create {
                    silent: *silent,
                    graph: self.iri(graph)?,
                })
            }
            ast::UpdateOperation::Add { silent: _, from, to } => {
                let (from, to) = (self.graph_or_default(from)?, self.graph_or_default(to)?);
                if from != to {
                    operations.push(copy_graph(from, to));
                }
            }
            ast::UpdateOperation::Move { silent, from, to } => {
                let (from, to) = (self.graph_or_default(from)?, self.graph_or_default(to)?);
                if from != to {
                    operations.push(GraphUpdateOperation::Drop {
                        silent: true,
                        graph: graph_target(&to),
                    });
                    operations.push(copy_graph(from.clone(), to));
                    operations.push(GraphUpdateOperation::Drop {
                        silent: *silent,
                        graph: graph_target(&from),
                    });
                }
            }
            ast::UpdateOperation::Copy { silent: _, from, to } => {
                let (from, to) = (self.graph_or_default(from)?, self.graph_or_default(to)?);
                if from != to {
                    operations.push(GraphUpdateOperation::Drop {
                        silent: true,
                        graph: graph_target(&to),
                    });
                    operations.push(copy_graph(from, to));
                }
            }
        }
        Ok(())
    }
}

/// Replaces in the expressions computed after grouping the variables that are not group keys by `SAMPLE` aggregates.
struct Sampler<'a> {
    keys: &'a [Variable],
    aggregates: &'a mut Vec<(Variable, AggregateExpression)>,
    state: &'a mut TranslationState,
}

impl Sampler<'_> {
    fn sample(&mut self, v: Variable) -> Variable {
        let aggregate = AggregateExpression {
            function: AggregateFunction::Sample,
            expr: Some(Box::new(v.into())),
            distinct: false,
        };
        if let Some((v, _)) = self.aggregates.iter().find(|(_, a)| *a == aggregate) {
            return v.clone();
        }
        let v = self.state.fresh_variable("agg");
        self.aggregates.push((v.clone(), aggregate));
        v
    }

    fn expression(&mut self, expr: Expression) -> Expression {
        match expr {
            Expression::Variable(v)
                if !self.keys.contains(&v) && !self.aggregates.iter().any(|(a, _)| *a == v) =>
            {
                self.sample(v).into()
            }
            Expression::Or(a, b) => Expression::Or(self.boxed(*a), self.boxed(*b)),
            Expression::And(a, b) => Expression::And(self.boxed(*a), self.boxed(*b)),
            Expression::Equal(a, b) => Expression::Equal(self.boxed(*a), self.boxed(*b)),
            Expression::SameTerm(a, b) => Expression::SameTerm(self.boxed(*a), self.boxed(*b)),
            Expression::Greater(a, b) => Expression::Greater(self.boxed(*a), self.boxed(*b)),
            Expression::GreaterOrEqual(a, b) => {
                Expression::GreaterOrEqual(self.boxed(*a), self.boxed(*b))
            }
            Expression::Less(a, b) => Expression::Less(self.boxed(*a), self.boxed(*b)),
            Expression::LessOrEqual(a, b) => {
                Expression::LessOrEqual(self.boxed(*a), self.boxed(*b))
            }
            Expression::In(a, b) => Expression::In(
                self.boxed(*a),
                b.into_iter().map(|e| self.expression(e)).collect(),
            ),
            Expression::Add(a, b) => Expression::Add(self.boxed(*a), self.boxed(*b)),
            Expression::Subtract(a, b) => Expression::Subtract(self.boxed(*a), self.boxed(*b)),
            Expression::Multiply(a, b) => Expression::Multiply(self.boxed(*a), self.boxed(*b)),
            Expression::Divide(a, b) => Expression::Divide(self.boxed(*a), self.boxed(*b)),
            Expression::UnaryPlus(e) => Expression::UnaryPlus(self.boxed(*e)),
            Expression::UnaryMinus(e) => Expression::UnaryMinus(self.boxed(*e)),
            Expression::Not(e) => Expression::Not(self.boxed(*e)),
            Expression::If(a, b, c) => {
                Expression::If(self.boxed(*a), self.boxed(*b), self.boxed(*c))
            }
            Expression::Coalesce(l) => {
                Expression::Coalesce(l.into_iter().map(|e| self.expression(e)).collect())
            }
            Expression::FunctionCall(f, l) => {
                Expression::FunctionCall(f, l.into_iter().map(|e| self.expression(e)).collect())
            }
            e @ (Expression::NamedNode(_)
            | Expression::Literal(_)
            | Expression::Variable(_)
            | Expression::Bound(_)
            | Expression::Exists(_)) => e,
        }
    }

    fn boxed(&mut self, expr: Expression) -> Box<Expression> {
        Box::new(self.expression(expr))
    }
}

struct Selection<'a> {
    distinct: bool,
    reduced: bool,
    members: SelectionMembers<'a>,
}

enum SelectionMembers<'a> {
    Explicit(Vec<SelectionMember<'a>>),
    /// `SELECT *`
    All,
    /// No projection at all, used by `CONSTRUCT` and `ASK`.
    Everything,
}

enum SelectionMember<'a> {
    Variable(Variable),
    Resolved(Expression, Variable),
    Parsed(&'a ast::SelectItem),
}

impl Selection<'_> {
    fn everything() -> Self {
        Self {
            distinct: false,
            reduced: false,
            members: SelectionMembers::Everything,
        }
    }
}

impl<'a> From<&'a ast::SelectClause> for Selection<'a> {
    fn from(select: &'a ast::SelectClause) -> Self {
        Self {
            distinct: select.distinct,
            reduced: select.reduced,
            members: if select.projection.is_empty() {
                SelectionMembers::All
            } else {
                SelectionMembers::Explicit(
                    select.projection.iter().map(SelectionMember::Parsed).collect(),
                )
            },
        }
    }
}

enum TripleOrPathPattern {
    Triple(TriplePattern),
    Path {
        subject: TermPattern,
        path: PropertyPathExpression,
        object: TermPattern,
    },
}

fn build_bgp(patterns: Vec<TripleOrPathPattern>) -> GraphPattern {
    let mut triples = Vec::new();
    let mut elements = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        match pattern {
            TripleOrPathPattern::Triple(t) => triples.push(t),
            TripleOrPathPattern::Path {
                subject,
                path,
                object,
            } => {
                if !triples.is_empty() {
                    elements.push(bgp(take(&mut triples)));
                }
                elements.push(GraphPattern::Path {
                    subject,
                    path,
                    object,
                })
            }
        }
    }
    if !triples.is_empty() {
        elements.push(bgp(triples));
    }
    elements.into_iter().reduce(new_join).unwrap_or_default()
}

fn bgp(patterns: Vec<TriplePattern>) -> GraphPattern {
    GraphPattern::Bgp {
        patterns: reorder_triples(patterns),
    }
}

/// Joins two patterns, merging adjacent basic graph patterns and dropping empty ones.
///
/// The join is marked lazy if none of the sides contains a slice or a distinct.
fn new_join(l: GraphPattern, r: GraphPattern) -> GraphPattern {
    match (l, r) {
        (GraphPattern::Bgp { patterns }, other) | (other, GraphPattern::Bgp { patterns })
            if patterns.is_empty() =>
        {
            other
        }
        (GraphPattern::Bgp { patterns: mut pl }, GraphPattern::Bgp { patterns: pr }) => {
            pl.extend(pr);
            bgp(pl)
        }
        (l, r) => GraphPattern::Join {
            lazy: allows_lazy_join(&l) && allows_lazy_join(&r),
            left: Box::new(l),
            right: Box::new(r),
        },
    }
}

fn allows_lazy_join(pattern: &GraphPattern) -> bool {
    match pattern {
        GraphPattern::Slice { .. } | GraphPattern::Distinct { .. } => false,
        GraphPattern::Bgp { .. } | GraphPattern::Path { .. } | GraphPattern::Values { .. } => true,
        GraphPattern::Join { left, right, .. }
        | GraphPattern::LeftJoin { left, right, .. }
        | GraphPattern::Union { left, right }
        | GraphPattern::Minus { left, right } => {
            allows_lazy_join(left) && allows_lazy_join(right)
        }
        GraphPattern::Filter { inner, .. }
        | GraphPattern::Graph { inner, .. }
        | GraphPattern::Extend { inner, .. }
        | GraphPattern::ToMultiSet { inner }
        | GraphPattern::OrderBy { inner, .. }
        | GraphPattern::Project { inner, .. }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Group { inner, .. }
        | GraphPattern::Service { inner, .. } => allows_lazy_join(inner),
        GraphPattern::AggregateJoin { group, .. } => allows_lazy_join(group),
    }
}

/// Greedy reordering of the triple patterns of a basic graph pattern.
///
/// Patterns are picked by increasing number of positions not bound by the already picked patterns,
/// then by decreasing number of occurrences of their variables in the whole basic graph pattern,
/// then with non-literal objects first.
fn reorder_triples(patterns: Vec<TriplePattern>) -> Vec<TriplePattern> {
    if patterns.len() < 2 {
        return patterns;
    }
    let mut occurrences = FxHashMap::<String, usize>::default();
    for pattern in &patterns {
        for name in open_positions(pattern) {
            *occurrences.entry(name).or_default() += 1;
        }
    }
    let mut known = Vec::<String>::new();
    let mut remaining = patterns;
    let mut ordered = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_score = None;
        for (i, pattern) in remaining.iter().enumerate() {
            let names = open_positions(pattern);
            let score = (
                names.iter().filter(|n| !known.contains(n)).count(),
                usize::MAX - names.iter().map(|n| occurrences.get(n).copied().unwrap_or(0)).sum::<usize>(),
                matches!(pattern.object, TermPattern::Literal(_)),
            );
            if best_score.is_none_or(|best_score| score < best_score) {
                best = i;
                best_score = Some(score);
            }
        }
        let pattern = remaining.remove(best);
        known.extend(open_positions(&pattern));
        ordered.push(pattern);
    }
    ordered
}

/// The variables and blank nodes of a triple pattern, prefixed to avoid collisions between them.
fn open_positions(pattern: &TriplePattern) -> Vec<String> {
    let mut names = Vec::with_capacity(3);
    for term in [&pattern.subject, &pattern.object] {
        match term {
            TermPattern::Variable(v) => names.push(format!("?{}", v.as_str())),
            TermPattern::BlankNode(b) => names.push(format!("_:{}", b.as_str())),
            TermPattern::NamedNode(_) | TermPattern::Literal(_) => (),
        }
    }
    if let NamedNodePattern::Variable(v) = &pattern.predicate {
        names.push(format!("?{}", v.as_str()));
    }
    names
}

fn copy_graph(from: GraphName, to: GraphName) -> GraphUpdateOperation {
    let bgp = GraphPattern::Bgp {
        patterns: vec![TriplePattern::new(
            Variable::new_unchecked("s"),
            Variable::new_unchecked("p"),
            Variable::new_unchecked("o"),
        )],
    };
    GraphUpdateOperation::DeleteInsert {
        delete: Vec::new(),
        insert: vec![QuadPattern::new(
            TriplePattern::new(
                Variable::new_unchecked("s"),
                Variable::new_unchecked("p"),
                Variable::new_unchecked("o"),
            ),
            match to {
                GraphName::NamedNode(to) => GraphNamePattern::NamedNode(to),
                GraphName::BlankNode(_) | GraphName::DefaultGraph => GraphNamePattern::DefaultGraph,
            },
        )],
        using: None,
        pattern: Box::new(match from {
            GraphName::NamedNode(from) => GraphPattern::Graph {
                name: from.into(),
                inner: Box::new(bgp),
            },
            GraphName::BlankNode(_) | GraphName::DefaultGraph => bgp,
        }),
    }
}

fn graph_target(graph: &GraphName) -> GraphTarget {
    match graph {
        GraphName::NamedNode(node) => GraphTarget::NamedNode(node.clone()),
        GraphName::BlankNode(_) | GraphName::DefaultGraph => GraphTarget::DefaultGraph,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str, p: &str, o: &str) -> TriplePattern {
        let term = |v: &str| -> TermPattern {
            if let Some(v) = v.strip_prefix('?') {
                Variable::new_unchecked(v).into()
            } else {
                NamedNode::new_unchecked(format!("http://example.com/{v}")).into()
            }
        };
        TriplePattern::new(
            term(s),
            NamedNode::new_unchecked(format!("http://example.com/{p}")),
            term(o),
        )
    }

    #[test]
    fn test_reorder_bound_first() {
        let ordered = reorder_triples(vec![t("?s", "p", "?o"), t("?o", "q", "c"), t("a", "r", "?s")]);
        assert_eq!(ordered[0], t("?o", "q", "c"));
        assert_eq!(ordered[1], t("?s", "p", "?o"));
        assert_eq!(ordered[2], t("a", "r", "?s"));
    }

    #[test]
    fn test_new_join_merges_bgps() {
        let joined = new_join(bgp(vec![t("?s", "p", "?o")]), bgp(vec![t("?o", "q", "c")]));
        assert!(matches!(joined, GraphPattern::Bgp { patterns } if patterns.len() == 2));
        assert_eq!(new_join(GraphPattern::default(), bgp(vec![t("?s", "p", "?o")])), bgp(vec![t("?s", "p", "?o")]));
    }

    #[test]
    fn test_lazy_marking() {
        let path = GraphPattern::Path {
            subject: Variable::new_unchecked("s").into(),
            path: PropertyPathExpression::OneOrMore(Box::new(NamedNode::new_unchecked("http://example.com/p").into())),
            object: Variable::new_unchecked("o").into(),
        };
        let GraphPattern::Join { lazy, .. } = new_join(bgp(vec![t("?s", "p", "?o")]), path.clone()) else {
            panic!("join expected")
        };
        assert!(lazy);
        let GraphPattern::Join { lazy, .. } = new_join(
            bgp(vec![t("?s", "p", "?o")]),
            GraphPattern::Slice { inner: Box::new(path), start: 0, length: Some(1) },
        ) else {
            panic!("join expected")
        };
        assert!(!lazy);
    }
}
