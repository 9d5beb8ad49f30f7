//! [SPARQL 1.1 Query Algebra](https://www.w3.org/TR/sparql11-query/#sparqlQuery) representation.

use crate::term::*;
use std::fmt;

/// A property path between the subject and the object of a [`GraphPattern::Path`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum PropertyPathExpression {
    NamedNode(NamedNode),
    Reverse(Box<Self>),
    Sequence(Box<Self>, Box<Self>),
    Alternative(Box<Self>, Box<Self>),
    ZeroOrMore(Box<Self>),
    OneOrMore(Box<Self>),
    ZeroOrOne(Box<Self>),
    NegatedPropertySet(Vec<NamedNode>),
}

impl PropertyPathExpression {
    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Self::NamedNode(p) => write!(f, "{p}"),
            Self::Reverse(p) => fmt_sse_unary(f, "reverse", p),
            Self::Alternative(a, b) => fmt_sse_binary(f, "alt", a, b),
            Self::Sequence(a, b) => fmt_sse_binary(f, "seq", a, b),
            Self::ZeroOrMore(p) => fmt_sse_unary(f, "path*", p),
            Self::OneOrMore(p) => fmt_sse_unary(f, "path+", p),
            Self::ZeroOrOne(p) => fmt_sse_unary(f, "path?", p),
            Self::NegatedPropertySet(p) => {
                f.write_str("(notoneof")?;
                for p in p {
                    write!(f, " {p}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for PropertyPathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(p) => p.fmt(f),
            Self::Reverse(p) => write!(f, "^({p})"),
            Self::Sequence(a, b) => write!(f, "({a} / {b})"),
            Self::Alternative(a, b) => write!(f, "({a} | {b})"),
            Self::ZeroOrMore(p) => write!(f, "({p})*"),
            Self::OneOrMore(p) => write!(f, "({p})+"),
            Self::ZeroOrOne(p) => write!(f, "({p})?"),
            Self::NegatedPropertySet(p) => {
                f.write_str("!(")?;
                for (i, c) in p.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<NamedNode> for PropertyPathExpression {
    fn from(p: NamedNode) -> Self {
        Self::NamedNode(p)
    }
}

/// An expression of `FILTER`, `BIND`, `ORDER BY` or a projection, errors included.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Expression {
    NamedNode(NamedNode),
    Literal(Literal),
    Variable(Variable),
    /// Errors are absorbed when the other side is true.
    Or(Box<Self>, Box<Self>),
    /// Errors are absorbed when the other side is false.
    And(Box<Self>, Box<Self>),
    /// Value equality, term equality for the unsupported datatypes.
    Equal(Box<Self>, Box<Self>),
    SameTerm(Box<Self>, Box<Self>),
    Greater(Box<Self>, Box<Self>),
    GreaterOrEqual(Box<Self>, Box<Self>),
    Less(Box<Self>, Box<Self>),
    LessOrEqual(Box<Self>, Box<Self>),
    In(Box<Self>, Vec<Self>),
    /// Numeric addition, also moves dates and times by durations.
    Add(Box<Self>, Box<Self>),
    Subtract(Box<Self>, Box<Self>),
    Multiply(Box<Self>, Box<Self>),
    Divide(Box<Self>, Box<Self>),
    UnaryPlus(Box<Self>),
    UnaryMinus(Box<Self>),
    Not(Box<Self>),
    /// Checks that the pattern has a row compatible with the current one.
    Exists(Box<GraphPattern>),
    Bound(Variable),
    If(Box<Self>, Box<Self>, Box<Self>),
    /// The first argument that evaluates without error.
    Coalesce(Vec<Self>),
    /// A built-in, or a function named by an IRI such as an XSD cast.
    FunctionCall(Function, Vec<Self>),
}

impl Expression {
    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Self::NamedNode(node) => write!(f, "{node}"),
            Self::Literal(l) => write!(f, "{l}"),
            Self::Variable(var) => write!(f, "{var}"),
            Self::Or(a, b) => fmt_sse_binary(f, "||", a, b),
            Self::And(a, b) => fmt_sse_binary(f, "&&", a, b),
            Self::Equal(a, b) => fmt_sse_binary(f, "=", a, b),
            Self::SameTerm(a, b) => fmt_sse_binary(f, "sameTerm", a, b),
            Self::Greater(a, b) => fmt_sse_binary(f, ">", a, b),
            Self::GreaterOrEqual(a, b) => fmt_sse_binary(f, ">=", a, b),
            Self::Less(a, b) => fmt_sse_binary(f, "<", a, b),
            Self::LessOrEqual(a, b) => fmt_sse_binary(f, "<=", a, b),
            Self::In(a, b) => {
                f.write_str("(in ")?;
                a.fmt_sse(f)?;
                for p in b {
                    f.write_str(" ")?;
                    p.fmt_sse(f)?;
                }
                f.write_str(")")
            }
            Self::Add(a, b) => fmt_sse_binary(f, "+", a, b),
            Self::Subtract(a, b) => fmt_sse_binary(f, "-", a, b),
            Self::Multiply(a, b) => fmt_sse_binary(f, "*", a, b),
            Self::Divide(a, b) => fmt_sse_binary(f, "/", a, b),
            Self::UnaryPlus(e) => fmt_sse_unary(f, "+", e),
            Self::UnaryMinus(e) => fmt_sse_unary(f, "-", e),
            Self::Not(e) => fmt_sse_unary(f, "!", e),
            Self::FunctionCall(function, parameters) => {
                f.write_str("(")?;
                function.fmt_sse(f)?;
                for p in parameters {
                    f.write_str(" ")?;
                    p.fmt_sse(f)?;
                }
                f.write_str(")")
            }
            Self::Exists(p) => {
                f.write_str("(exists ")?;
                p.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Bound(v) => write!(f, "(bound {v})"),
            Self::If(a, b, c) => {
                f.write_str("(if ")?;
                a.fmt_sse(f)?;
                f.write_str(" ")?;
                b.fmt_sse(f)?;
                f.write_str(" ")?;
                c.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Coalesce(parameters) => {
                f.write_str("(coalesce")?;
                for p in parameters {
                    f.write_str(" ")?;
                    p.fmt_sse(f)?;
                }
                f.write_str(")")
            }
        }
    }

    /// Builds the conjunction of the given expressions, `None` if the iterator is empty.
    pub fn and_all(expressions: impl IntoIterator<Item = Self>) -> Option<Self> {
        expressions
            .into_iter()
            .reduce(|a, b| Self::And(Box::new(a), Box::new(b)))
    }

    /// Calls `callback` on each variable used in the expression, including the ones in `EXISTS` patterns.
    pub fn on_variable<'a>(&'a self, callback: &mut impl FnMut(&'a Variable)) {
        match self {
            Self::NamedNode(_) | Self::Literal(_) => (),
            Self::Variable(v) | Self::Bound(v) => callback(v),
            Self::Or(a, b)
            | Self::And(a, b)
            | Self::Equal(a, b)
            | Self::SameTerm(a, b)
            | Self::Greater(a, b)
            | Self::GreaterOrEqual(a, b)
            | Self::Less(a, b)
            | Self::LessOrEqual(a, b)
            | Self::Add(a, b)
            | Self::Subtract(a, b)
            | Self::Multiply(a, b)
            | Self::Divide(a, b) => {
                a.on_variable(callback);
                b.on_variable(callback);
            }
            Self::UnaryPlus(e) | Self::UnaryMinus(e) | Self::Not(e) => e.on_variable(callback),
            Self::In(a, b) => {
                a.on_variable(callback);
                for e in b {
                    e.on_variable(callback);
                }
            }
            Self::If(a, b, c) => {
                a.on_variable(callback);
                b.on_variable(callback);
                c.on_variable(callback);
            }
            Self::Coalesce(l) | Self::FunctionCall(_, l) => {
                for e in l {
                    e.on_variable(callback);
                }
            }
            Self::Exists(p) => p.on_in_scope_variable(callback),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(node) => node.fmt(f),
            Self::Literal(l) => l.fmt(f),
            Self::Variable(var) => var.fmt(f),
            Self::Or(a, b) => write!(f, "({a} || {b})"),
            Self::And(a, b) => write!(f, "({a} && {b})"),
            Self::Equal(a, b) => write!(f, "({a} = {b})"),
            Self::SameTerm(a, b) => write!(f, "sameTerm({a}, {b})"),
            Self::Greater(a, b) => write!(f, "({a} > {b})"),
            Self::GreaterOrEqual(a, b) => write!(f, "({a} >= {b})"),
            Self::Less(a, b) => write!(f, "({a} < {b})"),
            Self::LessOrEqual(a, b) => write!(f, "({a} <= {b})"),
            Self::In(a, b) => {
                write!(f, "({a} IN ")?;
                write_arg_list(b, f)?;
                f.write_str(")")
            }
            Self::Add(a, b) => write!(f, "({a} + {b})"),
            Self::Subtract(a, b) => write!(f, "({a} - {b})"),
            Self::Multiply(a, b) => write!(f, "({a} * {b})"),
            Self::Divide(a, b) => write!(f, "({a} / {b})"),
            Self::UnaryPlus(e) => write!(f, "+{e}"),
            Self::UnaryMinus(e) => write!(f, "-{e}"),
            Self::Not(e) => match e.as_ref() {
                Self::Exists(p) => write!(f, "NOT EXISTS {{ {p} }}"),
                e => write!(f, "!{e}"),
            },
            Self::FunctionCall(function, parameters) => {
                write!(f, "{function}")?;
                write_arg_list(parameters, f)
            }
            Self::Bound(v) => write!(f, "BOUND({v})"),
            Self::Exists(p) => write!(f, "EXISTS {{ {p} }}"),
            Self::If(a, b, c) => write!(f, "IF({a}, {b}, {c})"),
            Self::Coalesce(parameters) => {
                f.write_str("COALESCE")?;
                write_arg_list(parameters, f)
            }
        }
    }
}

impl From<NamedNode> for Expression {
    fn from(p: NamedNode) -> Self {
        Self::NamedNode(p)
    }
}

impl From<Literal> for Expression {
    fn from(p: Literal) -> Self {
        Self::Literal(p)
    }
}

impl From<Variable> for Expression {
    fn from(v: Variable) -> Self {
        Self::Variable(v)
    }
}

impl From<NamedNodePattern> for Expression {
    fn from(p: NamedNodePattern) -> Self {
        match p {
            NamedNodePattern::NamedNode(p) => p.into(),
            NamedNodePattern::Variable(p) => p.into(),
        }
    }
}

fn write_arg_list(
    params: impl IntoIterator<Item = impl fmt::Display>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.write_str("(")?;
    let mut cont = false;
    for p in params {
        if cont {
            f.write_str(", ")?;
        }
        p.fmt(f)?;
        cont = true;
    }
    f.write_str(")")
}

/// A function name.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Function {
    Str,
    Lang,
    LangMatches,
    Datatype,
    Iri,
    BNode,
    Rand,
    Abs,
    Ceil,
    Floor,
    Round,
    Concat,
    SubStr,
    StrLen,
    Replace,
    UCase,
    LCase,
    EncodeForUri,
    Contains,
    StrStarts,
    StrEnds,
    StrBefore,
    StrAfter,
    Year,
    Month,
    Day,
    Hours,
    Minutes,
    Seconds,
    Timezone,
    Tz,
    Now,
    Uuid,
    StrUuid,
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    StrLang,
    StrDt,
    IsIri,
    IsBlank,
    IsLiteral,
    IsNumeric,
    Regex,
    /// A function identified by an IRI: XSD casts and custom functions.
    Custom(NamedNode),
}

impl Function {
    /// Resolves a built-in function from its SPARQL keyword, case insensitively.
    pub fn from_keyword(name: &str) -> Option<Self> {
        Some(match name.to_ascii_uppercase().as_str() {
            "STR" => Self::Str,
            "LANG" => Self::Lang,
            "LANGMATCHES" => Self::LangMatches,
            "DATATYPE" => Self::Datatype,
            "IRI" | "URI" => Self::Iri,
            "BNODE" => Self::BNode,
            "RAND" => Self::Rand,
            "ABS" => Self::Abs,
            "CEIL" => Self::Ceil,
            "FLOOR" => Self::Floor,
            "ROUND" => Self::Round,
            "CONCAT" => Self::Concat,
            "SUBSTR" => Self::SubStr,
            "STRLEN" => Self::StrLen,
            "REPLACE" => Self::Replace,
            "UCASE" => Self::UCase,
            "LCASE" => Self::LCase,
            "ENCODE_FOR_URI" => Self::EncodeForUri,
            "CONTAINS" => Self::Contains,
            "STRSTARTS" => Self::StrStarts,
            "STRENDS" => Self::StrEnds,
            "STRBEFORE" => Self::StrBefore,
            "STRAFTER" => Self::StrAfter,
            "YEAR" => Self::Year,
            "MONTH" => Self::Month,
            "DAY" => Self::Day,
            "HOURS" => Self::Hours,
            "MINUTES" => Self::Minutes,
            "SECONDS" => Self::Seconds,
            "TIMEZONE" => Self::Timezone,
            "TZ" => Self::Tz,
            "NOW" => Self::Now,
            "UUID" => Self::Uuid,
            "STRUUID" => Self::StrUuid,
            "MD5" => Self::Md5,
            "SHA1" => Self::Sha1,
            "SHA256" => Self::Sha256,
            "SHA384" => Self::Sha384,
            "SHA512" => Self::Sha512,
            "STRLANG" => Self::StrLang,
            "STRDT" => Self::StrDt,
            "ISIRI" | "ISURI" => Self::IsIri,
            "ISBLANK" => Self::IsBlank,
            "ISLITERAL" => Self::IsLiteral,
            "ISNUMERIC" => Self::IsNumeric,
            "REGEX" => Self::Regex,
            _ => return None,
        })
    }

    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Self::Custom(iri) => write!(f, "{iri}"),
            _ => f.write_str(&self.to_string().to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Str => "STR",
            Self::Lang => "LANG",
            Self::LangMatches => "LANGMATCHES",
            Self::Datatype => "DATATYPE",
            Self::Iri => "IRI",
            Self::BNode => "BNODE",
            Self::Rand => "RAND",
            Self::Abs => "ABS",
            Self::Ceil => "CEIL",
            Self::Floor => "FLOOR",
            Self::Round => "ROUND",
            Self::Concat => "CONCAT",
            Self::SubStr => "SUBSTR",
            Self::StrLen => "STRLEN",
            Self::Replace => "REPLACE",
            Self::UCase => "UCASE",
            Self::LCase => "LCASE",
            Self::EncodeForUri => "ENCODE_FOR_URI",
            Self::Contains => "CONTAINS",
            Self::StrStarts => "STRSTARTS",
            Self::StrEnds => "STRENDS",
            Self::StrBefore => "STRBEFORE",
            Self::StrAfter => "STRAFTER",
            Self::Year => "YEAR",
            Self::Month => "MONTH",
            Self::Day => "DAY",
            Self::Hours => "HOURS",
            Self::Minutes => "MINUTES",
            Self::Seconds => "SECONDS",
            Self::Timezone => "TIMEZONE",
            Self::Tz => "TZ",
            Self::Now => "NOW",
            Self::Uuid => "UUID",
            Self::StrUuid => "STRUUID",
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
            Self::StrLang => "STRLANG",
            Self::StrDt => "STRDT",
            Self::IsIri => "isIRI",
            Self::IsBlank => "isBLANK",
            Self::IsLiteral => "isLITERAL",
            Self::IsNumeric => "isNUMERIC",
            Self::Regex => "REGEX",
            Self::Custom(iri) => return iri.fmt(f),
        })
    }
}

/// A SPARQL query [graph pattern](https://www.w3.org/TR/sparql11-query/#sparqlQuery).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GraphPattern {
    /// A [basic graph pattern](https://www.w3.org/TR/sparql11-query/#defn_BasicGraphPattern).
    Bgp { patterns: Vec<TriplePattern> },
    /// A [property path pattern](https://www.w3.org/TR/sparql11-query/#defn_evalPP_predicate).
    Path {
        subject: TermPattern,
        path: PropertyPathExpression,
        object: TermPattern,
    },
    /// [Join](https://www.w3.org/TR/sparql11-query/#defn_algJoin).
    ///
    /// If `lazy` is set, the right side might be evaluated once per left solution with this solution pre-bound.
    Join {
        left: Box<Self>,
        right: Box<Self>,
        lazy: bool,
    },
    /// [LeftJoin](https://www.w3.org/TR/sparql11-query/#defn_algLeftJoin).
    LeftJoin {
        left: Box<Self>,
        right: Box<Self>,
        expression: Option<Expression>,
    },
    /// [Filter](https://www.w3.org/TR/sparql11-query/#defn_algFilter).
    ///
    /// If `isolated` is set, the expression does not see the variables bound outside of `inner`.
    /// It is unset for the top-level filters of `EXISTS` patterns.
    Filter {
        expr: Expression,
        inner: Box<Self>,
        isolated: bool,
    },
    /// [Union](https://www.w3.org/TR/sparql11-query/#defn_algUnion).
    Union { left: Box<Self>, right: Box<Self> },
    Graph {
        name: NamedNodePattern,
        inner: Box<Self>,
    },
    /// [Extend](https://www.w3.org/TR/sparql11-query/#defn_extend).
    Extend {
        inner: Box<Self>,
        variable: Variable,
        expression: Expression,
    },
    /// [Minus](https://www.w3.org/TR/sparql11-query/#defn_algMinus).
    Minus { left: Box<Self>, right: Box<Self> },
    /// A table used to provide inline values
    Values {
        variables: Vec<Variable>,
        bindings: Vec<Vec<Option<GroundTerm>>>,
    },
    /// [ToMultiSet](https://www.w3.org/TR/sparql11-query/#defn_algToMultiSet): wraps inline data and sub-queries.
    ToMultiSet { inner: Box<Self> },
    /// [OrderBy](https://www.w3.org/TR/sparql11-query/#defn_algOrdered).
    OrderBy {
        inner: Box<Self>,
        expression: Vec<OrderExpression>,
    },
    /// [Project](https://www.w3.org/TR/sparql11-query/#defn_algProjection).
    Project {
        inner: Box<Self>,
        variables: Vec<Variable>,
    },
    /// [Distinct](https://www.w3.org/TR/sparql11-query/#defn_algDistinct).
    Distinct { inner: Box<Self> },
    /// [Reduced](https://www.w3.org/TR/sparql11-query/#defn_algReduced).
    Reduced { inner: Box<Self> },
    /// [Slice](https://www.w3.org/TR/sparql11-query/#defn_algSlice).
    Slice {
        inner: Box<Self>,
        start: usize,
        length: Option<usize>,
    },
    /// [Group](https://www.w3.org/TR/sparql11-query/#defn_algGroup).
    ///
    /// An empty list of expressions means that all the solutions are in the same group.
    Group {
        inner: Box<Self>,
        expressions: Vec<Expression>,
    },
    /// [Aggregation](https://www.w3.org/TR/sparql11-query/#defn_algAggregation) over a [`GraphPattern::Group`].
    AggregateJoin {
        group: Box<Self>,
        aggregates: Vec<(Variable, AggregateExpression)>,
    },
    /// [Service](https://www.w3.org/TR/sparql11-federated-query/#defn_evalService).
    Service {
        name: NamedNodePattern,
        inner: Box<Self>,
        silent: bool,
    },
}

impl GraphPattern {
    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Self::Bgp { patterns } => {
                f.write_str("(bgp")?;
                for pattern in patterns {
                    f.write_str(" ")?;
                    pattern.fmt_sse(f)?;
                }
                f.write_str(")")
            }
            Self::Path {
                subject,
                path,
                object,
            } => {
                f.write_str("(path ")?;
                subject.fmt_sse(f)?;
                f.write_str(" ")?;
                path.fmt_sse(f)?;
                f.write_str(" ")?;
                object.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Join { left, right, lazy } => {
                f.write_str(if *lazy { "(lazyjoin " } else { "(join " })?;
                left.fmt_sse(f)?;
                f.write_str(" ")?;
                right.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::LeftJoin {
                left,
                right,
                expression,
            } => {
                f.write_str("(leftjoin ")?;
                left.fmt_sse(f)?;
                f.write_str(" ")?;
                right.fmt_sse(f)?;
                if let Some(expr) = expression {
                    f.write_str(" ")?;
                    expr.fmt_sse(f)?;
                }
                f.write_str(")")
            }
            Self::Filter {
                expr,
                inner,
                isolated,
            } => {
                f.write_str(if *isolated { "(filter " } else { "(filter* " })?;
                expr.fmt_sse(f)?;
                f.write_str(" ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Union { left, right } => {
                f.write_str("(union ")?;
                left.fmt_sse(f)?;
                f.write_str(" ")?;
                right.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Graph { name, inner } => {
                f.write_str("(graph ")?;
                name.fmt_sse(f)?;
                f.write_str(" ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Extend {
                inner,
                variable,
                expression,
            } => {
                write!(f, "(extend (({variable} ")?;
                expression.fmt_sse(f)?;
                f.write_str(")) ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Minus { left, right } => {
                f.write_str("(minus ")?;
                left.fmt_sse(f)?;
                f.write_str(" ")?;
                right.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Service {
                name,
                inner,
                silent,
            } => {
                f.write_str("(service ")?;
                if *silent {
                    f.write_str("silent ")?;
                }
                name.fmt_sse(f)?;
                f.write_str(" ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Group { inner, expressions } => {
                f.write_str("(group (")?;
                for (i, e) in expressions.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    e.fmt_sse(f)?;
                }
                f.write_str(") ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::AggregateJoin { group, aggregates } => {
                f.write_str("(aggregatejoin (")?;
                for (i, (v, a)) in aggregates.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    f.write_str("(")?;
                    a.fmt_sse(f)?;
                    write!(f, " {v})")?;
                }
                f.write_str(") ")?;
                group.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Values {
                variables,
                bindings,
            } => {
                f.write_str("(table (vars")?;
                for var in variables {
                    write!(f, " {var}")?;
                }
                f.write_str(")")?;
                for row in bindings {
                    f.write_str(" (row")?;
                    for (value, var) in row.iter().zip(variables) {
                        if let Some(value) = value {
                            write!(f, " ({var} {value})")?;
                        }
                    }
                    f.write_str(")")?;
                }
                f.write_str(")")
            }
            Self::ToMultiSet { inner } => {
                f.write_str("(tomultiset ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::OrderBy { inner, expression } => {
                f.write_str("(order (")?;
                for (i, c) in expression.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    c.fmt_sse(f)?;
                }
                f.write_str(") ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Project { inner, variables } => {
                f.write_str("(project (")?;
                for (i, v) in variables.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str(") ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Distinct { inner } => {
                f.write_str("(distinct ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Reduced { inner } => {
                f.write_str("(reduced ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Slice {
                inner,
                start,
                length,
            } => {
                if let Some(length) = length {
                    write!(f, "(slice {start} {length} ")?;
                } else {
                    write!(f, "(slice {start} _ ")?;
                }
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
        }
    }

    pub fn to_sse(&self) -> String {
        sse_to_string(|f| self.fmt_sse(f))
    }
}

impl fmt::Display for GraphPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bgp { patterns } => {
                for (i, pattern) in patterns.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{pattern} .")?
                }
                Ok(())
            }
            Self::Path {
                subject,
                path,
                object,
            } => write!(f, "{subject} {path} {object} ."),
            Self::Join { left, right, .. } => {
                if matches!(
                    right.as_ref(),
                    Self::LeftJoin { .. }
                        | Self::Minus { .. }
                        | Self::Extend { .. }
                        | Self::Filter { .. }
                ) {
                    // The second block might be considered as a modification of the first one.
                    write!(f, "{left} {{ {right} }}")
                } else {
                    write!(f, "{left} {right}")
                }
            }
            Self::LeftJoin {
                left,
                right,
                expression,
            } => {
                if let Some(expr) = expression {
                    write!(f, "{left} OPTIONAL {{ {right} FILTER({expr}) }}")
                } else {
                    write!(f, "{left} OPTIONAL {{ {right} }}")
                }
            }
            Self::Filter { expr, inner, .. } => write!(f, "{inner} FILTER({expr})"),
            Self::Union { left, right } => write!(f, "{{ {left} }} UNION {{ {right} }}"),
            Self::Graph { name, inner } => write!(f, "GRAPH {name} {{ {inner} }}"),
            Self::Extend {
                inner,
                variable,
                expression,
            } => write!(f, "{inner} BIND({expression} AS {variable})"),
            Self::Minus { left, right } => write!(f, "{left} MINUS {{ {right} }}"),
            Self::Service {
                name,
                inner,
                silent,
            } => {
                if *silent {
                    write!(f, "SERVICE SILENT {name} {{ {inner} }}")
                } else {
                    write!(f, "SERVICE {name} {{ {inner} }}")
                }
            }
            Self::Values {
                variables,
                bindings,
            } => {
                f.write_str("VALUES ( ")?;
                for var in variables {
                    write!(f, "{var} ")?;
                }
                f.write_str(") { ")?;
                for row in bindings {
                    f.write_str("( ")?;
                    for val in row {
                        match val {
                            Some(val) => write!(f, "{val} "),
                            None => f.write_str("UNDEF "),
                        }?;
                    }
                    f.write_str(") ")?;
                }
                f.write_str("}")
            }
            Self::ToMultiSet { inner } => match inner.as_ref() {
                Self::Values { .. } => inner.fmt(f),
                inner => write!(f, "{{ {} }}", SparqlGraphRootPattern::new(inner, None)),
            },
            Self::AggregateJoin { group, aggregates } => {
                let (inner, expressions) = match group.as_ref() {
                    Self::Group { inner, expressions } => (inner.as_ref(), expressions.as_slice()),
                    other => (other, [].as_slice()),
                };
                f.write_str("{ SELECT")?;
                for (v, a) in aggregates {
                    write!(f, " ({a} AS {v})")?;
                }
                for e in expressions {
                    if let Expression::Variable(v) = e {
                        write!(f, " {v}")?;
                    }
                }
                write!(f, " WHERE {{ {inner} }}")?;
                write_group_by(expressions, f)?;
                f.write_str(" }")
            }
            Self::Group { inner, expressions } => {
                f.write_str("{ SELECT")?;
                let mut projected = false;
                for e in expressions {
                    if let Expression::Variable(v) = e {
                        write!(f, " {v}")?;
                        projected = true;
                    }
                }
                if !projected {
                    f.write_str(" (1 AS ?__group)")?;
                }
                write!(f, " WHERE {{ {inner} }}")?;
                write_group_by(expressions, f)?;
                f.write_str(" }")
            }
            p => write!(f, "{{ {} }}", SparqlGraphRootPattern::new(p, None)),
        }
    }
}

fn write_group_by(expressions: &[Expression], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if !expressions.is_empty() {
        f.write_str(" GROUP BY")?;
        for e in expressions {
            match e {
                Expression::Variable(v) => write!(f, " {v}")?,
                e => write!(f, " ({e})")?,
            }
        }
    }
    Ok(())
}

impl Default for GraphPattern {
    fn default() -> Self {
        Self::Bgp {
            patterns: Vec::default(),
        }
    }
}

impl GraphPattern {
    /// Calls `callback` on each [in-scope variable](https://www.w3.org/TR/sparql11-query/#variableScope) occurrence.
    ///
    /// Blank nodes are not reported.
    pub fn on_in_scope_variable<'a>(&'a self, callback: &mut impl FnMut(&'a Variable)) {
        match self {
            Self::Bgp { patterns } => {
                for pattern in patterns {
                    lookup_triple_pattern_variables(pattern, callback)
                }
            }
            Self::Path {
                subject, object, ..
            } => {
                if let TermPattern::Variable(s) = subject {
                    callback(s);
                }
                if let TermPattern::Variable(o) = object {
                    callback(o);
                }
            }
            Self::Join { left, right, .. }
            | Self::LeftJoin { left, right, .. }
            | Self::Union { left, right } => {
                left.on_in_scope_variable(callback);
                right.on_in_scope_variable(callback);
            }
            Self::Graph { name, inner } => {
                if let NamedNodePattern::Variable(g) = name {
                    callback(g);
                }
                inner.on_in_scope_variable(callback);
            }
            Self::Extend {
                inner, variable, ..
            } => {
                callback(variable);
                inner.on_in_scope_variable(callback);
            }
            Self::Minus { left, .. } => left.on_in_scope_variable(callback),
            Self::Service { inner, .. } => inner.on_in_scope_variable(callback),
            Self::Group { expressions, .. } => {
                for e in expressions {
                    if let Expression::Variable(v) = e {
                        callback(v);
                    }
                }
            }
            Self::AggregateJoin { group, aggregates } => {
                group.on_in_scope_variable(callback);
                for (v, _) in aggregates {
                    callback(v);
                }
            }
            Self::Values { variables, .. } | Self::Project { variables, .. } => {
                for v in variables {
                    callback(v);
                }
            }
            Self::Filter { inner, .. }
            | Self::ToMultiSet { inner }
            | Self::OrderBy { inner, .. }
            | Self::Distinct { inner }
            | Self::Reduced { inner }
            | Self::Slice { inner, .. } => inner.on_in_scope_variable(callback),
        }
    }

    /// The [in-scope variables](https://www.w3.org/TR/sparql11-query/#variableScope) without duplicates, in the order of their first occurrence.
    pub fn in_scope_variables(&self) -> Vec<Variable> {
        let mut variables = Vec::new();
        self.on_in_scope_variable(&mut |v| {
            if !variables.contains(v) {
                variables.push(v.clone());
            }
        });
        variables
    }
}

fn lookup_triple_pattern_variables<'a>(
    pattern: &'a TriplePattern,
    callback: &mut impl FnMut(&'a Variable),
) {
    if let TermPattern::Variable(s) = &pattern.subject {
        callback(s);
    }
    if let NamedNodePattern::Variable(p) = &pattern.predicate {
        callback(p);
    }
    if let TermPattern::Variable(o) = &pattern.object {
        callback(o);
    }
}

/// Writes a graph pattern as a full `SELECT` query, folding the solution modifiers at its top.
pub(crate) struct SparqlGraphRootPattern<'a> {
    pattern: &'a GraphPattern,
    dataset: Option<&'a QueryDataset>,
}

impl<'a> SparqlGraphRootPattern<'a> {
    pub(crate) fn new(pattern: &'a GraphPattern, dataset: Option<&'a QueryDataset>) -> Self {
        Self { pattern, dataset }
    }
}

impl fmt::Display for SparqlGraphRootPattern<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut distinct = false;
        let mut reduced = false;
        let mut order = None;
        let mut start = 0;
        let mut length = None;
        let mut project: &[Variable] = &[];

        let mut child = self.pattern;
        loop {
            match child {
                GraphPattern::OrderBy { inner, expression } if order.is_none() => {
                    order = Some(expression);
                    child = inner;
                }
                GraphPattern::Project { inner, variables } if project.is_empty() => {
                    project = variables;
                    child = inner;
                }
                GraphPattern::Distinct { inner } if !distinct => {
                    distinct = true;
                    child = inner;
                }
                GraphPattern::Reduced { inner } if !reduced => {
                    reduced = true;
                    child = inner;
                }
                GraphPattern::Slice {
                    inner,
                    start: s,
                    length: l,
                } if start == 0 && length.is_none() => {
                    start = *s;
                    length = *l;
                    child = inner;
                }
                p => {
                    f.write_str("SELECT")?;
                    if distinct {
                        f.write_str(" DISTINCT")?;
                    }
                    if reduced {
                        f.write_str(" REDUCED")?;
                    }
                    if project.is_empty() {
                        f.write_str(" *")?;
                    } else {
                        for v in project {
                            write!(f, " {v}")?;
                        }
                    }
                    if let Some(dataset) = self.dataset {
                        write!(f, "{dataset}")?;
                    }
                    write!(f, " WHERE {{ {p} }}")?;
                    if let Some(order) = order {
                        f.write_str(" ORDER BY")?;
                        for c in order {
                            write!(f, " {c}")?;
                        }
                    }
                    if start > 0 {
                        write!(f, " OFFSET {start}")?;
                    }
                    if let Some(length) = length {
                        write!(f, " LIMIT {length}")?;
                    }
                    return Ok(());
                }
            }
        }
    }
}

/// A set function used in aggregates (c.f. [`GraphPattern::AggregateJoin`]).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct AggregateExpression {
    pub function: AggregateFunction,
    /// `None` for `COUNT(*)`.
    pub expr: Option<Box<Expression>>,
    pub distinct: bool,
}

impl AggregateExpression {
    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "({}", self.function.name().to_ascii_lowercase())?;
        if self.distinct {
            f.write_str(" distinct")?;
        }
        if let Some(expr) = &self.expr {
            f.write_str(" ")?;
            expr.fmt_sse(f)?;
        }
        if let AggregateFunction::GroupConcat {
            separator: Some(separator),
        } = &self.function
        {
            write!(f, " {}", Literal::new_simple_literal(separator))?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for AggregateExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function.name())?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        if let Some(expr) = &self.expr {
            write!(f, "{expr}")?;
        } else {
            f.write_str("*")?;
        }
        if let AggregateFunction::GroupConcat {
            separator: Some(separator),
        } = &self.function
        {
            write!(f, "; SEPARATOR = {}", Literal::new_simple_literal(separator))?;
        }
        f.write_str(")")
    }
}

/// The [set functions](https://www.w3.org/TR/sparql11-query/#setFunctions) allowed in aggregates.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum AggregateFunction {
    /// [Count](https://www.w3.org/TR/sparql11-query/#defn_aggCount).
    Count,
    /// [Sum](https://www.w3.org/TR/sparql11-query/#defn_aggSum).
    Sum,
    /// [Avg](https://www.w3.org/TR/sparql11-query/#defn_aggAvg).
    Avg,
    /// [Min](https://www.w3.org/TR/sparql11-query/#defn_aggMin).
    Min,
    /// [Max](https://www.w3.org/TR/sparql11-query/#defn_aggMax).
    Max,
    /// [GroupConcat](https://www.w3.org/TR/sparql11-query/#defn_aggGroupConcat).
    GroupConcat { separator: Option<String> },
    /// [Sample](https://www.w3.org/TR/sparql11-query/#defn_aggSample).
    Sample,
}

impl AggregateFunction {
    fn name(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::GroupConcat { .. } => "GROUP_CONCAT",
            Self::Sample => "SAMPLE",
        }
    }
}

/// An ordering comparator used by [`GraphPattern::OrderBy`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum OrderExpression {
    /// Ascending order
    Asc(Expression),
    /// Descending order
    Desc(Expression),
}

impl OrderExpression {
    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Self::Asc(e) => fmt_sse_unary(f, "asc", e),
            Self::Desc(e) => fmt_sse_unary(f, "desc", e),
        }
    }
}

impl fmt::Display for OrderExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc(e) => write!(f, "ASC({e})"),
            Self::Desc(e) => write!(f, "DESC({e})"),
        }
    }
}

/// A SPARQL query [dataset specification](https://www.w3.org/TR/sparql11-query/#specifyingDataset).
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct QueryDataset {
    /// The graphs merged into the default graph (`FROM`).
    pub default: Vec<NamedNode>,
    /// The available named graphs (`FROM NAMED`), `None` if not restricted.
    pub named: Option<Vec<NamedNode>>,
}

impl QueryDataset {
    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        f.write_str("(")?;
        for (i, graph_name) in self.default.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{graph_name}")?;
        }
        if let Some(named) = &self.named {
            for (i, graph_name) in named.iter().enumerate() {
                if !self.default.is_empty() || i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "(named {graph_name})")?;
            }
        }
        f.write_str(")")
    }
}

impl fmt::Display for QueryDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for g in &self.default {
            write!(f, " FROM {g}")?;
        }
        if let Some(named) = &self.named {
            for g in named {
                write!(f, " FROM NAMED {g}")?;
            }
        }
        Ok(())
    }
}

/// A target RDF graph for update operations.
///
/// Could be a specific graph, all named graphs or the complete dataset.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GraphTarget {
    NamedNode(NamedNode),
    DefaultGraph,
    NamedGraphs,
    AllGraphs,
}

impl GraphTarget {
    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Self::NamedNode(node) => write!(f, "{node}"),
            Self::DefaultGraph => f.write_str("default"),
            Self::NamedGraphs => f.write_str("named"),
            Self::AllGraphs => f.write_str("all"),
        }
    }
}

impl fmt::Display for GraphTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(node) => write!(f, "GRAPH {node}"),
            Self::DefaultGraph => f.write_str("DEFAULT"),
            Self::NamedGraphs => f.write_str("NAMED"),
            Self::AllGraphs => f.write_str("ALL"),
        }
    }
}

impl From<NamedNode> for GraphTarget {
    fn from(node: NamedNode) -> Self {
        Self::NamedNode(node)
    }
}

struct SseFormatter<F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result>(F);

impl<F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result> fmt::Display for SseFormatter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.0)(f)
    }
}

pub(crate) fn sse_to_string(write: impl Fn(&mut fmt::Formatter<'_>) -> fmt::Result) -> String {
    SseFormatter(write).to_string()
}

fn fmt_sse_unary(
    f: &mut impl fmt::Write,
    name: &'static str,
    e: &impl SseFormattable,
) -> fmt::Result {
    write!(f, "({name} ")?;
    e.fmt_sse_to(f)?;
    f.write_str(")")
}

fn fmt_sse_binary<E: SseFormattable>(
    f: &mut impl fmt::Write,
    name: &'static str,
    a: &E,
    b: &E,
) -> fmt::Result {
    write!(f, "({name} ")?;
    a.fmt_sse_to(f)?;
    f.write_str(" ")?;
    b.fmt_sse_to(f)?;
    f.write_str(")")
}

trait SseFormattable {
    fn fmt_sse_to(&self, f: &mut impl fmt::Write) -> fmt::Result;
}

impl SseFormattable for Expression {
    fn fmt_sse_to(&self, f: &mut impl fmt::Write) -> fmt::Result {
        self.fmt_sse(f)
    }
}

impl SseFormattable for PropertyPathExpression {
    fn fmt_sse_to(&self, f: &mut impl fmt::Write) -> fmt::Result {
        self.fmt_sse(f)
    }
}

impl<T: SseFormattable> SseFormattable for Box<T> {
    fn fmt_sse_to(&self, f: &mut impl fmt::Write) -> fmt::Result {
        T::fmt_sse_to(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    #[test]
    fn test_in_scope_variables() {
        let pattern = GraphPattern::Extend {
            inner: Box::new(GraphPattern::LeftJoin {
                left: Box::new(GraphPattern::Bgp {
                    patterns: vec![TriplePattern::new(
                        var("s"),
                        NamedNode::new_unchecked("http://example.com/p"),
                        BlankNode::new_unchecked("b"),
                    )],
                }),
                right: Box::new(GraphPattern::Values {
                    variables: vec![var("o")],
                    bindings: Vec::new(),
                }),
                expression: Some(Expression::Bound(var("x"))),
            }),
            variable: var("e"),
            expression: Expression::Variable(var("y")),
        };
        assert_eq!(pattern.in_scope_variables(), vec![var("e"), var("s"), var("o")]);
    }

    #[test]
    fn test_sse() {
        let pattern = GraphPattern::Slice {
            inner: Box::new(GraphPattern::Filter {
                expr: Expression::Greater(
                    Box::new(var("o").into()),
                    Box::new(Literal::from(1).into()),
                ),
                inner: Box::new(GraphPattern::Path {
                    subject: var("s").into(),
                    path: PropertyPathExpression::OneOrMore(Box::new(
                        NamedNode::new_unchecked("http://example.com/p").into(),
                    )),
                    object: var("o").into(),
                }),
                isolated: true,
            }),
            start: 1,
            length: None,
        };
        assert_eq!(
            pattern.to_sse(),
            "(slice 1 _ (filter (> ?o \"1\"^^<http://www.w3.org/2001/XMLSchema#integer>) (path ?s (path+ <http://example.com/p>) ?o)))"
        );
    }

    #[test]
    fn test_function_keywords() {
        assert_eq!(Function::from_keyword("strlen"), Some(Function::StrLen));
        assert_eq!(Function::from_keyword("uri"), Some(Function::Iri));
        assert_eq!(Function::from_keyword("foo"), None);
        assert_eq!(Function::IsIri.to_string(), "isIRI");
    }
}
