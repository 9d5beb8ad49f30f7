//! The annotated parse tree consumed by [`QueryTranslator`](crate::QueryTranslator).
//!
//! It mirrors the [SPARQL 1.1 grammar](https://www.w3.org/TR/sparql11-query/#grammar) after tokenization:
//! names are not resolved yet, blank node property lists and collections are already expanded into triples,
//! and functions and aggregates are identified by their keyword.

/// The `BASE` and `PREFIX` declarations.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct Prologue {
    pub base_iri: Option<String>,
    pub prefixes: Vec<(String, String)>,
}

/// An IRI as written: between angle brackets (possibly relative) or as a prefixed name.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Iri {
    Full(String),
    Prefixed { prefix: String, local: String },
}

impl Iri {
    #[inline]
    pub fn full(iri: impl Into<String>) -> Self {
        Self::Full(iri.into())
    }

    #[inline]
    pub fn prefixed(prefix: impl Into<String>, local: impl Into<String>) -> Self {
        Self::Prefixed {
            prefix: prefix.into(),
            local: local.into(),
        }
    }
}

/// A literal as written, with an unresolved datatype.
///
/// Numeric and boolean tokens are typed literals with the matching XSD datatype.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Literal {
    pub value: String,
    pub language: Option<String>,
    pub datatype: Option<Iri>,
}

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

impl Literal {
    pub fn simple(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: None,
            datatype: None,
        }
    }

    pub fn language_tagged(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: Some(language.into()),
            datatype: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: Iri) -> Self {
        Self {
            value: value.into(),
            language: None,
            datatype: Some(datatype),
        }
    }

    pub fn integer(value: i64) -> Self {
        Self::typed(value.to_string(), Iri::Full(format!("{XSD}integer")))
    }

    pub fn decimal(value: impl Into<String>) -> Self {
        Self::typed(value, Iri::Full(format!("{XSD}decimal")))
    }

    pub fn double(value: impl Into<String>) -> Self {
        Self::typed(value, Iri::Full(format!("{XSD}double")))
    }

    pub fn boolean(value: bool) -> Self {
        Self::typed(value.to_string(), Iri::Full(format!("{XSD}boolean")))
    }
}

/// A variable or an IRI, e.g. the name of a `GRAPH` or a `SERVICE`.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum VarOrIri {
    Var(String),
    Iri(Iri),
}

/// A term or a variable in a triple pattern.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum VarOrTerm {
    Var(String),
    Iri(Iri),
    /// A labelled blank node. Anonymous ones are given a fresh label by the parser.
    BlankNode(String),
    Literal(Literal),
}

impl VarOrTerm {
    #[inline]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    #[inline]
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(Iri::Full(iri.into()))
    }
}

/// A [property path](https://www.w3.org/TR/sparql11-query/#propertypaths).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Path {
    Iri(Iri),
    /// The `a` keyword.
    A,
    Inverse(Box<Self>),
    Sequence(Vec<Self>),
    Alternative(Vec<Self>),
    ZeroOrMore(Box<Self>),
    OneOrMore(Box<Self>),
    ZeroOrOne(Box<Self>),
    NegatedPropertySet(Vec<NegatedPathElement>),
}

/// An element of `!(...)`.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum NegatedPathElement {
    Iri(Iri),
    A,
    Inverse(Iri),
    InverseA,
}

/// The predicate position of a triple pattern.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Verb {
    Var(String),
    Path(Path),
}

impl Verb {
    #[inline]
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Path(Path::Iri(Iri::Full(iri.into())))
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct TriplesPattern {
    pub subject: VarOrTerm,
    pub verb: Verb,
    pub object: VarOrTerm,
}

/// An element of a `{ ... }` group.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GroupPatternElement {
    Triples(Vec<TriplesPattern>),
    Filter(Expression),
    Optional(Vec<GroupPatternElement>),
    Minus(Vec<GroupPatternElement>),
    /// `{ A } UNION { B } UNION ...`
    Union(Vec<Vec<GroupPatternElement>>),
    Group(Vec<GroupPatternElement>),
    Graph {
        name: VarOrIri,
        pattern: Vec<GroupPatternElement>,
    },
    Service {
        name: VarOrIri,
        silent: bool,
        pattern: Vec<GroupPatternElement>,
    },
    Bind {
        expression: Expression,
        variable: String,
    },
    Values(ValuesClause),
    SubSelect(Box<SubSelect>),
}

/// Inline data. `None` is `UNDEF`.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct ValuesClause {
    pub variables: Vec<String>,
    pub rows: Vec<Vec<Option<VarOrTerm>>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum SelectItem {
    Var(String),
    Expression {
        expression: Expression,
        variable: String,
    },
}

#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct SelectClause {
    pub distinct: bool,
    pub reduced: bool,
    /// Empty for `SELECT *`.
    pub projection: Vec<SelectItem>,
}

impl SelectClause {
    /// `SELECT *`
    #[inline]
    pub fn all() -> Self {
        Self::default()
    }

    /// `SELECT ?a ?b ...`
    pub fn vars(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            projection: names
                .into_iter()
                .map(|n| SelectItem::Var(n.into()))
                .collect(),
            ..Self::default()
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct GroupCondition {
    pub expression: Expression,
    /// The variable of `GROUP BY (expr AS ?v)`.
    pub variable: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct OrderCondition {
    pub expression: Expression,
    pub descending: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct SolutionModifiers {
    pub group_by: Vec<GroupCondition>,
    pub having: Vec<Expression>,
    pub order_by: Vec<OrderCondition>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct SubSelect {
    pub select: SelectClause,
    pub pattern: Vec<GroupPatternElement>,
    pub modifiers: SolutionModifiers,
    pub values: Option<ValuesClause>,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum DatasetClause {
    /// `FROM`
    Default(Iri),
    /// `FROM NAMED`
    Named(Iri),
}

/// A query expression.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Expression {
    Var(String),
    Iri(Iri),
    Literal(Literal),
    Or(Box<Self>, Box<Self>),
    And(Box<Self>, Box<Self>),
    Equal(Box<Self>, Box<Self>),
    NotEqual(Box<Self>, Box<Self>),
    Less(Box<Self>, Box<Self>),
    Greater(Box<Self>, Box<Self>),
    LessOrEqual(Box<Self>, Box<Self>),
    GreaterOrEqual(Box<Self>, Box<Self>),
    In(Box<Self>, Vec<Self>),
    NotIn(Box<Self>, Vec<Self>),
    Add(Box<Self>, Box<Self>),
    Subtract(Box<Self>, Box<Self>),
    Multiply(Box<Self>, Box<Self>),
    Divide(Box<Self>, Box<Self>),
    UnaryPlus(Box<Self>),
    UnaryMinus(Box<Self>),
    Not(Box<Self>),
    /// A built-in call by keyword, e.g. `STRLEN`, `BOUND`, `IF`, `COALESCE` or `sameTerm`.
    BuiltIn { name: String, args: Vec<Self> },
    /// A call to a function identified by an IRI: casts and custom functions.
    FunctionCall { iri: Iri, args: Vec<Self> },
    Exists(Vec<GroupPatternElement>),
    NotExists(Vec<GroupPatternElement>),
    /// An aggregate call by keyword. `arg` is `None` for `COUNT(*)`.
    Aggregate {
        name: String,
        distinct: bool,
        arg: Option<Box<Self>>,
        separator: Option<String>,
    },
}

impl Expression {
    #[inline]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    #[inline]
    pub fn call(name: impl Into<String>, args: impl IntoIterator<Item = Self>) -> Self {
        Self::BuiltIn {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn aggregate(name: impl Into<String>, distinct: bool, arg: Option<Self>) -> Self {
        Self::Aggregate {
            name: name.into(),
            distinct,
            arg: arg.map(Box::new),
            separator: None,
        }
    }
}

/// A parsed query.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Query {
    Select {
        prologue: Prologue,
        select: SelectClause,
        dataset: Vec<DatasetClause>,
        pattern: Vec<GroupPatternElement>,
        modifiers: SolutionModifiers,
        values: Option<ValuesClause>,
    },
    Construct {
        prologue: Prologue,
        /// `None` for `CONSTRUCT WHERE`: the template is the pattern itself.
        template: Option<Vec<TriplesPattern>>,
        dataset: Vec<DatasetClause>,
        pattern: Vec<GroupPatternElement>,
        modifiers: SolutionModifiers,
        values: Option<ValuesClause>,
    },
    Describe {
        prologue: Prologue,
        /// Empty for `DESCRIBE *`.
        targets: Vec<VarOrIri>,
        dataset: Vec<DatasetClause>,
        pattern: Option<Vec<GroupPatternElement>>,
        modifiers: SolutionModifiers,
        values: Option<ValuesClause>,
    },
    Ask {
        prologue: Prologue,
        dataset: Vec<DatasetClause>,
        pattern: Vec<GroupPatternElement>,
        modifiers: SolutionModifiers,
        values: Option<ValuesClause>,
    },
}

/// A block of quad templates in updates.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum QuadsElement {
    Triples(Vec<TriplesPattern>),
    Graph {
        name: VarOrIri,
        triples: Vec<TriplesPattern>,
    },
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GraphOrDefault {
    Default,
    Graph(Iri),
}

/// The target of `CLEAR` and `DROP`.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GraphRefAll {
    Graph(Iri),
    Default,
    Named,
    All,
}

#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum UpdateOperation {
    InsertData(Vec<QuadsElement>),
    DeleteData(Vec<QuadsElement>),
    DeleteWhere(Vec<QuadsElement>),
    Modify {
        with: Option<Iri>,
        delete: Vec<QuadsElement>,
        insert: Vec<QuadsElement>,
        using: Vec<DatasetClause>,
        pattern: Vec<GroupPatternElement>,
    },
    Load {
        silent: bool,
        source: Iri,
        destination: Option<Iri>,
    },
    Clear {
        silent: bool,
        target: GraphRefAll,
    },
    Drop {
        silent: bool,
        target: GraphRefAll,
    },
    Create {
        silent: bool,
        graph: Iri,
    },
    Add {
        silent: bool,
        from: GraphOrDefault,
        to: GraphOrDefault,
    },
    Move {
        silent: bool,
        from: GraphOrDefault,
        to: GraphOrDefault,
    },
    Copy {
        silent: bool,
        from: GraphOrDefault,
        to: GraphOrDefault,
    },
}

/// A parsed update request.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct Update {
    pub prologue: Prologue,
    pub operations: Vec<UpdateOperation>,
}
