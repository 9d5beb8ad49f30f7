use crate::algebra::*;
use crate::term::*;
use oxiri::Iri;
use std::fmt;

/// A translated [SPARQL query](https://www.w3.org/TR/sparql11-query/).
///
/// ```
/// use sparalgebra::ast::{self, GroupPatternElement, SelectClause, TriplesPattern, VarOrTerm, Verb};
/// use sparalgebra::QueryTranslator;
///
/// let query = ast::Query::Select {
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
/// };
/// let query = QueryTranslator::new().translate(&query)?;
/// assert_eq!(query.to_string(), "SELECT ?s ?p ?o WHERE { ?s ?p ?o . }");
/// assert_eq!(
///     query.to_sse(),
///     "(project (?s ?p ?o) (bgp (triple ?s ?p ?o)))"
/// );
/// # Ok::<_, sparalgebra::TranslationError>(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Query {
    /// Returns the rows of the pattern.
    Select {
        /// The `FROM` and `FROM NAMED` restriction.
        dataset: Option<QueryDataset>,
        pattern: GraphPattern,
        base_iri: Option<Iri<String>>,
    },
    /// Instantiates the template once per row of the pattern.
    Construct {
        /// Triples with unbound or invalid positions are skipped.
        template: Vec<TriplePattern>,
        /// The `FROM` and `FROM NAMED` restriction.
        dataset: Option<QueryDataset>,
        pattern: GraphPattern,
        base_iri: Option<Iri<String>>,
    },
    /// Returns the triples about the resources bound by the pattern.
    ///
    /// The pattern projects the described resources.
    Describe {
        /// The `FROM` and `FROM NAMED` restriction.
        dataset: Option<QueryDataset>,
        pattern: GraphPattern,
        base_iri: Option<Iri<String>>,
    },
    /// Checks that the pattern has at least one row.
    Ask {
        /// The `FROM` and `FROM NAMED` restriction.
        dataset: Option<QueryDataset>,
        pattern: GraphPattern,
        base_iri: Option<Iri<String>>,
    },
}

impl Query {
    #[inline]
    pub fn dataset(&self) -> Option<&QueryDataset> {
        match self {
            Self::Select { dataset, .. }
            | Self::Construct { dataset, .. }
            | Self::Describe { dataset, .. }
            | Self::Ask { dataset, .. } => dataset.as_ref(),
        }
    }

    #[inline]
    pub fn pattern(&self) -> &GraphPattern {
        match self {
            Self::Select { pattern, .. }
            | Self::Construct { pattern, .. }
            | Self::Describe { pattern, .. }
            | Self::Ask { pattern, .. } => pattern,
        }
    }

    #[inline]
    pub fn base_iri(&self) -> Option<&Iri<String>> {
        match self {
            Self::Select { base_iri, .. }
            | Self::Construct { base_iri, .. }
            | Self::Describe { base_iri, .. }
            | Self::Ask { base_iri, .. } => base_iri.as_ref(),
        }
    }

    /// The variables of the solutions, in projection order.
    ///
    /// Only `SELECT` and `DESCRIBE` queries have a projection.
    pub fn projected_variables(&self) -> Vec<Variable> {
        match self {
            Self::Select { pattern, .. } | Self::Describe { pattern, .. } => {
                pattern.in_scope_variables()
            }
            Self::Construct { .. } | Self::Ask { .. } => Vec::new(),
        }
    }

    /// The S-expression form of the algebra, as printed in the logs.
    pub fn to_sse(&self) -> String {
        sse_to_string(|f| self.fmt_sse(f))
    }

    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        let (dataset, pattern, base_iri) = match self {
            Self::Select {
                dataset,
                pattern,
                base_iri,
            }
            | Self::Construct {
                dataset,
                pattern,
                base_iri,
                ..
            }
            | Self::Describe {
                dataset,
                pattern,
                base_iri,
            }
            | Self::Ask {
                dataset,
                pattern,
                base_iri,
            } => (dataset, pattern, base_iri),
        };
        if let Some(base_iri) = base_iri {
            write!(f, "(base <{base_iri}> ")?;
        }
        match self {
            Self::Select { .. } => (),
            Self::Construct { template, .. } => {
                f.write_str("(construct (")?;
                for (i, t) in template.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    t.fmt_sse(f)?;
                }
                f.write_str(") ")?;
            }
            Self::Describe { .. } => f.write_str("(describe ")?,
            Self::Ask { .. } => f.write_str("(ask ")?,
        }
        if let Some(dataset) = dataset {
            f.write_str("(dataset ")?;
            dataset.fmt_sse(f)?;
            f.write_str(" ")?;
        }
        pattern.fmt_sse(f)?;
        if dataset.is_some() {
            f.write_str(")")?;
        }
        if !matches!(self, Self::Select { .. }) {
            f.write_str(")")?;
        }
        if base_iri.is_some() {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(base_iri) = self.base_iri() {
            writeln!(f, "BASE <{base_iri}>")?;
        }
        match self {
            Self::Select {
                dataset, pattern, ..
            } => write!(
                f,
                "{}",
                SparqlGraphRootPattern::new(pattern, dataset.as_ref())
            ),
            Self::Construct {
                template,
                dataset,
                pattern,
                ..
            } => {
                f.write_str("CONSTRUCT { ")?;
                for triple in template {
                    write!(f, "{triple} . ")?;
                }
                f.write_str("}")?;
                if let Some(dataset) = dataset {
                    dataset.fmt(f)?;
                }
                write!(
                    f,
                    " WHERE {{ {} }}",
                    SparqlGraphRootPattern::new(pattern, None)
                )
            }
            Self::Describe {
                dataset, pattern, ..
            } => {
                f.write_str("DESCRIBE *")?;
                if let Some(dataset) = dataset {
                    dataset.fmt(f)?;
                }
                write!(
                    f,
                    " WHERE {{ {} }}",
                    SparqlGraphRootPattern::new(pattern, None)
                )
            }
            Self::Ask {
                dataset, pattern, ..
            } => {
                f.write_str("ASK")?;
                if let Some(dataset) = dataset {
                    dataset.fmt(f)?;
                }
                write!(
                    f,
                    " WHERE {{ {} }}",
                    SparqlGraphRootPattern::new(pattern, None)
                )
            }
        }
    }
}
