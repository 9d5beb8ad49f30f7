use oxiri::IriParseError;
use rdfterm::{BlankNodeIdParseError, LanguageTagParseError, Variable, VariableNameParseError};

/// An error raised while translating a parse tree into the algebra.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TranslationError {
    /// A name could not be resolved into an IRI.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// The parse tree contains a construct that has no algebra counterpart.
    #[error(transparent)]
    SyntaxLowering(#[from] SyntaxLoweringError),
}

/// An unresolvable prefixed name or relative IRI.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ResolutionError {
    #[error("The prefix {0}: is not declared")]
    UndeclaredPrefix(String),
    #[error("Invalid IRI <{iri}>")]
    InvalidIri {
        iri: String,
        #[source]
        error: IriParseError,
    },
    #[error("Invalid base IRI <{iri}>")]
    InvalidBaseIri {
        iri: String,
        #[source]
        error: IriParseError,
    },
    #[error(transparent)]
    InvalidLanguageTag(#[from] LanguageTagParseError),
    #[error(transparent)]
    InvalidVariableName(#[from] VariableNameParseError),
    #[error(transparent)]
    InvalidBlankNode(#[from] BlankNodeIdParseError),
}

/// A malformed construct of the parse tree.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SyntaxLoweringError {
    #[error("Empty property path")]
    EmptyPath,
    #[error("Unknown aggregate function {0}")]
    UnknownAggregate(String),
    #[error("Unknown built-in function {0}")]
    UnknownFunction(String),
    #[error("The VALUES clause declares {expected} variables but a row has {found} values")]
    ValuesArity { expected: usize, found: usize },
    #[error("Aggregates are only allowed in SELECT, HAVING and ORDER BY")]
    AggregateNotAllowed,
    #[error("{0}(*) is not a valid aggregate call")]
    AggregateWithoutArgument(String),
    #[error("The variable {0} is already in scope and can't be bound again")]
    VariableAlreadyBound(Variable),
    #[error("Blank nodes are not allowed in {0}")]
    BlankNodeNotAllowed(&'static str),
    #[error("Variables are not allowed in {0}")]
    VariableNotAllowed(&'static str),
    #[error("Property paths are not allowed in {0}")]
    PathNotAllowed(&'static str),
}
