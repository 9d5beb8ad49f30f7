//! RDF terms extended with query variables, as they appear in patterns and templates.

pub use rdfterm::{BlankNode, GraphName, Literal, NamedNode, Quad, Term, Triple, Variable};
use std::fmt;

/// Declares a union whose variants are named after the wrapped type, with a `From` conversion for each one.
///
/// An optional unit variant is written with the given keyword.
macro_rules! pattern_union {
    (
        $(#[$attr:meta])*
        $name:ident { $($kind:ident),+ $(; $(#[$unit_attr:meta])* $unit:ident => $keyword:literal)? }
    ) => {
        $(#[$attr])*
        #[derive(Eq, PartialEq, Debug, Clone, Hash)]
        pub enum $name {
            $($kind($kind),)+
            $($(#[$unit_attr])* $unit,)?
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$kind(inner) => inner.fmt(f),)+
                    $(Self::$unit => f.write_str($keyword),)?
                }
            }
        }

        $(
            impl From<$kind> for $name {
                #[inline]
                fn from(inner: $kind) -> Self {
                    Self::$kind(inner)
                }
            }
        )+
    };
}

/// Conversions from a union into a wider one sharing the variant names.
macro_rules! widening {
    ($($from:ident => $to:ident { $($kind:ident),+ })*) => {
        $(
            impl From<$from> for $to {
                #[inline]
                fn from(value: $from) -> Self {
                    match value {
                        $($from::$kind(inner) => Self::$kind(inner),)+
                    }
                }
            }
        )*
    };
}

pattern_union! {
    /// A value allowed in `VALUES` blocks: an IRI or a literal.
    GroundTerm { NamedNode, Literal }
}

pattern_union! {
    /// The predicate of a triple pattern.
    NamedNodePattern { NamedNode, Variable }
}

pattern_union! {
    /// The subject or object of a triple pattern.
    ///
    /// Blank nodes behave like variables that are never projected.
    TermPattern { NamedNode, BlankNode, Literal, Variable }
}

pattern_union! {
    /// The graph of a quad pattern.
    #[derive(Default)]
    GraphNamePattern { NamedNode, Variable; #[default] DefaultGraph => "DEFAULT" }
}

widening! {
    GroundTerm => Term { NamedNode, Literal }
    GroundTerm => TermPattern { NamedNode, Literal }
    Term => TermPattern { NamedNode, BlankNode, Literal }
    NamedNodePattern => TermPattern { NamedNode, Variable }
    NamedNodePattern => GraphNamePattern { NamedNode, Variable }
}

impl NamedNodePattern {
    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl TermPattern {
    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "{self}")
    }

    /// Variables and blank nodes match any term.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Variable(_) | Self::BlankNode(_))
    }
}

/// A [triple pattern](https://www.w3.org/TR/sparql11-query/#defn_TriplePattern).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: NamedNodePattern,
    pub object: TermPattern,
}

impl TriplePattern {
    #[inline]
    pub fn new(
        subject: impl Into<TermPattern>,
        predicate: impl Into<NamedNodePattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "(triple {self})")
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A triple pattern in a given graph, the building block of update templates.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct QuadPattern {
    pub subject: TermPattern,
    pub predicate: NamedNodePattern,
    pub object: TermPattern,
    pub graph_name: GraphNamePattern,
}

impl QuadPattern {
    pub(crate) fn new(triple: TriplePattern, graph_name: GraphNamePattern) -> Self {
        let TriplePattern {
            subject,
            predicate,
            object,
        } = triple;
        Self {
            subject,
            predicate,
            object,
            graph_name,
        }
    }

    fn in_default_graph(&self) -> bool {
        self.graph_name == GraphNamePattern::DefaultGraph
    }

    pub(crate) fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        let triple = format!("(triple {} {} {})", self.subject, self.predicate, self.object);
        if self.in_default_graph() {
            f.write_str(&triple)
        } else {
            write!(f, "(graph {} {triple})", self.graph_name)
        }
    }
}

impl fmt::Display for QuadPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let triple = format!("{} {} {}", self.subject, self.predicate, self.object);
        if self.in_default_graph() {
            write!(f, "{triple} .")
        } else {
            write!(f, "GRAPH {} {{ {triple} }}", self.graph_name)
        }
    }
}
