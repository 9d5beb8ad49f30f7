use crate::blank_node::BlankNode;
use crate::literal::Literal;
use crate::named_node::{NamedNode, NamedNodeRef};
use std::fmt;

/// Declares a union of node kinds whose variants are named after the wrapped type.
///
/// Each kind converts into the union and is displayed in its N-Triples form.
/// An optional unit variant is written with the given keyword.
macro_rules! node_union {
    (
        $(#[$attr:meta])*
        $name:ident { $($kind:ident),+ $(; $(#[$unit_attr:meta])* $unit:ident => $keyword:literal)? }
    ) => {
        $(#[$attr])*
        #[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
        pub enum $name {
            $($kind($kind),)+
            $($(#[$unit_attr])* $unit,)?
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$kind(node) => node.fmt(f),)+
                    $(Self::$unit => f.write_str($keyword),)?
                }
            }
        }

        $(
            impl From<$kind> for $name {
                #[inline]
                fn from(node: $kind) -> Self {
                    Self::$kind(node)
                }
            }
        )+

        impl From<NamedNodeRef<'_>> for $name {
            #[inline]
            fn from(node: NamedNodeRef<'_>) -> Self {
                Self::NamedNode(node.into_owned())
            }
        }
    };
}

node_union! {
    /// An IRI or a blank node: what may be the subject of a triple.
    NamedOrBlankNode { NamedNode, BlankNode }
}

node_union! {
    /// An RDF [term](https://www.w3.org/TR/rdf11-concepts/#dfn-rdf-term).
    ///
    /// Query variables are not terms, they live in the pattern types of the algebra.
    ///
    /// ```
    /// use rdfterm::{Literal, Term};
    ///
    /// assert_eq!(
    ///     Term::from(Literal::from(1)).to_string(),
    ///     "\"1\"^^<http://www.w3.org/2001/XMLSchema#integer>"
    /// );
    /// ```
    Term { NamedNode, BlankNode, Literal }
}

node_union! {
    /// The graph a quad belongs to.
    #[derive(Default)]
    GraphName { NamedNode, BlankNode; #[default] DefaultGraph => "DEFAULT" }
}

impl TryFrom<Term> for NamedOrBlankNode {
    type Error = Term;

    /// Gives the term back if it is a literal.
    #[inline]
    fn try_from(term: Term) -> Result<Self, Term> {
        match term {
            Term::NamedNode(node) => Ok(Self::NamedNode(node)),
            Term::BlankNode(node) => Ok(Self::BlankNode(node)),
            Term::Literal(_) => Err(term),
        }
    }
}

impl From<NamedOrBlankNode> for Term {
    #[inline]
    fn from(node: NamedOrBlankNode) -> Self {
        match node {
            NamedOrBlankNode::NamedNode(node) => Self::NamedNode(node),
            NamedOrBlankNode::BlankNode(node) => Self::BlankNode(node),
        }
    }
}

impl From<NamedOrBlankNode> for GraphName {
    #[inline]
    fn from(node: NamedOrBlankNode) -> Self {
        match node {
            NamedOrBlankNode::NamedNode(node) => Self::NamedNode(node),
            NamedOrBlankNode::BlankNode(node) => Self::BlankNode(node),
        }
    }
}

impl GraphName {
    #[inline]
    pub fn is_default_graph(&self) -> bool {
        *self == Self::DefaultGraph
    }
}

/// A subject, predicate and object statement.
///
/// ```
/// use rdfterm::{NamedNode, Triple};
///
/// let ex = NamedNode::new("http://example.com")?;
/// assert_eq!(
///     Triple::new(ex.clone(), ex.clone(), ex).to_string(),
///     "<http://example.com> <http://example.com> <http://example.com>"
/// );
/// # Result::<_,rdfterm::IriParseError>::Ok(())
/// ```
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct Triple {
    pub subject: NamedOrBlankNode,
    pub predicate: NamedNode,
    pub object: Term,
}

impl Triple {
    #[inline]
    pub fn new(
        subject: impl Into<NamedOrBlankNode>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Places the triple in the given graph.
    #[inline]
    pub fn in_graph(self, graph_name: impl Into<GraphName>) -> Quad {
        let Self {
            subject,
            predicate,
            object,
        } = self;
        Quad::new(subject, predicate, object, graph_name)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A triple in a given graph of a dataset.
///
/// Displayed as an N-Quads statement, the graph name is omitted for the default graph.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct Quad {
    pub subject: NamedOrBlankNode,
    pub predicate: NamedNode,
    pub object: Term,
    pub graph_name: GraphName,
}

impl Quad {
    #[inline]
    pub fn new(
        subject: impl Into<NamedOrBlankNode>,
        predicate: impl Into<NamedNode>,
        object: impl Into<Term>,
        graph_name: impl Into<GraphName>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            graph_name: graph_name.into(),
        }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if !self.graph_name.is_default_graph() {
            write!(f, " {}", self.graph_name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_from_term() {
        let node = NamedNode::new_unchecked("http://example.com/");
        assert_eq!(
            NamedOrBlankNode::try_from(Term::from(node.clone())),
            Ok(NamedOrBlankNode::from(node))
        );
        NamedOrBlankNode::try_from(Term::from(Literal::from("a"))).unwrap_err();
    }

    #[test]
    fn test_quad_display() {
        let ex = NamedNode::new_unchecked("http://example.com/");
        let triple = Triple::new(ex.clone(), ex.clone(), ex.clone());
        assert_eq!(
            triple.clone().in_graph(ex).to_string(),
            "<http://example.com/> <http://example.com/> <http://example.com/> <http://example.com/>"
        );
        assert_eq!(
            triple.in_graph(GraphName::default()).to_string(),
            "<http://example.com/> <http://example.com/> <http://example.com/>"
        );
    }
}
