use oxiri::{Iri, IriParseError};
use std::fmt;

/// An absolute IRI, displayed between angle brackets.
///
/// ```
/// use rdfterm::NamedNode;
///
/// assert_eq!(
///     NamedNode::new("http://example.com/foo")?.to_string(),
///     "<http://example.com/foo>"
/// );
/// NamedNode::new("foo").unwrap_err(); // relative
/// # Result::<_,rdfterm::IriParseError>::Ok(())
/// ```
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct NamedNode {
    iri: String,
}

impl NamedNode {
    pub fn new(iri: impl Into<String>) -> Result<Self, IriParseError> {
        Ok(Iri::parse(iri.into())?.into())
    }

    /// Skips the IRI validation done by [`NamedNode::new`].
    #[inline]
    pub fn new_unchecked(iri: impl Into<String>) -> Self {
        Self { iri: iri.into() }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.iri
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.iri
    }

    #[inline]
    pub fn as_ref(&self) -> NamedNodeRef<'_> {
        NamedNodeRef { iri: &self.iri }
    }
}

impl From<Iri<String>> for NamedNode {
    #[inline]
    fn from(iri: Iri<String>) -> Self {
        Self {
            iri: iri.into_inner(),
        }
    }
}

/// A borrowed [`NamedNode`], the type of the [`vocab`](crate::vocab) constants.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub struct NamedNodeRef<'a> {
    iri: &'a str,
}

impl<'a> NamedNodeRef<'a> {
    pub fn new(iri: &'a str) -> Result<Self, IriParseError> {
        Ok(Self {
            iri: Iri::parse(iri)?.into_inner(),
        })
    }

    /// Skips the IRI validation done by [`NamedNodeRef::new`].
    #[inline]
    pub const fn new_unchecked(iri: &'a str) -> Self {
        Self { iri }
    }

    #[inline]
    pub const fn as_str(self) -> &'a str {
        self.iri
    }

    #[inline]
    pub fn into_owned(self) -> NamedNode {
        NamedNode::new_unchecked(self.iri)
    }
}

impl From<NamedNodeRef<'_>> for NamedNode {
    #[inline]
    fn from(node: NamedNodeRef<'_>) -> Self {
        node.into_owned()
    }
}

impl fmt::Display for NamedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl fmt::Display for NamedNodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.iri)
    }
}

/// Equality on the IRI string, whatever the ownership.
macro_rules! iri_equality {
    ($($left:ty, $right:ty;)*) => {
        $(
            impl PartialEq<$right> for $left {
                #[inline]
                fn eq(&self, other: &$right) -> bool {
                    AsRef::<str>::as_ref(self) == AsRef::<str>::as_ref(other)
                }
            }
        )*
    };
}

impl AsRef<str> for NamedNode {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.iri
    }
}

impl AsRef<str> for NamedNodeRef<'_> {
    #[inline]
    fn as_ref(&self) -> &str {
        self.iri
    }
}

iri_equality! {
    NamedNode, NamedNodeRef<'_>;
    NamedNodeRef<'_>, NamedNode;
    NamedNode, str;
    NamedNode, &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        NamedNode::new("http://example.com/foo").unwrap();
        NamedNode::new("foo").unwrap_err();
        NamedNode::new("http://example.com/ foo").unwrap_err();
        NamedNodeRef::new("http://example.com/ foo").unwrap_err();
    }

    #[test]
    fn test_ref_equality() {
        let owned = NamedNode::new_unchecked("http://example.com/");
        assert_eq!(owned, NamedNodeRef::new_unchecked("http://example.com/"));
        assert_eq!(owned.as_ref().into_owned(), owned);
        assert_eq!(owned, "http://example.com/");
    }
}
